//! Container detection via header byte sniffing.

/// Container families recognized from their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Matroska,
    Ogg,
    Flac,
    Wav,
    Mp3,
    Unknown,
}

impl Container {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Matroska => "video/webm",
            Container::Ogg => "audio/ogg",
            Container::Flac => "audio/flac",
            Container::Wav => "audio/wav",
            Container::Mp3 => "audio/mpeg",
            Container::Unknown => "application/octet-stream",
        }
    }

    /// Extension hint for the demuxer probe.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Container::Mp4 => Some("mp4"),
            Container::Matroska => Some("mkv"),
            Container::Ogg => Some("ogg"),
            Container::Flac => Some("flac"),
            Container::Wav => Some("wav"),
            Container::Mp3 => Some("mp3"),
            Container::Unknown => None,
        }
    }
}

/// Sniff the container from the first bytes of arbitrary data.
///
/// Requires at least 4 bytes.
pub fn detect_container(header: &[u8]) -> Container {
    if header.len() < 4 {
        return Container::Unknown;
    }

    // EBML magic
    if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Container::Matroska;
    }

    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        return Container::Mp4;
    }

    if header.starts_with(b"OggS") {
        return Container::Ogg;
    }

    if header.starts_with(b"fLaC") {
        return Container::Flac;
    }

    if header.starts_with(b"RIFF") && header.len() >= 12 && &header[8..12] == b"WAVE" {
        return Container::Wav;
    }

    // ID3 tag or frame sync
    if header.starts_with(b"ID3") || (header[0] == 0xFF && (header[1] & 0xE0) == 0xE0) {
        return Container::Mp3;
    }

    Container::Unknown
}
