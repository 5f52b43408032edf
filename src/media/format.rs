use std::fmt;

/// Broad category of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
    Unknown,
}

impl MediaKind {
    /// Audio and video streams take part in default activation and
    /// mutual exclusion.
    pub fn is_elementary(&self) -> bool {
        matches!(self, MediaKind::Audio | MediaKind::Video)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Subtitle => "subtitle",
            MediaKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Raw picture layouts a video stream may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar 4:2:0, separate U and V planes.
    I420,
    /// Semi-planar 4:2:0, interleaved UV plane.
    Nv12,
    Yv12,
    Yuy2,
    Rgb24,
    Rgba,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bits_per_sample: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFormat {
    pub codec: String,
    pub pixel_format: Option<PixelFormat>,
    pub width: u32,
    pub height: u32,
}

/// Format of one elementary stream as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaFormat {
    Audio(AudioFormat),
    Video(VideoFormat),
    Subtitle { codec: String },
    Unknown,
}

impl MediaFormat {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaFormat::Audio(_) => MediaKind::Audio,
            MediaFormat::Video(_) => MediaKind::Video,
            MediaFormat::Subtitle { .. } => MediaKind::Subtitle,
            MediaFormat::Unknown => MediaKind::Unknown,
        }
    }

    pub fn codec(&self) -> Option<&str> {
        match self {
            MediaFormat::Audio(a) => Some(&a.codec),
            MediaFormat::Video(v) => Some(&v.codec),
            MediaFormat::Subtitle { codec } => Some(codec),
            MediaFormat::Unknown => None,
        }
    }

    /// The format as advertised to consumers. Planar I420 is announced as
    /// NV12; backend negotiation keeps using the original format.
    pub fn advertised(&self) -> MediaFormat {
        match self {
            MediaFormat::Video(video) if video.pixel_format == Some(PixelFormat::I420) => {
                MediaFormat::Video(VideoFormat {
                    pixel_format: Some(PixelFormat::Nv12),
                    ..video.clone()
                })
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Audio(a) => write!(
                f,
                "audio/{} {}Hz {}ch",
                a.codec,
                a.sample_rate.unwrap_or(0),
                a.channels.unwrap_or(0)
            ),
            MediaFormat::Video(v) => write!(f, "video/{} {}x{}", v.codec, v.width, v.height),
            MediaFormat::Subtitle { codec } => write!(f, "subtitle/{}", codec),
            MediaFormat::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(pixel_format: PixelFormat) -> MediaFormat {
        MediaFormat::Video(VideoFormat {
            codec: "raw".into(),
            pixel_format: Some(pixel_format),
            width: 640,
            height: 360,
        })
    }

    #[test]
    fn i420_is_advertised_as_nv12() {
        let advertised = video(PixelFormat::I420).advertised();
        assert_eq!(advertised, video(PixelFormat::Nv12));
    }

    #[test]
    fn other_formats_are_advertised_unchanged() {
        assert_eq!(video(PixelFormat::Yuy2).advertised(), video(PixelFormat::Yuy2));
        assert_eq!(MediaFormat::Unknown.advertised(), MediaFormat::Unknown);
    }

    #[test]
    fn only_audio_and_video_are_elementary() {
        assert!(MediaKind::Audio.is_elementary());
        assert!(MediaKind::Video.is_elementary());
        assert!(!MediaKind::Subtitle.is_elementary());
        assert!(!MediaKind::Unknown.is_elementary());
    }
}
