//! Random-access byte sources feeding the backend.

use std::{
    fs::File,
    io::{self, Cursor, Read, Seek, SeekFrom},
    path::Path,
};

/// A random-access readable resource of known length.
pub trait ByteSource: Send {
    /// Total length in bytes.
    fn length(&self) -> io::Result<u64>;

    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Reads up to `buf.len()` bytes at the current position.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn is_seekable(&self) -> bool {
        true
    }

    /// Mime type, when the source knows it better than content sniffing.
    fn content_type(&self) -> Option<String> {
        None
    }

    /// Releases the underlying resource. Later reads fail.
    fn close(&mut self) {}
}

/// `ByteSource` over any `Read + Seek` value.
pub struct ReadSeekSource<R> {
    inner: Option<R>,
    len: u64,
    content_type: Option<String>,
}

pub type FileByteSource = ReadSeekSource<File>;
pub type MemoryByteSource = ReadSeekSource<Cursor<Vec<u8>>>;

impl<R: Read + Seek + Send> ReadSeekSource<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: Some(inner),
            len,
            content_type: None,
        })
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn inner(&mut self) -> io::Result<&mut R> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "byte source closed"))
    }
}

impl ReadSeekSource<File> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl ReadSeekSource<Cursor<Vec<u8>>> {
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            len: data.len() as u64,
            inner: Some(Cursor::new(data)),
            content_type: None,
        }
    }
}

impl<R: Read + Seek + Send> ByteSource for ReadSeekSource<R> {
    fn length(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner()?.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner()?.read(buf)
    }

    fn content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

/// Fills `buf` from the current position, stopping early only at end of data.
pub fn read_fully(source: &mut dyn ByteSource, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_reads_at_offset() {
        let mut source = MemoryByteSource::from_vec((0u8..100).collect());
        assert_eq!(source.length().unwrap(), 100);

        source.seek(90).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(read_fully(&mut source, &mut buf).unwrap(), 10);
        assert_eq!(&buf[..3], &[90, 91, 92]);
    }

    #[test]
    fn closed_source_fails_reads() {
        let mut source = MemoryByteSource::from_vec(vec![1, 2, 3]);
        source.close();
        let mut buf = [0u8; 2];
        assert_eq!(
            source.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert!(source.seek(0).is_err());
    }

    #[test]
    fn generic_source_measures_length() {
        let source = ReadSeekSource::new(Cursor::new(vec![0u8; 37]))
            .unwrap()
            .with_content_type("audio/wav");
        assert_eq!(source.length().unwrap(), 37);
        assert_eq!(source.content_type().as_deref(), Some("audio/wav"));
    }
}
