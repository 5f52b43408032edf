use std::io::{self, Read, Seek, SeekFrom};

use flume::{Receiver, Sender};
use symphonia::core::io::MediaSource;

use crate::{
    backend::ReadRequest,
    common::SharedByteSource,
    input::read_fully,
};

/// Messages from the demux worker to the read thread.
pub(super) enum ReadEvent {
    Request(ReadRequest),
    Disconnected,
}

/// Answer to a `ReadEvent::Request`.
pub(super) enum Chunk {
    Data(Vec<u8>),
    Failed,
}

fn resolve_seek(pos: u64, len: u64, target: SeekFrom) -> io::Result<u64> {
    let new_pos = match target {
        SeekFrom::Start(p) => Some(p),
        SeekFrom::Current(p) => pos.checked_add_signed(p),
        SeekFrom::End(p) => len.checked_add_signed(p),
    };
    new_pos.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))
}

/// Reads the shared byte source directly. Used for probing, before any read
/// thread exists.
pub(super) struct SharedSourceReader {
    source: SharedByteSource,
    pos: u64,
    len: u64,
}

impl SharedSourceReader {
    pub(super) fn new(source: SharedByteSource, len: u64) -> Self {
        Self {
            source,
            pos: 0,
            len,
        }
    }
}

impl Read for SharedSourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let mut source = self.source.lock();
        source.seek(self.pos)?;
        let n = read_fully(&mut **source, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SharedSourceReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(self.pos, self.len, target)?;
        Ok(self.pos)
    }
}

impl MediaSource for SharedSourceReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// Turns every read into a `ReadRequest` and blocks until the read thread
/// pushes the bytes.
pub(super) struct PullReader {
    requests: Sender<ReadEvent>,
    chunks: Receiver<Chunk>,
    pos: u64,
    len: u64,
}

impl PullReader {
    pub(super) fn new(requests: Sender<ReadEvent>, chunks: Receiver<Chunk>, len: u64) -> Self {
        Self {
            requests,
            chunks,
            pos: 0,
            len,
        }
    }
}

impl Read for PullReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let request = ReadRequest {
            offset: self.pos,
            size: buf.len(),
        };
        self.requests
            .send(ReadEvent::Request(request))
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionAborted, "backend disconnected"))?;

        match self.chunks.recv() {
            Ok(Chunk::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                self.pos += n as u64;
                Ok(n)
            }
            Ok(Chunk::Failed) => Err(io::Error::other(format!(
                "read of {} bytes at {} failed",
                request.size, request.offset
            ))),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "backend disconnected",
            )),
        }
    }
}

impl Seek for PullReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(self.pos, self.len, target)?;
        Ok(self.pos)
    }
}

impl MediaSource for PullReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use parking_lot::Mutex;

    use super::*;
    use crate::input::{ByteSource, MemoryByteSource};

    #[test]
    fn pull_reader_round_trips_through_requests() {
        let (requests_tx, requests_rx) = flume::unbounded();
        let (chunks_tx, chunks_rx) = flume::unbounded();
        let server = thread::spawn(move || {
            let Ok(ReadEvent::Request(request)) = requests_rx.recv() else {
                panic!("expected a read request");
            };
            assert_eq!(request, ReadRequest { offset: 4, size: 8 });
            chunks_tx.send(Chunk::Data(vec![7; 3])).unwrap();
        });

        let mut reader = PullReader::new(requests_tx, chunks_rx, 64);
        reader.seek(SeekFrom::Start(4)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(reader.stream_position().unwrap(), 7);
        server.join().unwrap();
    }

    #[test]
    fn failed_chunk_is_an_io_error() {
        let (requests_tx, _requests_rx) = flume::unbounded();
        let (chunks_tx, chunks_rx) = flume::unbounded();
        chunks_tx.send(Chunk::Failed).unwrap();

        let mut reader = PullReader::new(requests_tx, chunks_rx, 64);
        assert!(reader.read(&mut [0u8; 4]).is_err());
    }

    #[test]
    fn shared_reader_stops_at_length() {
        let source: SharedByteSource = Arc::new(Mutex::new(
            Box::new(MemoryByteSource::from_vec(vec![1, 2, 3, 4])) as Box<dyn ByteSource>,
        ));
        let mut reader = SharedSourceReader::new(source, 4);
        reader.seek(SeekFrom::End(-1)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(reader.seek(SeekFrom::Current(-10)).is_err());
    }
}
