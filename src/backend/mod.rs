//! Contract between the media source and the demultiplexing engine.

pub mod sniff;
pub mod demux;

use std::{sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{
    common::{Result, SharedByteSource},
    media::{MediaFormat, TagKind},
};

pub use demux::{SymphoniaBackend, SymphoniaBackendFactory};

/// A byte range the backend wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub offset: u64,
    pub size: usize,
}

/// One unit of stream data produced by the backend.
#[derive(Debug, Clone)]
pub struct BackendBuffer {
    pub data: Bytes,
    pub pts: Duration,
    pub duration: Duration,
}

impl BackendBuffer {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Read-only view over a set of streams, shared by probe results and
/// connected backends.
pub trait StreamCatalog {
    fn stream_count(&self) -> usize;

    fn preferred_format(&self, index: usize) -> Option<MediaFormat>;

    fn tag(&self, index: usize, kind: TagKind) -> Option<String>;
}

/// A demultiplexer fed through a byte-pull protocol.
///
/// All methods take `&self`: the command executor and the read thread use the
/// same backend concurrently. `Drop` destroys it.
pub trait Backend: StreamCatalog + Send + Sync {
    /// Starts parsing a byte stream of `total_size` bytes. Returns once the
    /// streams are known; needs the read thread to be running.
    fn connect(&self, total_size: u64) -> Result<()>;

    fn enable(&self, index: usize, format: &MediaFormat) -> Result<()>;

    fn disable(&self, index: usize) -> Result<()>;

    fn seek(&self, rate: f32, position: Duration) -> Result<()>;

    /// Blocks until the backend wants bytes. `None` means disconnected, after
    /// which no request follows.
    fn next_read_request(&self) -> Option<ReadRequest>;

    /// Answers the last request. `None` reports a failed read; an empty slice
    /// means end of data.
    fn push_bytes(&self, data: Option<&[u8]>);

    /// Next buffer of stream `index`, `None` when the stream is exhausted.
    fn pull_buffer(&self, index: usize) -> Result<Option<BackendBuffer>>;

    /// Releases every blocked `next_read_request` caller. Idempotent.
    fn disconnect(&self);
}

/// Stream as seen by the construction-time probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedStream {
    pub format: MediaFormat,
    pub language: Option<String>,
    pub name: Option<String>,
}

impl ProbedStream {
    pub fn new(format: MediaFormat) -> Self {
        Self {
            format,
            language: None,
            name: None,
        }
    }
}

/// What the probe learned about a byte source before any backend exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub mime_type: String,
    pub duration: Option<Duration>,
    pub streams: Vec<ProbedStream>,
}

impl StreamCatalog for ProbeInfo {
    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn preferred_format(&self, index: usize) -> Option<MediaFormat> {
        self.streams.get(index).map(|s| s.format.clone())
    }

    fn tag(&self, index: usize, kind: TagKind) -> Option<String> {
        let stream = self.streams.get(index)?;
        match kind {
            TagKind::Language => stream.language.clone(),
            TagKind::Name => stream.name.clone(),
        }
    }
}

/// Creates backends for one kind of engine.
pub trait BackendFactory: Send + Sync {
    /// Inspects the byte source and reports its streams.
    fn probe(&self, source: &SharedByteSource, chunk_size: usize) -> Result<ProbeInfo>;

    fn create(&self) -> Result<Arc<dyn Backend>>;
}
