use thiserror::Error;

/// Errors reported by the media source, its streams and its collaborators.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The operation is not valid for the current lifecycle state.
    #[error("operation is not valid in the current state")]
    WrongState,

    /// The stream already signaled end of stream.
    #[error("stream has reached end of stream")]
    EndOfStream,

    /// The source (or the queue) has been shut down.
    #[error("media source has been shut down")]
    Shutdown,

    /// Only the default time format is accepted.
    #[error("unsupported time format")]
    UnsupportedTimeFormat,

    /// The backend does not recognize the byte source.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A buffer could not be allocated.
    #[error("allocation of {0} bytes failed")]
    AllocationFailure(usize),

    /// I/O against the byte source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source cannot seek.
    #[error("byte source is not seekable")]
    NotSeekable,

    /// Playback rate outside the supported range.
    #[error("unsupported playback rate {0}")]
    UnsupportedRate(f32),

    #[error("reverse playback is not supported")]
    ReverseUnsupported,

    #[error("thinned playback is not supported")]
    ThinningUnsupported,

    /// No stream with the given id or index.
    #[error("no stream with id {0}")]
    InvalidStream(u32),

    /// Internal backend failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

impl SourceError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
