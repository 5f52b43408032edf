use std::time::Duration;

use bytes::Bytes;

use crate::{common::Token, source::MediaStream};

/// One timestamped unit of stream data.
#[derive(Debug, Clone)]
pub struct Sample {
    pub data: Bytes,
    pub pts: Duration,
    pub duration: Duration,
    /// The token passed to the request this sample answers.
    pub token: Option<Token>,
}

/// Events posted on a stream's queue.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// `position` is `None` when resuming without a position.
    Started { position: Option<Duration> },
    Seeked { position: Duration },
    Paused,
    Stopped,
    EndOfStream,
    Sample(Sample),
    /// The backend failed to produce the requested sample.
    Error { message: String },
}

/// Events posted on the source's queue.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A stream became active.
    NewStream(MediaStream),
    /// An already active stream was restarted.
    UpdatedStream(MediaStream),
    Started { position: Option<Duration> },
    Seeked { position: Duration },
    Paused,
    Stopped,
    EndOfPresentation,
    RateChanged { rate: f32 },
}
