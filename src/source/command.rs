use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use flume::{Receiver, Sender};
use tracing::{debug, trace, warn};

use super::{SourceShared, SourceState};
use crate::{
    common::{Result, SourceError, StartPosition, TimeFormat, Token},
    media::PresentationDescriptor,
};

/// A state-mutating operation, executed once by the command executor.
#[derive(Debug)]
pub(crate) enum Command {
    Start {
        descriptor: PresentationDescriptor,
        time_format: TimeFormat,
        position: StartPosition,
    },
    Pause,
    Stop,
    RequestSample {
        stream: usize,
        token: Option<Token>,
    },
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::RequestSample { .. } => "request-sample",
        }
    }
}

pub(crate) struct Envelope {
    seq: u64,
    command: Command,
}

/// Submission side of the source's command queue. Never blocks.
pub(crate) struct CommandQueue {
    tx: Sender<Envelope>,
    submitted: AtomicU64,
}

impl CommandQueue {
    pub(crate) fn new() -> (Self, Receiver<Envelope>) {
        let (tx, rx) = flume::unbounded();
        let queue = Self {
            tx,
            submitted: AtomicU64::new(0),
        };
        (queue, rx)
    }

    pub(crate) fn submit(&self, command: Command) -> Result<()> {
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("MediaSource: queued command #{} ({})", seq, command.name());
        self.tx
            .send(Envelope { seq, command })
            .map_err(|_| SourceError::Shutdown)
    }

    /// Number of commands submitted so far.
    pub(crate) fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

/// Runs commands one at a time until the queue is dropped.
pub(crate) fn spawn_executor(
    shared: Arc<SourceShared>,
    commands: Receiver<Envelope>,
    name: &str,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
        while let Ok(envelope) = commands.recv() {
            shared.execute(envelope);
        }
        debug!("MediaSource: command executor exiting");
    })?;
    Ok(handle)
}

impl SourceShared {
    fn execute(&self, envelope: Envelope) {
        let Envelope { seq, command } = envelope;
        let name = command.name();

        let mut inner = self.inner.lock();
        if inner.state == SourceState::Shutdown {
            debug!("MediaSource: dropping command #{} ({}) after shutdown", seq, name);
            return;
        }
        trace!("MediaSource: executing command #{} ({})", seq, name);

        let result = match command {
            Command::Start {
                descriptor,
                time_format,
                position,
            } => self.run_start(&mut inner, &descriptor, time_format, position),
            Command::Pause => self.run_pause(&mut inner),
            Command::Stop => self.run_stop(&mut inner),
            Command::RequestSample { stream, token } => {
                self.run_request_sample(&mut inner, stream, token)
            }
        };

        if let Err(e) = result {
            warn!("MediaSource: command #{} ({}) failed: {}", seq, name, e);
        }
    }
}
