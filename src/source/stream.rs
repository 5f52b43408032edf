use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use bytes::Bytes;
use tracing::debug;

use super::{
    SourceShared, SourceState,
    command::Command,
    state::SourceInner,
};
use crate::{
    backend::BackendBuffer,
    common::{Result, SourceError, Token},
    media::{EventQueue, Sample, SourceEvent, StreamDescriptor, StreamEvent},
};

/// Immutable part of a stream plus its event queue.
pub(crate) struct StreamShared {
    pub(crate) index: usize,
    pub(crate) descriptor: StreamDescriptor,
    pub(crate) events: EventQueue<StreamEvent>,
}

impl StreamShared {
    pub(crate) fn new(index: usize, descriptor: StreamDescriptor) -> Self {
        Self {
            index,
            descriptor,
            events: EventQueue::new(),
        }
    }

    pub(crate) fn post(&self, event: StreamEvent) {
        if self.events.push(event).is_err() {
            debug!(
                "MediaStream {}: queue shut down, event dropped",
                self.descriptor.id
            );
        }
    }
}

/// Handle to one elementary stream of a [`MediaSource`](super::MediaSource).
///
/// Handles are cheap to clone and do not keep the source alive; once the
/// source is shut down or dropped every call reports `Shutdown`.
#[derive(Clone)]
pub struct MediaStream {
    shared: Arc<StreamShared>,
    source: Weak<SourceShared>,
}

impl MediaStream {
    pub(crate) fn new(shared: Arc<StreamShared>, source: Weak<SourceShared>) -> Self {
        Self { shared, source }
    }

    pub fn id(&self) -> u32 {
        self.shared.descriptor.id
    }

    pub fn descriptor(&self) -> Result<StreamDescriptor> {
        let source = self.source.upgrade().ok_or(SourceError::Shutdown)?;
        source.inner.lock().ensure_alive()?;
        Ok(self.shared.descriptor.clone())
    }

    /// Asks for the next sample. It arrives later as a
    /// [`StreamEvent::Sample`] carrying `token`.
    pub fn request_sample(&self, token: Option<Token>) -> Result<()> {
        let source = self.source.upgrade().ok_or(SourceError::Shutdown)?;
        let inner = source.inner.lock();
        inner.ensure_alive()?;

        let state = &inner.streams[self.shared.index];
        if !state.active {
            return Err(SourceError::WrongState);
        }
        if state.eos {
            return Err(SourceError::EndOfStream);
        }

        inner.submit(Command::RequestSample {
            stream: self.shared.index,
            token,
        })
    }

    /// Blocks until the next event.
    pub fn next_event(&self) -> Result<StreamEvent> {
        self.shared.events.next()
    }

    pub fn next_event_timeout(&self, timeout: Duration) -> Result<Option<StreamEvent>> {
        self.shared.events.next_timeout(timeout)
    }

    pub fn try_next_event(&self) -> Result<Option<StreamEvent>> {
        self.shared.events.try_next()
    }

    pub fn queue_event(&self, event: StreamEvent) -> Result<()> {
        self.shared.events.push(event)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.shared.descriptor.id)
            .field("kind", &self.shared.descriptor.kind())
            .finish()
    }
}

fn build_sample(buffer: BackendBuffer, token: Option<Token>) -> Result<Sample> {
    let size = buffer.size();
    let mut payload = Vec::new();
    payload
        .try_reserve_exact(size)
        .map_err(|_| SourceError::AllocationFailure(size))?;
    payload.extend_from_slice(&buffer.data);

    Ok(Sample {
        data: Bytes::from(payload),
        pts: buffer.pts,
        duration: buffer.duration,
        token,
    })
}

impl SourceShared {
    pub(crate) fn run_request_sample(
        &self,
        inner: &mut SourceInner,
        index: usize,
        token: Option<Token>,
    ) -> Result<()> {
        match inner.state {
            SourceState::Paused => {
                inner.streams[index].deferred.push_back(token);
                Ok(())
            }
            SourceState::Running => self.deliver_sample(inner, index, token),
            state => {
                debug!(
                    "MediaSource: dropping sample request for stream {} while {}",
                    index + 1,
                    state
                );
                Ok(())
            }
        }
    }

    fn deliver_sample(
        &self,
        inner: &mut SourceInner,
        index: usize,
        token: Option<Token>,
    ) -> Result<()> {
        let state = &inner.streams[index];
        if !state.active || state.eos {
            debug!(
                "MediaSource: stream {} no longer wants samples, request dropped",
                index + 1
            );
            return Ok(());
        }

        let resources = inner.resources.get().ok_or(SourceError::WrongState)?;
        let backend_index = resources
            .backend_index(index)
            .ok_or(SourceError::InvalidStream(index as u32 + 1))?;
        let stream = &self.streams[index];

        match resources.backend.pull_buffer(backend_index) {
            Ok(Some(buffer)) => {
                let sample = build_sample(buffer, token)?;
                stream.post(StreamEvent::Sample(sample));
                Ok(())
            }
            Ok(None) => {
                self.end_stream(inner, index);
                Ok(())
            }
            Err(e) => {
                stream.post(StreamEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn end_stream(&self, inner: &mut SourceInner, index: usize) {
        inner.streams[index].eos = true;
        self.streams[index].post(StreamEvent::EndOfStream);
        debug!("MediaSource: stream {} reached end of stream", index + 1);

        if inner.presentation_ended {
            return;
        }
        let all_done = inner
            .streams
            .iter()
            .filter(|s| s.active)
            .all(|s| s.eos);
        if all_done {
            inner.presentation_ended = true;
            self.post(SourceEvent::EndOfPresentation);
        }
    }
}
