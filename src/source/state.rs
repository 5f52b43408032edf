use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use super::{
    SourceShared,
    command::{Command, CommandQueue},
    mapper::{StreamLayout, StreamMapper, exclusive_conflicts},
    read_thread::ReadThread,
};
use crate::{
    backend::{Backend, BackendFactory},
    common::{Result, SharedByteSource, SourceError, StartPosition, TimeFormat, Token},
    configs::SourceConfig,
    media::{PresentationDescriptor, SourceEvent, StreamEvent},
};

/// Lifecycle of a media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Opening,
    Stopped,
    Paused,
    Running,
    /// Terminal.
    Shutdown,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceState::Opening => "opening",
            SourceState::Stopped => "stopped",
            SourceState::Paused => "paused",
            SourceState::Running => "running",
            SourceState::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Mutable per-stream state, guarded by the source lock.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    pub(crate) active: bool,
    pub(crate) eos: bool,
    /// Requests made while paused, in submission order.
    pub(crate) deferred: VecDeque<Option<Token>>,
}

/// Backend, read thread and stream map, created together on the first start
/// and torn down together on shutdown.
pub(crate) struct PlaybackResources {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) stream_map: Vec<usize>,
    read_thread: ReadThread,
}

impl PlaybackResources {
    fn open(
        factory: &dyn BackendFactory,
        byte_source: &SharedByteSource,
        total_size: u64,
        config: &SourceConfig,
        mapper: &StreamMapper,
        layout: &StreamLayout,
    ) -> Result<Self> {
        let backend = factory.create()?;
        let read_thread = ReadThread::spawn(
            backend.clone(),
            byte_source.clone(),
            total_size,
            config.read_buffer_size,
            &config.read_thread_name,
        )?;
        let mut resources = Self {
            backend,
            stream_map: Vec::new(),
            read_thread,
        };

        // On failure the drop below disconnects and joins.
        resources.backend.connect(total_size)?;
        resources.stream_map = mapper.bind(layout, &*resources.backend);
        info!(
            "MediaSource: backend connected, {} stream(s), map {:?}",
            resources.backend.stream_count(),
            resources.stream_map
        );
        Ok(resources)
    }

    /// Backend index bound to logical stream `index`.
    pub(crate) fn backend_index(&self, index: usize) -> Option<usize> {
        match self.stream_map.get(index).copied() {
            Some(0) | None => None,
            Some(mapped) => Some(mapped - 1),
        }
    }
}

impl Drop for PlaybackResources {
    fn drop(&mut self) {
        self.backend.disconnect();
        self.read_thread.stop();
    }
}

pub(crate) enum ResourceSlot {
    Unopened,
    Open(PlaybackResources),
    /// Opening failed; later starts report the same failure.
    Failed(String),
    Released,
}

impl ResourceSlot {
    pub(crate) fn get(&self) -> Option<&PlaybackResources> {
        match self {
            ResourceSlot::Open(resources) => Some(resources),
            _ => None,
        }
    }
}

pub(crate) struct SourceInner {
    pub(crate) state: SourceState,
    pub(crate) rate: f32,
    pub(crate) streams: Vec<StreamState>,
    /// Selection reported by new presentation descriptors.
    pub(crate) selection: Vec<bool>,
    pub(crate) resources: ResourceSlot,
    pub(crate) presentation_ended: bool,
    pub(crate) commands: Option<CommandQueue>,
}

impl SourceInner {
    pub(crate) fn new(stream_count: usize, selection: Vec<bool>, commands: CommandQueue) -> Self {
        Self {
            state: SourceState::Opening,
            rate: 1.0,
            streams: (0..stream_count).map(|_| StreamState::default()).collect(),
            selection,
            resources: ResourceSlot::Unopened,
            presentation_ended: false,
            commands: Some(commands),
        }
    }

    pub(crate) fn transition(&mut self, to: SourceState) {
        if self.state != to {
            debug!("MediaSource: {} -> {}", self.state, to);
        }
        self.state = to;
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        match self.state {
            SourceState::Shutdown => Err(SourceError::Shutdown),
            _ => Ok(()),
        }
    }

    pub(crate) fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(SourceError::Shutdown)?
            .submit(command)
    }

    /// Serves or discards every stream's deferred requests.
    fn flush_deferred(&mut self, serve: bool) {
        for (index, stream) in self.streams.iter_mut().enumerate() {
            if stream.deferred.is_empty() {
                continue;
            }
            if !serve {
                debug!(
                    "MediaSource: discarding {} deferred request(s) on stream {}",
                    stream.deferred.len(),
                    index + 1
                );
                stream.deferred.clear();
                continue;
            }
            for token in stream.deferred.drain(..) {
                let command = Command::RequestSample {
                    stream: index,
                    token,
                };
                let queued = self.commands.as_ref().map(|queue| queue.submit(command));
                if !matches!(queued, Some(Ok(()))) {
                    warn!("MediaSource: failed to requeue deferred request on stream {}", index + 1);
                }
            }
        }
    }
}

impl SourceShared {
    pub(crate) fn run_start(
        &self,
        inner: &mut SourceInner,
        descriptor: &PresentationDescriptor,
        time_format: TimeFormat,
        position: StartPosition,
    ) -> Result<()> {
        if !time_format.is_default() {
            return Err(SourceError::UnsupportedTimeFormat);
        }

        if matches!(inner.resources, ResourceSlot::Unopened) {
            let opened = PlaybackResources::open(
                &*self.factory,
                &self.byte_source,
                self.info.total_size,
                &self.config,
                &self.mapper,
                &self.layout,
            );
            inner.resources = match opened {
                Ok(resources) => ResourceSlot::Open(resources),
                Err(e) => ResourceSlot::Failed(e.to_string()),
            };
        }
        let (backend, stream_map) = match &inner.resources {
            ResourceSlot::Open(resources) => (resources.backend.clone(), resources.stream_map.clone()),
            ResourceSlot::Failed(message) => return Err(SourceError::backend(message.clone())),
            _ => return Err(SourceError::WrongState),
        };

        let starting = inner.state == SourceState::Stopped;
        let position = match position {
            StartPosition::Current if starting => StartPosition::At(Duration::ZERO),
            other => other,
        };
        let seek_message = !starting && position.is_set();

        let count = self.streams.len();
        let mut selected = vec![false; count];
        for id in descriptor.selected_ids() {
            match (id as usize).checked_sub(1).filter(|&i| i < count) {
                Some(index) => selected[index] = true,
                None => warn!("MediaSource: ignoring selection of unknown stream {}", id),
            }
        }
        for kind in exclusive_conflicts(&self.layout.descriptors, &selected) {
            warn!(
                "MediaSource: more than one exclusive {} stream selected",
                kind
            );
        }

        for (index, stream) in self.streams.iter().enumerate() {
            let state = &mut inner.streams[index];
            let was_active = !starting && state.active;
            if position.is_set() || (selected[index] && !state.active) {
                state.eos = false;
            }
            state.active = selected[index];

            let mapped = stream_map.get(index).copied().unwrap_or(0);
            if !state.active {
                if mapped != 0 {
                    if let Err(e) = backend.disable(mapped - 1) {
                        warn!("MediaSource: failed to disable stream {}: {}", index + 1, e);
                    }
                }
                continue;
            }

            if mapped == 0 {
                warn!("MediaSource: stream {} is not bound to the backend", index + 1);
            } else if let Some(format) = backend.preferred_format(mapped - 1) {
                if let Err(e) = backend.enable(mapped - 1, &format) {
                    warn!("MediaSource: failed to enable stream {}: {}", index + 1, e);
                }
            }

            let handle = self.handle(index);
            self.post(match was_active {
                true => SourceEvent::UpdatedStream(handle),
                false => SourceEvent::NewStream(handle),
            });
            stream.post(match (seek_message, position) {
                (true, StartPosition::At(time)) => StreamEvent::Seeked { position: time },
                _ => StreamEvent::Started {
                    position: position.time(),
                },
            });
        }

        if let StartPosition::At(time) = position {
            if let Err(e) = backend.seek(inner.rate, time) {
                warn!("MediaSource: backend seek to {:?} failed: {}", time, e);
            }
        }

        inner.flush_deferred(!position.is_set());
        inner.presentation_ended = false;
        inner.selection = selected;
        inner.transition(SourceState::Running);

        self.post(match (seek_message, position) {
            (true, StartPosition::At(time)) => SourceEvent::Seeked { position: time },
            _ => SourceEvent::Started {
                position: position.time(),
            },
        });
        Ok(())
    }

    pub(crate) fn run_pause(&self, inner: &mut SourceInner) -> Result<()> {
        if inner.state != SourceState::Running {
            return Err(SourceError::WrongState);
        }

        for (stream, state) in self.streams.iter().zip(&inner.streams) {
            if state.active {
                stream.post(StreamEvent::Paused);
            }
        }
        inner.transition(SourceState::Paused);
        self.post(SourceEvent::Paused);
        Ok(())
    }

    pub(crate) fn run_stop(&self, inner: &mut SourceInner) -> Result<()> {
        if !matches!(inner.state, SourceState::Running | SourceState::Paused) {
            return Err(SourceError::WrongState);
        }

        for (stream, state) in self.streams.iter().zip(&inner.streams) {
            if state.active {
                stream.post(StreamEvent::Stopped);
            }
        }
        inner.transition(SourceState::Stopped);
        inner.flush_deferred(false);
        self.post(SourceEvent::Stopped);
        Ok(())
    }

    /// Terminal transition. Joins the read thread before returning.
    pub(crate) fn run_shutdown(&self, inner: &mut SourceInner) -> Result<()> {
        inner.ensure_alive()?;
        info!("MediaSource: shutting down");
        inner.transition(SourceState::Shutdown);

        // Disconnects the backend, then stops and joins the read thread.
        inner.resources = ResourceSlot::Released;
        self.byte_source.lock().close();

        self.events.shutdown();
        for (stream, state) in self.streams.iter().zip(inner.streams.iter_mut()) {
            stream.events.shutdown();
            state.deferred.clear();
            state.active = false;
        }
        inner.commands = None;
        Ok(())
    }
}
