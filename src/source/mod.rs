//! The media source: a pull-based state machine exposing elementary streams
//! while driving a demultiplexing backend.
//!
//! Public calls validate synchronously under the source lock and queue a
//! command; a single executor thread runs the commands in submission order,
//! each one holding the lock for its whole run. The backend and the read
//! thread feeding it are created on the first start and torn down by
//! [`MediaSource::shutdown`], which also runs on drop.

mod command;
pub mod constants;
pub mod mapper;
mod rate;
mod read_thread;
mod state;
mod stream;


use std::{
    sync::{Arc, Weak},
    thread::JoinHandle,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use self::{
    mapper::{NaturalOrder, ReverseGroupedByKind, StreamMapper, StreamOrderPolicy},
    rate::RateDirection,
    state::SourceState,
    stream::MediaStream,
};
use self::{
    command::{Command, CommandQueue},
    mapper::{StreamLayout, policy_for},
    state::SourceInner,
    stream::StreamShared,
};
use crate::{
    backend::BackendFactory,
    common::{Result, SharedByteSource, SourceError, StartPosition, TimeFormat},
    configs::SourceConfig,
    input::ByteSource,
    media::{EventQueue, PresentationDescriptor, SourceEvent},
};

/// What the source can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCharacteristics {
    pub can_seek: bool,
    pub can_pause: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SourceInfo {
    pub(crate) mime_type: String,
    pub(crate) total_size: u64,
    pub(crate) duration: Option<Duration>,
}

/// State shared between the public handle, stream handles and the executor.
pub(crate) struct SourceShared {
    weak_self: Weak<SourceShared>,
    pub(crate) inner: Mutex<SourceInner>,
    pub(crate) events: EventQueue<SourceEvent>,
    pub(crate) streams: Vec<Arc<StreamShared>>,
    pub(crate) byte_source: SharedByteSource,
    pub(crate) factory: Arc<dyn BackendFactory>,
    pub(crate) mapper: StreamMapper,
    pub(crate) layout: StreamLayout,
    pub(crate) info: SourceInfo,
    pub(crate) config: SourceConfig,
}

impl SourceShared {
    pub(crate) fn handle(&self, index: usize) -> MediaStream {
        MediaStream::new(self.streams[index].clone(), self.weak_self.clone())
    }

    pub(crate) fn post(&self, event: SourceEvent) {
        if self.events.push(event).is_err() {
            debug!("MediaSource: queue shut down, event dropped");
        }
    }
}

/// Exposes the elementary streams of a byte source.
pub struct MediaSource {
    shared: Arc<SourceShared>,
    executor: Mutex<Option<JoinHandle<()>>>,
}

impl MediaSource {
    /// Probes `byte_source` and builds a stopped source over its streams.
    pub fn open(
        byte_source: Box<dyn ByteSource>,
        factory: Arc<dyn BackendFactory>,
        config: &SourceConfig,
    ) -> Result<Self> {
        if !byte_source.is_seekable() {
            return Err(SourceError::NotSeekable);
        }
        let total_size = byte_source.length()?;
        let byte_source: SharedByteSource = Arc::new(Mutex::new(byte_source));

        let probe = factory.probe(&byte_source, config.probe_chunk_size)?;
        let mapper = StreamMapper::new(policy_for(config, &probe.mime_type));
        let layout = mapper.plan(&probe);
        if layout.is_empty() {
            return Err(SourceError::UnsupportedFormat(format!(
                "no streams found in {}",
                probe.mime_type
            )));
        }
        let (commands, receiver) = CommandQueue::new();

        let shared = Arc::new_cyclic(|weak_self| SourceShared {
            weak_self: weak_self.clone(),
            inner: Mutex::new(SourceInner::new(
                layout.len(),
                layout.default_active.clone(),
                commands,
            )),
            events: EventQueue::new(),
            streams: layout
                .descriptors
                .iter()
                .enumerate()
                .map(|(index, descriptor)| Arc::new(StreamShared::new(index, descriptor.clone())))
                .collect(),
            byte_source,
            factory,
            mapper,
            layout,
            info: SourceInfo {
                mime_type: probe.mime_type,
                total_size,
                duration: probe.duration,
            },
            config: config.clone(),
        });

        let executor =
            command::spawn_executor(shared.clone(), receiver, &config.executor_thread_name)?;
        shared.inner.lock().transition(SourceState::Stopped);

        info!(
            "MediaSource: opened {} ({} bytes, {} stream(s), {} ordering)",
            shared.info.mime_type,
            total_size,
            shared.streams.len(),
            shared.mapper.policy_name()
        );

        Ok(Self {
            shared,
            executor: Mutex::new(Some(executor)),
        })
    }

    pub fn state(&self) -> SourceState {
        self.shared.inner.lock().state
    }

    /// Starts, resumes or seeks. `descriptor` selects the streams to deliver.
    pub fn start(
        &self,
        descriptor: &PresentationDescriptor,
        time_format: TimeFormat,
        position: StartPosition,
    ) -> Result<()> {
        let inner = self.shared.inner.lock();
        inner.ensure_alive()?;
        if !time_format.is_default() {
            return Err(SourceError::UnsupportedTimeFormat);
        }
        inner.submit(Command::Start {
            descriptor: descriptor.clone(),
            time_format,
            position,
        })
    }

    pub fn pause(&self) -> Result<()> {
        let inner = self.shared.inner.lock();
        inner.ensure_alive()?;
        if inner.state != SourceState::Running {
            return Err(SourceError::WrongState);
        }
        inner.submit(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        let inner = self.shared.inner.lock();
        inner.ensure_alive()?;
        inner.submit(Command::Stop)
    }

    /// Tears everything down. Returns once the read thread and the command
    /// executor have exited; a second call fails with `Shutdown`.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut inner = self.shared.inner.lock();
            self.shared.run_shutdown(&mut inner)?;
        }

        if let Some(executor) = self.executor.lock().take() {
            if executor.join().is_err() {
                warn!("MediaSource: command executor panicked");
            }
        }
        Ok(())
    }

    pub fn characteristics(&self) -> Result<SourceCharacteristics> {
        self.shared.inner.lock().ensure_alive()?;
        Ok(SourceCharacteristics {
            can_seek: true,
            can_pause: true,
        })
    }

    /// Describes all streams; a stream is selected when it is active, or
    /// active by default before the first start.
    pub fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor> {
        let inner = self.shared.inner.lock();
        inner.ensure_alive()?;
        Ok(PresentationDescriptor::new(
            self.shared.layout.descriptors.clone(),
            inner.selection.clone(),
            self.shared.info.mime_type.clone(),
            self.shared.info.total_size,
            self.shared.info.duration,
        ))
    }

    pub fn streams(&self) -> Vec<MediaStream> {
        (0..self.shared.streams.len())
            .map(|index| self.shared.handle(index))
            .collect()
    }

    pub fn stream(&self, id: u32) -> Result<MediaStream> {
        match (id as usize).checked_sub(1) {
            Some(index) if index < self.shared.streams.len() => Ok(self.shared.handle(index)),
            _ => Err(SourceError::InvalidStream(id)),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.shared.info.mime_type
    }

    pub fn duration(&self) -> Option<Duration> {
        self.shared.info.duration
    }

    /// Blocks until the next source event.
    pub fn next_event(&self) -> Result<SourceEvent> {
        self.shared.events.next()
    }

    pub fn next_event_timeout(&self, timeout: Duration) -> Result<Option<SourceEvent>> {
        self.shared.events.next_timeout(timeout)
    }

    pub fn try_next_event(&self) -> Result<Option<SourceEvent>> {
        self.shared.events.try_next()
    }

    pub fn queue_event(&self, event: SourceEvent) -> Result<()> {
        self.shared.events.push(event)
    }

    #[cfg(test)]
    pub(crate) fn submitted_commands(&self) -> u64 {
        self.shared
            .inner
            .lock()
            .commands
            .as_ref()
            .map(CommandQueue::submitted)
            .unwrap_or(0)
    }
}

impl Drop for MediaSource {
    fn drop(&mut self) {
        if self.state() != SourceState::Shutdown {
            let _ = self.shutdown();
        }
    }
}
