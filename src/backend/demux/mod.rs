//! Demultiplexing backend built on symphonia's format readers.
//!
//! Only containers are parsed: buffers handed out are the compressed packets
//! exactly as stored, no decoding takes place. The format reader lives on its
//! own worker thread and reads through a [`reader::PullReader`], which turns
//! each read into a byte request for the media source's read thread.

mod reader;
mod worker;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use self::{
    reader::{Chunk, PullReader, ReadEvent, SharedSourceReader},
    worker::{DemuxWorker, TrackInfo, WorkerCommand, open_reader},
};
use crate::{
    backend::{
        Backend, BackendBuffer, BackendFactory, ProbeInfo, ProbedStream, ReadRequest,
        StreamCatalog,
        sniff::{Container, detect_container},
    },
    common::{Result, SharedByteSource, SourceError},
    input::read_fully,
    media::{MediaFormat, TagKind},
};

const WORKER_THREAD_NAME: &str = "symphonia-demux";

fn hint_for(container: Container, mime_type: &str) -> Hint {
    let mut hint = Hint::new();
    if let Some(ext) = container.extension() {
        hint.with_extension(ext);
    }
    hint.mime_type(mime_type);
    hint
}

/// Creates [`SymphoniaBackend`]s and probes byte sources for them.
#[derive(Debug, Default, Clone)]
pub struct SymphoniaBackendFactory {
    container: Arc<Mutex<Option<(Container, String)>>>,
}

impl SymphoniaBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendFactory for SymphoniaBackendFactory {
    fn probe(&self, source: &SharedByteSource, chunk_size: usize) -> Result<ProbeInfo> {
        let (len, content_type) = {
            let source = source.lock();
            (source.length()?, source.content_type())
        };

        let mut header = vec![0u8; chunk_size.min(len as usize)];
        {
            let mut source = source.lock();
            source.seek(0)?;
            let n = read_fully(&mut **source, &mut header)?;
            header.truncate(n);
        }

        let container = detect_container(&header);
        let mime_type = content_type.unwrap_or_else(|| container.mime_type().to_string());
        debug!(
            "SymphoniaBackend: sniffed {:?} ({}) from {} header bytes",
            container,
            mime_type,
            header.len()
        );

        let reader = SharedSourceReader::new(source.clone(), len);
        let (_, tracks) = open_reader(Box::new(reader), &hint_for(container, &mime_type))?;

        *self.container.lock() = Some((container, mime_type.clone()));

        Ok(ProbeInfo {
            duration: tracks.iter().find_map(TrackInfo::duration),
            streams: tracks
                .into_iter()
                .map(|t| ProbedStream {
                    format: t.format,
                    language: t.language,
                    name: None,
                })
                .collect(),
            mime_type,
        })
    }

    fn create(&self) -> Result<Arc<dyn Backend>> {
        let hint = match self.container.lock().as_ref() {
            Some((container, mime_type)) => hint_for(*container, mime_type),
            None => Hint::new(),
        };
        Ok(Arc::new(SymphoniaBackend::new(hint)))
    }
}

/// A symphonia format reader driven through the byte-pull protocol.
pub struct SymphoniaBackend {
    hint: Hint,
    requests_tx: Sender<ReadEvent>,
    requests_rx: Receiver<ReadEvent>,
    chunks_tx: Mutex<Option<Sender<Chunk>>>,
    chunks_rx: Mutex<Option<Receiver<Chunk>>>,
    commands: Mutex<Option<Sender<WorkerCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    tracks: Mutex<Vec<TrackInfo>>,
    enabled: Arc<Mutex<Vec<bool>>>,
    disconnected: AtomicBool,
}

impl SymphoniaBackend {
    pub fn new(hint: Hint) -> Self {
        let (requests_tx, requests_rx) = flume::unbounded();
        let (chunks_tx, chunks_rx) = flume::unbounded();
        Self {
            hint,
            requests_tx,
            requests_rx,
            chunks_tx: Mutex::new(Some(chunks_tx)),
            chunks_rx: Mutex::new(Some(chunks_rx)),
            commands: Mutex::new(None),
            worker: Mutex::new(None),
            tracks: Mutex::new(Vec::new()),
            enabled: Arc::new(Mutex::new(Vec::new())),
            disconnected: AtomicBool::new(false),
        }
    }

    fn worker_commands(&self) -> Result<Sender<WorkerCommand>> {
        self.commands
            .lock()
            .clone()
            .ok_or_else(|| SourceError::backend("backend is not connected"))
    }

    fn set_enabled(&self, index: usize, value: bool) -> Result<()> {
        let mut enabled = self.enabled.lock();
        let slot = enabled
            .get_mut(index)
            .ok_or(SourceError::InvalidStream(index as u32))?;
        *slot = value;
        Ok(())
    }
}

impl StreamCatalog for SymphoniaBackend {
    fn stream_count(&self) -> usize {
        self.tracks.lock().len()
    }

    fn preferred_format(&self, index: usize) -> Option<MediaFormat> {
        self.tracks.lock().get(index).map(|t| t.format.clone())
    }

    fn tag(&self, index: usize, kind: TagKind) -> Option<String> {
        match kind {
            TagKind::Language => self.tracks.lock().get(index)?.language.clone(),
            TagKind::Name => None,
        }
    }
}

impl Backend for SymphoniaBackend {
    fn connect(&self, total_size: u64) -> Result<()> {
        let chunks_rx = self
            .chunks_rx
            .lock()
            .take()
            .ok_or_else(|| SourceError::backend("backend already connected"))?;
        let reader = PullReader::new(self.requests_tx.clone(), chunks_rx, total_size);

        let (ready_tx, ready_rx) = flume::bounded(1);
        let (commands_tx, commands_rx) = flume::unbounded();
        let hint = self.hint.clone();
        let enabled = self.enabled.clone();

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || match open_reader(Box::new(reader), &hint) {
                Ok((format, tracks)) => {
                    *enabled.lock() = vec![false; tracks.len()];
                    let _ = ready_tx.send(Ok(tracks.clone()));
                    DemuxWorker::new(format, tracks, enabled).run(commands_rx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;
        *self.worker.lock() = Some(handle);

        let tracks = ready_rx
            .recv()
            .map_err(|_| SourceError::backend("demux worker exited during connect"))??;
        info!(
            "SymphoniaBackend: connected to {} bytes, {} track(s)",
            total_size,
            tracks.len()
        );
        *self.tracks.lock() = tracks;
        *self.commands.lock() = Some(commands_tx);
        Ok(())
    }

    fn enable(&self, index: usize, format: &MediaFormat) -> Result<()> {
        debug!("SymphoniaBackend: enabling track {} as {}", index, format);
        self.set_enabled(index, true)
    }

    fn disable(&self, index: usize) -> Result<()> {
        self.set_enabled(index, false)
    }

    fn seek(&self, rate: f32, position: Duration) -> Result<()> {
        debug!("SymphoniaBackend: seek to {:?} at rate {}", position, rate);
        let (reply, response) = flume::bounded(1);
        self.worker_commands()?
            .send(WorkerCommand::Seek { position, reply })
            .map_err(|_| SourceError::backend("demux worker is gone"))?;
        response
            .recv()
            .map_err(|_| SourceError::backend("demux worker is gone"))?
    }

    fn next_read_request(&self) -> Option<ReadRequest> {
        if self.disconnected.load(Ordering::Acquire) {
            return None;
        }
        match self.requests_rx.recv() {
            Ok(ReadEvent::Request(request)) => Some(request),
            Ok(ReadEvent::Disconnected) | Err(_) => None,
        }
    }

    fn push_bytes(&self, data: Option<&[u8]>) {
        if let Some(chunks) = self.chunks_tx.lock().as_ref() {
            let chunk = match data {
                Some(bytes) => Chunk::Data(bytes.to_vec()),
                None => Chunk::Failed,
            };
            let _ = chunks.send(chunk);
        }
    }

    fn pull_buffer(&self, index: usize) -> Result<Option<BackendBuffer>> {
        let (reply, response) = flume::bounded(1);
        self.worker_commands()?
            .send(WorkerCommand::Pull {
                track: index,
                reply,
            })
            .map_err(|_| SourceError::backend("demux worker is gone"))?;
        response
            .recv()
            .map_err(|_| SourceError::backend("demux worker is gone"))?
    }

    fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.requests_tx.send(ReadEvent::Disconnected);
        // Dropping both senders unblocks a worker waiting on a chunk or a command.
        self.chunks_tx.lock().take();
        self.commands.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        info!("SymphoniaBackend: disconnected");
    }
}

impl Drop for SymphoniaBackend {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::thread;

    use super::*;
    use crate::input::{ByteSource, MemoryByteSource};

    /// 16-bit mono PCM at 8 kHz.
    pub(crate) fn wav_bytes(frames: usize) -> Vec<u8> {
        let data_len = (frames * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8000u32.to_le_bytes());
        out.extend_from_slice(&16000u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend((0..frames).flat_map(|i| ((i % 512) as i16 * 16).to_le_bytes()));
        out
    }

    fn shared(data: Vec<u8>) -> SharedByteSource {
        Arc::new(Mutex::new(
            Box::new(MemoryByteSource::from_vec(data)) as Box<dyn ByteSource>
        ))
    }

    #[test]
    fn probe_reports_wav_track() {
        let factory = SymphoniaBackendFactory::new();
        let info = factory.probe(&shared(wav_bytes(4000)), 4096).unwrap();

        assert_eq!(info.mime_type, "audio/wav");
        assert_eq!(info.streams.len(), 1);
        match &info.streams[0].format {
            MediaFormat::Audio(audio) => {
                assert_eq!(audio.sample_rate, Some(8000));
                assert_eq!(audio.channels, Some(1));
            }
            other => panic!("unexpected format {:?}", other),
        }
        let duration = info.duration.unwrap();
        assert!((duration.as_secs_f64() - 0.5).abs() < 0.01);
    }

    #[test]
    fn probe_rejects_garbage() {
        let factory = SymphoniaBackendFactory::new();
        let result = factory.probe(&shared(vec![0x42; 2048]), 4096);
        assert!(matches!(result, Err(SourceError::UnsupportedFormat(_))));
    }

    #[test]
    fn serves_all_packets_through_the_pull_protocol() {
        let data = wav_bytes(4000);
        let total = data.len() as u64;
        let factory = SymphoniaBackendFactory::new();
        factory.probe(&shared(data.clone()), 4096).unwrap();
        let backend = factory.create().unwrap();

        let server = {
            let backend = backend.clone();
            thread::spawn(move || {
                while let Some(request) = backend.next_read_request() {
                    let start = (request.offset as usize).min(data.len());
                    let end = (start + request.size).min(data.len());
                    backend.push_bytes(Some(&data[start..end]));
                }
            })
        };

        backend.connect(total).unwrap();
        assert_eq!(backend.stream_count(), 1);
        let format = backend.preferred_format(0).unwrap();
        backend.enable(0, &format).unwrap();
        backend.seek(1.0, Duration::ZERO).unwrap();

        let mut bytes = 0;
        let mut last_pts = None;
        while let Some(buffer) = backend.pull_buffer(0).unwrap() {
            if let Some(prev) = last_pts {
                assert!(buffer.pts > prev);
            }
            last_pts = Some(buffer.pts);
            bytes += buffer.size();
        }
        assert_eq!(bytes, 8000);
        assert!(backend.pull_buffer(0).unwrap().is_none());

        backend.disconnect();
        server.join().unwrap();
        assert!(backend.next_read_request().is_none());
    }
}
