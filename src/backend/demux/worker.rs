use std::{collections::VecDeque, sync::Arc, time::Duration};

use bytes::Bytes;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use symphonia::core::{
    codecs::{CODEC_TYPE_NULL, CodecParameters},
    errors::Error as DemuxError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track},
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
    units::{Time, TimeBase},
};
use tracing::{debug, warn};

use crate::{
    backend::BackendBuffer,
    common::{Result, SourceError},
    media::{AudioFormat, MediaFormat},
};

pub(super) enum WorkerCommand {
    Pull {
        track: usize,
        reply: Sender<Result<Option<BackendBuffer>>>,
    },
    Seek {
        position: Duration,
        reply: Sender<Result<()>>,
    },
}

#[derive(Debug, Clone)]
pub(super) struct TrackInfo {
    pub id: u32,
    pub format: MediaFormat,
    pub language: Option<String>,
    pub time_base: Option<TimeBase>,
    pub n_frames: Option<u64>,
}

impl TrackInfo {
    fn from_track(track: &Track) -> Self {
        Self {
            id: track.id,
            format: media_format(&track.codec_params),
            language: track.language.clone(),
            time_base: track.codec_params.time_base,
            n_frames: track.codec_params.n_frames,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        let frames = self.n_frames?;
        match self.time_base {
            Some(tb) => Some(to_duration(tb.calc_time(frames))),
            None => match &self.format {
                MediaFormat::Audio(AudioFormat {
                    sample_rate: Some(rate),
                    ..
                }) if *rate > 0 => Some(Duration::from_secs_f64(frames as f64 / *rate as f64)),
                _ => None,
            },
        }
    }

    fn timestamp(&self, ts: u64) -> Duration {
        self.time_base
            .map(|tb| to_duration(tb.calc_time(ts)))
            .unwrap_or_default()
    }
}

fn to_duration(time: Time) -> Duration {
    Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac)
}

fn media_format(params: &CodecParameters) -> MediaFormat {
    if params.codec == CODEC_TYPE_NULL {
        return MediaFormat::Unknown;
    }
    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|d| d.short_name.to_string())
        .unwrap_or_else(|| format!("{:?}", params.codec));
    MediaFormat::Audio(AudioFormat {
        codec,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count() as u16),
        bits_per_sample: params.bits_per_sample,
    })
}

/// Probes `source` and returns the reader with one `TrackInfo` per track.
pub(super) fn open_reader(
    source: Box<dyn MediaSource>,
    hint: &Hint,
) -> Result<(Box<dyn FormatReader>, Vec<TrackInfo>)> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SourceError::UnsupportedFormat(e.to_string()))?;

    let tracks = probed
        .format
        .tracks()
        .iter()
        .map(TrackInfo::from_track)
        .collect();
    Ok((probed.format, tracks))
}

/// Owns the format reader on the demux thread and answers pulls and seeks.
pub(super) struct DemuxWorker {
    format: Box<dyn FormatReader>,
    tracks: Vec<TrackInfo>,
    enabled: Arc<Mutex<Vec<bool>>>,
    queues: Vec<VecDeque<BackendBuffer>>,
    ended: bool,
}

impl DemuxWorker {
    pub(super) fn new(
        format: Box<dyn FormatReader>,
        tracks: Vec<TrackInfo>,
        enabled: Arc<Mutex<Vec<bool>>>,
    ) -> Self {
        let queues = tracks.iter().map(|_| VecDeque::new()).collect();
        Self {
            format,
            tracks,
            enabled,
            queues,
            ended: false,
        }
    }

    pub(super) fn run(mut self, commands: Receiver<WorkerCommand>) {
        while let Ok(command) = commands.recv() {
            match command {
                WorkerCommand::Pull { track, reply } => {
                    let _ = reply.send(self.pull(track));
                }
                WorkerCommand::Seek { position, reply } => {
                    let _ = reply.send(self.seek(position));
                }
            }
        }
        debug!("Demux worker: command channel closed, exiting");
    }

    fn pull(&mut self, track: usize) -> Result<Option<BackendBuffer>> {
        let enabled = self.enabled.lock().clone();
        if !enabled.get(track).copied().unwrap_or(false) {
            return Err(SourceError::backend(format!("track {} is not enabled", track)));
        }
        for (queue, on) in self.queues.iter_mut().zip(&enabled) {
            if !on {
                queue.clear();
            }
        }

        loop {
            if let Some(buffer) = self.queues[track].pop_front() {
                return Ok(Some(buffer));
            }
            if self.ended {
                return Ok(None);
            }

            match self.format.next_packet() {
                Ok(packet) => {
                    let Some(index) = self.tracks.iter().position(|t| t.id == packet.track_id())
                    else {
                        continue;
                    };
                    if !enabled[index] {
                        continue;
                    }
                    let info = &self.tracks[index];
                    let buffer = BackendBuffer {
                        pts: info.timestamp(packet.ts()),
                        duration: info.timestamp(packet.dur()),
                        data: Bytes::from(packet.data),
                    };
                    self.queues[index].push_back(buffer);
                }
                Err(DemuxError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Demux worker: end of container");
                    self.ended = true;
                }
                Err(DemuxError::ResetRequired) => {
                    debug!("Demux worker: track list changed, treating as end");
                    self.ended = true;
                }
                Err(e) => {
                    warn!("Demux worker: failed to read packet: {}", e);
                    return Err(SourceError::backend(e.to_string()));
                }
            }
        }
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        debug!("Demux worker: seeking to {:?}", position);
        self.format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time: Time::from(position.as_secs_f64()),
                    track_id: None,
                },
            )
            .map_err(|e| SourceError::backend(format!("seek failed: {}", e)))?;
        self.queues.iter_mut().for_each(VecDeque::clear);
        self.ended = false;
        Ok(())
    }
}
