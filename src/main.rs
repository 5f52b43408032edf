use std::{sync::Arc, time::Duration};

use media_source::{
    MediaSource, StartPosition, TimeFormat, Token,
    backend::SymphoniaBackendFactory,
    common::{AnyResult, logger},
    configs::Config,
    input::FileByteSource,
    media::{SourceEvent, StreamEvent},
    source::MediaStream,
};
use tracing::{debug, info, warn};

const DEFAULT_SAMPLES_PER_STREAM: usize = 16;
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> AnyResult<()> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: media-source <file> [samples-per-stream]");
        std::process::exit(2);
    };
    let samples_per_stream = match args.next() {
        Some(n) => n.parse()?,
        None => DEFAULT_SAMPLES_PER_STREAM,
    };

    let config = Config::load()?;
    logger::init(&config);

    let source = MediaSource::open(
        Box::new(FileByteSource::open(&path)?),
        Arc::new(SymphoniaBackendFactory::new()),
        &config.source,
    )?;

    let presentation = source.create_presentation_descriptor()?;
    info!(
        "{}: {} ({} bytes, duration {:?})",
        path,
        presentation.mime_type(),
        presentation.total_size(),
        presentation.duration()
    );
    for (stream, selected) in presentation.streams() {
        info!(
            "  stream {}: {} lang={} exclusive={} selected={}",
            stream.id,
            stream.format,
            stream.language.as_deref().unwrap_or("-"),
            stream.mutually_exclusive,
            selected
        );
    }

    source.start(&presentation, TimeFormat::Default, StartPosition::Current)?;

    let mut active = Vec::new();
    loop {
        match source.next_event_timeout(EVENT_TIMEOUT)? {
            Some(SourceEvent::NewStream(stream)) | Some(SourceEvent::UpdatedStream(stream)) => {
                active.push(stream)
            }
            Some(SourceEvent::Started { .. }) => break,
            Some(other) => info!("source event: {:?}", other),
            None => return Err("timed out waiting for the source to start".into()),
        }
    }

    for stream in &active {
        for n in 0..samples_per_stream {
            if let Err(e) = stream.request_sample(Some(Token::new(n))) {
                info!("stream {}: {}", stream.id(), e);
                break;
            }
            if !log_next_sample(stream)? {
                break;
            }
        }
    }

    while let Some(event) = source.try_next_event()? {
        if matches!(event, SourceEvent::EndOfPresentation) {
            info!("end of presentation");
        }
    }

    source.stop()?;
    source.shutdown()?;
    Ok(())
}

/// Waits for the answer to one sample request. `false` once the stream has
/// nothing more to give.
fn log_next_sample(stream: &MediaStream) -> AnyResult<bool> {
    loop {
        match stream.next_event_timeout(EVENT_TIMEOUT)? {
            Some(StreamEvent::Sample(sample)) => {
                info!(
                    "stream {} sample #{}: {} bytes pts={:?} duration={:?}",
                    stream.id(),
                    sample
                        .token
                        .as_ref()
                        .and_then(|t| t.downcast_ref::<usize>())
                        .copied()
                        .unwrap_or_default(),
                    sample.data.len(),
                    sample.pts,
                    sample.duration
                );
                return Ok(true);
            }
            Some(StreamEvent::EndOfStream) => {
                info!("stream {}: end of stream", stream.id());
                return Ok(false);
            }
            Some(StreamEvent::Error { message }) => {
                warn!("stream {}: {}", stream.id(), message);
                return Ok(false);
            }
            Some(other) => debug!("stream {} event: {:?}", stream.id(), other),
            None => {
                let message = format!("stream {}: timed out waiting for a sample", stream.id());
                return Err(message.into());
            }
        }
    }
}
