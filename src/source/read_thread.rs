use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use tracing::{debug, error, warn};

use crate::{
    backend::{Backend, ReadRequest},
    common::{Result, SharedByteSource},
    input::read_fully,
};

/// Bytes that can actually be served for `request` from a source of
/// `total_size` bytes.
pub(crate) fn clamp_request(request: ReadRequest, total_size: u64) -> usize {
    if request.offset >= total_size {
        return 0;
    }
    let available = total_size - request.offset;
    (request.size as u64).min(available) as usize
}

/// Background thread answering the backend's byte requests.
pub(crate) struct ReadThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReadThread {
    pub(crate) fn spawn(
        backend: Arc<dyn Backend>,
        source: SharedByteSource,
        total_size: u64,
        buffer_size: usize,
        name: &str,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || read_loop(backend, source, total_size, buffer_size, flag))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Sets the stop flag and joins. The backend must already be
    /// disconnected or the thread may stay blocked on its next request.
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("ReadThread: thread panicked");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for ReadThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn read_loop(
    backend: Arc<dyn Backend>,
    source: SharedByteSource,
    total_size: u64,
    buffer_size: usize,
    stop: Arc<AtomicBool>,
) {
    let mut buffer: Vec<u8> = Vec::with_capacity(buffer_size);
    debug!("ReadThread: serving {} bytes", total_size);

    while !stop.load(Ordering::Acquire) {
        // A disconnected backend never asks again.
        let Some(request) = backend.next_read_request() else {
            break;
        };

        let size = clamp_request(request, total_size);
        if size == 0 {
            backend.push_bytes(Some(&[]));
            continue;
        }

        if buffer.len() < size {
            if buffer.try_reserve(size - buffer.len()).is_err() {
                error!("ReadThread: failed to allocate {} bytes", size);
                backend.push_bytes(None);
                continue;
            }
            buffer.resize(size, 0);
        }

        let result = {
            let mut source = source.lock();
            source
                .seek(request.offset)
                .and_then(|_| read_fully(&mut **source, &mut buffer[..size]))
        };

        match result {
            Ok(n) if n == size => backend.push_bytes(Some(&buffer[..n])),
            Ok(n) => {
                warn!(
                    "ReadThread: short read at {}: wanted {} bytes, got {}",
                    request.offset, size, n
                );
                backend.push_bytes(Some(&buffer[..n]));
            }
            Err(e) => {
                warn!(
                    "ReadThread: failed to read {} bytes at {}: {}",
                    size, request.offset, e
                );
                backend.push_bytes(None);
            }
        }
    }

    debug!("ReadThread: exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(offset: u64, size: usize) -> ReadRequest {
        ReadRequest { offset, size }
    }

    #[test]
    fn clamps_reads_to_source_length() {
        assert_eq!(clamp_request(request(0, 4096), 100), 100);
        assert_eq!(clamp_request(request(90, 20), 100), 10);
        assert_eq!(clamp_request(request(10, 20), 100), 20);
    }

    #[test]
    fn reads_at_or_past_end_are_empty() {
        assert_eq!(clamp_request(request(100, 20), 100), 0);
        assert_eq!(clamp_request(request(500, 1), 100), 0);
        assert_eq!(clamp_request(request(0, 0), 100), 0);
    }
}
