//! Tunables shared by the media source and its worker threads.

// ── I/O ─────────────────────────────────────────────────────────────────────

/// Bytes read from the head of a byte source when sniffing its container.
pub const DEFAULT_PROBE_CHUNK_SIZE: usize = 4096;

/// Initial capacity of the read thread's buffer; grown on demand.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

// ── Threads ─────────────────────────────────────────────────────────────────

pub const EXECUTOR_THREAD_NAME: &str = "media-source-cmd";
pub const READ_THREAD_NAME: &str = "media-source-read";

// ── Rate control ────────────────────────────────────────────────────────────

/// Largest playback rate magnitude accepted by `is_rate_supported`.
pub const MAX_PLAYBACK_RATE: f32 = 1e6;
pub const SLOWEST_PLAYBACK_RATE: f32 = 0.0;
