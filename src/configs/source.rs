use serde::{Deserialize, Serialize};

use crate::source::constants::{
    DEFAULT_PROBE_CHUNK_SIZE, DEFAULT_READ_BUFFER_SIZE, EXECUTOR_THREAD_NAME, READ_THREAD_NAME,
};

/// Tuning for a single media source.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    /// Header bytes read when sniffing the container.
    pub probe_chunk_size: usize,
    /// Initial capacity of the read thread's buffer.
    pub read_buffer_size: usize,
    /// Mime types whose streams are exposed grouped by kind in reverse order.
    pub reordered_mime_types: Vec<String>,
    pub executor_thread_name: String,
    pub read_thread_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            probe_chunk_size: DEFAULT_PROBE_CHUNK_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            reordered_mime_types: vec!["video/mp4".to_string()],
            executor_thread_name: EXECUTOR_THREAD_NAME.to_string(),
            read_thread_name: READ_THREAD_NAME.to_string(),
        }
    }
}

impl SourceConfig {
    pub fn reorders(&self, mime_type: &str) -> bool {
        self.reordered_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime_type))
    }
}
