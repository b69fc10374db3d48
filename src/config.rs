//! Runtime configuration for a voice session
//!
//! All values have defaults matching the behavior the rest of the
//! pipeline was tuned against; they are exposed so the recency window
//! and the silence priming length are not buried as magic numbers.

use serde::Deserialize;
use std::time::Duration;

/// Configuration for one voice connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Maximum age of a queued decoded frame still eligible for the
    /// combined mix, in milliseconds
    pub recency_window_ms: u64,

    /// Number of leading silence packets sent after activation, before
    /// real audio starts
    pub silence_prime_frames: u32,

    /// Blocking read timeout of the receive loop, in milliseconds.
    /// Short enough that shutdown requests are observed promptly.
    pub receive_timeout_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            recency_window_ms: 100,
            silence_prime_frames: 11,
            receive_timeout_ms: 1000,
        }
    }
}

impl VoiceConfig {
    /// Recency window as a [`Duration`]
    pub fn recency_window(&self) -> Duration {
        Duration::from_millis(self.recency_window_ms)
    }

    /// Receive loop read timeout as a [`Duration`]
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}
