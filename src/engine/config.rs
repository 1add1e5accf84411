//! Engine configuration options.

use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Funding rates kept per instrument.
    pub max_funding_history: usize,
    /// How often the funding controller wakes up to look for a due interval.
    pub funding_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            max_funding_history: 512,
            funding_tick_ms: 1_000,
        }
    }
}
