use std::time::Duration;

use serde::Deserialize;

use crate::registry::DEFAULT_BACKLOG_CAPACITY;

/// Tunables for the realtime layer, read from the `[realtime]` settings table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Events retained per group for late joiners.
    pub backlog_capacity: usize,
    /// Seconds between heartbeats on an idle stream.
    pub heartbeat_secs: u64,
    /// Outbound buffer per client stream.
    pub sink_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            heartbeat_secs: 30,
            sink_buffer: 64,
        }
    }
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    /// Buffer size for a new client's sink.
    ///
    /// Large enough to hold the `connected` event plus a full backlog replay.
    pub fn sink_capacity(&self) -> usize {
        self.sink_buffer.max(self.backlog_capacity + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = RealtimeConfig::default();
        assert_eq!(config.backlog_capacity, 50);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.sink_capacity(), 64);
    }

    #[test]
    fn sink_capacity_fits_a_full_replay() {
        let config = RealtimeConfig {
            backlog_capacity: 100,
            heartbeat_secs: 0,
            sink_buffer: 8,
        };
        assert_eq!(config.sink_capacity(), 102);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }
}
