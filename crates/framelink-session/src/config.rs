use std::time::Duration;

/// How long to wait for an acknowledgment before resending.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Resends after the initial attempt before a frame is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Period of the dispatch heartbeat.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Size of the buffer handed to the byte source per read.
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Retry policy of the send scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Acknowledgment wait per attempt.
    pub ack_timeout: Duration,
    /// Resends allowed after the first attempt.
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SchedulerConfig {
    /// Worst-case time from first transmission to a final send result.
    pub fn delivery_deadline(&self) -> Duration {
        self.ack_timeout * (self.max_retries + 1)
    }
}

/// Runtime settings of a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Dispatch heartbeat period; also bounds ack-timeout precision.
    pub tick_interval: Duration,
    /// Read buffer size for the receive thread.
    pub read_chunk_size: usize,
    /// Retry policy.
    pub scheduler: SchedulerConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            read_chunk_size: DEFAULT_READ_CHUNK,
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.tick_interval, Duration::from_millis(50));
        assert_eq!(cfg.scheduler.ack_timeout, Duration::from_secs(3));
        assert_eq!(cfg.scheduler.max_retries, 3);
        assert_eq!(cfg.scheduler.delivery_deadline(), Duration::from_secs(12));
    }
}
