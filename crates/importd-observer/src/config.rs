use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub poll_interval: Duration,
    pub ping_interval: Duration,
    pub animation_tick: Duration,
    /// Wait between seeing a terminal status and the one final refresh.
    pub terminal_refresh_delay: Duration,
    /// Bound on every HTTP request; the poll and ping tasks await requests inline.
    pub request_timeout: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            ping_interval: Duration::from_secs(5),
            animation_tick: Duration::from_millis(20),
            terminal_refresh_delay: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(10),
        }
    }
}
