//! Runtime configuration handed to the core as plain values.

use std::net::SocketAddr;
use std::ops::Range;
use std::time::Duration;

/// Everything the server needs for one process.
///
/// The binary builds this from command-line flags; the timing knobs keep
/// their defaults outside of tests.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub listen: SocketAddr,
    /// Deadline for the signaling window. `None` waits indefinitely.
    pub game_timeout: Option<Duration>,
    /// Enables the non-essential replies (unknown-input hint, farewell).
    pub diagnostics: bool,
    /// Cadence of the matchmaker's pairing attempts.
    pub matchmaker_tick: Duration,
    /// Minimum time a queued connection must wait before it may be paired.
    pub eligibility: Duration,
    /// Each countdown step's delay is drawn uniformly from this range,
    /// in seconds.
    pub countdown_delay: Range<f64>,
    /// Pause between outcome delivery and socket teardown, so the last
    /// lines flush before the close.
    pub flush_grace: Duration,
}

impl ServerConfig {
    pub fn new(listen: SocketAddr, game_timeout: Option<Duration>, diagnostics: bool) -> Self {
        Self {
            listen,
            game_timeout,
            diagnostics,
            matchmaker_tick: Duration::from_secs(1),
            eligibility: Duration::from_secs(1),
            countdown_delay: 2.0..4.0,
            flush_grace: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_knobs() {
        let config = ServerConfig::new("127.0.0.1:31337".parse().unwrap(), None, false);

        assert_eq!(config.matchmaker_tick, Duration::from_secs(1));
        assert_eq!(config.eligibility, Duration::from_secs(1));
        assert_eq!(config.countdown_delay, 2.0..4.0);
        assert_eq!(config.flush_grace, Duration::from_millis(500));
        assert!(config.game_timeout.is_none());
        assert!(!config.diagnostics);
    }

    #[test]
    fn test_timeout_passthrough() {
        let timeout = Duration::from_secs_f64(5.0);
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), Some(timeout), true);

        assert_eq!(config.game_timeout, Some(timeout));
        assert!(config.diagnostics);
    }
}
