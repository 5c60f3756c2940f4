use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use craftsync_persist::WorldConfig;

/// Process-level settings for a server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Where worlds are stored. `None` keeps them in memory only.
    pub data_dir: Option<PathBuf>,
    /// Settings given to worlds created without explicit ones.
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            data_dir: None,
            world: WorldConfig::default(),
        }
    }
}

/// Shortest interval a world ticks at, whatever its configured rate.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Interval between ticks. A rate of zero is treated as one tick per second.
pub fn tick_period(config: &WorldConfig) -> Duration {
    (Duration::from_secs(1) / config.tick_rate_hz.max(1)).max(MIN_TICK_PERIOD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_25ms() {
        assert_eq!(
            tick_period(&WorldConfig::default()),
            Duration::from_millis(25)
        );
    }

    #[test]
    fn zero_rate_does_not_divide_by_zero() {
        let config = WorldConfig {
            tick_rate_hz: 0,
            ..WorldConfig::default()
        };
        assert_eq!(tick_period(&config), Duration::from_secs(1));
    }

    #[test]
    fn huge_rate_never_yields_a_zero_period() {
        let config = WorldConfig {
            tick_rate_hz: 2_000_000_000,
            ..WorldConfig::default()
        };
        assert_eq!(tick_period(&config), MIN_TICK_PERIOD);
    }

    #[test]
    fn default_binds_localhost() {
        let config = ServerConfig::default();
        assert!(config.bind.ip().is_loopback());
        assert_eq!(config.bind.port(), 3000);
        assert!(config.data_dir.is_none());
    }
}
