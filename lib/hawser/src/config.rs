use serde_derive::Deserialize;
use std::time::Duration;

/// Timer periods driving the liveness protocol, in seconds. The defaults honor the required
/// ordering `ping_frequency < ping_timeout < connection_timeout`; owners tuning the values
/// are expected to preserve it.
#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    ping_frequency: u64,
    ping_timeout: u64,
    connection_timeout: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            ping_frequency: 30,
            ping_timeout: 60,
            connection_timeout: 120,
        }
    }
}

impl Config {
    /// Parses a config from a TOML document. Missing keys fall back to the defaults.
    #[inline]
    pub fn from_toml_str(toml: &str) -> Result<Config, serdeconv::Error> {
        serdeconv::from_toml_str(toml)
    }

    /// How often a ping is emitted on an idle session.
    #[inline]
    pub fn ping_frequency(&self) -> Duration {
        Duration::from_secs(self.ping_frequency)
    }

    /// How long an outstanding ping may go unanswered.
    #[inline]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout)
    }

    /// Absolute deadline for connect + handshake, and the idle ceiling once confirmed.
    #[inline]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ordering() {
        let config = Config::default();

        assert!(config.ping_frequency() < config.ping_timeout());
        assert!(config.ping_timeout() < config.connection_timeout());
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
ping_frequency = 5
ping_timeout = 10
"#,
        )
        .unwrap();

        assert_eq!(config.ping_frequency(), Duration::from_secs(5));
        assert_eq!(config.ping_timeout(), Duration::from_secs(10));
        assert_eq!(config.connection_timeout(), Duration::from_secs(120));
    }
}
