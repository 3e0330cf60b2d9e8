//! Configuration management for the RTSP/MJPEG server.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, rename = "server")]
    pub server: ServerSettings,
}

/// RTSP/RTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// TCP port the RTSP server listens on.
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,

    /// Address the TCP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Address advertised in SDP `o=`/`c=` lines and to clients.
    #[serde(default = "default_advertise_address")]
    pub advertise_address: String,

    /// Directory still-JPEG files are served from.
    #[serde(default = "default_src_dir")]
    pub src_dir: String,

    /// Maximum transmission unit (bytes) used to size RTP fragments.
    #[serde(default = "default_mtu")]
    pub mtu: usize,

    /// RTP synchronization source identifier.
    #[serde(default = "default_ssrc")]
    pub ssrc: u32,

    /// UDP port the publisher binds for outgoing RTP (RTCP uses the next
    /// port up).
    #[serde(default = "default_server_rtp_port")]
    pub server_rtp_port: u16,

    /// JPEG quantisation-table quality hint carried in the RFC 2435
    /// header's `Q` field.
    #[serde(default = "default_q")]
    pub q: u8,

    /// Publisher tick period, in milliseconds.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            rtsp_port: default_rtsp_port(),
            bind_address: default_bind_address(),
            advertise_address: default_advertise_address(),
            src_dir: default_src_dir(),
            mtu: default_mtu(),
            ssrc: default_ssrc(),
            server_rtp_port: default_server_rtp_port(),
            q: default_q(),
            tick_millis: default_tick_millis(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
        }
    }
}

fn default_rtsp_port() -> u16 {
    1025
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_advertise_address() -> String {
    "127.0.0.1".to_string()
}
fn default_src_dir() -> String {
    ".".to_string()
}
fn default_mtu() -> usize {
    1400
}
fn default_ssrc() -> u32 {
    0x1234_5678
}
fn default_server_rtp_port() -> u16 {
    6000
}
fn default_q() -> u8 {
    255
}
fn default_tick_millis() -> u64 {
    40
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let cfg = &self.server;

        if cfg.mtu < 500 || cfg.mtu > 9000 {
            return Err(ConfigError::Invalid(format!(
                "mtu must be between 500 and 9000, got {}",
                cfg.mtu
            )));
        }

        if cfg.rtsp_port == 0 {
            return Err(ConfigError::Invalid("rtsp_port must be > 0".to_string()));
        }

        if cfg.server_rtp_port == 0 || cfg.server_rtp_port == u16::MAX {
            return Err(ConfigError::Invalid(
                "server_rtp_port must leave room for the paired RTCP port".to_string(),
            ));
        }

        if cfg.tick_millis == 0 {
            return Err(ConfigError::Invalid("tick_millis must be > 0".to_string()));
        }

        Ok(())
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.rtsp_port, 1025);
        assert_eq!(config.server.mtu, 1400);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[server]
rtsp_port = 8554
bind_address = "0.0.0.0"
advertise_address = "192.168.1.10"
src_dir = "/srv/jpeg"
mtu = 1400
ssrc = 3735928559
server_rtp_port = 6200
q = 200
tick_millis = 40
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.server.rtsp_port, 8554);
        assert_eq!(config.server.advertise_address, "192.168.1.10");
        assert_eq!(config.server.src_dir, "/srv/jpeg");
        assert_eq!(config.server.q, 200);
    }

    #[test]
    fn test_invalid_mtu() {
        let toml = r#"
[server]
mtu = 10000
        "#;

        let result = Config::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_tick() {
        let toml = r#"
[server]
tick_millis = 0
        "#;

        let result = Config::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = Config::from_str(&toml_str).unwrap();

        assert_eq!(config.server.mtu, parsed.server.mtu);
    }
}
