//! Configuration types for the radio transport
//!
//! This module provides the link settings (device, baud rate), payload and
//! compression options, and the timeout/retry behavior of the transport.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RadioError, Result};

/// Default baud rate for LoRaWAN AT-command modules
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default device path
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Default maximum payload per transmission (LoRaWAN DR3+ in most regions)
pub const DEFAULT_MAX_PAYLOAD: usize = 222;

/// Bytes reserved per fragment for fragment framing
pub const FRAGMENT_OVERHEAD: usize = 10;

/// Default acknowledgement timeout
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 10000;

/// Default number of transmission attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default keep-alive interval
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Default base delay for exponential backoff
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Compression level advertised in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Standard compression
    #[default]
    Normal,
    /// High compression (sets the high-compression header bit)
    High,
}

impl CompressionLevel {
    /// Whether the high-compression header bit is set
    pub fn is_high(&self) -> bool {
        matches!(self, CompressionLevel::High)
    }
}

impl std::str::FromStr for CompressionLevel {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(CompressionLevel::Normal),
            "high" => Ok(CompressionLevel::High),
            other => Err(RadioError::InvalidConfig(format!(
                "unknown compression level '{}'",
                other
            ))),
        }
    }
}

/// Main configuration for the radio transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Serial/radio endpoint identifier (e.g., /dev/ttyUSB0, COM3)
    #[serde(default = "default_device")]
    pub device: String,

    /// Baud rate (default: 115200)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Largest payload the link carries in one transmission
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,

    /// Compression level advertised in frame headers
    #[serde(default)]
    pub compression: CompressionLevel,

    /// How long to wait for a reply to each transmission
    #[serde(with = "humantime_serde", default = "default_ack_timeout")]
    pub ack_timeout: Duration,

    /// Total transmission attempts per frame or fragment
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Keep-alive interval (informational at this layer)
    #[serde(with = "humantime_serde", default = "default_keep_alive")]
    pub keep_alive_interval: Duration,

    /// Base delay for exponential backoff between attempts
    #[serde(with = "humantime_serde", default = "default_retry_base_delay")]
    pub retry_base_delay: Duration,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

fn default_ack_timeout() -> Duration {
    Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS)
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS)
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS)
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: DEFAULT_BAUD_RATE,
            max_payload: DEFAULT_MAX_PAYLOAD,
            compression: CompressionLevel::Normal,
            ack_timeout: default_ack_timeout(),
            max_retries: DEFAULT_MAX_RETRIES,
            keep_alive_interval: default_keep_alive(),
            retry_base_delay: default_retry_base_delay(),
        }
    }
}

impl RadioConfig {
    /// Create a new config builder
    pub fn builder() -> RadioConfigBuilder {
        RadioConfigBuilder::new()
    }

    /// Check the values the transport relies on
    pub fn validate(&self) -> Result<()> {
        if self.max_payload <= FRAGMENT_OVERHEAD {
            return Err(RadioError::InvalidConfig(format!(
                "max_payload must exceed {} bytes, got {}",
                FRAGMENT_OVERHEAD, self.max_payload
            )));
        }
        if self.max_retries == 0 {
            return Err(RadioError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.ack_timeout.is_zero() {
            return Err(RadioError::InvalidConfig(
                "ack_timeout must be non-zero".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(RadioError::InvalidConfig(
                "baud_rate must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for RadioConfig
#[derive(Debug, Default)]
pub struct RadioConfigBuilder {
    config: RadioConfig,
}

impl RadioConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set device path
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.config.device = device.into();
        self
    }

    /// Set baud rate
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// Set maximum payload size
    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.config.max_payload = max_payload;
        self
    }

    /// Set compression level
    pub fn compression(mut self, level: CompressionLevel) -> Self {
        self.config.compression = level;
        self
    }

    /// Set acknowledgement timeout
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set total attempts per transmission
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set keep-alive interval
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = interval;
        self
    }

    /// Set backoff base delay
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RadioConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RadioConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.compression, CompressionLevel::Normal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RadioConfig::builder()
            .device("/dev/ttyACM0")
            .max_payload(51)
            .compression(CompressionLevel::High)
            .max_retries(5)
            .build();

        assert_eq!(config.device, "/dev/ttyACM0");
        assert_eq!(config.max_payload, 51);
        assert!(config.compression.is_high());
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RadioConfig::builder().max_payload(10).build().validate().is_err());
        assert!(RadioConfig::builder().max_retries(0).build().validate().is_err());
        assert!(RadioConfig::builder()
            .ack_timeout(Duration::ZERO)
            .build()
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let json = r#"{
            "device": "/dev/ttyS1",
            "baud_rate": 9600,
            "max_payload": 51,
            "compression": "high",
            "ack_timeout": "5s",
            "max_retries": 4,
            "keep_alive_interval": "2m"
        }"#;

        let config: RadioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.compression, CompressionLevel::High);
        assert_eq!(config.ack_timeout, Duration::from_secs(5));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(120));
        // Missing fields fall back to defaults
        assert_eq!(
            config.retry_base_delay,
            Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS)
        );
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!("HIGH".parse::<CompressionLevel>().unwrap(), CompressionLevel::High);
        assert_eq!("normal".parse::<CompressionLevel>().unwrap(), CompressionLevel::Normal);
        assert!("max".parse::<CompressionLevel>().is_err());
    }
}
