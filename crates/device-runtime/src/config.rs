//! # Runtime Configuration
//!
//! Everything the runtime needs to host device managers. Values come from
//! defaults, overridden by `TXC_*` environment variables.

use std::collections::HashSet;
use std::time::Duration;

use device_txchain::MastershipDriverConfig;
use thiserror::Error;

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Devices connected at startup
    pub devices: Vec<String>,
    /// Period of the flush ticker that calls `submit` on every manager
    pub flush_interval: Duration,
    /// Buffer of the mastership event channel
    pub role_channel_capacity: usize,
    /// How long shutdown waits for drivers to finish their final drain
    pub shutdown_timeout: Duration,
    /// Per-device driver behaviour
    pub driver: MastershipDriverConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            devices: vec!["openflow:1".to_string(), "openflow:2".to_string()],
            flush_interval: Duration::from_millis(500),
            role_channel_capacity: 64,
            shutdown_timeout: Duration::from_secs(5),
            driver: MastershipDriverConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No devices configured")]
    NoDevices,

    #[error("Device {0} configured more than once")]
    DuplicateDevice(String),

    #[error("Invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Flush interval must be greater than zero")]
    ZeroFlushInterval,

    #[error("Role channel capacity must be greater than zero")]
    ZeroChannelCapacity,
}

impl RuntimeConfig {
    /// Load from process environment.
    ///
    /// # Environment Variables
    ///
    /// - `TXC_DEVICES`: comma separated device ids
    /// - `TXC_FLUSH_INTERVAL_MS`: flush period in milliseconds
    /// - `TXC_ROLE_CHANNEL_CAPACITY`: mastership channel buffer
    /// - `TXC_SHUTDOWN_TIMEOUT_MS`: shutdown wait in milliseconds
    /// - `TXC_SUBMIT_ON_ACTIVATE`: flush right after gaining mastership
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` as the variable source
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(devices) = lookup("TXC_DEVICES") {
            config.devices = devices
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(ms) = lookup("TXC_FLUSH_INTERVAL_MS") {
            config.flush_interval = Duration::from_millis(parse("TXC_FLUSH_INTERVAL_MS", ms)?);
        }
        if let Some(capacity) = lookup("TXC_ROLE_CHANNEL_CAPACITY") {
            config.role_channel_capacity = parse("TXC_ROLE_CHANNEL_CAPACITY", capacity)?;
        }
        if let Some(ms) = lookup("TXC_SHUTDOWN_TIMEOUT_MS") {
            config.shutdown_timeout = Duration::from_millis(parse("TXC_SHUTDOWN_TIMEOUT_MS", ms)?);
        }
        if let Some(flag) = lookup("TXC_SUBMIT_ON_ACTIVATE") {
            config.driver.submit_on_activate = parse("TXC_SUBMIT_ON_ACTIVATE", flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the runtime cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.clone()));
            }
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.role_channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}
