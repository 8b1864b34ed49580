//! Configuration for Chalak
//!
//! Loads configuration from a TOML file. Every field has a default, so a
//! partial file (or none at all) yields a working setup for the reference
//! robot: PCA9685 at 0x40, steering on channel 0, throttle on channel 1.

use crate::error::{Error, Result};
use crate::motion::SteeringPolicy;
use crate::streaming::backoff::BackoffStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub failsafe: FailsafeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote command source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Command source host name or IP
    #[serde(default = "default_host")]
    pub host: String,

    /// Command source TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for a single connect attempt (milliseconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Socket read timeout; bounds how long shutdown waits on a silent link
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Treat the link as dead after this long without bytes (disabled if absent)
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

/// Reconnect delay schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackoffConfig {
    /// `doubling` or `additive`
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// First delay after a failed attempt (milliseconds)
    #[serde(default = "default_backoff_initial")]
    pub initial_ms: u64,

    /// Increment per attempt for the additive strategy (milliseconds)
    #[serde(default = "default_backoff_step")]
    pub step_ms: u64,

    /// Upper bound on the delay. Required for `additive`; optional for `doubling`.
    #[serde(default)]
    pub max_ms: Option<u64>,
}

/// Command to actuator mapping
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MappingConfig {
    /// Steering policy (`servo` or `alternate`)
    #[serde(default)]
    pub steering_policy: SteeringPolicy,

    /// Must be set to use a policy whose output leaves the servo's 0..180° travel
    #[serde(default)]
    pub allow_out_of_range_policy: bool,
}

/// Actuator driver selection and wiring
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActuatorConfig {
    /// Driver type: `pca9685` or `mock`
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Apply signals on a dedicated thread fed by a latest-value slot
    #[serde(default)]
    pub dedicated_thread: bool,

    /// I2C bus number (`/dev/i2c-N`)
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    /// PCA9685 slave address
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u16,

    /// PWM frequency for hobby servos and ESCs
    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency_hz: f64,

    /// PWM channel driving the steering servo
    #[serde(default = "default_steering_channel")]
    pub steering_channel: u8,

    /// PWM channel driving the ESC / continuous servo
    #[serde(default = "default_throttle_channel")]
    pub throttle_channel: u8,

    /// Pulse width at 0°
    #[serde(default = "default_min_pulse")]
    pub steering_min_pulse_us: u32,

    /// Pulse width at 180°
    #[serde(default = "default_max_pulse")]
    pub steering_max_pulse_us: u32,

    /// Pulse width at throttle -1.0
    #[serde(default = "default_min_pulse")]
    pub throttle_min_pulse_us: u32,

    /// Pulse width at throttle 1.0
    #[serde(default = "default_max_pulse")]
    pub throttle_max_pulse_us: u32,
}

/// Behavior when the link drops
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FailsafeConfig {
    /// Center steering and stop the motor as soon as the link is lost
    #[serde(default)]
    pub neutral_on_disconnect: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Interval for loop statistics; 0 disables periodic reports
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

// Default value functions
fn default_host() -> String {
    "192.168.43.204".to_string()
}
fn default_port() -> u16 {
    60606
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_read_timeout() -> u64 {
    500
}
fn default_backoff_initial() -> u64 {
    1000
}
fn default_backoff_step() -> u64 {
    1000
}
fn default_driver() -> String {
    "pca9685".to_string()
}
fn default_i2c_bus() -> u8 {
    1
}
fn default_i2c_address() -> u16 {
    0x40
}
fn default_pwm_frequency() -> f64 {
    50.0
}
fn default_steering_channel() -> u8 {
    0
}
fn default_throttle_channel() -> u8 {
    1
}
fn default_min_pulse() -> u32 {
    750
}
fn default_max_pulse() -> u32 {
    2250
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_stats_interval() -> u64 {
    30
}

/// Cap applied to the additive strategy when none is configured
pub const DEFAULT_ADDITIVE_CAP_MS: u64 = 20_000;

/// Number of PWM channels on a PCA9685
const PCA9685_CHANNELS: u8 = 16;

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            idle_timeout_ms: None,
        }
    }
}

impl ConnectionConfig {
    /// Connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Idle watchdog window, if enabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            initial_ms: default_backoff_initial(),
            step_ms: default_backoff_step(),
            max_ms: None,
        }
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            dedicated_thread: false,
            i2c_bus: default_i2c_bus(),
            i2c_address: default_i2c_address(),
            pwm_frequency_hz: default_pwm_frequency(),
            steering_channel: default_steering_channel(),
            throttle_channel: default_throttle_channel(),
            steering_min_pulse_us: default_min_pulse(),
            steering_max_pulse_us: default_max_pulse(),
            throttle_min_pulse_us: default_min_pulse(),
            throttle_max_pulse_us: default_max_pulse(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use chalak::config::Config;
    ///
    /// let config = Config::load("chalak.toml")?;
    /// # Ok::<(), chalak::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Endpoint as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.connection.host, self.connection.port)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.connection.host.trim().is_empty() {
            return Err(Error::Config("connection.host is empty".to_string()));
        }
        if self.connection.port == 0 {
            return Err(Error::Config("connection.port must be non-zero".to_string()));
        }
        if self.connection.read_timeout_ms == 0 {
            // A zero timeout is rejected by the socket layer
            return Err(Error::Config(
                "connection.read_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "connection.connect_timeout_ms must be non-zero".to_string(),
            ));
        }
        if let Some(idle) = self.connection.idle_timeout_ms
            && idle < self.connection.read_timeout_ms
        {
            return Err(Error::Config(format!(
                "connection.idle_timeout_ms ({}) is shorter than read_timeout_ms ({})",
                idle, self.connection.read_timeout_ms
            )));
        }

        if self.backoff.initial_ms == 0 {
            return Err(Error::Config("backoff.initial_ms must be non-zero".to_string()));
        }
        if let Some(max) = self.backoff.max_ms
            && max < self.backoff.initial_ms
        {
            return Err(Error::Config(format!(
                "backoff.max_ms ({}) is below initial_ms ({})",
                max, self.backoff.initial_ms
            )));
        }

        if !self.mapping.steering_policy.is_range_safe() && !self.mapping.allow_out_of_range_policy
        {
            return Err(Error::Config(format!(
                "steering_policy {:?} drives outside 0..180 degrees; \
                 set mapping.allow_out_of_range_policy = true after checking servo limits",
                self.mapping.steering_policy
            )));
        }

        let act = &self.actuator;
        if act.steering_channel >= PCA9685_CHANNELS || act.throttle_channel >= PCA9685_CHANNELS {
            return Err(Error::Config(format!(
                "actuator channels must be below {}",
                PCA9685_CHANNELS
            )));
        }
        if act.steering_channel == act.throttle_channel {
            return Err(Error::Config(
                "steering and throttle share a PWM channel".to_string(),
            ));
        }
        if act.pwm_frequency_hz.is_nan() || act.pwm_frequency_hz <= 0.0 {
            return Err(Error::Config(
                "actuator.pwm_frequency_hz must be positive".to_string(),
            ));
        }
        if act.steering_min_pulse_us >= act.steering_max_pulse_us
            || act.throttle_min_pulse_us >= act.throttle_max_pulse_us
        {
            return Err(Error::Config(
                "actuator pulse ranges must have min < max".to_string(),
            ));
        }

        Ok(())
    }
}
