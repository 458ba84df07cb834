//! Link configuration.
//!
//! A [`LinkConfig`] names the device, its line settings and the timing the
//! link manager applies around it. It can be built in code with the
//! `with_*` methods or loaded from a JSON document, where durations are
//! written in milliseconds:
//!
//! ```json
//! {
//!     "port": "/dev/ttyUSB0",
//!     "baud_rate": 115200,
//!     "timeout_ms": 1000,
//!     "options": { "parity": "even", "stop_bits": "1" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

use crate::error::{Error, Result};

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Time given to attached hardware to come up after the port opens. Many
/// microcontroller boards reset when DTR toggles on open.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

const SETTLE_DELAY_ENV: &str = "SERIALLINK_SETTLE_DELAY_MS";
const BACKOFF_DELAY_ENV: &str = "SERIALLINK_BACKOFF_DELAY_MS";

/// Configuration of one serial link.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Device path or identifier (`/dev/ttyUSB0`, `COM3`)
    pub port: String,

    /// Line speed in baud
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Default read timeout
    #[serde(rename = "timeout_ms", with = "millis", default = "default_timeout")]
    pub timeout: Duration,

    /// Transport options: `data_bits`, `parity`, `stop_bits`, `flow_control`
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Pause after a successful open before the link reports Connected
    #[serde(rename = "settle_delay_ms", with = "millis", default = "default_settle_delay")]
    pub settle_delay: Duration,

    /// Pause between close and open during a reconnect
    #[serde(rename = "backoff_delay_ms", with = "millis", default = "default_backoff_delay")]
    pub backoff_delay: Duration,

    /// Longest a write, flush included, may take. Falls back to `timeout`.
    #[serde(
        rename = "write_timeout_ms",
        with = "opt_millis",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub write_timeout: Option<Duration>,

    /// Longest frame accepted before the read fails
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

/// Line settings derived from [`LinkConfig::options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for SerialSettings {
    /// 8N1, no flow control
    fn default() -> Self {
        Self {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl LinkConfig {
    /// Configuration for `port` with default settings.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            write_timeout: None,
            options: BTreeMap::new(),
            settle_delay: default_settle_delay(),
            backoff_delay: default_backoff_delay(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_backoff_delay(mut self, delay: Duration) -> Self {
        self.backoff_delay = delay;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Bound applied to writes and to the flush on close.
    pub fn effective_write_timeout(&self) -> Duration {
        self.write_timeout.unwrap_or(self.timeout)
    }

    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Check the configuration and resolve the transport options.
    pub fn validate(&self) -> Result<SerialSettings> {
        if self.port.is_empty() {
            return Err(Error::Config("port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(Error::Config("baud rate must be greater than zero".to_string()));
        }
        if self.max_frame_len == 0 {
            return Err(Error::Config("max frame length must be greater than zero".to_string()));
        }

        let mut settings = SerialSettings::default();
        for (name, value) in &self.options {
            let value = value.trim().to_ascii_lowercase();
            match name.as_str() {
                "data_bits" => {
                    settings.data_bits = match value.as_str() {
                        "5" => DataBits::Five,
                        "6" => DataBits::Six,
                        "7" => DataBits::Seven,
                        "8" => DataBits::Eight,
                        _ => return Err(bad_value(name, &value)),
                    }
                }
                "parity" => {
                    settings.parity = match value.as_str() {
                        "none" | "n" => Parity::None,
                        "odd" | "o" => Parity::Odd,
                        "even" | "e" => Parity::Even,
                        _ => return Err(bad_value(name, &value)),
                    }
                }
                "stop_bits" => {
                    settings.stop_bits = match value.as_str() {
                        "1" => StopBits::One,
                        "2" => StopBits::Two,
                        _ => return Err(bad_value(name, &value)),
                    }
                }
                "flow_control" => {
                    settings.flow_control = match value.as_str() {
                        "none" => FlowControl::None,
                        "software" | "xonxoff" => FlowControl::Software,
                        "hardware" | "rtscts" => FlowControl::Hardware,
                        _ => return Err(bad_value(name, &value)),
                    }
                }
                _ => return Err(Error::Config(format!("unknown transport option '{name}'"))),
            }
        }

        Ok(settings)
    }
}

fn bad_value(name: &str, value: &str) -> Error {
    Error::Config(format!("invalid value '{value}' for option '{name}'"))
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

fn default_settle_delay() -> Duration {
    delay_from_env(SETTLE_DELAY_ENV, DEFAULT_SETTLE_DELAY)
}

fn default_backoff_delay() -> Duration {
    delay_from_env(BACKOFF_DELAY_ENV, DEFAULT_BACKOFF_DELAY)
}

// Milliseconds from `var`, or `default` when unset or not a number.
fn delay_from_env(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Durations as whole milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Optional durations as whole milliseconds.
mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
