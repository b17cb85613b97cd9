use crate::error::{BridgeError, Result};
use crate::shadow::{DeviceId, DeviceIdentity, DeviceKind};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Refresh rates below this are rejected.
pub const MIN_REFRESH_RATE_SECS: u64 = 120;
pub const DEFAULT_REFRESH_RATE_SECS: u64 = 300;
pub const DEFAULT_MOVING_REFRESH_RATE_SECS: u64 = 10;
pub const MIN_MOVING_REFRESH_RATE_SECS: u64 = 1;
pub const DEFAULT_PUSH_RATE_SECS: f64 = 1.0;
pub const DEFAULT_SETTLE_SECS: u64 = 10;
pub const DEFAULT_API_URL: &str = "https://api.switch-bot.com/v1.0/devices";

/// Split one `.env` line into key and value. Blank lines, comments and
/// lines without `=` yield `None`. Matching surrounding quotes are stripped.
fn parse_dotenv_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();

    // Skip empty lines and comments
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let mut value = line[eq_pos + 1..].trim();

    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = &value[1..value.len() - 1];
    }

    Some((key, value))
}

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
///
/// Must run before any other thread exists, i.e. before the Tokio
/// runtime is built.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in content.lines().filter_map(parse_dotenv_line) {
        // Env vars take precedence
        if std::env::var(key).is_err() {
            // SAFETY: callers invoke this from a plain `fn main` before the
            // runtime (or any other thread) is started
            unsafe { std::env::set_var(key, value) };
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub options: OptionsConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub open_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            open_token: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    /// Poll period in seconds while idle.
    #[serde(rename = "refreshRate")]
    pub refresh_rate: Option<u64>,
    /// Poll period in seconds while a device is moving.
    #[serde(rename = "movingRefreshRate")]
    pub moving_refresh_rate: Option<u64>,
    /// Debounce window in seconds.
    #[serde(rename = "pushRate")]
    pub push_rate: Option<f64>,
    pub hide_device: Vec<String>,
    pub curtain: CurtainOptions,
    pub meter: MeterOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurtainOptions {
    pub set_min: Option<u8>,
    pub set_max: Option<u8>,
    #[serde(rename = "set_minStep")]
    pub set_min_step: Option<u8>,
    pub settle_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterOptions {
    pub hide_temperature: bool,
    pub hide_humidity: bool,
    /// 0: device reports Fahrenheit, convert to Celsius. 1: convert Celsius
    /// to Fahrenheit. Anything else: pass through.
    pub unit: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "refreshRate")]
    pub refresh_rate: Option<u64>,
    #[serde(default, rename = "pushRate")]
    pub push_rate: Option<f64>,
}

impl DeviceConfig {
    pub fn new(id: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            refresh_rate: None,
            push_rate: None,
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        DeviceIdentity::new(DeviceId::new(self.id.clone()), self.kind, name)
    }

    /// Parse one `id:kind[:name]` entry of the `DEVICES` variable.
    pub fn parse_entry(entry: &str) -> Result<Self> {
        let mut parts = entry.splitn(3, ':');
        let id = parts.next().map(str::trim).unwrap_or_default();
        let kind = parts.next().map(str::trim).unwrap_or_default();
        if id.is_empty() || kind.is_empty() {
            return Err(BridgeError::ConfigurationError(format!(
                "device entry '{}' must look like id:kind[:name]",
                entry
            )));
        }
        let kind = DeviceKind::from_str(kind).map_err(|_| {
            BridgeError::ConfigurationError(format!("unknown device kind '{}' for {}", kind, id))
        })?;
        let mut device = Self::new(id, kind);
        device.name = parts
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        Ok(device)
    }
}

/// Timing settings for one device's engine, validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub refresh_rate: Duration,
    pub moving_refresh_rate: Duration,
    pub push_rate: Duration,
    pub settle: Duration,
}

impl EngineSettings {
    /// Resolve and validate settings for `device`, applying its overrides.
    pub fn resolve(options: &OptionsConfig, device: &DeviceConfig) -> Result<Self> {
        let refresh = match device.refresh_rate.or(options.refresh_rate) {
            None => {
                warn!(
                    "[Config] {}: no refresh rate set, using default {}s",
                    device.id, DEFAULT_REFRESH_RATE_SECS
                );
                DEFAULT_REFRESH_RATE_SECS
            }
            Some(secs) if secs < MIN_REFRESH_RATE_SECS => {
                return Err(BridgeError::ConfigurationError(format!(
                    "refresh rate for {} must be at least {}s, got {}s",
                    device.id, MIN_REFRESH_RATE_SECS, secs
                )));
            }
            Some(secs) => secs,
        };

        let moving = options
            .moving_refresh_rate
            .unwrap_or(DEFAULT_MOVING_REFRESH_RATE_SECS);
        if moving < MIN_MOVING_REFRESH_RATE_SECS {
            return Err(BridgeError::ConfigurationError(format!(
                "moving refresh rate must be at least {}s",
                MIN_MOVING_REFRESH_RATE_SECS
            )));
        }

        let push = device
            .push_rate
            .or(options.push_rate)
            .unwrap_or(DEFAULT_PUSH_RATE_SECS);
        if !push.is_finite() || push < 0.0 {
            return Err(BridgeError::ConfigurationError(format!(
                "push rate for {} must be a non-negative number of seconds, got {}",
                device.id, push
            )));
        }

        if device.kind == DeviceKind::Curtain
            && let (Some(min), Some(max)) = (options.curtain.set_min, options.curtain.set_max)
            && min >= max
        {
            return Err(BridgeError::ConfigurationError(format!(
                "curtain set_min ({}) must be below set_max ({})",
                min, max
            )));
        }

        let settle = options.curtain.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS);

        Ok(Self {
            refresh_rate: Duration::from_secs(refresh),
            moving_refresh_rate: Duration::from_secs(moving.min(refresh)),
            push_rate: Duration::from_secs_f64(push),
            settle: Duration::from_secs(settle),
        })
    }
}

fn env_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a JSON document shaped like the plugin's config block.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Layer environment variables over the current values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SWITCHBOT_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(token) = std::env::var("SWITCHBOT_OPEN_TOKEN") {
            self.api.open_token = Some(token);
        }
        if let Ok(timeout) = std::env::var("SWITCHBOT_TIMEOUT")
            && let Ok(t) = timeout.parse()
        {
            self.api.timeout_secs = t;
        }

        // Unparsable rates fall back to the defaults during validation.
        if let Ok(rate) = std::env::var("REFRESH_RATE") {
            self.options.refresh_rate = rate.parse().ok();
        }
        if let Ok(rate) = std::env::var("MOVING_REFRESH_RATE") {
            self.options.moving_refresh_rate = rate.parse().ok();
        }
        if let Ok(rate) = std::env::var("PUSH_RATE") {
            self.options.push_rate = rate.parse().ok();
        }

        if let Ok(v) = std::env::var("CURTAIN_SET_MIN") {
            self.options.curtain.set_min = v.parse().ok();
        }
        if let Ok(v) = std::env::var("CURTAIN_SET_MAX") {
            self.options.curtain.set_max = v.parse().ok();
        }
        if let Ok(v) = std::env::var("CURTAIN_SET_MIN_STEP") {
            self.options.curtain.set_min_step = v.parse().ok();
        }
        if let Ok(v) = std::env::var("CURTAIN_SETTLE_SECS") {
            self.options.curtain.settle_secs = v.parse().ok();
        }

        if let Ok(v) = std::env::var("METER_HIDE_TEMPERATURE") {
            self.options.meter.hide_temperature = env_bool(&v);
        }
        if let Ok(v) = std::env::var("METER_HIDE_HUMIDITY") {
            self.options.meter.hide_humidity = env_bool(&v);
        }
        if let Ok(v) = std::env::var("METER_UNIT") {
            self.options.meter.unit = v.parse().ok();
        }

        if let Ok(hidden) = std::env::var("HIDE_DEVICE") {
            self.options.hide_device = hidden
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(devices) = std::env::var("DEVICES") {
            for entry in devices.split(',').filter(|e| !e.trim().is_empty()) {
                match DeviceConfig::parse_entry(entry) {
                    Ok(device) => self.devices.push(device),
                    Err(e) => warn!("[Config] ignoring device entry: {}", e),
                }
            }
        }
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.options.hide_device.iter().any(|h| h == id)
    }
}
