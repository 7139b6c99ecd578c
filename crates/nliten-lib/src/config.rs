//! Application configuration — YAML file, credential resolution, validation.
//!
//! Keys are camelCase so existing `.enphase.yml` files keep working.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::api::{Credentials, DEFAULT_HITS_PER_MIN, HTTP_TIMEOUT};
use crate::led::{MAX_WATCHDOG_LINES, parse_color};
use crate::monitor::{
    CELLULAR_UPDATE_INTERVAL, DEFAULT_RETRY_DELAY, IndicatorState, tickle_interval,
};
use crate::protocol::{MAX_FADE_MS, PatternLine};

/// Looked up first, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "./.enphase.yml";

pub const ENV_API_KEY: &str = "ENPHASE_API_KEY";
pub const ENV_UID: &str = "ENPHASE_UID";
pub const ENV_SYSID: &str = "ENPHASE_SYSID";

/// Accepted `logLevel` values, most to least verbose.
pub const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Polling rate bounds, in hours.
pub const MIN_RATE: u32 = 1;
pub const MAX_RATE: u32 = 12;

/// Shortest watchdog timeout accepted. Requests time out at half the
/// watchdog, so this leaves them 5 s.
pub const MIN_WATCHDOG_MS: u32 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Enlighten API key.
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Enlighten user id.
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// System to monitor. None = first system of the account.
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub sys_id: Option<String>,

    /// One of [`LOG_LEVELS`]. Default: "WARNING".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append log output here instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Hours between polls while healthy (1–12). Default: 6.
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// API plan allowance. Default: 10 (free "Watt" plan).
    #[serde(default = "default_hits_per_min")]
    pub hits_per_min: u32,

    /// Seconds between Envoy uploads; older reports count as stale.
    /// Default: 21600 (cellular). Wi-Fi Envoys upload every 900.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Seconds before re-polling an unhealthy system. Default: 300.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// LED fade time in milliseconds. Default: 100.
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u32,

    /// Watchdog timeout in milliseconds. Default: 60000.
    #[serde(default = "default_watchdog")]
    pub watchdog: u32,

    /// Pattern played when the watchdog fires. Empty = built-in red wig-wag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watchdog_pattern: Vec<PatternLineConfig>,

    /// Preferred blink(1) serial. Empty = first device found.
    #[serde(default)]
    pub device_serial: String,

    /// Per-state color overrides.
    #[serde(default)]
    pub palette: PaletteConfig,

    /// API root override, e.g. for a local mock server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

fn default_log_level() -> String {
    "WARNING".into()
}
fn default_rate() -> u32 {
    6
}
fn default_hits_per_min() -> u32 {
    DEFAULT_HITS_PER_MIN
}
fn default_update_interval() -> u64 {
    CELLULAR_UPDATE_INTERVAL.as_secs()
}
fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}
fn default_fade_ms() -> u32 {
    100
}
fn default_watchdog() -> u32 {
    60_000
}
fn default_pattern_fade_ms() -> u32 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            uid: None,
            sys_id: None,
            log_level: default_log_level(),
            log_file: None,
            rate: default_rate(),
            hits_per_min: default_hits_per_min(),
            update_interval: default_update_interval(),
            retry_delay: default_retry_delay(),
            fade_ms: default_fade_ms(),
            watchdog: default_watchdog(),
            watchdog_pattern: Vec::new(),
            device_serial: String::new(),
            palette: PaletteConfig::default(),
            api_base_url: None,
        }
    }
}

/// YAML happily reads `sysId: 67` as a number; take any scalar as a string.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(serde::de::Error::custom("expected a string or number")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternLineConfig {
    pub color: String,
    #[serde(default = "default_pattern_fade_ms")]
    pub fade_ms: u32,
}

/// Optional overrides for one state's colors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPairConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<String>,
}

impl ColorPairConfig {
    fn is_empty(&self) -> bool {
        self.top.is_none() && self.bottom.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    #[serde(skip_serializing_if = "ColorPairConfig::is_empty")]
    pub startup: ColorPairConfig,
    #[serde(skip_serializing_if = "ColorPairConfig::is_empty")]
    pub normal: ColorPairConfig,
    #[serde(skip_serializing_if = "ColorPairConfig::is_empty")]
    pub abnormal: ColorPairConfig,
    #[serde(skip_serializing_if = "ColorPairConfig::is_empty")]
    pub stale: ColorPairConfig,
    #[serde(skip_serializing_if = "ColorPairConfig::is_empty")]
    pub fault: ColorPairConfig,
    #[serde(skip_serializing_if = "ColorPairConfig::is_empty")]
    pub off: ColorPairConfig,
}

impl PaletteConfig {
    pub fn pair(&self, state: IndicatorState) -> &ColorPairConfig {
        match state {
            IndicatorState::Startup => &self.startup,
            IndicatorState::Normal => &self.normal,
            IndicatorState::Abnormal => &self.abnormal,
            IndicatorState::Stale => &self.stale,
            IndicatorState::Fault => &self.fault,
            IndicatorState::Off => &self.off,
        }
    }

    /// Every color that is set, as `(state, "top" | "bottom", value)`.
    pub fn entries(&self) -> Vec<(IndicatorState, &'static str, &str)> {
        let mut out = Vec::new();
        for state in IndicatorState::ALL {
            let pair = self.pair(state);
            if let Some(top) = &pair.top {
                out.push((state, "top", top.as_str()));
            }
            if let Some(bottom) = &pair.bottom {
                out.push((state, "bottom", bottom.as_str()));
            }
        }
        out
    }
}

/// Values given on the command line, which win over everything else.
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub api_key: Option<String>,
    pub uid: Option<String>,
    pub sys_id: Option<String>,
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    RateOutOfRange(u32),
    ZeroHitsPerMin,
    UnknownLogLevel(String),
    WatchdogOutOfRange(u32),
    InvalidPaletteColor { field: String, reason: String },
    InvalidPatternColor { line: usize, reason: String },
    PatternTooLong(usize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::RateOutOfRange(r) => {
                write!(f, "rate must be {MIN_RATE}-{MAX_RATE} hours, got {r}")
            }
            ValidationError::ZeroHitsPerMin => write!(f, "hitsPerMin must be at least 1"),
            ValidationError::UnknownLogLevel(l) => {
                write!(f, "unknown logLevel '{l}' (expected one of: {})", LOG_LEVELS.join(", "))
            }
            ValidationError::WatchdogOutOfRange(ms) => write!(
                f,
                "watchdog must be {MIN_WATCHDOG_MS}-{MAX_FADE_MS} ms, got {ms}"
            ),
            ValidationError::InvalidPaletteColor { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            ValidationError::InvalidPatternColor { line, reason } => {
                write!(f, "invalid watchdogPattern[{line}]: {reason}")
            }
            ValidationError::PatternTooLong(n) => write!(
                f,
                "watchdogPattern has {n} lines, at most {MAX_WATCHDOG_LINES} allowed"
            ),
        }
    }
}

/// Map a `logLevel` name onto the `log` crate's filter.
pub fn log_level_filter(level: &str) -> Option<log::LevelFilter> {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some(log::LevelFilter::Debug),
        "INFO" => Some(log::LevelFilter::Info),
        "WARNING" | "WARN" => Some(log::LevelFilter::Warn),
        "ERROR" | "CRITICAL" => Some(log::LevelFilter::Error),
        _ => None,
    }
}

/// Show only the last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Platform config directory for nliten.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nliten"))
    }

    /// Fallback config file when `./.enphase.yml` does not exist.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.yml"))
    }

    /// Parse YAML text. Only the first document is used.
    ///
    /// Returns the config and any warnings.
    pub fn from_yaml(contents: &str) -> crate::error::Result<(Self, Vec<String>)> {
        let mut docs = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(contents) {
            let value = serde_yaml::Value::deserialize(doc)
                .map_err(|e| crate::NlitenError::Config(format!("YAML parse error: {e}")))?;
            docs.push(value);
        }

        let mut warnings = Vec::new();
        let first = match docs.first() {
            None | Some(serde_yaml::Value::Null) => {
                return Err(crate::NlitenError::Config("empty configuration file".into()));
            }
            Some(first) => first.clone(),
        };
        if docs.len() > 1 {
            warnings.push(format!(
                "using the first of {} documents in the configuration file",
                docs.len()
            ));
        }

        let config: Config = serde_yaml::from_value(first)
            .map_err(|e| crate::NlitenError::Config(format!("YAML parse error: {e}")))?;
        Ok((config, warnings))
    }

    /// Load a config file that must exist.
    pub fn load_from(path: &Path) -> crate::error::Result<(Self, Vec<String>)> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::NlitenError::Config(format!(
                    "configuration file not found: {}",
                    path.display()
                ))
            } else {
                crate::NlitenError::Io(e)
            }
        })?;
        Self::from_yaml(&contents).map_err(|e| match e {
            crate::NlitenError::Config(msg) => {
                crate::NlitenError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Find and load the configuration.
    ///
    /// An explicit path must exist. Otherwise `./.enphase.yml`, then the
    /// platform config file, then built-in defaults.
    ///
    /// Returns the config, the file it came from, and any warnings.
    pub fn locate(explicit: Option<&Path>) -> crate::error::Result<(Self, Option<PathBuf>, Vec<String>)> {
        if let Some(path) = explicit {
            let (config, warnings) = Self::load_from(path)?;
            return Ok((config, Some(path.to_path_buf()), warnings));
        }
        let candidates = std::iter::once(PathBuf::from(DEFAULT_CONFIG_FILE)).chain(Self::path());
        for path in candidates {
            if path.is_file() {
                let (config, warnings) = Self::load_from(&path)?;
                return Ok((config, Some(path), warnings));
            }
        }
        Ok((Self::default(), None, Vec::new()))
    }

    /// Resolve credentials: command line, then environment, then this file.
    ///
    /// `env` looks up an environment variable (injectable for tests).
    pub fn resolve_credentials(
        &self,
        cli: &CredentialOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> crate::error::Result<Credentials> {
        let pick = |flag: &Option<String>, var: &str, file: &Option<String>| {
            non_blank(flag.clone())
                .or_else(|| non_blank(env(var)))
                .or_else(|| non_blank(file.clone()))
        };

        let api_key = pick(&cli.api_key, ENV_API_KEY, &self.api_key);
        let uid = pick(&cli.uid, ENV_UID, &self.uid);
        let sys_id = pick(&cli.sys_id, ENV_SYSID, &self.sys_id);

        let mut missing = Vec::new();
        if api_key.is_none() {
            missing.push(format!("API Key (--api-key, {ENV_API_KEY} or apiKey)"));
        }
        if uid.is_none() {
            missing.push(format!("User Id (--uid, {ENV_UID} or uid)"));
        }
        match (api_key, uid) {
            (Some(api_key), Some(uid)) => Ok(Credentials {
                api_key,
                uid,
                sys_id,
            }),
            _ => Err(crate::NlitenError::Config(format!(
                "Must provide {}",
                missing.join(" and ")
            ))),
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(MIN_RATE..=MAX_RATE).contains(&self.rate) {
            errors.push(ValidationError::RateOutOfRange(self.rate));
        }
        if self.hits_per_min == 0 {
            errors.push(ValidationError::ZeroHitsPerMin);
        }
        if log_level_filter(&self.log_level).is_none() {
            errors.push(ValidationError::UnknownLogLevel(self.log_level.clone()));
        }
        if !(MIN_WATCHDOG_MS..=MAX_FADE_MS).contains(&self.watchdog) {
            errors.push(ValidationError::WatchdogOutOfRange(self.watchdog));
        }

        for (state, led, value) in self.palette.entries() {
            if let Err(e) = parse_color(value) {
                errors.push(ValidationError::InvalidPaletteColor {
                    field: format!("palette.{state}.{led}"),
                    reason: e.to_string(),
                });
            }
        }

        if self.watchdog_pattern.len() > MAX_WATCHDOG_LINES {
            errors.push(ValidationError::PatternTooLong(self.watchdog_pattern.len()));
        }
        for (i, line) in self.watchdog_pattern.iter().enumerate() {
            if let Err(e) = parse_color(&line.color) {
                errors.push(ValidationError::InvalidPatternColor {
                    line: i,
                    reason: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The watchdog pattern to write, falling back to the built-in one.
    pub fn resolve_watchdog_pattern(&self) -> crate::error::Result<Vec<PatternLine>> {
        if self.watchdog_pattern.is_empty() {
            return Ok(crate::led::default_watchdog_pattern());
        }
        self.watchdog_pattern
            .iter()
            .map(|line| {
                Ok(PatternLine {
                    color: parse_color(&line.color)?,
                    fade_ms: line.fade_ms,
                })
            })
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.rate as u64 * 60 * 60)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    /// HTTP timeout while monitoring: a hung request must not outlast the
    /// gap between two tickles.
    pub fn request_timeout(&self) -> Duration {
        HTTP_TIMEOUT.min(tickle_interval(self.watchdog))
    }

    /// Copy with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        Config {
            api_key: self.api_key.as_deref().map(mask_secret),
            ..self.clone()
        }
    }
}
