//! Enphase Enlighten Systems API (v2) client.
//!
//! Every call goes through one rate-limited GET helper. Credentials travel
//! as `key` / `user_id` query parameters, so request URLs are only ever
//! logged without their query string.

mod rate_limit;
mod types;

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::shutdown::Shutdown;

pub use rate_limit::{DEFAULT_HITS_PER_MIN, RateLimiter};
pub use types::{Interval, Stats, StatsMeta, Summary, SystemEntry, SystemsPage, Timestamp};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.enphaseenergy.com/api/v2";

const USER_AGENT: &str = concat!("nliten/", env!("CARGO_PKG_VERSION"));
/// Default per-request timeout.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ── Error type ──

#[derive(Debug)]
pub enum ApiError {
    /// Transport failure (DNS, TLS, timeout). URL stripped.
    Http(reqwest::Error),
    /// Non-200 reply.
    Status { status: u16, body: String },
    /// 200 reply whose body did not have the expected shape.
    Decode(String),
    /// The account has no systems to monitor.
    NoSystems,
    /// Shutdown was requested while waiting for the rate limit.
    Cancelled,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "HTTP request failed: {e}"),
            ApiError::Status { status, body } => {
                write!(f, "Enlighten API returned {status}")?;
                if !body.is_empty() {
                    write!(f, ": {body}")?;
                }
                Ok(())
            }
            ApiError::Decode(e) => write!(f, "Unexpected API response: {e}"),
            ApiError::NoSystems => write!(f, "No systems found for this user"),
            ApiError::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest embeds the full URL, which carries the API key
        ApiError::Http(e.without_url())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

// ── Commands ──

/// The API calls the `query` command can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCommand {
    ConsumptionStats,
    Envoys,
    Inventory,
    ProductionMeters,
    RgmStats,
    Stats,
    Summary,
    Systems,
}

impl ApiCommand {
    pub const ALL: [ApiCommand; 8] = [
        ApiCommand::ConsumptionStats,
        ApiCommand::Envoys,
        ApiCommand::Inventory,
        ApiCommand::ProductionMeters,
        ApiCommand::RgmStats,
        ApiCommand::Stats,
        ApiCommand::Summary,
        ApiCommand::Systems,
    ];

    /// Name used on the command line and as the key in `query` output.
    pub fn name(self) -> &'static str {
        match self {
            ApiCommand::ConsumptionStats => "consumptionStats",
            ApiCommand::Envoys => "envoys",
            ApiCommand::Inventory => "inventory",
            ApiCommand::ProductionMeters => "productionMeters",
            ApiCommand::RgmStats => "rgmStats",
            ApiCommand::Stats => "stats",
            ApiCommand::Summary => "summary",
            ApiCommand::Systems => "systems",
        }
    }
}

impl fmt::Display for ApiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApiCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ApiCommand::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = ApiCommand::ALL.iter().map(|c| c.name()).collect();
                format!("unknown command '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Optional time arguments for a query, in Unix epoch seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub start_at: Option<i64>,
    pub end_at: Option<i64>,
    /// Meter read time for `productionMeters`.
    pub read_at: Option<i64>,
    /// `YYYY-mm-dd` in the system's timezone, for `summary`.
    pub summary_date: Option<String>,
}

// ── Client ──

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub uid: String,
    pub sys_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub hits_per_min: u32,
    /// Ask for ISO-8601 datetimes instead of epoch seconds.
    pub iso_format: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Abandon rate-limit waits once this fires.
    pub shutdown: Option<Shutdown>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            hits_per_min: DEFAULT_HITS_PER_MIN,
            iso_format: false,
            timeout: HTTP_TIMEOUT,
            shutdown: None,
        }
    }
}

/// Source of the two payloads the health check needs.
///
/// Implemented by [`Enlighten`]; tests substitute canned responses.
pub trait SystemSource {
    fn current_summary(&mut self) -> Result<Summary>;
    fn current_stats(&mut self) -> Result<Stats>;

    /// How long the next call will block before it is sent.
    fn pending_delay(&self) -> Duration {
        Duration::ZERO
    }
}

pub struct Enlighten {
    http: Client,
    base_url: String,
    api_key: String,
    uid: String,
    sys_id: String,
    iso_format: bool,
    limiter: RateLimiter,
    shutdown: Option<Shutdown>,
    all_systems: Value,
}

impl fmt::Debug for Enlighten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enlighten")
            .field("base_url", &self.base_url)
            .field("uid", &self.uid)
            .field("sys_id", &self.sys_id)
            .field("iso_format", &self.iso_format)
            .finish_non_exhaustive()
    }
}

impl Enlighten {
    /// Build the client and fetch the user's systems.
    ///
    /// The `systems` call counts against the rate limit. Without a system
    /// id, the first system listed is used.
    pub fn connect(credentials: Credentials, options: ClientOptions) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()?;

        let mut client = Enlighten {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key,
            uid: credentials.uid,
            sys_id: String::new(),
            iso_format: options.iso_format,
            limiter: RateLimiter::new(options.hits_per_min),
            shutdown: options.shutdown,
            all_systems: Value::Null,
        };

        client.all_systems = client.systems()?;
        client.sys_id = match credentials.sys_id.filter(|s| !s.trim().is_empty()) {
            Some(id) => id,
            None => {
                let page: SystemsPage = decode(client.all_systems.clone())?;
                let first = page.systems.first().ok_or(ApiError::NoSystems)?;
                log::warn!("System Id not given, using first system found ({})", first.system_id);
                first.system_id.to_string()
            }
        };
        log::info!("monitoring system {}", client.sys_id);
        Ok(client)
    }

    pub fn system_id(&self) -> &str {
        &self.sys_id
    }

    /// The `systems` payload fetched by [`connect`](Self::connect).
    pub fn all_systems(&self) -> &Value {
        &self.all_systems
    }

    /// Rate-limited GET. 200 → parsed JSON, anything else → [`ApiError::Status`].
    pub fn rest(&mut self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        let mut query: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone()),
            ("user_id", self.uid.clone()),
        ];
        query.extend(params.iter().cloned());
        if self.iso_format {
            query.push(("datetime_format", "iso8601".into()));
        }

        match &self.shutdown {
            Some(shutdown) => {
                if !self.limiter.acquire_or_cancel(shutdown) {
                    return Err(ApiError::Cancelled);
                }
            }
            None => self.limiter.acquire(),
        }
        log::debug!("GET {url}");
        let response = self.http.get(url).query(&query).send()?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            log::error!("Failed REST call: {status} {body}");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .map_err(|e| ApiError::Decode(e.without_url().to_string()))?;
        log::trace!("{value}");
        Ok(value)
    }

    fn system_url(&self, endpoint: &str) -> String {
        format!("{}/systems/{}/{endpoint}", self.base_url, self.sys_id)
    }

    fn system_get(&mut self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.system_url(endpoint);
        self.rest(&url, params)
    }

    /// All systems associated with the user.
    pub fn systems(&mut self) -> Result<Value> {
        let url = format!("{}/systems", self.base_url);
        self.rest(&url, &[])
    }

    /// Consumption meter intervals (15 min). Empty when no meter is installed.
    pub fn consumption_stats(&mut self, start_at: Option<i64>, end_at: Option<i64>) -> Result<Value> {
        let params = window_params(start_at, end_at);
        self.system_get("consumption_stats", &params)
    }

    pub fn envoys(&mut self) -> Result<Value> {
        self.system_get("envoys", &[])
    }

    /// Inverters and meters in the system.
    pub fn inventory(&mut self) -> Result<Value> {
        self.system_get("inventory", &[])
    }

    /// Last reading of each production meter, at or before `read_at`.
    pub fn production_meters(&mut self, read_at: Option<i64>) -> Result<Value> {
        let params: Vec<(&str, String)> = read_at
            .map(|t| ("end_at", t.to_string()))
            .into_iter()
            .collect();
        self.system_get("production_meter_readings", &params)
    }

    /// Revenue-grade meter intervals (15 min).
    pub fn rgm_stats(&mut self, start_at: Option<i64>, end_at: Option<i64>) -> Result<Value> {
        let params = window_params(start_at, end_at);
        self.system_get("rgm_stats", &params)
    }

    /// Microinverter intervals (5 min), at most one day.
    pub fn stats(&mut self, start_at: Option<i64>, end_at: Option<i64>) -> Result<Value> {
        let params = window_params(start_at, end_at);
        self.system_get("stats", &params)
    }

    /// System summary; `summary_date` is `YYYY-mm-dd`, default today.
    pub fn summary(&mut self, summary_date: Option<&str>) -> Result<Value> {
        let params: Vec<(&str, String)> = summary_date
            .map(|d| ("summary_date", d.to_string()))
            .into_iter()
            .collect();
        self.system_get("summary", &params)
    }

    /// Dispatch one [`ApiCommand`].
    pub fn run(&mut self, command: ApiCommand, window: &QueryWindow) -> Result<Value> {
        match command {
            ApiCommand::ConsumptionStats => self.consumption_stats(window.start_at, window.end_at),
            ApiCommand::Envoys => self.envoys(),
            ApiCommand::Inventory => self.inventory(),
            ApiCommand::ProductionMeters => self.production_meters(window.read_at),
            ApiCommand::RgmStats => self.rgm_stats(window.start_at, window.end_at),
            ApiCommand::Stats => self.stats(window.start_at, window.end_at),
            ApiCommand::Summary => self.summary(window.summary_date.as_deref()),
            ApiCommand::Systems => self.systems(),
        }
    }
}

impl SystemSource for Enlighten {
    fn current_summary(&mut self) -> Result<Summary> {
        decode(self.summary(None)?)
    }

    fn current_stats(&mut self) -> Result<Stats> {
        decode(self.stats(None, None)?)
    }

    fn pending_delay(&self) -> Duration {
        self.limiter.delay_before(Instant::now())
    }
}

fn window_params(start_at: Option<i64>, end_at: Option<i64>) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(t) = start_at {
        params.push(("start_at", t.to_string()));
    }
    if let Some(t) = end_at {
        params.push(("end_at", t.to_string()));
    }
    params
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}
