//! CLI subcommands — API queries, the monitor loop, light control.

mod config_cmd;
mod devices;
mod light;
mod monitor;
mod query;
mod status;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde::Serialize;

pub(super) use nliten_lib::NlitenError;
pub(super) use nliten_lib::api::{ApiCommand, ClientOptions, DEFAULT_BASE_URL, Enlighten};
pub(super) use nliten_lib::config::{self, Config, CredentialOverrides};
pub(super) use nliten_lib::device::{self, DiscoveredDevice, StatusLight};
pub(super) use nliten_lib::error::Result;
pub(super) use nliten_lib::led;
pub(super) use nliten_lib::monitor::{Health, IndicatorState, StatusIndicator};
pub(super) use nliten_lib::shutdown::Shutdown;
pub(super) use nliten_lib::time;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// `#FF0000 (red)`, or just the hex value for unnamed colors.
pub(super) fn describe_color(rgb: led::Rgb) -> String {
    match led::color_name(rgb) {
        Some(name) => format!("{} ({name})", led::format_color(rgb)),
        None => led::format_color(rgb),
    }
}

pub(super) fn describe_pair(pair: led::ColorPair) -> String {
    if pair.top == pair.bottom {
        describe_color(pair.top)
    } else {
        format!(
            "top {}, bottom {}",
            describe_color(pair.top),
            describe_color(pair.bottom)
        )
    }
}

/// Pretty-print any serializable value on stdout.
pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{text}");
    Ok(())
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub system_id: String,
    pub state: IndicatorState,
    pub health: Health,
    pub summary: Option<SummaryJson>,
    pub stats_checked: bool,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct SummaryJson {
    pub status: String,
    pub current_power: Option<i64>,
    pub energy_today: Option<i64>,
    pub last_report_at: i64,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub settings: Config,
    pub credentials: CredentialsJson,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct CredentialsJson {
    /// Masked.
    pub api_key: Option<String>,
    pub uid: Option<String>,
    pub sys_id: Option<String>,
    pub complete: bool,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

// ── Arguments ──

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: ./.enphase.yml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short = 'L', long, global = true, value_parser = config::LOG_LEVELS, ignore_case = true)]
    log_level: Option<String>,

    /// Append log output to this file instead of stderr
    #[arg(short = 'l', long, global = true)]
    log_file: Option<PathBuf>,

    /// Enlighten API key
    #[arg(short = 'a', long, global = true)]
    api_key: Option<String>,

    /// Enlighten user id
    #[arg(short = 'u', long, global = true)]
    uid: Option<String>,

    /// System id (default: first system of the user)
    #[arg(short = 's', long, global = true)]
    sys_id: Option<String>,

    /// Ask the API for ISO-8601 datetimes
    #[arg(short = 'i', long, global = true)]
    iso_format: bool,

    /// More output (repeat for more)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output as JSON (for status, config, devices)
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Call Enlighten API endpoints and print the JSON replies
    Query {
        /// Commands to run (comma separated or repeated)
        #[arg(
            short = 'C',
            long = "commands",
            num_args = 1..,
            value_delimiter = ',',
            default_value = "systems"
        )]
        commands: Vec<ApiCommand>,
        /// Start of the time window ("dd-mm-YYYY HH:MM", local time)
        #[arg(short = 'b', long)]
        begin: Option<String>,
        /// End of the time window ("dd-mm-YYYY HH:MM", local time)
        #[arg(short = 'e', long)]
        end: Option<String>,
        /// Day for summary and meter readings ("dd-mm-YYYY HH:MM", local time)
        #[arg(short = 'd', long)]
        date: Option<String>,
    },

    /// Poll the system and show its health on the blink(1)
    Monitor {
        /// Hours between polls while the system is healthy
        #[arg(
            short = 'r',
            long,
            value_parser = clap::value_parser!(u32).range(config::MIN_RATE as i64..=config::MAX_RATE as i64)
        )]
        rate: Option<u32>,
    },

    /// Check system health once and print it
    Status,

    /// Set the light to an indicator state
    Light {
        /// normal, abnormal, stale, fault, startup or off
        state: IndicatorState,
    },

    /// List connected blink(1) devices
    Devices,

    /// Show the resolved configuration (API key masked)
    Config,
}

impl Command {
    /// Commands that still run with an invalid config file.
    fn tolerates_invalid_config(&self) -> bool {
        matches!(self, Command::Devices | Command::Config)
    }
}

// ── Shared context ──

/// Everything a subcommand needs after flags and config file are merged.
pub(super) struct Context {
    pub config: Config,
    pub config_file: Option<PathBuf>,
    pub overrides: CredentialOverrides,
    pub iso_format: bool,
    pub verbose: u8,
    /// Set by Ctrl+C; cuts rate-limit waits short.
    pub shutdown: Shutdown,
}

impl Context {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self
                .config
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            hits_per_min: self.config.hits_per_min,
            iso_format: self.iso_format,
            shutdown: Some(self.shutdown.clone()),
            ..ClientOptions::default()
        }
    }

    /// Resolve credentials and fetch the system list.
    pub fn connect(&self) -> Result<Enlighten> {
        self.connect_with(self.client_options())
    }

    pub fn connect_with(&self, options: ClientOptions) -> Result<Enlighten> {
        let credentials = self
            .config
            .resolve_credentials(&self.overrides, |var| std::env::var(var).ok())?;
        Ok(Enlighten::connect(credentials, options)?)
    }

    fn validate(&self) -> Result<()> {
        self.config.validate().map_err(|errors| {
            let lines: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            NlitenError::Config(lines.join("; "))
        })
    }
}

/// Set up `env_logger`.
///
/// An explicit `-L` wins over `RUST_LOG`; otherwise `RUST_LOG` wins over the
/// config file's `logLevel`.
fn init_logging(level: &str, explicit: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = config::log_level_filter(level).unwrap_or(log::LevelFilter::Warn);
    let env = env_logger::Env::default().default_filter_or(filter.to_string());
    let mut builder = env_logger::Builder::from_env(env);
    if explicit {
        builder.filter_level(filter);
    }
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .target(env_logger::Target::Pipe(Box::new(file)))
                .format_timestamp_secs();
        }
        None => {
            builder.format_timestamp(None);
        }
    }
    // Already initialised when commands run in-process from tests.
    builder.format_target(false).try_init().ok();
    Ok(())
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(global: GlobalArgs, cmd: Command, shutdown: &Shutdown) -> Result<()> {
    let (mut config, config_file, warnings) = Config::locate(global.config.as_deref())?;

    let explicit_level = global.log_level.is_some();
    if let Some(level) = global.log_level {
        config.log_level = level;
    }
    if let Some(path) = global.log_file {
        config.log_file = Some(path);
    }
    if let Command::Monitor { rate: Some(rate) } = &cmd {
        config.rate = *rate;
    }

    init_logging(&config.log_level, explicit_level, config.log_file.as_deref())?;
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    if let Some(path) = &config_file {
        log::debug!("[config] loaded {}", path.display());
    }

    let ctx = Context {
        config,
        config_file,
        overrides: CredentialOverrides {
            api_key: global.api_key,
            uid: global.uid,
            sys_id: global.sys_id,
        },
        iso_format: global.iso_format,
        verbose: global.verbose,
        shutdown: shutdown.clone(),
    };
    if !cmd.tolerates_invalid_config() {
        ctx.validate()?;
    }

    let json = global.json;
    match cmd {
        Command::Query {
            commands,
            begin,
            end,
            date,
        } => {
            // query output is always JSON
            query::cmd_query(
                &ctx,
                &commands,
                begin.as_deref(),
                end.as_deref(),
                date.as_deref(),
            )
        }
        Command::Monitor { .. } => {
            if json {
                warn_json_unsupported("monitor");
            }
            monitor::cmd_monitor(&ctx)
        }
        Command::Status => status::cmd_status(&ctx, json),
        Command::Light { state } => {
            if json {
                warn_json_unsupported("light");
            }
            light::cmd_light(&ctx, state)
        }
        Command::Devices => devices::cmd_devices(json),
        Command::Config => config_cmd::cmd_config(&ctx, json),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Short:", "Longer key:"], &[]);
        // "Longer key:" = 11 + PADDING = 13
        assert_eq!(w, 13);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        let w = kv_width(&["A:"], &["Very long indent key:"]);
        // 21 + PADDING + 2
        assert_eq!(w, 25);
    }

    #[test]
    fn kv_width_empty_both() {
        assert_eq!(kv_width(&[], &[]), 0);
    }

    #[test]
    fn values_align_across_levels() {
        let w = kv_width(&["Top:"], &["Indent:"]);
        let top = format_kv("Top:", "V", w);
        let indent = format!("  {:<width$}{}", "Indent:", "V", width = w - 2);
        assert_eq!(top.find('V'), indent.find('V'));
    }

    #[test]
    fn describe_pair_collapses_equal_colors() {
        let gray = led::Rgb::new(0x80, 0x80, 0x80);
        assert_eq!(describe_pair(led::ColorPair::new(gray, gray)), "#808080 (gray)");
        let pair = led::ColorPair::new(led::Rgb::BLACK, led::Rgb::new(0, 0x80, 0));
        assert_eq!(describe_pair(pair), "top #000000 (black), bottom #008000 (green)");
    }

    #[test]
    fn format_kv_exact_width() {
        assert_eq!(format_kv("Key:", "v", 6), "Key:  v");
    }
}

#[cfg(test)]
mod output_tests {
    use super::*;

    #[test]
    fn status_output_has_expected_fields() {
        let output = StatusOutput {
            version: "0.1.0".into(),
            system_id: "67".into(),
            state: IndicatorState::Stale,
            health: Health {
                current: false,
                normal: true,
            },
            summary: Some(SummaryJson {
                status: "normal".into(),
                current_power: Some(271),
                energy_today: None,
                last_report_at: 1_469_830_983,
            }),
            stats_checked: false,
            error: None,
        };
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();
        assert_eq!(json["state"], "stale");
        assert_eq!(json["health"]["current"], false);
        assert_eq!(json["health"]["normal"], true);
        assert_eq!(json["summary"]["current_power"], 271);
        assert!(json["error"].is_null());
    }

    #[test]
    fn config_output_masks_key() {
        let config = Config {
            api_key: Some("0123456789abcdef".into()),
            ..Config::default()
        };
        let output = ConfigOutput {
            config_file: None,
            settings: config.redacted(),
            credentials: CredentialsJson {
                api_key: config.api_key.as_deref().map(config::mask_secret),
                uid: None,
                sys_id: None,
                complete: false,
            },
            problems: Vec::new(),
        };
        let text = serde_json::to_string(&output).unwrap();
        assert!(!text.contains("0123456789ab"));
        assert!(text.contains("cdef"));
    }

    #[test]
    fn devices_output_empty() {
        let output = DevicesOutput {
            count: 0,
            devices: vec![],
        };
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();
        assert_eq!(json["count"], 0);
        assert!(json["devices"].as_array().unwrap().is_empty());
    }

    #[test]
    fn devices_output_with_devices() {
        let output = DevicesOutput {
            count: 1,
            devices: vec![DiscoveredDevice {
                path: "usb:001/004".into(),
                serial: Some("3a1b2c3d".into()),
            }],
        };
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();
        assert_eq!(json["devices"][0]["serial"], "3a1b2c3d");
    }
}
