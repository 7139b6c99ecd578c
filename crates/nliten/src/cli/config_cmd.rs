//! `config` subcommand — show the resolved configuration.

use super::{
    ConfigOutput, Context, CredentialsJson, DEFAULT_BASE_URL, IndicatorState, Result, config,
    describe_pair, kv, kv_indent, kv_width, led, print_json,
};

fn credentials_view(ctx: &Context) -> (CredentialsJson, Option<String>) {
    match ctx
        .config
        .resolve_credentials(&ctx.overrides, |var| std::env::var(var).ok())
    {
        Ok(c) => (
            CredentialsJson {
                api_key: Some(config::mask_secret(&c.api_key)),
                uid: Some(c.uid),
                sys_id: c.sys_id,
                complete: true,
            },
            None,
        ),
        Err(e) => (
            CredentialsJson {
                api_key: None,
                uid: None,
                sys_id: None,
                complete: false,
            },
            Some(e.to_string()),
        ),
    }
}

pub(super) fn config_output(ctx: &Context) -> ConfigOutput {
    let (credentials, missing) = credentials_view(ctx);
    let mut problems: Vec<String> = match ctx.config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };
    problems.extend(missing);
    ConfigOutput {
        config_file: ctx.config_file.as_ref().map(|p| p.display().to_string()),
        settings: ctx.config.redacted(),
        credentials,
        problems,
    }
}

pub(super) fn cmd_config(ctx: &Context, json: bool) -> Result<()> {
    let output = config_output(ctx);
    if json {
        return print_json(&output);
    }

    let s = &output.settings;
    let w = kv_width(
        &["Config file:"],
        &[
            "apiKey:",
            "uid:",
            "sysId:",
            "rate:",
            "hitsPerMin:",
            "updateInterval:",
            "retryDelay:",
            "watchdogPattern:",
            "deviceSerial:",
            "apiBaseUrl:",
            "abnormal:",
        ],
    );

    match &output.config_file {
        Some(p) => kv("Config file:", format_args!("{p} (loaded)"), w),
        None => kv("Config file:", "(not found, using defaults)", w),
    }
    println!();

    println!("Credentials:");
    let c = &output.credentials;
    kv_indent("apiKey:", c.api_key.as_deref().unwrap_or("(missing)"), w);
    kv_indent("uid:", c.uid.as_deref().unwrap_or("(missing)"), w);
    kv_indent("sysId:", c.sys_id.as_deref().unwrap_or("(first system)"), w);
    println!();

    println!("Settings:");
    kv_indent("rate:", format_args!("{} h", s.rate), w);
    kv_indent("hitsPerMin:", s.hits_per_min, w);
    kv_indent("updateInterval:", format_args!("{} s", s.update_interval), w);
    kv_indent("retryDelay:", format_args!("{} s", s.retry_delay), w);
    kv_indent("fadeMs:", s.fade_ms, w);
    kv_indent("watchdog:", format_args!("{} ms", s.watchdog), w);
    if s.watchdog_pattern.is_empty() {
        kv_indent("watchdogPattern:", "(built-in red wig-wag)", w);
    } else {
        kv_indent(
            "watchdogPattern:",
            format_args!("{} line(s)", s.watchdog_pattern.len()),
            w,
        );
    }
    kv_indent(
        "deviceSerial:",
        if s.device_serial.is_empty() {
            "(first device)"
        } else {
            s.device_serial.as_str()
        },
        w,
    );
    kv_indent("logLevel:", &s.log_level, w);
    match &s.log_file {
        Some(p) => kv_indent("logFile:", p.display(), w),
        None => kv_indent("logFile:", "(stderr)", w),
    }
    kv_indent(
        "apiBaseUrl:",
        s.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
        w,
    );
    println!();

    println!("Palette:");
    match led::resolve_palette(&s.palette) {
        Ok(palette) => {
            for state in IndicatorState::ALL {
                kv_indent(
                    &format!("{state}:"),
                    describe_pair(palette.colors(state)),
                    w,
                );
            }
        }
        Err(_) => println!("  (invalid, see problems below)"),
    }

    if !output.problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &output.problems {
            println!("  - {p}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nliten_lib::config::{Config, CredentialOverrides};
    use nliten_lib::shutdown::Shutdown;

    fn ctx(config: Config, overrides: CredentialOverrides) -> Context {
        Context {
            config,
            config_file: None,
            overrides,
            iso_format: false,
            verbose: 0,
            shutdown: Shutdown::new(),
        }
    }

    #[test]
    fn complete_credentials_are_masked() {
        let c = ctx(
            Config::default(),
            CredentialOverrides {
                api_key: Some("abcdef0123456789".into()),
                uid: Some("4d7a45774e6a41320a".into()),
                sys_id: None,
            },
        );
        let out = config_output(&c);
        assert!(out.credentials.complete);
        assert_eq!(out.credentials.api_key.as_deref(), Some("************6789"));
        assert!(out.problems.is_empty());
    }

    #[test]
    fn invalid_settings_listed_as_problems() {
        let config = Config {
            rate: 48,
            api_key: Some("key".into()),
            uid: Some("uid".into()),
            ..Config::default()
        };
        let out = config_output(&ctx(config, CredentialOverrides::default()));
        assert!(out.problems.iter().any(|p| p.contains("rate")));
        assert_eq!(out.settings.api_key.as_deref(), Some("***"));
    }
}
