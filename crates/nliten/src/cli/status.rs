//! `status` subcommand — one health check, printed.

use chrono::{DateTime, Local};
use nliten_lib::monitor::{HealthReport, check_health};

use super::{Context, Result, StatusOutput, SummaryJson, kv, kv_indent, kv_width, print_json, time};

fn format_epoch(epoch: i64) -> String {
    match DateTime::from_timestamp(epoch, 0) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => epoch.to_string(),
    }
}

pub(super) fn status_output(system_id: &str, report: &HealthReport) -> StatusOutput {
    StatusOutput {
        version: env!("CARGO_PKG_VERSION").into(),
        system_id: system_id.into(),
        state: report.state(),
        health: report.health,
        summary: report.summary.as_ref().map(|s| SummaryJson {
            status: s.status.clone(),
            current_power: s.current_power,
            energy_today: s.energy_today,
            last_report_at: s.last_report_at.0,
        }),
        stats_checked: report.stats.is_some(),
        error: report.error.as_ref().map(|e| e.to_string()),
    }
}

pub(super) fn cmd_status(ctx: &Context, json: bool) -> Result<()> {
    let mut client = ctx.connect()?;
    let report = check_health(&mut client, time::now_epoch(), ctx.config.update_interval());
    let output = status_output(client.system_id(), &report);

    if json {
        return print_json(&output);
    }

    let w = kv_width(
        &["System:", "State:", "Summary:"],
        &["Status:", "Power:", "Energy today:", "Last report:"],
    );
    kv("System:", &output.system_id, w);
    kv("State:", output.state, w);
    kv(
        "Health:",
        format_args!(
            "current={}, normal={}",
            output.health.current, output.health.normal
        ),
        w,
    );
    match &output.summary {
        Some(s) => {
            println!("Summary:");
            kv_indent("Status:", &s.status, w);
            if let Some(p) = s.current_power {
                kv_indent("Power:", format_args!("{p} W"), w);
            }
            if let Some(e) = s.energy_today {
                kv_indent("Energy today:", format_args!("{e} Wh"), w);
            }
            kv_indent("Last report:", format_epoch(s.last_report_at), w);
        }
        None => kv("Summary:", "(unavailable)", w),
    }
    if let Some(e) = &output.error {
        kv("Error:", e, w);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nliten_lib::api::ApiError;
    use nliten_lib::monitor::{Health, IndicatorState};

    #[test]
    fn failed_fetch_reports_fault_and_error() {
        let report = HealthReport {
            health: Health::UNKNOWN,
            summary: None,
            stats: None,
            error: Some(ApiError::Status {
                status: 503,
                body: String::new(),
            }),
        };
        let out = status_output("67", &report);
        assert_eq!(out.state, IndicatorState::Fault);
        assert!(out.summary.is_none());
        assert!(!out.stats_checked);
        assert!(out.error.unwrap().contains("503"));
    }

    #[test]
    fn format_epoch_out_of_range_falls_back() {
        assert_eq!(format_epoch(i64::MAX), i64::MAX.to_string());
    }
}
