//! Typed views of the Enlighten payloads the monitor reads.
//!
//! Only the fields the tool uses are modelled; everything else in the
//! vendor JSON is ignored. The `query` command dumps raw JSON instead.

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Seconds since the Unix epoch.
///
/// The API reports times as epoch integers by default and as ISO-8601
/// strings when `datetime_format=iso8601` is set; both decode to the same
/// value here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Epoch(i64),
            Float(f64),
            Iso(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Epoch(secs) => Ok(Timestamp(secs)),
            Raw::Float(secs) => Ok(Timestamp(secs as i64)),
            Raw::Iso(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Timestamp(dt.timestamp()))
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{s}': {e}"))),
        }
    }
}

/// `GET /systems/{id}/summary`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Summary {
    pub system_id: u64,
    #[serde(default)]
    pub modules: Option<u32>,
    #[serde(default)]
    pub size_w: Option<u64>,
    #[serde(default)]
    pub current_power: Option<i64>,
    #[serde(default)]
    pub energy_today: Option<i64>,
    #[serde(default)]
    pub energy_lifetime: Option<i64>,
    pub status: String,
    pub last_report_at: Timestamp,
    #[serde(default)]
    pub last_interval_end_at: Option<Timestamp>,
    #[serde(default)]
    pub summary_date: Option<String>,
}

/// `meta` block shared by stats-style responses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsMeta {
    pub status: String,
    pub last_report_at: Timestamp,
    #[serde(default)]
    pub last_energy_at: Option<Timestamp>,
    #[serde(default)]
    pub operational_at: Option<Timestamp>,
}

/// One five-minute microinverter interval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Interval {
    pub end_at: Timestamp,
    #[serde(default)]
    pub devices_reporting: Option<u32>,
    #[serde(default)]
    pub powr: Option<i64>,
    #[serde(default)]
    pub enwh: Option<i64>,
}

/// `GET /systems/{id}/stats`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Stats {
    pub system_id: u64,
    #[serde(default)]
    pub total_devices: Option<u32>,
    pub meta: StatsMeta,
    #[serde(default)]
    pub intervals: Vec<Interval>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemEntry {
    pub system_id: u64,
    #[serde(default)]
    pub system_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub last_report_at: Option<Timestamp>,
}

/// `GET /systems`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SystemsPage {
    #[serde(default)]
    pub systems: Vec<SystemEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_from_epoch() {
        let ts: Timestamp = serde_json::from_value(json!(1_384_976_200)).unwrap();
        assert_eq!(ts, Timestamp(1_384_976_200));
    }

    #[test]
    fn timestamp_from_iso8601_with_offset() {
        let ts: Timestamp = serde_json::from_value(json!("2013-11-20T11:36:40-08:00")).unwrap();
        assert_eq!(ts, Timestamp(1_384_976_200));
    }

    #[test]
    fn timestamp_rejects_garbage() {
        let result: Result<Timestamp, _> = serde_json::from_value(json!("yesterday"));
        assert!(result.is_err());
    }

    #[test]
    fn summary_ignores_unknown_fields() {
        let summary: Summary = serde_json::from_value(json!({
            "system_id": 67,
            "modules": 35,
            "size_w": 6270,
            "current_power": 271,
            "energy_today": 30030,
            "energy_lifetime": 59847036,
            "summary_date": "2016-07-29",
            "source": "microinverters",
            "status": "normal",
            "operational_at": 1201362300,
            "last_report_at": 1469830983,
            "last_interval_end_at": 1469830800
        }))
        .unwrap();
        assert_eq!(summary.system_id, 67);
        assert_eq!(summary.status, "normal");
        assert_eq!(summary.last_report_at, Timestamp(1469830983));
        assert_eq!(summary.current_power, Some(271));
    }

    #[test]
    fn summary_requires_status() {
        let result: Result<Summary, _> = serde_json::from_value(json!({
            "system_id": 67,
            "last_report_at": 1469830983
        }));
        assert!(result.is_err());
    }

    #[test]
    fn stats_with_meta_and_intervals() {
        let stats: Stats = serde_json::from_value(json!({
            "system_id": 66,
            "total_devices": 35,
            "intervals": [
                {"end_at": 1384122900, "devices_reporting": 35, "powr": 1201, "enwh": 100}
            ],
            "meta": {
                "status": "comm",
                "last_report_at": 1384122939,
                "last_energy_at": 1384122900,
                "operational_at": 1357023600
            }
        }))
        .unwrap();
        assert_eq!(stats.meta.status, "comm");
        assert_eq!(stats.intervals.len(), 1);
        assert_eq!(stats.intervals[0].powr, Some(1201));
    }

    #[test]
    fn stats_without_intervals_defaults_empty() {
        let stats: Stats = serde_json::from_value(json!({
            "system_id": 66,
            "meta": {"status": "normal", "last_report_at": 1}
        }))
        .unwrap();
        assert!(stats.intervals.is_empty());
    }

    #[test]
    fn systems_page_lists_entries() {
        let page: SystemsPage = serde_json::from_value(json!({
            "systems": [
                {"system_id": 67, "system_name": "Eich Residence", "status": "normal",
                 "timezone": "America/Los_Angeles", "last_report_at": "2016-07-29T14:23:03-07:00"}
            ],
            "count": 1
        }))
        .unwrap();
        assert_eq!(page.systems.len(), 1);
        assert_eq!(page.systems[0].system_name.as_deref(), Some("Eich Residence"));
    }
}
