use std::path::PathBuf;
use std::time::Duration;

use crate::model::{MINUTE_MS, Ms};
use crate::slot::{TimeSlot, ValidationError};

/// Host settings, read from `COURTSIDE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Courts 1..=courts are provisioned at startup when missing.
    pub courts: u32,
    pub sweep_interval: Duration,
    pub reminder_window: Duration,
    pub max_booking: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            courts: 6,
            sweep_interval: Duration::from_secs(60),
            reminder_window: Duration::from_secs(15 * 60),
            max_booking: Duration::from_secs(120 * 60),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing or unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("ignoring {key}={raw:?}: not a valid value");
                    None
                }
            }
        }

        let defaults = Self::default();
        Self {
            data_dir: lookup("COURTSIDE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            courts: parsed(&lookup, "COURTSIDE_COURTS").unwrap_or(defaults.courts),
            sweep_interval: parsed(&lookup, "COURTSIDE_SWEEP_INTERVAL_SECS")
                .filter(|&s: &u64| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            reminder_window: parsed(&lookup, "COURTSIDE_REMINDER_WINDOW_MINS")
                .map(|m: u64| Duration::from_secs(m * 60))
                .unwrap_or(defaults.reminder_window),
            max_booking: parsed(&lookup, "COURTSIDE_MAX_BOOKING_MINS")
                .filter(|&m: &u64| m > 0)
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.max_booking),
            compact_threshold: parsed(&lookup, "COURTSIDE_COMPACT_THRESHOLD")
                .filter(|&n: &u64| n > 0)
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "COURTSIDE_METRICS_PORT"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("courtside.wal")
    }

    pub fn max_booking_ms(&self) -> Ms {
        (self.max_booking.as_secs() / 60) as Ms * MINUTE_MS
    }

    /// Validate a requested slot under this host's duration limit.
    pub fn parse_slot(&self, date: &str, start: &str, end: &str, now: Ms) -> Result<TimeSlot, ValidationError> {
        TimeSlot::parse(date, start, end, now, self.max_booking_ms())
    }
}
