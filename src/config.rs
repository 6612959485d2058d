use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

/// Defaults of the "next open days" lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Days after today to scan (today itself is never offered).
    pub horizon_days: u32,
    /// A day with this many bookings is full.
    pub capacity_per_day: usize,
    /// Stop after this many open days.
    pub limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon_days: 13,
            capacity_per_day: 8,
            limit: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Offset that defines where a calendar day starts and ends.
    pub utc_offset: FixedOffset,
    pub planner: PlannerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset: utc(),
            planner: PlannerConfig::default(),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

impl EngineConfig {
    /// Config with the day boundary `minutes` east of UTC.
    /// Out-of-range offsets (beyond ±24h) fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let utc_offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(utc);
        Self {
            utc_offset,
            ..Self::default()
        }
    }
}

/// Daemon settings, read from `SLOTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub directory_path: PathBuf,
    pub engine: EngineConfig,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(lookup("SLOTBOOK_DATA_DIR").unwrap_or_else(|| "./data".into()));
        let directory_path = lookup("SLOTBOOK_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("directory.json"));
        let offset_minutes: i32 = parse_or(&lookup, "SLOTBOOK_UTC_OFFSET_MINUTES", 0);
        let sweep_secs: u64 = parse_or(&lookup, "SLOTBOOK_SWEEP_INTERVAL_SECS", 60);
        let compact_threshold: u64 = parse_or(&lookup, "SLOTBOOK_COMPACT_THRESHOLD", 1000);
        let metrics_port = lookup("SLOTBOOK_METRICS_PORT").and_then(|s| s.parse().ok());

        Self {
            data_dir,
            directory_path,
            engine: EngineConfig::with_offset_minutes(offset_minutes),
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            compact_threshold,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{key}={raw:?} is not valid, using default");
            default
        }),
        None => default,
    }
}
