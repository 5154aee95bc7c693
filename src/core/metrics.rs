//! Blocked-connection usage counters.
//!
//! The filter keeps running totals in a small JSON file; this side only reads
//! them for display.

use std::path::PathBuf;

use serde::Deserialize;

use crate::constants;

/// Day, week and all-time blocked-connection counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct BlockMetrics {
    #[serde(default)]
    pub day: Option<u64>,
    #[serde(default)]
    pub week: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl BlockMetrics {
    #[must_use]
    pub fn day_string(&self) -> String {
        format_count(self.day)
    }

    #[must_use]
    pub fn week_string(&self) -> String {
        format_count(self.week)
    }

    #[must_use]
    pub fn total_string(&self) -> String {
        format_count(self.total)
    }
}

impl std::fmt::Display for BlockMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "today {} / week {} / all time {}",
            self.day_string(),
            self.week_string(),
            self.total_string()
        )
    }
}

/// Format a count with thousands separators.
fn format_count(count: Option<u64>) -> String {
    let Some(count) = count else {
        return constants::MSG_NO_DATA.to_string();
    };
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Read-only access to the current counters.
pub trait MetricsSource: Send + Sync {
    fn snapshot(&self) -> BlockMetrics;
}

/// Counters read from the filter's metrics file.
#[derive(Debug, Clone)]
pub struct FileMetricsSource {
    path: PathBuf,
}

impl FileMetricsSource {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl MetricsSource for FileMetricsSource {
    fn snapshot(&self) -> BlockMetrics {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return BlockMetrics::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            log::debug!("[metrics] unreadable {}: {e}", self.path.display());
            BlockMetrics::default()
        })
    }
}
