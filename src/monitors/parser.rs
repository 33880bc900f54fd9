//! Probe output parsing
//!
//! Parsing is total: every field is validated on its own and anything
//! absent or malformed degrades to a default (`0` for numbers, `"0.0"`
//! for the load average).

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::trace;

use super::session::{Probe, ProbeResults};
use crate::Sample;

/// Load average text stored when the probe gave nothing usable
pub const DEFAULT_LOAD_AVERAGE: &str = "0.0";

static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)%?$").expect("valid percentage regex"));

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(?:\.[0-9]+)?$").expect("valid decimal regex"));

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid integer regex"));

/// Build a sample from raw probe output
pub fn parse_sample(results: &ProbeResults, collected_at: DateTime<Utc>) -> Sample {
    let sample = Sample {
        cpu_usage: parse_percentage(results.output(Probe::Cpu)),
        memory_usage: parse_percentage(results.output(Probe::Memory)),
        disk_usage: parse_percentage(results.output(Probe::Disk)),
        load_average: parse_load_average(results.output(Probe::LoadAverage)),
        process_count: parse_count(results.output(Probe::ProcessCount)),
        collected_at,
    };
    trace!("parsed sample: {sample:?}");
    sample
}

/// A usage percentage in `0..=100`, optionally with a trailing `%`
pub fn parse_percentage(raw: Option<&str>) -> f32 {
    raw.map(str::trim)
        .and_then(|text| PERCENTAGE.captures(text))
        .and_then(|captures| captures.get(1))
        .and_then(|value| value.as_str().parse::<f32>().ok())
        .filter(|value| value.is_finite() && (0.0..=100.0).contains(value))
        .unwrap_or_default()
}

pub fn parse_load_average(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|text| DECIMAL.is_match(text))
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_LOAD_AVERAGE.to_string())
}

pub fn parse_count(raw: Option<&str>) -> u32 {
    raw.map(str::trim)
        .filter(|text| INTEGER.is_match(text))
        .and_then(|text| text.parse().ok())
        .unwrap_or_default()
}
