//! Time parsing and formatting utilities for Jira datetime strings

use chrono::{DateTime, FixedOffset, TimeZone};
use log::debug;

use crate::config::ClockFormat;

/// Parse a Jira datetime string like "2025-12-02T09:00:00.000+0000"
pub fn parse_jira_timestamp(started: &str) -> Option<DateTime<FixedOffset>> {
    // Normalize timezone offset: convert "+0800" to "+08:00" format for parsing
    let normalized = normalize_timezone_offset(started.trim());

    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.3f%:z") {
        return Some(dt);
    }

    // Fallback: try without milliseconds
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%:z") {
        return Some(dt);
    }

    debug!("unparseable Jira timestamp: {}", started);
    None
}

/// Short clock label for a point in time, e.g. "9:00 AM" or "09:00"
pub fn format_clock_time<Tz: TimeZone>(time: &DateTime<Tz>, clock_format: ClockFormat) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match clock_format {
        ClockFormat::Hour12 => time.format("%-I:%M %p").to_string(),
        ClockFormat::Hour24 => time.format("%H:%M").to_string(),
    }
}

/// Normalize timezone offset from "+0800" to "+08:00" format for chrono parsing
fn normalize_timezone_offset(started: &str) -> String {
    if started.len() > 5 {
        let bytes = started.as_bytes();
        let len = bytes.len();
        // Check if it ends with a 4-digit offset (no colon)
        if (bytes[len - 5] == b'+' || bytes[len - 5] == b'-')
            && bytes[len - 4].is_ascii_digit()
            && bytes[len - 3].is_ascii_digit()
            && bytes[len - 2].is_ascii_digit()
            && bytes[len - 1].is_ascii_digit()
        {
            return format!("{}:{}", &started[..len - 2], &started[len - 2..]);
        }
    }
    started.to_string()
}
