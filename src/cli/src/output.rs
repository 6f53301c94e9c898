//! Formatting helpers for CLI output.

use chrono::{DateTime, TimeZone, Utc};
use comfy_table::{ContentArrangement, Table};

use harness_agent::api;
use harness_agent::convert;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Convert wire milliseconds to a timestamp.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Format a timestamp relative to `now`, e.g. "5 minutes ago".
pub fn format_ago_from(dt: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(*dt);

    let secs = duration.num_seconds();
    if secs < 1 {
        return "just now".to_string();
    }
    if secs < 60 {
        return format!("{secs} seconds ago");
    }

    let mins = duration.num_minutes();
    if mins < 60 {
        return format!("{mins} minutes ago");
    }

    let hours = duration.num_hours();
    if hours < 24 {
        return format!("{hours} hours ago");
    }

    format!("{} days ago", duration.num_days())
}

/// Format wire milliseconds relative to now.
pub fn format_ago(millis: i64) -> String {
    match from_millis(millis) {
        Some(dt) => format_ago_from(&dt, &Utc::now()),
        None => "-".to_string(),
    }
}

/// Lowercase state name of a wire instance.
pub fn state_name(state: i32) -> String {
    match convert::state_from_api(state) {
        Ok(Some(state)) => state.to_string(),
        Ok(None) => "unspecified".to_string(),
        Err(_) => format!("unknown({state})"),
    }
}

/// `address:port`, or `-` before the instance is provisioned.
pub fn format_endpoint(endpoint: Option<&api::Endpoint>) -> String {
    match endpoint {
        Some(e) => format!("{}:{}", e.address, e.port),
        None => "-".to_string(),
    }
}

/// Comma-separated fault names, or `-`.
pub fn format_faults(faults: &[i32]) -> String {
    let names: Vec<String> = faults
        .iter()
        .map(|f| match convert::fault_from_api(*f) {
            Ok(fault) => fault.to_string(),
            Err(_) => format!("unknown({f})"),
        })
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(",")
    }
}

/// Parse a memory string like "512m", "2g" into megabytes.
pub fn parse_memory(s: &str) -> Result<u32, String> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err("empty memory value".to_string());
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("gb").or_else(|| s.strip_suffix('g')) {
        (n, 1024u32)
    } else if let Some(n) = s.strip_suffix("mb").or_else(|| s.strip_suffix('m')) {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };

    let num: u32 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid memory value: {s}"))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("memory value too large: {s}"))
}

/// Short form of an instance id for tables.
pub fn short_id(id: &str) -> &str {
    let end = id.len().min(12);
    id.get(..end).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ago_buckets() {
        let now = Utc::now();
        let ago = |secs: i64| format_ago_from(&(now - chrono::Duration::seconds(secs)), &now);
        assert_eq!(ago(0), "just now");
        assert_eq!(ago(30), "30 seconds ago");
        assert_eq!(ago(120), "2 minutes ago");
        assert_eq!(ago(3 * 3600), "3 hours ago");
        assert_eq!(ago(2 * 86400), "2 days ago");
    }

    #[test]
    fn test_format_ago_future_is_just_now() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(10);
        assert_eq!(format_ago_from(&later, &now), "just now");
    }

    #[test]
    fn test_from_millis() {
        let dt = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_state_name() {
        assert_eq!(state_name(api::InstanceState::Running as i32), "running");
        assert_eq!(state_name(0), "unspecified");
        assert_eq!(state_name(42), "unknown(42)");
    }

    #[test]
    fn test_format_endpoint() {
        let endpoint = api::Endpoint {
            address: "localhost".to_string(),
            port: 9000,
        };
        assert_eq!(format_endpoint(Some(&endpoint)), "localhost:9000");
        assert_eq!(format_endpoint(None), "-");
    }

    #[test]
    fn test_format_faults() {
        assert_eq!(format_faults(&[]), "-");
        assert_eq!(format_faults(&[api::FaultType::Jitter as i32]), "jitter");
        assert_eq!(format_faults(&[9]), "unknown(9)");
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory("512m").unwrap(), 512);
        assert_eq!(parse_memory("1024MB").unwrap(), 1024);
        assert_eq!(parse_memory("2g").unwrap(), 2048);
        assert_eq!(parse_memory("4GB").unwrap(), 4096);
        assert_eq!(parse_memory(" 768 ").unwrap(), 768);
    }

    #[test]
    fn test_parse_memory_invalid() {
        assert!(parse_memory("").is_err());
        assert!(parse_memory("lots").is_err());
        assert!(parse_memory("1.5g").is_err());
        assert!(parse_memory("9999999g").is_err());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
