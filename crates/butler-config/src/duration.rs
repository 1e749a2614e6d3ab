//! Human-readable durations (`"300s"`, `"5m"`, `"1500ms"`)

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Parse a duration string
///
/// # Errors
///
/// Returns an error if the string is not a valid duration expression
pub fn parse(s: &str) -> Result<Duration, String> {
    duration_str::parse(s).map_err(|e| format!("invalid duration '{s}': {e}"))
}

/// Serde adapter for duration strings
///
/// # Errors
///
/// Returns a deserialization error if the value is not a valid duration
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_units() {
        assert_eq!(parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse("1500ms").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn rejects_garbage() {
        let err = parse("soon").unwrap_err();
        assert!(err.contains("soon"));
    }
}
