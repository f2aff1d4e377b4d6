//! Extended duration grammar: the standard `ns..h` units plus days, weeks,
//! and months (30 days, approximate). Tokens sum, values may be fractional,
//! whitespace between tokens is ignored.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration format: {0}")]
    Invalid(String),
    #[error("invalid number in duration: {0}")]
    InvalidNumber(String),
    #[error("unknown time unit: {0}")]
    UnknownUnit(String),
}

// Multi-character units are ordered before their one-character prefixes so
// the leftmost-first alternation never splits "ms" into "m" + "s".
static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(months?|ms|us|µs|ns|w|d|h|m|s)").unwrap());

/// Parse a duration in the extended grammar, e.g. `90s`, `1.5h`, `2w3d`,
/// `1month2w3d12h30m`.
pub fn parse(input: &str) -> Result<Duration, DurationError> {
    let mut total_secs = 0f64;
    let mut consumed = String::new();
    let mut matched = false;

    for caps in TOKEN.captures_iter(input) {
        matched = true;
        consumed.push_str(caps.get(0).map(|m| m.as_str()).unwrap_or_default());

        let value: f64 = caps[1]
            .parse()
            .map_err(|_| DurationError::InvalidNumber(caps[1].to_string()))?;

        let unit_secs = match &caps[2] {
            "month" | "months" => 30.0 * 24.0 * 3600.0,
            "w" => 7.0 * 24.0 * 3600.0,
            "d" => 24.0 * 3600.0,
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            other => return Err(DurationError::UnknownUnit(other.to_string())),
        };

        total_secs += value * unit_secs;
    }

    if !matched {
        return Err(DurationError::Invalid(input.to_string()));
    }

    // The tokens must account for the whole input (modulo whitespace);
    // otherwise trailing garbage like "2w3x" would be silently accepted.
    if strip_whitespace(input) != strip_whitespace(&consumed) {
        return Err(DurationError::Invalid(input.to_string()));
    }

    Duration::try_from_secs_f64(total_secs).map_err(|_| DurationError::Invalid(input.to_string()))
}

/// Render a duration compactly for reason strings, e.g. `2h3m`, `47d12h30m`.
pub fn format(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        let ms = d.subsec_millis();
        return if ms > 0 { format!("{}ms", ms) } else { "0s".to_string() };
    }
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let mins = secs / 60;
    secs %= 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}d", days));
    }
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if mins > 0 {
        out.push_str(&format!("{}m", mins));
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_units_parse() {
        assert_eq!(parse("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse("100ns").unwrap(), Duration::from_nanos(100));
    }

    #[test]
    fn extended_units_parse() {
        assert_eq!(parse("1d").unwrap(), Duration::from_secs(24 * 3600));
        assert_eq!(parse("7d").unwrap(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(parse("2w").unwrap(), Duration::from_secs(14 * 24 * 3600));
        assert_eq!(parse("1month").unwrap(), Duration::from_secs(30 * 24 * 3600));
        assert_eq!(parse("2months").unwrap(), Duration::from_secs(60 * 24 * 3600));
    }

    #[test]
    fn tokens_sum() {
        assert_eq!(
            parse("2w3d").unwrap(),
            Duration::from_secs((14 + 3) * 24 * 3600)
        );
        // 1month + 2w + 3d = 47d, plus 12h30m
        assert_eq!(
            parse("1month2w3d12h30m").unwrap(),
            Duration::from_secs(47 * 24 * 3600 + 12 * 3600 + 30 * 60)
        );
    }

    #[test]
    fn whitespace_between_tokens_is_ignored() {
        assert_eq!(
            parse("2w 3d").unwrap(),
            Duration::from_secs((14 + 3) * 24 * 3600)
        );
        assert_eq!(parse("1h 30m").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn fractional_values_parse() {
        assert_eq!(parse("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse("0.5d").unwrap(), Duration::from_secs(12 * 3600));
    }

    #[test]
    fn zero_ttl_parses() {
        assert_eq!(parse("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        assert!(matches!(parse(""), Err(DurationError::Invalid(_))));
        assert!(matches!(parse("invalid"), Err(DurationError::Invalid(_))));
        // Trailing garbage must fail the completeness check.
        assert!(matches!(parse("2w3x"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse("5 bananas"), Err(DurationError::Invalid(_))));
        // Signed forms are outside the grammar.
        assert!(parse("-1h").is_err());
    }

    #[test]
    fn format_is_compact() {
        assert_eq!(format(Duration::from_secs(2 * 3600 + 3 * 60)), "2h3m");
        assert_eq!(format(Duration::from_secs(45)), "45s");
        assert_eq!(
            format(Duration::from_secs(47 * 24 * 3600 + 12 * 3600 + 30 * 60)),
            "47d12h30m"
        );
        assert_eq!(format(Duration::ZERO), "0s");
        assert_eq!(format(Duration::from_millis(250)), "250ms");
    }
}
