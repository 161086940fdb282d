//! Duration parsing for timeout values like "5s", "500ms" or "1m30s".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string made of one or more `<number><unit>` segments.
///
/// Supported units:
/// - `ms` - milliseconds
/// - `s` - seconds
/// - `m` - minutes
/// - `h` - hours
/// - `d` - days (24 hours)
///
/// The input is case-insensitive and whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use fingrab::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        anyhow::bail!("Duration is empty");
    }

    let mut total = Duration::ZERO;
    let mut rest = s.as_str();
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .context("Duration must end with ms, s, m, h, or d")?;
        if digits == 0 {
            anyhow::bail!("Invalid number in duration: {s}");
        }
        let num: u64 = rest[..digits]
            .parse()
            .with_context(|| format!("Invalid number in duration: {s}"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let segment = match &rest[..unit_len] {
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(num.checked_mul(60).context("Duration is too large")?),
            "h" => Duration::from_secs(
                num.checked_mul(60 * 60)
                    .context("Duration is too large")?,
            ),
            "d" => Duration::from_secs(
                num.checked_mul(24 * 60 * 60)
                    .context("Duration is too large")?,
            ),
            other => anyhow::bail!("Unknown duration unit {other:?}"),
        };
        total = total
            .checked_add(segment)
            .context("Duration is too large")?;
        rest = &rest[unit_len..];
    }

    Ok(total)
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("750ms").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("90d").unwrap(), Duration::from_secs(90 * 86400));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_duration("1s500ms").unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(parse_duration(" 10S ").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("\t1H\n").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_invalid_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1.5s").is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        let max = u64::MAX.to_string();
        assert!(parse_duration(&format!("{max}d")).is_err());
        assert!(parse_duration(&format!("{max}h")).is_err());
    }

    #[test]
    fn test_serde_deserialize() {
        #[derive(Deserialize)]
        struct TestConfig {
            #[serde(deserialize_with = "deserialize_duration")]
            timeout: Duration,
        }

        let config: TestConfig = toml::from_str(r#"timeout = "5s""#).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
