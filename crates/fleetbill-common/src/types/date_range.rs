//! Billing window resolution
//!
//! A period selector is one of:
//! - absent: start of the current calendar month (UTC) until now
//! - `Nd`: the last N days until now
//! - `YYYY-MM-DD`: that date at 00:00 UTC until now

use crate::error::{FleetBillError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static DAYS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)d$").unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Accepted selector syntaxes, quoted in validation errors
pub const ACCEPTED_SELECTORS: &str = "use YYYY-MM-DD or Nd (e.g. 7d, 30d)";

/// Concrete UTC window with second precision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Window start (inclusive)
    pub since: DateTime<Utc>,
    /// Window end
    pub until: DateTime<Utc>,
    /// Short human label, e.g. "Jan 1 – Jan 15"
    pub label: String,
}

impl DateRange {
    /// Build a range from explicit bounds, truncating to whole seconds
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self> {
        let since = since.trunc_subsecs(0);
        let until = until.trunc_subsecs(0);
        if since > until {
            return Err(FleetBillError::Validation(format!(
                "Range start {} is after its end {}",
                since.format("%Y-%m-%dT%H:%M:%SZ"),
                until.format("%Y-%m-%dT%H:%M:%SZ")
            )));
        }
        Ok(Self {
            label: Self::format_label(since, until),
            since,
            until,
        })
    }

    /// Resolve a period selector against the wall clock
    pub fn resolve_now(selector: Option<&str>) -> Result<Self> {
        Self::resolve(selector, Utc::now())
    }

    /// Resolve a period selector against a fixed instant
    pub fn resolve(selector: Option<&str>, now: DateTime<Utc>) -> Result<Self> {
        let now = now.trunc_subsecs(0);

        let Some(selector) = selector else {
            let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| FleetBillError::Internal("month start out of range".into()))?;
            return Self::new(first.and_utc(), now);
        };

        if let Some(caps) = DAYS_RE.captures(selector) {
            let since = caps[1]
                .parse::<i64>()
                .ok()
                .and_then(Duration::try_days)
                .and_then(|span| now.checked_sub_signed(span))
                .ok_or_else(|| Self::invalid(selector, "day count out of range"))?;
            return Self::new(since, now);
        }

        if DATE_RE.is_match(selector) {
            let since = NaiveDate::parse_from_str(selector, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| Self::invalid(selector, "not a calendar date"))?
                .and_utc();
            if since > now {
                return Err(Self::invalid(selector, "date is in the future"));
            }
            return Self::new(since, now);
        }

        Err(FleetBillError::Validation(format!(
            "Invalid period selector '{}': {}",
            selector, ACCEPTED_SELECTORS
        )))
    }

    fn invalid(selector: &str, why: &str) -> FleetBillError {
        FleetBillError::Validation(format!(
            "Invalid period selector '{}' ({}): {}",
            selector, why, ACCEPTED_SELECTORS
        ))
    }

    fn format_label(since: DateTime<Utc>, until: DateTime<Utc>) -> String {
        format!("{} – {}", since.format("%b %-d"), until.format("%b %-d"))
    }

    /// Start as `YYYY-MM-DDTHH:MM:SSZ`
    pub fn since_iso(&self) -> String {
        self.since.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// End as `YYYY-MM-DDTHH:MM:SSZ`
    pub fn until_iso(&self) -> String {
        self.until.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Zero-length (degenerate) window
    pub fn is_empty(&self) -> bool {
        self.since == self.until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_default_is_month_to_date() {
        let range = DateRange::resolve(None, fixed_now()).unwrap();
        assert_eq!(range.since, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(range.until, fixed_now());
        assert_eq!(range.label, "Jan 1 – Jan 15");
    }

    #[test]
    fn test_days_selector() {
        let range = DateRange::resolve(Some("7d"), fixed_now()).unwrap();
        assert_eq!(range.since, fixed_now() - Duration::days(7));
        assert_eq!(range.until, fixed_now());
        assert_eq!(range.label, "Jan 8 – Jan 15");
    }

    #[test]
    fn test_zero_days_is_degenerate() {
        let range = DateRange::resolve(Some("0d"), fixed_now()).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_date_selector() {
        let range = DateRange::resolve(Some("2023-12-20"), fixed_now()).unwrap();
        assert_eq!(range.since_iso(), "2023-12-20T00:00:00Z");
        assert_eq!(range.until_iso(), "2024-01-15T12:30:45Z");
        assert_eq!(range.label, "Dec 20 – Jan 15");
    }

    #[test]
    fn test_subsecond_precision_is_dropped() {
        let now = fixed_now() + Duration::milliseconds(750);
        let range = DateRange::resolve(Some("1d"), now).unwrap();
        assert_eq!(range.until, fixed_now());
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in ["yesterday", "7", "d7", "7w", "2024-1-5", " 7d", "2024-02-30", "2025-01-01"] {
            let err = DateRange::resolve(Some(bad), fixed_now()).unwrap_err();
            match err {
                FleetBillError::Validation(msg) => {
                    assert!(msg.contains(bad), "message should name input: {msg}");
                    assert!(msg.contains("YYYY-MM-DD"));
                    assert!(msg.contains("Nd"));
                }
                other => panic!("unexpected error for {bad}: {other}"),
            }
        }
    }

    #[test]
    fn test_huge_day_count_rejected() {
        let err = DateRange::resolve(Some("99999999999999999999d"), fixed_now()).unwrap_err();
        assert!(matches!(err, FleetBillError::Validation(_)));
    }

    #[test]
    fn test_serializes_iso_timestamps() {
        let range = DateRange::resolve(Some("7d"), fixed_now()).unwrap();
        let json = serde_json::to_value(&range).unwrap();
        assert_eq!(json["since"], "2024-01-08T12:30:45Z");
        assert_eq!(json["until"], "2024-01-15T12:30:45Z");
    }
}
