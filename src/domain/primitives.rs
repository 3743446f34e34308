//! Domain primitives: TimeMs, WalletAddress, Timeframe.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed between `earlier` and `self`, saturating at zero.
    pub fn since(&self, earlier: TimeMs) -> i64 {
        self.0.saturating_sub(earlier.0).max(0)
    }

    /// Convert to a chrono UTC timestamp.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.0)
    }
}

impl From<DateTime<Utc>> for TimeMs {
    fn from(value: DateTime<Utc>) -> Self {
        TimeMs(value.timestamp_millis())
    }
}

/// Calendar day (UTC) used as the idempotency key of daily accrual.
pub fn utc_date(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid wallet address: {0}")]
pub struct AddressParseError(pub String);

/// EVM wallet address, normalised to lowercase `0x` + 40 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let hex_part = normalized
            .strip_prefix("0x")
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(WalletAddress(normalized))
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contract duration bucket in days (30, 90, 365, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timeframe(pub i64);

impl Timeframe {
    /// Bucket used when a position row carries no usable timeframe.
    pub const DEFAULT: Timeframe = Timeframe(365);

    pub fn days(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wallet_address_is_lowercased() {
        let addr =
            WalletAddress::from_str("0xABCDEFabcdef0123456789012345678901234567").unwrap();
        assert_eq!(addr.as_str(), "0xabcdefabcdef0123456789012345678901234567");
    }

    #[test]
    fn test_wallet_address_rejects_garbage() {
        assert!(WalletAddress::from_str("abc").is_err());
        assert!(WalletAddress::from_str("0x123").is_err());
        assert!(WalletAddress::from_str("0xzz00000000000000000000000000000000000000").is_err());
    }

    #[test]
    fn test_timems_since_saturates() {
        let t1 = TimeMs::new(1000);
        let t2 = TimeMs::new(2500);
        assert_eq!(t2.since(t1), 1500);
        assert_eq!(t1.since(t2), 0);
    }

    #[test]
    fn test_utc_date_uses_utc_calendar_day() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 59).unwrap();
        assert_eq!(utc_date(at).to_string(), "2026-03-14");
    }

    #[test]
    fn test_timeframe_display() {
        assert_eq!(Timeframe(90).to_string(), "90d");
        assert_eq!(Timeframe::DEFAULT.days(), 365);
    }
}
