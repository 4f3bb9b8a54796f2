//! Shard month implementation
//!
//! Every shard covers one calendar month. This module derives the `YYMM`
//! shard ID for a date and parses shard IDs back into month ranges.

use std::fmt;
use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Deserialize};
use crate::shard::{ShardId, ShardResult, ShardError};

/// The calendar month a shard holds events for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardMonth {
    year: i32,
    month: u32,
}

impl fmt::Display for ShardMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl ShardMonth {
    /// Create a shard month, rejecting years outside the `YYMM` window
    pub fn new(year: i32, month: u32) -> ShardResult<Self> {
        if !(2000..=2099).contains(&year) {
            return Err(ShardError::invalid_id(format!(
                "Year {} cannot be encoded as a two-digit shard year", year
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(ShardError::invalid_id(format!("Invalid month: {}", month)));
        }
        Ok(Self { year, month })
    }

    /// The shard month containing a date
    pub fn from_date(date: NaiveDate) -> ShardResult<Self> {
        Self::new(date.year(), date.month())
    }

    /// Year of the month
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month number, 1 through 12
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Create the `YYMM` shard ID
    pub fn shard_id(&self) -> ShardId {
        format!("{:02}{:02}", self.year % 100, self.month)
    }

    /// Parse a `YYMM` shard ID
    pub fn parse_shard_id(shard_id: &str) -> ShardResult<Self> {
        if shard_id.len() != 4 || !shard_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ShardError::invalid_id(format!("Invalid month shard ID: {}", shard_id)));
        }

        let year = shard_id[0..2].parse::<i32>().map_err(|_| {
            ShardError::invalid_id(format!("Invalid year in shard ID: {}", shard_id))
        })?;

        let month = shard_id[2..4].parse::<u32>().map_err(|_| {
            ShardError::invalid_id(format!("Invalid month in shard ID: {}", shard_id))
        })?;

        Self::new(2000 + year, month)
    }

    /// First day of this month and first day of the next one
    pub fn date_range(&self) -> ShardResult<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or_else(|| {
            ShardError::invalid_id(format!("Invalid date for shard month {}", self))
        })?;

        // The month after December 2099 is still a valid calendar date
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1).ok_or_else(|| {
            ShardError::invalid_id(format!("Invalid end date for shard month {}", self))
        })?;

        Ok((start, end))
    }

    /// Check if a date falls in this month
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// The following month, if it is still encodable
    pub fn next(&self) -> Option<Self> {
        if self.month == 12 {
            Self::new(self.year + 1, 1).ok()
        } else {
            Self::new(self.year, self.month + 1).ok()
        }
    }

    /// The preceding month, if it is still encodable
    pub fn previous(&self) -> Option<Self> {
        if self.month == 1 {
            Self::new(self.year - 1, 12).ok()
        } else {
            Self::new(self.year, self.month - 1).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_shard_id_creation() -> ShardResult<()> {
        assert_eq!(ShardMonth::from_date(date(2023, 5, 15))?.shard_id(), "2305");
        assert_eq!(ShardMonth::from_date(date(2024, 12, 31))?.shard_id(), "2412");
        assert_eq!(ShardMonth::from_date(date(2007, 1, 1))?.shard_id(), "0701");
        Ok(())
    }

    #[test]
    fn test_shard_id_parsing() -> ShardResult<()> {
        let month = ShardMonth::parse_shard_id("2305")?;
        assert_eq!(month.year(), 2023);
        assert_eq!(month.month(), 5);

        let (start, end) = month.date_range()?;
        assert_eq!(start, date(2023, 5, 1));
        assert_eq!(end, date(2023, 6, 1));

        let (start, end) = ShardMonth::parse_shard_id("2312")?.date_range()?;
        assert_eq!(start, date(2023, 12, 1));
        assert_eq!(end, date(2024, 1, 1));

        Ok(())
    }

    #[test]
    fn test_invalid_shard_ids() {
        for id in ["", "230", "23055", "2313", "2300", "23a5", "-305", "+305"] {
            assert!(ShardMonth::parse_shard_id(id).is_err(), "accepted {:?}", id);
        }
        assert!(ShardMonth::from_date(date(1999, 12, 31)).is_err());
        assert!(ShardMonth::from_date(date(2100, 1, 1)).is_err());
    }

    #[test]
    fn test_month_navigation() -> ShardResult<()> {
        let dec = ShardMonth::new(2023, 12)?;
        assert_eq!(dec.next(), Some(ShardMonth::new(2024, 1)?));
        assert_eq!(ShardMonth::new(2024, 1)?.previous(), Some(dec));
        assert_eq!(ShardMonth::new(2099, 12)?.next(), None);
        assert_eq!(ShardMonth::new(2000, 1)?.previous(), None);

        assert!(dec.contains(date(2023, 12, 25)));
        assert!(!dec.contains(date(2024, 12, 25)));
        Ok(())
    }

    proptest! {
        #[test]
        fn shard_id_order_matches_month_order(
            y1 in 2000i32..2100, m1 in 1u32..=12,
            y2 in 2000i32..2100, m2 in 1u32..=12,
        ) {
            let a = ShardMonth::new(y1, m1).unwrap();
            let b = ShardMonth::new(y2, m2).unwrap();
            prop_assert_eq!(a.cmp(&b), a.shard_id().cmp(&b.shard_id()));
        }

        #[test]
        fn every_day_maps_into_its_month_range(days in 0i64..36_500) {
            let day = date(2000, 1, 1) + chrono::Duration::days(days);
            let month = ShardMonth::from_date(day).unwrap();
            let (start, end) = month.date_range().unwrap();
            prop_assert!(start <= day && day < end);
            prop_assert_eq!(ShardMonth::parse_shard_id(&month.shard_id()).unwrap(), month);
        }
    }
}
