//! Calendar-day windows for ledger aggregation.
//!
//! A window is a closed range of calendar days `[start, end]` in a fixed UTC
//! offset. The first second is local midnight of `start`, the last second is
//! `23:59:59` of `end`, so a window for `2020-05-01..2020-05-31` at `+08:00`
//! spans unix time `1588262400..=1590940799`.

use std::fmt;

use chrono::{Datelike, FixedOffset, Months, NaiveDate, TimeZone};

use crate::domain::error::{DomainError, TreeResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
const SECONDS_PER_HOUR: i32 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    start: NaiveDate,
    end: NaiveDate,
    offset: FixedOffset,
}

impl DayWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, offset: FixedOffset) -> TreeResult<Self> {
        if start > end {
            return Err(DomainError::InvalidWindow(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end, offset })
    }

    /// Parse `YYYY-MM-DD` boundaries.
    pub fn parse(start: &str, end: &str, offset: FixedOffset) -> TreeResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map_err(|e| DomainError::InvalidWindow(format!("{}: {}", s, e)))
        };
        Self::new(parse(start)?, parse(end)?, offset)
    }

    /// The whole calendar month `year-month`.
    pub fn month(year: i32, month: u32, offset: FixedOffset) -> TreeResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DomainError::InvalidWindow(format!("invalid month {}-{}", year, month)))?;
        let end = last_day_of_month(start)?;
        Self::new(start, end, offset)
    }

    /// `days` calendar days ending with (and including) `end`.
    pub fn trailing_days(end: NaiveDate, days: u32, offset: FixedOffset) -> TreeResult<Self> {
        let span = chrono::Duration::days(i64::from(days.max(1)) - 1);
        let start = end
            .checked_sub_signed(span)
            .ok_or_else(|| DomainError::InvalidWindow(format!("{} days before {}", days, end)))?;
        Self::new(start, end, offset)
    }

    /// Month-aligned shift: the start moves to the first day of its month
    /// shifted by `months`, the end to the last day of its shifted month.
    pub fn shift_months(&self, months: i32) -> TreeResult<Self> {
        let shift = |date: NaiveDate| {
            let first = date.with_day(1).unwrap_or(date);
            let delta = Months::new(months.unsigned_abs());
            let shifted = if months >= 0 {
                first.checked_add_months(delta)
            } else {
                first.checked_sub_months(delta)
            };
            shifted.ok_or_else(|| {
                DomainError::InvalidWindow(format!("cannot shift {} by {} months", date, months))
            })
        };
        let start = shift(self.start)?;
        let end = last_day_of_month(shift(self.end)?)?;
        Self::new(start, end, self.offset)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// First second of the window (local midnight of `start`).
    pub fn start_ts(&self) -> i64 {
        self.local_ts(self.start, 0, 0, 0)
    }

    /// Last second of the window (`23:59:59` of `end`).
    pub fn end_ts(&self) -> i64 {
        self.local_ts(self.end, 23, 59, 59)
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start_ts() && ts <= self.end_ts()
    }

    fn local_ts(&self, date: NaiveDate, h: u32, m: u32, s: u32) -> i64 {
        // a fixed offset has exactly one mapping for every local time
        date.and_hms_opt(h, m, s)
            .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            .map(|dt| dt.timestamp())
            .unwrap_or_default()
    }
}

impl fmt::Display for DayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} ({})", self.start, self.end, self.offset)
    }
}

/// Fixed offset from whole hours east of UTC.
pub fn offset_hours(hours: i32) -> TreeResult<FixedOffset> {
    FixedOffset::east_opt(hours * SECONDS_PER_HOUR)
        .ok_or_else(|| DomainError::InvalidWindow(format!("utc offset out of range: {}h", hours)))
}

fn last_day_of_month(date: NaiveDate) -> TreeResult<NaiveDate> {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| DomainError::InvalidWindow(format!("no month end for {}", date)))
}
