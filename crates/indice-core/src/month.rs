use crate::errors::InvalidInput;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Calendar month, displayed and stored as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn from_date(d: NaiveDate) -> Self {
        Self {
            year: d.year(),
            month: d.month(),
        }
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        Self::from_date(dt.date_naive())
    }

    pub fn add_months(&self, n: i32) -> Self {
        let total = self.year * 12 + (self.month as i32 - 1) + n;
        Self {
            year: total.div_euclid(12),
            month: total.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn succ(&self) -> Self {
        self.add_months(1)
    }

    pub fn pred(&self) -> Self {
        self.add_months(-1)
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next_month_start(&self) -> NaiveDate {
        self.succ().first_day()
    }

    /// Inclusive month range; empty when `to < from`.
    pub fn range_inclusive(from: YearMonth, to: YearMonth) -> Vec<YearMonth> {
        let mut out = Vec::new();
        let mut cur = from;
        while cur <= to {
            out.push(cur);
            cur = cur.succ();
        }
        out
    }

    /// Tolerant parse used for upstream documents: `YYYY-MM`, `YYYY/MM`,
    /// `YYYY-MM-DD`, `DD/MM/YYYY`, `YYYY/MM/DD` and timestamps.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let txt = raw.trim();
        if txt.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(txt) {
            return Some(Self::from_date(dt.date_naive()));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(txt, fmt) {
                return Some(Self::from_date(dt.date()));
            }
        }
        for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"] {
            if let Ok(d) = NaiveDate::parse_from_str(txt, fmt) {
                return Some(Self::from_date(d));
            }
        }
        let mut parts = txt.split(['-', '/']);
        let (y, m) = (parts.next()?, parts.next()?);
        if parts.next().is_some() || y.len() != 4 || m.is_empty() || m.len() > 2 {
            return None;
        }
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| InvalidInput(format!("month must be YYYY-MM, got {s:?}")))?;
        let year: i32 = y
            .parse()
            .map_err(|_| InvalidInput(format!("bad year in {s:?}")))?;
        let month: u32 = m
            .parse()
            .map_err(|_| InvalidInput(format!("bad month in {s:?}")))?;
        if y.len() != 4 || m.len() != 2 {
            return Err(InvalidInput(format!("month must be YYYY-MM, got {s:?}")));
        }
        YearMonth::new(year, month).ok_or_else(|| InvalidInput(format!("month out of range: {s:?}")))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
