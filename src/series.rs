//! Monthly time series and date alignment.
//!
//! Every source reports dates differently (month-start bars, month-end
//! observations, `YYYYMM` factor rows, US-style fund sheets). They all
//! collapse onto a [`Period`], and a [`Frame`] keeps only the months every
//! input agrees on.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A calendar month, stored as the first day of that month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Period(NaiveDate);

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %b %Y", "%d %B %Y"];

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    /// Unix seconds, as reported by the market-data chart endpoint.
    pub fn from_timestamp(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(|dt| Self::from_date(dt.date_naive()))
    }

    /// Normalises any of the date spellings found in the inputs to its month.
    ///
    /// Accepted: `2020-01-31`, `2020/01/31`, `01/31/2020`, `2020-01`,
    /// `202001`, `Jan 2020`, `January 2020`, and ISO timestamps.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() {
            bail!("empty date");
        }

        // 2020-01-31T00:00:00Z
        let s = match s.find('T') {
            Some(idx) if idx == 10 => &s[..idx],
            _ => s,
        };

        if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) {
            let year: i32 = s[..4].parse()?;
            let month: u32 = s[4..].parse()?;
            return Self::new(year, month).ok_or_else(|| anyhow!("invalid YYYYMM date '{raw}'"));
        }

        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Ok(Self::from_date(date));
            }
        }

        // Month-only spellings: 2020-01, Jan 2020
        for (candidate, fmt) in [
            (format!("{s}-01"), "%Y-%m-%d"),
            (format!("01 {s}"), "%d %b %Y"),
            (format!("01 {s}"), "%d %B %Y"),
        ] {
            if let Ok(date) = NaiveDate::parse_from_str(&candidate, fmt) {
                return Ok(Self(date));
            }
        }

        Err(anyhow!("unrecognised date '{raw}'"))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m"))
    }
}

/// A named, possibly gappy, monthly series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub name: String,
    points: BTreeMap<Period, f64>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
        }
    }

    pub fn from_points(name: impl Into<String>, points: impl IntoIterator<Item = (Period, f64)>) -> Self {
        let mut s = Self::new(name);
        for (period, value) in points {
            s.insert(period, value);
        }
        s
    }

    /// Inserts a value, replacing any earlier value for the same month.
    /// Non-finite values are dropped; returns whether the value was kept.
    pub fn insert(&mut self, period: Period, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.points.insert(period, value);
        true
    }

    pub fn get(&self, period: Period) -> Option<f64> {
        self.points.get(&period).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_period(&self) -> Option<Period> {
        self.points.keys().next().copied()
    }

    pub fn last_period(&self) -> Option<Period> {
        self.points.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Period, f64)> + '_ {
        self.points.iter().map(|(p, v)| (*p, *v))
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keeps only months within `[start, end]`; either bound may be open.
    pub fn restrict(&self, start: Option<Period>, end: Option<Period>) -> Self {
        let points = self
            .points
            .iter()
            .filter(|(p, _)| start.is_none_or(|s| **p >= s) && end.is_none_or(|e| **p <= e))
            .map(|(p, v)| (*p, *v))
            .collect();
        Self {
            name: self.name.clone(),
            points,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    values: Vec<f64>,
}

/// Dense table of aligned monthly columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    periods: Vec<Period>,
    columns: Vec<Column>,
}

impl Frame {
    /// Builds a frame from columns that are already aligned to `periods`.
    pub fn from_columns(periods: Vec<Period>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if periods.windows(2).any(|w| w[0] >= w[1]) {
            bail!("periods must be strictly increasing");
        }
        let mut frame = Self {
            periods,
            columns: Vec::with_capacity(columns.len()),
        };
        for (name, values) in columns {
            frame.with_column(name, values)?;
        }
        Ok(frame)
    }

    /// Aligns series on the months they all share.
    pub fn inner_join(series: &[Series]) -> Result<Self> {
        if series.is_empty() {
            bail!("nothing to join");
        }

        let mut seen = HashSet::new();
        for s in series {
            if !seen.insert(s.name.as_str()) {
                bail!("duplicate column '{}'", s.name);
            }
        }

        let periods: Vec<Period> = series[0]
            .points
            .keys()
            .filter(|p| series[1..].iter().all(|s| s.points.contains_key(p)))
            .copied()
            .collect();

        if periods.is_empty() {
            let names: Vec<_> = series.iter().map(|s| s.name.as_str()).collect();
            bail!("series share no common month: {}", names.join(", "));
        }

        let columns = series
            .iter()
            .map(|s| Column {
                name: s.name.clone(),
                values: periods.iter().map(|p| s.points[p]).collect(),
            })
            .collect();

        Ok(Self { periods, columns })
    }

    pub fn with_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.periods.len() {
            bail!(
                "column '{}' has {} values, frame has {} periods",
                name,
                values.len(),
                self.periods.len()
            );
        }
        if self.columns.iter().any(|c| c.name == name) {
            bail!("duplicate column '{name}'");
        }
        if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
            bail!("column '{}' has a non-finite value at {}", name, self.periods[bad]);
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`Frame::column`], but a missing column is an error.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| anyhow!("dataset has no column '{name}'"))
    }

    /// Iterates rows as `(period, values in column order)`.
    pub fn rows(&self) -> impl Iterator<Item = (Period, Vec<f64>)> + '_ {
        self.periods
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, self.columns.iter().map(|c| c.values[i]).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    #[test]
    fn test_parse_date_spellings() {
        let expected = p(2020, 1);
        for raw in [
            "2020-01-31",
            "2020/01/15",
            "01/31/2020",
            "2020-01",
            "202001",
            "Jan 2020",
            "January 2020",
            "2020-01-01T05:00:00Z",
            " 2020-01-02 ",
        ] {
            assert_eq!(Period::parse(raw).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Period::parse("").is_err());
        assert!(Period::parse("202013").is_err());
        assert!(Period::parse("yesterday").is_err());
    }

    #[test]
    fn test_from_timestamp() {
        // 2021-03-01T05:00:00Z
        assert_eq!(Period::from_timestamp(1_614_574_800), Some(p(2021, 3)));
    }

    #[test]
    fn test_display_round_trips() {
        let period = p(1999, 12);
        assert_eq!(period.to_string(), "1999-12");
        assert_eq!(Period::parse(&period.to_string()).unwrap(), period);
    }

    #[test]
    fn test_insert_drops_non_finite() {
        let mut s = Series::new("x");
        assert!(!s.insert(p(2020, 1), f64::NAN));
        assert!(!s.insert(p(2020, 2), f64::INFINITY));
        assert!(s.insert(p(2020, 3), 0.5));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_last_value_in_month_wins() {
        let mut s = Series::new("x");
        s.insert(Period::parse("2020-01-02").unwrap(), 1.0);
        s.insert(Period::parse("2020-01-31").unwrap(), 2.0);
        assert_eq!(s.get(p(2020, 1)), Some(2.0));
    }

    #[test]
    fn test_restrict() {
        let s = Series::from_points("x", (1..=6).map(|m| (p(2020, m), m as f64)));
        let r = s.restrict(Some(p(2020, 2)), Some(p(2020, 4)));
        assert_eq!(r.len(), 3);
        assert_eq!(r.first_period(), Some(p(2020, 2)));
        assert_eq!(r.last_period(), Some(p(2020, 4)));
        assert_eq!(s.restrict(None, None).len(), 6);
    }

    #[test]
    fn test_inner_join_keeps_common_months_in_order() {
        let a = Series::from_points("a", [(p(2020, 3), 3.0), (p(2020, 1), 1.0), (p(2020, 2), 2.0)]);
        let b = Series::from_points("b", [(p(2020, 2), 20.0), (p(2020, 3), 30.0), (p(2020, 4), 40.0)]);

        let frame = Frame::inner_join(&[a, b]).unwrap();

        assert_eq!(frame.periods(), &[p(2020, 2), p(2020, 3)]);
        assert_eq!(frame.column("a").unwrap(), &[2.0, 3.0]);
        assert_eq!(frame.column("b").unwrap(), &[20.0, 30.0]);
        assert_eq!(frame.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_inner_join_without_overlap_fails() {
        let a = Series::from_points("a", [(p(2020, 1), 1.0)]);
        let b = Series::from_points("b", [(p(2021, 1), 1.0)]);
        assert!(Frame::inner_join(&[a, b]).is_err());
    }

    #[test]
    fn test_inner_join_rejects_duplicate_names() {
        let a = Series::from_points("a", [(p(2020, 1), 1.0)]);
        assert!(Frame::inner_join(&[a.clone(), a]).is_err());
    }

    #[test]
    fn test_with_column_checks_length() {
        let a = Series::from_points("a", [(p(2020, 1), 1.0), (p(2020, 2), 2.0)]);
        let mut frame = Frame::inner_join(&[a]).unwrap();
        assert!(frame.with_column("b", vec![1.0]).is_err());
        assert!(frame.with_column("b", vec![1.0, f64::NAN]).is_err());
        assert!(frame.with_column("a", vec![1.0, 2.0]).is_err());
        frame.with_column("b", vec![5.0, 6.0]).unwrap();
        assert_eq!(frame.rows().nth(1).unwrap(), (p(2020, 2), vec![2.0, 6.0]));
    }

    #[test]
    fn test_from_columns_requires_increasing_periods() {
        let res = Frame::from_columns(vec![p(2020, 2), p(2020, 1)], vec![]);
        assert!(res.is_err());
    }
}
