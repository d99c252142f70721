use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

/// Offset-carrying date-time layouts, tried after RFC 3339
const AWARE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Naive date-time layouts
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Date-only layouts, read as midnight
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A parsed trending date. Rows either carry an offset or are naive; both
/// are compared on their own wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingDate {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl TrendingDate {
    /// Parse one raw cell. Returns `None` for empty or unrecognised input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        // Covers the Zulu form `%Y-%m-%dT%H:%M:%SZ` as well as explicit offsets
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(TrendingDate::Aware(dt));
        }
        for format in AWARE_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(raw, format) {
                return Some(TrendingDate::Aware(dt));
            }
        }
        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(TrendingDate::Naive(dt));
            }
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return Some(TrendingDate::Naive(date.and_time(NaiveTime::MIN)));
            }
        }
        None
    }

    /// Wall-clock time in the row's own offset
    pub fn local(&self) -> NaiveDateTime {
        match self {
            TrendingDate::Aware(dt) => dt.naive_local(),
            TrendingDate::Naive(dt) => *dt,
        }
    }

    pub fn is_aware(&self) -> bool {
        matches!(self, TrendingDate::Aware(_))
    }
}

/// Inclusive `[start, end]` filter window.
///
/// The bounds carry no offset: for an aware row they are read in that row's
/// offset, for a naive row they are compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateWindow {
    /// Window from midnight of `start` to midnight of `end`
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.and_time(NaiveTime::MIN),
            end: end.and_time(NaiveTime::MIN),
        }
    }

    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, date: &TrendingDate) -> bool {
        let local = date.local();
        self.start <= local && local <= self.end
    }
}
