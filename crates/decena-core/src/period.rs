use crate::error::SettlementError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive calendar date window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Ten-day settlement period identifier ("decena").
///
/// Wire format is the literal string `{decade}{MM}{YYYY}`: decade digit
/// (1-3), two-digit month, four-digit year. Decade 2 of July 2024 is
/// `"2072024"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    decade: u8,
    month: u32,
    year: i32,
}

impl Period {
    pub fn new(decade: u8, month: u32, year: i32) -> Result<Self, SettlementError> {
        let input = format!("{decade}{month:02}{year:04}");
        if !(1..=3).contains(&decade) {
            return Err(SettlementError::malformed_period(
                input,
                "decade must be 1, 2, or 3",
            ));
        }
        if !(1..=12).contains(&month) {
            return Err(SettlementError::malformed_period(
                input,
                "month must be 01-12",
            ));
        }
        if !(1000..=9999).contains(&year) {
            return Err(SettlementError::malformed_period(
                input,
                "year must be four digits",
            ));
        }
        Ok(Self {
            decade,
            month,
            year,
        })
    }

    pub fn decade(&self) -> u8 {
        self.decade
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Period containing the given date: day 1-10 is decade 1, 11-20 is
    /// decade 2, 21 onward is decade 3.
    pub fn for_date(date: NaiveDate) -> Self {
        let decade = if date.day() > 20 {
            3
        } else if date.day() > 10 {
            2
        } else {
            1
        };
        Self {
            decade,
            month: date.month(),
            year: date.year(),
        }
    }

    pub fn current(today: NaiveDate) -> Self {
        Self::for_date(today)
    }

    /// Inclusive date window for this period. Decade 3 runs through the
    /// last calendar day of the month.
    pub fn date_range(&self) -> DateRange {
        let start_day = match self.decade {
            1 => 1,
            2 => 11,
            _ => 21,
        };
        let start = date_or_epoch(self.year, self.month, start_day);
        let end = match self.decade {
            1 => date_or_epoch(self.year, self.month, 10),
            2 => date_or_epoch(self.year, self.month, 20),
            _ => last_day_of_month(self.year, self.month),
        };
        DateRange::new(start, end)
    }

    /// All three decades for each of the last `months` months including the
    /// month of `today`, most recent first.
    pub fn recent(today: NaiveDate, months: u32) -> Vec<Period> {
        let mut periods = Vec::with_capacity(months as usize * 3);
        let mut year = today.year();
        let mut month = today.month();

        for _ in 0..months {
            for decade in [3, 2, 1] {
                periods.push(Period {
                    decade,
                    month,
                    year,
                });
            }
            if month == 1 {
                month = 12;
                year -= 1;
            } else {
                month -= 1;
            }
        }

        periods
    }
}

impl FromStr for Period {
    type Err = SettlementError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.len() != 7 || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SettlementError::malformed_period(
                input,
                "expected 7 digits: decade, two-digit month, four-digit year",
            ));
        }

        let decade = input[0..1]
            .parse::<u8>()
            .map_err(|e| SettlementError::malformed_period(input, e.to_string()))?;
        let month = input[1..3]
            .parse::<u32>()
            .map_err(|e| SettlementError::malformed_period(input, e.to_string()))?;
        let year = input[3..7]
            .parse::<i32>()
            .map_err(|e| SettlementError::malformed_period(input, e.to_string()))?;

        Period::new(decade, month, year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}{:04}", self.decade, self.month, self.year)
    }
}

impl TryFrom<String> for Period {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

fn date_or_epoch(year: i32, month: u32, day: u32) -> NaiveDate {
    // Period construction already validated month and year; the fallback is
    // unreachable for any constructible Period.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}
