use std::fmt;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CourtError;

/// Time-range labels exactly as the site renders them (full-width colons).
const HOUR_BLOCK_LABELS: [&str; 16] = [
    "6：00-7：00",
    "7：00-8：00",
    "8：00-9：00",
    "9：00-10：00",
    "10：00-11：00",
    "11：00-12：00",
    "12：00-13：00",
    "13：00-14：00",
    "14：00-15：00",
    "15：00-16：00",
    "16：00-17：00",
    "17：00-18：00",
    "18：00-19：00",
    "19：00-20：00",
    "20：00-21：00",
    "21：00-22：00",
];

const FIRST_START_HOUR: u32 = 6;

/// One of the sixteen fixed one-hour windows between 06:00 and 22:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct HourBlockCode(u8);

impl HourBlockCode {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 16;

    pub fn new(code: u32) -> Result<Self, CourtError> {
        if (Self::MIN..=Self::MAX).contains(&code) {
            Ok(Self(code as u8))
        } else {
            Err(CourtError::InvalidHourBlock(code))
        }
    }

    /// The block starting at `hour` (6 → code 1, 21 → code 16).
    pub fn from_start_hour(hour: u32) -> Result<Self, CourtError> {
        let code = hour
            .checked_sub(FIRST_START_HOUR)
            .map(|offset| offset + 1)
            .unwrap_or(0);
        Self::new(code)
    }

    pub fn from_start_time(start: NaiveTime) -> Result<Self, CourtError> {
        Self::from_start_hour(start.hour())
    }

    pub fn code(self) -> u32 {
        self.0 as u32
    }

    pub fn start_hour(self) -> u32 {
        FIRST_START_HOUR + self.code() - 1
    }

    pub fn end_hour(self) -> u32 {
        self.start_hour() + 1
    }

    /// The site's own label for this block; matching compares against it verbatim.
    pub fn label(self) -> &'static str {
        HOUR_BLOCK_LABELS[self.0 as usize - 1]
    }

    pub fn day_period(self) -> DayPeriod {
        match self.0 {
            1..=6 => DayPeriod::Morning,
            7..=12 => DayPeriod::Afternoon,
            _ => DayPeriod::Evening,
        }
    }

    pub fn all() -> impl Iterator<Item = HourBlockCode> {
        (Self::MIN..=Self::MAX).map(|code| Self(code as u8))
    }
}

impl TryFrom<u32> for HourBlockCode {
    type Error = CourtError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl From<HourBlockCode> for u32 {
    fn from(code: HourBlockCode) -> Self {
        code.code()
    }
}

impl fmt::Display for HourBlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:00-{}:00", self.start_hour(), self.end_hour())
    }
}

/// Coarse parameter accepted by the site's time-range picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    pub fn script_arg(self) -> u8 {
        match self {
            DayPeriod::Morning => 1,
            DayPeriod::Afternoon => 2,
            DayPeriod::Evening => 3,
        }
    }
}

/// The weekday label the booking page renders above each date button.
pub fn weekday_label(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "日",
        Weekday::Mon => "一",
        Weekday::Tue => "二",
        Weekday::Wed => "三",
        Weekday::Thu => "四",
        Weekday::Fri => "五",
        Weekday::Sat => "六",
    }
}

/// Weekday from the 0..=6, Sunday = 0 numbering used by stored subscriptions.
pub fn weekday_from_sunday_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}
