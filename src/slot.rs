use std::{fmt, sync::LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CourtError;

// fn(slotId, 'YYYY-MM-DD', periodCode, fee), e.g. DoSubmit2(84,'2025-05-13',6,250).
// Searched for anywhere in a handler; surrounding code is not part of the token.
static ACTION_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?P<func>[A-Za-z_][A-Za-z0-9_]*)\(\s*(?P<id>\d+)\s*,\s*['"](?P<date>\d{4}-\d{2}-\d{2})['"]\s*,\s*(?P<period>\d+)\s*,\s*(?P<fee>\d+)\s*\)"#,
    )
    .expect("action grammar is a valid pattern")
});

/// Booking parameters embedded in a listing's action token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingParameters {
    pub slot_id: u32,
    pub date: NaiveDate,
    pub period_code: u32,
    pub fee: u32,
}

/// A site-issued inline call that books one listed slot instance.
///
/// Only strings matching the booking grammar can be turned into a token, so
/// every token carries all four parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionToken {
    raw: String,
    params: BookingParameters,
}

impl ActionToken {
    /// Finds the first booking call in `raw`, e.g. an `onclick` value such as
    /// `DoSubmit2(84,'2025-05-13',4,250);return false;`. Only the call itself
    /// is kept.
    pub fn parse(raw: &str) -> Result<Self, CourtError> {
        let fail = || CourtError::ParseFailure(raw.to_string());
        let Some(caps) = ACTION_GRAMMAR.captures(raw) else {
            return Err(fail());
        };
        let call = caps.get(0).map(|m| m.as_str()).ok_or_else(fail)?;
        let field = |name: &str| caps.name(name).map(|m| m.as_str()).ok_or_else(fail);

        let params = BookingParameters {
            slot_id: field("id")?.parse().map_err(|_| fail())?,
            date: NaiveDate::parse_from_str(field("date")?, "%Y-%m-%d").map_err(|_| fail())?,
            period_code: field("period")?.parse().map_err(|_| fail())?,
            fee: field("fee")?.parse().map_err(|_| fail())?,
        };
        Ok(Self {
            raw: call.to_string(),
            params,
        })
    }

    /// The call exactly as the site issued it, without surrounding handler code.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn params(&self) -> &BookingParameters {
        &self.params
    }
}

impl TryFrom<String> for ActionToken {
    type Error = CourtError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<ActionToken> for String {
    fn from(token: ActionToken) -> Self {
        token.raw
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One listing as scraped, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSlotEntry {
    pub court_name: String,
    pub price: String,
    pub time_range: String,
    pub action: Option<String>,
    pub bookable: bool,
}

/// A validated, bookable listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanSlot {
    pub court_name: String,
    pub price: String,
    pub time_range: String,
    pub token: ActionToken,
}

impl CleanSlot {
    /// `None` for listings without a bookable marker or whose action string
    /// falls outside the booking grammar.
    pub fn from_raw(raw: RawSlotEntry) -> Option<Self> {
        if !raw.bookable {
            return None;
        }
        let token = ActionToken::parse(raw.action.as_deref()?).ok()?;
        Some(Self {
            court_name: raw.court_name,
            price: raw.price,
            time_range: raw.time_range,
            token,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.token.params().date
    }

    pub fn period_code(&self) -> u32 {
        self.token.params().period_code
    }

    pub fn fee(&self) -> u32 {
        self.token.params().fee
    }
}
