use thiserror::Error;

/// Failures raised by a browser driver primitive.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("no element matches `{0}`")]
    NotFound(String),

    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("page is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CourtError {
    #[error("cannot obtain a browser page: {0}")]
    SessionUnavailable(String),

    #[error("no live session for tag `{0}`")]
    UnknownSession(String),

    #[error("expected element `{0}` is missing")]
    ElementNotFound(String),

    #[error("weekday label `{0}` is not on the booking page")]
    WeekdayNotFound(String),

    #[error("site script for {action} failed")]
    ScriptExecutionFailure { action: &'static str },

    #[error("action token does not match the booking grammar: {0}")]
    ParseFailure(String),

    #[error("{action} did not reach its expected page state")]
    ConfirmationMissing { action: &'static str },

    #[error("every candidate slot failed to confirm")]
    AllBookingAttemptsFailed,

    #[error("`{0}` is not a valid CSS selector")]
    InvalidSelector(String),

    #[error("hour-block code {0} is outside 1..=16")]
    InvalidHourBlock(u32),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl CourtError {
    /// True when the browser itself can no longer hand out pages.
    pub fn is_capability_loss(&self) -> bool {
        matches!(
            self,
            CourtError::SessionUnavailable(_) | CourtError::Driver(DriverError::Closed)
        )
    }
}
