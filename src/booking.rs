use log::{info, warn};

use crate::{
    driver::PageDriver,
    error::CourtError,
    site::{self, SiteAction, Timeouts},
    slot::CleanSlot,
};

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub slot: CleanSlot,
    /// False when the page could not be sent back home after confirming.
    pub returned_home: bool,
}

/// Tries `candidates` in order and stops at the first one the site confirms.
///
/// A candidate fails when its token script is rejected or the page does not
/// reach the confirmation step; the next candidate is then tried.
pub async fn book_first(
    page: &dyn PageDriver,
    candidates: &[CleanSlot],
    timeouts: &Timeouts,
) -> Result<BookingOutcome, CourtError> {
    for slot in candidates {
        if let Err(err) = book_one(page, slot, timeouts).await {
            warn!("booking {} at {} failed: {err}", slot.court_name, slot.time_range);
            continue;
        }
        info!("booked {} at {} on {}", slot.court_name, slot.time_range, slot.date());

        let returned_home = match site::perform(page, &SiteAction::GoHome, timeouts).await {
            Ok(()) => true,
            Err(err) => {
                warn!("returning home after booking failed: {err}");
                false
            }
        };
        return Ok(BookingOutcome {
            slot: slot.clone(),
            returned_home,
        });
    }
    Err(CourtError::AllBookingAttemptsFailed)
}

async fn book_one(
    page: &dyn PageDriver,
    slot: &CleanSlot,
    timeouts: &Timeouts,
) -> Result<(), CourtError> {
    site::perform(page, &SiteAction::Book(&slot.token), timeouts).await?;
    site::perform(page, &SiteAction::Confirm(slot.date()), timeouts).await
}
