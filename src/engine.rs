use std::sync::Arc;

use async_trait::async_trait;
use chrono::Weekday;
use log::{info, warn};

use crate::{
    booking,
    calendar::HourBlockCode,
    driver::BrowserDriver,
    error::CourtError,
    extractor, matcher,
    ports::AvailabilitySource,
    session::{NavigationStage, SessionRegistry},
    site::{PAYMENT_URL, Timeouts},
    slot::CleanSlot,
    workflow::{Credentials, Workflow},
};

/// Availability lookups and bookings against the reservation site, one
/// browser page per session tag.
pub struct CourtEngine {
    registry: SessionRegistry,
    workflow: Workflow,
}

impl CourtEngine {
    pub fn new(browser: Arc<dyn BrowserDriver>, credentials: Credentials, timeouts: Timeouts) -> Self {
        Self {
            registry: SessionRegistry::new(browser),
            workflow: Workflow::new(credentials, timeouts),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Open slots for `code` on the next `weekday` the site offers.
    ///
    /// The first call for a tag logs in and walks the menus; later calls on
    /// the same tag pick up from the booking menu.
    pub async fn get_available_slots(
        &self,
        weekday: Weekday,
        code: HourBlockCode,
        tag: &str,
    ) -> Result<Vec<CleanSlot>, CourtError> {
        let (handle, is_new) = self.registry.resolve(tag).await?;
        let mut session = handle.lock().await;
        if is_new {
            info!("session {tag}: new page, logging in");
        }

        let scraped = match self.workflow.show_availability(&mut session, weekday, code).await {
            Ok(()) => extractor::extract(session.page()).await,
            Err(err) => Err(err),
        };
        match scraped {
            Ok(slots) => Ok(matcher::filter_by_hour_block(slots, code)),
            Err(err) => {
                warn!("session {tag}: availability lookup failed at {:?}: {err}", session.stage());
                if must_evict(&err, session.stage()) {
                    drop(session);
                    self.registry.evict(tag).await;
                } else {
                    session.set_stage(NavigationStage::BookingMenuOpen);
                }
                Err(err)
            }
        }
    }

    pub async fn book_slot(&self, tag: &str, slot: CleanSlot) -> Result<(), CourtError> {
        self.book_first_available(tag, &[slot]).await.map(|_| ())
    }

    /// Books the first of `candidates`, ranked by preference, that the site
    /// confirms, on the page the tag's last lookup left open.
    pub async fn book_first_available(
        &self,
        tag: &str,
        candidates: &[CleanSlot],
    ) -> Result<CleanSlot, CourtError> {
        if candidates.is_empty() {
            return Err(CourtError::AllBookingAttemptsFailed);
        }
        let handle = self
            .registry
            .get(tag)
            .await
            .ok_or_else(|| CourtError::UnknownSession(tag.to_string()))?;
        let mut session = handle.lock().await;

        match booking::book_first(session.page(), candidates, self.workflow.timeouts()).await {
            Ok(outcome) if outcome.returned_home => {
                session.set_stage(NavigationStage::LoggedIn);
                Ok(outcome.slot)
            }
            Ok(outcome) => {
                drop(session);
                self.registry.evict(tag).await;
                Ok(outcome.slot)
            }
            Err(err) => {
                drop(session);
                self.registry.evict(tag).await;
                Err(err)
            }
        }
    }

    /// Where the member pays for confirmed bookings.
    pub fn payment_location(&self) -> &'static str {
        PAYMENT_URL
    }

    pub async fn evict_session(&self, tag: &str) -> bool {
        self.registry.evict(tag).await
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// A page that failed before reaching the booking menu, or whose driver
/// failed outright, is not worth keeping.
fn must_evict(err: &CourtError, stage: NavigationStage) -> bool {
    stage < NavigationStage::BookingMenuOpen
        || err.is_capability_loss()
        || matches!(err, CourtError::Driver(_))
}

#[async_trait]
impl AvailabilitySource for CourtEngine {
    async fn available_slots(
        &self,
        weekday: Weekday,
        code: HourBlockCode,
        tag: &str,
    ) -> Result<Vec<CleanSlot>, CourtError> {
        self.get_available_slots(weekday, code, tag).await
    }
}
