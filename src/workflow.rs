use chrono::Weekday;
use log::info;
use scraper::Html;

use crate::{
    calendar::{HourBlockCode, weekday_label},
    error::CourtError,
    html::LabeledPairs,
    session::{NavigationStage, Session},
    site::{self, LOGIN_URL, SiteAction, Timeouts, layout},
};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

/// Drives a page through the site, in order, until the availability list for
/// one weekday and hour block is on screen.
pub struct Workflow {
    credentials: Credentials,
    timeouts: Timeouts,
}

impl Workflow {
    pub fn new(credentials: Credentials, timeouts: Timeouts) -> Self {
        Self {
            credentials,
            timeouts,
        }
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Any failed transition stops the chain and is returned as is; the
    /// session keeps the last stage it completed.
    pub async fn show_availability(
        &self,
        session: &mut Session,
        weekday: Weekday,
        code: HourBlockCode,
    ) -> Result<(), CourtError> {
        if session.stage() > NavigationStage::BookingMenuOpen {
            info!("session {}: re-entering at the booking menu", session.tag());
            session.set_stage(NavigationStage::BookingMenuOpen);
        }

        if session.stage() == NavigationStage::Start {
            self.log_in(session).await?;
        }

        while session.stage() < NavigationStage::BookingMenuOpen {
            let (action, reached) = match session.stage() {
                NavigationStage::LoggedIn => {
                    (SiteAction::AcknowledgeTerms, NavigationStage::TermsAcknowledged)
                }
                NavigationStage::TermsAcknowledged => {
                    (SiteAction::OpenVenueMenu, NavigationStage::MenuOpen)
                }
                NavigationStage::MenuOpen => (SiteAction::SelectSport, NavigationStage::SportSelected),
                NavigationStage::SportSelected => {
                    (SiteAction::AcceptRules, NavigationStage::RulesAccepted)
                }
                NavigationStage::RulesAccepted => {
                    (SiteAction::OpenBookingMenu, NavigationStage::BookingMenuOpen)
                }
                stage => unreachable!("stage {stage:?} is handled before the menu loop"),
            };
            site::perform(session.page(), &action, &self.timeouts).await?;
            session.set_stage(reached);
        }

        self.select_weekday(session, weekday).await?;
        session.set_stage(NavigationStage::WeekdaySelected);

        let period = code.day_period();
        site::perform(session.page(), &SiteAction::SelectPeriod(period), &self.timeouts).await?;
        info!("session {}: picked {:?} for block {}", session.tag(), period, code);
        session.set_stage(NavigationStage::HourBlockSelected);

        session.page().wait_stable(self.timeouts.stable).await?;
        session.set_stage(NavigationStage::AvailabilityVisible);
        Ok(())
    }

    async fn log_in(&self, session: &mut Session) -> Result<(), CourtError> {
        session.page().navigate(LOGIN_URL).await?;
        let login = SiteAction::Login {
            account: &self.credentials.account,
            password: &self.credentials.password,
        };
        site::perform(session.page(), &login, &self.timeouts).await?;
        session.set_stage(NavigationStage::LoggedIn);
        info!("session {}: logged in", session.tag());
        Ok(())
    }

    /// Finds `weekday` among the rendered weekday labels and clicks the date
    /// button at the same index.
    async fn select_weekday(&self, session: &Session, weekday: Weekday) -> Result<(), CourtError> {
        let page = session.page();
        page.wait_for_element(layout::DATE_BOX, self.timeouts.element)
            .await
            .map_err(|err| site::missing_element(layout::DATE_BOX, err))?;

        let html = page.content().await?;
        let pairs = {
            let document = Html::parse_document(&html);
            LabeledPairs::read(
                &document,
                layout::DATE_BOX,
                layout::WEEKDAY_LABELS_INDEX,
                layout::DATE_BUTTONS_INDEX,
                layout::DATE_BOX_ITEM,
            )?
        };
        info!("session {}: weekday labels {:?}", session.tag(), pairs.labels);

        let label = weekday_label(weekday);
        let index = pairs
            .position(label)
            .ok_or_else(|| CourtError::WeekdayNotFound(label.to_string()))?;
        info!(
            "session {}: {} is at index {}, date {}",
            session.tag(),
            label,
            index,
            pairs.targets[index]
        );

        site::perform(page, &SiteAction::SelectDate { index }, &self.timeouts).await
    }
}
