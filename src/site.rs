//! Everything specific to the reservation site: routes, selectors, and the
//! closed set of actions the engine can trigger on a page.

use std::time::Duration;

use chrono::NaiveDate;
use log::{info, warn};
use serde_json::Value;

use crate::{
    calendar::DayPeriod,
    driver::{ElementTarget, PageDriver},
    error::{CourtError, DriverError},
    slot::ActionToken,
};

pub const LOGIN_URL: &str = "https://nd01.xuanen.com.tw/BPMember/BPMemberLogin";
pub const PAYMENT_URL: &str = "https://nd01.xuanen.com.tw/BPMemberOrder/BPMemberOrder";
pub const HOME_ROUTE: &str = "/BPHome/BPHome";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";
pub const ACCEPT_LANGUAGE: &str = "zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7";

/// Present in the page location once a booking awaits confirmation.
pub const CONFIRMATION_FLAG: &str = "tFlag=2";

pub mod layout {
    pub const ACCOUNT_INPUT: &str = "#txt_Account";
    pub const PASSWORD_INPUT: &str = "#txt_Pass";
    pub const LOGIN_BUTTON: &str = ".CssLoginBtn";
    pub const TERMS_AGREE: &str = "#Msg_Agree";
    pub const VENUE_MENU: &str = "#location";
    pub const BADMINTON_TILE: &str = ".CssAdImg[data-slick-index='0']";
    pub const RULES_CHECKBOX: &str = "#isRememberAcc";

    /// Two sibling containers: weekday labels first, date buttons second.
    pub const DATE_BOX: &str = "div.datebox";
    pub const DATE_BOX_ITEM: &str = "div";
    pub const WEEKDAY_LABELS_INDEX: usize = 0;
    pub const DATE_BUTTONS_INDEX: usize = 1;

    pub const PERIOD_PICKER: &str = ".selectweek";

    pub const LISTING: &str =
        "div.listbackground > div.imformation1, div.listbackground > div.imformation2";
    pub const BOOKABLE_MARKER: &str = "div.courseintro div.listbtn";
    /// Court name, price and time range, in that order and unlabeled.
    pub const LISTING_TEXT: &str = "div.textcss div.listtext";
    pub const ACTION_ATTRIBUTE: &str = "onclick";
}

/// Installed on every new document: hides automation markers and swallows dialogs.
pub const PAGE_PRELUDE: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['zh-TW', 'zh', 'en-US', 'en'] });
window.alert = () => {};
window.confirm = () => true;
window.prompt = () => null;
"#;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub element: Duration,
    pub stable: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(10),
            stable: Duration::from_secs(10),
        }
    }
}

/// How an action is triggered on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Form {
        fields: Vec<(&'static str, String)>,
        submit: &'static str,
    },
    Click(ElementTarget),
    /// Must evaluate to `true`; anything else means the site rejected it.
    Script(String),
}

/// What proves an action took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCondition {
    Quiescent,
    UrlContains(&'static str),
}

/// The site interactions the engine knows how to perform.
#[derive(Debug, Clone)]
pub enum SiteAction<'a> {
    Login { account: &'a str, password: &'a str },
    AcknowledgeTerms,
    OpenVenueMenu,
    SelectSport,
    AcceptRules,
    OpenBookingMenu,
    SelectDate { index: usize },
    SelectPeriod(DayPeriod),
    Book(&'a ActionToken),
    Confirm(NaiveDate),
    GoHome,
}

impl SiteAction<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            SiteAction::Login { .. } => "login",
            SiteAction::AcknowledgeTerms => "acknowledge-terms",
            SiteAction::OpenVenueMenu => "open-venue-menu",
            SiteAction::SelectSport => "select-sport",
            SiteAction::AcceptRules => "accept-rules",
            SiteAction::OpenBookingMenu => "open-booking-menu",
            SiteAction::SelectDate { .. } => "select-date",
            SiteAction::SelectPeriod(_) => "select-period",
            SiteAction::Book(_) => "book",
            SiteAction::Confirm(_) => "confirm",
            SiteAction::GoHome => "go-home",
        }
    }

    /// Element that must exist before the action is attempted.
    pub fn requires(&self) -> Option<&'static str> {
        match self {
            SiteAction::Login { .. } => Some(layout::ACCOUNT_INPUT),
            SiteAction::AcknowledgeTerms => Some(layout::TERMS_AGREE),
            SiteAction::OpenVenueMenu => Some(layout::VENUE_MENU),
            SiteAction::SelectSport => Some(layout::BADMINTON_TILE),
            SiteAction::AcceptRules => Some(layout::RULES_CHECKBOX),
            SiteAction::SelectDate { .. } => Some(layout::DATE_BOX),
            SiteAction::SelectPeriod(_) => Some(layout::PERIOD_PICKER),
            SiteAction::OpenBookingMenu
            | SiteAction::Book(_)
            | SiteAction::Confirm(_)
            | SiteAction::GoHome => None,
        }
    }

    pub fn trigger(&self) -> Trigger {
        match self {
            SiteAction::Login { account, password } => Trigger::Form {
                fields: vec![
                    (layout::ACCOUNT_INPUT, account.to_string()),
                    (layout::PASSWORD_INPUT, password.to_string()),
                ],
                submit: layout::LOGIN_BUTTON,
            },
            SiteAction::AcknowledgeTerms => Trigger::Click(ElementTarget::first(layout::TERMS_AGREE)),
            SiteAction::OpenVenueMenu => Trigger::Script(guarded(
                &format!("document.querySelector({:?})", layout::VENUE_MENU),
                "next(3);",
            )),
            SiteAction::SelectSport => Trigger::Click(ElementTarget::first(layout::BADMINTON_TILE)),
            SiteAction::AcceptRules => Trigger::Script(guarded(
                &format!("document.querySelector({:?})", layout::RULES_CHECKBOX),
                &format!(
                    "document.querySelector({:?}).checked = true; checkclick();",
                    layout::RULES_CHECKBOX
                ),
            )),
            SiteAction::OpenBookingMenu => Trigger::Script(attempt("next();")),
            SiteAction::SelectDate { index } => Trigger::Click(ElementTarget::Nested {
                container: layout::DATE_BOX.to_string(),
                container_index: layout::DATE_BUTTONS_INDEX,
                item: layout::DATE_BOX_ITEM.to_string(),
                item_index: *index,
            }),
            SiteAction::SelectPeriod(period) => Trigger::Script(guarded(
                &format!(
                    "document.querySelectorAll({:?}).length > 0",
                    layout::PERIOD_PICKER
                ),
                &format!("Selecttime({});", period.script_arg()),
            )),
            // Replayed verbatim: the token is the site's own reference to the slot.
            SiteAction::Book(token) => Trigger::Script(attempt(&format!("{};", token.as_str()))),
            SiteAction::Confirm(date) => {
                Trigger::Script(attempt(&format!("DoSubmit3('{}');", date.format("%Y-%m-%d"))))
            }
            SiteAction::GoHome => {
                Trigger::Script(attempt(&format!("window.location = '{HOME_ROUTE}';")))
            }
        }
    }

    pub fn proves(&self) -> PostCondition {
        match self {
            SiteAction::Book(_) => PostCondition::UrlContains(CONFIRMATION_FLAG),
            _ => PostCondition::Quiescent,
        }
    }
}

/// Runs `body` only when `condition` holds; evaluates to whether it ran.
fn guarded(condition: &str, body: &str) -> String {
    format!(
        "(() => {{ if (!({condition})) {{ return false; }} try {{ {body} return true; }} catch (e) {{ console.error(e); return false; }} }})()"
    )
}

fn attempt(body: &str) -> String {
    guarded("true", body)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A wait that ran out means the layout is not what we expect; anything else
/// is the browser failing and is passed through.
pub(crate) fn missing_element(selector: &str, err: DriverError) -> CourtError {
    match err {
        DriverError::NotFound(_) | DriverError::Timeout { .. } => {
            CourtError::ElementNotFound(selector.to_string())
        }
        other => CourtError::Driver(other),
    }
}

/// Performs one action: wait for its precondition, trigger it, wait for the
/// page to settle, then check its post-condition.
pub async fn perform(
    page: &dyn PageDriver,
    action: &SiteAction<'_>,
    timeouts: &Timeouts,
) -> Result<(), CourtError> {
    let name = action.name();

    if let Some(selector) = action.requires() {
        page.wait_for_element(selector, timeouts.element)
            .await
            .map_err(|err| missing_element(selector, err))?;
    }

    match action.trigger() {
        Trigger::Form { fields, submit } => {
            for (selector, value) in &fields {
                page.fill(selector, value).await?;
            }
            page.click(&ElementTarget::first(submit)).await?;
        }
        Trigger::Click(target) => {
            page.click(&target).await.map_err(|err| match err {
                DriverError::NotFound(selector) => CourtError::ElementNotFound(selector),
                other => CourtError::Driver(other),
            })?;
        }
        Trigger::Script(script) => {
            let value = page.eval(&script).await.map_err(|err| {
                warn!("{name}: script evaluation errored: {err}");
                if matches!(err, DriverError::Closed) {
                    return CourtError::Driver(err);
                }
                CourtError::ScriptExecutionFailure { action: name }
            })?;
            if !is_truthy(&value) {
                return Err(CourtError::ScriptExecutionFailure { action: name });
            }
        }
    }

    page.wait_stable(timeouts.stable).await?;

    match action.proves() {
        PostCondition::Quiescent => {}
        PostCondition::UrlContains(marker) => {
            let url = page.url().await?;
            if !url.contains(marker) {
                return Err(CourtError::ConfirmationMissing { action: name });
            }
        }
    }

    info!("{name}: done");
    Ok(())
}
