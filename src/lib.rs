mod booking;
mod calendar;
mod chromium;
mod config;
mod context;
mod driver;
mod engine;
mod error;
mod extractor;
mod html;
mod matcher;
mod notify;
mod ports;
mod ratelimit;
mod scheduler;
mod session;
mod site;
mod slot;
mod store;
mod workflow;

pub use booking::BookingOutcome;
pub use calendar::{DayPeriod, HourBlockCode, weekday_label};
pub use chromium::{ChromiumBrowser, ChromiumPage};
pub use config::{EngineConfig, EngineEnv, LoadFromEnv};
pub use context::EngineContext;
pub use driver::{BrowserDriver, ElementTarget, PageDriver};
pub use engine::CourtEngine;
pub use error::{CourtError, DriverError};
pub use extractor::parse_listings;
pub use matcher::filter_by_hour_block;
pub use notify::TelegramNotifier;
pub use ports::{
    AvailabilitySource, NotificationSink, Subscription, SubscriptionStore, User, UserDirectory,
};
pub use scheduler::{DEFAULT_INTERVAL, PassReport, Scheduler, sort_for_pass, subscriber_tag};
pub use session::{NavigationStage, Session, SessionHandle, SessionRegistry};
pub use site::{CONFIRMATION_FLAG, LOGIN_URL, PAYMENT_URL, Timeouts, layout};
pub use slot::{ActionToken, BookingParameters, CleanSlot, RawSlotEntry};
pub use store::PgStore;
pub use workflow::Credentials;
