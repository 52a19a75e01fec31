//! Collaborators the engine and scheduler consume but do not own.

use async_trait::async_trait;
use chrono::{NaiveTime, Weekday};

use crate::{calendar::HourBlockCode, error::CourtError, slot::CleanSlot};

/// A stored (user, weekday, hour block) preference. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: i64,
    pub weekday: Weekday,
    pub hour_block_start: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    /// Where notifications go; a chat id for the Telegram sink.
    pub notification_address: String,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list_all(&self) -> anyhow::Result<Vec<Subscription>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_by_id(&self, id: i64) -> anyhow::Result<User>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, recipient_id: i64, text: &str) -> anyhow::Result<()>;
}

/// The availability pipeline as the scheduler sees it.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn available_slots(
        &self,
        weekday: Weekday,
        code: HourBlockCode,
        tag: &str,
    ) -> Result<Vec<CleanSlot>, CourtError>;
}
