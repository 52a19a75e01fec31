use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveTime;
use log::warn;
use sqlx::{FromRow, PgPool, postgres::PgPoolOptions};

use crate::{
    calendar::weekday_from_sunday_index,
    ports::{Subscription, SubscriptionStore, User, UserDirectory},
};

const LIST_SUBSCRIPTIONS: &str = r#"
    SELECT s.user_id, s.weekday, t.start_time
    FROM schedule s
    JOIN time_slot t ON t.id = s.time_slot_id
"#;

const USER_BY_ID: &str = r#"SELECT id, account_id FROM "user" WHERE id = $1"#;

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    user_id: i64,
    weekday: i16,
    start_time: NaiveTime,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Option<Subscription> {
        let weekday = u32::try_from(self.weekday)
            .ok()
            .and_then(weekday_from_sunday_index)?;
        Some(Subscription {
            user_id: self.user_id,
            weekday,
            hour_block_start: self.start_time,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    account_id: String,
}

/// Subscriptions and users as the bot front-end stores them in Postgres.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to the subscription database")?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn list_all(&self) -> anyhow::Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(LIST_SUBSCRIPTIONS)
            .fetch_all(&self.pool)
            .await
            .context("failed to list subscriptions")?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let user_id = row.user_id;
                let weekday = row.weekday;
                let subscription = row.into_subscription();
                if subscription.is_none() {
                    warn!("ignoring subscription of user {user_id} with weekday {weekday}");
                }
                subscription
            })
            .collect())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_user_by_id(&self, id: i64) -> anyhow::Result<User> {
        let row: Option<UserRow> = sqlx::query_as(USER_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load user {id}"))?;
        let row = row.ok_or_else(|| anyhow!("user {id} does not exist"))?;
        Ok(User {
            id: row.id,
            notification_address: row.account_id,
        })
    }
}
