use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Weekday;
use log::{debug, error, info, warn};
use tokio::{
    sync::{RwLock, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{
    calendar::{HourBlockCode, weekday_label},
    error::CourtError,
    ports::{AvailabilitySource, NotificationSink, Subscription, SubscriptionStore, UserDirectory},
    slot::CleanSlot,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const MAX_BACKOFF_TICKS: u32 = 16;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub checked: usize,
    pub lookups: usize,
    pub notified: usize,
    pub skipped: usize,
}

/// Periodically re-checks every stored subscription and notifies its owner
/// when the subscribed hour block has an open court.
pub struct Scheduler {
    source: Arc<dyn AvailabilitySource>,
    subscriptions: Arc<dyn SubscriptionStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn NotificationSink>,
    subscriptions_lock: Arc<RwLock<()>>,
    interval: Duration,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    /// `subscriptions_lock` is the lock writers of the subscription list take;
    /// each pass holds it for reading.
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        subscriptions: Arc<dyn SubscriptionStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationSink>,
        subscriptions_lock: Arc<RwLock<()>>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            source,
            subscriptions,
            users,
            notifier,
            subscriptions_lock,
            interval,
            stop_tx,
        }
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run().await })
    }

    /// The loop notices on its next select; an in-flight pass finishes first.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    async fn run(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; passes start one interval in.
        ticker.tick().await;

        let mut skip_ticks = 0u32;
        let mut backoff = 1u32;
        loop {
            if *stop_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if skip_ticks > 0 {
                        skip_ticks -= 1;
                        continue;
                    }
                    match self.run_pass().await {
                        Ok(report) => {
                            backoff = 1;
                            info!(
                                "pass done: {} subscriptions, {} lookups, {} notified, {} skipped",
                                report.checked, report.lookups, report.notified, report.skipped
                            );
                        }
                        Err(err) if is_capability_loss(&err) => {
                            error!("browser unavailable, backing off {backoff} ticks: {err:#}");
                            skip_ticks = backoff;
                            backoff = (backoff * 2).min(MAX_BACKOFF_TICKS);
                        }
                        Err(err) => error!("pass failed: {err:#}"),
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("scheduler stopped");
    }

    /// One sweep over all subscriptions, in weekday then start-time order.
    ///
    /// Consecutive subscriptions for the same weekday and hour block share one
    /// lookup. Per-subscription failures are logged and skipped; only losing
    /// the browser aborts the pass.
    pub async fn run_pass(&self) -> anyhow::Result<PassReport> {
        let _read = self.subscriptions_lock.read().await;
        let mut subscriptions = self
            .subscriptions
            .list_all()
            .await
            .context("failed to load subscriptions")?;
        sort_for_pass(&mut subscriptions);

        let mut report = PassReport {
            checked: subscriptions.len(),
            ..PassReport::default()
        };
        let mut last: Option<((Weekday, HourBlockCode), Vec<CleanSlot>)> = None;

        for subscription in &subscriptions {
            let code = match HourBlockCode::from_start_time(subscription.hour_block_start) {
                Ok(code) => code,
                Err(err) => {
                    warn!("subscription of user {}: {err}", subscription.user_id);
                    report.skipped += 1;
                    continue;
                }
            };
            let key = (subscription.weekday, code);

            let cached = last
                .as_ref()
                .filter(|(previous, _)| *previous == key)
                .map(|(_, slots)| slots.clone());
            let open = match cached {
                Some(slots) => slots,
                None => {
                    report.lookups += 1;
                    let tag = subscriber_tag(subscription.user_id);
                    match self.source.available_slots(key.0, code, &tag).await {
                        Ok(slots) => {
                            last = Some((key, slots.clone()));
                            slots
                        }
                        Err(err) if err.is_capability_loss() => {
                            return Err(err).context("availability lookup lost the browser");
                        }
                        Err(err) => {
                            error!("lookup for user {} failed: {err}", subscription.user_id);
                            last = None;
                            report.skipped += 1;
                            continue;
                        }
                    }
                }
            };

            if open.is_empty() {
                continue;
            }
            if self.notify(subscription, code, &open).await {
                report.notified += 1;
            } else {
                report.skipped += 1;
            }
        }

        Ok(report)
    }

    async fn notify(&self, subscription: &Subscription, code: HourBlockCode, open: &[CleanSlot]) -> bool {
        let user = match self.users.get_user_by_id(subscription.user_id).await {
            Ok(user) => user,
            Err(err) => {
                error!("cannot resolve user {}: {err:#}", subscription.user_id);
                return false;
            }
        };
        let Ok(recipient) = user.notification_address.trim().parse::<i64>() else {
            error!(
                "user {} has an undeliverable address {:?}",
                user.id, user.notification_address
            );
            return false;
        };

        let message = availability_message(subscription.weekday, code, open);
        if let Err(err) = self.notifier.send(recipient, &message).await {
            error!("notifying user {} failed: {err:#}", user.id);
            return false;
        }
        debug!("notified user {} about {:?} {}", user.id, subscription.weekday, code);
        true
    }
}

/// Weekday (Sunday first), then hour-block start. Stable for equal keys.
pub fn sort_for_pass(subscriptions: &mut [Subscription]) {
    subscriptions.sort_by_key(|sub| (sub.weekday.num_days_from_sunday(), sub.hour_block_start));
}

pub fn subscriber_tag(user_id: i64) -> String {
    format!("subscriber-{user_id}")
}

fn availability_message(weekday: Weekday, code: HourBlockCode, open: &[CleanSlot]) -> String {
    let courts: Vec<&str> = open.iter().map(|slot| slot.court_name.as_str()).collect();
    format!(
        "星期{} {} 有可用場地：{}",
        weekday_label(weekday),
        code,
        courts.join("、")
    )
}

fn is_capability_loss(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CourtError>()
        .is_some_and(CourtError::is_capability_loss)
}
