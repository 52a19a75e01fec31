mod support;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{NaiveTime, Weekday};
use courtwatch::{
    AvailabilitySource, CleanSlot, CourtError, HourBlockCode, NotificationSink, Scheduler,
    Subscription, SubscriptionStore, User, UserDirectory,
};
use support::clean_slot;
use tokio::sync::RwLock;

#[derive(Default)]
struct FakeSource {
    lookups: Mutex<Vec<(Weekday, u32, String)>>,
    failures: Mutex<HashMap<(Weekday, u32), fn() -> CourtError>>,
}

impl FakeSource {
    fn fail(&self, weekday: Weekday, code: u32, err: fn() -> CourtError) {
        self.failures.lock().unwrap().insert((weekday, code), err);
    }

    fn lookups(&self) -> Vec<(Weekday, u32, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl AvailabilitySource for FakeSource {
    async fn available_slots(
        &self,
        weekday: Weekday,
        code: HourBlockCode,
        tag: &str,
    ) -> Result<Vec<CleanSlot>, CourtError> {
        self.lookups
            .lock()
            .unwrap()
            .push((weekday, code.code(), tag.to_string()));
        if let Some(err) = self.failures.lock().unwrap().get(&(weekday, code.code())) {
            return Err(err());
        }
        Ok(vec![clean_slot(
            &format!("羽球{}", code.code()),
            "DoSubmit2(1,'2025-05-13',4,250)",
        )])
    }
}

struct FakeStore(Vec<Subscription>);

#[async_trait]
impl SubscriptionStore for FakeStore {
    async fn list_all(&self) -> anyhow::Result<Vec<Subscription>> {
        Ok(self.0.clone())
    }
}

struct FakeDirectory(HashMap<i64, String>);

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn get_user_by_id(&self, id: i64) -> anyhow::Result<User> {
        let address = self
            .0
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no user {id}"))?;
        Ok(User {
            id,
            notification_address: address,
        })
    }
}

#[derive(Default)]
struct FakeSink {
    sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl NotificationSink for FakeSink {
    async fn send(&self, recipient_id: i64, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id, text.to_string()));
        Ok(())
    }
}

fn sub(user_id: i64, weekday: Weekday, hour: u32) -> Subscription {
    Subscription {
        user_id,
        weekday,
        hour_block_start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
    }
}

struct Harness {
    source: Arc<FakeSource>,
    sink: Arc<FakeSink>,
    lock: Arc<RwLock<()>>,
    scheduler: Arc<Scheduler>,
}

fn harness(subscriptions: Vec<Subscription>, addresses: &[(i64, &str)]) -> Harness {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(FakeSink::default());
    let lock = Arc::new(RwLock::new(()));
    let directory = FakeDirectory(
        addresses
            .iter()
            .map(|(id, address)| (*id, address.to_string()))
            .collect(),
    );
    let scheduler = Arc::new(Scheduler::new(
        source.clone(),
        Arc::new(FakeStore(subscriptions)),
        Arc::new(directory),
        sink.clone(),
        lock.clone(),
        Duration::from_secs(60),
    ));
    Harness {
        source,
        sink,
        lock,
        scheduler,
    }
}

fn four_subscribers() -> Vec<Subscription> {
    vec![
        sub(1, Weekday::Tue, 9),
        sub(2, Weekday::Mon, 14),
        sub(3, Weekday::Tue, 9),
        sub(4, Weekday::Mon, 8),
    ]
}

const ADDRESSES: [(i64, &str); 4] = [(1, "1001"), (2, "1002"), (3, "1003"), (4, "1004")];

#[tokio::test]
async fn pass_runs_in_weekday_then_time_order_and_shares_lookups() {
    let h = harness(four_subscribers(), &ADDRESSES);

    let report = h.scheduler.run_pass().await.unwrap();

    assert_eq!(
        h.source.lookups(),
        vec![
            (Weekday::Mon, 3, "subscriber-4".to_string()),
            (Weekday::Mon, 9, "subscriber-2".to_string()),
            (Weekday::Tue, 4, "subscriber-1".to_string()),
        ]
    );
    assert_eq!(report.checked, 4);
    assert_eq!(report.lookups, 3);
    assert_eq!(report.notified, 4);

    let sent = h.sink.sent.lock().unwrap().clone();
    let recipients: Vec<i64> = sent.iter().map(|(id, _)| *id).collect();
    assert_eq!(recipients, vec![1004, 1002, 1001, 1003]);
    assert_eq!(sent[2].1, "星期二 9:00-10:00 有可用場地：羽球4");
    assert_eq!(sent[3].1, sent[2].1);
}

#[tokio::test]
async fn undeliverable_users_are_skipped() {
    let h = harness(
        four_subscribers(),
        &[(1, "1001"), (2, "not-a-chat"), (4, "1004")],
    );

    let report = h.scheduler.run_pass().await.unwrap();

    let recipients: Vec<i64> = h.sink.sent.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(recipients, vec![1004, 1001]);
    assert_eq!(report.notified, 2);
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn failed_lookup_skips_only_its_subscribers() {
    let h = harness(four_subscribers(), &ADDRESSES);
    h.source
        .fail(Weekday::Mon, 9, || CourtError::ElementNotFound("#location".into()));

    let report = h.scheduler.run_pass().await.unwrap();

    assert_eq!(report.lookups, 3);
    assert_eq!(report.notified, 3);
    let recipients: Vec<i64> = h.sink.sent.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(recipients, vec![1004, 1001, 1003]);
}

#[tokio::test]
async fn hours_outside_the_site_day_are_skipped() {
    let h = harness(
        vec![sub(1, Weekday::Mon, 5), sub(2, Weekday::Mon, 22), sub(3, Weekday::Mon, 21)],
        &ADDRESSES,
    );

    let report = h.scheduler.run_pass().await.unwrap();

    assert_eq!(h.source.lookups(), vec![(Weekday::Mon, 16, "subscriber-3".to_string())]);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.notified, 1);
}

#[tokio::test]
async fn losing_the_browser_aborts_the_pass() {
    let h = harness(four_subscribers(), &ADDRESSES);
    h.source
        .fail(Weekday::Mon, 3, || CourtError::SessionUnavailable("browser gone".into()));

    let err = h.scheduler.run_pass().await.unwrap_err();

    assert!(
        err.downcast_ref::<CourtError>()
            .is_some_and(CourtError::is_capability_loss)
    );
    assert_eq!(h.source.lookups().len(), 1);
    assert!(h.sink.sent.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn pass_waits_for_subscription_writers() {
    let h = harness(four_subscribers(), &ADDRESSES);
    let writer = h.lock.clone().write_owned().await;

    let scheduler = h.scheduler.clone();
    let pass = tokio::spawn(async move { scheduler.run_pass().await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.source.lookups().is_empty());

    drop(writer);
    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.lookups, 3);
}

#[tokio::test(start_paused = true)]
async fn started_scheduler_ticks_and_stops() {
    let h = harness(four_subscribers(), &ADDRESSES);

    let handle = h.scheduler.start();
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.source.lookups().len(), 3);

    h.scheduler.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler stops promptly")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn browser_loss_skips_a_doubling_number_of_ticks() {
    let h = harness(vec![sub(1, Weekday::Mon, 8)], &ADDRESSES);
    h.source
        .fail(Weekday::Mon, 3, || CourtError::SessionUnavailable("browser gone".into()));
    let handle = h.scheduler.start();

    // Passes at 60s, then after skipping 1, 2 and 4 ticks: 180s, 360s, 660s.
    let mut elapsed = 0;
    for (at, lookups) in [(61, 1), (121, 1), (181, 2), (301, 2), (361, 3), (601, 3), (661, 4)] {
        tokio::time::sleep(Duration::from_secs(at - elapsed)).await;
        elapsed = at;
        assert_eq!(h.source.lookups().len(), lookups, "after {at}s");
    }

    h.scheduler.stop();
    handle.await.unwrap();
}
