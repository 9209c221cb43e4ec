//! Test doubles shared by the dispatch and scheduler tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use promo_core::error::{PromoError, Result};
use chrono::NaiveDate;
use promo_core::traits::{DeliveryStore, GroupStore, Messenger};
use promo_core::types::{DailyStats, DeliveryLogEntry, Group, NewDeliveryLog, StatsMode};
use promo_db::PromoDb;

use crate::dispatch::{DispatchSettings, PromoteEngine};
use crate::picker::TemplatePicker;

/// Records every send; selected groups fail, optional artificial latency.
#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeMessenger {
    pub fn fail_for(&self, group: &str) {
        self.failing.lock().unwrap().insert(group.to_string());
    }

    pub fn recover(&self, group: &str) {
        self.failing.lock().unwrap().remove(group);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|(g, _)| g).collect()
    }

    /// Highest number of concurrent `send` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, group_identifier: &str, text: &str) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(group_identifier) {
            return Err(PromoError::Delivery("group unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((group_identifier.to_string(), text.to_string()));
        Ok(())
    }
}

/// Group store whose `update` can be switched to fail.
pub struct FailingGroupUpdates {
    inner: Arc<PromoDb>,
    fail: AtomicBool,
}

impl FailingGroupUpdates {
    pub fn new(inner: Arc<PromoDb>) -> Self {
        Self {
            inner,
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_updates(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GroupStore for FailingGroupUpdates {
    async fn get(&self, group_identifier: &str) -> Result<Option<Group>> {
        GroupStore::get(self.inner.as_ref(), group_identifier).await
    }

    async fn create(&self, group_identifier: &str) -> Result<Group> {
        GroupStore::create(self.inner.as_ref(), group_identifier).await
    }

    async fn update(&self, group: &Group) -> Result<Group> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PromoError::Persistence("disk I/O error".into()));
        }
        GroupStore::update(self.inner.as_ref(), group).await
    }

    async fn list_active(&self) -> Result<Vec<Group>> {
        GroupStore::list_active(self.inner.as_ref()).await
    }

    async fn list_all(&self) -> Result<Vec<Group>> {
        GroupStore::list_all(self.inner.as_ref()).await
    }
}

/// Delivery store whose log inserts always fail.
pub struct FailingAppends {
    inner: Arc<PromoDb>,
}

impl FailingAppends {
    pub fn new(inner: Arc<PromoDb>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DeliveryStore for FailingAppends {
    async fn append(&self, _entry: &NewDeliveryLog) -> Result<DeliveryLogEntry> {
        Err(PromoError::Persistence("database is locked".into()))
    }

    async fn recent_for_group(
        &self,
        group_identifier: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>> {
        self.inner.recent_for_group(group_identifier, limit).await
    }

    async fn upsert_stats(&self, stats: &DailyStats, mode: StatsMode) -> Result<DailyStats> {
        self.inner.upsert_stats(stats, mode).await
    }

    async fn stats_for(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        self.inner.stats_for(date).await
    }
}

/// In-memory database with the default templates.
pub async fn seeded_db() -> Arc<PromoDb> {
    let db = PromoDb::open_in_memory().unwrap();
    db.seed_default_templates().unwrap();
    Arc::new(db)
}

pub fn engine_with(db: Arc<PromoDb>) -> (Arc<PromoDb>, Arc<FakeMessenger>, PromoteEngine) {
    let messenger = Arc::new(FakeMessenger::default());
    let engine = PromoteEngine::new(db.clone(), messenger.clone(), DispatchSettings::default())
        .with_picker(TemplatePicker::seeded(42));
    (db, messenger, engine)
}
