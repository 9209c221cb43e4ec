//! Dispatch cycle: activation state, eligibility, template pick, render,
//! delivery and bookkeeping for every active group.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use promo_core::config::{PromoConfig, RenderConfig};
use promo_core::error::{PromoError, Result};
use promo_core::traits::{DeliveryStore, GroupStore, Messenger, TemplateStore};
use promo_core::types::{
    DailyStats, DeliveryLogEntry, Group, NewDeliveryLog, StatsMode, Template,
};

use crate::locks::GroupLocks;
use crate::picker::TemplatePicker;
use crate::render::{RenderContext, render};

/// Knobs for a dispatch pass.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Minimum age of the last successful promotion before a group is due.
    pub promote_interval: chrono::Duration,
    pub delivery_timeout: Duration,
    /// Quiet period after a failed attempt; zero retries on the next pass.
    pub failure_backoff: chrono::Duration,
    pub render: RenderConfig,
    pub stats_mode: StatsMode,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&PromoConfig::default())
    }
}

impl DispatchSettings {
    pub fn from_config(config: &PromoConfig) -> Self {
        let interval_secs = config.scheduler.promote_interval_secs.min(i32::MAX as u64) as i64;
        let backoff_secs = config.scheduler.failure_backoff_secs.min(i32::MAX as u64) as i64;
        Self {
            promote_interval: chrono::Duration::seconds(interval_secs),
            delivery_timeout: Duration::from_secs(config.scheduler.delivery_timeout_secs),
            failure_backoff: chrono::Duration::seconds(backoff_secs),
            render: config.render.clone(),
            stats_mode: config.scheduler.stats_mode(),
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub template_id: i64,
    pub rendered: String,
    /// `None` on success.
    pub error: Option<String>,
    /// False when the log row, or after a successful send the
    /// `last_promoted_at` advance, could not be written.
    pub recorded: bool,
}

impl SendOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a dispatch pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub active_groups: usize,
    /// Not attempted: not yet due, backing off, or deactivated mid-pass.
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
    /// Sent successfully but bookkeeping failed afterwards.
    pub unrecorded: usize,
    /// Failed to send and the failure could not be logged either.
    pub unlogged: usize,
    pub no_templates: bool,
    pub stats: Option<DailyStats>,
    pub stats_error: Option<String>,
}

impl CycleReport {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no_templates {
            return write!(
                f,
                "{} active groups, no active templates available",
                self.active_groups
            );
        }
        write!(
            f,
            "{} active groups: {} sent, {} failed, {} not due",
            self.active_groups, self.sent, self.failed, self.skipped
        )?;
        if self.unrecorded > 0 {
            write!(f, ", {} sent but not recorded", self.unrecorded)?;
        }
        if self.unlogged > 0 {
            write!(f, ", {} failed and not logged", self.unlogged)?;
        }
        if let Some(e) = &self.stats_error {
            write!(f, " (stats not saved: {e})")?;
        }
        Ok(())
    }
}

/// A group's registry row plus its latest delivery attempt.
#[derive(Debug, Clone)]
pub struct GroupStatus {
    pub group: Group,
    pub last_attempt: Option<DeliveryLogEntry>,
    /// Earliest time the next automatic promotion can go out.
    /// `None` when inactive; never-promoted groups are due immediately.
    pub next_due: Option<DateTime<Utc>>,
}

/// The promotion engine: owns activation transitions and the dispatch cycle.
pub struct PromoteEngine {
    groups: Arc<dyn GroupStore>,
    templates: Arc<dyn TemplateStore>,
    deliveries: Arc<dyn DeliveryStore>,
    messenger: Arc<dyn Messenger>,
    picker: TemplatePicker,
    locks: GroupLocks,
    settings: DispatchSettings,
}

impl PromoteEngine {
    /// Engine over a single backend implementing every store.
    pub fn new<S>(store: Arc<S>, messenger: Arc<dyn Messenger>, settings: DispatchSettings) -> Self
    where
        S: GroupStore + TemplateStore + DeliveryStore + 'static,
    {
        Self::with_stores(store.clone(), store.clone(), store, messenger, settings)
    }

    pub fn with_stores(
        groups: Arc<dyn GroupStore>,
        templates: Arc<dyn TemplateStore>,
        deliveries: Arc<dyn DeliveryStore>,
        messenger: Arc<dyn Messenger>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            groups,
            templates,
            deliveries,
            messenger,
            picker: TemplatePicker::from_entropy(),
            locks: GroupLocks::new(),
            settings,
        }
    }

    /// Replace the template picker (fixed seeds in tests).
    pub fn with_picker(mut self, picker: TemplatePicker) -> Self {
        self.picker = picker;
        self
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn groups(&self) -> &Arc<dyn GroupStore> {
        &self.groups
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    pub fn deliveries(&self) -> &Arc<dyn DeliveryStore> {
        &self.deliveries
    }

    /// Opt a group into promotions, registering it on first use.
    pub async fn activate(&self, group_identifier: &str) -> Result<Group> {
        let _guard = self.locks.lock(group_identifier).await;
        let mut group = match self.groups.get(group_identifier).await? {
            Some(g) => g,
            None => self.groups.create(group_identifier).await?,
        };
        if group.active {
            return Err(PromoError::Conflict(format!(
                "auto promote is already active for {group_identifier}"
            )));
        }
        group.active = true;
        group.started_at = Some(Utc::now());
        let saved = self.groups.update(&group).await?;
        tracing::info!("✅ Auto promote activated for {group_identifier}");
        Ok(saved)
    }

    /// Opt a group out. Never registers a group.
    pub async fn deactivate(&self, group_identifier: &str) -> Result<Group> {
        let _guard = self.locks.lock(group_identifier).await;
        let Some(mut group) = self.groups.get(group_identifier).await? else {
            return Err(PromoError::NotFound(format!(
                "group {group_identifier} is not registered"
            )));
        };
        if !group.active {
            return Err(PromoError::Conflict(format!(
                "auto promote is not active for {group_identifier}"
            )));
        }
        group.active = false;
        group.started_at = None;
        let saved = self.groups.update(&group).await?;
        tracing::info!("⏹️ Auto promote deactivated for {group_identifier}");
        Ok(saved)
    }

    /// `Ok(None)` for a group that was never registered.
    pub async fn group_status(&self, group_identifier: &str) -> Result<Option<GroupStatus>> {
        let Some(group) = self.groups.get(group_identifier).await? else {
            return Ok(None);
        };
        let last_attempt = self
            .deliveries
            .recent_for_group(group_identifier, 1)
            .await?
            .into_iter()
            .next();
        let next_due = match (group.active, group.last_promoted_at) {
            (false, _) => None,
            (true, None) => group.started_at,
            (true, Some(last)) => Some(last + self.settings.promote_interval),
        };
        Ok(Some(GroupStatus {
            group,
            last_attempt,
            next_due,
        }))
    }

    /// One dispatch pass at the current wall-clock time.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// One dispatch pass treating `now` as the current time.
    ///
    /// Only the initial reads can fail the pass; per-group failures are
    /// counted in the report, and once groups are processed the stats
    /// upsert is always attempted.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        tracing::info!("🔄 Processing scheduled promotes...");

        let groups = self.groups.list_active().await?;
        let mut report = CycleReport {
            active_groups: groups.len(),
            ..Default::default()
        };
        if groups.is_empty() {
            tracing::info!("💤 No active groups for auto promote");
            return Ok(report);
        }
        tracing::info!("👥 Found {} active groups", groups.len());

        let pool = self.templates.list_active().await?;
        if pool.is_empty() {
            tracing::warn!("⚠️ No active templates available, skipping {} groups", groups.len());
            report.no_templates = true;
            return Ok(report);
        }

        for group in &groups {
            if !group.is_due(now, self.settings.promote_interval)
                || self.backing_off(&group.group_identifier, now).await
            {
                report.skipped += 1;
                continue;
            }
            // Held through the send so a concurrent deactivate either lands
            // before the re-check or waits for this delivery to finish
            let _guard = self.locks.lock(&group.group_identifier).await;
            match self.groups.get(&group.group_identifier).await {
                Ok(Some(current))
                    if current.active && current.is_due(now, self.settings.promote_interval) => {}
                Ok(_) => {
                    tracing::debug!("{} changed during the pass, skipped", group.group_identifier);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!("❌ Could not re-read {}: {e}", group.group_identifier);
                    report.skipped += 1;
                    continue;
                }
            }

            let Some(template) = self.picker.pick(&pool) else {
                break;
            };
            let outcome = self.deliver(&group.group_identifier, template, now).await;
            match (outcome.success(), outcome.recorded) {
                (true, true) => report.sent += 1,
                (true, false) => {
                    report.sent += 1;
                    report.unrecorded += 1;
                }
                (false, true) => report.failed += 1,
                (false, false) => {
                    report.failed += 1;
                    report.unlogged += 1;
                }
            }
        }

        tracing::info!(
            "📊 Scheduled promotes completed: {} success, {} failed, {} not due",
            report.sent,
            report.failed,
            report.skipped
        );

        let stats = DailyStats {
            date: now.with_timezone(&self.settings.render.offset()).date_naive(),
            total_groups: groups.len() as i64,
            total_messages: report.attempted() as i64,
            success_messages: report.sent as i64,
            failed_messages: report.failed as i64,
            created_at: now,
        };
        match self.deliveries.upsert_stats(&stats, self.settings.stats_mode).await {
            Ok(row) => report.stats = Some(row),
            Err(e) => {
                tracing::error!("❌ Failed to update daily stats for {}: {e}", stats.date);
                report.stats_error = Some(e.to_string());
            }
        }
        Ok(report)
    }

    /// True while the group's latest attempt failed less than
    /// `failure_backoff` ago. A log read error does not hold the group back.
    async fn backing_off(&self, group_identifier: &str, now: DateTime<Utc>) -> bool {
        if self.settings.failure_backoff <= chrono::Duration::zero() {
            return false;
        }
        match self.deliveries.recent_for_group(group_identifier, 1).await {
            Ok(entries) => entries
                .first()
                .is_some_and(|e| !e.success && now - e.sent_at < self.settings.failure_backoff),
            Err(e) => {
                tracing::warn!("⚠️ Could not read last attempt for {group_identifier}: {e}");
                false
            }
        }
    }

    /// Immediate promotion to one group, ignoring eligibility.
    ///
    /// A successful send to a registered group advances its
    /// `last_promoted_at`; unregistered groups are not created.
    pub async fn send_now(&self, group_identifier: &str) -> Result<SendOutcome> {
        let pool = self.templates.list_active().await?;
        let template = self
            .picker
            .pick(&pool)
            .ok_or_else(|| PromoError::NotFound("no active templates available".into()))?;
        let _guard = self.locks.lock(group_identifier).await;
        let outcome = self.deliver(group_identifier, template, Utc::now()).await;
        match &outcome.error {
            None => Ok(outcome),
            Some(e) => Err(PromoError::Delivery(e.clone())),
        }
    }

    /// Render, send, log, and on success advance `last_promoted_at`.
    /// The caller holds the group lock.
    async fn deliver(
        &self,
        group_identifier: &str,
        template: &Template,
        now: DateTime<Utc>,
    ) -> SendOutcome {
        let ctx = RenderContext::new(now, &self.settings.render, group_identifier);
        let rendered = render(&template.content, &ctx);

        let send = self.messenger.send(group_identifier, &rendered);
        let error = match tokio::time::timeout(self.settings.delivery_timeout, send).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "delivery timed out after {}s",
                self.settings.delivery_timeout.as_secs()
            )),
        };
        match &error {
            None => tracing::info!(
                "📤 Promote sent to {group_identifier} via {} (template #{})",
                self.messenger.name(),
                template.id
            ),
            Some(e) => tracing::warn!("⚠️ Failed to send promote to {group_identifier}: {e}"),
        }

        let mut recorded = true;
        let entry = NewDeliveryLog {
            group_identifier: group_identifier.to_string(),
            template_id: template.id,
            rendered_content: rendered.clone(),
            sent_at: now,
            success: error.is_none(),
            error_message: error.clone(),
        };
        if let Err(e) = self.deliveries.append(&entry).await {
            tracing::error!("❌ Delivery log write failed for {group_identifier}: {e}");
            recorded = false;
        }

        if error.is_none()
            && let Err(e) = self.record_success(group_identifier, now).await
        {
            tracing::error!(
                "❗ Promote sent to {group_identifier} but not recorded, it may be resent next tick: {e}"
            );
            recorded = false;
        }

        SendOutcome {
            template_id: template.id,
            rendered,
            error,
            recorded,
        }
    }

    /// Advance `last_promoted_at` on a freshly read row. Returns false when
    /// the group is not registered. The caller holds the group lock.
    async fn record_success(&self, group_identifier: &str, at: DateTime<Utc>) -> Result<bool> {
        let Some(mut group) = self.groups.get(group_identifier).await? else {
            return Ok(false);
        };
        let next = group.last_promoted_at.map_or(at, |prev| prev.max(at));
        group.last_promoted_at = Some(next);
        self.groups.update(&group).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FailingAppends, FailingGroupUpdates, FakeMessenger, engine_with, seeded_db,
    };
    use chrono::Duration as ChronoDuration;
    use promo_core::types::NewTemplate;
    use promo_db::PromoDb;

    #[tokio::test]
    async fn test_activate_registers_group() {
        let (db, _m, engine) = engine_with(seeded_db().await);
        let g = engine.activate("a@g.us").await.unwrap();
        assert!(g.active);
        assert!(g.started_at.is_some());
        assert!(g.last_promoted_at.is_none());
        assert!(GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_activate_twice_conflicts() {
        let (_db, _m, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();
        let err = engine.activate("a@g.us").await.unwrap_err();
        assert!(matches!(err, PromoError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_deactivate_unregistered_writes_nothing() {
        let (db, _m, engine) = engine_with(seeded_db().await);
        let err = engine.deactivate("ghost@g.us").await.unwrap_err();
        assert!(matches!(err, PromoError::NotFound(_)));
        assert!(GroupStore::get(db.as_ref(), "ghost@g.us").await.unwrap().is_none());
        assert!(GroupStore::list_all(db.as_ref()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_clears_started_at() {
        let (_db, _m, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();
        let g = engine.deactivate("a@g.us").await.unwrap();
        assert!(!g.active);
        assert!(g.started_at.is_none());

        let err = engine.deactivate("a@g.us").await.unwrap_err();
        assert!(matches!(err, PromoError::Conflict(_)));

        // Reactivation is allowed after deactivation
        assert!(engine.activate("a@g.us").await.unwrap().active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_double_activate() {
        let (db, _m, engine) = engine_with(seeded_db().await);
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.activate("race@g.us").await })
            })
            .collect();
        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(PromoError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 1));

        let all = GroupStore::list_all(db.as_ref()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].active);
        assert!(all[0].started_at.is_some());
    }

    #[tokio::test]
    async fn test_activate_then_cycle() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();

        let now = Utc::now();
        let report = engine.run_cycle_at(now).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(messenger.sent_to(), vec!["a@g.us".to_string()]);

        let g = GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap();
        assert_eq!(g.last_promoted_at, Some(now));

        let log = db.recent_for_group("a@g.us", 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].success);
        assert_eq!(log[0].rendered_content, messenger.sent()[0].1);

        let stats = report.stats.unwrap();
        assert_eq!(stats.total_groups, 1);
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.success_messages, 1);
        assert_eq!(stats.failed_messages, 0);
    }

    #[tokio::test]
    async fn test_inactive_groups_never_selected() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        GroupStore::create(db.as_ref(), "idle@g.us").await.unwrap();
        engine.activate("on@g.us").await.unwrap();
        engine.activate("off@g.us").await.unwrap();
        engine.deactivate("off@g.us").await.unwrap();

        let report = engine.run_cycle_at(Utc::now()).await.unwrap();
        assert_eq!(report.active_groups, 1);
        assert_eq!(messenger.sent_to(), vec!["on@g.us".to_string()]);
        assert!(db.recent_for_group("off@g.us", 5).await.unwrap().is_empty());
        assert!(db.recent_for_group("idle@g.us", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_eligibility_window() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();
        let t0 = Utc::now();

        assert_eq!(engine.run_cycle_at(t0).await.unwrap().sent, 1);

        let report = engine.run_cycle_at(t0 + ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(messenger.sent().len(), 1);

        let t4 = t0 + ChronoDuration::hours(4);
        assert_eq!(engine.run_cycle_at(t4).await.unwrap().sent, 1);
        assert_eq!(messenger.sent().len(), 2);
        let g = GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap();
        assert_eq!(g.last_promoted_at, Some(t4));
    }

    #[tokio::test]
    async fn test_failure_is_retried_next_tick() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();
        messenger.fail_for("a@g.us");

        let t0 = Utc::now();
        let report = engine.run_cycle_at(t0).await.unwrap();
        assert_eq!((report.sent, report.failed), (0, 1));
        let g = GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap();
        assert!(g.last_promoted_at.is_none());

        let log = db.recent_for_group("a@g.us", 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].success);
        assert!(log[0].error_message.as_deref().unwrap().contains("unreachable"));
        assert_eq!(report.stats.unwrap().failed_messages, 1);

        messenger.recover("a@g.us");
        let t1 = t0 + ChronoDuration::minutes(10);
        let report = engine.run_cycle_at(t1).await.unwrap();
        assert_eq!((report.sent, report.failed), (1, 0));
        let g = GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap();
        assert_eq!(g.last_promoted_at, Some(t1));
        assert_eq!(db.recent_for_group("a@g.us", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_backoff_delays_retry() {
        let db = seeded_db().await;
        let messenger = Arc::new(FakeMessenger::default());
        let settings = DispatchSettings {
            failure_backoff: ChronoDuration::minutes(30),
            ..Default::default()
        };
        let engine = PromoteEngine::new(db.clone(), messenger.clone(), settings)
            .with_picker(TemplatePicker::seeded(42));
        engine.activate("a@g.us").await.unwrap();
        messenger.fail_for("a@g.us");

        let t0 = Utc::now();
        assert_eq!(engine.run_cycle_at(t0).await.unwrap().failed, 1);
        messenger.recover("a@g.us");

        let report = engine.run_cycle_at(t0 + ChronoDuration::minutes(10)).await.unwrap();
        assert_eq!((report.sent, report.skipped), (0, 1));

        let report = engine.run_cycle_at(t0 + ChronoDuration::minutes(40)).await.unwrap();
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_cycle() {
        let (_db, messenger, engine) = engine_with(seeded_db().await);
        for id in ["a@g.us", "b@g.us", "c@g.us"] {
            engine.activate(id).await.unwrap();
        }
        messenger.fail_for("b@g.us");

        let report = engine.run_cycle_at(Utc::now()).await.unwrap();
        assert_eq!((report.sent, report.failed), (2, 1));
        assert_eq!(messenger.sent_to(), vec!["a@g.us".to_string(), "c@g.us".to_string()]);
        let stats = report.stats.unwrap();
        assert_eq!(stats.total_groups, 3);
        assert_eq!(stats.total_messages, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_timeout_is_a_failure() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        engine.activate("slow@g.us").await.unwrap();
        messenger.set_delay(Duration::from_secs(120));

        let report = engine.run_cycle_at(Utc::now()).await.unwrap();
        assert_eq!(report.failed, 1);
        let log = db.recent_for_group("slow@g.us", 1).await.unwrap();
        assert!(log[0].error_message.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_no_templates_skips_everything() {
        let db = Arc::new(PromoDb::open_in_memory().unwrap());
        let (db, messenger, engine) = engine_with(db);
        engine.activate("a@g.us").await.unwrap();

        let report = engine.run_cycle_at(Utc::now()).await.unwrap();
        assert!(report.no_templates);
        assert!(messenger.sent().is_empty());
        assert!(report.stats.is_none());
        assert!(db.recent_for_group("a@g.us", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_active_groups_is_noop() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        let now = Utc::now();
        let report = engine.run_cycle_at(now).await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert!(messenger.sent().is_empty());
        assert!(db.stats_for(now.date_naive()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_date_uses_configured_offset() {
        let (db, _m, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();
        // 20:00 UTC is already the next day in UTC+7
        let now = "2026-03-14T20:00:00Z".parse::<DateTime<Utc>>().unwrap();
        engine.run_cycle_at(now).await.unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert!(db.stats_for(day).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sent_but_not_recorded() {
        let db = seeded_db().await;
        let messenger = Arc::new(FakeMessenger::default());
        let groups = Arc::new(FailingGroupUpdates::new(db.clone()));
        let engine = PromoteEngine::with_stores(
            groups.clone(),
            db.clone(),
            db.clone(),
            messenger.clone(),
            DispatchSettings::default(),
        );
        GroupStore::create(db.as_ref(), "a@g.us").await.unwrap();
        let mut g = GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap();
        g.active = true;
        g.started_at = Some(Utc::now());
        GroupStore::update(db.as_ref(), &g).await.unwrap();
        groups.fail_updates();

        let report = engine.run_cycle_at(Utc::now()).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.unrecorded, 1);
        // Stats are still written
        assert!(report.stats.is_some());
        let g = GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap();
        assert!(g.last_promoted_at.is_none());
    }

    #[tokio::test]
    async fn test_failed_and_unlogged_is_not_reported_as_sent() {
        let db = seeded_db().await;
        let messenger = Arc::new(FakeMessenger::default());
        let engine = PromoteEngine::with_stores(
            db.clone(),
            db.clone(),
            Arc::new(FailingAppends::new(db.clone())),
            messenger.clone(),
            DispatchSettings::default(),
        );
        engine.activate("a@g.us").await.unwrap();
        messenger.fail_for("a@g.us");

        let report = engine.run_cycle_at(Utc::now()).await.unwrap();
        assert_eq!((report.sent, report.failed), (0, 1));
        assert_eq!(report.unrecorded, 0);
        assert_eq!(report.unlogged, 1);
        let text = report.to_string();
        assert!(!text.contains("sent but not recorded"), "{text}");
        assert!(text.contains("1 failed and not logged"), "{text}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_deactivated_mid_pass_is_skipped() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        let engine = Arc::new(engine);
        engine.activate("a@g.us").await.unwrap();
        engine.activate("b@g.us").await.unwrap();
        messenger.set_delay(Duration::from_millis(300));

        let cycle = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_cycle_at(Utc::now()).await })
        };
        // a@g.us is still being delivered
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.deactivate("b@g.us").await.unwrap();

        let report = cycle.await.unwrap().unwrap();
        assert_eq!(messenger.sent_to(), vec!["a@g.us".to_string()]);
        assert_eq!((report.sent, report.skipped), (1, 1));
        assert!(db.recent_for_group("b@g.us", 1).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_waits_for_in_flight_send() {
        let (_db, messenger, engine) = engine_with(seeded_db().await);
        let engine = Arc::new(engine);
        engine.activate("a@g.us").await.unwrap();
        messenger.set_delay(Duration::from_millis(300));

        let cycle = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_cycle_at(Utc::now()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.deactivate("a@g.us").await.unwrap();
        // The send that was already under way completed first
        assert!(cycle.is_finished());
        assert_eq!(cycle.await.unwrap().unwrap().sent, 1);
    }

    #[tokio::test]
    async fn test_last_promoted_never_regresses() {
        let (db, _m, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();
        let later = Utc::now() + ChronoDuration::hours(2);
        engine.record_success("a@g.us", later).await.unwrap();
        engine
            .record_success("a@g.us", later - ChronoDuration::hours(1))
            .await
            .unwrap();
        let g = GroupStore::get(db.as_ref(), "a@g.us").await.unwrap().unwrap();
        assert_eq!(g.last_promoted_at, Some(later));
    }

    #[tokio::test]
    async fn test_send_now_bypasses_eligibility() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        engine.activate("a@g.us").await.unwrap();
        engine.run_cycle_at(Utc::now()).await.unwrap();

        let outcome = engine.send_now("a@g.us").await.unwrap();
        assert!(outcome.success());
        assert!(outcome.recorded);
        assert_eq!(messenger.sent().len(), 2);
        assert_eq!(db.recent_for_group("a@g.us", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_send_now_to_unregistered_group() {
        let (db, messenger, engine) = engine_with(seeded_db().await);
        engine.send_now("new@g.us").await.unwrap();
        assert_eq!(messenger.sent_to(), vec!["new@g.us".to_string()]);
        assert!(GroupStore::get(db.as_ref(), "new@g.us").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_now_errors() {
        let db = Arc::new(PromoDb::open_in_memory().unwrap());
        let (db, messenger, engine) = engine_with(db);
        assert!(matches!(
            engine.send_now("a@g.us").await,
            Err(PromoError::NotFound(_))
        ));

        TemplateStore::create(db.as_ref(), &NewTemplate::new("A", "general", "Halo"))
            .await
            .unwrap();
        messenger.fail_for("a@g.us");
        assert!(matches!(
            engine.send_now("a@g.us").await,
            Err(PromoError::Delivery(_))
        ));
    }

    #[tokio::test]
    async fn test_group_status() {
        let (_db, _m, engine) = engine_with(seeded_db().await);
        assert!(engine.group_status("a@g.us").await.unwrap().is_none());

        engine.activate("a@g.us").await.unwrap();
        let t0 = Utc::now();
        engine.run_cycle_at(t0).await.unwrap();

        let status = engine.group_status("a@g.us").await.unwrap().unwrap();
        assert!(status.group.active);
        assert!(status.last_attempt.unwrap().success);
        assert_eq!(status.next_due, Some(t0 + ChronoDuration::hours(4)));
    }

    #[tokio::test]
    async fn test_rendered_text_uses_group_id() {
        let db = Arc::new(PromoDb::open_in_memory().unwrap());
        TemplateStore::create(db.as_ref(), &NewTemplate::new("A", "general", "Hai {GROUP_ID}"))
            .await
            .unwrap();
        let (_db, messenger, engine) = engine_with(db);
        engine.activate("12345@g.us").await.unwrap();
        engine.run_cycle_at(Utc::now()).await.unwrap();
        assert_eq!(messenger.sent()[0].1, "Hai 12345");
    }

    #[test]
    fn test_report_display() {
        let report = CycleReport {
            active_groups: 3,
            sent: 1,
            failed: 1,
            skipped: 1,
            unrecorded: 1,
            ..Default::default()
        };
        assert_eq!(
            report.to_string(),
            "3 active groups: 1 sent, 1 failed, 1 not due, 1 sent but not recorded"
        );
    }
}
