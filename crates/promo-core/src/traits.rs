//! Collaborator traits: the seams the dispatch engine is written against.
//!
//! Storage is split per component (groups, templates, delivery log) so the
//! engine can be exercised against failing or in-memory backends.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{
    DailyStats, DeliveryLogEntry, Group, NewDeliveryLog, NewTemplate, Product, StatsMode, Template,
};

/// Group Registry persistence.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// `Ok(None)` when the group was never registered.
    async fn get(&self, group_identifier: &str) -> Result<Option<Group>>;

    /// Register a new, inactive group.
    async fn create(&self, group_identifier: &str) -> Result<Group>;

    /// Full-record replace. Fails with `Conflict` when the stored row changed
    /// since `group` was read (its `updated_at` no longer matches).
    async fn update(&self, group: &Group) -> Result<Group>;

    async fn list_active(&self) -> Result<Vec<Group>>;

    async fn list_all(&self) -> Result<Vec<Group>>;
}

/// Template Library persistence.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Template>>;

    /// The pool dispatch picks from.
    async fn list_active(&self) -> Result<Vec<Template>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Template>>;

    async fn create(&self, template: &NewTemplate) -> Result<Template>;

    async fn update(&self, template: &Template) -> Result<Template>;

    /// Unconditional delete; deleting a missing id is not an error.
    async fn delete(&self, id: i64) -> Result<()>;
}

/// Delivery log and daily statistics.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn append(&self, entry: &NewDeliveryLog) -> Result<DeliveryLogEntry>;

    /// Most recent attempts for a group, newest first.
    async fn recent_for_group(
        &self,
        group_identifier: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>>;

    async fn upsert_stats(&self, stats: &DailyStats, mode: StatsMode) -> Result<DailyStats>;

    async fn stats_for(&self, date: NaiveDate) -> Result<Option<DailyStats>>;
}

/// Messaging transport that delivers text into a group.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Deliver `text` to the group. The engine does not assume retries
    /// happen underneath; a returned error is the final outcome.
    async fn send(&self, group_identifier: &str, text: &str) -> Result<()>;
}

/// External product catalog used for bulk template generation.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn fetch_products(&self) -> Result<Vec<Product>>;
}
