//! Domain records: groups, templates, delivery log and daily stats.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PromoError, Result};

/// A messaging group that can opt into promotions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    /// Unique external address (e.g. `120363025@g.us`).
    pub group_identifier: String,
    pub active: bool,
    /// Set on activation, cleared on deactivation.
    pub started_at: Option<DateTime<Utc>>,
    /// Only ever set after a successful send.
    pub last_promoted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// A group is due when it was never promoted or the last successful
    /// promotion is at least `interval` old.
    pub fn is_due(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        match self.last_promoted_at {
            None => true,
            Some(last) => now - last >= interval,
        }
    }

    /// Local part of the identifier, before the `@` server suffix.
    pub fn local_id(&self) -> &str {
        local_part(&self.group_identifier)
    }
}

/// Local part of a group identifier (`"123@g.us"` → `"123"`).
pub fn local_part(identifier: &str) -> &str {
    identifier.split('@').next().unwrap_or(identifier)
}

/// A stored promotional message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub title: String,
    /// Body text, may contain `{DATE}`-style placeholder tokens.
    pub content: String,
    pub category: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub title: String,
    pub content: String,
    pub category: String,
    pub active: bool,
}

impl NewTemplate {
    /// New active template.
    pub fn new(title: &str, category: &str, content: &str) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            active: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_template_fields(&self.title, &self.content)
    }
}

impl Template {
    pub fn validate(&self) -> Result<()> {
        validate_template_fields(&self.title, &self.content)
    }
}

fn validate_template_fields(title: &str, content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(PromoError::Validation("template content must not be empty".into()));
    }
    if title.trim().is_empty() {
        return Err(PromoError::Validation("template title must not be empty".into()));
    }
    Ok(())
}

/// One record per send attempt.
///
/// `template_id` is a snapshot reference: the template may have been deleted
/// since, and readers must not assume it still resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: i64,
    pub group_identifier: String,
    pub template_id: i64,
    pub rendered_content: String,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// A send attempt about to be appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryLog {
    pub group_identifier: String,
    pub template_id: i64,
    pub rendered_content: String,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Daily roll-up, one row per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_groups: i64,
    pub total_messages: i64,
    pub success_messages: i64,
    pub failed_messages: i64,
    pub created_at: DateTime<Utc>,
}

/// How a second upsert for the same date is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMode {
    /// Latest pass wins.
    #[default]
    Replace,
    /// Message counters are added; `total_groups` takes the latest value.
    Accumulate,
}

/// A product returned by the external catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "package_code", default)]
    pub code: String,
    #[serde(rename = "package_name", default)]
    pub name: String,
    #[serde(rename = "package_name_alias_short", default)]
    pub short_name: String,
    #[serde(rename = "package_description", default)]
    pub description: String,
    #[serde(rename = "package_harga", default)]
    pub price_label: String,
}
