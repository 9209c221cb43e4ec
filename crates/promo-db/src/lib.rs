//! # Promobot DB
//!
//! SQLite-backed storage for the promotion engine. One connection behind a
//! mutex; every component trait (`GroupStore`, `TemplateStore`,
//! `DeliveryStore`) is implemented on [`PromoDb`].
//!
//! Timestamps are stored as RFC 3339 text with nanosecond precision so the
//! optimistic `updated_at` check on groups compares exact values.

mod deliveries;
mod groups;
mod seed;
mod templates;

use chrono::{DateTime, SecondsFormat, Utc};
use promo_core::error::{PromoError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub use seed::default_templates;

/// Promotion database.
pub struct PromoDb {
    conn: Mutex<Connection>,
}

impl PromoDb {
    /// Open or create the database, run migrations and seed default
    /// templates when the library is empty.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| PromoError::Persistence(format!("DB open {}: {e}", path.display())))?;

        // WAL keeps command reads from blocking on the dispatch cycle's writes
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        db.seed_default_templates()?;
        tracing::info!("🗄️ Promote database ready at {}", path.display());
        Ok(db)
    }

    /// Empty in-memory database (no seed data).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(PromoError::persistence)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS promote_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_identifier TEXT UNIQUE NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                started_at TEXT,
                last_promoted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_promote_groups_active ON promote_groups(active);

            CREATE TABLE IF NOT EXISTS promote_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'general',
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_promote_templates_active ON promote_templates(active);

            -- template_id is a snapshot, deliberately not a foreign key
            CREATE TABLE IF NOT EXISTS delivery_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_identifier TEXT NOT NULL,
                template_id INTEGER NOT NULL,
                rendered_content TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                success INTEGER NOT NULL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_delivery_logs_group ON delivery_logs(group_identifier);
            CREATE INDEX IF NOT EXISTS idx_delivery_logs_sent_at ON delivery_logs(sent_at);

            CREATE TABLE IF NOT EXISTS daily_stats (
                date TEXT PRIMARY KEY,
                total_groups INTEGER NOT NULL DEFAULT 0,
                total_messages INTEGER NOT NULL DEFAULT 0,
                success_messages INTEGER NOT NULL DEFAULT 0,
                failed_messages INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| PromoError::Persistence(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Insert the built-in templates if the library is empty.
    /// Returns how many were inserted.
    pub fn seed_default_templates(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM promote_templates", [], |r| r.get(0))
            .map_err(PromoError::persistence)?;
        if count > 0 {
            return Ok(0);
        }

        let now = ts(Utc::now());
        let defaults = default_templates();
        for t in &defaults {
            conn.execute(
                "INSERT INTO promote_templates (title, content, category, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![t.title, t.content, t.category, t.active, now],
            )
            .map_err(|e| PromoError::Persistence(format!("Seed template: {e}")))?;
        }
        tracing::info!("🌱 Seeded {} default templates", defaults.len());
        Ok(defaults.len())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PromoError::Persistence(format!("Lock: {e}")))
    }
}

/// Canonical timestamp encoding.
pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a timestamp column, surfacing bad data as a row error.
pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}
