//! Delivery log and daily statistics on SQLite.

use async_trait::async_trait;
use chrono::NaiveDate;
use promo_core::error::{PromoError, Result};
use promo_core::traits::DeliveryStore;
use promo_core::types::{DailyStats, DeliveryLogEntry, NewDeliveryLog, StatsMode};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{PromoDb, parse_ts, ts};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<DeliveryLogEntry> {
    let sent_at: String = row.get(4)?;
    Ok(DeliveryLogEntry {
        id: row.get(0)?,
        group_identifier: row.get(1)?,
        template_id: row.get(2)?,
        rendered_content: row.get(3)?,
        sent_at: parse_ts(4, &sent_at)?,
        success: row.get(5)?,
        error_message: row.get(6)?,
    })
}

fn row_to_stats(row: &Row<'_>) -> rusqlite::Result<DailyStats> {
    let date: String = row.get(0)?;
    let created_at: String = row.get(5)?;
    Ok(DailyStats {
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        total_groups: row.get(1)?,
        total_messages: row.get(2)?,
        success_messages: row.get(3)?,
        failed_messages: row.get(4)?,
        created_at: parse_ts(5, &created_at)?,
    })
}

fn read_stats(conn: &Connection, date: NaiveDate) -> Result<Option<DailyStats>> {
    conn.query_row(
        "SELECT date, total_groups, total_messages, success_messages, failed_messages, created_at
         FROM daily_stats WHERE date = ?1",
        params![date.format(DATE_FORMAT).to_string()],
        row_to_stats,
    )
    .optional()
    .map_err(|e| PromoError::Persistence(format!("Read stats: {e}")))
}

#[async_trait]
impl DeliveryStore for PromoDb {
    async fn append(&self, entry: &NewDeliveryLog) -> Result<DeliveryLogEntry> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO delivery_logs
             (group_identifier, template_id, rendered_content, sent_at, success, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.group_identifier,
                entry.template_id,
                entry.rendered_content,
                ts(entry.sent_at),
                entry.success,
                entry.error_message,
            ],
        )
        .map_err(|e| PromoError::Persistence(format!("Append delivery log: {e}")))?;
        Ok(DeliveryLogEntry {
            id: conn.last_insert_rowid(),
            group_identifier: entry.group_identifier.clone(),
            template_id: entry.template_id,
            rendered_content: entry.rendered_content.clone(),
            sent_at: entry.sent_at,
            success: entry.success,
            error_message: entry.error_message.clone(),
        })
    }

    async fn recent_for_group(
        &self,
        group_identifier: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, group_identifier, template_id, rendered_content, sent_at, success, error_message
                 FROM delivery_logs WHERE group_identifier = ?1
                 ORDER BY sent_at DESC, id DESC LIMIT ?2",
            )
            .map_err(PromoError::persistence)?;
        let rows = stmt
            .query_map(params![group_identifier, limit as i64], row_to_entry)
            .map_err(PromoError::persistence)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(PromoError::persistence)
    }

    async fn upsert_stats(&self, stats: &DailyStats, mode: StatsMode) -> Result<DailyStats> {
        let sql = match mode {
            StatsMode::Replace => {
                "INSERT INTO daily_stats
                 (date, total_groups, total_messages, success_messages, failed_messages, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(date) DO UPDATE SET
                    total_groups = excluded.total_groups,
                    total_messages = excluded.total_messages,
                    success_messages = excluded.success_messages,
                    failed_messages = excluded.failed_messages,
                    created_at = excluded.created_at"
            }
            StatsMode::Accumulate => {
                "INSERT INTO daily_stats
                 (date, total_groups, total_messages, success_messages, failed_messages, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(date) DO UPDATE SET
                    total_groups = excluded.total_groups,
                    total_messages = total_messages + excluded.total_messages,
                    success_messages = success_messages + excluded.success_messages,
                    failed_messages = failed_messages + excluded.failed_messages"
            }
        };

        let conn = self.conn()?;
        conn.execute(
            sql,
            params![
                stats.date.format(DATE_FORMAT).to_string(),
                stats.total_groups,
                stats.total_messages,
                stats.success_messages,
                stats.failed_messages,
                ts(stats.created_at),
            ],
        )
        .map_err(|e| PromoError::Persistence(format!("Upsert stats: {e}")))?;

        read_stats(&conn, stats.date)?
            .ok_or_else(|| PromoError::Persistence(format!("stats row for {} vanished", stats.date)))
    }

    async fn stats_for(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        let conn = self.conn()?;
        read_stats(&conn, date)
    }
}
