//! Group Registry on SQLite.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use promo_core::error::{PromoError, Result};
use promo_core::traits::GroupStore;
use promo_core::types::Group;
use rusqlite::{OptionalExtension, Row, params};

use crate::{PromoDb, parse_opt_ts, parse_ts, ts};

const GROUP_COLUMNS: &str =
    "id, group_identifier, active, started_at, last_promoted_at, created_at, updated_at";

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Group {
        id: row.get(0)?,
        group_identifier: row.get(1)?,
        active: row.get(2)?,
        started_at: parse_opt_ts(3, row.get(3)?)?,
        last_promoted_at: parse_opt_ts(4, row.get(4)?)?,
        created_at: parse_ts(5, &created_at)?,
        updated_at: parse_ts(6, &updated_at)?,
    })
}

impl PromoDb {
    fn query_groups(&self, sql: &str) -> Result<Vec<Group>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(PromoError::persistence)?;
        let rows = stmt
            .query_map([], row_to_group)
            .map_err(PromoError::persistence)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(PromoError::persistence)
    }
}

#[async_trait]
impl GroupStore for PromoDb {
    async fn get(&self, group_identifier: &str) -> Result<Option<Group>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM promote_groups WHERE group_identifier = ?1"),
            params![group_identifier],
            row_to_group,
        )
        .optional()
        .map_err(|e| PromoError::Persistence(format!("Get group: {e}")))
    }

    async fn create(&self, group_identifier: &str) -> Result<Group> {
        let now = Utc::now();
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO promote_groups (group_identifier, active, created_at, updated_at)
                 VALUES (?1, 0, ?2, ?2)",
                params![group_identifier, ts(now)],
            )
            .map_err(|e| PromoError::Persistence(format!("Create group: {e}")))?;
        if inserted == 0 {
            return Err(PromoError::Conflict(format!(
                "group {group_identifier} is already registered"
            )));
        }
        tracing::debug!("📝 Registered group {group_identifier}");
        Ok(Group {
            id: conn.last_insert_rowid(),
            group_identifier: group_identifier.to_string(),
            active: false,
            started_at: None,
            last_promoted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, group: &Group) -> Result<Group> {
        // Strictly later than the previous stamp so a stale copy can never match
        let updated_at = Utc::now().max(group.updated_at + Duration::nanoseconds(1));
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE promote_groups
                 SET active = ?1, started_at = ?2, last_promoted_at = ?3, updated_at = ?4
                 WHERE id = ?5 AND updated_at = ?6",
                params![
                    group.active,
                    group.started_at.map(ts),
                    group.last_promoted_at.map(ts),
                    ts(updated_at),
                    group.id,
                    ts(group.updated_at),
                ],
            )
            .map_err(|e| PromoError::Persistence(format!("Update group: {e}")))?;

        if changed == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM promote_groups WHERE id = ?1)",
                    params![group.id],
                    |r| r.get(0),
                )
                .map_err(PromoError::persistence)?;
            return Err(if exists {
                PromoError::Conflict(format!(
                    "group {} was modified concurrently",
                    group.group_identifier
                ))
            } else {
                PromoError::NotFound(format!("group {}", group.group_identifier))
            });
        }

        Ok(Group {
            updated_at,
            ..group.clone()
        })
    }

    async fn list_active(&self) -> Result<Vec<Group>> {
        self.query_groups(&format!(
            "SELECT {GROUP_COLUMNS} FROM promote_groups WHERE active = 1 ORDER BY id"
        ))
    }

    async fn list_all(&self) -> Result<Vec<Group>> {
        self.query_groups(&format!("SELECT {GROUP_COLUMNS} FROM promote_groups ORDER BY id"))
    }
}
