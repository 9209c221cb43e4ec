//! Template Library on SQLite.

use async_trait::async_trait;
use chrono::Utc;
use promo_core::error::{PromoError, Result};
use promo_core::traits::TemplateStore;
use promo_core::types::{NewTemplate, Template};
use rusqlite::{OptionalExtension, Row, params};

use crate::{PromoDb, parse_ts, ts};

const TEMPLATE_COLUMNS: &str = "id, title, content, category, active, created_at, updated_at";

fn row_to_template(row: &Row<'_>) -> rusqlite::Result<Template> {
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Template {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        active: row.get(4)?,
        created_at: parse_ts(5, &created_at)?,
        updated_at: parse_ts(6, &updated_at)?,
    })
}

impl PromoDb {
    fn query_templates(&self, filter: &str) -> Result<Vec<Template>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM promote_templates {filter} ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql).map_err(PromoError::persistence)?;
        let rows = stmt
            .query_map([], row_to_template)
            .map_err(PromoError::persistence)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(PromoError::persistence)
    }
}

#[async_trait]
impl TemplateStore for PromoDb {
    async fn list_all(&self) -> Result<Vec<Template>> {
        self.query_templates("")
    }

    async fn list_active(&self) -> Result<Vec<Template>> {
        self.query_templates("WHERE active = 1")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Template>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {TEMPLATE_COLUMNS} FROM promote_templates WHERE id = ?1"),
            params![id],
            row_to_template,
        )
        .optional()
        .map_err(|e| PromoError::Persistence(format!("Get template: {e}")))
    }

    async fn create(&self, template: &NewTemplate) -> Result<Template> {
        template.validate()?;
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO promote_templates (title, content, category, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![template.title, template.content, template.category, template.active, ts(now)],
        )
        .map_err(|e| PromoError::Persistence(format!("Create template: {e}")))?;
        Ok(Template {
            id: conn.last_insert_rowid(),
            title: template.title.clone(),
            content: template.content.clone(),
            category: template.category.clone(),
            active: template.active,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, template: &Template) -> Result<Template> {
        template.validate()?;
        let now = Utc::now();
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE promote_templates
                 SET title = ?1, content = ?2, category = ?3, active = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    template.title,
                    template.content,
                    template.category,
                    template.active,
                    ts(now),
                    template.id,
                ],
            )
            .map_err(|e| PromoError::Persistence(format!("Update template: {e}")))?;
        if changed == 0 {
            return Err(PromoError::NotFound(format!("template {}", template.id)));
        }
        Ok(Template {
            updated_at: now,
            ..template.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM promote_templates WHERE id = ?1", params![id])
            .map_err(|e| PromoError::Persistence(format!("Delete template: {e}")))?;
        Ok(())
    }
}
