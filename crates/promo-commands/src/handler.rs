//! Command execution and reply formatting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use promo_core::config::PromoConfig;
use promo_core::error::{PromoError, Result};
use promo_core::traits::{DeliveryStore, GroupStore, ProductCatalog, TemplateStore};
use promo_core::types::{Template, local_part};
use promo_scheduler::{PromoteEngine, RenderContext, Scheduler, render};
use promo_security::AdminAllowlist;

use crate::catalog::import_products;
use crate::parser::{Command, parse};

/// Most groups listed by `active-groups`.
pub const MAX_LISTED_GROUPS: usize = 20;

/// Where a command came from.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Chat the command was typed in; the target group for group commands.
    pub chat_id: String,
    pub sender: String,
    pub is_group: bool,
}

impl CommandContext {
    /// Group chats are recognised by the `@g.us` server suffix.
    pub fn new(chat_id: &str, sender: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender: sender.to_string(),
            is_group: chat_id.ends_with("@g.us"),
        }
    }
}

/// Executes text commands against the engine and scheduler.
pub struct CommandHandler {
    scheduler: Arc<Scheduler>,
    admins: AdminAllowlist,
    catalog: Option<Arc<dyn ProductCatalog>>,
    batch_size: usize,
    catalog_category: String,
    prefix: String,
    tick_interval: Duration,
    auto_start: bool,
}

impl CommandHandler {
    pub fn new(scheduler: Arc<Scheduler>, config: &PromoConfig) -> Self {
        let admins = AdminAllowlist::new(&config.commands);
        if admins.is_empty() {
            tracing::warn!("⚠️ No admins configured, admin commands are disabled");
        } else {
            tracing::info!("🔐 {} admin(s) allowed", admins.len());
        }
        Self {
            scheduler,
            admins,
            catalog: None,
            batch_size: config.catalog.batch_size,
            catalog_category: config.catalog.category.clone(),
            prefix: config.commands.prefix.clone(),
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs),
            auto_start: config.scheduler.enabled,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn engine(&self) -> &PromoteEngine {
        self.scheduler.engine()
    }

    fn offset(&self) -> FixedOffset {
        self.engine().settings().render.offset()
    }

    fn local_time(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.offset()).format("%Y-%m-%d %H:%M").to_string()
    }

    /// Reply to `text`, or `None` when it is not a command.
    pub async fn handle(&self, ctx: &CommandContext, text: &str) -> Option<String> {
        let cmd = match parse(text, &self.prefix) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return None,
            Err(e) => return Some(error_reply(&e)),
        };
        tracing::debug!("Command {cmd:?} from {} in {}", ctx.sender, ctx.chat_id);
        Some(match self.execute(ctx, cmd).await {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, PromoError::Persistence(_)) {
                    tracing::error!("❌ Command failed: {e}");
                }
                error_reply(&e)
            }
        })
    }

    /// Authorize and run a parsed command.
    pub async fn execute(&self, ctx: &CommandContext, cmd: Command) -> Result<String> {
        if cmd.requires_admin() && !self.admins.is_admin(&ctx.sender) {
            return Err(PromoError::Permission("this command is restricted to admins".into()));
        }
        if cmd.requires_group() && !ctx.is_group {
            return Err(PromoError::Validation("this command can only be used in a group".into()));
        }

        match cmd {
            Command::Activate => self.activate(ctx).await,
            Command::Deactivate => {
                self.engine().deactivate(&ctx.chat_id).await?;
                Ok("⏹️ *AUTO PROMOTE DISABLED*\n\nThis group will no longer receive promotions.\n\
                    Use .activate to turn it back on."
                    .into())
            }
            Command::Status => self.status(ctx).await,
            Command::TestSend => {
                let outcome = self.engine().send_now(&ctx.chat_id).await?;
                let mut reply = format!("✅ Test promote sent (template #{})", outcome.template_id);
                if !outcome.recorded {
                    reply.push_str("\n⚠️ The send could not be recorded");
                }
                Ok(reply)
            }
            Command::ListTemplates => {
                let templates = self.engine().templates().list_active().await?;
                Ok(template_list("📋 *ACTIVE TEMPLATES*", &templates, false))
            }
            Command::ListAllTemplates => {
                let templates = self.engine().templates().list_all().await?;
                Ok(template_list("📋 *ALL TEMPLATES*", &templates, true))
            }
            Command::PreviewTemplate(id) => {
                let t = self.template(id).await?;
                let render_ctx =
                    RenderContext::new(Utc::now(), &self.engine().settings().render, &ctx.chat_id);
                Ok(format!(
                    "👀 *PREVIEW #{}* {}\n🏷️ {} | 📂 {}\n\n{}",
                    t.id,
                    status_icon(t.active),
                    t.title,
                    t.category,
                    render(&t.content, &render_ctx)
                ))
            }
            Command::AddTemplate {
                title,
                category,
                content,
            } => {
                let t = self
                    .engine()
                    .templates()
                    .create(&promo_core::types::NewTemplate::new(&title, &category, &content))
                    .await?;
                tracing::info!("📝 Template #{} created by {}", t.id, ctx.sender);
                Ok(format!(
                    "✅ *TEMPLATE CREATED*\n\n🆔 ID: {}\n🏷️ Title: {}\n📂 Category: {}\n\n📝 Content:\n{}",
                    t.id, t.title, t.category, t.content
                ))
            }
            Command::EditTemplate {
                id,
                title,
                category,
                content,
            } => {
                let mut t = self.template(id).await?;
                t.title = title;
                t.category = category;
                t.content = content;
                t.active = true;
                let t = self.engine().templates().update(&t).await?;
                Ok(format!(
                    "✅ *TEMPLATE UPDATED*\n\n🆔 ID: {}\n🏷️ Title: {}\n📂 Category: {}\n\n📝 Content:\n{}",
                    t.id, t.title, t.category, t.content
                ))
            }
            Command::SetTemplateActive { id, active } => {
                let mut t = self.template(id).await?;
                t.active = active;
                self.engine().templates().update(&t).await?;
                let state = if active { "enabled" } else { "disabled" };
                Ok(format!("{} Template #{id} {state}", status_icon(active)))
            }
            Command::DeleteTemplate(id) => {
                let t = self.template(id).await?;
                self.engine().templates().delete(id).await?;
                Ok(format!(
                    "🗑️ *TEMPLATE DELETED*\n\n🆔 ID: {}\n🏷️ Title: {}\n📂 Category: {}",
                    t.id, t.title, t.category
                ))
            }
            Command::DeleteAllTemplates => self.delete_all().await,
            Command::DeleteTemplates(ids) => self.delete_many(&ids).await,
            Command::TemplateStats => self.template_stats().await,
            Command::PromoteStats => self.promote_stats().await,
            Command::ActiveGroups => self.active_groups().await,
            Command::FetchProducts => self.fetch_products().await,
            Command::Help => Ok(help_text(&self.prefix)),
        }
    }

    async fn activate(&self, ctx: &CommandContext) -> Result<String> {
        self.engine().activate(&ctx.chat_id).await?;
        if self.auto_start && self.scheduler.start(self.tick_interval) {
            tracing::info!("⏰ Scheduler auto-started by activation in {}", ctx.chat_id);
        }
        let hours = self.engine().settings().promote_interval.num_minutes() as f64 / 60.0;
        Ok(format!(
            "✅ *AUTO PROMOTE ACTIVATED*\n\n📢 This group will receive a promotion every {hours} hours.\n\
             🚀 The first one goes out on the next scheduler tick.\n\n\
             Use .deactivate to stop or .status to check."
        ))
    }

    async fn status(&self, ctx: &CommandContext) -> Result<String> {
        let Some(status) = self.engine().group_status(&ctx.chat_id).await? else {
            return Ok("ℹ️ Auto promote has never been activated in this group.\n\
                       Use .activate to start."
                .into());
        };
        let g = &status.group;
        let mut out = String::from("📊 *AUTO PROMOTE STATUS*\n\n");
        out.push_str(&format!(
            "{} Status: {}\n",
            status_icon(g.active),
            if g.active { "active" } else { "inactive" }
        ));
        if let Some(started) = g.started_at {
            out.push_str(&format!("📅 Active since: {}\n", self.local_time(started)));
        }
        match g.last_promoted_at {
            Some(last) => out.push_str(&format!("📤 Last promote: {}\n", self.local_time(last))),
            None => out.push_str("📤 Last promote: never\n"),
        }
        if let Some(next) = status.next_due {
            out.push_str(&format!("⏭️ Next due: {}\n", self.local_time(next)));
        }
        if let Some(attempt) = &status.last_attempt
            && !attempt.success
        {
            out.push_str(&format!(
                "⚠️ Last attempt failed at {}: {}\n",
                self.local_time(attempt.sent_at),
                attempt.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
        out.push_str(&format!(
            "⏰ Scheduler: {}",
            if self.scheduler.is_running() { "running" } else { "stopped" }
        ));
        Ok(out)
    }

    async fn template(&self, id: i64) -> Result<Template> {
        self.engine()
            .templates()
            .get_by_id(id)
            .await?
            .ok_or_else(|| PromoError::NotFound(format!("template with id {id}")))
    }

    async fn delete_all(&self) -> Result<String> {
        let templates = self.engine().templates().list_all().await?;
        if templates.is_empty() {
            return Ok("ℹ️ There are no templates to delete".into());
        }
        let mut deleted = 0;
        let mut failed = 0;
        for t in &templates {
            match self.engine().templates().delete(t.id).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Failed to delete template #{}: {e}", t.id);
                    failed += 1;
                }
            }
        }
        let mut out = format!("🗑️ *ALL TEMPLATES DELETED*\n\n✅ Deleted: {deleted}");
        if failed > 0 {
            out.push_str(&format!("\n❌ Failed: {failed}"));
        }
        out.push_str("\n\n⚠️ Auto promote has nothing to send until new templates are added");
        Ok(out)
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<String> {
        let mut deleted = Vec::new();
        let mut errors = Vec::new();
        for &id in ids {
            match self.engine().templates().get_by_id(id).await {
                Ok(Some(t)) => match self.engine().templates().delete(id).await {
                    Ok(()) => deleted.push(format!("ID {id}: {}", t.title)),
                    Err(e) => errors.push(format!("ID {id}: {e}")),
                },
                Ok(None) => errors.push(format!("ID {id}: not found")),
                Err(e) => errors.push(format!("ID {id}: {e}")),
            }
        }

        let mut out = format!("🗑️ *DELETE TEMPLATES*\n\n✅ Deleted: {}\n", deleted.len());
        if !errors.is_empty() {
            out.push_str(&format!("❌ Failed: {}\n", errors.len()));
            for e in &errors {
                out.push_str(&format!("• {e}\n"));
            }
        }
        if !deleted.is_empty() {
            out.push_str("\n📋 Removed:\n");
            for d in &deleted {
                out.push_str(&format!("• {d}\n"));
            }
        }
        Ok(out.trim_end().to_string())
    }

    async fn template_stats(&self) -> Result<String> {
        let templates = self.engine().templates().list_all().await?;
        let active = templates.iter().filter(|t| t.active).count();
        let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
        for t in &templates {
            *by_category.entry(t.category.as_str()).or_default() += 1;
        }

        let mut out = format!(
            "📊 *TEMPLATE STATS*\n\n📝 Total: {}\n✅ Active: {}\n❌ Inactive: {}\n",
            templates.len(),
            active,
            templates.len() - active
        );
        if !by_category.is_empty() {
            out.push_str("\n📂 Per category:\n");
            for (category, count) in by_category {
                out.push_str(&format!("• {category}: {count}\n"));
            }
        }
        Ok(out.trim_end().to_string())
    }

    async fn promote_stats(&self) -> Result<String> {
        let groups = self.engine().groups().list_all().await?;
        let active = groups.iter().filter(|g| g.active).count();
        let today = Utc::now().with_timezone(&self.offset()).date_naive();
        let stats = self.engine().deliveries().stats_for(today).await?;

        let mut out = format!(
            "📈 *PROMOTE STATS*\n\n👥 Registered groups: {}\n✅ Active groups: {}\n⏰ Scheduler: {}\n",
            groups.len(),
            active,
            if self.scheduler.is_running() { "running" } else { "stopped" }
        );
        match stats {
            Some(s) => out.push_str(&format!(
                "\n📅 Today ({}):\n📤 Messages: {}\n✅ Success: {}\n❌ Failed: {}",
                s.date, s.total_messages, s.success_messages, s.failed_messages
            )),
            None => out.push_str(&format!("\n📅 Today ({today}): no promotions yet")),
        }
        Ok(out)
    }

    async fn active_groups(&self) -> Result<String> {
        let groups = self.engine().groups().list_active().await?;
        if groups.is_empty() {
            return Ok("ℹ️ No groups have auto promote active".into());
        }
        let mut out = format!("👥 *ACTIVE GROUPS* ({})\n\n", groups.len());
        for (i, g) in groups.iter().take(MAX_LISTED_GROUPS).enumerate() {
            let last = g
                .last_promoted_at
                .map(|t| self.local_time(t))
                .unwrap_or_else(|| "never".into());
            out.push_str(&format!(
                "{}. {}\n   📤 Last promote: {last}\n",
                i + 1,
                local_part(&g.group_identifier)
            ));
        }
        if groups.len() > MAX_LISTED_GROUPS {
            out.push_str(&format!("\n… and {} more", groups.len() - MAX_LISTED_GROUPS));
        }
        Ok(out.trim_end().to_string())
    }

    async fn fetch_products(&self) -> Result<String> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| PromoError::Config("product catalog is not configured".into()))?;
        let report = import_products(
            catalog.as_ref(),
            self.engine().templates().as_ref(),
            self.batch_size,
            &self.catalog_category,
        )
        .await?;

        if report.products == 0 {
            return Ok("❌ The catalog returned no products".into());
        }
        let mut out = format!(
            "🛒 *PRODUCT UPDATE*\n\n✅ Created: {} templates\n📦 Products: {} (grouped by {})",
            report.created.len(),
            report.products,
            self.batch_size
        );
        if !report.failed.is_empty() {
            out.push_str(&format!("\n❌ Failed: {} groups", report.failed.len()));
        }
        Ok(out)
    }
}

fn status_icon(active: bool) -> &'static str {
    if active { "✅" } else { "❌" }
}

fn template_list(header: &str, templates: &[Template], show_status: bool) -> String {
    if templates.is_empty() {
        return format!("{header}\n\nNo templates found.");
    }
    let mut out = format!("{header} ({})\n\n", templates.len());
    for t in templates {
        if show_status {
            out.push_str(&format!("{} ", status_icon(t.active)));
        }
        out.push_str(&format!("#{} {} [{}]\n", t.id, t.title, t.category));
    }
    out.push_str("\n💡 Use .preview-template <id> to see the content");
    out
}

/// User-facing text for a failed command.
pub fn error_reply(e: &PromoError) -> String {
    match e {
        PromoError::Validation(m) => format!("❌ {m}"),
        PromoError::NotFound(m) => format!("❌ Not found: {m}"),
        PromoError::Conflict(m) => format!("⚠️ {m}"),
        PromoError::Permission(m) => format!("🚫 {m}"),
        PromoError::Delivery(m) => format!("❌ Send failed: {m}"),
        other => format!("❌ {other}"),
    }
}

fn help_text(p: &str) -> String {
    format!(
        "🤖 *AUTO PROMOTE COMMANDS*\n\n\
         👥 *Group*\n\
         {p}activate : start auto promote here\n\
         {p}deactivate : stop auto promote here\n\
         {p}status : show promote status\n\
         {p}test-send : send one promotion now\n\n\
         📋 *Templates*\n\
         {p}list-templates : active templates\n\
         {p}list-all-templates : every template\n\
         {p}preview-template <id>\n\n\
         🔐 *Admin*\n\
         {p}add-template \"<title>\" \"<category>\" \"<content>\"\n\
         {p}edit-template <id> \"<title>\" \"<category>\" \"<content>\"\n\
         {p}enable-template <id> / {p}disable-template <id>\n\
         {p}delete-template <id>\n\
         {p}delete-templates <id,id,...> (max 20)\n\
         {p}delete-all-templates\n\
         {p}template-stats\n\
         {p}promote-stats\n\
         {p}active-groups\n\
         {p}fetch-products\n\n\
         🧩 Placeholders: {{DATE}} {{TIME}} {{DAY}} {{MONTH}} {{YEAR}} {{GROUP_ID}}"
    )
}
