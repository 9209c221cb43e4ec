//! Text command parsing.
//!
//! A command is `<prefix><name> [args]`. Names are case-insensitive and
//! each has a short legacy alias (`.promote`, `.deletemulti`, ...).

use promo_core::error::{PromoError, Result};

/// Most ids accepted by one `delete-templates` call.
pub const MAX_BULK_DELETE: usize = 20;

/// A parsed command with validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Activate,
    Deactivate,
    Status,
    TestSend,
    ListTemplates,
    ListAllTemplates,
    PreviewTemplate(i64),
    AddTemplate {
        title: String,
        category: String,
        content: String,
    },
    EditTemplate {
        id: i64,
        title: String,
        category: String,
        content: String,
    },
    SetTemplateActive {
        id: i64,
        active: bool,
    },
    DeleteTemplate(i64),
    DeleteAllTemplates,
    DeleteTemplates(Vec<i64>),
    TemplateStats,
    PromoteStats,
    ActiveGroups,
    FetchProducts,
    Help,
}

impl Command {
    /// Template mutation, statistics and catalog import.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::AddTemplate { .. }
                | Command::EditTemplate { .. }
                | Command::SetTemplateActive { .. }
                | Command::DeleteTemplate(_)
                | Command::DeleteAllTemplates
                | Command::DeleteTemplates(_)
                | Command::TemplateStats
                | Command::PromoteStats
                | Command::ActiveGroups
                | Command::FetchProducts
        )
    }

    /// Commands that target the chat they are issued in.
    pub fn requires_group(&self) -> bool {
        matches!(
            self,
            Command::Activate | Command::Deactivate | Command::Status | Command::TestSend
        )
    }
}

/// Parse `text`. `Ok(None)` when it is not one of our commands.
pub fn parse(text: &str, prefix: &str) -> Result<Option<Command>> {
    let Some(body) = text.trim().strip_prefix(prefix) else {
        return Ok(None);
    };
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    let cmd = match name.to_lowercase().as_str() {
        "activate" | "promote" => Command::Activate,
        "deactivate" | "disablepromote" => Command::Deactivate,
        "status" | "statuspromo" => Command::Status,
        "test-send" | "testpromo" => Command::TestSend,
        "list-templates" | "listtemplates" => Command::ListTemplates,
        "list-all-templates" | "alltemplates" => Command::ListAllTemplates,
        "preview-template" | "previewtemplate" => {
            Command::PreviewTemplate(parse_id(rest, "preview-template <id>")?)
        }
        "add-template" | "addtemplate" => {
            let [title, category, content] =
                three_quoted(rest, r#"add-template "<title>" "<category>" "<content>""#)?;
            Command::AddTemplate {
                title,
                category,
                content,
            }
        }
        "edit-template" | "edittemplate" => {
            let usage = r#"edit-template <id> "<title>" "<category>" "<content>""#;
            let (id, rest) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| usage_error(usage))?;
            let id = parse_id(id, usage)?;
            let [title, category, content] = three_quoted(rest, usage)?;
            Command::EditTemplate {
                id,
                title,
                category,
                content,
            }
        }
        "enable-template" | "enabletemplate" => Command::SetTemplateActive {
            id: parse_id(rest, "enable-template <id>")?,
            active: true,
        },
        "disable-template" | "disabletemplate" => Command::SetTemplateActive {
            id: parse_id(rest, "disable-template <id>")?,
            active: false,
        },
        "delete-template" | "deletetemplate" => {
            Command::DeleteTemplate(parse_id(rest, "delete-template <id>")?)
        }
        "delete-all-templates" | "deleteall" => Command::DeleteAllTemplates,
        "delete-templates" | "deletemulti" => Command::DeleteTemplates(parse_id_list(rest)?),
        "template-stats" | "templatestats" => Command::TemplateStats,
        "promote-stats" | "promotestats" => Command::PromoteStats,
        "active-groups" | "activegroups" => Command::ActiveGroups,
        "fetch-products" | "fetchproducts" => Command::FetchProducts,
        "help" | "promotehelp" => Command::Help,
        _ => return Ok(None),
    };
    Ok(Some(cmd))
}

/// Split on spaces, keeping `"quoted text"` together as one argument.
/// An unterminated quote runs to the end of the input.
pub fn parse_quoted_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' if in_quotes => {
                args.push(std::mem::take(&mut current));
                in_quotes = false;
            }
            '"' => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
                in_quotes = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

fn usage_error(usage: &str) -> PromoError {
    PromoError::Validation(format!("usage: {usage}"))
}

fn parse_id(raw: &str, usage: &str) -> Result<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(usage_error(usage));
    }
    raw.parse()
        .map_err(|_| PromoError::Validation(format!("template id must be a number, got '{raw}'")))
}

fn three_quoted(rest: &str, usage: &str) -> Result<[String; 3]> {
    let mut parts = parse_quoted_args(rest).into_iter();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) => Ok([a, b, c]),
        _ => Err(usage_error(usage)),
    }
}

fn parse_id_list(rest: &str) -> Result<Vec<i64>> {
    let joined: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
    if joined.is_empty() {
        return Err(usage_error("delete-templates <id,id,...>"));
    }
    let raw: Vec<&str> = joined.split(',').filter(|s| !s.is_empty()).collect();
    if raw.len() > MAX_BULK_DELETE {
        return Err(PromoError::Validation(format!(
            "at most {MAX_BULK_DELETE} templates per call"
        )));
    }
    let ids = raw
        .iter()
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| PromoError::Validation(format!("invalid template id: {s}")))
        })
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(PromoError::Validation("no valid template ids".into()));
    }
    Ok(ids)
}
