//! Admin allow-list.
//!
//! Senders are compared by their bare number: the `@server` suffix and a
//! leading `+` are ignored on both sides.

use promo_core::config::CommandsConfig;
use promo_core::types::local_part;
use std::collections::HashSet;

/// Sender identities allowed to run administrative commands.
pub struct AdminAllowlist {
    admins: HashSet<String>,
}

impl AdminAllowlist {
    /// Create an allow-list from the command configuration.
    pub fn new(config: &CommandsConfig) -> Self {
        Self::from_ids(config.admins.iter().map(String::as_str))
    }

    pub fn from_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            admins: ids
                .into_iter()
                .map(normalize)
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    /// Check whether `sender` is an admin.
    pub fn is_admin(&self, sender: &str) -> bool {
        let id = normalize(sender);
        if id.is_empty() {
            tracing::warn!("Empty sender provided for admin check");
            return false;
        }
        let allowed = self.admins.contains(&id);
        if !allowed {
            tracing::warn!("🚫 Unauthorized admin attempt from {id}");
        }
        allowed
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

fn normalize(sender: &str) -> String {
    local_part(sender.trim()).trim_start_matches('+').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = CommandsConfig {
            prefix: ".".into(),
            admins: vec!["6281234567890".into(), "+6289999".into()],
        };
        let list = AdminAllowlist::new(&config);
        assert_eq!(list.len(), 2);
        assert!(list.is_admin("6281234567890"));
        assert!(list.is_admin("6281234567890@s.whatsapp.net"));
        assert!(list.is_admin("+6289999"));
        assert!(list.is_admin("6289999"));
        assert!(!list.is_admin("628000"));
    }

    #[test]
    fn test_empty_sender_rejected() {
        let list = AdminAllowlist::from_ids(["", "  "]);
        assert!(list.is_empty());
        assert!(!list.is_admin(""));
    }
}
