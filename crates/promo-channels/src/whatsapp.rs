//! WhatsApp Business Cloud API transport.
//!
//! Requires: Access Token + Phone Number ID from Meta Business Suite.

use async_trait::async_trait;
use promo_core::config::WhatsAppChannelConfig;
use promo_core::error::{PromoError, Result};
use promo_core::traits::Messenger;
use promo_core::types::local_part;

/// Sends promotions through the Graph API `messages` endpoint.
pub struct WhatsAppChannel {
    config: WhatsAppChannelConfig,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppChannelConfig) -> Result<Self> {
        if config.access_token.is_empty() {
            return Err(PromoError::Config("WhatsApp access_token not configured".into()));
        }
        if config.phone_number_id.is_empty() {
            return Err(PromoError::Config("WhatsApp phone_number_id not configured".into()));
        }
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    /// Send a text message, returning the API message id.
    async fn send_text_message(&self, to: &str, text: &str) -> Result<String> {
        let recipient_type = if to.ends_with("@g.us") { "group" } else { "individual" };
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": recipient_type,
            "to": local_part(to),
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        let response = self
            .client
            .post(self.messages_url())
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| PromoError::Delivery(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PromoError::Delivery(format!(
                "WhatsApp API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PromoError::Delivery(format!("Invalid WhatsApp response: {e}")))?;

        let msg_id = result["messages"][0]["id"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!("WhatsApp message sent: {msg_id} → {to}");
        Ok(msg_id)
    }
}

#[async_trait]
impl Messenger for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send(&self, group_identifier: &str, text: &str) -> Result<()> {
        self.send_text_message(group_identifier, text).await?;
        Ok(())
    }
}
