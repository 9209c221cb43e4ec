//! Generic HTTP webhook transport: POST with JSON body.

use async_trait::async_trait;
use promo_core::config::WebhookChannelConfig;
use promo_core::error::{PromoError, Result};
use promo_core::traits::Messenger;

/// Forwards each promotion to an HTTP endpoint that relays it to the group.
pub struct WebhookChannel {
    url: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookChannelConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(PromoError::Config("webhook url not configured".into()));
        }
        Ok(Self {
            url: config.url,
            headers: config.headers,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Messenger for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, group_identifier: &str, text: &str) -> Result<()> {
        let mut req = self.client.post(&self.url).json(&serde_json::json!({
            "group": group_identifier,
            "text": text,
        }));
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PromoError::Delivery(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("Webhook delivered to {group_identifier}");
            Ok(())
        } else {
            Err(PromoError::Delivery(format!("Webhook error {}", resp.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_posts_group_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Relay-Key", "secret"))
            .and(body_json(serde_json::json!({ "group": "1@g.us", "text": "Halo" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(WebhookChannelConfig {
            url: server.uri(),
            headers: vec![("X-Relay-Key".into(), "secret".into())],
        })
        .unwrap();
        channel.send("1@g.us", "Halo").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(WebhookChannelConfig {
            url: server.uri(),
            headers: vec![],
        })
        .unwrap();
        assert!(matches!(
            channel.send("1@g.us", "Halo").await,
            Err(PromoError::Delivery(_))
        ));
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(WebhookChannel::new(WebhookChannelConfig::default()).is_err());
    }
}
