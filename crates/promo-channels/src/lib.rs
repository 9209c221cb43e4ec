//! # Promobot Channels
//! Delivery transports and the product catalog client.

pub mod catalog;
pub mod log;
pub mod webhook;
pub mod whatsapp;

use std::sync::Arc;

use promo_core::config::{ChannelConfig, ChannelKind};
use promo_core::error::Result;
use promo_core::traits::Messenger;

pub use catalog::HttpCatalog;
pub use log::LogChannel;
pub use webhook::WebhookChannel;
pub use whatsapp::WhatsAppChannel;

/// Build the configured delivery transport.
pub fn build_messenger(config: &ChannelConfig) -> Result<Arc<dyn Messenger>> {
    let messenger: Arc<dyn Messenger> = match config.kind {
        ChannelKind::Whatsapp => Arc::new(WhatsAppChannel::new(config.whatsapp.clone())?),
        ChannelKind::Webhook => Arc::new(WebhookChannel::new(config.webhook.clone())?),
        ChannelKind::Log => Arc::new(LogChannel),
    };
    tracing::info!("📡 Delivery channel: {}", messenger.name());
    Ok(messenger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_log_channel() {
        let config = ChannelConfig {
            kind: ChannelKind::Log,
            ..Default::default()
        };
        assert_eq!(build_messenger(&config).unwrap().name(), "log");
    }

    #[test]
    fn test_unconfigured_whatsapp_fails() {
        assert!(build_messenger(&ChannelConfig::default()).is_err());
    }
}
