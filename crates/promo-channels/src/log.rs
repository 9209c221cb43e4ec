//! Dry-run transport: logs the promotion instead of sending it.

use async_trait::async_trait;
use promo_core::error::Result;
use promo_core::traits::Messenger;

pub struct LogChannel;

#[async_trait]
impl Messenger for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, group_identifier: &str, text: &str) -> Result<()> {
        tracing::info!("📝 [dry-run] → {group_identifier}\n{text}");
        Ok(())
    }
}
