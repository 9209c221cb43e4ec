//! HTTP product catalog client.

use std::time::Duration;

use async_trait::async_trait;
use promo_core::config::CatalogConfig;
use promo_core::error::{PromoError, Result};
use promo_core::traits::ProductCatalog;
use promo_core::types::Product;
use serde::Deserialize;

/// Catalog API envelope.
#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<Product>,
}

/// Fetches products with a JSON GET authenticated by `X-API-Key`.
pub struct HttpCatalog {
    url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(PromoError::Config("catalog.url not configured".into()));
        }
        Ok(Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ProductCatalog for HttpCatalog {
    async fn fetch_products(&self) -> Result<Vec<Product>> {
        tracing::info!("🛒 Fetching products from catalog...");
        let mut req = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("promobot/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout);
        if !self.api_key.is_empty() {
            req = req.header("X-API-Key", &self.api_key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PromoError::Channel(format!("Catalog request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(PromoError::Channel(format!("Catalog error {}", resp.status())));
        }

        let body: ProductResponse = resp
            .json()
            .await
            .map_err(|e| PromoError::Channel(format!("Invalid catalog response: {e}")))?;
        if !body.success {
            return Err(PromoError::Channel(format!("Catalog API error: {}", body.message)));
        }
        tracing::info!("📦 Catalog returned {} products", body.data.len());
        Ok(body.data)
    }
}
