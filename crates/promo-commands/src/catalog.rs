//! Bulk template generation from the product catalog.

use promo_core::error::Result;
use promo_core::traits::{ProductCatalog, TemplateStore};
use promo_core::types::{NewTemplate, Product, Template};

/// Outcome of a catalog import.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub products: usize,
    pub created: Vec<Template>,
    /// One message per batch that could not be stored.
    pub failed: Vec<String>,
}

/// Fetch every product and store one template per `batch_size` products.
/// A failing batch is reported and the rest continue.
pub async fn import_products(
    catalog: &dyn ProductCatalog,
    templates: &dyn TemplateStore,
    batch_size: usize,
    category: &str,
) -> Result<ImportReport> {
    let products = catalog.fetch_products().await?;
    let mut report = ImportReport {
        products: products.len(),
        ..Default::default()
    };

    for (idx, batch) in products.chunks(batch_size.max(1)).enumerate() {
        let pack = idx + 1;
        let template = NewTemplate::new(
            &format!("Product Pack {pack} ({} items)", batch.len()),
            category,
            &product_pack_content(batch, pack),
        );
        match templates.create(&template).await {
            Ok(t) => {
                tracing::info!("📦 Created template #{} with {} products", t.id, batch.len());
                report.created.push(t);
            }
            Err(e) => {
                tracing::warn!("⚠️ Product pack {pack} not stored: {e}");
                report.failed.push(format!("pack {pack}: {e}"));
            }
        }
    }
    Ok(report)
}

/// Promotional body for one batch. Products without a name or a price
/// are left out.
pub fn product_pack_content(products: &[Product], pack: usize) -> String {
    let mut out = format!(
        "🛒 *DATA PACKAGES #{pack}*\n\n🔥 *LIMITED PROMO!* Stock is running low, order now!\n\n"
    );
    for p in products {
        let name = if p.short_name.is_empty() { &p.name } else { &p.short_name };
        if name.is_empty() || p.price_label.is_empty() {
            continue;
        }
        out.push_str(&format!("📱 *{name}*\n💰 {}\n\n", p.price_label));
    }
    out.push_str("━━━━━━━━━━━━━━━━━━━━\n📅 Prices valid {DAY}, {DATE}\n💬 Contact admin to order");
    out
}
