//! # Promobot Core
//!
//! Shared vocabulary for the promotion engine: domain types, the collaborator
//! traits the engine is written against, configuration and errors.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::PromoConfig;
pub use error::{PromoError, Result};
pub use traits::{DeliveryStore, GroupStore, Messenger, ProductCatalog, TemplateStore};
pub use types::{
    DailyStats, DeliveryLogEntry, Group, NewDeliveryLog, NewTemplate, Product, StatsMode, Template,
};
