//! # Promobot Scheduler
//!
//! The promotion engine proper: group activation, the dispatch cycle and the
//! periodic scheduler that drives it.
//!
//! ```text
//! Scheduler (tokio interval, one cycle at a time)
//!   └── PromoteEngine::run_cycle
//!         ├── GroupStore::list_active → is_due?
//!         ├── TemplatePicker (uniform, seeded StdRng)
//!         ├── render ({DATE} {TIME} {DAY} {MONTH} {YEAR} {GROUP_ID})
//!         ├── Messenger::send (bounded by timeout)
//!         ├── DeliveryStore::append (every attempt)
//!         ├── last_promoted_at (success only, under per-group lock)
//!         └── DeliveryStore::upsert_stats
//! ```

pub mod dispatch;
pub mod engine;
pub mod locks;
pub mod picker;
pub mod render;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{CycleReport, DispatchSettings, GroupStatus, PromoteEngine, SendOutcome};
pub use engine::Scheduler;
pub use picker::TemplatePicker;
pub use render::{RenderContext, render};
