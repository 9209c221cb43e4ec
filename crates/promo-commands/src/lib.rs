//! # Promobot Commands
//!
//! Text commands typed into a chat: group opt-in, template management,
//! statistics and catalog import.

pub mod catalog;
pub mod handler;
pub mod parser;

pub use catalog::{ImportReport, import_products};
pub use handler::{CommandContext, CommandHandler, error_reply};
pub use parser::{Command, parse, parse_quoted_args};
