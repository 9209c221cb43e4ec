//! # Promobot Security
//!
//! Who may run administrative commands.

pub mod allowlist;

pub use allowlist::AdminAllowlist;
