//! Placeholder substitution for template bodies.
//!
//! Supported tokens: `{DATE}` `{TIME}` `{DAY}` `{MONTH}` `{YEAR}` `{GROUP_ID}`.
//! Anything else in braces is left as written.

use chrono::{DateTime, Datelike, FixedOffset, Utc, Weekday};
use promo_core::config::{Locale, RenderConfig};
use promo_core::types::local_part;

/// Runtime values a template is rendered against.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Wall clock in the configured offset.
    pub now: DateTime<FixedOffset>,
    pub locale: Locale,
    pub group_identifier: String,
}

impl RenderContext {
    pub fn new(now: DateTime<Utc>, config: &RenderConfig, group_identifier: &str) -> Self {
        Self {
            now: now.with_timezone(&config.offset()),
            locale: config.locale,
            group_identifier: group_identifier.to_string(),
        }
    }

    fn values(&self) -> [(&'static str, String); 6] {
        [
            ("{DATE}", self.now.format("%Y-%m-%d").to_string()),
            ("{TIME}", self.now.format("%H:%M").to_string()),
            ("{DAY}", day_name(self.locale, self.now.weekday()).to_string()),
            ("{MONTH}", month_name(self.locale, self.now.month()).to_string()),
            ("{YEAR}", self.now.year().to_string()),
            ("{GROUP_ID}", local_part(&self.group_identifier).to_string()),
        ]
    }
}

/// Replace every known token in `content`.
pub fn render(content: &str, ctx: &RenderContext) -> String {
    ctx.values()
        .iter()
        .fold(content.to_string(), |acc, (token, value)| acc.replace(token, value))
}

pub fn day_name(locale: Locale, day: Weekday) -> &'static str {
    match locale {
        Locale::Indonesian => match day {
            Weekday::Sun => "Minggu",
            Weekday::Mon => "Senin",
            Weekday::Tue => "Selasa",
            Weekday::Wed => "Rabu",
            Weekday::Thu => "Kamis",
            Weekday::Fri => "Jumat",
            Weekday::Sat => "Sabtu",
        },
        Locale::English => match day {
            Weekday::Sun => "Sunday",
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
        },
    }
}

const MONTHS_ID: [&str; 12] = [
    "Januari", "Februari", "Maret", "April", "Mei", "Juni",
    "Juli", "Agustus", "September", "Oktober", "November", "Desember",
];

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

/// `month` is 1-based, as returned by `Datelike::month`.
pub fn month_name(locale: Locale, month: u32) -> &'static str {
    let names = match locale {
        Locale::Indonesian => &MONTHS_ID,
        Locale::English => &MONTHS_EN,
    };
    names
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("")
}
