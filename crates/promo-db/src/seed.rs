//! Built-in templates inserted into an empty library.

use promo_core::types::NewTemplate;

/// Default promotional templates.
pub fn default_templates() -> Vec<NewTemplate> {
    vec![
        NewTemplate::new(
            "Sapaan Pagi",
            "general",
            "🌅 Selamat pagi! Hari ini {DAY}, {DATE}.\n\n\
             Jangan lewatkan promo spesial kami bulan {MONTH} {YEAR}. \
             Balas pesan ini untuk info lebih lanjut.",
        ),
        NewTemplate::new(
            "Promo Harian",
            "promo",
            "🔥 PROMO HARI INI ({DATE} {TIME})\n\n\
             Paket data mulai dari harga terjangkau. Stok terbatas, order sekarang!",
        ),
        NewTemplate::new(
            "Info Layanan",
            "info",
            "ℹ️ Layanan kami buka setiap hari.\n\
             Ketik .help di grup untuk melihat perintah yang tersedia.",
        ),
        NewTemplate::new(
            "Promo Akhir Bulan",
            "promo",
            "🎉 Promo akhir bulan {MONTH} {YEAR}!\n\n\
             Diskon khusus untuk member grup {GROUP_ID}. Berlaku sampai akhir bulan.",
        ),
        NewTemplate::new(
            "Pengingat",
            "general",
            "⏰ Pengingat {DAY}, {TIME}\n\n\
             Masih ada kuota promo tersisa hari ini. Hubungi admin untuk pemesanan.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let defaults = default_templates();
        assert!(!defaults.is_empty());
        for t in &defaults {
            assert!(t.validate().is_ok(), "{} should be valid", t.title);
            assert!(t.active);
        }
    }
}
