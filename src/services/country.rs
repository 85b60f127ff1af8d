//! Country profiles for supported airtime markets
//!
//! Maps a phone-number country prefix to its local currency and the
//! provider's accepted face-value range. The bounds check runs before any
//! price-oracle call so invalid orders never touch the oracle.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountryProfile {
    pub prefix: &'static str,
    pub currency: &'static str,
    pub min_face_value: Decimal,
    pub max_face_value: Decimal,
}

/// Provider top-up limits per market, in local currency.
static COUNTRY_PROFILES: &[CountryProfile] = &[
    CountryProfile {
        prefix: "+254",
        currency: "KES",
        min_face_value: dec!(5),
        max_face_value: dec!(10000),
    },
    CountryProfile {
        prefix: "+256",
        currency: "UGX",
        min_face_value: dec!(50),
        max_face_value: dec!(375000),
    },
    CountryProfile {
        prefix: "+255",
        currency: "TZS",
        min_face_value: dec!(100),
        max_face_value: dec!(250000),
    },
    CountryProfile {
        prefix: "+234",
        currency: "NGN",
        min_face_value: dec!(50),
        max_face_value: dec!(50000),
    },
    CountryProfile {
        prefix: "+265",
        currency: "MWK",
        min_face_value: dec!(100),
        max_face_value: dec!(150000),
    },
];

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+[1-9]\d{9,13}$").expect("valid phone regex");
}

/// Validate the international phone-number format (E.164, 10-14 digits).
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Resolve the country profile for a phone number by longest prefix match.
pub fn profile_for_phone(phone: &str) -> Option<&'static CountryProfile> {
    COUNTRY_PROFILES
        .iter()
        .find(|p| phone.starts_with(p.prefix))
}

/// Check a requested face value against the country's provider limits.
pub fn amount_within_bounds(profile: &CountryProfile, amount: Decimal) -> bool {
    amount >= profile.min_face_value && amount <= profile.max_face_value
}
