// crates/loangate-core/src/features.rs
// ============================================================================
// Module: Loangate Feature Extraction
// Description: Fifteen named numeric features in a declared order.
// Purpose: Produce the feature vector consumed by the ML scoring service.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The features stage produces exactly fifteen named numeric features in the
//! order declared by [`FEATURE_NAMES`]. Missing inputs map to per-feature
//! defaults (neutral values or medians, documented on each extractor), ratios
//! are clamped to declared maxima, and reuse counts come from the job store
//! through the [`ReuseLookup`] seam using salted identifier hashes. Reuse
//! lookups pass the request being scored so its own ingress-written
//! identifier rows never count as reuse.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::application::ApplicationPayload;
use crate::core::application::RequestMeta;
use crate::core::application::age_years;
use crate::core::application::digits_of;
use crate::core::hashing::salted_identifier_hash;
use crate::core::identifiers::RequestId;
use crate::core::stage::FeatureVector;
use crate::core::time::Timestamp;
use crate::interfaces::ReuseLookup;
use crate::interfaces::StoreError;
use crate::rules::is_disposable_email;
use crate::rules::is_valid_sin;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Feature set version recorded in every feature vector.
pub const FEATURE_SET_VERSION: &str = "fs-1.4.0";

/// Declared feature names, in vector order.
pub const FEATURE_NAMES: [&str; 15] = [
    "age",
    "sin_valid",
    "email_domain_category",
    "phone_reuse_count",
    "email_reuse_count",
    "vin_reuse_flag",
    "dealer_volume_24h",
    "dealer_fraud_percentile",
    "province_ip_mismatch",
    "address_postal_match",
    "loan_to_value_ratio",
    "purchase_loan_ratio",
    "dp_income_ratio",
    "mileage_plausibility",
    "high_value_low_income",
];

/// Reuse lookback window in milliseconds (30 days).
const REUSE_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1_000;
/// Default applicant age when the date of birth cannot be parsed (median).
const DEFAULT_AGE_YEARS: f64 = 40.0;
/// Cap applied to reuse-count features.
const REUSE_COUNT_CAP: u64 = 20;
/// Cap applied to the dealer 24-hour volume feature.
const DEALER_VOLUME_CAP: u64 = 500;
/// Default dealer fraud percentile when no history exists (median).
const DEFAULT_DEALER_FRAUD_PERCENTILE: f64 = 0.5;
/// Maximum loan-to-value ratio after clamping.
const MAX_LTV_RATIO: f64 = 3.0;
/// Maximum purchase-to-loan ratio after clamping.
const MAX_PURCHASE_LOAN_RATIO: f64 = 5.0;
/// Maximum down-payment-to-income ratio after clamping.
const MAX_DP_INCOME_RATIO: f64 = 1.0;
/// Expected kilometres driven per vehicle year.
const EXPECTED_KM_PER_YEAR: f64 = 20_000.0;
/// Maximum mileage plausibility ratio after clamping.
const MAX_MILEAGE_PLAUSIBILITY: f64 = 5.0;
/// Vehicle value above this multiple of income flags high-value-low-income.
const HIGH_VALUE_INCOME_MULTIPLE: f64 = 0.8;

/// Free consumer email providers (category 0).
const FREE_EMAIL_DOMAINS: [&str; 7] = [
    "gmail.com",
    "hotmail.com",
    "icloud.com",
    "live.com",
    "outlook.com",
    "protonmail.com",
    "yahoo.com",
];

// ============================================================================
// SECTION: Extraction
// ============================================================================

/// Extracts the feature vector for a request's payload.
///
/// # Errors
///
/// Returns [`StoreError`] when a reuse-count lookup fails; all other inputs
/// degrade to documented defaults instead of failing.
pub fn extract(
    request_id: &RequestId,
    payload: &ApplicationPayload,
    meta: &RequestMeta,
    salt: &str,
    lookups: &dyn ReuseLookup,
    now: Timestamp,
) -> Result<FeatureVector, StoreError> {
    let since = now.plus_millis(-REUSE_WINDOW_MS);

    let phone_hash = salted_identifier_hash(salt, &digits_of(&payload.contact.phone));
    let email_hash =
        salted_identifier_hash(salt, &payload.contact.email.to_ascii_lowercase());
    let vin_hash = salted_identifier_hash(salt, &payload.vehicle.vin.to_ascii_uppercase());
    let dealer_hash = salted_identifier_hash(salt, &payload.dealer.dealer_id);

    let phone_reuse = lookups.identifier_reuse_count(&phone_hash, request_id, since)?;
    let email_reuse = lookups.identifier_reuse_count(&email_hash, request_id, since)?;
    let vin_reuse = lookups.identifier_reuse_count(&vin_hash, request_id, since)?;
    let dealer_volume = lookups.dealer_volume_24h(&dealer_hash, request_id, now)?;
    let dealer_percentile = lookups
        .dealer_fraud_percentile(&dealer_hash)?
        .unwrap_or(DEFAULT_DEALER_FRAUD_PERCENTILE);

    let values = vec![
        age_feature(payload, now),
        bool_feature(is_valid_sin(&digits_of(&payload.personal.sin))),
        email_domain_category(&payload.contact.email),
        count_feature(phone_reuse, REUSE_COUNT_CAP),
        count_feature(email_reuse, REUSE_COUNT_CAP),
        bool_feature(vin_reuse > 0),
        count_feature(dealer_volume, DEALER_VOLUME_CAP),
        dealer_percentile.clamp(0.0, 1.0),
        province_ip_mismatch(payload, meta),
        address_postal_match(payload),
        ratio_or(payload.loan.amount, payload.vehicle.value, 1.0, MAX_LTV_RATIO),
        ratio_or(payload.loan.purchase_price, payload.loan.amount, 1.0, MAX_PURCHASE_LOAN_RATIO),
        ratio_or(payload.loan.down_payment, payload.financial.annual_income, 0.0, MAX_DP_INCOME_RATIO),
        mileage_plausibility(payload, now),
        high_value_low_income(payload),
    ];

    Ok(FeatureVector {
        values,
        feature_set_version: FEATURE_SET_VERSION.to_string(),
    })
}

// ============================================================================
// SECTION: Feature Extractors
// ============================================================================

/// Applicant age in years. Default: median age 40 when unparseable.
fn age_feature(payload: &ApplicationPayload, now: Timestamp) -> f64 {
    age_years(&payload.personal.date_of_birth, now)
        .map_or(DEFAULT_AGE_YEARS, f64::from)
}

/// Encodes a boolean indicator feature.
const fn bool_feature(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// Email domain category: 0 free provider, 1 other, 2 disposable.
fn email_domain_category(email: &str) -> f64 {
    if is_disposable_email(email) {
        return 2.0;
    }
    let free = email.rsplit_once('@').is_some_and(|(_, domain)| {
        let domain = domain.to_ascii_lowercase();
        FREE_EMAIL_DOMAINS.contains(&domain.as_str())
    });
    if free { 0.0 } else { 1.0 }
}

/// Caps and converts a reuse count.
fn count_feature(count: u64, cap: u64) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "Counts are capped far below 2^52.")]
    let capped = count.min(cap) as f64;
    capped
}

/// Indicator: declared province differs from the edge-derived IP province.
/// Default: 0.0 (neutral) when no geo province was supplied.
fn province_ip_mismatch(payload: &ApplicationPayload, meta: &RequestMeta) -> f64 {
    meta.geo_province.as_deref().map_or(0.0, |geo| {
        bool_feature(!geo.eq_ignore_ascii_case(&payload.contact.province))
    })
}

/// Indicator: postal-code forward sortation area is consistent with the
/// declared province. Unknown leading letters score the neutral 0.5.
fn address_postal_match(payload: &ApplicationPayload) -> f64 {
    let Some(first) = payload
        .contact
        .postal_code
        .trim()
        .chars()
        .next()
        .map(|ch| ch.to_ascii_uppercase())
    else {
        return 0.0;
    };
    let provinces: &[&str] = match first {
        'A' => &["NL"],
        'B' => &["NS"],
        'C' => &["PE"],
        'E' => &["NB"],
        'G' | 'H' | 'J' => &["QC"],
        'K' | 'L' | 'M' | 'N' | 'P' => &["ON"],
        'R' => &["MB"],
        'S' => &["SK"],
        'T' => &["AB"],
        'V' => &["BC"],
        'X' => &["NT", "NU"],
        'Y' => &["YT"],
        _ => return 0.5,
    };
    bool_feature(provinces.contains(&payload.contact.province.as_str()))
}

/// Clamped ratio with a default for undefined denominators.
fn ratio_or(numerator: f64, denominator: f64, default: f64, max: f64) -> f64 {
    if denominator > 0.0 && numerator.is_finite() {
        (numerator / denominator).clamp(0.0, max)
    } else {
        default
    }
}

/// Ratio of actual to expected kilometres per vehicle year, clamped.
/// Default: 1.0 (plausible) for current-year vehicles.
fn mileage_plausibility(payload: &ApplicationPayload, now: Timestamp) -> f64 {
    let now_year = 1970 + now.as_unix_seconds() / 31_557_600;
    let age = now_year - i64::from(payload.vehicle.year);
    if age < 1 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "Vehicle age is far below 2^52.")]
    let expected = EXPECTED_KM_PER_YEAR * age as f64;
    (payload.vehicle.mileage_km / expected).clamp(0.0, MAX_MILEAGE_PLAUSIBILITY)
}

/// Indicator: vehicle value is high relative to declared income.
/// Default: 1.0 when income is zero or negative.
fn high_value_low_income(payload: &ApplicationPayload) -> f64 {
    if payload.financial.annual_income <= 0.0 {
        return 1.0;
    }
    bool_feature(
        payload.vehicle.value > payload.financial.annual_income * HIGH_VALUE_INCOME_MULTIPLE,
    )
}
