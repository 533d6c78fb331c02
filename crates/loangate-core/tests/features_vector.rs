// crates/loangate-core/tests/features_vector.rs
// ============================================================================
// Module: Feature Extraction Tests
// Description: Validate the fifteen-feature vector, defaults, and clamps.
// Purpose: Ensure feature ordering and degradation behavior stay stable.
// Dependencies: loangate-core
// ============================================================================

//! Feature extraction tests against a stub reuse lookup.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use loangate_core::ApiKey;
use loangate_core::ApplicationPayload;
use loangate_core::ContactBlock;
use loangate_core::DealerBlock;
use loangate_core::EmploymentType;
use loangate_core::FEATURE_NAMES;
use loangate_core::FinancialBlock;
use loangate_core::LoanBlock;
use loangate_core::PersonalBlock;
use loangate_core::RequestId;
use loangate_core::RequestMeta;
use loangate_core::ReuseLookup;
use loangate_core::StoreError;
use loangate_core::Timestamp;
use loangate_core::VehicleBlock;
use loangate_core::core::hashing::salted_identifier_hash;
use loangate_core::features::extract;

/// 2025-06-15T00:00:00Z.
const NOW: Timestamp = Timestamp::from_unix_seconds(1_749_945_600);

/// Salt used by the fixtures.
const SALT: &str = "test-salt";

/// Stub lookup keyed by identifier hash.
#[derive(Default)]
struct StubLookup {
    counts: BTreeMap<String, u64>,
    dealer_volume: u64,
    dealer_percentile: Option<f64>,
}

impl ReuseLookup for StubLookup {
    fn identifier_reuse_count(
        &self,
        identifier_hash: &str,
        _requesting: &RequestId,
        _since: Timestamp,
    ) -> Result<u64, StoreError> {
        Ok(self.counts.get(identifier_hash).copied().unwrap_or(0))
    }

    fn dealer_volume_24h(
        &self,
        _dealer_hash: &str,
        _requesting: &RequestId,
        _now: Timestamp,
    ) -> Result<u64, StoreError> {
        Ok(self.dealer_volume)
    }

    fn dealer_fraud_percentile(&self, _dealer_hash: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.dealer_percentile)
    }
}

fn sample_payload() -> ApplicationPayload {
    ApplicationPayload {
        personal: PersonalBlock {
            first_name: "Avery".to_string(),
            last_name: "Tremblay".to_string(),
            date_of_birth: "1987-03-10".to_string(),
            sin: "130692544".to_string(),
        },
        contact: ContactBlock {
            email: "avery.tremblay@example.com".to_string(),
            phone: "416-555-0134".to_string(),
            street_address: "12 King St W".to_string(),
            city: "Toronto".to_string(),
            province: "ON".to_string(),
            postal_code: "M5V 2T6".to_string(),
        },
        financial: FinancialBlock {
            annual_income: 80_000.0,
            employment_type: EmploymentType::FullTime,
            employment_months: 48,
            credit_score: 750,
            monthly_debt_payments: 900.0,
        },
        loan: LoanBlock {
            amount: 20_000.0,
            term_months: 60,
            interest_rate: 7.5,
            down_payment: 5_000.0,
            purchase_price: 25_000.0,
        },
        vehicle: VehicleBlock {
            year: 2022,
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            vin: "2HGFE2F52NH100001".to_string(),
            value: 25_000.0,
            mileage_km: 45_000.0,
        },
        dealer: DealerBlock {
            dealer_id: "DLR-001".to_string(),
            name: "Maple Motors".to_string(),
            province: "ON".to_string(),
        },
    }
}

fn scored_request() -> RequestId {
    RequestId::from_bytes([1; 16])
}

fn sample_meta() -> RequestMeta {
    RequestMeta {
        api_key: ApiKey::new("client-a"),
        client_ip: "203.0.113.10".to_string(),
        user_agent: Some("loangate-sdk/1.2".to_string()),
        geo_province: None,
    }
}

/// Position of a feature name in the declared order.
fn index_of(name: &str) -> usize {
    FEATURE_NAMES
        .iter()
        .position(|candidate| *candidate == name)
        .unwrap()
}

#[test]
fn vector_has_fifteen_features_in_declared_order() {
    let lookup = StubLookup::default();
    let vector =
        extract(&scored_request(), &sample_payload(), &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert_eq!(vector.values.len(), FEATURE_NAMES.len());
    assert!((vector.values[index_of("age")] - 38.0).abs() < f64::EPSILON);
    assert!((vector.values[index_of("sin_valid")] - 1.0).abs() < f64::EPSILON);
    assert!(
        (vector.values[index_of("loan_to_value_ratio")] - 0.8).abs() < 1e-9
    );
    assert!(
        (vector.values[index_of("dp_income_ratio")] - 0.0625).abs() < 1e-9
    );
    assert!((vector.values[index_of("address_postal_match")] - 1.0).abs() < f64::EPSILON);
}

#[test]
fn unparseable_birth_date_uses_median_default() {
    let mut payload = sample_payload();
    payload.personal.date_of_birth = "not-a-date".to_string();
    let lookup = StubLookup::default();
    let vector = extract(&scored_request(), &payload, &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert!((vector.values[index_of("age")] - 40.0).abs() < f64::EPSILON);
}

#[test]
fn reuse_counts_resolve_by_hash_and_cap() {
    let payload = sample_payload();
    let mut lookup = StubLookup::default();
    let phone_hash = salted_identifier_hash(SALT, "4165550134");
    let email_hash = salted_identifier_hash(SALT, "avery.tremblay@example.com");
    lookup.counts.insert(phone_hash, 3);
    lookup.counts.insert(email_hash, 999);
    let vector = extract(&scored_request(), &payload, &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert!((vector.values[index_of("phone_reuse_count")] - 3.0).abs() < f64::EPSILON);
    assert!((vector.values[index_of("email_reuse_count")] - 20.0).abs() < f64::EPSILON);
    assert!((vector.values[index_of("vin_reuse_flag")] - 0.0).abs() < f64::EPSILON);
}

#[test]
fn vin_reuse_is_a_flag_not_a_count() {
    let payload = sample_payload();
    let mut lookup = StubLookup::default();
    let vin_hash = salted_identifier_hash(SALT, "2HGFE2F52NH100001");
    lookup.counts.insert(vin_hash, 7);
    let vector = extract(&scored_request(), &payload, &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert!((vector.values[index_of("vin_reuse_flag")] - 1.0).abs() < f64::EPSILON);
}

#[test]
fn geo_province_mismatch_sets_the_indicator() {
    let payload = sample_payload();
    let mut meta = sample_meta();
    meta.geo_province = Some("BC".to_string());
    let lookup = StubLookup::default();
    let vector = extract(&scored_request(), &payload, &meta, SALT, &lookup, NOW).unwrap();
    assert!((vector.values[index_of("province_ip_mismatch")] - 1.0).abs() < f64::EPSILON);
}

#[test]
fn postal_code_from_another_province_fails_the_match() {
    let mut payload = sample_payload();
    payload.contact.postal_code = "V6B 1A1".to_string();
    let lookup = StubLookup::default();
    let vector = extract(&scored_request(), &payload, &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert!((vector.values[index_of("address_postal_match")] - 0.0).abs() < f64::EPSILON);
}

#[test]
fn ratios_clamp_to_declared_maxima() {
    let mut payload = sample_payload();
    payload.loan.amount = 500_000.0;
    payload.vehicle.value = 10_000.0;
    let lookup = StubLookup::default();
    let vector = extract(&scored_request(), &payload, &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert!((vector.values[index_of("loan_to_value_ratio")] - 3.0).abs() < f64::EPSILON);
}

#[test]
fn dealer_percentile_defaults_to_the_median() {
    let lookup = StubLookup::default();
    let vector =
        extract(&scored_request(), &sample_payload(), &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert!((vector.values[index_of("dealer_fraud_percentile")] - 0.5).abs() < f64::EPSILON);
}

#[test]
fn every_extracted_value_is_finite() {
    let lookup = StubLookup {
        counts: BTreeMap::new(),
        dealer_volume: 10_000,
        dealer_percentile: Some(0.9),
    };
    let mut payload = sample_payload();
    payload.financial.annual_income = 0.0;
    payload.vehicle.value = 0.0;
    let vector = extract(&scored_request(), &payload, &sample_meta(), SALT, &lookup, NOW).unwrap();
    assert!(vector.values.iter().all(|value| value.is_finite()));
}
