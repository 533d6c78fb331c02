// crates/loangate-core/src/rules.rs
// ============================================================================
// Module: Loangate Rules Engine
// Description: Data-driven rule pack evaluated over application payloads.
// Purpose: Produce rule flags, an additive rule score, and hard-fail verdicts.
// Dependencies: crate::core, serde, sha2
// ============================================================================

//! ## Overview
//! The rule pack is versioned configuration consumed by one generic
//! evaluator: one code path, many rule rows. Hard-fail rules short-circuit
//! the pipeline into a decline; soft rules contribute declared weights to an
//! additive score capped at 1.0. Deny lists hold salted hashes, never raw
//! identifier values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::application::ApplicationPayload;
use crate::core::application::age_years;
use crate::core::application::digits_of;
use crate::core::hashing::salted_identifier_hash;
use crate::core::stage::RulesOutput;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Rule pack version shipped with this build.
pub const DEFAULT_RULEPACK_VERSION: &str = "2025.06.0";

/// Default salt for deny-list and reuse hashing. Deployments override this.
pub const DEFAULT_IDENTIFIER_SALT: &str = "loangate-identifiers-v1";

/// Disposable email domains flagged by the soft rules.
const DISPOSABLE_EMAIL_DOMAINS: [&str; 6] = [
    "10minutemail.com",
    "guerrillamail.com",
    "mailinator.com",
    "tempmail.com",
    "throwaway.email",
    "yopmail.com",
];

// ============================================================================
// SECTION: Rule Pack
// ============================================================================

/// Salted-hash deny lists keyed by identifier kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyLists {
    /// Denied SIN hashes.
    #[serde(default)]
    pub sin: BTreeSet<String>,
    /// Denied email hashes.
    #[serde(default)]
    pub email: BTreeSet<String>,
    /// Denied phone hashes.
    #[serde(default)]
    pub phone: BTreeSet<String>,
    /// Denied VIN hashes.
    #[serde(default)]
    pub vin: BTreeSet<String>,
}

/// One rule row: a code, a weight, a hard-fail flag, and a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Stable rule code surfaced as a flag and a decline reason.
    pub code: String,
    /// Additive contribution to the rule score when triggered.
    pub weight: f64,
    /// True when triggering forces an immediate decline.
    pub hard_fail: bool,
    /// The check evaluated against the payload.
    pub check: RuleCheck,
}

/// Deterministic checks available to rule rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCheck {
    /// SIN fails length or checksum validation.
    InvalidSin,
    /// SIN hash appears on the deny list.
    DeniedSin,
    /// Email hash appears on the deny list.
    DeniedEmail,
    /// Phone hash appears on the deny list.
    DeniedPhone,
    /// VIN hash appears on the deny list.
    DeniedVin,
    /// A mandatory identifier field is empty.
    MissingMandatoryFields,
    /// Loan-to-value ratio exceeds the limit.
    LoanToValueAbove {
        /// Inclusive limit that must not be exceeded.
        limit: f64,
    },
    /// Down payment is below the given fraction of the purchase price.
    DownPaymentRatioBelow {
        /// Minimum acceptable down-payment fraction.
        minimum: f64,
    },
    /// Credit score is below the threshold.
    CreditScoreBelow {
        /// Minimum acceptable credit score.
        minimum: u32,
    },
    /// Employment tenure is below the threshold in months.
    EmploymentMonthsBelow {
        /// Minimum acceptable tenure in months.
        minimum: u32,
    },
    /// Annual income is below the threshold in dollars.
    IncomeBelow {
        /// Minimum acceptable annual income.
        minimum: f64,
    },
    /// Mileage implies more kilometres per vehicle year than the limit.
    MileageAboveKmPerYear {
        /// Maximum plausible kilometres per year.
        limit: f64,
    },
    /// Email domain is a known disposable provider.
    DisposableEmailDomain,
    /// Applicant age is outside the acceptable range.
    AgeOutside {
        /// Minimum acceptable age in years.
        minimum: u32,
        /// Maximum acceptable age in years.
        maximum: u32,
    },
}

/// Versioned rule pack: the rule rows plus deny lists and hashing salt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePack {
    /// Pack version recorded in every rules output.
    pub version: String,
    /// Salt applied to identifier hashing.
    pub salt: String,
    /// Rule rows evaluated in order.
    pub rules: Vec<RuleSpec>,
    /// Deny lists of salted hashes.
    pub deny: DenyLists,
}

impl RulePack {
    /// Builds the rule pack shipped with this release.
    #[must_use]
    pub fn default_pack() -> Self {
        Self {
            version: DEFAULT_RULEPACK_VERSION.to_string(),
            salt: DEFAULT_IDENTIFIER_SALT.to_string(),
            rules: vec![
                hard("invalid_sin", RuleCheck::InvalidSin),
                hard("missing_fields", RuleCheck::MissingMandatoryFields),
                hard("denied_sin", RuleCheck::DeniedSin),
                hard("denied_email", RuleCheck::DeniedEmail),
                hard("denied_phone", RuleCheck::DeniedPhone),
                hard("denied_vin", RuleCheck::DeniedVin),
                soft("underage_applicant", 0.4, RuleCheck::AgeOutside {
                    minimum: 18,
                    maximum: 100,
                }),
                soft("high_ltv", 0.3, RuleCheck::LoanToValueAbove {
                    limit: 1.5,
                }),
                soft("low_down_payment", 0.15, RuleCheck::DownPaymentRatioBelow {
                    minimum: 0.05,
                }),
                soft("subprime_credit", 0.25, RuleCheck::CreditScoreBelow {
                    minimum: 560,
                }),
                soft("thin_employment", 0.15, RuleCheck::EmploymentMonthsBelow {
                    minimum: 6,
                }),
                soft("low_income", 0.2, RuleCheck::IncomeBelow {
                    minimum: 18_000.0,
                }),
                soft("implausible_mileage", 0.2, RuleCheck::MileageAboveKmPerYear {
                    limit: 60_000.0,
                }),
                soft("disposable_email", 0.25, RuleCheck::DisposableEmailDomain),
            ],
            deny: DenyLists::default(),
        }
    }

    /// Hashes a normalized identifier with the pack salt.
    #[must_use]
    pub fn hash_identifier(&self, normalized: &str) -> String {
        salted_identifier_hash(&self.salt, normalized)
    }
}

/// Builds a hard-fail rule row.
fn hard(code: &str, check: RuleCheck) -> RuleSpec {
    RuleSpec {
        code: code.to_string(),
        weight: 0.0,
        hard_fail: true,
        check,
    }
}

/// Builds a weighted soft rule row.
fn soft(code: &str, weight: f64, check: RuleCheck) -> RuleSpec {
    RuleSpec {
        code: code.to_string(),
        weight,
        hard_fail: false,
        check,
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates the rule pack over a payload.
///
/// Deterministic for a given payload, pack, and timestamp. Soft-rule weights
/// sum into `rule_score`, capped at 1.0; any hard-fail rule sets `hard_fail`.
#[must_use]
pub fn evaluate(pack: &RulePack, payload: &ApplicationPayload, now: Timestamp) -> RulesOutput {
    let mut flags = Vec::new();
    let mut score = 0.0_f64;
    let mut hard_fail = false;

    for rule in &pack.rules {
        if !check_triggered(&rule.check, pack, payload, now) {
            continue;
        }
        flags.push(rule.code.clone());
        if rule.hard_fail {
            hard_fail = true;
        } else {
            score += rule.weight;
        }
    }

    RulesOutput {
        rule_flags: flags,
        rule_score: score.min(1.0),
        hard_fail,
        rulepack_version: pack.version.clone(),
    }
}

/// Evaluates one check against the payload.
fn check_triggered(
    check: &RuleCheck,
    pack: &RulePack,
    payload: &ApplicationPayload,
    now: Timestamp,
) -> bool {
    match check {
        RuleCheck::InvalidSin => !is_valid_sin(&digits_of(&payload.personal.sin)),
        RuleCheck::DeniedSin => pack
            .deny
            .sin
            .contains(&pack.hash_identifier(&digits_of(&payload.personal.sin))),
        RuleCheck::DeniedEmail => pack
            .deny
            .email
            .contains(&pack.hash_identifier(&payload.contact.email.to_ascii_lowercase())),
        RuleCheck::DeniedPhone => pack
            .deny
            .phone
            .contains(&pack.hash_identifier(&digits_of(&payload.contact.phone))),
        RuleCheck::DeniedVin => pack
            .deny
            .vin
            .contains(&pack.hash_identifier(&payload.vehicle.vin.to_ascii_uppercase())),
        RuleCheck::MissingMandatoryFields => {
            payload.personal.sin.trim().is_empty()
                || payload.contact.email.trim().is_empty()
                || payload.contact.phone.trim().is_empty()
                || payload.vehicle.vin.trim().is_empty()
        }
        RuleCheck::LoanToValueAbove {
            limit,
        } => {
            payload.vehicle.value > 0.0 && payload.loan.amount / payload.vehicle.value > *limit
        }
        RuleCheck::DownPaymentRatioBelow {
            minimum,
        } => {
            payload.loan.purchase_price > 0.0
                && payload.loan.down_payment / payload.loan.purchase_price < *minimum
        }
        RuleCheck::CreditScoreBelow {
            minimum,
        } => payload.financial.credit_score < *minimum,
        RuleCheck::EmploymentMonthsBelow {
            minimum,
        } => payload.financial.employment_months < *minimum,
        RuleCheck::IncomeBelow {
            minimum,
        } => payload.financial.annual_income < *minimum,
        RuleCheck::MileageAboveKmPerYear {
            limit,
        } => mileage_per_year(payload, now).is_some_and(|rate| rate > *limit),
        RuleCheck::DisposableEmailDomain => is_disposable_email(&payload.contact.email),
        RuleCheck::AgeOutside {
            minimum,
            maximum,
        } => age_years(&payload.personal.date_of_birth, now)
            .is_none_or(|age| age < *minimum || age > *maximum),
    }
}

// ============================================================================
// SECTION: Check Helpers
// ============================================================================

/// Validates a Canadian SIN: nine digits, valid leading digit, and a
/// doubling checksum.
#[must_use]
pub fn is_valid_sin(digits: &str) -> bool {
    if digits.len() != 9 {
        return false;
    }
    let Some(first) = digits.chars().next() else {
        return false;
    };
    // Leading 0 is never issued; leading 8 is reserved.
    if first == '0' || first == '8' {
        return false;
    }
    let mut sum = 0_u32;
    for (index, ch) in digits.chars().enumerate() {
        let Some(value) = ch.to_digit(10) else {
            return false;
        };
        let doubled = if index % 2 == 1 {
            let twice = value * 2;
            if twice > 9 { twice - 9 } else { twice }
        } else {
            value
        };
        sum += doubled;
    }
    sum % 10 == 0
}

/// Returns kilometres per vehicle year implied by the odometer, when the
/// vehicle age is at least one year.
fn mileage_per_year(payload: &ApplicationPayload, now: Timestamp) -> Option<f64> {
    let now_year = 1970 + now.as_unix_seconds() / 31_557_600;
    let vehicle_year = i64::from(payload.vehicle.year);
    let age_years = now_year - vehicle_year;
    if age_years < 1 {
        return None;
    }
    #[allow(clippy::cast_precision_loss, reason = "Vehicle age is far below 2^52.")]
    let rate = payload.vehicle.mileage_km / age_years as f64;
    Some(rate)
}

/// Returns true when the email domain is a known disposable provider.
#[must_use]
pub fn is_disposable_email(email: &str) -> bool {
    email
        .rsplit_once('@')
        .is_some_and(|(_, domain)| {
            let domain = domain.to_ascii_lowercase();
            DISPOSABLE_EMAIL_DOMAINS.contains(&domain.as_str())
        })
}
