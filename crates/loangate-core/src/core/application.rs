// crates/loangate-core/src/core/application.rs
// ============================================================================
// Module: Loangate Application Model
// Description: Auto-loan application payload blocks and strict validation.
// Purpose: Provide typed payload structures with fail-closed field checks.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The application payload is the client-submitted JSON body: personal,
//! contact, financial, loan, vehicle, and dealer blocks. Validation is strict
//! and fail-closed: every violated field is reported in a deterministic field
//! error map, and a payload with any violation is rejected at ingress before
//! a job is created.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::identifiers::ApiKey;
use crate::core::identifiers::RequestId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted length for free-form name fields.
const MAX_NAME_LENGTH: usize = 100;
/// Maximum accepted length for an email address.
const MAX_EMAIL_LENGTH: usize = 254;
/// Maximum accepted length for a street address.
const MAX_STREET_LENGTH: usize = 200;
/// Maximum accepted length for a postal code.
const MAX_POSTAL_LENGTH: usize = 7;
/// Maximum accepted length for a VIN.
const MAX_VIN_LENGTH: usize = 17;
/// Maximum accepted annual income in dollars.
const MAX_ANNUAL_INCOME: f64 = 10_000_000.0;
/// Maximum accepted loan amount in dollars.
const MAX_LOAN_AMOUNT: f64 = 2_000_000.0;
/// Maximum accepted vehicle value in dollars.
const MAX_VEHICLE_VALUE: f64 = 2_000_000.0;
/// Maximum accepted vehicle mileage in kilometres.
const MAX_MILEAGE_KM: f64 = 2_000_000.0;
/// Minimum accepted loan term in months.
const MIN_TERM_MONTHS: u32 = 6;
/// Maximum accepted loan term in months.
const MAX_TERM_MONTHS: u32 = 120;
/// Maximum accepted interest rate in percent.
const MAX_INTEREST_RATE: f64 = 100.0;
/// Minimum accepted credit score.
const MIN_CREDIT_SCORE: u32 = 300;
/// Maximum accepted credit score.
const MAX_CREDIT_SCORE: u32 = 900;
/// Maximum accepted employment tenure in months.
const MAX_EMPLOYMENT_MONTHS: u32 = 720;
/// Earliest accepted vehicle model year.
const MIN_VEHICLE_YEAR: u32 = 1900;
/// Latest accepted vehicle model year.
const MAX_VEHICLE_YEAR: u32 = 2100;

/// Canadian province and territory codes accepted in payloads.
const PROVINCE_CODES: [&str; 13] =
    ["AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT"];

// ============================================================================
// SECTION: Payload Blocks
// ============================================================================

/// Complete auto-loan application payload as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPayload {
    /// Applicant identity block.
    pub personal: PersonalBlock,
    /// Applicant contact block.
    pub contact: ContactBlock,
    /// Applicant financial block.
    pub financial: FinancialBlock,
    /// Requested loan block.
    pub loan: LoanBlock,
    /// Financed vehicle block.
    pub vehicle: VehicleBlock,
    /// Originating dealer block.
    pub dealer: DealerBlock,
}

/// Applicant identity details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalBlock {
    /// Applicant given name.
    pub first_name: String,
    /// Applicant family name.
    pub last_name: String,
    /// Date of birth in `YYYY-MM-DD` form.
    pub date_of_birth: String,
    /// Social Insurance Number, digits with optional separators.
    pub sin: String,
}

/// Applicant contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactBlock {
    /// Email address.
    pub email: String,
    /// Phone number, digits with optional separators.
    pub phone: String,
    /// Street address line.
    pub street_address: String,
    /// City name.
    pub city: String,
    /// Two-letter province or territory code.
    pub province: String,
    /// Canadian postal code.
    pub postal_code: String,
}

/// Applicant financial details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialBlock {
    /// Gross annual income in dollars.
    pub annual_income: f64,
    /// Employment type classification.
    pub employment_type: EmploymentType,
    /// Tenure at current employment in months.
    pub employment_months: u32,
    /// Credit bureau score.
    pub credit_score: u32,
    /// Existing monthly debt obligations in dollars.
    pub monthly_debt_payments: f64,
}

/// Employment type classification for an applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    /// Full-time employment.
    FullTime,
    /// Part-time employment.
    PartTime,
    /// Self-employed.
    SelfEmployed,
    /// Not currently employed.
    Unemployed,
    /// Retired.
    Retired,
    /// Full-time student.
    Student,
    /// Other or unclassified.
    Other,
}

impl EmploymentType {
    /// Returns a stable label for prompt rendering and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullTime => "full_time",
            Self::PartTime => "part_time",
            Self::SelfEmployed => "self_employed",
            Self::Unemployed => "unemployed",
            Self::Retired => "retired",
            Self::Student => "student",
            Self::Other => "other",
        }
    }
}

/// Requested loan terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanBlock {
    /// Requested principal in dollars.
    pub amount: f64,
    /// Requested term in months.
    pub term_months: u32,
    /// Quoted annual interest rate in percent.
    pub interest_rate: f64,
    /// Down payment in dollars.
    pub down_payment: f64,
    /// Vehicle purchase price in dollars.
    pub purchase_price: f64,
}

/// Financed vehicle details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleBlock {
    /// Model year.
    pub year: u32,
    /// Manufacturer name.
    pub make: String,
    /// Model name.
    pub model: String,
    /// Vehicle identification number.
    pub vin: String,
    /// Appraised vehicle value in dollars.
    pub value: f64,
    /// Odometer reading in kilometres.
    pub mileage_km: f64,
}

/// Originating dealer details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerBlock {
    /// Dealer identifier assigned by the lender network.
    pub dealer_id: String,
    /// Dealer display name.
    pub name: String,
    /// Dealer province or territory code.
    pub province: String,
}

// ============================================================================
// SECTION: Request Record
// ============================================================================

/// Request metadata captured at ingress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Submitting API key.
    pub api_key: ApiKey,
    /// Client IP address as observed by the listener.
    pub client_ip: String,
    /// Client user agent header, when present.
    pub user_agent: Option<String>,
    /// Province derived from the client IP by an upstream edge, when present.
    pub geo_province: Option<String>,
}

/// Lifecycle status of an application request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Accepted and waiting for a dispatcher worker.
    Queued,
    /// Reserved by a worker and running the pipeline.
    Processing,
    /// Terminal: a decision was written.
    Decided,
    /// Terminal: retries exhausted or a permanent failure occurred.
    Failed,
}

impl RequestStatus {
    /// Returns a stable label for persistence and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Decided => "decided",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its stable label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "decided" => Some(Self::Decided),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Decided | Self::Failed)
    }
}

/// Durable record of an accepted application request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRequest {
    /// Request identifier.
    pub request_id: RequestId,
    /// Validated application payload.
    pub payload: ApplicationPayload,
    /// Ingress metadata.
    pub meta: RequestMeta,
    /// Ingress acceptance time.
    pub received_at: Timestamp,
    /// Current lifecycle status.
    pub status: RequestStatus,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Payload validation failure carrying a deterministic field error map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid payload: {field_errors:?}")]
pub struct PayloadError {
    /// Violated fields mapped to human-readable messages, in field order.
    pub field_errors: BTreeMap<String, String>,
}

/// Validates a payload, returning all field violations at once.
///
/// # Errors
///
/// Returns [`PayloadError`] with one entry per violated field.
pub fn validate_payload(payload: &ApplicationPayload) -> Result<(), PayloadError> {
    let mut errors = BTreeMap::new();

    check_name(&mut errors, "personal.first_name", &payload.personal.first_name);
    check_name(&mut errors, "personal.last_name", &payload.personal.last_name);
    if parse_birth_date(&payload.personal.date_of_birth).is_none() {
        insert(&mut errors, "personal.date_of_birth", "must be a valid YYYY-MM-DD date");
    }
    if digits_of(&payload.personal.sin).len() != 9 {
        insert(&mut errors, "personal.sin", "must contain exactly 9 digits");
    }

    check_email(&mut errors, "contact.email", &payload.contact.email);
    let phone_digits = digits_of(&payload.contact.phone);
    if phone_digits.len() < 10 || phone_digits.len() > 11 {
        insert(&mut errors, "contact.phone", "must contain 10 or 11 digits");
    }
    check_bounded(&mut errors, "contact.street_address", &payload.contact.street_address, MAX_STREET_LENGTH);
    check_bounded(&mut errors, "contact.city", &payload.contact.city, MAX_NAME_LENGTH);
    check_province(&mut errors, "contact.province", &payload.contact.province);
    if payload.contact.postal_code.is_empty()
        || payload.contact.postal_code.len() > MAX_POSTAL_LENGTH
    {
        insert(&mut errors, "contact.postal_code", "must be a Canadian postal code");
    }

    check_money(&mut errors, "financial.annual_income", payload.financial.annual_income, MAX_ANNUAL_INCOME);
    if payload.financial.employment_months > MAX_EMPLOYMENT_MONTHS {
        insert(&mut errors, "financial.employment_months", "exceeds maximum tenure");
    }
    if payload.financial.credit_score < MIN_CREDIT_SCORE
        || payload.financial.credit_score > MAX_CREDIT_SCORE
    {
        insert(&mut errors, "financial.credit_score", "must be within 300..=900");
    }
    check_money(&mut errors, "financial.monthly_debt_payments", payload.financial.monthly_debt_payments, MAX_ANNUAL_INCOME);

    if !payload.loan.amount.is_finite()
        || payload.loan.amount <= 0.0
        || payload.loan.amount > MAX_LOAN_AMOUNT
    {
        insert(&mut errors, "loan.amount", "must be positive and within limits");
    }
    if payload.loan.term_months < MIN_TERM_MONTHS || payload.loan.term_months > MAX_TERM_MONTHS {
        insert(&mut errors, "loan.term_months", "must be within 6..=120");
    }
    if !payload.loan.interest_rate.is_finite()
        || payload.loan.interest_rate < 0.0
        || payload.loan.interest_rate > MAX_INTEREST_RATE
    {
        insert(&mut errors, "loan.interest_rate", "must be within 0..=100 percent");
    }
    check_money(&mut errors, "loan.down_payment", payload.loan.down_payment, MAX_LOAN_AMOUNT);
    if !payload.loan.purchase_price.is_finite()
        || payload.loan.purchase_price <= 0.0
        || payload.loan.purchase_price > MAX_VEHICLE_VALUE
    {
        insert(&mut errors, "loan.purchase_price", "must be positive and within limits");
    }

    if payload.vehicle.year < MIN_VEHICLE_YEAR || payload.vehicle.year > MAX_VEHICLE_YEAR {
        insert(&mut errors, "vehicle.year", "must be a plausible model year");
    }
    check_bounded(&mut errors, "vehicle.make", &payload.vehicle.make, MAX_NAME_LENGTH);
    check_bounded(&mut errors, "vehicle.model", &payload.vehicle.model, MAX_NAME_LENGTH);
    if payload.vehicle.vin.is_empty() || payload.vehicle.vin.len() > MAX_VIN_LENGTH {
        insert(&mut errors, "vehicle.vin", "must be a VIN of at most 17 characters");
    }
    if !payload.vehicle.value.is_finite()
        || payload.vehicle.value <= 0.0
        || payload.vehicle.value > MAX_VEHICLE_VALUE
    {
        insert(&mut errors, "vehicle.value", "must be positive and within limits");
    }
    if !payload.vehicle.mileage_km.is_finite()
        || payload.vehicle.mileage_km < 0.0
        || payload.vehicle.mileage_km > MAX_MILEAGE_KM
    {
        insert(&mut errors, "vehicle.mileage_km", "must be non-negative and within limits");
    }

    check_bounded(&mut errors, "dealer.dealer_id", &payload.dealer.dealer_id, MAX_NAME_LENGTH);
    check_bounded(&mut errors, "dealer.name", &payload.dealer.name, MAX_NAME_LENGTH);
    check_province(&mut errors, "dealer.province", &payload.dealer.province);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PayloadError {
            field_errors: errors,
        })
    }
}

/// Returns the digit characters of a string.
#[must_use]
pub fn digits_of(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Parses a `YYYY-MM-DD` birth date.
#[must_use]
pub fn parse_birth_date(value: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value, &format).ok()
}

/// Computes applicant age in whole years at the supplied time.
///
/// Returns `None` when the date of birth cannot be parsed or the timestamp
/// falls outside the representable range.
#[must_use]
pub fn age_years(date_of_birth: &str, now: Timestamp) -> Option<u32> {
    let dob = parse_birth_date(date_of_birth)?;
    let at = OffsetDateTime::from_unix_timestamp(now.as_unix_seconds()).ok()?;
    let today = at.date();
    let mut years = i64::from(today.year()) - i64::from(dob.year());
    if (today.month() as u8, today.day()) < (dob.month() as u8, dob.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Returns true when a province or territory code is recognized.
#[must_use]
pub fn is_province_code(value: &str) -> bool {
    PROVINCE_CODES.contains(&value)
}

/// Records a field violation.
fn insert(errors: &mut BTreeMap<String, String>, field: &str, message: &str) {
    errors.insert(field.to_string(), message.to_string());
}

/// Checks a required bounded name-like field.
fn check_name(errors: &mut BTreeMap<String, String>, field: &str, value: &str) {
    if value.trim().is_empty() || value.len() > MAX_NAME_LENGTH {
        insert(errors, field, "must be present and within length limits");
    }
}

/// Checks a required bounded free-form field.
fn check_bounded(errors: &mut BTreeMap<String, String>, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() || value.len() > max {
        insert(errors, field, "must be present and within length limits");
    }
}

/// Checks an email field for shape and length.
fn check_email(errors: &mut BTreeMap<String, String>, field: &str, value: &str) {
    let well_formed = value.len() <= MAX_EMAIL_LENGTH
        && value.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        });
    if !well_formed {
        insert(errors, field, "must be a well-formed email address");
    }
}

/// Checks a province code field.
fn check_province(errors: &mut BTreeMap<String, String>, field: &str, value: &str) {
    if !is_province_code(value) {
        insert(errors, field, "must be a Canadian province or territory code");
    }
}

/// Checks a non-negative bounded dollar amount.
fn check_money(errors: &mut BTreeMap<String, String>, field: &str, value: f64, max: f64) {
    if !value.is_finite() || value < 0.0 || value > max {
        insert(errors, field, "must be non-negative and within limits");
    }
}
