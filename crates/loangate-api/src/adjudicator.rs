// crates/loangate-api/src/adjudicator.rs
// ============================================================================
// Module: LLM Adjudicator
// Description: Schema-constrained adjudication over a PII-free projection.
// Purpose: Turn borderline cases into a structured risk analysis.
// Dependencies: loangate-core, loangate-providers
// ============================================================================

//! ## Overview
//! The adjudicator runs only when the ML signal is weak: the score is absent,
//! below the confidence ceiling, or inside the trigger band. The prompt
//! renders the rules output, the ML output, and a compressed projection of
//! the application with no SIN, email, phone, street, VIN, or postal code.
//! Responses are validated against the strict schema; a response that stays
//! invalid after the single recovery parse routes the case to review instead
//! of failing the pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use loangate_core::AdjudicationOutcome;
use loangate_core::ApplicationPayload;
use loangate_core::DecisionThresholds;
use loangate_core::MlOutput;
use loangate_core::Outcome;
use loangate_core::PipelineError;
use loangate_core::RulesOutput;
use loangate_core::Timestamp;
use loangate_core::core::application::age_years;
use loangate_core::decide;
use loangate_providers::ChatTransport;
use loangate_providers::LlmError;
use loangate_providers::schema::AnalysisParser;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prompt template version recorded on every analysis.
pub const PROMPT_TEMPLATE_VERSION: &str = "pt-2025.06.0";

/// ML confidence at or above which the adjudicator is not consulted.
const CONFIDENCE_CEILING: f64 = 0.8;

/// Reason recorded when the provider output stays invalid after recovery.
const INVALID_JSON_REASON: &str = "LLM invalid JSON";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Adjudicator wiring.
#[derive(Debug, Clone)]
pub struct AdjudicatorConfig {
    /// Lower edge of the ML-confidence trigger band.
    pub trigger_min: f64,
    /// Upper edge of the ML-confidence trigger band.
    pub trigger_max: f64,
    /// Routing thresholds used by the canary.
    pub thresholds: DecisionThresholds,
    /// Canary probe timeout.
    pub canary_timeout: Duration,
}

// ============================================================================
// SECTION: Adjudicator
// ============================================================================

/// Canary probe result.
#[derive(Debug, Clone)]
pub struct CanaryReport {
    /// True when the canary passed.
    pub healthy: bool,
    /// Detail message for audit.
    pub detail: String,
}

/// LLM adjudicator orchestration.
pub struct Adjudicator {
    /// Chat transport, breaker-wrapped.
    transport: Arc<dyn ChatTransport>,
    /// Compiled response parser.
    parser: AnalysisParser,
    /// Adjudicator configuration.
    config: AdjudicatorConfig,
}

impl Adjudicator {
    /// Builds an adjudicator over a transport.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Permanent`] when the response schema fails to
    /// compile.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        config: AdjudicatorConfig,
    ) -> Result<Self, PipelineError> {
        let parser = AnalysisParser::new()
            .map_err(|err| PipelineError::Permanent(err.to_string()))?;
        Ok(Self {
            transport,
            parser,
            config,
        })
    }

    /// Returns the skip reason when the trigger conditions are not met.
    #[must_use]
    pub fn skip_reason(&self, ml: Option<&MlOutput>) -> Option<String> {
        let Some(output) = ml else {
            return None;
        };
        let confidence = output.confidence_score;
        if confidence < CONFIDENCE_CEILING {
            return None;
        }
        if confidence >= self.config.trigger_min && confidence <= self.config.trigger_max {
            return None;
        }
        Some(format!("ml confidence {confidence:.2} outside trigger conditions"))
    }

    /// Runs adjudication for one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Transient`] when transport fails after
    /// retries, and [`PipelineError::Permanent`] when the provider rejects
    /// the request outright. Breaker fast-fails and invalid JSON degrade to
    /// outcomes instead of errors.
    pub async fn adjudicate(
        &self,
        payload: &ApplicationPayload,
        rules: &RulesOutput,
        ml: Option<&MlOutput>,
        now: Timestamp,
    ) -> Result<AdjudicationOutcome, PipelineError> {
        if let Some(reason) = self.skip_reason(ml) {
            return Ok(AdjudicationOutcome::Skipped {
                reason,
            });
        }

        let prompt = build_prompt(payload, rules, ml, now);
        let content = match self.transport.complete(&prompt).await {
            Ok(content) => content,
            Err(LlmError::BreakerOpen) => {
                return Ok(AdjudicationOutcome::Unavailable {
                    reason: "adjudication breaker open".to_string(),
                });
            }
            Err(LlmError::Transport(message)) => {
                return Err(PipelineError::Transient(message));
            }
            Err(LlmError::Rejected(message)) => {
                return Err(PipelineError::Permanent(format!(
                    "llm provider rejected adjudication: {message}"
                )));
            }
            Err(LlmError::Envelope(_)) => {
                return Ok(AdjudicationOutcome::InvalidJson {
                    reason: INVALID_JSON_REASON.to_string(),
                });
            }
        };

        match self.parser.parse(&content, self.transport.model_id(), PROMPT_TEMPLATE_VERSION) {
            Ok(analysis) => Ok(AdjudicationOutcome::Analyzed {
                analysis,
            }),
            Err(_) => Ok(AdjudicationOutcome::InvalidJson {
                reason: INVALID_JSON_REASON.to_string(),
            }),
        }
    }

    /// Probes the provider with a minimal schema-constrained request.
    pub async fn probe(&self) -> bool {
        let prompt = minimal_probe_prompt();
        let Ok(Ok(content)) =
            tokio::time::timeout(self.config.canary_timeout, self.transport.complete(&prompt))
                .await
        else {
            return false;
        };
        self.parser.parse(&content, self.transport.model_id(), PROMPT_TEMPLATE_VERSION).is_ok()
    }

    /// Runs the canary: a fixed low-risk sample must route to approve.
    ///
    /// Failures are reported but never affect traffic routing.
    pub async fn canary(&self, now: Timestamp) -> CanaryReport {
        let payload = canary_payload();
        let rules = RulesOutput {
            rule_flags: Vec::new(),
            rule_score: 0.0,
            hard_fail: false,
            rulepack_version: "canary".to_string(),
        };
        let ml = MlOutput {
            confidence_score: 0.5,
            top_features: Vec::new(),
            model_version: "canary".to_string(),
            calibration_version: "canary".to_string(),
            inference_time_ms: 0,
        };
        let prompt = build_prompt(&payload, &rules, Some(&ml), now);

        let completed =
            tokio::time::timeout(self.config.canary_timeout, self.transport.complete(&prompt))
                .await;
        let content = match completed {
            Ok(Ok(content)) => content,
            Ok(Err(err)) => {
                return CanaryReport {
                    healthy: false,
                    detail: format!("canary transport failed: {err}"),
                };
            }
            Err(_) => {
                return CanaryReport {
                    healthy: false,
                    detail: "canary timed out".to_string(),
                };
            }
        };

        let analysis = match self.parser.parse(
            &content,
            self.transport.model_id(),
            PROMPT_TEMPLATE_VERSION,
        ) {
            Ok(analysis) => analysis,
            Err(err) => {
                return CanaryReport {
                    healthy: false,
                    detail: format!("canary response invalid: {err}"),
                };
            }
        };

        let verdict = decide(&analysis, &self.config.thresholds);
        if verdict.outcome == Outcome::Approve {
            CanaryReport {
                healthy: true,
                detail: "canary approved low-risk sample".to_string(),
            }
        } else {
            CanaryReport {
                healthy: false,
                detail: format!(
                    "canary expected approve, routed {}",
                    verdict.outcome.as_str()
                ),
            }
        }
    }
}

// ============================================================================
// SECTION: Prompt Construction
// ============================================================================

/// Renders the adjudication prompt from a PII-free projection.
///
/// No SIN, email, phone, street address, VIN, or postal code is rendered.
#[must_use]
pub fn build_prompt(
    payload: &ApplicationPayload,
    rules: &RulesOutput,
    ml: Option<&MlOutput>,
    now: Timestamp,
) -> String {
    let mut prompt = String::with_capacity(2_048);
    prompt.push_str(
        "You are a fraud adjudicator for Canadian auto-loan applications. \
         Assess the application context below and respond with a single JSON \
         object conforming exactly to the provided response schema. Output \
         JSON only, with no surrounding prose or markdown.\n\n",
    );

    prompt.push_str("## Rules engine\n");
    let _ = writeln!(prompt, "rule_score: {:.3}", rules.rule_score);
    let _ = writeln!(prompt, "hard_fail: {}", rules.hard_fail);
    if rules.rule_flags.is_empty() {
        prompt.push_str("flags: none\n");
    } else {
        let _ = writeln!(prompt, "flags: {}", rules.rule_flags.join(", "));
    }

    prompt.push_str("\n## ML model\n");
    match ml {
        None => prompt.push_str("score: unavailable\n"),
        Some(output) => {
            let _ = writeln!(prompt, "confidence_score: {:.3}", output.confidence_score);
            let _ = writeln!(prompt, "model_version: {}", output.model_version);
            for feature in output.top_features.iter().take(5) {
                let _ = writeln!(
                    prompt,
                    "top_feature: {} value={:.3} contribution={:+.3}",
                    feature.feature_name, feature.feature_value, feature.contribution
                );
            }
        }
    }

    prompt.push_str("\n## Applicant\n");
    let _ = writeln!(prompt, "age_band: {}", age_band(payload, now));
    let _ = writeln!(prompt, "province: {}", payload.contact.province);
    let _ = writeln!(prompt, "income_bracket: {}", income_bracket(payload.financial.annual_income));
    let _ = writeln!(
        prompt,
        "employment: {} for {} months",
        payload.financial.employment_type.as_str(),
        payload.financial.employment_months
    );
    let _ = writeln!(prompt, "credit_score: {}", payload.financial.credit_score);

    prompt.push_str("\n## Loan\n");
    let _ = writeln!(prompt, "amount: {:.0}", payload.loan.amount);
    let _ = writeln!(prompt, "term_months: {}", payload.loan.term_months);
    let _ = writeln!(prompt, "interest_rate: {:.2}", payload.loan.interest_rate);
    let _ = writeln!(prompt, "down_payment: {:.0}", payload.loan.down_payment);

    prompt.push_str("\n## Vehicle\n");
    let _ = writeln!(
        prompt,
        "vehicle: {} {} {}",
        payload.vehicle.year, payload.vehicle.make, payload.vehicle.model
    );
    let _ = writeln!(prompt, "value: {:.0}", payload.vehicle.value);
    let _ = writeln!(prompt, "mileage_km: {:.0}", payload.vehicle.mileage_km);

    prompt
}

/// Coarse age band for the prompt.
fn age_band(payload: &ApplicationPayload, now: Timestamp) -> &'static str {
    match age_years(&payload.personal.date_of_birth, now) {
        None => "unknown",
        Some(age) if age < 25 => "18-24",
        Some(age) if age < 35 => "25-34",
        Some(age) if age < 45 => "35-44",
        Some(age) if age < 55 => "45-54",
        Some(age) if age < 65 => "55-64",
        Some(_) => "65+",
    }
}

/// Coarse income bracket for the prompt.
fn income_bracket(annual_income: f64) -> &'static str {
    if annual_income < 25_000.0 {
        "under-25k"
    } else if annual_income < 50_000.0 {
        "25k-50k"
    } else if annual_income < 75_000.0 {
        "50k-75k"
    } else if annual_income < 100_000.0 {
        "75k-100k"
    } else if annual_income < 150_000.0 {
        "100k-150k"
    } else {
        "150k-plus"
    }
}

/// Minimal prompt used by the health probe.
fn minimal_probe_prompt() -> String {
    "Health probe: respond with a single JSON object conforming exactly to \
     the provided response schema describing a zero-risk placeholder \
     application. Output JSON only."
        .to_string()
}

/// Fixed low-risk sample application used by the canary.
fn canary_payload() -> ApplicationPayload {
    use loangate_core::ContactBlock;
    use loangate_core::DealerBlock;
    use loangate_core::EmploymentType;
    use loangate_core::FinancialBlock;
    use loangate_core::LoanBlock;
    use loangate_core::PersonalBlock;
    use loangate_core::VehicleBlock;

    ApplicationPayload {
        personal: PersonalBlock {
            first_name: "Canary".to_string(),
            last_name: "Probe".to_string(),
            date_of_birth: "1987-01-15".to_string(),
            sin: String::new(),
        },
        contact: ContactBlock {
            email: String::new(),
            phone: String::new(),
            street_address: String::new(),
            city: "Toronto".to_string(),
            province: "ON".to_string(),
            postal_code: String::new(),
        },
        financial: FinancialBlock {
            annual_income: 80_000.0,
            employment_type: EmploymentType::FullTime,
            employment_months: 60,
            credit_score: 750,
            monthly_debt_payments: 800.0,
        },
        loan: LoanBlock {
            amount: 20_000.0,
            term_months: 60,
            interest_rate: 6.9,
            down_payment: 5_000.0,
            purchase_price: 25_000.0,
        },
        vehicle: VehicleBlock {
            year: 2022,
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            vin: String::new(),
            value: 25_000.0,
            mileage_km: 40_000.0,
        },
        dealer: DealerBlock {
            dealer_id: "CANARY".to_string(),
            name: "Canary Motors".to_string(),
            province: "ON".to_string(),
        },
    }
}
