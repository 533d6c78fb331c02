// crates/loangate-api/src/bin/loangate.rs
// ============================================================================
// Module: Loangate Service Binary
// Description: Process entry point wiring config, store, and workers.
// Purpose: Start the ingress listener and the dispatcher pool.
// Dependencies: loangate-api, loangate-config, loangate-providers, tokio
// ============================================================================

//! ## Overview
//! The binary loads configuration from the environment, opens the SQLite
//! store, builds the providers and the adjudicator, spawns the dispatcher
//! workers and the nonce eviction sweep, and serves the axum router until
//! interrupted. Shutdown is cooperative: workers finish their current entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use loangate_api::Adjudicator;
use loangate_api::AdjudicatorConfig;
use loangate_api::AppState;
use loangate_api::AuditEvent;
use loangate_api::AuditSink;
use loangate_api::AuthVerifier;
use loangate_api::Dispatcher;
use loangate_api::NoopMetrics;
use loangate_api::PipelineRunner;
use loangate_api::PipelineStore;
use loangate_api::StderrAuditSink;
use loangate_api::build_router;
use loangate_api::dispatcher::spawn_nonce_eviction;
use loangate_config::LoangateConfig;
use loangate_core::Redactor;
use loangate_core::RulePack;
use loangate_providers::BreakerConfig;
use loangate_providers::ChatTransport;
use loangate_providers::CircuitBreaker;
use loangate_providers::HttpLlmClient;
use loangate_providers::LlmClientConfig;
use loangate_providers::MlClient;
use loangate_providers::MlClientConfig;
use loangate_providers::wall_clock_now;
use loangate_store_sqlite::SqliteStore;
use loangate_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Interval between adjudicator canary runs.
const CANARY_INTERVAL: Duration = Duration::from_secs(300);

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Wires the service together and runs until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LoangateConfig::from_env()?;

    let redactor = Arc::new(Redactor::new()?);
    let audit = Arc::new(StderrAuditSink::new(Arc::clone(&redactor)));
    let metrics = Arc::new(NoopMetrics);

    let store = Arc::new(SqliteStore::new(SqliteStoreConfig {
        path: config.store.database_path.clone(),
        busy_timeout_ms: config.store.busy_timeout_ms,
        identifier_salt: config.identifier_salt.clone(),
    })?);
    let store: Arc<dyn PipelineStore> = store;

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
    let llm_transport: Arc<dyn ChatTransport> = Arc::new(HttpLlmClient::new(
        LlmClientConfig {
            provider: config.llm.provider.clone(),
            endpoint: config.llm.endpoint.clone(),
            model: config.llm.model.clone(),
            api_key: config.llm.api_key.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            timeout: Duration::from_secs(config.llm.timeout_seconds),
            retry_attempts: config.llm.retry_attempts,
            retry_delay_ms: config.llm.retry_delay_ms,
        },
        Arc::clone(&breaker),
    )?);
    let adjudicator_config = AdjudicatorConfig {
        trigger_min: config.llm.trigger_min,
        trigger_max: config.llm.trigger_max,
        thresholds: config.thresholds,
        canary_timeout: Duration::from_secs(config.llm.canary_timeout_seconds),
    };
    let adjudicator = Adjudicator::new(Arc::clone(&llm_transport), adjudicator_config.clone())?;

    let scorer = Arc::new(MlClient::new(MlClientConfig {
        service_url: config.ml.service_url.clone(),
        timeout: Duration::from_secs(config.ml.timeout_seconds),
        retry_attempts: config.ml.retry_attempts,
    })?);

    let rule_pack = {
        let mut pack = RulePack::default_pack();
        pack.salt = config.identifier_salt.clone();
        pack
    };
    let runner = Arc::new(PipelineRunner::new(
        Arc::clone(&store),
        scorer.clone(),
        adjudicator,
        rule_pack,
        config.thresholds,
        audit.clone(),
        metrics.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        runner,
        config.dispatcher.clone(),
        audit.clone(),
        metrics.clone(),
    ));
    let worker_handles = dispatcher.spawn_workers();

    let sweep_shutdown = Arc::new(AtomicBool::new(false));
    let sweep_handle = spawn_nonce_eviction(
        Arc::clone(&store),
        config.server.nonce_window_seconds,
        Arc::clone(&sweep_shutdown),
    );

    // Canary: probe the provider and assert the fixed low-risk sample
    // approves. Failures are reported but never affect traffic routing.
    let canary_adjudicator = Adjudicator::new(Arc::clone(&llm_transport), adjudicator_config)?;
    let canary_audit: Arc<dyn AuditSink> = audit.clone();
    let canary_shutdown = Arc::clone(&sweep_shutdown);
    let canary_handle = tokio::spawn(async move {
        while !canary_shutdown.load(Ordering::SeqCst) {
            let probe_ok = canary_adjudicator.probe().await;
            let report = canary_adjudicator.canary(wall_clock_now()).await;
            canary_audit.record(&AuditEvent::CanaryResult {
                healthy: probe_ok && report.healthy,
                detail: report.detail,
            });
            tokio::time::sleep(CANARY_INTERVAL).await;
        }
    });

    let skew_seconds = i64::try_from(config.server.nonce_window_seconds).unwrap_or(300);
    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        verifier: Arc::new(AuthVerifier::new(
            config.server.hmac_secret.as_bytes().to_vec(),
            skew_seconds,
        )),
        scorer,
        audit,
        metrics,
        health: config.health.clone(),
    });

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    dispatcher.shutdown();
    sweep_shutdown.store(true, Ordering::SeqCst);
    sweep_handle.abort();
    canary_handle.abort();
    for handle in worker_handles {
        let _ = handle.await;
    }
    Ok(())
}
