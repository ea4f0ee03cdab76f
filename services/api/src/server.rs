use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryScreeningRepository};
use crate::routes::with_screening_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tenant_screening::config::AppConfig;
use tenant_screening::error::AppError;
use tenant_screening::telemetry;
use tenant_screening::workflows::screening::{
    standard_orchestrator, OrchestratorConfig, ProcessorConfig, ScreeningProcessor,
    ScreeningService, SyntheticCreditBureau,
};
use tokio::sync::watch;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let orchestrator = Arc::new(standard_orchestrator(
        Arc::new(SyntheticCreditBureau::default()),
        OrchestratorConfig::from(&config.screening),
    )?);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        orchestrator: Arc::clone(&orchestrator),
    };

    let repository = Arc::new(InMemoryScreeningRepository::default());
    let screening_service = Arc::new(ScreeningService::new(Arc::clone(&orchestrator), repository));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let processor = ScreeningProcessor::new(
        Arc::clone(&screening_service),
        ProcessorConfig::from(&config.screening),
    );
    let processor_task = tokio::spawn(async move { processor.run(shutdown_rx).await });

    let app = with_screening_routes(screening_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        stages = orchestrator.plan().stage_count(),
        waves = orchestrator.plan().len(),
        policy = config.screening.failure_policy.label(),
        "tenant screening orchestrator ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    let _ = shutdown_tx.send(true);
    let cancelled = orchestrator.shutdown();
    match processor_task.await {
        Ok(stats) => info!(
            processed = stats.total_processed,
            failed = stats.failed,
            cancelled,
            "screening processor stopped"
        ),
        Err(err) => warn!(error = %err, "screening processor did not stop cleanly"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
