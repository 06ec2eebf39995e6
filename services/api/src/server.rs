use crate::cli::ServeArgs;
use crate::infra::{AppState, MemoryStores};
use crate::routes::with_consent_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use consent_ledger::config::AppConfig;
use consent_ledger::error::AppError;
use consent_ledger::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const LINK_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let stores = MemoryStores::default();
    let api = Arc::new(stores.api(config.links.settings()));
    spawn_link_purger(api.clone());

    let app = with_consent_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        public_base_url = %config.links.public_base_url,
        "consent ledger ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodic removal of lapsed links, standing in for a store-side TTL index.
fn spawn_link_purger(api: Arc<crate::infra::MemoryConsentApi>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LINK_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = api.links.purge_expired_links(Utc::now()) {
                warn!(error = %err, "consent link purge failed");
            }
        }
    });
}
