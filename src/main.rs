use solargrid_monitor::{
    auth::{AuthContext, FileTokenStorage, MemoryTokenStorage, TokenStorage},
    config::Config,
    dashboard::{history_query, live_query, DashboardSummary},
    models::Metric,
    ApiClient, QueryClient,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solargrid_monitor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting solargrid-monitor");

    // Load configuration
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());

    let config = Config::load(&config_path)?;
    info!("Configuration loaded from: {}", config_path);

    // Auth context shared with the transport adapter
    let storage: Arc<dyn TokenStorage> = match config.auth.token_path() {
        Some(path) => {
            info!("Persisting auth token at {}", path.display());
            Arc::new(FileTokenStorage::new(path))
        }
        None => Arc::new(MemoryTokenStorage::new()),
    };
    let auth = Arc::new(AuthContext::new(storage));
    if let Some(token) = config.auth.access_token.as_deref() {
        auth.sign_in(token, None).await?;
    }
    if !auth.is_authenticated().await {
        warn!("No access token configured, requests will be sent unauthenticated");
    }

    let api = ApiClient::new(&config.api, Arc::clone(&auth))?;
    let queries = QueryClient::with_background_policy(config.polling.pause_in_background);

    let selector = config.device.selector()?;
    info!("Monitoring {:?} at {}", selector, config.api.base_url);

    let mut live = live_query(&queries, &api, selector.clone(), &config.polling)?;
    let mut history = history_query(
        &queries,
        &api,
        selector,
        &config.history,
        &config.polling,
    )?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            entry = live.changed() => {
                let summary = DashboardSummary::from_entry(&entry, &config.status, &config.panels);
                if entry.is_fetching && entry.data.is_none() {
                    continue;
                }
                match &summary.warning {
                    Some(warning) => warn!(
                        status = %summary.status,
                        voltage = summary.incoming_voltage,
                        "Live reading is stale: {}",
                        warning
                    ),
                    None => info!(
                        status = %summary.status,
                        voltage = summary.incoming_voltage,
                        generation_kw = summary.generation_kw,
                        temperature = summary.temperature,
                        battery = summary.battery_soc,
                        panels = summary.panels.len(),
                        "Live reading"
                    ),
                }
            }
            entry = history.changed() => {
                if let Some(error) = &entry.error {
                    error!("History query failed: {}", error);
                } else if let Some(buckets) = &entry.data {
                    info!(
                        buckets = buckets.len(),
                        granularity = %buckets.granularity,
                        latest_voltage = ?buckets.series(Metric::Voltage).last(),
                        "History updated"
                    );
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
