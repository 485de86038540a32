use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use board_courier::client::{BoardApi, HttpBoardClient, SimulatedBoard};
use board_courier::config::Settings;
use board_courier::credentials::{CredentialProvider, EnvCredentialProvider};
use board_courier::delivery::{BackgroundProcessor, DeliveryObserver, DeliveryOrchestrator, EventBroadcaster};
use board_courier::digest::BurstDigestService;
use board_courier::network::WatchNetworkMonitor;
use board_courier::queue::PersistentQueue;
use board_courier::server::{create_app, AppState};
use board_courier::shutdown::GracefulShutdown;
use board_courier::storage::{create_state_store, StoredContentCache};
use board_courier::tasks::{ConnectivityProbe, DeliveryScheduler};
use board_courier::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing; keep the guard for the process lifetime
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    let delivery_config = settings.delivery.to_configuration()?;
    tracing::info!(
        strategy = %delivery_config.strategy,
        max_retries = delivery_config.max_retries,
        "Delivery configuration resolved"
    );

    // Storage
    let store = create_state_store(&settings.storage).await;
    let queue = Arc::new(PersistentQueue::load(store.clone(), delivery_config.queue_config()).await);
    let cache = Arc::new(StoredContentCache::new(store.clone()));

    // Collaborators
    let api: Arc<dyn BoardApi> = if settings.board.simulate {
        tracing::warn!("Using simulated board, nothing will reach a real display");
        Arc::new(SimulatedBoard::new())
    } else {
        Arc::new(HttpBoardClient::new(settings.board.client_config())?)
    };
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentialProvider::new(
        settings.board.key_var.clone(),
        settings.board.secret_var.clone(),
    ));
    if !settings.board.simulate && !credentials.is_configured().await {
        tracing::warn!(
            key_var = %settings.board.key_var,
            "Board credentials are not configured, deliveries will fail"
        );
    }
    let network = Arc::new(WatchNetworkMonitor::default());
    let events = Arc::new(EventBroadcaster::default());

    let observer: Arc<dyn DeliveryObserver> = events.clone();
    let orchestrator = Arc::new(
        DeliveryOrchestrator::new(
            delivery_config,
            queue,
            api,
            credentials,
            cache,
            network.clone(),
        )
        .with_observer(observer)
        .with_digest_service(BurstDigestService::new(settings.digest.to_config())),
    );
    orchestrator.refresh_state().await;

    let background = Arc::new(BackgroundProcessor::new(
        orchestrator.clone(),
        settings.background.to_config(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Background tasks
    let scheduler = DeliveryScheduler::new(orchestrator.clone(), shutdown_tx.subscribe());
    let scheduler_handle = tokio::spawn(scheduler.run());

    let probe_handle = if settings.network.probe_enabled && !settings.board.simulate {
        match settings.network.probe_host.clone().or_else(|| settings.board.host()) {
            Some(host) => {
                let probe = ConnectivityProbe::new(
                    &host,
                    settings.network.probe_port,
                    settings.network.interval(),
                    settings.network.timeout(),
                    network.clone(),
                    shutdown_tx.subscribe(),
                );
                Some(tokio::spawn(probe.run()))
            }
            None => {
                tracing::warn!("No probe host could be determined, connectivity probe disabled");
                None
            }
        }
    } else {
        None
    };

    // Create Axum app
    let state = AppState::new(
        settings.clone(),
        orchestrator.clone(),
        background,
        events,
        store,
        shutdown_tx.clone(),
    );
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await?;

    let shutdown = GracefulShutdown::new(orchestrator, shutdown_tx);
    shutdown.execute("server stopped").await;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = scheduler_handle.await;
    if let Some(handle) = probe_handle {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop background tasks and close event streams so the server can drain
    let _ = shutdown_tx.send(());
}
