pub mod apply;
pub mod fetch;
pub mod history;
pub mod reconciler;
pub mod registry;
pub mod rules;
pub mod settings;
pub mod state;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use apply::ManifestApplier;
use fetch::ArtifactFetcher;
use history::TagHistory;
use reconciler::Reconciler;
use registry::RegistryClient;
use rules::Rules;
use settings::Settings;
use verify::SignatureVerifier;

#[derive(Clone)]
struct HealthState {
    ready: Arc<AtomicBool>,
}

/// Run the agent: load the rules, wire the reconciliation pipeline, serve
/// the health surface, and reconcile until a shutdown signal arrives.
pub async fn run(settings: Settings) -> Result<()> {
    info!("Reading rules file: {}", settings.rules_file.display());
    let rules = Rules::load(&settings.rules_file).context("Failed to load rules file")?;
    info!(
        "Watching repository {} (tag filter: {:?})",
        rules.repository_url, rules.only
    );

    let history = Arc::new(TagHistory::new());
    history.record(
        "Startup",
        format!(
            "Agent initialized with rules file: {}",
            settings.rules_file.display()
        ),
    );

    // The cluster client is constructed before the reconciler starts so a
    // tick can never observe a half-wired agent.
    rustls::crypto::ring::default_provider().install_default().ok();
    let kube_config = kube::Config::infer()
        .await
        .context("Failed to infer Kubernetes configuration")?;
    let kube_client =
        kube::Client::try_from(kube_config).context("Failed to create Kubernetes client")?;
    let applier = ManifestApplier::new(kube_client)
        .await
        .context("Failed to run initial API discovery")?;
    info!("🚀 Kubernetes client initialized");

    let registry = RegistryClient::new();
    let verifier = SignatureVerifier::new(registry.clone(), settings.cosign_public_key.clone());
    let fetcher = ArtifactFetcher::new(registry.clone(), settings.file_store_path.clone());

    let ready = Arc::new(AtomicBool::new(false));
    let reconciler = Reconciler::new(
        rules,
        registry,
        verifier,
        fetcher,
        applier,
        history.clone(),
        ready.clone(),
        settings.reconcile_interval,
    );

    let app = router(HealthState {
        ready: ready.clone(),
    });
    let addr = format!("0.0.0.0:{}", settings.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {addr}"))?;
    info!("HTTP server listening on http://{}", addr);

    let (stop_tx, stop_rx) = watch::channel(false);

    let mut server_stop = stop_rx.clone();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = server_stop.changed().await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Server error: {}", e);
        }
    });

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    // Setup is complete; the readiness endpoint may now answer 200.
    ready.store(true, Ordering::SeqCst);

    let applied = reconciler.run(stop_rx).await?;

    let _ = server.await;
    info!("Final status - Applied tags: {}", applied);
    info!("Shutdown complete");
    Ok(())
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/status", get(status))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Liveness: the process is up.
async fn alive() -> &'static str {
    "GitOps Agent is alive"
}

/// Readiness: rules are loaded (guaranteed before the server exists) and no
/// verify/apply is in progress.
async fn status(State(state): State<HealthState>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "GitOps Agent is ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "GitOps Agent is not ready")
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
