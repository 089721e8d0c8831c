use std::future::IntoFuture as _;

use anyhow::Context as _;
use kube::Client;
use presence_operator::{
    operator::{PresenceOperator, State},
    settings::Settings,
    telemetry, Cause, Error, Lifetime,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init().await;

    let settings = Settings::from_env()?;
    info!(namespace = %settings.namespace, assets = %settings.assets_dir.display(), "starting");

    // Get a k8s client for communicating with the cluster
    let client = Client::try_default()
        .await
        .context("failed to create kube Client")?;

    // Initialize operator state
    let state = State::default();
    let operator = PresenceOperator::new(state.clone(), settings.clone());

    // Start web server
    let listener = TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_addr))?;
    let router = handlers::router();
    let server = axum::serve(listener, router.with_state(state));

    let lifetime = Lifetime::new();
    tokio::spawn(signals::notify(lifetime.clone()));

    // Run both the http server and the operator, bailing if either finishes early
    tokio::select! {
        result = operator.run(client, lifetime) => match result {
            Err(Error::Cancelled(Cause::Signal)) => {
                info!("shut down");
                Ok(())
            }
            Err(e) => {
                error!("operator stopped: {e}");
                std::process::exit(1)
            }
            Ok(()) => Ok(()),
        },
        s = server.into_future() => {
            warn!("server exited early");
            s.context("server exited early")
        }
    }
}

/// Process signal handling
mod signals {
    use presence_operator::{Cause, Lifetime};
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::{error, info};

    /// End `lifetime` on the first SIGINT or SIGTERM, exit on the second
    pub async fn notify(lifetime: Lifetime) {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("could not install SIGTERM handler: {e}");
                return;
            }
        };

        for received in 0.. {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = terminate.recv() => {},
            }
            if received > 0 {
                error!("second shutdown signal, exiting");
                std::process::exit(1);
            }
            info!("shutdown signal received");
            lifetime.cancel(Cause::Signal);
        }
    }
}

/// Handlers for the web server portion of the operator
mod handlers {
    use axum::{extract::State, http::StatusCode, response::IntoResponse, routing, Json, Router};
    use prometheus::{Encoder, TextEncoder};

    use presence_operator::operator::State as OperatorState;

    /// Construct the router for all the handlers
    pub fn router() -> Router<OperatorState> {
        Router::new()
            .route("/metrics", routing::get(metrics))
            .route("/health", routing::get(health))
            .route("/", routing::get(index))
    }

    /// Handler for exposing prometheus metrics
    async fn metrics(State(state): State<OperatorState>) -> impl IntoResponse {
        let metrics = state.metrics();
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        match encoder.encode(&metrics, &mut buffer) {
            Ok(()) => (StatusCode::OK, buffer),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into_bytes()),
        }
    }

    /// Handler for checking the health of the server
    async fn health() -> impl IntoResponse {
        (StatusCode::OK, Json("healthy"))
    }

    /// Handler for interacting with the operator
    async fn index(State(state): State<OperatorState>) -> impl IntoResponse {
        let diagnostics = state.diagnostics().await;

        (StatusCode::OK, Json(diagnostics))
    }
}
