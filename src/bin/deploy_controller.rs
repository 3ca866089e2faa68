/*
 * 5D Labs Fleet Platform - Deployment Orchestration Engine
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Deploy Controller - job execution service for the fleet pipeline
//!
//! This service pulls executable jobs from the job manager, translates each
//! into a manifest bundle for its target cluster, submits the bundle through
//! the hub's resource-distribution API and reports the converged status back.

use anyhow::Context;
use fleet_deploy::api::jobmanager::JobManagerClient;
use fleet_deploy::api::{router, AppState};
use fleet_deploy::jobs::{Dispatcher, MonitorRegistry};
use fleet_deploy::work::WorkClient;
use fleet_deploy::EngineConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleet_deploy=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Deploy Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(EngineConfig::load());
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Credential resolution is fatal here: in-cluster identity first, then
    // the local kubeconfig. No handler ever resolves credentials lazily.
    let client = kube::Client::try_default()
        .await
        .context("failed to resolve Kubernetes credentials")?;
    info!("Connected to the hub cluster");

    let store = Arc::new(WorkClient::new(client));
    let monitors = Arc::new(MonitorRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), monitors.clone()));

    let state = AppState {
        dispatcher,
        store,
        jobmanager: JobManagerClient::new(config.jobmanager_url.clone()),
        config: config.clone(),
    };

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(Duration::from_secs(60))),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Deploy controller HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain every in-flight completion monitor before exiting
    monitors.shutdown().await;
    info!("Deploy controller stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
