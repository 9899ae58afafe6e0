mod agents;
mod auth;
mod config;
mod db;
mod email;
mod errors;
mod jobs;
mod leads;
mod matching;
mod models;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;
mod tracking;
mod workflows;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::db::{create_pool, run_migrations};
use crate::email::{EmailSender, HttpEmailSender, LogEmailSender};
use crate::jobs::JobQueue;
use crate::routes::build_router;
use crate::state::{AppState, Services};
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::CrmStore;
use crate::workflows::engine::process_workflows;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CRM API v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn CrmStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool = create_pool(url).await?;
            if config.run_migrations {
                run_migrations(&pool).await?;
            }
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let email: Arc<dyn EmailSender> = match &config.email_api {
        Some(api) => {
            info!("Email delivery via {}", api.api_url);
            Arc::new(HttpEmailSender::new(
                api.api_url.clone(),
                api.api_key.clone(),
                api.from.clone(),
            )?)
        }
        None => {
            info!("EMAIL_API_URL not set, emails are logged only");
            Arc::new(LogEmailSender)
        }
    };

    let services = Arc::new(Services::new(&config, store, email));
    let jobs = JobQueue::start(Arc::clone(&services));

    if config.workflow_tick_secs > 0 {
        spawn_workflow_ticker(Arc::clone(&services), config.workflow_tick_secs);
    }

    let state = AppState { services, jobs };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the dashboard domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Runs a workflow tick every `secs`. Overlapping ticks are safe: enrollments
/// are claimed before they are processed.
fn spawn_workflow_ticker(services: Arc<Services>, secs: u64) {
    info!("Workflow ticker every {secs}s");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(secs));
        loop {
            interval.tick().await;
            match process_workflows(&services, chrono::Utc::now()).await {
                Ok(summary) if summary.processed + summary.failed > 0 => info!(
                    processed = summary.processed,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Workflow tick"
                ),
                Ok(_) => {}
                Err(e) => error!("Workflow tick failed: {e}"),
            }
        }
    });
}
