use actix::prelude::*;
use actix_web::web;
use anyhow::Context as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod cache;
mod config;
mod domain;
mod http;
mod ingest;
mod messaging;
mod metrics;
mod persistence;
mod service;
mod utils;

use actors::{DlqActor, FlushAndStop, HealthMonitorActor};
use cache::OrderCache;
use config::Config;
use http::AppState;
use ingest::{IngestPipeline, OrderConsumer};
use messaging::RedpandaClient;
use persistence::{OrderRepository, PgOrderRepository};
use service::OrderService;
use utils::RetryConfig;

const DLQ_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // === 1. Environment, logging, configuration ===
    // .env first: it may carry RUST_LOG.
    let dotenv = config::load_dotenv();

    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_ingest=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order ingest service");
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env file, continuing with process environment"),
    }

    let config = Config::from_env().context("Invalid configuration")?;

    // === 2. PostgreSQL pool + schema check ===
    tracing::info!(
        host = %config.database.host,
        database = %config.database.name,
        "Connecting to PostgreSQL..."
    );
    let repo = PgOrderRepository::connect(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    persistence::verify_connection(repo.pool())
        .await
        .context("PostgreSQL connectivity check failed")?;
    if !persistence::check_schema(repo.pool()).await? {
        anyhow::bail!("Database schema incomplete; apply migrations/0001_create_orders.sql");
    }
    let pool = repo.pool().clone();
    let repo: Arc<dyn OrderRepository> = Arc::new(repo);

    // === 3. Metrics, cache and query service ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let cache = OrderCache::new(config.cache.capacity, config.cache.ttl)?;
    let service = Arc::new(OrderService::new(repo, cache.clone(), metrics.clone()));

    // === 4. Warm the cache before accepting reads ===
    if let Err(e) = service.restore_cache().await {
        tracing::warn!(error = %e, "Cache restore failed, starting with a cold cache");
    }

    // === 5. Infrastructure actors ===
    let redpanda = Arc::new(
        RedpandaClient::new(&config.kafka.bootstrap_servers())
            .context("Failed to create Redpanda producer")?,
    );
    let dlq = DlqActor::new(redpanda.clone(), config.kafka.dlq_topic.clone()).start();
    let health = HealthMonitorActor::new()
        .watch_publisher(redpanda.clone(), metrics.clone())
        .start();

    // === 6. Topics ===
    ingest::ensure_topics(&config.kafka).await?;

    // === 7. Consumer, HTTP server, cache sweeper ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline = IngestPipeline::new(
        service.clone(),
        Arc::new(dlq.clone()),
        metrics.clone(),
        RetryConfig::with_max_attempts(config.ingest.retry_attempts),
        config.ingest.max_redeliveries,
    );
    let consumer = OrderConsumer::new(&config.kafka, pipeline)?.with_health_monitor(health.clone());
    let consumer_task = actix::spawn(consumer.run(shutdown_rx.clone()));

    let state = web::Data::new(AppState {
        service: service.clone(),
        metrics: metrics.clone(),
        health: Some(health.clone()),
    });
    let server = http::start_http_server(&config.server, state)?;
    let server_handle = server.handle();
    let server_task = actix::spawn(server);

    let sweeper = config
        .cache
        .sweep_interval
        .map(|every| cache.spawn_sweeper(every, shutdown_rx.clone()));

    tracing::info!("✅ Service ready");

    // === Shutdown ===
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining...");

    let _ = shutdown_tx.send(true);

    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "Consumer task failed");
    }
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }

    if let Err(e) = dlq.send(FlushAndStop { timeout: DLQ_FLUSH_TIMEOUT }).await {
        tracing::warn!(error = %e, "Dead-letter actor already gone");
    }

    server_handle.stop(true).await;
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
    }

    pool.close().await;
    tracing::info!("🛑 Shutdown complete");

    System::current().stop();
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
