use std::sync::Arc;

use clap::Parser;
use folioblocks::config::Config;
use folioblocks::context::CoreContext;
use folioblocks::error::CoreError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    folioblocks::config::apply_file_overlay(std::path::Path::new("./folioblocks.toml"))?;
    let config = Config::parse();
    let _log_guard = init_logging(&config)?;

    tracing::info!(role = ?config.node_role(), bind = %config.bind_address, port = config.bind_port, "starting folioblocks node");

    let context = match CoreContext::bootstrap(&config).await {
        Ok(context) => Arc::new(context),
        Err(CoreError::Configuration(message)) if message.contains("bootstrap complete") => {
            tracing::info!("{message}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let scheduler_shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn(folioblocks::scheduler::run(context.clone(), scheduler_shutdown.clone()));

    let router = folioblocks::http::router(context.clone());
    let listener = tokio::net::TcpListener::bind((config.bind_address.as_str(), config.bind_port)).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    let shutdown_context = context.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_context, scheduler_shutdown))
        .await?;

    let _ = scheduler_handle.await;
    Ok(())
}

async fn shutdown_signal(context: Arc<CoreContext>, scheduler_shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, resealing store");
    scheduler_shutdown.cancel();
    if let Err(err) = context.store.seal_on_shutdown().await {
        tracing::error!(error = %err, "failed to reseal store on shutdown");
    }
}

fn init_logging(config: &Config) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.no_log_file {
        Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
        Ok(None)
    } else {
        let log_dir = config.data_dir.join("logs");
        std::fs::create_dir_all(&log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "folioblocks.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
            .try_init()?;
        Ok(Some(guard))
    }
}
