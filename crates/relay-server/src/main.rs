//! relay-server: DingTalk robot callback ⇄ CodeBuddy relay.

mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use relay_core::app::{RelayBuilder, SweepLoop};
use relay_core::config::RelayConfig;
use relay_core::impls::{CodeBuddyClient, DingTalkClient, InMemoryTaskStore};
use relay_core::ports::{SystemClock, TaskStore};

#[derive(Debug, Parser)]
#[command(name = "relay-server", version, about = "DingTalk ⇄ CodeBuddy relay")]
struct Args {
    /// TOML config file. Defaults plus environment variables when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override `server.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    init_tracing(&config.server.log_level, args.log_json);
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");

    tokio::fs::create_dir_all(&config.server.image_dir)
        .await
        .with_context(|| format!("creating {}", config.server.image_dir.display()))?;

    let dingtalk = Arc::new(DingTalkClient::new(config.dingtalk_options())?);
    let agent = Arc::new(CodeBuddyClient::new(config.codebuddy_options())?);
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::default());

    let relay = Arc::new(
        RelayBuilder::new()
            .config(&config)
            .agent(agent)
            .sender(dingtalk.clone())
            .images(dingtalk)
            .store(Arc::clone(&store))
            .build()?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = SweepLoop::new(store, config.sweep_interval(), config.task_max_age())
        .with_image_dir(config.server.image_dir.clone())
        .spawn(shutdown_rx);

    let state = http::AppState {
        relay: Arc::clone(&relay),
        signing_secret: config
            .dingtalk
            .verify_signature
            .then(|| Arc::from(config.dingtalk.signing_secret())),
        clock: Arc::new(SystemClock),
    };
    let app = http::router(
        state,
        http::Routes {
            callback_path: &config.server.callback_path,
            image_route: &config.server.image_route,
            image_dir: &config.server.image_dir,
        },
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!(
        bind = %config.server.bind,
        callback = %config.server.callback_path,
        workers = config.tasks.workers,
        "relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    let _ = shutdown_tx.send(true);
    relay.shutdown().await;
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "sweep loop ended abnormally");
    }
    tracing::info!("relay stopped");
    Ok(())
}
