use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use zproxy_common::env::env_patch;
use zproxy_common::file::{config_path, load_patch, save};
use zproxy_common::{GlobalConfig, display_value};
use zproxy_core::{Core, ModelRegistry, UpstreamClientConfig, UpstreamConfig, UpstreamGateway};
use zproxy_router::app_router;

mod cli;

use crate::cli::{Cli, Command, ConfigCommand, ServeArgs};

/// How long in-flight requests may keep running after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("zproxy failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Config(command) => config_command(command),
    }
}

/// Config file, then environment, then command-line flags.
fn effective_config(args: &ServeArgs) -> anyhow::Result<GlobalConfig> {
    let path = config_path()?;
    let mut patch = load_patch(&path)?;
    patch.overlay(env_patch());
    patch.overlay(args.patch());
    Ok(patch.into_config())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = effective_config(&args)?;
    init_tracing(config.debug);

    if !config.has_api_key() {
        bail!(
            "no API key configured; set ZAI_API_KEY or run `zproxy config set api_key <key>`"
        );
    }

    let gateway = UpstreamGateway::new(&UpstreamClientConfig {
        proxy: config.proxy.clone(),
        ..UpstreamClientConfig::default()
    })
    .context("building upstream client")?;
    let registry = Arc::new(ModelRegistry::builtin());
    let shutdown = CancellationToken::new();
    let core = Core::new(
        registry.clone(),
        gateway,
        UpstreamConfig {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
        },
        shutdown.clone(),
    );
    let app = app_router(&core);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        addr = %addr,
        base_url = %config.base_url,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        models = registry.len(),
        "listening"
    );

    let draining = CancellationToken::new();
    tokio::spawn(drain_on_signal(draining.clone(), shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(draining.cancelled_owned())
        .await?;
    shutdown.cancel();
    info!("stopped");
    Ok(())
}

/// Stops accepting on the first signal, then aborts whatever is still running
/// once the grace period is over.
async fn drain_on_signal(draining: CancellationToken, shutdown: CancellationToken) {
    wait_for_signal().await;
    info!(grace_secs = SHUTDOWN_GRACE.as_secs(), "shutdown requested");
    draining.cancel();

    tokio::select! {
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("grace period elapsed; canceling in-flight requests");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
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

fn config_command(command: ConfigCommand) -> anyhow::Result<()> {
    let path = config_path()?;
    match command {
        ConfigCommand::Set { key, value } => {
            // Only the file layer is persisted; environment values stay out of it.
            let mut patch = load_patch(&path)?;
            patch.set_key(&key, &value)?;
            save(&path, &patch)?;
            println!("Configuration updated: {key} = {}", display_value(&key, &value));
        }
        ConfigCommand::Get { key } => {
            let config = effective_config(&ServeArgs::default())?;
            match config.get_key(&key)? {
                Some(value) => println!("{key} = {value}"),
                None => println!("{key} is not set"),
            }
        }
        ConfigCommand::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn init_tracing(debug: bool) {
    let default = if debug { "zproxy=debug" } else { "zproxy=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
