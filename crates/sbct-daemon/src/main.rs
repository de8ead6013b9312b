//! SBC trigger daemon
//!
//! Registers for interception of the `M583` code family, keeps the trigger
//! registry running and answers every intercepted code with exactly one
//! resolve or ignore. Loses its purpose without the intercept connection:
//! a transport error there shuts the whole daemon down.

mod codes;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sbct_dispatch::{DispatchOutcome, Dispatcher};
use sbct_dsf::{CommandConnection, InterceptConnection, MessageType};
use sbct_engine::TriggerRegistry;

use crate::codes::{classify, CodeIntent, INTERCEPTED_CODES};
use crate::config::DaemonConfig;

/// Config file location when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "/opt/dsf/sd/sys/sbctrigger.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = DaemonConfig::load(&config_path)?;
    info!(socket = %config.socket_path.display(), "starting SBC trigger daemon");

    let mut intercept = InterceptConnection::connect(&config.socket_path, &INTERCEPTED_CODES)
        .await
        .context("failed to open intercept connection")?;

    // The startup macro runs on its own connection and must never hold up
    // code processing
    if !config.startup_macro.is_empty() {
        tokio::spawn(run_startup_macro(
            config.socket_path.clone(),
            config.startup_macro.clone(),
        ));
    }

    let client = Arc::new(
        CommandConnection::connect(&config.socket_path)
            .await
            .context("failed to open command connection")?,
    );
    let registry = Arc::new(TriggerRegistry::with_poll_interval(
        client,
        config.poll_interval(),
    ));
    let dispatcher = Dispatcher::new(registry.clone());

    let result = receive_loop(&mut intercept, &dispatcher).await;

    registry.shutdown();
    info!("SBC trigger daemon stopped");
    result
}

/// Main loop: one intercepted code in, exactly one resolve or ignore out
///
/// Exits cleanly on Ctrl-C or SIGTERM (the latter is what systemd sends
/// on unit stop).
async fn receive_loop(
    intercept: &mut InterceptConnection,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    loop {
        let code = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("termination signal received");
                return Ok(());
            }
            code = intercept.receive_code() => {
                code.context("intercept connection lost")?
            }
        };

        match classify(&code) {
            Ok(CodeIntent::PassThrough) => intercept.ignore().await?,
            Ok(CodeIntent::Handle(request)) => {
                match dispatcher.handle(request).await {
                    DispatchOutcome::Success(message) => {
                        intercept.resolve(MessageType::Success, &message).await?
                    }
                    DispatchOutcome::Error(message) => {
                        intercept.resolve(MessageType::Error, &message).await?
                    }
                }
            }
            Err(err) => {
                let message = format!("{}: {err}", code.short_name());
                intercept.resolve(MessageType::Error, &message).await?
            }
        }
    }
}

/// One-shot bootstrap: run the configuration macro on a detached connection
///
/// Failure only costs the operator their preconfigured triggers, so it is
/// logged and swallowed.
async fn run_startup_macro(socket_path: std::path::PathBuf, macro_name: String) {
    let connection = match CommandConnection::connect(&socket_path).await {
        Ok(connection) => connection,
        Err(err) => {
            warn!(%err, "could not connect for startup macro");
            return;
        }
    };

    let code = format!("M98 P\"{macro_name}\"");
    match connection.perform_simple_code(&code).await {
        Ok(_) => info!(macro_name = %macro_name, "startup macro finished"),
        Err(err) => error!(macro_name = %macro_name, %err, "startup macro failed"),
    }
}
