//! CLI argument parsing with clap derive

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docp_common::SignalEnvelope;
use tokio::sync::watch;

use crate::app::AppContext;
use crate::application::error_sink::{ErrorSink, drain_errors};
use crate::application::hash_cache::HashCache;
use crate::application::services::derive::ActionDeriver;
use crate::application::services::reconcile::{self, ReconcileEngine};
use crate::settings::Settings;

/// Reconciles this host's agents against control-plane signals
#[derive(Parser)]
#[command(name = "docp-manager", version, propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the reconciliation engine until interrupted (default)
    Run,

    /// Print the actions a fresh engine would derive from a signal file
    Derive {
        /// Signal envelope as returned by the control plane
        #[arg(long)]
        signal: PathBuf,

        /// Treat the vendor agent as already installed
        #[arg(long)]
        vendor_installed: bool,
    },

    /// Run one validate cycle against the received signal
    Validate,

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be loaded or the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli { json, command } = self;
        match command.unwrap_or(Command::Run) {
            Command::Version => {
                print_version(json);
                Ok(())
            }
            Command::Derive {
                signal,
                vendor_installed,
            } => derive(&signal, vendor_installed, json).await,
            Command::Validate => {
                let ctx = AppContext::new(Settings::from_env()?)?;
                validate(ctx, json).await
            }
            Command::Run => {
                let ctx = AppContext::new(Settings::from_env()?)?;
                serve(ctx).await
            }
        }
    }
}

fn print_version(json: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!(r#"{{"version":"{version}"}}"#);
    } else {
        println!("docp-manager {version}");
    }
}

async fn derive(path: &Path, vendor_installed: bool, json: bool) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let signal = SignalEnvelope::from_slice(&bytes)
        .with_context(|| format!("parsing {}", path.display()))?
        .signal;
    let actions = ActionDeriver::new(Arc::new(HashCache::new())).derive(&signal, vendor_installed)?;
    let rendered = if json {
        serde_json::to_string(&actions)
    } else {
        serde_json::to_string_pretty(&actions)
    }
    .context("rendering actions")?;
    println!("{rendered}");
    Ok(())
}

async fn validate(ctx: AppContext, json: bool) -> Result<()> {
    let (errors, _rx) = ErrorSink::channel();
    let tuning = ctx.settings.tuning();
    let (engine, _workers) = ReconcileEngine::build(ctx.collaborators, tuning, errors);
    match engine.validate_cycle().await? {
        None if json => println!(r#"{{"received":false}}"#),
        None => println!("no signal received yet"),
        Some(c) if json => println!(
            r#"{{"received":true,"core_agent":{},"vendor_agent":{},"converged":{}}}"#,
            c.core_agent,
            c.vendor_agent,
            c.is_converged()
        ),
        Some(c) => println!(
            "core agent: {}\nvendor agent: {}\nconverged: {}",
            c.core_agent,
            c.vendor_agent,
            c.is_converged()
        ),
    }
    Ok(())
}

async fn serve(ctx: AppContext) -> Result<()> {
    let (errors, rx) = ErrorSink::channel();
    let drain = tokio::spawn(drain_errors(rx, ctx.settings.error_level));

    tracing::info!(
        domain = %ctx.settings.domain,
        workdir = %ctx.settings.workdir_path.display(),
        "docp manager starting",
    );
    let tuning = ctx.settings.tuning();
    let (engine, workers) = ReconcileEngine::build(ctx.collaborators, tuning, errors);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut engine_task = tokio::spawn(reconcile::run(engine, workers, stop_rx));
    tokio::select! {
        joined = &mut engine_task => {
            drain.abort();
            return joined.context("reconciliation engine aborted");
        }
        signal = tokio::signal::ctrl_c() => signal.context("listening for interrupt")?,
    }
    tracing::info!("interrupt received, shutting down");
    let _ = stop_tx.send(true);
    engine_task.await.context("reconciliation engine aborted")?;
    drain.abort();
    Ok(())
}
