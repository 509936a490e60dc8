//! # parley
//!
//! Parley chat server binary. Loads settings, seeds the credential store,
//! and serves the HTTP + WebSocket gateway until Ctrl-C.

#![deny(unsafe_code)]

mod logging;

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use parley_auth::{DEFAULT_COST, hash_password};
use parley_server::ParleyServer;
use parley_server::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use parley_settings::{MAX_BCRYPT_COST, MIN_BCRYPT_COST, ParleySettings};

/// Parley chat server.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Authenticated real-time chat server")]
struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a password from stdin and print its bcrypt hash, for seeding
    /// `auth.users`.
    HashPassword {
        /// bcrypt work factor.
        #[arg(long, default_value_t = DEFAULT_COST)]
        cost: u32,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<ParleySettings> {
        self.load_settings_with(|name| std::env::var(name).ok())
    }

    /// Settings from `--config` (or the default path), overrides read
    /// through `env`, then the CLI flags.
    fn load_settings_with<F>(&self, env: F) -> Result<ParleySettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = self
            .config
            .clone()
            .unwrap_or_else(parley_settings::settings_path);
        let settings = parley_settings::load_settings_with_env(&path, env)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        Ok(self.apply(settings))
    }

    fn apply(&self, mut settings: ParleySettings) -> ParleySettings {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        settings
    }
}

fn hash_from_stdin(cost: u32) -> Result<String> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        bail!("cost must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}");
    }
    let mut line = String::new();
    let _ = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("empty password");
    }
    hash_password(password, cost).context("Failed to hash password")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::HashPassword { cost }) = cli.command {
        println!("{}", hash_from_stdin(cost)?);
        return Ok(());
    }

    let settings = cli.load_settings()?;
    logging::init_subscriber(&settings.logging.level);

    // Fails on a missing secret before anything is bound.
    let server = ParleyServer::from_settings(&settings).context("Invalid configuration")?;
    let metrics = parley_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = server.with_metrics(metrics);

    let (addr, handle) = server.listen().await.with_context(|| {
        format!(
            "Failed to bind {}:{}",
            settings.server.host, settings.server.port
        )
    })?;
    tracing::info!(%addr, "parley ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let finished = server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(DEFAULT_SHUTDOWN_TIMEOUT))
        .await;
    if !finished {
        tracing::warn!("server did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
