/// # kaiten-planka CLI Interface (Module)
///
/// Command parsing and the async entrypoint [`run`]. All migration logic lives
/// in `kaiten-planka-core`; this module loads configuration, wires the two REST
/// clients into a [`MigrationContext`] and invokes the requested stage.
///
/// For programmatic or integration use, call [`run`] with a constructed [`Cli`].
use crate::http::build_client;
use crate::kaiten::KaitenClient;
use crate::load_config::{load_config, CliConfig};
use crate::planka::PlankaClient;
use anyhow::Result;
use clap::{Parser, Subcommand};
use kaiten_planka_core::context::MigrationContext;
use kaiten_planka_core::migrate::{migrate, teardown};
use kaiten_planka_core::rate_limit::RateLimiter;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for kaiten-planka: copy a Kaiten workspace into Planka.
#[derive(Parser)]
#[clap(
    name = "kaiten-planka",
    version,
    about = "Migrate Kaiten spaces, boards, cards, comments and attachments into Planka"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recreate the Kaiten hierarchy in Planka
    Migrate {
        /// Optional YAML file with tunables
        #[clap(long)]
        config: Option<PathBuf>,
        /// Delete Planka users (except the admin) and projects first
        #[clap(long)]
        teardown: bool,
    },
    /// Delete Planka users (except the admin) and all projects, then exit
    Teardown {
        /// Optional YAML file with tunables
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

/// Builds the shared HTTP client, the source rate limiter and both service
/// clients.
pub fn build_context(config: &CliConfig) -> Result<Arc<MigrationContext>> {
    let client = build_client(&config.http)?;
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.per_second,
        config.rate_limit.burst,
    )?);
    let source = KaitenClient::new(
        config.kaiten.url.clone(),
        config.kaiten.token.clone(),
        client.clone(),
        limiter,
    );
    let destination = PlankaClient::new(config.planka.url.clone(), config.planka.token.clone(), client);

    config.migration.trace_loaded();
    Ok(MigrationContext::new(Arc::new(source), Arc::new(destination), config.migration.clone()).into_shared())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // top-level event emitted before anything can fail
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Migrate {
            config,
            teardown: wipe_first,
        } => {
            let mut config = load_config(config.as_deref())?;
            config.migration.teardown |= wipe_first;
            let ctx = build_context(&config)?;
            tracing::info!(command = "migrate", teardown = config.migration.teardown, "Starting migration");
            match migrate(ctx).await {
                Ok(()) => {
                    tracing::info!(command = "migrate", "Migration complete");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "migrate", error = %e, "Migration aborted");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Teardown { config } => {
            let config = load_config(config.as_deref())?;
            let ctx = build_context(&config)?;
            tracing::info!(command = "teardown", "Starting teardown");
            teardown(&ctx).await.map_err(|e| {
                tracing::error!(command = "teardown", error = %e, "Teardown failed");
                anyhow::Error::new(e)
            })
        }
    }
}
