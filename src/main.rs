use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gastown::adapters::{CommandGitHost, CommandSandbox};
use gastown::config::mask_database_url;
use gastown::http::{self, AppState};
use gastown::{load_config, Config, Database, GastownError, NewRig, Orchestrator, RigId, TownId};

#[derive(Parser)]
#[command(name = "gastown")]
#[command(about = "Per-rig orchestration of beads, agents, mail and merge queues")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: .gastown/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and every rig's timer
    Serve,

    /// Create the database schema
    InitDb,

    /// Create a town
    CreateTown {
        #[arg(long)]
        name: String,
        #[arg(long)]
        owner: String,
    },

    /// List towns
    ListTowns,

    /// Create a rig inside a town
    CreateRig {
        #[arg(long)]
        town: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        git_url: String,
        #[arg(long)]
        default_branch: Option<String>,
    },

    /// List a town's rigs
    ListRigs {
        #[arg(long)]
        town: String,
    },

    /// Run one witness patrol over a rig
    Patrol { rig: String },

    /// Fire a rig's timer now: dispatch, merge, then patrol
    Fire { rig: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<GastownError>()
                .map_or(1, GastownError::exit_code);
            error!(error = %err, "Command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config).await?;
    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::InitDb => {
            open_database(&config).await?.close().await;
            print_json(&serde_json::json!({
                "database_url": mask_database_url(&config.database_url),
                "initialized": true,
            }))
        }
        Commands::CreateTown { name, owner } => {
            let orchestrator = orchestrator(&config).await?;
            print_json(&orchestrator.create_town(&name, &owner).await?)
        }
        Commands::ListTowns => {
            let orchestrator = orchestrator(&config).await?;
            print_json(&orchestrator.list_towns().await?)
        }
        Commands::CreateRig {
            town,
            name,
            git_url,
            default_branch,
        } => {
            let orchestrator = orchestrator(&config).await?;
            let mut new_rig = NewRig::new(TownId::new(town), name, git_url);
            new_rig.default_branch = default_branch;
            print_json(&orchestrator.create_rig(&new_rig).await?)
        }
        Commands::ListRigs { town } => {
            let orchestrator = orchestrator(&config).await?;
            print_json(&orchestrator.list_rigs(&TownId::new(town)).await?)
        }
        Commands::Patrol { rig } => {
            let orchestrator = orchestrator(&config).await?;
            let result = orchestrator
                .rig(&RigId::new(rig))
                .await?
                .witness_patrol()
                .await;
            orchestrator.shutdown().await;
            print_json(&result?)
        }
        Commands::Fire { rig } => {
            let orchestrator = orchestrator(&config).await?;
            let result = orchestrator.rig(&RigId::new(rig)).await?.fire_timer().await;
            orchestrator.shutdown().await;
            print_json(&result?)
        }
    }
}

async fn open_database(config: &Config) -> gastown::Result<Database> {
    let db = Database::connect(&config.database_url).await?;
    db.initialize_schema().await?;
    Ok(db)
}

async fn orchestrator(config: &Config) -> gastown::Result<Orchestrator> {
    let db = open_database(config).await?;
    let timeout = config.scheduler.external_call_timeout();
    Ok(Orchestrator::new(
        db,
        Arc::new(CommandSandbox::new(config.sandbox.clone(), timeout)),
        Arc::new(CommandGitHost::new(config.git.clone(), timeout)),
        config.scheduler,
    ))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.listen_socket_addr()?;
    let orchestrator = Arc::new(orchestrator(&config).await?);
    let resumed = orchestrator.resume().await?;
    info!(resumed, "Rig actors started");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let state = AppState::new(Arc::clone(&orchestrator), config.api_token.clone());
    let served = http::serve(listener, state, http::shutdown_signal()).await;

    orchestrator.shutdown().await;
    orchestrator.database().close().await;
    info!("Server shutdown complete");
    served.map_err(Into::into)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
