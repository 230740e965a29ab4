use anyhow::Context;
use clap::{Parser, Subcommand};
use configuration::{CorsMode, Settings, TlsMode};
use database::UserStore;
use std::path::PathBuf;
use std::process::ExitCode;

/// The main entry point for the registration service.
#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file, if there is one.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Application error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Accepts registrations over HTTP and stores them in MySQL.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML settings file. Defaults to ./config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Create the users table if it does not exist, then exit.
    InitDb,
    /// Run `SELECT 1` through the pool and report the result.
    Healthcheck,
}

#[derive(Parser)]
struct ServeArgs {
    /// Interface to bind, overriding server.host.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding server.port.
    #[arg(long)]
    port: Option<u16>,

    /// Cross-origin policy, overriding server.cors.
    #[arg(long, value_enum)]
    cors: Option<CorsMode>,

    /// Transport security for the database, overriding database.tls.
    #[arg(long, value_enum)]
    tls: Option<TlsMode>,
}

impl ServeArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(cors) = self.cors {
            settings.server.cors = cors;
        }
        if let Some(tls) = self.tls {
            settings.database.tls = tls;
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings =
        configuration::load_settings(cli.config.as_deref()).context("Failed to load settings")?;

    let _log_guard = configuration::init_tracing(&settings.logging)?;
    configuration::install_panic_hook();

    match cli.command {
        Commands::Serve(args) => {
            args.apply(&mut settings);
            web_server::run_server(settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitDb => handle_init_db(&settings).await,
        Commands::Healthcheck => handle_healthcheck(&settings).await,
    }
}

// ==============================================================================
// One-shot Commands
// ==============================================================================

/// Runs the schema bootstrap on its own. Unlike `serve`, any failure is fatal here.
async fn handle_init_db(settings: &Settings) -> anyhow::Result<ExitCode> {
    let repo = database::connect(&settings.database)?;
    let result = repo.ensure_schema().await;
    repo.close().await;

    result.context("Error creating users table")?;
    println!("Users table created or already exists.");
    Ok(ExitCode::SUCCESS)
}

async fn handle_healthcheck(settings: &Settings) -> anyhow::Result<ExitCode> {
    let repo = database::connect(&settings.database)?;
    let result = repo.ping().await;
    repo.close().await;

    match result {
        Ok(()) => {
            println!("healthy");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("unhealthy: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
