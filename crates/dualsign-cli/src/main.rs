//! dualsign - sign in with a local account or a federated provider.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dualsign_config::{init_logging, Config, Paths};

/// dualsign command-line interface.
#[derive(Parser)]
#[command(name = "dualsign")]
#[command(about = "Manage local and federated sign-in sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and storage. Defaults to ~/.dualsign
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a local account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "DUALSIGN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with a local account or the federated provider
    Login {
        #[arg(long, required_unless_present = "google")]
        email: Option<String>,
        #[arg(
            long,
            env = "DUALSIGN_PASSWORD",
            hide_env_values = true,
            required_unless_present = "google"
        )]
        password: Option<String>,
        /// Use the federated provider instead of a local account
        #[arg(long, conflicts_with_all = ["email", "password"])]
        google: bool,
    },
    /// Sign out of every identity source
    Logout,
    /// Show the current session
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging(cli.log_level.as_deref().unwrap_or(config.log_level.as_str()));

    let coordinator = app::open(&config, &paths).await?;

    let success = match cli.command {
        Commands::Register {
            name,
            email,
            password,
        } => app::register(&coordinator, &name, &email, &password)?,
        Commands::Login { google: true, .. } => app::login_federated(&coordinator).await?,
        Commands::Login {
            email, password, ..
        } => app::login_local(
            &coordinator,
            email.as_deref().unwrap_or_default(),
            password.as_deref().unwrap_or_default(),
        )?,
        Commands::Logout => app::logout(&coordinator).await?,
        Commands::Status => app::status(&coordinator)?,
    };

    coordinator.dispose();

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
