//! packctl - manage Carvel packages, repositories and registry credentials

use std::str::FromStr;

use clap::{Parser, Subcommand};
use packctl_core::PackctlConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::Context;
use commands::package::PackageCommands;
use commands::repository::RepositoryCommands;
use commands::secret::SecretCommands;
use error::Result;

/// Environment variable holding the log filter
const LOG_ENV: &str = "PACKCTL_LOG";

#[derive(Parser, Debug)]
#[command(name = "packctl")]
#[command(author = "packctl Contributors")]
#[command(version)]
#[command(about = "Manage Carvel packages in a Kubernetes cluster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target namespace (defaults to the configured namespace)
    #[arg(short = 'n', long, global = true)]
    namespace: Option<String>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install, update or uninstall packages
    #[command(subcommand)]
    Package(PackageCommands),

    /// Add, update or delete package repositories
    #[command(subcommand)]
    #[command(alias = "repo")]
    Repository(RepositoryCommands),

    /// Manage secrets
    #[command(subcommand)]
    Secret(SecretCommands),
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        std::env::var(LOG_ENV)
            .ok()
            .and_then(|env| EnvFilter::from_str(&env).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = PackctlConfig::load()?;
    let ctx = Context::new(config, cli.namespace);

    match cli.command {
        Commands::Package(command) => commands::package::run(command, &ctx).await,
        Commands::Repository(command) => commands::repository::run(command, &ctx).await,
        Commands::Secret(command) => commands::secret::run(command, &ctx).await,
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
