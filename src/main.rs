use clap::Parser;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use compliance_session::{
    app::AppState,
    cli::{execute_command, Commands},
    config::{Config, LogFormat},
};

/// Contract compliance review client
#[derive(Parser, Debug)]
#[command(name = "compliance-session", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Compliance session client starting..."
    );

    let state = match AppState::initialize(config).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to initialize application");
            return Err(e.into());
        }
    };

    let result = execute_command(cli.command, &state).await;

    // Snapshot writes are asynchronous; drain them before exiting.
    state.session.flush().await;

    if result.exit_code == 0 {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
