//! Aira CLI - Single entrypoint for the webhook platform
//!
//! This application wires the library crates together and provides the
//! server and provisioning commands.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ServeCommand, SetupCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AIRA_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "AIRA_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Provision the organization, admin user and first API key
    Setup(SetupCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone();

    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .expect("Invalid RUST_LOG environment variable")
    } else {
        // All aira crates at the specified level, noisy dependencies at warn
        tracing_subscriber::EnvFilter::new(format!(
            "aira_cli={level},\
             aira_core={level},\
             aira_entities={level},\
             aira_migrations={level},\
             aira_database={level},\
             aira_queue={level},\
             aira_auth={level},\
             aira_webhooks={level},\
             sqlx=warn,\
             sea_orm=warn,\
             tower=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::Setup(setup_cmd) => setup_cmd.execute(),
    }
}
