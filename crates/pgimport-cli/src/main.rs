//! pgimport CLI - Main entry point

use clap::Parser;
use pgimport_cli::{commands, Cli, Commands, ConfigCommand, Session};
use pgimport_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Honor a local .env before clap reads PGIMPORT_* variables
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("pgimport")
        .build();

    // Environment variables take precedence
    let log_config = match LogConfig::from_env() {
        Ok(Some(from_env)) => from_env,
        _ => log_config,
    };

    // The CLI works without logging
    let _ = init_logging(&log_config);

    let session = Arc::new(Session::new());
    watch_interrupts(session.clone());
    watch_pause_signal(session.clone());

    if let Err(e) = execute_command(&cli, &session).await {
        if e.is_cancelled() {
            eprintln!("Cancelled.");
            process::exit(130);
        }
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// First Ctrl-C cancels the running job, the second one exits
fn watch_interrupts(session: Arc<Session>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, cancelling");
        session.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            process::exit(130);
        }
    });
}

/// SIGUSR1 pauses a running upload at the next chunk boundary, the next one
/// resumes it
#[cfg(unix)]
fn watch_pause_signal(session: Arc<Session>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut toggles = match signal(SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Pause signal unavailable");
                return;
            },
        };
        while toggles.recv().await.is_some() {
            let paused = session.toggle_pause();
            info!(paused, "Pause toggled by signal");
        }
    });
}

#[cfg(not(unix))]
fn watch_pause_signal(_session: Arc<Session>) {}

/// Execute the CLI command
async fn execute_command(cli: &Cli, session: &Session) -> pgimport_cli::Result<()> {
    let config = cli.load_config()?;

    match &cli.command {
        Commands::Upload(args) => commands::upload::run(&config, session, args).await,

        Commands::Jobs { all } => commands::jobs::run(&config, session, *all).await,

        Commands::Start { job, size, entry } => {
            commands::start::run(&config, session, job, *size, entry.selection()).await
        },

        Commands::Status { job } => commands::status::run(&config, job).await,

        Commands::Entries { job } => commands::entries::run(&config, job).await,

        Commands::Pause { job, yes } => commands::control::pause(&config, session, job, *yes).await,

        Commands::Resume { job } => commands::control::resume(&config, session, job).await,

        Commands::Delete { job, yes } => {
            commands::control::delete(&config, session, job, *yes).await
        },

        Commands::Config { command } => match command {
            ConfigCommand::Show => commands::config::show(&config).await,
        },
    }
}
