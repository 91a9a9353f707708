//! `pgimport start` command implementation
//!
//! Starts (or continues) the server-side import of an uploaded job and follows
//! it until it finishes.

use crate::api::{ApiClient, ImportApi};
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::import::{ImportDriver, ImportOutcome};
use crate::progress::TerminalReporter;
use crate::session::Session;
use colored::Colorize;
use pgimport_common::types::EntrySelection;
use std::time::Duration;

/// Import an uploaded job
pub async fn run(
    config: &Config,
    session: &Session,
    job_id: &str,
    size: Option<u64>,
    selection: Option<EntrySelection>,
) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    session.ensure_available(Some(job_id))?;

    if let Some(selection) = &selection {
        api.select_entry(job_id, selection).await?;
        println!("{} Selected {}", "✓".green(), describe(selection));
    }

    let reporter = TerminalReporter::new();
    let outcome = ImportDriver::new(&api, session)
        .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
        .run(job_id, size, &reporter)
        .await?;

    match outcome {
        ImportOutcome::Finished { errors: 0, .. } => {
            println!("{} Import of job {} finished", "✓".green(), job_id.cyan());
            Ok(())
        },
        ImportOutcome::Finished { errors, .. } => {
            println!(
                "{} Import of job {} finished with {} errors",
                "!".yellow(),
                job_id.cyan(),
                errors
            );
            Ok(())
        },
        ImportOutcome::Failed { errors, .. } => Err(CliError::api(format!(
            "import of job {} stopped with {} errors",
            job_id, errors
        ))),
        ImportOutcome::Cancelled { .. } => {
            println!("Stopped watching job {}", job_id);
            Err(CliError::Cancelled)
        },
    }
}

fn describe(selection: &EntrySelection) -> String {
    match selection {
        EntrySelection::Entry(name) => format!("entry {}", name.cyan()),
        EntrySelection::All => "all entries".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_selection() {
        assert!(describe(&EntrySelection::Entry("hr.sql".into())).contains("hr.sql"));
        assert_eq!(describe(&EntrySelection::All), "all entries");
    }
}
