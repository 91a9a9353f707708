//! `pgimport upload` command implementation
//!
//! Runs the whole pipeline for one dump file: validation, resumable chunked
//! upload, finalization, entry selection and import.

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::import::ImportOutcome;
use crate::orchestrator::{
    EntrySelector, FixedSelector, ImportTarget, JobOrchestrator, PipelineOutcome, UploadSettings,
};
use crate::progress::{format_bytes, TerminalReporter};
use crate::prompt::TerminalSelector;
use crate::session::Session;
use crate::source::UploadFile;
use crate::UploadArgs;
use colored::Colorize;
use tracing::info;

/// Upload and import a dump
pub async fn run(config: &Config, session: &Session, args: &UploadArgs) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let store = config.resume_store();
    let reporter = TerminalReporter::new();

    let mut settings = UploadSettings::from_config(config);
    if let Some(chunk_size) = args.chunk_size {
        if chunk_size == 0 {
            return Err(CliError::config("--chunk-size must be greater than zero"));
        }
        settings.chunk_size = chunk_size;
    }
    if args.no_auto {
        settings.auto_continue = false;
    }

    let target = ImportTarget {
        scope: args.scope,
        scope_ident: args.ident.clone(),
        options: args.options(),
    };

    let file = UploadFile::from_path(&args.file).await?;
    info!(file = %file.name, size = file.size, "Starting upload");
    println!(
        "{} {} ({})",
        "Uploading".cyan().bold(),
        file.name,
        format_bytes(file.size)
    );
    #[cfg(unix)]
    println!(
        "{}",
        format!(
            "Pause or resume with: kill -USR1 {}",
            std::process::id()
        )
        .dimmed()
    );

    let preset = args.entry.selection().map(|s| FixedSelector(Some(s)));
    let selector: &dyn EntrySelector = match &preset {
        Some(fixed) => fixed,
        None => &TerminalSelector,
    };

    let orchestrator = JobOrchestrator::new(&api, session, &store, settings, &reporter);
    let outcome = orchestrator.run(&file, &target, selector).await?;

    report(&outcome)
}

fn report(outcome: &PipelineOutcome) -> Result<()> {
    match outcome {
        PipelineOutcome::Uploaded { job_id, size } => {
            println!(
                "{} Uploaded {} to job {}",
                "✓".green(),
                format_bytes(*size),
                job_id.cyan()
            );
            println!("Start the import with: pgimport start {}", job_id);
            Ok(())
        },
        PipelineOutcome::Imported {
            job_id, outcome, ..
        } => match outcome {
            ImportOutcome::Finished { errors, .. } => {
                if *errors > 0 {
                    println!(
                        "{} Import of job {} finished with {} errors",
                        "!".yellow(),
                        job_id.cyan(),
                        errors
                    );
                } else {
                    println!("{} Import of job {} finished", "✓".green(), job_id.cyan());
                }
                Ok(())
            },
            ImportOutcome::Failed { errors, .. } => Err(CliError::api(format!(
                "import of job {} stopped with {} errors",
                job_id, errors
            ))),
            ImportOutcome::Cancelled { .. } => {
                println!(
                    "Stopped watching job {}. It keeps its progress; continue with: pgimport start {}",
                    job_id, job_id
                );
                Err(CliError::Cancelled)
            },
        },
        PipelineOutcome::Cancelled { job_id } => {
            match job_id {
                Some(job_id) => println!("Upload cancelled, job {} deleted", job_id),
                None => println!("Upload cancelled before a job was created"),
            }
            Err(CliError::Cancelled)
        },
    }
}
