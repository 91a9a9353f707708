//! `pgimport status` command implementation
//!
//! Shows a job's status, progress, error count, current database and log.

use crate::api::types::JobProgress;
use crate::api::{ApiClient, ImportApi};
use crate::config::Config;
use crate::error::Result;
use crate::import::progress_percent;
use crate::progress::{format_bytes, format_log_line};
use crate::registry::actions_for;
use colored::Colorize;

/// Show the status of one job
pub async fn run(config: &Config, job_id: &str) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let progress = api.status(job_id).await?;

    for line in render(job_id, &progress) {
        println!("{}", line);
    }
    Ok(())
}

fn render(job_id: &str, progress: &JobProgress) -> Vec<String> {
    let mut lines = vec![
        format!("{}", format!("Job {}", job_id).cyan().bold()),
        format!("  {:<10} {}", "Status:", progress.status),
    ];

    match progress.size {
        Some(size) if size > 0 => lines.push(format!(
            "  {:<10} {} / {} ({}%)",
            "Progress:",
            format_bytes(progress.consumed),
            format_bytes(size),
            progress_percent(progress.consumed, size)
        )),
        _ => lines.push(format!(
            "  {:<10} {}",
            "Progress:",
            format_bytes(progress.consumed)
        )),
    }

    let errors = if progress.errors > 0 {
        progress.errors.to_string().red().to_string()
    } else {
        "0".to_string()
    };
    lines.push(format!("  {:<10} {}", "Errors:", errors));

    if let Some(db) = &progress.current_db {
        lines.push(format!("  {:<10} {}", "Database:", db));
    }

    let actions = actions_for(progress.status).labels();
    if !actions.is_empty() {
        lines.push(format!("  {:<10} {}", "Actions:", actions.join(", ")));
    }

    if !progress.log.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}", "Log:".cyan()));
        lines.extend(progress.log.iter().map(format_log_line));
    }
    lines
}
