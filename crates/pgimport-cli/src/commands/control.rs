//! `pgimport pause`, `resume` and `delete` command implementations

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::progress::{format_log_line, JobTable};
use crate::prompt::TerminalConfirm;
use crate::registry::{AssumeYes, Confirm, JobRegistry};
use crate::session::Session;
use colored::Colorize;

fn confirmer(yes: bool) -> &'static dyn Confirm {
    if yes {
        &AssumeYes as &dyn Confirm
    } else {
        &TerminalConfirm
    }
}

/// Pause a running job
pub async fn pause(config: &Config, session: &Session, job_id: &str, yes: bool) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let store = config.resume_store();
    let registry = JobRegistry::new(&api, session, &store, confirmer(yes), &JobTable);

    if registry.pause(job_id).await? {
        println!("{} Paused job {}", "✓".green(), job_id.cyan());
    } else {
        println!("Pause aborted.");
    }
    Ok(())
}

/// Resume a paused, failed or cancelled job
pub async fn resume(config: &Config, session: &Session, job_id: &str) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let store = config.resume_store();
    let registry = JobRegistry::new(&api, session, &store, &AssumeYes, &JobTable);

    let reply = registry.resume(job_id).await?;
    for line in &reply.log {
        println!("{}", format_log_line(line));
    }
    println!("{} Resumed job {}", "✓".green(), job_id.cyan());
    println!("Follow the import with: pgimport start {}", job_id);
    Ok(())
}

/// Delete a job
pub async fn delete(config: &Config, session: &Session, job_id: &str, yes: bool) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let store = config.resume_store();
    let registry = JobRegistry::new(&api, session, &store, confirmer(yes), &JobTable);

    if !registry.delete(job_id).await? {
        println!("Delete aborted.");
    }
    Ok(())
}
