//! `pgimport jobs` command implementation

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::progress::JobTable;
use crate::registry::{AssumeYes, JobRegistry};
use crate::session::Session;

/// List import jobs with their available actions
pub async fn run(config: &Config, session: &Session, all: bool) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let store = config.resume_store();

    JobRegistry::new(&api, session, &store, &AssumeYes, &JobTable)
        .show_all(all)
        .refresh()
        .await?;
    Ok(())
}
