//! `pgimport entries` command implementation

use crate::api::{ApiClient, ImportApi};
use crate::config::Config;
use crate::error::Result;
use crate::progress::format_bytes;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// List the members of an uploaded archive
pub async fn run(config: &Config, job_id: &str) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let entries = api.list_entries(job_id).await?;

    if entries.is_empty() {
        println!("Job {} is not an archive; it imports as a single dump.", job_id);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Entry", "Size"]);
    for entry in &entries {
        table.add_row(vec![entry.name.clone(), format_bytes(entry.size)]);
    }

    println!("{}", table);
    println!(
        "Import one with: pgimport start {} --entry <NAME>  (or --all)",
        job_id
    );
    Ok(())
}
