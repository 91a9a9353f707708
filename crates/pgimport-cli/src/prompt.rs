//! Interactive prompts

use crate::error::{CliError, Result};
use crate::orchestrator::EntrySelector;
use crate::progress::format_bytes;
use crate::registry::Confirm;
use inquire::{InquireError, Select};
use pgimport_common::types::{ArchiveEntry, EntrySelection};

const IMPORT_ALL: &str = "Import all entries";
const NOT_NOW: &str = "Do not import now";

/// Yes/no confirmation on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        match inquire::Confirm::new(prompt).with_default(false).prompt() {
            Ok(answer) => Ok(answer),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
            Err(e) => Err(CliError::config(format!("confirmation prompt failed: {}", e))),
        }
    }
}

/// Archive member picker on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSelector;

impl EntrySelector for TerminalSelector {
    fn select(&self, entries: &[ArchiveEntry]) -> Result<Option<EntrySelection>> {
        let mut options: Vec<String> = entries
            .iter()
            .map(|e| format!("{} ({})", e.name, format_bytes(e.size)))
            .collect();
        options.push(IMPORT_ALL.to_string());
        options.push(NOT_NOW.to_string());

        let choice = match Select::new("Select the entry to import:", options)
            .with_page_size(15)
            .raw_prompt()
        {
            Ok(choice) => choice,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                return Ok(None)
            },
            Err(e) => return Err(CliError::config(format!("entry prompt failed: {}", e))),
        };

        Ok(match choice.index {
            i if i < entries.len() => Some(EntrySelection::Entry(entries[i].name.clone())),
            i if i == entries.len() => Some(EntrySelection::All),
            _ => None,
        })
    }
}
