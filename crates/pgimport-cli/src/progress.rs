//! Terminal progress reporting
//!
//! [`TerminalReporter`] renders pipeline events as indicatif progress bars;
//! [`JobTable`] renders the job registry with comfy-table.

use crate::api::types::{JobSummary, LogEntry};
use crate::import::progress_percent;
use crate::observer::{Observer, PipelineEvent, RegistryObserver};
use crate::registry::actions_for;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

/// Create a progress bar for the chunk transfer
pub fn create_upload_progress(size: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Create a percentage bar for the import loop
pub fn create_import_progress(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.green/white}] {pos}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Render one job log line, errors in red
pub fn format_log_line(entry: &LogEntry) -> String {
    if entry.is_error() {
        format!("  {}", entry.message.red())
    } else {
        format!("  {}", entry.message)
    }
}

#[derive(Default)]
struct Bars {
    size: u64,
    upload: Option<ProgressBar>,
    import: Option<ProgressBar>,
}

/// Observer drawing progress bars on stderr
pub struct TerminalReporter {
    bars: Mutex<Bars>,
    hidden: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self {
            bars: Mutex::new(Bars::default()),
            hidden: false,
        }
    }

    /// Reporter that tracks state without drawing
    pub fn hidden() -> Self {
        Self {
            bars: Mutex::new(Bars::default()),
            hidden: true,
        }
    }

    fn attach(&self, pb: ProgressBar) -> ProgressBar {
        if self.hidden {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb
    }

    fn print(&self, bar: Option<&ProgressBar>, line: String) {
        if self.hidden {
            return;
        }
        match bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{}", line),
        }
    }

    /// Position of the upload bar, if one is showing
    pub fn upload_position(&self) -> Option<u64> {
        self.bars
            .lock()
            .ok()
            .and_then(|bars| bars.upload.as_ref().map(|pb| pb.position()))
    }

    /// Position of the import bar, if one is showing
    pub fn import_position(&self) -> Option<u64> {
        self.bars
            .lock()
            .ok()
            .and_then(|bars| bars.import.as_ref().map(|pb| pb.position()))
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for TerminalReporter {
    fn on_event(&self, event: &PipelineEvent) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };

        match event {
            PipelineEvent::Validated { kind, size } => {
                bars.size = *size;
                self.print(
                    None,
                    format!("{} {} dump, {}", "✓".green(), kind, format_bytes(*size)),
                );
            },
            PipelineEvent::JobResolved {
                job_id,
                resumed,
                offset,
                ..
            } => {
                let message = if *resumed {
                    format!("Resuming job {} at {}", job_id.cyan(), format_bytes(*offset))
                } else {
                    format!("Uploading to job {}", job_id.cyan())
                };
                let pb = self.attach(create_upload_progress(bars.size, &message));
                pb.set_position(*offset);
                bars.upload = Some(pb);
            },
            PipelineEvent::ChunkSending { .. } => {},
            PipelineEvent::ChunkAcked { uploaded, size } => {
                if let Some(pb) = &bars.upload {
                    pb.set_length(*size);
                    pb.set_position(*uploaded);
                }
            },
            PipelineEvent::ChecksumRejected { offset } => {
                self.print(
                    bars.upload.as_ref(),
                    format!(
                        "{} checksum mismatch at {}, resending",
                        "!".yellow(),
                        format_bytes(*offset)
                    ),
                );
            },
            PipelineEvent::RetryScheduled {
                attempt,
                delay,
                error,
                ..
            } => {
                if let Some(pb) = &bars.upload {
                    pb.set_message(format!(
                        "Retry {} in {}s: {}",
                        attempt,
                        delay.as_secs(),
                        error
                    ));
                }
            },
            PipelineEvent::Offline => {
                if let Some(pb) = &bars.upload {
                    pb.set_message("Offline, waiting for the network...".yellow().to_string());
                }
            },
            PipelineEvent::Online => {
                if let Some(pb) = &bars.upload {
                    pb.set_message("Back online".to_string());
                }
            },
            PipelineEvent::Paused { .. } => {
                if let Some(pb) = &bars.upload {
                    pb.set_message("Paused".yellow().to_string());
                }
            },
            PipelineEvent::Resumed { .. } => {
                if let Some(pb) = &bars.upload {
                    pb.set_message("Uploading".to_string());
                }
            },
            PipelineEvent::Cancelled { job_id } => {
                let message = format!("Cancelled job {}", job_id);
                if let Some(pb) = bars.upload.take() {
                    pb.abandon_with_message(message.clone());
                }
                if let Some(pb) = bars.import.take() {
                    pb.abandon_with_message(message);
                }
            },
            PipelineEvent::Finalized { size } => {
                if let Some(pb) = bars.upload.take() {
                    pb.set_length(*size);
                    pb.finish_with_message(format!(
                        "{} Uploaded {}",
                        "✓".green(),
                        format_bytes(*size)
                    ));
                }
            },
            PipelineEvent::EntriesListed { entries } => {
                self.print(None, format!("Archive contains {} entries:", entries.len()));
                for entry in entries {
                    self.print(
                        None,
                        format!("  {} ({})", entry.name.cyan(), format_bytes(entry.size)),
                    );
                }
            },
            PipelineEvent::ImportTick {
                status,
                percent,
                errors,
                current_db,
                ..
            } => {
                if bars.import.is_none() {
                    bars.import = Some(self.attach(create_import_progress("Importing")));
                }
                if let Some(pb) = &bars.import {
                    pb.set_position(u64::from(*percent));
                    let mut message = format!("Importing ({})", status);
                    if let Some(db) = current_db {
                        message.push_str(&format!(" into {}", db));
                    }
                    if *errors > 0 {
                        message.push_str(&format!(", {} errors", errors).red().to_string());
                    }
                    pb.set_message(message);
                    if status.is_terminal() {
                        pb.finish();
                    }
                }
            },
            PipelineEvent::ImportLog { lines } => {
                for line in lines {
                    self.print(bars.import.as_ref(), format_log_line(line));
                }
            },
            PipelineEvent::Status { message } => {
                self.print(None, message.clone());
            },
        }
    }
}

/// Registry observer printing the job list as a table
#[derive(Debug, Default)]
pub struct JobTable;

impl JobTable {
    pub fn render(jobs: &[JobSummary]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Job", "File", "Status", "Progress", "Actions"]);

        for job in jobs {
            let progress = if job.size > 0 {
                format!(
                    "{} / {} ({}%)",
                    format_bytes(job.offset),
                    format_bytes(job.size),
                    progress_percent(job.offset, job.size)
                )
            } else {
                "-".to_string()
            };

            table.add_row(vec![
                job.job_id.clone(),
                job.filename.clone().unwrap_or_else(|| "-".to_string()),
                job.status.to_string(),
                progress,
                actions_for(job.status).labels().join(", "),
            ]);
        }
        table
    }
}

impl RegistryObserver for JobTable {
    fn jobs_refreshed(&self, jobs: &[JobSummary]) {
        if jobs.is_empty() {
            println!("No import jobs found.");
            return;
        }
        println!("{}", Self::render(jobs));
    }

    fn job_removed(&self, job_id: &str) {
        println!("{} Deleted job {}", "✓".green(), job_id.cyan());
    }
}
