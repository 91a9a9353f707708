//! Pre-flight validation of dump files
//!
//! Classifies a file by its leading magic bytes and checks it against the
//! server's advertised decompression support and the configured size limit.
//! These checks only prevent futile uploads; the server validates again.

use crate::error::{CliError, Result};
use pgimport_common::types::{Capabilities, FileKind};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 8;

/// Classify a payload from its first bytes
pub fn detect_kind(prefix: &[u8]) -> FileKind {
    match prefix {
        [] => FileKind::Unknown,
        [0x1f, 0x8b, ..] => FileKind::Gzip,
        [0x42, 0x5a, 0x68, ..] => FileKind::Bzip2,
        [0x50, 0x4b, 0x03, 0x04, ..] | [0x50, 0x4b, 0x05, 0x06, ..] | [0x50, 0x4b, 0x07, 0x08, ..] => {
            FileKind::Zip
        },
        _ => FileKind::Plain,
    }
}

/// Read up to [`SNIFF_LEN`] bytes from the start of a file and classify them
pub async fn sniff_file(path: &Path) -> Result<FileKind> {
    let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CliError::FileNotFound(path.display().to_string()),
        _ => CliError::Io(e),
    })?;

    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut prefix).await?;

    Ok(detect_kind(&prefix))
}

/// Reject payloads the server cannot decompress
pub fn check_capabilities(name: &str, kind: FileKind, capabilities: &Capabilities) -> Result<()> {
    if capabilities.supports(kind) {
        Ok(())
    } else {
        Err(CliError::UnsupportedCompression {
            file: name.to_string(),
            kind: kind.to_string(),
        })
    }
}

/// Reject files over the configured limit
pub fn check_size(name: &str, size: u64, max_size: Option<u64>) -> Result<()> {
    match max_size {
        Some(max) if size > max => Err(CliError::FileTooLarge {
            file: name.to_string(),
            size,
            max,
        }),
        _ => Ok(()),
    }
}

/// Run every pre-flight check; no network call is made
pub async fn validate_file(
    path: &Path,
    size: u64,
    capabilities: &Capabilities,
    max_size: Option<u64>,
) -> Result<FileKind> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    check_size(&name, size, max_size)?;

    let kind = sniff_file(path).await?;
    if kind == FileKind::Unknown {
        return Err(CliError::EmptyFile(name));
    }
    check_capabilities(&name, kind, capabilities)?;

    Ok(kind)
}
