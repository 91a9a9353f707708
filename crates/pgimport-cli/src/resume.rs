//! Resume tokens
//!
//! Maps a file fingerprint (name, size, modification time) to the server job
//! that is receiving it, so an interrupted upload can pick up where the server
//! left off instead of starting over.
//!
//! The file-backed store is last-writer-wins. Two processes uploading the same
//! file at once race on it; this is a known limitation, not something the
//! store tries to arbitrate.

use crate::error::{CliError, Result};
use crate::source::UploadFile;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name of the token store inside the state directory
pub const RESUME_FILE: &str = "resume.json";

/// Fingerprint key of a local file
pub fn file_key(name: &str, size: u64, modified_ms: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(size.to_le_bytes());
    hasher.update(modified_ms.to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

impl UploadFile {
    /// Resume-token key of this file
    pub fn resume_key(&self) -> String {
        file_key(&self.name, self.size, self.modified_ms)
    }
}

/// Durable key -> job id mapping
pub trait ResumeStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn put(&self, key: &str, job_id: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Forget every token that names `job_id`
    fn remove_job(&self, job_id: &str) -> Result<()>;
}

/// JSON file store
pub struct FileResumeStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileResumeStore {
    /// Store in `state_dir/resume.json`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self::at(state_dir.as_ref().join(RESUME_FILE))
    }

    /// Store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                CliError::resume_store(format!("{} is corrupt: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, tokens: &BTreeMap<String, String>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(serde_json::to_string_pretty(tokens)?.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|e| CliError::resume_store(e.to_string()))?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CliError::resume_store("token store lock poisoned"))?;
        let mut tokens = self.load()?;
        f(&mut tokens);
        self.save(&tokens)
    }
}

impl ResumeStore for FileResumeStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn put(&self, key: &str, job_id: &str) -> Result<()> {
        self.update(|tokens| {
            tokens.insert(key.to_string(), job_id.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|tokens| {
            tokens.remove(key);
        })
    }

    fn remove_job(&self, job_id: &str) -> Result<()> {
        self.update(|tokens| tokens.retain(|_, id| id != job_id))
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryResumeStore {
    tokens: Mutex<BTreeMap<String, String>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> Result<T> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| CliError::resume_store("token store lock poisoned"))?;
        Ok(f(&mut tokens))
    }
}

impl ResumeStore for MemoryResumeStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with(|tokens| tokens.get(key).cloned())
    }

    fn put(&self, key: &str, job_id: &str) -> Result<()> {
        self.with(|tokens| {
            tokens.insert(key.to_string(), job_id.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with(|tokens| {
            tokens.remove(key);
        })
    }

    fn remove_job(&self, job_id: &str) -> Result<()> {
        self.with(|tokens| tokens.retain(|_, id| id != job_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_key_depends_on_every_component() {
        let base = file_key("dump.sql", 100, 1_700_000_000_000);
        assert_eq!(base, file_key("dump.sql", 100, 1_700_000_000_000));
        assert_eq!(base.len(), 32);
        assert_ne!(base, file_key("dump2.sql", 100, 1_700_000_000_000));
        assert_ne!(base, file_key("dump.sql", 101, 1_700_000_000_000));
        assert_ne!(base, file_key("dump.sql", 100, 1_700_000_000_001));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let store = FileResumeStore::new(dir.path());
        store.put("k1", "job-1").unwrap();
        store.put("k2", "job-2").unwrap();

        let reopened = FileResumeStore::new(dir.path());
        assert_eq!(reopened.get("k1").unwrap().as_deref(), Some("job-1"));
        assert_eq!(reopened.get("k2").unwrap().as_deref(), Some("job-2"));
        assert_eq!(reopened.get("k3").unwrap(), None);
    }

    #[test]
    fn test_file_store_remove_and_remove_job() {
        let dir = TempDir::new().unwrap();
        let store = FileResumeStore::new(dir.path().join("nested"));
        store.put("k1", "job-1").unwrap();
        store.put("k2", "job-2").unwrap();
        store.put("k3", "job-2").unwrap();

        store.remove("k1").unwrap();
        assert_eq!(store.get("k1").unwrap(), None);

        store.remove_job("job-2").unwrap();
        assert_eq!(store.get("k2").unwrap(), None);
        assert_eq!(store.get("k3").unwrap(), None);
    }

    #[test]
    fn test_file_store_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let store = FileResumeStore::new(dir.path());
        store.put("k", "old").unwrap();
        store.put("k", "new").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(RESUME_FILE), "{not json").unwrap();
        let store = FileResumeStore::new(dir.path());
        assert!(matches!(store.get("k"), Err(CliError::ResumeStore(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryResumeStore::new();
        store.put("k", "job").unwrap();
        assert_eq!(store.len(), 1);
        store.remove_job("job").unwrap();
        assert!(store.is_empty());
    }
}
