//! Remembers which task identities have already completed.

use crate::config;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// The file inside [config::config_dir] used by [FileStore::open_default].
pub const STORE_FILE: &str = "completed.yaml";

/// Persists the "already completed" marker for task identities across runs.
///
/// Identities are the task type ids, e.g. `setup-git-ssh[1]`.
pub trait CompletionStore {
    /// Returns whether `type_id` has been marked completed.
    fn is_completed(&self, type_id: &str) -> Result<bool>;

    /// Marks `type_id` as completed. Marking an identity twice is not an error.
    fn mark_completed(&self, type_id: &str) -> Result<()>;
}

/// The on-disk layout of a [FileStore].
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
struct Completed {
    /// Completed identities and when they completed, in completion order.
    #[serde(default)]
    completed: IndexMap<String, DateTime<Utc>>,
}

/// A [CompletionStore] backed by a YAML file.
///
/// The file is re-read on every query, so several stores (or processes) pointing at the same file
/// observe each other's markers. A missing file means nothing has completed yet.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,

    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store backed by `path`. The file is created on the first [Self::mark_completed].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store at `<config_dir>/completed.yaml`.
    pub fn open_default() -> Self {
        Self::new(config::config_dir().join(STORE_FILE))
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns every completed identity with its completion time, oldest first.
    pub fn completed(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        Ok(self.load()?.completed.into_iter().collect())
    }

    fn load(&self) -> Result<Completed> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Completed::default()),
            Err(e) => return Err(self.error(e)),
        };
        if text.trim().is_empty() {
            return Ok(Completed::default());
        }
        serde_yaml::from_str(&text).map_err(|e| self.error(e))
    }

    /// Replaces the file atomically: the new content goes to a sibling temporary file, which is
    /// synced and then renamed over the old one. A crash leaves either the old or the new content.
    fn save(&self, completed: &Completed) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let yaml = serde_yaml::to_string(completed).map_err(|e| self.error(e))?;

        let temp_path = self.temp_path();
        let mut file = File::create(&temp_path).map_err(|e| self.error(e))?;
        file.write_all(yaml.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| self.error(e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| self.error(e))
    }

    /// `<path>.tmp`, next to the store file so the rename stays on one file system.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn error(&self, reason: impl ToString) -> Error {
        Error::Store {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl CompletionStore for FileStore {
    fn is_completed(&self, type_id: &str) -> Result<bool> {
        Ok(self.load()?.completed.contains_key(type_id))
    }

    fn mark_completed(&self, type_id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut completed = self.load()?;
        if completed.completed.contains_key(type_id) {
            return Ok(());
        }
        completed.completed.insert(type_id.to_string(), Utc::now());
        self.save(&completed)?;
        debug!("Marked {type_id} completed in {}", self.path.display());
        Ok(())
    }
}

/// A [CompletionStore] that lives only as long as the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    completed: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletionStore for MemoryStore {
    fn is_completed(&self, type_id: &str) -> Result<bool> {
        let completed = self.completed.lock().unwrap_or_else(|p| p.into_inner());
        Ok(completed.iter().any(|id| id == type_id))
    }

    fn mark_completed(&self, type_id: &str) -> Result<()> {
        let mut completed = self.completed.lock().unwrap_or_else(|p| p.into_inner());
        if !completed.iter().any(|id| id == type_id) {
            completed.push(type_id.to_string());
        }
        Ok(())
    }
}
