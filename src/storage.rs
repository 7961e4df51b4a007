//! Client-side persistent storage
//!
//! This module provides:
//! - A small key-value [`Storage`] trait
//! - File-backed storage (one file per key) under the local data dir
//! - In-memory storage for tests and throwaway sessions

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Synchronous key-value persistence.
///
/// Implementations never fail loudly: a read that cannot be served returns
/// `None`, and a write that cannot be performed is logged and dropped.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
}

// ============================================
// File Backend
// ============================================

/// File-per-key storage. Without a directory it is detached and behaves as
/// if nothing was ever stored.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: Option<PathBuf>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Storage under `<local data dir>/parley/storage`, detached when the
    /// platform has no data dir.
    pub fn default_location() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }

    pub fn detached() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", sanitize_key(key))))
    }
}

fn default_storage_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|data_dir| data_dir.join("parley").join("storage"))
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let path = self.path_for(key)?;
        fs::read_to_string(path).ok()
    }

    fn set_item(&self, key: &str, value: &str) {
        let (Some(dir), Some(path)) = (self.dir.as_ref(), self.path_for(key)) else {
            return;
        };
        if let Err(err) = fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), "failed to create storage directory: {err}");
            return;
        }
        if let Err(err) = fs::write(&path, value) {
            tracing::warn!(path = %path.display(), "failed to write to storage: {err}");
        }
    }

    fn remove_item(&self, key: &str) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        if path.exists()
            && let Err(err) = fs::remove_file(&path)
        {
            tracing::warn!(path = %path.display(), "failed to delete from storage: {err}");
        }
    }
}

/// Sanitize storage key for filesystem use
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}

// ============================================
// Memory Backend
// ============================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn remove_item(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}
