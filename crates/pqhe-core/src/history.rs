//! Append-only rotation history, persisted as `rotation-history.json`.

use crate::error::{Error, Result};
use crate::keypair::KeyMetadata;
use crate::preset::Preset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    Initial,
    Scheduled,
    Manual,
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RotationReason::Initial => "initial",
            RotationReason::Scheduled => "scheduled",
            RotationReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationHistoryEntry {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub preset: Preset,
    pub rotated_at: DateTime<Utc>,
    pub reason: RotationReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationHistory {
    pub total_rotations: u64,
    /// Ordered by `rotated_at`, oldest first.
    pub rotations: Vec<RotationHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RotationHistory {
    fn new() -> Self {
        let now = Utc::now();
        RotationHistory {
            total_rotations: 0,
            rotations: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    pub fn max_version(&self) -> u64 {
        self.rotations.iter().map(|e| e.version).max().unwrap_or(0)
    }
}

/// Persistent append log with an in-process cache. The cache is dropped on
/// every write and bypassed whenever the on-disk file is newer than the
/// cached copy.
pub struct HistoryLog {
    path: Option<PathBuf>,
    cache: Option<RotationHistory>,
    /// Backing store when persistence is disabled.
    memory: RotationHistory,
}

impl HistoryLog {
    pub fn persistent(path: PathBuf) -> Self {
        HistoryLog {
            path: Some(path),
            cache: None,
            memory: RotationHistory::new(),
        }
    }

    pub fn in_memory() -> Self {
        HistoryLog {
            path: None,
            cache: None,
            memory: RotationHistory::new(),
        }
    }

    pub fn load(&mut self) -> Result<RotationHistory> {
        let Some(path) = self.path.clone() else {
            return Ok(self.memory.clone());
        };

        if let Some(cached) = &self.cache {
            if !disk_is_newer(&path, cached.last_updated)? {
                return Ok(cached.clone());
            }
        }

        let history = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| {
                Error::manager_with("load_history", "rotation history unreadable", e)
            })?;
            serde_json::from_str(&data).map_err(|e| {
                Error::manager_with("load_history", "rotation history corrupt", e)
            })?
        } else {
            RotationHistory::new()
        };
        self.cache = Some(history.clone());
        Ok(history)
    }

    /// Next strictly-monotonic version: max recorded + 1, or 1 when empty.
    pub fn next_version(&mut self) -> Result<u64> {
        Ok(self.load()?.max_version() + 1)
    }

    /// Append an entry for a newly published key pair.
    pub fn update_history(
        &mut self,
        metadata: &KeyMetadata,
        reason: RotationReason,
    ) -> Result<RotationHistoryEntry> {
        let mut history = self.load()?;
        if metadata.version <= history.max_version() {
            return Err(Error::manager(
                "update_history",
                format!(
                    "version {} is not above the recorded maximum {}",
                    metadata.version,
                    history.max_version()
                ),
            ));
        }

        let entry = RotationHistoryEntry {
            version: metadata.version,
            created_at: metadata.created_at,
            expires_at: metadata.expires_at,
            preset: metadata.preset,
            rotated_at: Utc::now(),
            reason,
        };
        history.rotations.push(entry.clone());
        history.total_rotations += 1;
        history.last_updated = entry.rotated_at;

        match &self.path {
            Some(path) => {
                write_atomic(path, &history)?;
                self.cache = None;
            }
            None => self.memory = history,
        }
        Ok(entry)
    }
}

fn disk_is_newer(path: &PathBuf, cached_at: DateTime<Utc>) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let modified = meta.modified().map_err(|e| {
                Error::manager_with("load_history", "history mtime unavailable", e)
            })?;
            Ok(DateTime::<Utc>::from(modified) > cached_at)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::manager_with("load_history", "history stat failed", e)),
    }
}

fn write_atomic(path: &PathBuf, history: &RotationHistory) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut tmp = NamedTempFile::new_in(&dir)
        .map_err(|e| Error::manager_with("update_history", "temp file creation failed", e))?;
    let data = serde_json::to_string_pretty(history)
        .map_err(|e| Error::manager_with("update_history", "history not serializable", e))?;
    tmp.write_all(data.as_bytes())
        .map_err(|e| Error::manager_with("update_history", "history write failed", e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| Error::manager_with("update_history", "history sync failed", e))?;
    tmp.persist(path)
        .map_err(|e| Error::manager_with("update_history", "history rename failed", e.error))?;
    Ok(())
}
