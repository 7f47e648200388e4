//! On-disk persistence for key material.
//!
//! Layout under the cert directory:
//! `public.key` / `secret.key` (raw bytes, secret at 0600),
//! `metadata.json`, `rotation-history.json`, `backup/` for retired
//! material, and an advisory `.lock` file. Every write goes through a
//! temp-file-then-rename with a sync before the rename, the same
//! discipline the rest of the crate uses for durable output.

use crate::config::KeyManagerConfig;
use crate::error::{Error, Result};
use crate::keypair::{KeyMetadata, KeyPair, SecretBytes};
use crate::security::{set_secure_dir_permissions, set_secure_file_permissions};
use chrono::{Datelike, Months, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const PUBLIC_KEY_FILE: &str = "public.key";
pub const SECRET_KEY_FILE: &str = "secret.key";
pub const METADATA_FILE: &str = "metadata.json";
pub const HISTORY_FILE: &str = "rotation-history.json";
pub const BACKUP_DIR: &str = "backup";
pub const LOCK_FILE: &str = ".lock";

/// Backups older than this many months are dropped by cleanup.
const BACKUP_RETENTION_MONTHS: u32 = 3;

enum StoreMode {
    Disk { dir: PathBuf },
    /// Inert store used when file backup is disabled: keys live only in
    /// this process.
    Memory { keys: Option<KeyPair> },
}

pub struct KeyStore {
    mode: StoreMode,
}

impl KeyStore {
    pub fn from_config(config: &KeyManagerConfig) -> Result<Self> {
        let mode = if config.enable_file_backup {
            StoreMode::Disk {
                dir: config.resolved_cert_path()?,
            }
        } else {
            StoreMode::Memory { keys: None }
        };
        Ok(KeyStore { mode })
    }

    /// Where the rotation history lives, when persistence is enabled.
    pub fn history_path(&self) -> Option<PathBuf> {
        match &self.mode {
            StoreMode::Disk { dir } => Some(dir.join(HISTORY_FILE)),
            StoreMode::Memory { .. } => None,
        }
    }

    pub fn cert_dir(&self) -> Option<&Path> {
        match &self.mode {
            StoreMode::Disk { dir } => Some(dir),
            StoreMode::Memory { .. } => None,
        }
    }

    /// Create the cert directory (0700) and take the advisory lock. Lock
    /// contention is logged, not fatal: the lock is advisory per the
    /// concurrency contract.
    pub async fn ensure_directory(&self) -> Result<()> {
        let StoreMode::Disk { dir } = &self.mode else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::manager_with("ensure_directory", "cert directory creation failed", e))?;
        set_secure_dir_permissions(dir)?;

        let lock_path = dir.join(LOCK_FILE);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(path = %lock_path.display(), "cert directory lock already held; concurrent managers over one path are unsupported");
            }
            Err(e) => {
                return Err(Error::manager_with("ensure_directory", "lock file creation failed", e));
            }
        }
        Ok(())
    }

    /// Drop the advisory lock, on controlled teardown.
    pub fn release_lock(&self) {
        if let StoreMode::Disk { dir } = &self.mode {
            let _ = std::fs::remove_file(dir.join(LOCK_FILE));
        }
    }

    /// Load the persisted key pair. All files absent means a fresh
    /// directory; a partial or unreadable set is an error, never a silent
    /// regeneration.
    pub async fn load_keys(&self) -> Result<Option<KeyPair>> {
        let dir = match &self.mode {
            StoreMode::Memory { keys } => return Ok(keys.clone()),
            StoreMode::Disk { dir } => dir,
        };

        let public_path = dir.join(PUBLIC_KEY_FILE);
        let secret_path = dir.join(SECRET_KEY_FILE);
        let metadata_path = dir.join(METADATA_FILE);

        let present = [&public_path, &secret_path, &metadata_path]
            .iter()
            .filter(|p| p.exists())
            .count();
        if present == 0 {
            return Ok(None);
        }
        if present != 3 {
            return Err(Error::manager(
                "load_keys",
                "partial key material on disk; refusing to regenerate over it",
            ));
        }

        let public_key = tokio::fs::read(&public_path)
            .await
            .map_err(|e| Error::manager_with("load_keys", "public key unreadable", e))?;
        let secret_key = tokio::fs::read(&secret_path)
            .await
            .map_err(|e| Error::manager_with("load_keys", "secret key unreadable", e))?;
        let metadata_raw = tokio::fs::read_to_string(&metadata_path)
            .await
            .map_err(|e| Error::manager_with("load_keys", "metadata unreadable", e))?;
        let metadata: KeyMetadata = serde_json::from_str(&metadata_raw)
            .map_err(|e| Error::manager_with("load_keys", "metadata corrupt", e))?;

        Ok(Some(KeyPair {
            public_key,
            secret_key: SecretBytes::new(secret_key),
            metadata,
        }))
    }

    /// Persist a key pair: temp file, sync, rename, per file; the secret
    /// key file is chmodded 0600 before it reaches its final name.
    pub async fn save_keys(&mut self, key_pair: &KeyPair) -> Result<()> {
        match &mut self.mode {
            StoreMode::Memory { keys } => {
                *keys = Some(key_pair.clone());
                Ok(())
            }
            StoreMode::Disk { dir } => {
                let metadata = serde_json::to_string_pretty(&key_pair.metadata)
                    .map_err(|e| Error::manager_with("save_keys", "metadata not serializable", e))?;
                write_atomic(dir, PUBLIC_KEY_FILE, &key_pair.public_key, false)?;
                write_atomic(dir, SECRET_KEY_FILE, key_pair.secret_key.as_slice(), true)?;
                write_atomic(dir, METADATA_FILE, metadata.as_bytes(), false)?;
                debug!(version = key_pair.metadata.version, "persisted key pair");
                Ok(())
            }
        }
    }

    /// Copy the current on-disk files into `backup/`, tagged with the
    /// retirement month and version, before they are overwritten.
    pub async fn backup_expired_keys(&self, retired: &KeyPair) -> Result<()> {
        let StoreMode::Disk { dir } = &self.mode else {
            return Ok(());
        };

        let backup_dir = dir.join(BACKUP_DIR);
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|e| Error::manager_with("backup_keys", "backup directory creation failed", e))?;
        set_secure_dir_permissions(&backup_dir)?;

        let tag = format!(
            "expired-{}-v{}",
            Utc::now().format("%Y-%m"),
            retired.metadata.version
        );
        for (file, secret) in [
            (PUBLIC_KEY_FILE, false),
            (SECRET_KEY_FILE, true),
            (METADATA_FILE, false),
        ] {
            let source = dir.join(file);
            if !source.exists() {
                continue;
            }
            let target = backup_dir.join(format!("{tag}.{file}"));
            tokio::fs::copy(&source, &target)
                .await
                .map_err(|e| Error::manager_with("backup_keys", format!("backup of {file} failed"), e))?;
            if secret {
                set_secure_file_permissions(&target)?;
            }
        }
        debug!(version = retired.metadata.version, %tag, "backed up retired key material");
        Ok(())
    }

    /// Remove backup entries older than the retention window. Returns how
    /// many files were removed; unparseable names are skipped with a
    /// warning.
    pub async fn cleanup_old_backups(&self) -> Result<usize> {
        let StoreMode::Disk { dir } = &self.mode else {
            return Ok(0);
        };
        let backup_dir = dir.join(BACKUP_DIR);
        if !backup_dir.exists() {
            return Ok(0);
        }

        let cutoff = Utc::now()
            .checked_sub_months(Months::new(BACKUP_RETENTION_MONTHS))
            .ok_or_else(|| Error::manager("cleanup_backups", "retention cutoff underflow"))?;
        let cutoff_month = (cutoff.year(), cutoff.month());

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&backup_dir)
            .await
            .map_err(|e| Error::manager_with("cleanup_backups", "backup directory unreadable", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::manager_with("cleanup_backups", "backup directory unreadable", e))?
        {
            let name = entry.file_name();
            let Some(month) = parse_backup_month(&name.to_string_lossy()) else {
                warn!(file = %name.to_string_lossy(), "unrecognized backup file name; skipping");
                continue;
            };
            if month < cutoff_month {
                tokio::fs::remove_file(entry.path())
                    .await
                    .map_err(|e| Error::manager_with("cleanup_backups", "backup removal failed", e))?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "removed expired backups");
        }
        Ok(removed)
    }
}

/// Extract `(year, month)` from an `expired-YYYY-MM-...` backup file name.
fn parse_backup_month(name: &str) -> Option<(i32, u32)> {
    let rest = name.strip_prefix("expired-")?;
    let year: i32 = rest.get(0..4)?.parse().ok()?;
    if rest.as_bytes().get(4) != Some(&b'-') {
        return None;
    }
    let month: u32 = rest.get(5..7)?.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year, month))
}

fn write_atomic(dir: &Path, file: &str, contents: &[u8], secret: bool) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| Error::manager_with("save_keys", "temp file creation failed", e))?;
    tmp.write_all(contents)
        .map_err(|e| Error::manager_with("save_keys", format!("write of {file} failed"), e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| Error::manager_with("save_keys", format!("sync of {file} failed"), e))?;
    if secret {
        set_secure_file_permissions(tmp.path())?;
    }
    tmp.persist(dir.join(file))
        .map_err(|e| Error::manager_with("save_keys", format!("rename of {file} failed"), e.error))?;
    Ok(())
}
