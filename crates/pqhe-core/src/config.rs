//! Key manager configuration.

use crate::error::{Error, Result};
use crate::preset::Preset;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CERT_PATH: &str = "./config/certs/keys";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyManagerConfig {
    pub preset: Preset,
    /// Directory holding key material. Relative paths resolve under the
    /// process working directory and must not traverse out of it; absolute
    /// paths are the production override.
    pub cert_path: PathBuf,
    /// Must be positive.
    pub key_expiry_months: u32,
    /// When false, absence of on-disk keys is a fatal initialization error.
    pub auto_generate: bool,
    /// When false, storage becomes an inert in-memory store.
    pub enable_file_backup: bool,
    pub rotation_grace_period_minutes: u64,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        KeyManagerConfig {
            preset: Preset::Normal,
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_expiry_months: 1,
            auto_generate: true,
            enable_file_backup: true,
            rotation_grace_period_minutes: 15,
        }
    }
}

impl KeyManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key_expiry_months == 0 {
            return Err(Error::config("keyExpiryMonths must be positive"));
        }
        if self.cert_path.as_os_str().is_empty() {
            return Err(Error::config("certPath must not be empty"));
        }
        if self.cert_path.is_relative() && escapes_working_directory(&self.cert_path) {
            return Err(Error::config(format!(
                "certPath {} traverses outside the working directory",
                self.cert_path.display()
            )));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.rotation_grace_period_minutes * 60)
    }

    /// Absolute directory the store operates on.
    pub(crate) fn resolved_cert_path(&self) -> Result<PathBuf> {
        if self.cert_path.is_absolute() {
            return Ok(self.cert_path.clone());
        }
        let cwd = std::env::current_dir()
            .map_err(|e| Error::manager_with("resolve_cert_path", "working directory unavailable", e))?;
        Ok(cwd.join(&self.cert_path))
    }
}

/// True when a relative path climbs above its starting directory at any
/// point while being walked.
fn escapes_working_directory(path: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}
