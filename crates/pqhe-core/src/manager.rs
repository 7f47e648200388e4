//! Process-wide key manager: initialization, accessors, rotation with a
//! bounded grace window, status and health reporting.
//!
//! All public operations are individually atomic behind one async mutex.
//! Rotation coalesces: callers that queued behind an in-flight rotation
//! observe its outcome instead of starting another one, so N concurrent
//! `rotate_keys` calls advance the version by exactly one.

use crate::config::KeyManagerConfig;
use crate::engine;
use crate::envelope::EncryptedEnvelope;
use crate::error::{Error, Result};
use crate::history::{HistoryLog, RotationReason};
use crate::keypair::{KeyMetadata, KeyPair, SecretBytes};
use crate::storage::KeyStore;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

static INSTANCE: Lazy<StdMutex<Option<Arc<KeyManager>>>> = Lazy::new(|| StdMutex::new(None));

fn instance_slot() -> std::sync::MutexGuard<'static, Option<Arc<KeyManager>>> {
    INSTANCE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// True when the manager has no usable current key: nothing loaded yet, or
/// the pair has passed its expiry.
pub fn needs_rotation(current: Option<&KeyPair>, now: DateTime<Utc>) -> bool {
    match current {
        None => true,
        Some(kp) => kp.is_expired(now),
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyManagerStatus {
    pub has_keys: bool,
    pub keys_valid: bool,
    pub keys_expired: bool,
    pub is_rotating: bool,
    pub current_key_version: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cert_path: String,
    pub last_rotation: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
}

struct RotationState {
    previous: Option<KeyPair>,
    started_at: Option<Instant>,
    cleanup: Option<JoinHandle<()>>,
    /// Ties a scheduled cleanup to the rotation that spawned it, so a
    /// cleanup that lost an abort race cannot retire a newer previous pair.
    rotation_id: u64,
}

struct ManagerState {
    initialized: bool,
    store: KeyStore,
    history: HistoryLog,
    current: Option<KeyPair>,
    rotation: RotationState,
    last_rotation: Option<DateTime<Utc>>,
}

pub struct KeyManager {
    config: KeyManagerConfig,
    state: Mutex<ManagerState>,
    /// Bumped once per completed rotation; used for coalescing.
    rotation_epoch: AtomicU64,
    rotating: AtomicBool,
    weak_self: Weak<KeyManager>,
}

impl KeyManager {
    /// Construct a standalone manager. Library users normally go through
    /// [`KeyManager::get_instance`]; this constructor exists for tests and
    /// embedders that manage their own lifetime.
    pub fn with_config(config: KeyManagerConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let store = KeyStore::from_config(&config)?;
        let history = match store.history_path() {
            Some(path) => HistoryLog::persistent(path),
            None => HistoryLog::in_memory(),
        };
        Ok(Arc::new_cyclic(|weak| KeyManager {
            config,
            state: Mutex::new(ManagerState {
                initialized: false,
                store,
                history,
                current: None,
                rotation: RotationState {
                    previous: None,
                    started_at: None,
                    cleanup: None,
                    rotation_id: 0,
                },
                last_rotation: None,
            }),
            rotation_epoch: AtomicU64::new(0),
            rotating: AtomicBool::new(false),
            weak_self: weak.clone(),
        }))
    }

    /// Process-wide singleton. The first call constructs the instance from
    /// `config` (or defaults); later calls return the existing instance and
    /// ignore `config`.
    pub fn get_instance(config: Option<KeyManagerConfig>) -> Result<Arc<Self>> {
        let mut slot = instance_slot();
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let manager = Self::with_config(config.unwrap_or_default())?;
        *slot = Some(Arc::clone(&manager));
        Ok(manager)
    }

    /// Tear down the singleton: abort the pending grace cleanup, wipe all
    /// held key material, release the storage lock, clear the slot.
    pub async fn reset_instance() {
        let taken = instance_slot().take();
        if let Some(manager) = taken {
            manager.teardown().await;
        }
    }

    async fn teardown(&self) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.rotation.cleanup.take() {
            handle.abort();
        }
        if let Some(mut previous) = state.rotation.previous.take() {
            previous.wipe_secret();
        }
        if let Some(mut current) = state.current.take() {
            current.wipe_secret();
        }
        state.rotation.started_at = None;
        state.store.release_lock();
        state.initialized = false;
    }

    /// Idempotent initialization: ensure the cert directory, load persisted
    /// keys or generate the initial pair, validate, mark ready. Concurrent
    /// callers coalesce on the internal lock.
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(());
        }

        // Best effort; secret material should never land in a core dump.
        crate::security::disable_core_dumps().ok();

        self.config.validate()?;
        state.store.ensure_directory().await?;

        match state.store.load_keys().await? {
            Some(loaded) => {
                loaded.validate()?;
                info!(
                    version = loaded.metadata.version,
                    fingerprint = %loaded.fingerprint(),
                    "loaded persisted key pair"
                );
                state.last_rotation = state.history.load()?.rotations.last().map(|e| e.rotated_at);
                state.current = Some(loaded);
            }
            None => {
                if !self.config.auto_generate {
                    return Err(Error::manager(
                        "initialize",
                        "no keys on disk and autoGenerate is disabled",
                    ));
                }
                let version = state.history.next_version()?;
                let generated =
                    KeyPair::generate(self.config.preset, version, self.config.key_expiry_months)?;
                state.store.save_keys(&generated).await?;
                let entry = state
                    .history
                    .update_history(&generated.metadata, RotationReason::Initial)?;
                info!(
                    version,
                    fingerprint = %generated.fingerprint(),
                    "generated initial key pair"
                );
                state.last_rotation = Some(entry.rotated_at);
                state.current = Some(generated);
            }
        }

        state.initialized = true;
        Ok(())
    }

    /// Manual rotation trigger. Callers that arrive while a rotation is in
    /// flight join its outcome.
    pub async fn rotate_keys(&self) -> Result<KeyMetadata> {
        let observed_epoch = self.rotation_epoch.load(Ordering::Acquire);
        let mut state = self.state.lock().await;
        if !state.initialized {
            return Err(Error::manager("rotate_keys", "manager not initialized"));
        }
        if self.rotation_epoch.load(Ordering::Acquire) != observed_epoch {
            debug!("rotation coalesced with a concurrent caller");
            return state
                .current
                .as_ref()
                .map(|kp| kp.metadata)
                .ok_or_else(|| Error::manager("rotate_keys", "no current key after rotation"));
        }
        self.rotate_locked(&mut state, RotationReason::Manual).await
    }

    async fn rotate_locked(
        &self,
        state: &mut ManagerState,
        reason: RotationReason,
    ) -> Result<KeyMetadata> {
        self.rotating.store(true, Ordering::SeqCst);
        let result = self.rotate_inner(state, reason).await;
        self.rotating.store(false, Ordering::SeqCst);
        result
    }

    async fn rotate_inner(
        &self,
        state: &mut ManagerState,
        reason: RotationReason,
    ) -> Result<KeyMetadata> {
        let started_at = Instant::now();
        let current_version = state.current.as_ref().map(|kp| kp.metadata.version).unwrap_or(0);
        let next_version = state.history.next_version()?.max(current_version + 1);

        let new_pair =
            KeyPair::generate(self.config.preset, next_version, self.config.key_expiry_months)?;

        // Everything up to the publish below leaves the prior state intact
        // on failure; the fresh pair is wiped when dropped.
        if let Some(current) = state.current.as_ref() {
            state.store.backup_expired_keys(current).await?;
        }
        state.store.save_keys(&new_pair).await?;
        let entry = state.history.update_history(&new_pair.metadata, reason)?;

        if let Err(e) = state.store.cleanup_old_backups().await {
            tracing::warn!(error = %e, "backup cleanup failed; continuing");
        }

        // Publish: new pair becomes current, the old one enters its grace
        // window, any cleanup scheduled for an earlier rotation is void.
        let metadata = new_pair.metadata;
        let previous = state.current.replace(new_pair);
        if let Some(handle) = state.rotation.cleanup.take() {
            handle.abort();
        }
        if let Some(mut stale) = state.rotation.previous.take() {
            stale.wipe_secret();
        }
        state.rotation.previous = previous;
        state.rotation.started_at = Some(started_at);
        state.rotation.rotation_id += 1;
        state.last_rotation = Some(entry.rotated_at);
        self.rotation_epoch.fetch_add(1, Ordering::Release);

        if state.rotation.previous.is_some() {
            let grace = self.config.grace_period();
            let rotation_id = state.rotation.rotation_id;
            let weak = self.weak_self.clone();
            state.rotation.cleanup = Some(tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                if let Some(manager) = weak.upgrade() {
                    manager.clear_grace(rotation_id).await;
                }
            }));
        }

        info!(version = metadata.version, reason = %reason, "rotated key pair");
        Ok(metadata)
    }

    async fn clear_grace(&self, rotation_id: u64) {
        let mut state = self.state.lock().await;
        if state.rotation.rotation_id != rotation_id {
            return;
        }
        if let Some(mut previous) = state.rotation.previous.take() {
            previous.wipe_secret();
            debug!("grace period ended; retired previous key pair");
        }
        state.rotation.started_at = None;
        state.rotation.cleanup = None;
    }

    fn in_grace_locked(&self, state: &ManagerState) -> bool {
        match (&state.rotation.previous, state.rotation.started_at) {
            (Some(_), Some(started)) => started.elapsed() < self.config.grace_period(),
            _ => false,
        }
    }

    /// Rotate in place when the current pair is missing or expired, so
    /// readers never observe stale keys.
    async fn ensure_valid_locked(&self, state: &mut ManagerState) -> Result<()> {
        if !state.initialized {
            return Err(Error::manager("ensure_valid_keys", "manager not initialized"));
        }
        if needs_rotation(state.current.as_ref(), Utc::now()) {
            self.rotate_locked(state, RotationReason::Scheduled).await?;
        }
        match state.current.as_ref() {
            Some(kp) => kp.validate(),
            None => Err(Error::manager("ensure_valid_keys", "no current key pair")),
        }
    }

    /// Current key pair, rotating first if it has expired.
    pub async fn get_key_pair(&self) -> Result<KeyPair> {
        let mut state = self.state.lock().await;
        self.ensure_valid_locked(&mut state).await?;
        state
            .current
            .clone()
            .ok_or_else(|| Error::manager("get_key_pair", "no current key pair"))
    }

    pub async fn get_public_key(&self) -> Result<Vec<u8>> {
        Ok(self.get_key_pair().await?.public_key)
    }

    pub async fn get_public_key_base64(&self) -> Result<String> {
        Ok(general_purpose::STANDARD.encode(self.get_public_key().await?))
    }

    /// Fails if no secret material is held, which cannot happen after a
    /// successful `initialize`.
    pub async fn get_secret_key(&self) -> Result<SecretBytes> {
        let pair = self.get_key_pair().await?;
        if pair.secret_key.is_empty() {
            return Err(Error::manager("get_secret_key", "no secret key material"));
        }
        Ok(pair.secret_key)
    }

    pub async fn get_secret_key_base64(&self) -> Result<String> {
        Ok(general_purpose::STANDARD.encode(self.get_secret_key().await?.as_slice()))
    }

    /// Keys to try for decryption: the current secret first, then the
    /// previous one while its grace window is open. The grace predicate is
    /// evaluated live, independent of the scheduled cleanup task.
    pub async fn get_decryption_keys(&self) -> Result<Vec<SecretBytes>> {
        let state = self.state.lock().await;
        if !state.initialized {
            return Err(Error::manager("get_decryption_keys", "manager not initialized"));
        }
        let current = state
            .current
            .as_ref()
            .ok_or_else(|| Error::manager("get_decryption_keys", "no current key pair"))?;
        let mut keys = vec![current.secret_key.clone()];
        if self.in_grace_locked(&state) {
            if let Some(previous) = state.rotation.previous.as_ref() {
                keys.push(previous.secret_key.clone());
            }
        }
        Ok(keys)
    }

    /// Encrypt a value to this manager's current public key.
    pub async fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncryptedEnvelope> {
        let pair = self.get_key_pair().await?;
        engine::encrypt(value, &pair.public_key, pair.metadata.preset)
    }

    /// Decrypt an envelope, resolving secret keys through
    /// [`KeyManager::get_decryption_keys`] (grace-period fallback included).
    pub async fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<Value> {
        let keys = self.get_decryption_keys().await?;
        engine::decrypt_with_keys(envelope, &keys)
    }

    pub async fn get_status(&self) -> KeyManagerStatus {
        let is_rotating = self.rotating.load(Ordering::SeqCst);
        let state = self.state.lock().await;
        let now = Utc::now();
        let current = state.current.as_ref();
        KeyManagerStatus {
            has_keys: current.is_some(),
            keys_valid: current.map(|kp| kp.validation_issues().is_empty()).unwrap_or(false),
            keys_expired: current.map(|kp| kp.is_expired(now)).unwrap_or(false),
            is_rotating,
            current_key_version: current.map(|kp| kp.metadata.version),
            created_at: current.map(|kp| kp.metadata.created_at),
            expires_at: current.map(|kp| kp.metadata.expires_at),
            cert_path: self.config.cert_path.display().to_string(),
            last_rotation: state.last_rotation,
        }
    }

    pub async fn health_check(&self) -> HealthReport {
        let state = self.state.lock().await;
        let mut issues = Vec::new();
        if !state.initialized {
            issues.push("manager not initialized".to_string());
        }
        match state.current.as_ref() {
            None => issues.push("no key material held".to_string()),
            Some(kp) => {
                for issue in kp.validation_issues() {
                    issues.push(format!("key validation: {issue}"));
                }
                if kp.is_expired(Utc::now()) {
                    issues.push("current key pair is expired; rotation needed".to_string());
                }
            }
        }
        HealthReport {
            healthy: issues.is_empty(),
            issues,
        }
    }

    pub fn config(&self) -> &KeyManagerConfig {
        &self.config
    }
}
