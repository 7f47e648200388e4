//! Key manager lifecycle: initialization, rotation, grace windows,
//! concurrency, and persistence across restarts.

use futures::future::join_all;
use pqhe_core::{
    decrypt_with_keys, ErrorKind, KeyManager, KeyManagerConfig, Preset, RotationHistory,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn memory_config(grace_minutes: u64) -> KeyManagerConfig {
    KeyManagerConfig {
        enable_file_backup: false,
        rotation_grace_period_minutes: grace_minutes,
        ..Default::default()
    }
}

fn disk_config(dir: &Path) -> KeyManagerConfig {
    KeyManagerConfig {
        cert_path: dir.to_path_buf(),
        ..Default::default()
    }
}

fn read_history(dir: &Path) -> RotationHistory {
    let raw = std::fs::read_to_string(dir.join("rotation-history.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn grace_period_decrypts_with_previous_key() {
    let manager = KeyManager::with_config(memory_config(15)).unwrap();
    manager.initialize().await.unwrap();

    let value = json!({"x": 1});
    let envelope = manager.encrypt(&value).await.unwrap();

    manager.rotate_keys().await.unwrap();

    let keys = manager.get_decryption_keys().await.unwrap();
    assert_eq!(keys.len(), 2);

    // The current key no longer opens the old envelope; the previous one
    // (second in the list) does.
    let err = decrypt_with_keys(&envelope, &keys[..1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlgorithmSymmetric);
    assert_eq!(decrypt_with_keys(&envelope, &keys).unwrap(), value);

    // The manager-resolved path sees the same thing.
    assert_eq!(manager.decrypt(&envelope).await.unwrap(), value);
}

#[tokio::test]
async fn expired_grace_window_drops_previous_key() {
    let manager = KeyManager::with_config(memory_config(0)).unwrap();
    manager.initialize().await.unwrap();

    let envelope = manager.encrypt(&json!({"x": 1})).await.unwrap();
    manager.rotate_keys().await.unwrap();

    let keys = manager.get_decryption_keys().await.unwrap();
    assert_eq!(keys.len(), 1);

    let err = manager.decrypt(&envelope).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlgorithmSymmetric);
}

#[tokio::test]
async fn concurrent_rotations_coalesce_into_one() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    manager.initialize().await.unwrap();
    let before = manager.get_status().await.current_key_version.unwrap();

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            async move { manager.rotate_keys().await }
        })
        .collect();
    for outcome in join_all(callers).await {
        outcome.unwrap();
    }

    let status = manager.get_status().await;
    assert_eq!(status.current_key_version, Some(before + 1));
    assert!(!status.is_rotating);
    assert!(status.last_rotation.is_some());

    let history = read_history(tmp.path());
    assert_eq!(history.total_rotations, 2); // initial + exactly one rotation
    let versions: Vec<_> = history.rotations.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2]);
}

#[tokio::test]
async fn concurrent_initializers_coalesce() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = KeyManager::with_config(disk_config(tmp.path())).unwrap();

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            async move { manager.initialize().await }
        })
        .collect();
    for outcome in join_all(callers).await {
        outcome.unwrap();
    }

    assert_eq!(manager.get_status().await.current_key_version, Some(1));
    assert_eq!(read_history(tmp.path()).total_rotations, 1);
}

#[tokio::test]
async fn keys_persist_across_restart_and_versions_continue() {
    let tmp = tempfile::tempdir().unwrap();

    let first = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    first.initialize().await.unwrap();
    first.rotate_keys().await.unwrap();
    let public_before = first.get_public_key().await.unwrap();
    drop(first);

    let second = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    second.initialize().await.unwrap();
    assert_eq!(second.get_public_key().await.unwrap(), public_before);
    assert_eq!(second.get_status().await.current_key_version, Some(2));

    let metadata = second.rotate_keys().await.unwrap();
    assert_eq!(metadata.version, 3);
}

#[tokio::test]
async fn rotation_backs_up_retired_material() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    manager.initialize().await.unwrap();
    manager.rotate_keys().await.unwrap();

    let backups: Vec<_> = std::fs::read_dir(tmp.path().join("backup"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(
        backups.iter().any(|n| n.starts_with("expired-") && n.contains("-v1.")),
        "retired v1 files missing from backup/: {backups:?}"
    );
}

#[tokio::test]
async fn auto_generate_disabled_fails_on_empty_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = KeyManager::with_config(KeyManagerConfig {
        auto_generate: false,
        ..disk_config(tmp.path())
    })
    .unwrap();
    let err = manager.initialize().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyManager);
}

#[tokio::test]
async fn partial_on_disk_state_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let first = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    first.initialize().await.unwrap();
    drop(first);

    std::fs::remove_file(tmp.path().join("metadata.json")).unwrap();

    let second = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    let err = second.initialize().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyManager);
}

#[tokio::test]
async fn expired_keys_rotate_on_access() {
    let tmp = tempfile::tempdir().unwrap();
    let first = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    first.initialize().await.unwrap();
    let public_before = first.get_public_key().await.unwrap();
    drop(first);

    // Age the persisted metadata so the loaded pair is already expired.
    let metadata_path = tmp.path().join("metadata.json");
    let mut metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&metadata_path).unwrap()).unwrap();
    metadata["createdAt"] = json!("2020-01-01T00:00:00Z");
    metadata["expiresAt"] = json!("2020-02-01T00:00:00Z");
    std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata).unwrap()).unwrap();

    let second = KeyManager::with_config(disk_config(tmp.path())).unwrap();
    second.initialize().await.unwrap();

    let status = second.get_status().await;
    assert!(status.keys_expired);
    let report = second.health_check().await;
    assert!(!report.healthy);
    assert!(report.issues.iter().any(|i| i.contains("rotation needed")));

    // Reading the key pair heals the expiry by rotating in place.
    let pair = second.get_key_pair().await.unwrap();
    assert_eq!(pair.metadata.version, 2);
    assert_ne!(pair.public_key, public_before);
    assert!(!second.get_status().await.keys_expired);

    let history = read_history(tmp.path());
    assert_eq!(history.rotations.last().unwrap().reason.to_string(), "scheduled");
}

#[tokio::test]
async fn high_security_manager_round_trips() {
    let manager = KeyManager::with_config(KeyManagerConfig {
        preset: Preset::HighSecurity,
        ..memory_config(15)
    })
    .unwrap();
    manager.initialize().await.unwrap();

    let value = json!({"tier": "high"});
    let envelope = manager.encrypt(&value).await.unwrap();
    assert_eq!(envelope.preset, Preset::HighSecurity);
    assert_eq!(manager.decrypt(&envelope).await.unwrap(), value);

    let b64 = manager.get_public_key_base64().await.unwrap();
    let decoded = {
        use base64::{engine::general_purpose, Engine as _};
        general_purpose::STANDARD.decode(b64).unwrap()
    };
    assert_eq!(decoded.len(), Preset::HighSecurity.public_key_len());
}
