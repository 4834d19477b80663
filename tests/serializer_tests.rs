//! Tests for Serializer
//!
//! These tests verify:
//! - Variant selection from configuration
//! - Round-trip for all four variants, blocking and async
//! - Blocking and async paths read each other's files
//! - Atomic replacement and cancellation cleanup

use std::fs;
use std::path::Path;

use bytes::Bytes;
use tempfile::TempDir;
use vaultkv::codec;
use vaultkv::crypto::{self, Cipher};
use vaultkv::{
    CancellationToken, Config, KeyComparison, Mapping, Serializer, SerializerKind, VaultError,
};

// =============================================================================
// Helper Functions
// =============================================================================

const ALL_KINDS: [SerializerKind; 4] = [
    SerializerKind::Plain,
    SerializerKind::IgnoreCase,
    SerializerKind::Encrypted,
    SerializerKind::EncryptedIgnoreCase,
];

fn serializer_for(kind: SerializerKind, path: &Path) -> Serializer {
    let cipher = kind
        .is_encrypted()
        .then(|| Cipher::from_secret("secret").unwrap());
    Serializer::new(path, kind.comparison(), cipher, true)
}

fn sample_mapping(comparison: KeyComparison) -> Mapping {
    let mut mapping = Mapping::new(comparison);
    mapping.insert("Alpha", Bytes::from_static(&[1, 2, 3]));
    mapping.insert("beta", Bytes::from_static(&[]));
    mapping.insert("Gamma", Bytes::from(vec![0x5A; 200_000]));
    mapping
}

fn estimate(serializer: &Serializer, mapping: &Mapping) -> usize {
    let encoded = codec::encoded_len(mapping);
    if serializer.kind().is_encrypted() {
        crypto::ciphertext_len(encoded)
    } else {
        encoded
    }
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_from_config_selects_variant() {
    let cases = [
        (None, false, SerializerKind::Plain),
        (None, true, SerializerKind::IgnoreCase),
        (Some("k"), false, SerializerKind::Encrypted),
        (Some("k"), true, SerializerKind::EncryptedIgnoreCase),
    ];

    for (key, ignore_case, expected) in cases {
        let mut builder = Config::builder().path("store.db").ignore_case(ignore_case);
        if let Some(key) = key {
            builder = builder.encryption_key(key);
        }
        let serializer = Serializer::from_config(&builder.build()).unwrap();
        assert_eq!(serializer.kind(), expected);
        assert_eq!(serializer.comparison(), expected.comparison());
    }
}

#[test]
fn test_from_config_rejects_inconsistent_encryption() {
    let config = Config::builder()
        .path("store.db")
        .has_encryption(true)
        .build();

    assert!(matches!(
        Serializer::from_config(&config),
        Err(VaultError::Config(_))
    ));
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_roundtrip_all_variants() {
    let temp_dir = TempDir::new().unwrap();

    for kind in ALL_KINDS {
        let path = temp_dir.path().join(format!("{:?}.db", kind));
        let serializer = serializer_for(kind, &path);
        let mapping = sample_mapping(kind.comparison());

        serializer
            .serialize(&mapping, estimate(&serializer, &mapping))
            .unwrap();
        let loaded = serializer.deserialize(serializer.backing_len().unwrap()).unwrap();

        assert_eq!(loaded, mapping, "kind={:?}", kind);
        assert!(!temp_dir.path().join(format!("{:?}.db.tmp", kind)).exists());
    }
}

#[test]
fn test_estimate_is_only_a_hint() {
    let temp_dir = TempDir::new().unwrap();

    for kind in ALL_KINDS {
        let path = temp_dir.path().join(format!("{:?}.db", kind));
        let serializer = serializer_for(kind, &path);
        let mapping = sample_mapping(kind.comparison());

        serializer.serialize(&mapping, 0).unwrap();
        assert_eq!(serializer.deserialize(1).unwrap(), mapping, "kind={:?}", kind);
    }
}

#[test]
fn test_ignore_case_lookup_after_load() {
    let temp_dir = TempDir::new().unwrap();
    let serializer = serializer_for(SerializerKind::IgnoreCase, &temp_dir.path().join("s.db"));
    let mapping = sample_mapping(KeyComparison::OrdinalIgnoreCase);

    serializer.serialize(&mapping, 0).unwrap();
    let loaded = serializer.deserialize(0).unwrap();

    assert_eq!(loaded.get("ALPHA"), Some(&Bytes::from_static(&[1, 2, 3])));
    assert!(loaded.keys().any(|k| k == "Alpha"));
}

#[test]
fn test_missing_file_is_empty_mapping() {
    let temp_dir = TempDir::new().unwrap();

    for kind in ALL_KINDS {
        let serializer = serializer_for(kind, &temp_dir.path().join("absent.db"));
        let loaded = serializer.deserialize(0).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.comparison(), kind.comparison());
    }
}

#[test]
fn test_wrong_key_is_decryption_failure() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("s.db");
    let writer = serializer_for(SerializerKind::Encrypted, &path);
    writer
        .serialize(&sample_mapping(KeyComparison::Ordinal), 0)
        .unwrap();

    let reader = Serializer::new(
        &path,
        KeyComparison::Ordinal,
        Some(Cipher::from_secret("wrong").unwrap()),
        true,
    );
    assert!(matches!(
        reader.deserialize(0),
        Err(VaultError::DecryptionFailed(_))
    ));
}

#[test]
fn test_plain_file_read_as_encrypted_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("s.db");
    serializer_for(SerializerKind::Plain, &path)
        .serialize(&sample_mapping(KeyComparison::Ordinal), 0)
        .unwrap();

    let result = serializer_for(SerializerKind::Encrypted, &path).deserialize(0);
    assert!(matches!(result, Err(VaultError::DecryptionFailed(_))));
}

#[test]
fn test_serialize_replaces_previous_contents() {
    let temp_dir = TempDir::new().unwrap();
    let serializer = serializer_for(SerializerKind::Plain, &temp_dir.path().join("s.db"));

    serializer
        .serialize(&sample_mapping(KeyComparison::Ordinal), 0)
        .unwrap();
    let mut smaller = Mapping::new(KeyComparison::Ordinal);
    smaller.insert("only", Bytes::from_static(&[1]));
    serializer.serialize(&smaller, 0).unwrap();

    assert_eq!(serializer.deserialize(0).unwrap(), smaller);
    assert_eq!(
        fs::metadata(serializer.path()).unwrap().len() as usize,
        codec::encoded_len(&smaller)
    );
}

// =============================================================================
// Async Tests
// =============================================================================

#[tokio::test]
async fn test_async_roundtrip_all_variants() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    for kind in ALL_KINDS {
        let path = temp_dir.path().join(format!("{:?}.db", kind));
        let serializer = serializer_for(kind, &path);
        let mapping = sample_mapping(kind.comparison());

        serializer
            .serialize_async(&mapping, estimate(&serializer, &mapping), &cancel)
            .await
            .unwrap();
        let len = serializer.backing_len_async().await.unwrap();
        let loaded = serializer.deserialize_async(len, &cancel).await.unwrap();

        assert_eq!(loaded, mapping, "kind={:?}", kind);
    }
}

#[tokio::test]
async fn test_sync_and_async_are_equivalent() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    for kind in ALL_KINDS {
        let mapping = sample_mapping(kind.comparison());
        let sync_path = temp_dir.path().join(format!("{:?}-sync.db", kind));
        let async_path = temp_dir.path().join(format!("{:?}-async.db", kind));
        let sync_serializer = serializer_for(kind, &sync_path);
        let async_serializer = serializer_for(kind, &async_path);

        sync_serializer.serialize(&mapping, 0).unwrap();
        async_serializer
            .serialize_async(&mapping, 0, &cancel)
            .await
            .unwrap();

        // Plain output is deterministic; encrypted output differs by nonce
        if !kind.is_encrypted() {
            assert_eq!(fs::read(&sync_path).unwrap(), fs::read(&async_path).unwrap());
        }

        // Each path reads the other's file
        let from_async = async_serializer.deserialize(0).unwrap();
        let from_sync = sync_serializer
            .deserialize_async(0, &cancel)
            .await
            .unwrap();
        assert_eq!(from_async, mapping, "kind={:?}", kind);
        assert_eq!(from_sync, mapping, "kind={:?}", kind);
    }
}

#[tokio::test]
async fn test_cancelled_serialize_leaves_file_intact() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("s.db");
    let serializer = serializer_for(SerializerKind::Encrypted, &path);
    let original = sample_mapping(KeyComparison::Ordinal);
    serializer.serialize(&original, 0).unwrap();
    let before = fs::read(&path).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut replacement = Mapping::new(KeyComparison::Ordinal);
    replacement.insert("new", Bytes::from_static(&[1]));

    let result = serializer.serialize_async(&replacement, 0, &cancel).await;

    assert!(matches!(result, Err(VaultError::Cancelled)));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!temp_dir.path().join("s.db.tmp").exists());
}

#[tokio::test]
async fn test_cancelled_deserialize() {
    let temp_dir = TempDir::new().unwrap();
    let serializer = serializer_for(SerializerKind::Plain, &temp_dir.path().join("s.db"));
    serializer
        .serialize(&sample_mapping(KeyComparison::Ordinal), 0)
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        serializer.deserialize_async(0, &cancel).await,
        Err(VaultError::Cancelled)
    ));
}

// =============================================================================
// Temp File Tests
// =============================================================================

#[test]
fn test_remove_stale_temp() {
    let temp_dir = TempDir::new().unwrap();
    let serializer = serializer_for(SerializerKind::Plain, &temp_dir.path().join("s.db"));
    let tmp = temp_dir.path().join("s.db.tmp");
    fs::write(&tmp, b"leftover").unwrap();

    serializer.remove_stale_temp();

    assert!(!tmp.exists());
}
