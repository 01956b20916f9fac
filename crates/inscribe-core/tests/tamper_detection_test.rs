//! Tamper detection: the verifier must reject any change to artifacts,
//! batch order or the integrity block.

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use inscribe_core::crypto::{compute_root_hash, jcs, sha256_hex};
use inscribe_core::{
    run_pipeline, verify_manifest, ContentGroup, ContentUnit, ErrorKind, Manifest, MemoryCatalog,
    PackConfig, Step, MANIFEST_FILE,
};
use serde_json::json;
use std::io::{Read, Write};
use std::path::Path;

async fn fresh_run(dir: &Path) -> Manifest {
    let groups = (0..6)
        .map(|g| {
            let units = (0..30)
                .map(|n| ContentUnit::new(json!({"group": g, "n": n, "text": "sealed record"})))
                .collect();
            ContentGroup::new(format!("group{}", g), format!("Group {}", g), units)
        })
        .collect();
    let cfg = PackConfig {
        max_batch_size_bytes: 2_500,
        output_dir: dir.to_path_buf(),
        ..PackConfig::default()
    };
    let outcome = run_pipeline(&MemoryCatalog::new(groups), &cfg).await.unwrap();
    assert!(outcome.manifest.batches.len() >= 3);
    outcome.manifest
}

fn rewrite_manifest(dir: &Path, manifest: &Manifest) {
    std::fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(manifest).unwrap(),
    )
    .unwrap();
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(Vec::new(), Compression::best());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

fn assert_integrity_failure(dir: &Path, subject: &str) {
    let err = verify_manifest(dir).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity, "{}", err);
    assert_eq!(err.step, Step::Verify);
    assert_eq!(err.subject, subject, "{}", err);
}

#[tokio::test]
async fn fresh_run_verifies() {
    let dir = tempfile::tempdir().unwrap();
    fresh_run(dir.path()).await;
    verify_manifest(dir.path()).unwrap();
}

#[tokio::test]
async fn one_bit_flip_in_artifact_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = fresh_run(dir.path()).await;
    let target = &manifest.batches[1];

    let path = dir.path().join(&target.artifact_path);
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    std::fs::write(&path, bytes).unwrap();

    assert_integrity_failure(dir.path(), &target.batch_id);
}

#[tokio::test]
async fn recompressed_forged_content_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;

    // Forge new content but keep transport fields consistent, so only the
    // content hash can catch it.
    let forged = gzip(br#"{"batch_id":"batch_001","entries":[]}"#);
    let target = &mut manifest.batches[0];
    std::fs::write(dir.path().join(&target.artifact_path), &forged).unwrap();
    target.compressed_size_bytes = forged.len() as u64;
    target.compressed_hash_hex = sha256_hex(&forged);
    let id = target.batch_id.clone();
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), &id);
}

#[tokio::test]
async fn swapped_batches_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;

    manifest.batches.swap(0, 1);
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), MANIFEST_FILE);
}

#[tokio::test]
async fn reordered_leaves_with_recomputed_root_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;

    manifest.integrity.leaf_hash_hex.swap(0, 1);
    manifest.integrity.root_hash_hex =
        compute_root_hash(&manifest.integrity.leaf_hash_hex).unwrap();
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), MANIFEST_FILE);
}

#[tokio::test]
async fn forged_root_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;

    manifest.integrity.root_hash_hex = sha256_hex(b"forged");
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), MANIFEST_FILE);
}

#[tokio::test]
async fn escaping_artifact_path_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;

    manifest.batches[0].artifact_path = "../outside.json.gz".into();
    let id = manifest.batches[0].batch_id.clone();
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), &id);
}

#[tokio::test]
async fn missing_artifact_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = fresh_run(dir.path()).await;

    std::fs::remove_file(dir.path().join(&manifest.batches[2].artifact_path)).unwrap();

    let err = verify_manifest(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.subject, manifest.batches[2].batch_id);
}

#[tokio::test]
async fn forged_uncompressed_size_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;

    manifest.batches[0].uncompressed_size_bytes = 999_999_999;
    let id = manifest.batches[0].batch_id.clone();
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), &id);
}

#[tokio::test]
async fn forged_oversized_flag_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;

    assert!(!manifest.batches[1].oversized);
    manifest.batches[1].oversized = true;
    let id = manifest.batches[1].batch_id.clone();
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), &id);
}

#[tokio::test]
async fn document_group_ids_must_match_its_groups() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = fresh_run(dir.path()).await;
    let target = &mut manifest.batches[0];
    let artifact = dir.path().join(&target.artifact_path);

    let mut decoded = Vec::new();
    GzDecoder::new(std::fs::File::open(&artifact).unwrap())
        .read_to_end(&mut decoded)
        .unwrap();
    let mut doc: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
    doc["group_ids"][0] = json!("forged");

    // Reseal every hash so only the document's own structure is inconsistent.
    let canonical = jcs::to_vec(&doc).unwrap();
    let compressed = gzip(&canonical);
    std::fs::write(&artifact, &compressed).unwrap();
    target.included_group_ids[0] = "forged".into();
    target.canonical_size_bytes = canonical.len() as u64;
    target.content_hash_hex = sha256_hex(&canonical);
    target.compressed_size_bytes = compressed.len() as u64;
    target.compressed_hash_hex = sha256_hex(&compressed);
    let id = target.batch_id.clone();
    manifest.integrity.leaf_hash_hex[0] = manifest.batches[0].content_hash_hex.clone();
    manifest.integrity.root_hash_hex =
        compute_root_hash(&manifest.integrity.leaf_hash_hex).unwrap();
    rewrite_manifest(dir.path(), &manifest);

    assert_integrity_failure(dir.path(), &id);
}
