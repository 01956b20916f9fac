use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;

fn write_catalog(root: &Path) {
    std::fs::create_dir_all(root.join("groups")).unwrap();
    std::fs::write(
        root.join("index.json"),
        json!({"groups": [
            {"id": "tarot", "name": "Tarot", "unit_count": 2},
            {"id": "runes", "name": "Runes", "unit_count": 1},
            {"id": "iching", "name": "I Ching", "unit_count": 1}
        ]})
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        root.join("groups/tarot.json"),
        json!([{"card": "The Fool"}, {"card": "The Magician"}]).to_string(),
    )
    .unwrap();
    std::fs::write(
        root.join("groups/runes.json"),
        json!([{"rune": "Fehu", "meaning": "wealth"}]).to_string(),
    )
    .unwrap();
    std::fs::write(
        root.join("groups/iching.json"),
        json!([{"hexagram": 1, "name": "Qian"}]).to_string(),
    )
    .unwrap();
}

fn inscribe() -> Command {
    let mut cmd = Command::cargo_bin("inscribe").unwrap();
    cmd.env_remove("INSCRIBE_MAX_BATCH_SIZE")
        .env_remove("INSCRIBE_OUTPUT_DIR")
        .env_remove("INSCRIBE_PARALLEL")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn pack_then_verify_then_show() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_catalog(src.path());

    inscribe()
        .args(["pack", "--catalog"])
        .arg(src.path())
        .arg("--out")
        .arg(out.path())
        .args(["--max-batch-size", "60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("batch_001"))
        .stdout(predicate::str::contains("Root Hash:"));

    assert!(out.path().join("manifest.json").exists());
    assert!(out.path().join("batch_001.json.gz").exists());
    assert!(out.path().join("batch_001_reference.json").exists());

    inscribe()
        .arg("verify")
        .arg(out.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Manifest verified"));

    let output = inscribe()
        .arg("show")
        .arg(out.path())
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let groups: Vec<String> = manifest["batches"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|b| b["included_group_ids"].as_array().unwrap().clone())
        .map(|g| g.as_str().unwrap().to_string())
        .collect();
    assert_eq!(groups, ["tarot", "runes", "iching"]);
}

#[test]
fn verify_fails_on_tampered_artifact() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_catalog(src.path());

    inscribe()
        .args(["pack", "--catalog"])
        .arg(src.path())
        .arg("--out")
        .arg(out.path())
        .assert()
        .success();

    let artifact = out.path().join("batch_001.json.gz");
    let mut bytes = std::fs::read(&artifact).unwrap();
    let last = bytes.len() - 10;
    bytes[last] ^= 0xff;
    std::fs::write(&artifact, bytes).unwrap();

    inscribe()
        .arg("verify")
        .arg(out.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("batch_001"));
}

#[test]
fn missing_catalog_exits_with_input_error() {
    let out = tempfile::tempdir().unwrap();
    inscribe()
        .args(["pack", "--catalog", "/definitely/not/here", "--out"])
        .arg(out.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("InputError"));
    assert!(!out.path().join("manifest.json").exists());
}

#[test]
fn show_without_verify_tolerates_non_ascii_hash() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_catalog(src.path());

    inscribe()
        .args(["pack", "--catalog"])
        .arg(src.path())
        .arg("--out")
        .arg(out.path())
        .assert()
        .success();

    let path = out.path().join("manifest.json");
    let mut manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    manifest["batches"][0]["content_hash_hex"] = json!("ééééééééééééééééé");
    std::fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();

    inscribe()
        .arg("show")
        .arg(out.path())
        .arg("--no-verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("éééééééééééééééé"));
}
