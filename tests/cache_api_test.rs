//! Integration tests for the cache gate public API.

use stagegate::cache::{hash_manifest, BootstrapPolicy, CacheDecision, CacheGate, CacheRecord};
use std::fs;
use tempfile::TempDir;

fn gate(temp: &TempDir, policy: BootstrapPolicy) -> CacheGate {
    CacheGate::new(
        temp.path().join("requirements.txt"),
        temp.path().join(".cache/requirements.sha256"),
        policy,
    )
}

#[test]
fn baseline_then_hit_then_change() {
    let temp = TempDir::new().unwrap();
    let manifest = temp.path().join("requirements.txt");
    fs::write(&manifest, "requests==2.31\n").unwrap();
    let gate = gate(&temp, BootstrapPolicy::TrustBaseline);

    let first = gate.run(|| "installed", |_| true);
    assert!(matches!(first.decision, CacheDecision::NoRecord { .. }));
    assert!(first.install.is_none());
    assert!(first.record_updated);

    let second = gate.run(|| "installed", |_| true);
    assert!(matches!(second.decision, CacheDecision::Unchanged { .. }));
    assert!(second.install.is_none());

    fs::write(&manifest, "requests==2.32\n").unwrap();
    let third = gate.run(|| "installed", |_| true);
    assert!(matches!(third.decision, CacheDecision::Changed { .. }));
    assert_eq!(third.install, Some("installed"));
    assert!(third.record_updated);
}

#[test]
fn failed_install_never_writes_record() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("requirements.txt"), "requests==2.31\n").unwrap();
    let gate = gate(&temp, BootstrapPolicy::AlwaysInstall);

    let run = gate.run(|| 1, |code| *code == 0);

    assert_eq!(run.install, Some(1));
    assert!(!run.record_updated);
    assert!(!gate.record_path().exists());
}

#[test]
fn missing_manifest_forces_install() {
    let temp = TempDir::new().unwrap();
    let gate = gate(&temp, BootstrapPolicy::TrustBaseline);

    let decision = gate.decide();

    assert!(matches!(decision, CacheDecision::Unavailable { .. }));
    assert!(decision.requires_install(BootstrapPolicy::TrustBaseline));
}

#[test]
fn corrupt_record_forces_install() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("requirements.txt"), "requests==2.31\n").unwrap();
    let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
    fs::create_dir_all(temp.path().join(".cache")).unwrap();
    fs::write(gate.record_path(), "not json").unwrap();

    assert_eq!(gate.decide().label(), "unavailable");
    let run = gate.run(|| (), |_| true);
    assert!(run.install.is_some());
    assert!(run.record_updated);
}

#[test]
fn record_stores_manifest_digest() {
    let temp = TempDir::new().unwrap();
    let manifest = temp.path().join("requirements.txt");
    fs::write(&manifest, "requests==2.31\n").unwrap();
    let gate = gate(&temp, BootstrapPolicy::TrustBaseline);

    gate.run(|| (), |_| true);

    let record = CacheRecord::load(gate.record_path()).unwrap().unwrap();
    assert_eq!(record.stored_hash, hash_manifest(&manifest).unwrap());
}

#[test]
fn clear_reports_whether_record_existed() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("requirements.txt"), "requests==2.31\n").unwrap();
    let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
    gate.run(|| (), |_| true);

    assert!(gate.clear().unwrap());
    assert!(!gate.clear().unwrap());
    assert!(matches!(gate.decide(), CacheDecision::NoRecord { .. }));
}
