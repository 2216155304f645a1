//! Manifest-hash gating for expensive install steps.
//!
//! [`CacheGate::decide`] compares the manifest's current digest with the
//! persisted [`CacheRecord`] and returns one [`CacheDecision`].
//! [`CacheGate::run`] wraps an install action with that decision, holding an
//! exclusive lock on the record for the whole read-install-write sequence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::CacheConfig;
use crate::lock::FileLock;
use crate::shell::CancelToken;

use super::record::{hash_manifest, CacheRecord, HashAlgorithm};

/// What to do the first time a manifest is seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPolicy {
    /// Record the current hash as the baseline and skip the install.
    #[default]
    TrustBaseline,
    /// Run the install; record the hash only if it succeeds.
    AlwaysInstall,
}

/// Outcome of comparing the manifest with its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// No record exists yet.
    NoRecord { current: String },
    /// The manifest matches the record.
    Unchanged { hash: String },
    /// The manifest differs from the record.
    Changed { previous: String, current: String },
    /// The record or manifest could not be read; reinstall to be safe.
    Unavailable {
        reason: String,
        current: Option<String>,
    },
}

impl CacheDecision {
    /// Whether the install must run under `policy`.
    pub fn requires_install(&self, policy: BootstrapPolicy) -> bool {
        match self {
            CacheDecision::Unchanged { .. } => false,
            CacheDecision::NoRecord { .. } => policy == BootstrapPolicy::AlwaysInstall,
            CacheDecision::Changed { .. } | CacheDecision::Unavailable { .. } => true,
        }
    }

    /// Hash to persist once the install (or bootstrap) is accepted.
    pub fn current_hash(&self) -> Option<&str> {
        match self {
            CacheDecision::NoRecord { current } | CacheDecision::Changed { current, .. } => {
                Some(current)
            }
            CacheDecision::Unchanged { hash } => Some(hash),
            CacheDecision::Unavailable { current, .. } => current.as_deref(),
        }
    }

    /// Short label for logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            CacheDecision::NoRecord { .. } => "no-record",
            CacheDecision::Unchanged { .. } => "unchanged",
            CacheDecision::Changed { .. } => "changed",
            CacheDecision::Unavailable { .. } => "unavailable",
        }
    }
}

/// Result of [`CacheGate::run`].
#[derive(Debug)]
pub struct CacheRun<T> {
    /// The decision taken before the install.
    pub decision: CacheDecision,
    /// Output of the install, if it ran.
    pub install: Option<T>,
    /// Whether the record was (re)written.
    pub record_updated: bool,
}

/// Decides whether an install can be skipped.
#[derive(Debug, Clone)]
pub struct CacheGate {
    manifest_label: PathBuf,
    manifest: PathBuf,
    record: PathBuf,
    policy: BootstrapPolicy,
    cancel: CancelToken,
}

impl CacheGate {
    /// Create a gate over absolute manifest and record paths.
    pub fn new(manifest: PathBuf, record: PathBuf, policy: BootstrapPolicy) -> Self {
        Self {
            manifest_label: manifest.clone(),
            manifest,
            record,
            policy,
            cancel: CancelToken::new(),
        }
    }

    /// Create a gate from stage config, resolving both paths against `root`.
    pub fn from_config(root: &Path, config: &CacheConfig) -> Self {
        Self::from_roots(root, root, config)
    }

    /// Create a gate whose manifest lives in the workspace and whose record
    /// lives under `state_root`, which outlives the workspace.
    pub fn from_roots(workspace_root: &Path, state_root: &Path, config: &CacheConfig) -> Self {
        Self {
            manifest_label: config.manifest.clone(),
            manifest: workspace_root.join(&config.manifest),
            record: state_root.join(&config.record),
            policy: config.bootstrap,
            cancel: CancelToken::new(),
        }
    }

    /// Stop waiting for the record lock when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record file location.
    pub fn record_path(&self) -> &Path {
        &self.record
    }

    /// Manifest file location.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    /// Bootstrap policy in effect.
    pub fn policy(&self) -> BootstrapPolicy {
        self.policy
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.record.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Compare the manifest with its record.
    pub fn decide(&self) -> CacheDecision {
        let current = match hash_manifest(&self.manifest) {
            Ok(hash) => hash,
            Err(e) => {
                return CacheDecision::Unavailable {
                    reason: format!("cannot hash {}: {}", self.manifest.display(), e),
                    current: None,
                }
            }
        };

        match CacheRecord::load(&self.record) {
            Ok(None) => CacheDecision::NoRecord { current },
            Ok(Some(record)) => {
                let comparable = record.algorithm == HashAlgorithm::Sha256
                    && record.manifest_path == self.manifest_label;
                if comparable && record.stored_hash == current {
                    CacheDecision::Unchanged { hash: current }
                } else {
                    CacheDecision::Changed {
                        previous: record.stored_hash,
                        current,
                    }
                }
            }
            Err(e) => CacheDecision::Unavailable {
                reason: format!("{:#}", e),
                current: Some(current),
            },
        }
    }

    /// Run `install` if the decision requires it, then update the record.
    ///
    /// `succeeded` reports whether the install's output counts as success;
    /// the record is written only then. A failed install leaves the previous
    /// record untouched. Record I/O problems are logged and never fatal; a
    /// baseline that cannot be recorded is installed instead of trusted.
    pub fn run<T>(
        &self,
        install: impl FnOnce() -> T,
        succeeded: impl FnOnce(&T) -> bool,
    ) -> CacheRun<T> {
        let _lock = match FileLock::acquire(&self.lock_path(), None, &self.cancel) {
            Ok(lock) => lock,
            Err(e) => {
                tracing::warn!(record = %self.record.display(), error = %e, "cache lock unavailable; continuing unlocked");
                None
            }
        };

        let decision = self.decide();
        if let CacheDecision::Unavailable { reason, .. } = &decision {
            tracing::warn!(reason = %reason, "cache record unavailable; reinstalling");
        }

        let skip = match &decision {
            CacheDecision::NoRecord { current } if !decision.requires_install(self.policy) => {
                tracing::info!(manifest = %self.manifest_label.display(), "no cache record; trusting current manifest as baseline");
                let recorded = self.write_record(current);
                if !recorded {
                    tracing::warn!(record = %self.record.display(), "baseline not recorded; installing instead");
                }
                recorded.then_some(true)
            }
            _ => (!decision.requires_install(self.policy)).then_some(false),
        };
        if let Some(record_updated) = skip {
            tracing::info!(manifest = %self.manifest_label.display(), decision = decision.label(), "install skipped");
            return CacheRun {
                decision,
                install: None,
                record_updated,
            };
        }

        tracing::info!(manifest = %self.manifest_label.display(), decision = decision.label(), "running install");
        let output = install();

        let record_updated = if succeeded(&output) {
            match decision.current_hash() {
                Some(hash) => self.write_record(hash),
                None => false,
            }
        } else {
            tracing::warn!(record = %self.record.display(), "install failed; cache record left unchanged");
            false
        };

        CacheRun {
            decision,
            install: Some(output),
            record_updated,
        }
    }

    /// Delete the record so the next run is treated as a first run.
    ///
    /// Returns whether a record existed.
    pub fn clear(&self) -> std::io::Result<bool> {
        match std::fs::remove_file(&self.record) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write_record(&self, hash: &str) -> bool {
        let record = CacheRecord::new(self.manifest_label.clone(), hash);
        match record.save(&self.record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(record = %self.record.display(), error = %format!("{:#}", e), "could not write cache record");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    fn gate(temp: &TempDir, policy: BootstrapPolicy) -> CacheGate {
        let config = CacheConfig {
            manifest: PathBuf::from("requirements.txt"),
            record: PathBuf::from(".stagegate/cache/requirements.json"),
            bootstrap: policy,
        };
        CacheGate::from_config(temp.path(), &config)
    }

    fn stored_hash(gate: &CacheGate) -> Option<String> {
        CacheRecord::load(gate.record_path())
            .unwrap()
            .map(|r| r.stored_hash)
    }

    #[test]
    fn first_run_trusts_baseline_and_skips_install() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);

        let ran = Cell::new(false);
        let run = gate.run(|| ran.set(true), |_| true);

        assert!(!ran.get());
        assert!(matches!(run.decision, CacheDecision::NoRecord { .. }));
        assert!(run.record_updated);
        assert!(stored_hash(&gate).is_some());
    }

    #[test]
    fn first_run_always_install_runs_and_records_on_success() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::AlwaysInstall);

        let run = gate.run(|| 0, |code| *code == 0);

        assert_eq!(run.install, Some(0));
        assert!(run.record_updated);
    }

    #[test]
    fn first_run_always_install_failure_writes_nothing() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::AlwaysInstall);

        let run = gate.run(|| 1, |code| *code == 0);

        assert!(!run.record_updated);
        assert!(stored_hash(&gate).is_none());
    }

    #[test]
    fn unchanged_manifest_skips_install_and_keeps_hash() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
        gate.run(|| (), |_| true);
        let before = fs::read_to_string(gate.record_path()).unwrap();

        let ran = Cell::new(false);
        let run = gate.run(|| ran.set(true), |_| true);

        assert!(!ran.get());
        assert!(matches!(run.decision, CacheDecision::Unchanged { .. }));
        assert!(!run.record_updated);
        assert_eq!(fs::read_to_string(gate.record_path()).unwrap(), before);
    }

    #[test]
    fn changed_manifest_installs_and_updates_on_success() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("requirements.txt");
        fs::write(&manifest, "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
        gate.run(|| 0, |c| *c == 0);
        let old = stored_hash(&gate).unwrap();

        fs::write(&manifest, "requests\nfpdf\n").unwrap();
        let run = gate.run(|| 0, |c| *c == 0);

        assert!(matches!(run.decision, CacheDecision::Changed { .. }));
        assert_eq!(run.install, Some(0));
        let new = stored_hash(&gate).unwrap();
        assert_ne!(old, new);
        assert_eq!(new, hash_manifest(&manifest).unwrap());
    }

    #[test]
    fn failed_install_leaves_previous_record() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("requirements.txt");
        fs::write(&manifest, "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
        gate.run(|| 0, |c| *c == 0);
        let old = stored_hash(&gate).unwrap();

        fs::write(&manifest, "requests\nbroken-package\n").unwrap();
        let run = gate.run(|| 1, |c| *c == 0);

        assert!(!run.record_updated);
        assert_eq!(stored_hash(&gate).unwrap(), old);

        // Retry still sees the change instead of a false cache hit.
        assert!(matches!(gate.decide(), CacheDecision::Changed { .. }));
    }

    #[test]
    fn corrupt_record_falls_back_to_install() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
        fs::create_dir_all(gate.record_path().parent().unwrap()).unwrap();
        fs::write(gate.record_path(), "garbage").unwrap();

        let run = gate.run(|| 0, |c| *c == 0);

        assert!(matches!(run.decision, CacheDecision::Unavailable { .. }));
        assert_eq!(run.install, Some(0));
        assert!(run.record_updated);
        assert!(matches!(gate.decide(), CacheDecision::Unchanged { .. }));
    }

    #[test]
    fn missing_manifest_installs_without_recording() {
        let temp = TempDir::new().unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);

        let run = gate.run(|| 0, |c| *c == 0);

        assert!(matches!(
            run.decision,
            CacheDecision::Unavailable { current: None, .. }
        ));
        assert_eq!(run.install, Some(0));
        assert!(!run.record_updated);
    }

    #[test]
    fn record_for_other_manifest_counts_as_changed() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("requirements.txt");
        fs::write(&manifest, "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
        CacheRecord::new("other.txt", hash_manifest(&manifest).unwrap())
            .save(gate.record_path())
            .unwrap();

        assert!(matches!(gate.decide(), CacheDecision::Changed { .. }));
    }

    #[test]
    fn clear_removes_record() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
        gate.run(|| (), |_| true);

        assert!(gate.clear().unwrap());
        assert!(!gate.clear().unwrap());
        assert!(matches!(gate.decide(), CacheDecision::NoRecord { .. }));
    }

    #[test]
    fn unwritable_baseline_falls_back_to_install() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let gate = gate(&temp, BootstrapPolicy::TrustBaseline);
        // A directory where the record's temp file must go.
        fs::create_dir_all(gate.record_path().with_extension("json.tmp")).unwrap();

        for _ in 0..2 {
            let run = gate.run(|| 0, |c| *c == 0);
            assert!(matches!(run.decision, CacheDecision::NoRecord { .. }));
            assert_eq!(run.install, Some(0));
            assert!(!run.record_updated);
        }
    }

    #[test]
    fn record_can_live_outside_the_workspace() {
        let workspace = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        fs::write(workspace.path().join("requirements.txt"), "requests\n").unwrap();
        let config = CacheConfig {
            manifest: PathBuf::from("requirements.txt"),
            record: PathBuf::from(".cache/requirements.json"),
            bootstrap: BootstrapPolicy::AlwaysInstall,
        };
        let gate = CacheGate::from_roots(workspace.path(), state.path(), &config);

        gate.run(|| 0, |c| *c == 0);

        assert!(state.path().join(".cache/requirements.json").exists());
        assert!(!workspace.path().join(".cache").exists());
        assert!(matches!(gate.decide(), CacheDecision::Unchanged { .. }));
    }

    #[test]
    fn requires_install_table() {
        let unchanged = CacheDecision::Unchanged { hash: "h".into() };
        let no_record = CacheDecision::NoRecord {
            current: "h".into(),
        };
        assert!(!unchanged.requires_install(BootstrapPolicy::AlwaysInstall));
        assert!(!no_record.requires_install(BootstrapPolicy::TrustBaseline));
        assert!(no_record.requires_install(BootstrapPolicy::AlwaysInstall));
    }
}
