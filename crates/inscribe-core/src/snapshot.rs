//! Snapshot-then-commit for everything a run writes.
//!
//! Before a manifest is replaced, the prior bytes are copied to
//! `<target>.bak`. The new bytes go to `<target>.tmp` and are renamed over the
//! target. If the guard is dropped without a successful commit, the target is
//! restored from the snapshot and the temp file is removed.
//!
//! Batch artifacts go through an [`ArtifactStage`]: they are written into a
//! per-run staging directory and only moved over the previous run's files once
//! every batch has finalized. Replaced files are parked and put back if the
//! run does not commit.

use crate::errors::{ErrorKind, PackError, PackResult, Step};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ManifestSnapshot {
    target: PathBuf,
    backup: Option<PathBuf>,
    temp: PathBuf,
    committed: bool,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl ManifestSnapshot {
    /// Snapshot `target` if it exists.
    pub fn take(target: &Path) -> PackResult<Self> {
        let subject = target.display().to_string();
        let backup = if target.exists() {
            let backup = with_suffix(target, ".bak");
            std::fs::copy(target, &backup).map_err(|e| {
                PackError::io(Step::Export, &subject, e).with_context("snapshotting manifest")
            })?;
            tracing::debug!(backup = %backup.display(), "snapshotted previous manifest");
            Some(backup)
        } else {
            None
        };

        Ok(Self {
            target: target.to_path_buf(),
            backup,
            temp: with_suffix(target, ".tmp"),
            committed: false,
        })
    }

    /// Location of the prior manifest's bytes, if there was one.
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Atomically replace the target with `bytes`.
    pub fn commit(mut self, bytes: &[u8]) -> PackResult<()> {
        let subject = self.target.display().to_string();
        std::fs::write(&self.temp, bytes)
            .map_err(|e| PackError::io(Step::Export, &subject, e).with_context("writing temp"))?;
        std::fs::rename(&self.temp, &self.target)
            .map_err(|e| PackError::io(Step::Export, &subject, e).with_context("renaming"))?;
        self.committed = true;
        Ok(())
    }

    fn rollback(&self) {
        if self.temp.exists() {
            if let Err(e) = std::fs::remove_file(&self.temp) {
                tracing::warn!(
                    temp = %self.temp.display(),
                    error = %e,
                    "failed to remove temporary manifest"
                );
            }
        }
        if let Some(backup) = &self.backup {
            if let Err(e) = std::fs::copy(backup, &self.target) {
                tracing::warn!(
                    target_path = %self.target.display(),
                    backup = %backup.display(),
                    error = %e,
                    "failed to restore manifest snapshot"
                );
            }
        }
    }
}

impl Drop for ManifestSnapshot {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

/// Name of the staging directory for one run, inside the output directory.
pub fn staging_dir_name(run_id: &str) -> String {
    format!(".staging-{}", run_id)
}

#[derive(Debug)]
struct Promoted {
    target: PathBuf,
    parked: Option<PathBuf>,
}

/// Per-run staging area for batch artifacts.
///
/// Finalizers write into [`ArtifactStage::dir`]. [`ArtifactStage::promote`]
/// moves a staged file to its final name, first parking the file it replaces
/// under `<staging>/prev/`. Dropping the stage without [`ArtifactStage::commit`]
/// removes every promoted file, puts the parked ones back and deletes the
/// staging directory.
#[derive(Debug)]
pub struct ArtifactStage {
    out_dir: PathBuf,
    staging: PathBuf,
    parked_dir: PathBuf,
    promoted: Vec<Promoted>,
    committed: bool,
}

impl ArtifactStage {
    pub fn create(out_dir: &Path, run_id: &str) -> PackResult<Self> {
        let staging = out_dir.join(staging_dir_name(run_id));
        let parked_dir = staging.join("prev");
        std::fs::create_dir_all(&parked_dir).map_err(|e| {
            PackError::io(Step::Persist, staging.display().to_string(), e)
                .with_context("creating staging directory")
        })?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            staging,
            parked_dir,
            promoted: Vec::new(),
            committed: false,
        })
    }

    /// Directory the finalizers write into.
    pub fn dir(&self) -> &Path {
        &self.staging
    }

    /// Move staged `file_name` into the output directory. `subject` names the
    /// batch in errors.
    pub fn promote(&mut self, subject: &str, file_name: &str) -> PackResult<()> {
        let staged = self.staging.join(file_name);
        let target = self.out_dir.join(file_name);

        let parked = match std::fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_file() => {
                let parked = self.parked_dir.join(file_name);
                std::fs::rename(&target, &parked).map_err(|e| {
                    PackError::io(Step::Persist, subject, e)
                        .with_context("parking previous artifact")
                })?;
                Some(parked)
            }
            Ok(_) => {
                return Err(PackError::new(
                    ErrorKind::Io,
                    Step::Persist,
                    subject,
                    format!("'{}' exists and is not a regular file", target.display()),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(PackError::io(Step::Persist, subject, e)),
        };

        // Recorded before the move so a failed rename still restores the parked file.
        self.promoted.push(Promoted {
            target: target.clone(),
            parked,
        });
        std::fs::rename(&staged, &target).map_err(|e| {
            PackError::io(Step::Persist, subject, e).with_context("promoting staged artifact")
        })
    }

    /// Keep the promoted files and discard the staging directory.
    pub fn commit(mut self) {
        self.committed = true;
        self.remove_staging();
    }

    fn remove_staging(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.staging) {
            tracing::warn!(
                staging = %self.staging.display(),
                error = %e,
                "failed to remove staging directory"
            );
        }
    }

    fn rollback(&self) {
        for p in self.promoted.iter().rev() {
            match std::fs::remove_file(&p.target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    target_path = %p.target.display(),
                    error = %e,
                    "failed to remove promoted artifact"
                ),
            }
            if let Some(parked) = &p.parked {
                if let Err(e) = std::fs::rename(parked, &p.target) {
                    tracing::warn!(
                        target_path = %p.target.display(),
                        parked = %parked.display(),
                        error = %e,
                        "failed to restore previous artifact"
                    );
                }
            }
        }
        if !self.promoted.is_empty() {
            tracing::info!(
                restored = self.promoted.len(),
                "rolled back promoted artifacts"
            );
        }
        self.remove_staging();
    }
}

impl Drop for ArtifactStage {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_file(stage: &ArtifactStage, name: &str, bytes: &[u8]) {
        std::fs::write(stage.dir().join(name), bytes).unwrap();
    }

    #[test]
    fn test_stage_commit_replaces_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("batch_001.json.gz"), b"old").unwrap();

        let mut stage = ArtifactStage::create(dir.path(), "run-a").unwrap();
        stage_file(&stage, "batch_001.json.gz", b"new");
        stage_file(&stage, "batch_002.json.gz", b"fresh");
        stage.promote("batch_001", "batch_001.json.gz").unwrap();
        stage.promote("batch_002", "batch_002.json.gz").unwrap();
        stage.commit();

        assert_eq!(std::fs::read(dir.path().join("batch_001.json.gz")).unwrap(), b"new");
        assert_eq!(std::fs::read(dir.path().join("batch_002.json.gz")).unwrap(), b"fresh");
        assert!(!dir.path().join(staging_dir_name("run-a")).exists());
    }

    #[test]
    fn test_stage_drop_restores_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("batch_001.json.gz"), b"old").unwrap();

        {
            let mut stage = ArtifactStage::create(dir.path(), "run-b").unwrap();
            stage_file(&stage, "batch_001.json.gz", b"new");
            stage_file(&stage, "batch_002.json.gz", b"fresh");
            stage.promote("batch_001", "batch_001.json.gz").unwrap();
            stage.promote("batch_002", "batch_002.json.gz").unwrap();
        }

        assert_eq!(std::fs::read(dir.path().join("batch_001.json.gz")).unwrap(), b"old");
        assert!(!dir.path().join("batch_002.json.gz").exists());
        assert!(!dir.path().join(staging_dir_name("run-b")).exists());
    }

    #[test]
    fn test_stage_refuses_to_replace_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("batch_001.json.gz")).unwrap();

        let mut stage = ArtifactStage::create(dir.path(), "run-c").unwrap();
        stage_file(&stage, "batch_001.json.gz", b"new");
        let err = stage.promote("batch_001", "batch_001.json.gz").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.step, Step::Persist);
        assert_eq!(err.subject, "batch_001");
        drop(stage);
        assert!(dir.path().join("batch_001.json.gz").is_dir());
    }

    #[test]
    fn test_fresh_target_has_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("manifest.json");
        let snap = ManifestSnapshot::take(&target).unwrap();
        assert!(snap.backup_path().is_none());
        snap.commit(b"new").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }

    #[test]
    fn test_commit_keeps_prior_bytes_in_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("manifest.json");
        std::fs::write(&target, b"old").unwrap();

        let snap = ManifestSnapshot::take(&target).unwrap();
        let backup = snap.backup_path().unwrap().to_path_buf();
        snap.commit(b"new").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert_eq!(std::fs::read(backup).unwrap(), b"old");
    }

    #[test]
    fn test_drop_without_commit_restores_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("manifest.json");
        std::fs::write(&target, b"old").unwrap();

        {
            let _snap = ManifestSnapshot::take(&target).unwrap();
            std::fs::write(&target, b"clobbered").unwrap();
            std::fs::write(dir.path().join("manifest.json.tmp"), b"partial").unwrap();
        }

        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the target's place makes the rename fail.
        let target = dir.path().join("manifest.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let snap = ManifestSnapshot {
            target: target.clone(),
            backup: None,
            temp: with_suffix(&target, ".tmp"),
            committed: false,
        };
        let err = snap.commit(b"new").unwrap_err();
        assert_eq!(err.step, Step::Export);
        assert!(target.join("keep").exists());
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }
}
