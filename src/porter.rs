//! Prefetch contract for input files the backend cannot read in place.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Foreign files accumulated while staging one task, each mapped to the
/// local target the porter downloads it to under the executor stage dir.
#[derive(Debug)]
pub struct ForeignBatch {
    stage_dir: PathBuf,
    files: Vec<(PathBuf, PathBuf)>,
}

impl ForeignBatch {
    pub fn new(stage_dir: &Path) -> Self {
        Self {
            stage_dir: stage_dir.to_path_buf(),
            files: Vec::new(),
        }
    }

    /// Register a foreign path, returning the local target the staged
    /// holder should point at. Targets are namespaced by a digest of the
    /// remote path so equal basenames from different remotes don't clash.
    pub fn add(&mut self, remote: &Path) -> PathBuf {
        let digest = Sha256::digest(remote.display().to_string().as_bytes());
        let prefix = format!("{:02x}{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2], digest[3]);
        let name = remote
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        let target = self.stage_dir.join(prefix).join(name);
        self.files.push((remote.to_path_buf(), target.clone()));
        target
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.files.iter().map(|(r, l)| (r.as_path(), l.as_path()))
    }
}

/// Moves a foreign batch onto local storage before submission. Blocking:
/// staging does not return until every file in the batch is local.
pub trait FilePorter: Send + Sync {
    fn transfer(&self, batch: &ForeignBatch) -> Result<()>;
}

/// Porter for sources that are actually reachable as paths (network
/// mounts in tests, mostly): a plain copy, skipping targets that were
/// already fetched by an earlier task.
pub struct CopyPorter;

impl FilePorter for CopyPorter {
    fn transfer(&self, batch: &ForeignBatch) -> Result<()> {
        for (remote, local) in batch.iter() {
            if local.exists() {
                log::debug!("foreign file already staged: {}", local.display());
                continue;
            }
            if let Some(parent) = local.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("while creating {}", parent.display()))?;
            }
            crate::fs::copy(remote, local)
                .with_context(|| format!("while fetching foreign file {}", remote.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_targets_namespaced_by_remote() {
        let mut batch = ForeignBatch::new(Path::new("/stage"));
        let a = batch.add(Path::new("/bucket-a/data.txt"));
        let b = batch.add(Path::new("/bucket-b/data.txt"));
        assert_ne!(a, b);
        assert_eq!(a.file_name(), b.file_name());
        assert!(a.starts_with("/stage"));
    }

    #[test]
    fn test_copy_porter_fetches_once() -> Result<()> {
        let dir = tempdir()?;
        let remote = dir.path().join("remote.txt");
        std::fs::write(&remote, "payload")?;

        let stage = dir.path().join("stage");
        let mut batch = ForeignBatch::new(&stage);
        let local = batch.add(&remote);

        CopyPorter.transfer(&batch)?;
        assert_eq!(std::fs::read_to_string(&local)?, "payload");

        // second transfer is a no-op, not an error:
        CopyPorter.transfer(&batch)?;
        Ok(())
    }
}
