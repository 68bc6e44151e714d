use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// A private working directory for one pipeline run, removed on drop.
///
/// Every run gets its own `run-<uuid>` subdirectory under the scratch root,
/// so concurrent runs never share files.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub async fn create(root: &Path) -> io::Result<Self> {
        let path = root.join(format!("run-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "created scratch directory");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch directory"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove scratch directory"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scratch_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let first = ScratchDir::create(root.path()).await.unwrap();
        let second = ScratchDir::create(root.path()).await.unwrap();
        assert_ne!(first.path(), second.path());

        std::fs::write(first.join("frame.jpg"), b"jpeg").unwrap();
        let path = first.path().to_path_buf();
        drop(first);

        assert!(!path.exists());
        assert!(second.path().exists());
    }
}
