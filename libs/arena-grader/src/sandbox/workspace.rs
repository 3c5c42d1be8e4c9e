use super::SandboxError;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Per-invocation scratch directory
///
/// Named with a random v4 token so concurrent invocations never share a path.
/// `cleanup` removes it asynchronously; `Drop` is the fallback for invocations
/// cancelled before reaching cleanup. Removal errors are swallowed.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    removed: bool,
}

impl Workspace {
    pub async fn create(root: &Path) -> Result<Self, SandboxError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(SandboxError::Workspace)?;

        let dir = root.join(format!("arena-{}", Uuid::new_v4().simple()));
        // create_dir (not _all) fails if the path already exists
        tokio::fs::create_dir(&dir)
            .await
            .map_err(SandboxError::Workspace)?;

        Ok(Self { dir, removed: false })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub async fn cleanup(mut self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            tracing::warn!(workspace = %self.dir.display(), error = %e, "Failed to remove sandbox workspace");
        }
        self.removed = true;
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}
