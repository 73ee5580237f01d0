//! On-disk model file: advisory file lock, read, mutate, atomic replace.

use crate::error::AppError;
use crate::model::parser::parse_model;
use crate::model::render::render_model;
use crate::model::types::ModelFile;
use fs4::fs_std::FileExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ModelStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Reads and parses the current file. NotFound when the file is missing.
    pub async fn load(&self) -> Result<ModelFile, AppError> {
        let source = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!(
                    "File {} does not exist.",
                    self.path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        parse_model(&source)
    }

    /// Runs `edit` against the parsed file while holding the file lock and writes the result
    /// through a temp file and rename. Returns the model as written.
    pub async fn mutate<F>(&self, edit: F) -> Result<ModelFile, AppError>
    where
        F: FnOnce(&mut ModelFile) -> Result<(), AppError>,
    {
        let _lock = FileLock::acquire(self.sibling(".lock"), self.lock_timeout).await?;

        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!(
                    "File {} does not exist.",
                    self.path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if meta.permissions().readonly() {
            return Err(AppError::Forbidden(format!(
                "File {} is not writable.",
                self.path.display()
            )));
        }

        let mut model = self.load().await?;
        edit(&mut model)?;

        let tmp = self.sibling(".tmp");
        tokio::fs::write(&tmp, render_model(&model)).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), "model file written");
        Ok(model)
    }
}

/// Exclusive OS advisory lock on `<model>.lock`. The kernel drops it when the handle is
/// closed or the process dies, so a leftover lock file never blocks writers.
struct FileLock {
    file: std::fs::File,
}

impl FileLock {
    async fn acquire(path: PathBuf, timeout: Duration) -> Result<Self, AppError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        let started = Instant::now();
        loop {
            if file.try_lock_exclusive()? {
                return Ok(Self { file });
            }
            if started.elapsed() >= timeout {
                return Err(AppError::Internal(format!(
                    "timed out waiting for lock {}",
                    path.display()
                )));
            }
            tokio::time::sleep(LOCK_POLL).await;
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "failed to release model lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{Item, TableDef};

    const SOURCE: &str = "Base = declarative_base()\n\n\nclass Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n";

    fn store_in(dir: &tempfile::TempDir) -> ModelStore {
        ModelStore::new(dir.path().join("models.py"), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn mutate_writes_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), SOURCE).await.unwrap();

        let model = store
            .mutate(|m| {
                m.items.push(Item::Table(TableDef::new("Teams")));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(model.tables().count(), 2);

        let written = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(written.ends_with("class Teams(Base):\n    __tablename__ = 'teams'\n"));
        assert!(!dir.path().join("models.py.tmp").exists());
    }

    #[tokio::test]
    async fn failed_edit_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), SOURCE).await.unwrap();

        let err = store
            .mutate(|_| Err(AppError::Conflict("nope".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(tokio::fs::read_to_string(store.path()).await.unwrap(), SOURCE);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(matches!(store.load().await, Err(AppError::NotFound(_))));
        assert!(matches!(store.mutate(|_| Ok(())).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn readonly_file_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), SOURCE).await.unwrap();
        let mut perms = std::fs::metadata(store.path()).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(store.path(), perms).unwrap();

        assert!(matches!(store.mutate(|_| Ok(())).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn held_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), SOURCE).await.unwrap();
        let holder = std::fs::File::create(dir.path().join("models.py.lock")).unwrap();
        assert!(holder.try_lock_exclusive().unwrap());

        assert!(matches!(store.mutate(|_| Ok(())).await, Err(AppError::Internal(_))));

        FileExt::unlock(&holder).unwrap();
        assert!(store.mutate(|_| Ok(())).await.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_file_does_not_block_writers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), SOURCE).await.unwrap();
        // Left behind by a process that died while holding the lock.
        std::fs::write(dir.path().join("models.py.lock"), "").unwrap();

        let model = store.mutate(|_| Ok(())).await.unwrap();
        assert_eq!(model.tables().count(), 1);
    }
}
