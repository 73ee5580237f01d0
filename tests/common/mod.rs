//! Test harness: a model file and versions directory in a temp dir, an in-memory migration
//! backend, and a helper that drives the router with `oneshot`.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use schema_forge::migration::LiveSchema;
use schema_forge::{build_app, AppError, AppState, MigrationBackend, Migrator, ModelStore, DEFAULT_BODY_LIMIT};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const MODELS: &str = "from sqlalchemy import Column, Integer, String\nfrom database import Base\n\n\nclass Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n    name = Column(String, nullable=False)\n";

pub const PREAMBLE: &str = "from sqlalchemy import Column, Integer, String\nfrom database import Base\n";

/// Records every applied script and keeps the version rows in memory.
#[derive(Default)]
pub struct MemoryBackend {
    pub versions: Mutex<Vec<String>>,
    pub executed: Mutex<Vec<String>>,
    pub live: Mutex<LiveSchema>,
    /// When set, every `apply` fails with this message.
    pub fail_with: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn versions(&self) -> Vec<String> {
        self.versions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MigrationBackend for MemoryBackend {
    async fn current_versions(&self) -> Result<Vec<String>, AppError> {
        let mut v = self.versions.lock().unwrap().clone();
        v.sort();
        Ok(v)
    }

    async fn apply(&self, sql: &str, versions: &[String]) -> Result<(), AppError> {
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            return Err(AppError::Migration(msg));
        }
        self.executed.lock().unwrap().push(sql.to_string());
        *self.versions.lock().unwrap() = versions.to_vec();
        Ok(())
    }

    async fn inspect(&self) -> Result<LiveSchema, AppError> {
        Ok(self.live.lock().unwrap().clone())
    }

    async fn ping(&self) -> Result<(), AppError> {
        match self.fail_with.lock().unwrap().clone() {
            Some(msg) => Err(AppError::Migration(msg)),
            None => Ok(()),
        }
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub backend: Arc<MemoryBackend>,
    pub router: Router,
}

impl TestApp {
    /// `models`: initial model file content, or `None` for no file at all.
    pub fn new(models: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let models_path = dir.path().join("models.py");
        if let Some(src) = models {
            std::fs::write(&models_path, src).unwrap();
        }
        let backend = Arc::new(MemoryBackend::default());
        let state = AppState::new(
            ModelStore::new(&models_path, Duration::from_secs(2)),
            Migrator::new(dir.path().join("versions"), backend.clone()),
        );
        let router = build_app(state.clone(), DEFAULT_BODY_LIMIT);
        Self {
            dir,
            state,
            backend,
            router,
        }
    }

    pub fn models_path(&self) -> PathBuf {
        self.dir.path().join("models.py")
    }

    pub fn read_models(&self) -> String {
        std::fs::read_to_string(self.models_path()).unwrap()
    }

    pub fn revision_files(&self) -> Vec<PathBuf> {
        let dir = self.dir.path().join("versions");
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries.map(|e| e.unwrap().path()).collect();
        files.sort();
        files
    }

    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }
}
