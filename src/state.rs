//! Shared application state for all routes. The parsed model is cached and refreshed
//! explicitly after every structural change.

use crate::migration::Migrator;
use crate::model::{ModelFile, ModelStore};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelStore>,
    pub migrator: Arc<Migrator>,
    /// Last model written or read by this process.
    pub model: Arc<RwLock<ModelFile>>,
    /// Serializes structural operations from edit through migration.
    pub writer: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(models: ModelStore, migrator: Migrator) -> Self {
        Self {
            models: Arc::new(models),
            migrator: Arc::new(migrator),
            model: Arc::new(RwLock::new(ModelFile::default())),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn cached_model(&self) -> ModelFile {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn install_model(&self, model: ModelFile) {
        *self
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = model;
    }
}
