//! Migrator: upgrade, downgrade and autogenerate over the versions directory and a backend.

use super::backend::MigrationBackend;
use super::ddl::render_ops;
use super::diff::diff_schema;
use super::graph::RevisionGraph;
use super::revision::{file_name, RevisionRecord, RevisionScript, CREATE_DATE_FORMAT};
use super::schema::declared_schema;
use crate::error::AppError;
use crate::model::ModelFile;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Migrator {
    versions_dir: PathBuf,
    backend: Arc<dyn MigrationBackend>,
}

fn step_failed(id: &str, e: AppError) -> AppError {
    match e {
        AppError::Migration(msg) => AppError::Migration(msg),
        other => AppError::Migration(format!("revision {}: {}", id, other)),
    }
}

impl Migrator {
    pub fn new(versions_dir: impl Into<PathBuf>, backend: Arc<dyn MigrationBackend>) -> Self {
        Self {
            versions_dir: versions_dir.into(),
            backend,
        }
    }

    pub fn versions_dir(&self) -> &Path {
        &self.versions_dir
    }

    pub async fn graph(&self) -> Result<RevisionGraph, AppError> {
        RevisionGraph::load(&self.versions_dir).await
    }

    pub async fn heads(&self) -> Result<Vec<String>, AppError> {
        Ok(self.graph().await?.heads())
    }

    pub async fn current(&self) -> Result<Vec<String>, AppError> {
        self.backend.current_versions().await
    }

    /// All revisions, heads first.
    pub async fn revisions(&self) -> Result<Vec<RevisionRecord>, AppError> {
        let graph = self.graph().await?;
        Ok(graph.walk().map(RevisionRecord::from).collect())
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.backend.ping().await
    }

    fn applied_set(graph: &RevisionGraph, current: &[String]) -> BTreeSet<String> {
        current.iter().flat_map(|id| graph.ancestors(id)).collect()
    }

    /// Apply pending revisions up to `target`. Returns the ids applied, in order.
    pub async fn upgrade(&self, target: &str) -> Result<Vec<String>, AppError> {
        let graph = self.graph().await?;
        let current = self.current().await?;
        let plan = graph.plan_upgrade(&current, target)?;
        let mut applied = Self::applied_set(&graph, &current);
        for id in &plan {
            let rev = graph
                .get(id)
                .ok_or_else(|| AppError::Migration(format!("unknown revision {}", id)))?;
            applied.insert(id.clone());
            let versions = graph.heads_of(&applied);
            tracing::info!(revision = %id, message = %rev.message, "running upgrade");
            self.backend
                .apply(&rev.upgrade_sql, &versions)
                .await
                .map_err(|e| step_failed(id, e))?;
        }
        if plan.is_empty() {
            tracing::debug!(revision = %target, "database already at target");
        }
        Ok(plan)
    }

    /// Revert applied revisions down to `target`. Returns the ids reverted, in order.
    pub async fn downgrade(&self, target: &str) -> Result<Vec<String>, AppError> {
        let graph = self.graph().await?;
        let current = self.current().await?;
        let plan = graph.plan_downgrade(&current, target)?;
        let mut applied = Self::applied_set(&graph, &current);
        for id in &plan {
            let rev = graph
                .get(id)
                .ok_or_else(|| AppError::Migration(format!("unknown revision {}", id)))?;
            applied.remove(id);
            let versions = graph.heads_of(&applied);
            tracing::info!(revision = %id, message = %rev.message, "running downgrade");
            self.backend
                .apply(&rev.downgrade_sql, &versions)
                .await
                .map_err(|e| step_failed(id, e))?;
        }
        Ok(plan)
    }

    /// Diff `model` against the live database and write a new revision script on top of the
    /// current head. A script is written even when nothing changed.
    pub async fn autogenerate(&self, message: &str, model: &ModelFile) -> Result<RevisionScript, AppError> {
        let graph = self.graph().await?;
        let mut heads = graph.heads();
        if heads.len() > 1 {
            return Err(AppError::Migration(
                "Multiple heads are present; merge them before generating a revision".into(),
            ));
        }
        let mut current = self.current().await?;
        heads.sort();
        current.sort();
        if heads != current {
            return Err(AppError::Migration("Target database is not up to date.".into()));
        }

        let declared = declared_schema(model);
        let live = self.backend.inspect().await?;
        let ops = diff_schema(&declared, &live);
        let (upgrade_sql, downgrade_sql) = render_ops(&ops);

        let id = RevisionScript::new_id();
        let path = self.versions_dir.join(file_name(&id, message));
        let script = RevisionScript {
            id,
            parents: heads,
            message: message.to_string(),
            create_date: chrono::Local::now().format(CREATE_DATE_FORMAT).to_string(),
            upgrade_sql,
            downgrade_sql,
            path,
        };
        tokio::fs::create_dir_all(&self.versions_dir).await?;
        tokio::fs::write(&script.path, script.render()).await?;
        tracing::info!(
            revision = %script.id,
            operations = ops.len(),
            path = %script.path.display(),
            "generated revision"
        );
        Ok(script)
    }
}
