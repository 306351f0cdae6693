//! Backing stores for workflow definitions.
//!
//! The registry asks a store for a definition the first time a workflow id
//! is used, and again on forced reloads. Stores only read; caching belongs
//! to the registry.

use crate::definition::WorkflowDefinition;
use crate::error::SourceError;
use rootcause::prelude::ResultExt;
use statusflow_core::{Result, WorkflowId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// A source of workflow definitions keyed by workflow id.
pub trait DefinitionStore: Send + Sync {
    /// Returns the definition of a workflow, or `None` if the store has none.
    ///
    /// # Errors
    ///
    /// Returns an error if a definition exists but cannot be read.
    fn load(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, SourceError>;
}

/// Definitions held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    definitions: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, returning the one it replaced.
    ///
    /// Replacing a definition does not affect graphs already cached by a
    /// registry until they are reloaded.
    pub fn insert(
        &self,
        workflow_id: WorkflowId,
        definition: WorkflowDefinition,
    ) -> Option<WorkflowDefinition> {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow_id, definition)
    }

    /// Adds a definition, builder style.
    #[must_use]
    pub fn with(self, workflow_id: WorkflowId, definition: WorkflowDefinition) -> Self {
        self.insert(workflow_id, definition);
        self
    }
}

impl DefinitionStore for MemoryStore {
    fn load(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, SourceError> {
        Ok(self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workflow_id)
            .cloned())
    }
}

/// Definitions stored as `<dir>/<workflow id>.json` files.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// Creates a store reading from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory this store reads from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file a workflow definition is read from.
    #[must_use]
    pub fn path_for(&self, workflow_id: &WorkflowId) -> PathBuf {
        self.dir.join(format!("{workflow_id}.json"))
    }
}

impl DefinitionStore for DirectoryStore {
    fn load(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, SourceError> {
        let path = self.path_for(workflow_id);
        if !path.is_file() {
            debug!(path = %path.display(), "no definition file");
            return Ok(None);
        }

        let text = std::fs::read_to_string(&path).map_err(|e| SourceError::StoreFailed {
            workflow_id: workflow_id.clone(),
            details: format!("{}: {e}", path.display()),
        })?;

        let definition = WorkflowDefinition::from_json(&text).context(SourceError::Malformed {
            workflow_id: workflow_id.clone(),
        })?;

        Ok(Some(definition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wf(name: &str) -> WorkflowId {
        WorkflowId::new(name).expect("valid workflow id")
    }

    #[test]
    fn memory_store_returns_inserted_definitions() {
        let store = MemoryStore::new().with(wf("post"), WorkflowDefinition::new("draft"));
        let loaded = store.load(&wf("post")).expect("load");
        assert_eq!(loaded, Some(WorkflowDefinition::new("draft")));
        assert_eq!(store.load(&wf("other")).expect("load"), None);
    }

    #[test]
    fn memory_store_insert_replaces() {
        let store = MemoryStore::new();
        assert!(store.insert(wf("post"), WorkflowDefinition::new("a")).is_none());
        let previous = store.insert(wf("post"), WorkflowDefinition::new("b"));
        assert_eq!(previous, Some(WorkflowDefinition::new("a")));
    }

    #[test]
    fn directory_store_reads_json_files() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(
            dir.path().join("post.json"),
            r#"{ "initial": "draft", "node": [ { "id": "draft" } ] }"#,
        )
        .expect("write definition");

        let store = DirectoryStore::new(dir.path());
        let definition = store
            .load(&wf("post"))
            .expect("load")
            .expect("definition exists");
        assert_eq!(definition.initial, "draft");
        assert_eq!(definition.node.len(), 1);
    }

    #[test]
    fn directory_store_missing_file_is_none() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = DirectoryStore::new(dir.path());
        assert_eq!(store.load(&wf("post")).expect("load"), None);
    }

    #[test]
    fn directory_store_invalid_json_is_malformed() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("post.json"), "{ not json").expect("write definition");

        let store = DirectoryStore::new(dir.path());
        let err = store.load(&wf("post")).unwrap_err();
        assert_eq!(
            err.current_context(),
            &SourceError::Malformed {
                workflow_id: wf("post")
            }
        );
    }
}
