//! Engine configuration.
//!
//! Configuration is loaded via the `config` crate, either from environment
//! variables (`STATUSFLOW__RUNTIME__AUTO_INSERT=false`) or from a file whose
//! format follows its extension.

use serde::Deserialize;
use statusflow_core::WorkflowId;
use std::path::{Path, PathBuf};

/// Prefix of the environment variables read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "STATUSFLOW";

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Per-entity runtime behavior.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Where workflow definitions are read from.
    #[serde(default)]
    pub source: SourceConfig,
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from a file, then lets environment variables override it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

/// How a runtime binds to its entity.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Workflow used when the entity does not supply one.
    #[serde(default)]
    pub default_workflow: Option<WorkflowId>,

    /// Insert new entities into the default workflow when attaching.
    #[serde(default = "default_true")]
    pub auto_insert: bool,

    /// Run edge actions and post-commit events while the transition runs.
    /// When false, save-driven transitions replay them after the entity is written.
    #[serde(default = "default_true")]
    pub transition_before_save: bool,

    /// Fire lifecycle events at all.
    #[serde(default = "default_true")]
    pub enable_events: bool,

    /// Name of the entity attribute holding the status, used in validation errors.
    #[serde(default = "default_status_attribute")]
    pub status_attribute: String,

    /// Prefix of workflow ids derived from the entity type name.
    #[serde(default = "default_workflow_name_prefix")]
    pub workflow_name_prefix: String,
}

fn default_true() -> bool {
    true
}

fn default_status_attribute() -> String {
    "status".to_string()
}

fn default_workflow_name_prefix() -> String {
    "sw".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_workflow: None,
            auto_insert: default_true(),
            transition_before_save: default_true(),
            enable_events: default_true(),
            status_attribute: default_status_attribute(),
            workflow_name_prefix: default_workflow_name_prefix(),
        }
    }
}

impl RuntimeConfig {
    /// Sets the default workflow.
    #[must_use]
    pub fn with_default_workflow(mut self, workflow_id: WorkflowId) -> Self {
        self.default_workflow = Some(workflow_id);
        self
    }

    /// Sets whether new entities are inserted into their workflow on attach.
    #[must_use]
    pub fn with_auto_insert(mut self, auto_insert: bool) -> Self {
        self.auto_insert = auto_insert;
        self
    }

    /// Sets the event timing policy.
    #[must_use]
    pub fn with_transition_before_save(mut self, before_save: bool) -> Self {
        self.transition_before_save = before_save;
        self
    }

    /// Turns lifecycle events on or off.
    #[must_use]
    pub fn with_events(mut self, enabled: bool) -> Self {
        self.enable_events = enabled;
        self
    }
}

/// Where workflow definitions live.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// Directory holding one `<workflow id>.json` file per workflow.
    /// Without it, workflows must be registered programmatically.
    #[serde(default)]
    pub definition_dir: Option<PathBuf>,
}
