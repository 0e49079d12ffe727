//! PipelineConfig Custom Resource Definition.
//!
//! A PipelineConfig describes a CI pipeline declaratively. The spec is owned
//! by whoever creates the resource; the status block (conditions) is written
//! by the sync controller. Each PipelineConfig corresponds to one Jenkins job
//! addressed by the resource's namespace (folder) and name (job).

use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Resource type label used in metrics and heartbeat tracking.
pub const RESOURCE_TYPE: &str = "pipeline_config";

/// Metadata label marking the kind of a PipelineConfig.
pub const LABEL_PIPELINECONFIG_KIND: &str = "pipelineconfig.kind";

/// Label value marking a multi-branch PipelineConfig.
pub const PIPELINECONFIG_KIND_MULTI_BRANCH: &str = "multi-branch";

/// Metadata label referencing the template a PipelineConfig was created from.
pub const LABEL_PIPELINECONFIG_TEMPLATE: &str = "pipelineconfig.template";

/// Condition type constants.
pub mod conditions {
    /// Set by the external initializer once the resource is ready for sync.
    pub const INITIALIZED: &str = "Initialized";
    /// Owned exclusively by this controller; records job-sync outcome.
    pub const SYNCED: &str = "Synced";
    /// Appended by the dependency checker; never deduplicated here.
    pub const DEPENDENCY: &str = "Dependency";
}

/// Condition status constants.
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Condition reason constants.
pub mod reasons {
    /// The resource spec could not be converted into a Jenkins job, or the
    /// job write failed.
    pub const CREATE_JOB_FAILED: &str = "CREATE_JOB_FAILED";
    /// A required Jenkins plugin is missing or too old.
    pub const PLUGIN_ERROR: &str = "PLUGIN_ERROR";
}

/// PipelineConfig is a custom resource describing a CI pipeline.
///
/// Example:
/// ```yaml
/// apiVersion: devops.jenkins-sync.io/v1alpha1
/// kind: PipelineConfig
/// metadata:
///   name: build
///   namespace: team-a
///   labels:
///     jenkins: ci-main
/// spec:
///   runPolicy: Serial
///   strategy:
///     jenkinsfile: |
///       pipeline { agent any; stages { stage('build') { steps { sh 'make' } } } }
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "devops.jenkins-sync.io",
    version = "v1alpha1",
    kind = "PipelineConfig",
    plural = "pipelineconfigs",
    shortname = "pc",
    status = "PipelineConfigStatus",
    namespaced,
    printcolumn = r#"{"name":"RunPolicy", "type":"string", "jsonPath":".spec.runPolicy"}"#,
    printcolumn = r#"{"name":"Disabled", "type":"boolean", "jsonPath":".spec.disabled"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigSpec {
    /// How concurrent runs of this pipeline are scheduled (default: Serial).
    #[serde(default)]
    pub run_policy: RunPolicy,

    /// Pipeline definition strategy: an inline Jenkinsfile and/or a template
    /// with plugin dependencies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<PipelineStrategy>,

    /// When true the pipeline is disabled and runs are not triggered.
    #[serde(default)]
    pub disabled: bool,

    /// Reference to a graph pipeline template, if this config was derived
    /// from one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PipelineTemplateRef>,
}

/// Run policy for a pipeline.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
pub enum RunPolicy {
    /// Runs are executed one at a time.
    #[default]
    Serial,
    /// Runs may execute concurrently.
    Parallel,
}

impl fmt::Display for RunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPolicy::Serial => write!(f, "Serial"),
            RunPolicy::Parallel => write!(f, "Parallel"),
        }
    }
}

/// How the pipeline definition is produced.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStrategy {
    /// Inline declarative Jenkinsfile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jenkinsfile: Option<String>,

    /// Template the pipeline was instantiated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PipelineConfigTemplate>,
}

/// A pipeline template instantiation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigTemplate {
    /// Template name.
    #[serde(default)]
    pub name: String,

    /// Template spec carrying dependency requirements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<PipelineTemplateSpec>,
}

/// Spec of a pipeline template.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTemplateSpec {
    /// Execution-engine dependencies required by this template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<PipelineDependencies>,
}

/// Dependency requirements of a template.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDependencies {
    /// Required Jenkins plugins with minimum versions.
    #[serde(default)]
    pub plugins: Vec<PluginDependency>,
}

/// A required plugin and its minimum version.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PluginDependency {
    /// Plugin short name.
    pub name: String,
    /// Minimum required version.
    pub version: String,
}

/// Reference to a graph pipeline template.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTemplateRef {
    /// Name of the referenced pipeline template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_template: Option<String>,
}

/// Status of a PipelineConfig. Owned by this controller.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigStatus {
    /// Conditions describing sync state, at most one per controller-owned
    /// type, looked up by type rather than position.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition describes one aspect of resource state.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's current status.
    #[serde(default)]
    pub reason: String,
    /// Human-readable message with details.
    #[serde(default)]
    pub message: String,
    /// Last time this controller attempted the action the condition records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<String>,
}

impl Condition {
    /// Create a new condition stamped with the current time.
    pub fn new(condition_type: &str, status: &str, reason: &str, message: &str) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_attempt: Some(jiff::Timestamp::now().to_string()),
        }
    }

    /// Create a dependency-check failure condition.
    pub fn dependency_failure(message: &str) -> Self {
        Self::new(
            conditions::DEPENDENCY,
            condition_status::FALSE,
            reasons::PLUGIN_ERROR,
            message,
        )
    }
}

/// Key identifying a resource for reconciliation: (namespace, name).
///
/// Carries no payload so every processing attempt re-reads current state.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&PipelineConfig> for ReconcileKey {
    fn from(pc: &PipelineConfig) -> Self {
        Self {
            namespace: pc.namespace().unwrap_or_default(),
            name: pc.name_any(),
        }
    }
}

impl PipelineConfig {
    /// Whether runs are scheduled serially.
    pub fn is_serial(&self) -> bool {
        self.spec.run_policy == RunPolicy::Serial
    }

    /// Whether runs may execute concurrently.
    pub fn is_parallel(&self) -> bool {
        self.spec.run_policy == RunPolicy::Parallel
    }

    /// Whether this config was instantiated from a template with a spec.
    pub fn created_from_template(&self) -> bool {
        self.spec
            .strategy
            .as_ref()
            .and_then(|s| s.template.as_ref())
            .is_some_and(|t| t.spec.is_some())
    }

    /// Whether this config is a multi-branch pipeline, per metadata label.
    pub fn is_multi_branch(&self) -> bool {
        self.labels()
            .get(LABEL_PIPELINECONFIG_KIND)
            .is_some_and(|v| v == PIPELINECONFIG_KIND_MULTI_BRANCH)
    }

    /// Whether this config is a template pipeline, per metadata label.
    pub fn is_template_pipeline(&self) -> bool {
        self.labels()
            .get(LABEL_PIPELINECONFIG_TEMPLATE)
            .is_some_and(|v| !v.is_empty())
    }

    /// Whether this config references a graph pipeline template.
    pub fn is_graph_pipeline(&self) -> bool {
        self.spec
            .template
            .as_ref()
            .is_some_and(|t| t.pipeline_template.is_some())
    }

    /// Update the disabled flag if it differs from the requested value.
    pub fn update_disabled_status(&mut self, disabled: bool) {
        if self.spec.disabled != disabled {
            self.spec.disabled = disabled;
        }
    }
}
