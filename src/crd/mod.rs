//! Custom Resource Definitions for jenkins-sync-operator.
//!
//! - `PipelineConfig`: declarative pipeline definition synced to a Jenkins job

mod pipeline_config;

pub use pipeline_config::*;
