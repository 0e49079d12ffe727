//! jenkins-sync-operator library crate.
//!
//! Watches PipelineConfig custom resources and reconciles them into Jenkins
//! jobs: a watch-driven informer feeds a deduplicating, rate-limited work
//! queue; a worker pool runs the reconciler, which converges the Jenkins
//! job and records the outcome as status conditions on the resource.

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod informer;
pub mod jenkins;
pub mod queue;

pub use health::HealthState;

use std::sync::Arc;

use kube::Client;
use tracing::info;

use client::KubePipelineConfigApi;
use config::SyncConfig;
use controller::error::Error;
use controller::manager::ControllerManager;
use jenkins::rest::JenkinsEndpoint;
use jenkins::{InstalledPlugins, RestJobSync};

/// Build the production controller manager: kube-backed resource API,
/// REST-backed Jenkins client, plugin inventory fetched once at startup.
pub async fn build_controller_manager(
    config: SyncConfig,
    client: Client,
    health: Arc<HealthState>,
) -> Result<ControllerManager, Error> {
    let endpoint = JenkinsEndpoint {
        base_url: config.jenkins_url.clone(),
        username: config.jenkins_username.clone(),
        api_token: config.jenkins_api_token.clone(),
    };
    let http = reqwest::Client::new();

    info!(jenkins_url = %endpoint.base_url, "Loading Jenkins plugin inventory");
    let plugins = InstalledPlugins::fetch(&http, &endpoint).await?;

    let api = Arc::new(KubePipelineConfigApi::new(client));
    let job_sync = Arc::new(RestJobSync::new(http, endpoint));

    Ok(ControllerManager::new(
        config,
        api,
        job_sync,
        Arc::new(plugins),
        health,
    ))
}
