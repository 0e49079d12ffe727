//! REST-backed Jenkins client.
//!
//! Jobs live under a folder per namespace: `/job/<namespace>/job/<name>`.
//! Freshness is tracked by embedding a digest of the serialized spec in the
//! job description; `has_synced_job` compares the stored digest against the
//! current spec instead of diffing job XML.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::crd::{PipelineConfig, ReconcileKey};
use crate::jenkins::{JobSync, JobSyncError, PluginInventory};

/// Marker prefix for the spec digest stored in the job description.
const DIGEST_MARKER: &str = "pipeline-config-digest:";

/// Credentials and endpoint for a Jenkins instance.
#[derive(Clone, Debug)]
pub struct JenkinsEndpoint {
    pub base_url: String,
    pub username: String,
    pub api_token: String,
}

/// REST implementation of [`JobSync`].
pub struct RestJobSync {
    http: reqwest::Client,
    endpoint: JenkinsEndpoint,
}

#[derive(Deserialize)]
struct JobInfo {
    #[serde(default)]
    description: Option<String>,
}

impl RestJobSync {
    pub fn new(http: reqwest::Client, endpoint: JenkinsEndpoint) -> Self {
        Self { http, endpoint }
    }

    fn job_url(&self, key: &ReconcileKey) -> String {
        format!(
            "{}/job/{}/job/{}",
            self.endpoint.base_url.trim_end_matches('/'),
            key.namespace,
            key.name
        )
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .basic_auth(&self.endpoint.username, Some(&self.endpoint.api_token))
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .basic_auth(&self.endpoint.username, Some(&self.endpoint.api_token))
    }

    async fn job_info(&self, key: &ReconcileKey) -> Result<Option<JobInfo>, JobSyncError> {
        let url = format!("{}/api/json?tree=description", self.job_url(key));
        let response = self.get(url).send().await.map_err(io_err)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let info = response.json::<JobInfo>().await.map_err(io_err)?;
                Ok(Some(info))
            }
            status => Err(JobSyncError::Io(format!(
                "unexpected status {status} querying job {key}"
            ))),
        }
    }
}

#[async_trait]
impl JobSync for RestJobSync {
    async fn has_synced_job(&self, pc: &PipelineConfig) -> Result<bool, JobSyncError> {
        let key = ReconcileKey::from(pc);
        let digest = spec_digest(pc)?;
        match self.job_info(&key).await? {
            Some(info) => {
                let synced = info
                    .description
                    .is_some_and(|d| d.contains(&digest_marker(&digest)));
                Ok(synced)
            }
            None => Ok(false),
        }
    }

    async fn upsert_job(&self, pc: &PipelineConfig) -> Result<bool, JobSyncError> {
        let key = ReconcileKey::from(pc);
        let config = job_config_xml(pc)?;

        let exists = self.job_info(&key).await?.is_some();
        let url = if exists {
            format!("{}/config.xml", self.job_url(&key))
        } else {
            format!(
                "{}/job/{}/createItem?name={}",
                self.endpoint.base_url.trim_end_matches('/'),
                key.namespace,
                key.name
            )
        };

        debug!(job = %key, exists, "Writing Jenkins job config");
        let response = self
            .post(url)
            .header("Content-Type", "text/xml")
            .body(config)
            .send()
            .await
            .map_err(io_err)?;

        if response.status().is_success() {
            Ok(true)
        } else {
            Err(JobSyncError::Io(format!(
                "unexpected status {} writing job {key}",
                response.status()
            )))
        }
    }

    async fn delete_job(&self, key: &ReconcileKey) -> Result<bool, JobSyncError> {
        let url = format!("{}/doDelete", self.job_url(key));
        let response = self.post(url).send().await.map_err(io_err)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() || status.is_redirection() => Ok(true),
            status => Err(JobSyncError::Io(format!(
                "unexpected status {status} deleting job {key}"
            ))),
        }
    }
}

fn io_err(err: reqwest::Error) -> JobSyncError {
    JobSyncError::Io(err.to_string())
}

fn digest_marker(digest: &str) -> String {
    format!("{DIGEST_MARKER}{digest}")
}

/// SHA-256 digest of the serialized spec; changes whenever the spec does.
pub fn spec_digest(pc: &PipelineConfig) -> Result<String, JobSyncError> {
    let bytes = serde_json::to_vec(&pc.spec).map_err(|e| JobSyncError::Conversion(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Render the flow-definition config XML for a resource.
///
/// The inline Jenkinsfile from the strategy is the pipeline script; a spec
/// without one cannot be converted into a job.
fn job_config_xml(pc: &PipelineConfig) -> Result<String, JobSyncError> {
    let script = pc
        .spec
        .strategy
        .as_ref()
        .and_then(|s| s.jenkinsfile.as_deref())
        .ok_or_else(|| {
            JobSyncError::Conversion("spec strategy carries no jenkinsfile".to_string())
        })?;

    let digest = spec_digest(pc)?;
    let disabled = pc.spec.disabled;
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<flow-definition plugin="workflow-job">
  <description>{}</description>
  <disabled>{disabled}</disabled>
  <definition class="org.jenkinsci.plugins.workflow.cps.CpsFlowDefinition" plugin="workflow-cps">
    <script>{}</script>
    <sandbox>true</sandbox>
  </definition>
</flow-definition>
"#,
        xml_escape(&digest_marker(&digest)),
        xml_escape(script)
    ))
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Snapshot of installed Jenkins plugins, fetched once at startup.
pub struct InstalledPlugins {
    plugins: HashMap<String, String>,
}

#[derive(Deserialize)]
struct PluginList {
    #[serde(default)]
    plugins: Vec<PluginEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PluginEntry {
    short_name: String,
    version: String,
}

impl InstalledPlugins {
    /// Query `pluginManager/api/json` for the installed plugin set.
    pub async fn fetch(
        http: &reqwest::Client,
        endpoint: &JenkinsEndpoint,
    ) -> Result<Self, JobSyncError> {
        let url = format!(
            "{}/pluginManager/api/json?depth=1&tree=plugins[shortName,version]",
            endpoint.base_url.trim_end_matches('/')
        );
        let response = http
            .get(url)
            .basic_auth(&endpoint.username, Some(&endpoint.api_token))
            .send()
            .await
            .map_err(io_err)?;

        if !response.status().is_success() {
            return Err(JobSyncError::Io(format!(
                "unexpected status {} listing plugins",
                response.status()
            )));
        }

        let list = response.json::<PluginList>().await.map_err(io_err)?;
        let plugins = list
            .plugins
            .into_iter()
            .map(|p| (p.short_name, p.version))
            .collect();
        Ok(Self { plugins })
    }

    pub fn from_map(plugins: HashMap<String, String>) -> Self {
        Self { plugins }
    }
}

impl PluginInventory for InstalledPlugins {
    fn installed_version(&self, name: &str) -> Option<String> {
        self.plugins.get(name).cloned()
    }
}
