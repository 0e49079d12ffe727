//! Dependency/version checker for template-derived pipelines.
//!
//! Pure annotation pass: failing requirements append conditions, they never
//! block the job-sync attempt. Appended conditions are not deduplicated
//! against prior identical entries; display layers may dedupe.

use semver::Version;
use tracing::info;

use crate::crd::{Condition, PipelineConfigSpec};
use crate::jenkins::PluginInventory;

/// Check the spec's template plugin requirements against the installed
/// inventory, appending one failure condition per unmet requirement.
pub fn dependency_check(
    spec: &PipelineConfigSpec,
    inventory: &dyn PluginInventory,
    conditions: &mut Vec<Condition>,
) {
    // Only template-derived specs declare dependencies.
    let Some(template_spec) = spec
        .strategy
        .as_ref()
        .and_then(|s| s.template.as_ref())
        .and_then(|t| t.spec.as_ref())
    else {
        return;
    };

    let plugins = template_spec
        .dependencies
        .as_ref()
        .map(|d| d.plugins.as_slice())
        .unwrap_or_default();
    if plugins.is_empty() {
        info!("PipelineConfig template has no dependencies");
        return;
    }

    for plugin in plugins {
        match inventory.installed_version(&plugin.name) {
            None => {
                conditions.push(Condition::dependency_failure(&format!(
                    "Lack plugin: {}, version: {}",
                    plugin.name, plugin.version
                )));
            }
            Some(installed) => {
                if is_older_than(&installed, &plugin.version) {
                    conditions.push(Condition::dependency_failure(&format!(
                        "Require plugin: {}, version: {}, found {}",
                        plugin.name, plugin.version, installed
                    )));
                }
            }
        }
    }
}

/// Whether `installed` is older than `required`, by semantic version.
///
/// Returns false when either version cannot be parsed, allowing the sync to
/// proceed rather than failing on exotic version strings.
fn is_older_than(installed: &str, required: &str) -> bool {
    match (parse_version(installed), parse_version(required)) {
        (Some(installed), Some(required)) => installed < required,
        _ => false,
    }
}

/// Parse a plugin version leniently.
///
/// Strips suffixes like "-beta" and pads missing components, so "2" parses
/// as "2.0.0" and "4.11-rc" as "4.11.0".
fn parse_version(tag: &str) -> Option<Version> {
    let version_part = tag.split('-').next().unwrap_or(tag);

    let normalized = match version_part.matches('.').count() {
        0 => format!("{}.0.0", version_part),
        1 => format!("{}.0", version_part),
        _ => version_part.to_string(),
    };

    Version::parse(&normalized).ok()
}
