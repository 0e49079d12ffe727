//! Dependency checker: plugin presence and minimum-version enforcement.

use std::collections::HashMap;

use jenkins_sync_operator::controller::dependency::dependency_check;
use jenkins_sync_operator::crd::{Condition, condition_status, reasons};
use jenkins_sync_operator::jenkins::InstalledPlugins;

use crate::fixtures::*;

fn inventory(plugins: &[(&str, &str)]) -> InstalledPlugins {
    InstalledPlugins::from_map(
        plugins
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect::<HashMap<_, _>>(),
    )
}

fn check(pc: &jenkins_sync_operator::crd::PipelineConfig, installed: &[(&str, &str)]) -> Vec<Condition> {
    let mut conditions = Vec::new();
    dependency_check(&pc.spec, &inventory(installed), &mut conditions);
    conditions
}

#[test]
fn test_missing_plugin_appends_one_condition() {
    let pc = with_template_plugins(pipeline_config("team-a", "build"), vec![("foo", "2.0")]);
    let conditions = check(&pc, &[]);

    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].reason, reasons::PLUGIN_ERROR);
    assert_eq!(conditions[0].status, condition_status::FALSE);
    assert!(conditions[0].message.contains("foo"));
    assert!(conditions[0].message.contains("2.0"));
}

#[test]
fn test_outdated_plugin_appends_one_condition() {
    let pc = with_template_plugins(pipeline_config("team-a", "build"), vec![("foo", "2.0")]);
    let conditions = check(&pc, &[("foo", "1.5")]);

    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].reason, reasons::PLUGIN_ERROR);
    assert!(conditions[0].message.contains("foo"));
    assert!(conditions[0].message.contains("2.0"));
    assert!(conditions[0].message.contains("1.5"));
}

#[test]
fn test_satisfied_plugin_appends_nothing() {
    let pc = with_template_plugins(pipeline_config("team-a", "build"), vec![("foo", "2.0")]);
    assert!(check(&pc, &[("foo", "2.1")]).is_empty());
    assert!(check(&pc, &[("foo", "2.0")]).is_empty());
}

#[test]
fn test_non_template_spec_is_ignored() {
    let pc = with_jenkinsfile(pipeline_config("team-a", "build"));
    assert!(check(&pc, &[]).is_empty());
}

#[test]
fn test_template_without_dependencies_is_ignored() {
    let pc = with_template_plugins(pipeline_config("team-a", "build"), vec![]);
    assert!(check(&pc, &[]).is_empty());
}

#[test]
fn test_each_failing_dependency_appends_its_own_condition() {
    let pc = with_template_plugins(
        pipeline_config("team-a", "build"),
        vec![("foo", "2.0"), ("bar", "1.0"), ("ok", "1.0")],
    );
    let conditions = check(&pc, &[("bar", "0.9"), ("ok", "3.4")]);

    // One for the missing plugin, one for the outdated one; the satisfied
    // plugin contributes nothing.
    assert_eq!(conditions.len(), 2);
    assert!(conditions.iter().all(|c| c.reason == reasons::PLUGIN_ERROR));
}
