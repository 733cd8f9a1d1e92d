//! Artifact, test-report and cache steps, all emitted as plugin steps.

use serde_json::Value;

use crate::ir::{PluginSpec, Step, StepSpec};
use crate::lower::context::StepContext;
use crate::parse::{Param, SpanNode};

use super::{Converted, Skipped, required, step_for};

pub const ARCHIVE_IMAGE: &str = "plugins/archive";
pub const JUNIT_IMAGE: &str = "plugins/junit";
pub const CACHE_IMAGE: &str = "plugins/cache";
pub const S3_IMAGE: &str = "plugins/s3";

pub fn archive_artifacts(node: &SpanNode, ctx: &StepContext) -> Converted {
    let artifacts = non_empty(patterns(node.param("artifacts")), "artifacts")?;
    let plugin = PluginSpec::new(ARCHIVE_IMAGE)
        .with("artifacts", artifacts)
        .with("excludes", patterns(node.param("excludes")))
        .with_opt("allow_empty", node.param("allowEmptyArchive").as_bool())
        .with_opt("fingerprint", node.param("fingerprint").as_bool());
    Ok(vec![plugin_step(node, ctx, plugin)])
}

pub fn junit(node: &SpanNode, ctx: &StepContext) -> Converted {
    let reports = non_empty(patterns(node.param("testResults")), "testResults")?;
    let plugin = PluginSpec::new(JUNIT_IMAGE)
        .with("test_results", reports)
        .with_opt("allow_empty_results", node.param("allowEmptyResults").as_bool());
    Ok(vec![plugin_step(node, ctx, plugin)])
}

/// `stash` saves files under a cache key; `unstash` restores them.
pub fn stash(node: &SpanNode, ctx: &StepContext) -> Converted {
    let name = required(node.param("name").as_text(), "name")?;
    let mut mount = patterns(node.param("includes"));
    if mount.is_empty() {
        mount.push(".".to_string());
    }
    let plugin = PluginSpec::new(CACHE_IMAGE)
        .with("cache_key", stash_key(&name))
        .with("mount", mount)
        .with("exclude", patterns(node.param("excludes")))
        .with("rebuild", true);
    Ok(vec![plugin_step(node, ctx, plugin)])
}

pub fn unstash(node: &SpanNode, ctx: &StepContext) -> Converted {
    let name = required(node.param("name").as_text(), "name")?;
    let plugin = PluginSpec::new(CACHE_IMAGE)
        .with("cache_key", stash_key(&name))
        .with("restore", true);
    Ok(vec![plugin_step(node, ctx, plugin)])
}

fn stash_key(name: &str) -> String {
    format!("stash-{}-<+pipeline.sequenceId>", name.trim())
}

/// `s3Upload` only exports its settings through the sidecar.
pub fn s3_upload(node: &SpanNode, ctx: &StepContext) -> Converted {
    let sidecar = node.sidecar();
    let sources = [sidecar.root(), node.params()];
    let read = |key: &str| sources.iter().find_map(|p| p.find(key).as_text());

    let bucket = required(read("bucket"), "bucket")?;
    let source = read("file")
        .or_else(|| read("includePathPattern"))
        .unwrap_or_else(|| "**".to_string());

    let plugin = PluginSpec::new(S3_IMAGE)
        .with("bucket", bucket)
        .with("source", source)
        .with_opt("target", read("path"))
        .with_opt("region", read("region"))
        .with_opt("strip_prefix", read("workingDir"))
        .with("aws_access_key_id", Value::String("<+secrets.getValue(\"aws_access_key_id\")>".into()))
        .with("aws_secret_access_key", Value::String("<+secrets.getValue(\"aws_secret_access_key\")>".into()));
    Ok(vec![plugin_step(node, ctx, plugin)])
}

fn non_empty(patterns: Vec<String>, missing: &'static str) -> Result<Vec<String>, Skipped> {
    if patterns.is_empty() {
        return Err(Skipped { missing });
    }
    Ok(patterns)
}

/// Ant-style patterns from a comma-separated string or a list.
fn patterns(value: Param<'_>) -> Vec<String> {
    value
        .as_string_list()
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn plugin_step(node: &SpanNode, ctx: &StepContext, mut plugin: PluginSpec) -> Step {
    plugin.connector = ctx.container.connector.clone();
    plugin.envs = ctx.environment.clone();
    step_for(node, ctx, StepSpec::Plugin(plugin))
}
