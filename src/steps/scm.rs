//! `checkout` / `git`: an explicit clone step plus the pipeline's repository.
//!
//! Besides the step itself, a checkout span reports the repository it
//! cloned and the stage clone settings. The walker collects those through
//! `repository` and `clone_spec`; the first checkout seen wins.

use crate::ir::{CloneSpec, PluginSpec, Repository, StepSpec};
use crate::lower::context::StepContext;
use crate::parse::{Param, SpanNode};

use super::{Converted, required, step_for};

pub const GIT_CLONE_IMAGE: &str = "harness/drone-git";

pub fn checkout(node: &SpanNode, ctx: &StepContext) -> Converted {
    let repo = required(repository(node), "repository url")?;
    let depth = clone_depth(node);

    let mut plugin = PluginSpec::new(GIT_CLONE_IMAGE)
        .with("repo_url", repo.url)
        .with_opt("branch", repo.branch)
        .with_opt("depth", depth);
    plugin.connector = ctx.container.connector.clone();
    plugin.envs = ctx.environment.clone();
    Ok(vec![step_for(node, ctx, StepSpec::Plugin(plugin))])
}

/// Repository details from a checkout span, when it names a url.
pub fn repository(node: &SpanNode) -> Option<Repository> {
    let sidecar = node.sidecar();
    let sources = [node.params(), sidecar.root()];

    let url = first(&sources, |p| p.find("url").as_text())?;
    let branch = first(&sources, |p| {
        p.get("branch")
            .as_text()
            .or_else(|| branch_spec(p.find("branches")))
    });
    let connector = first(&sources, |p| p.find("credentialsId").as_text());

    Some(Repository {
        url,
        branch: branch.map(|b| normalize_branch(&b)),
        connector,
    })
}

/// Stage clone settings for a converted checkout. The implicit clone is
/// disabled because the checkout became an explicit step.
pub fn clone_spec(node: &SpanNode) -> CloneSpec {
    CloneSpec {
        disabled: true,
        depth: clone_depth(node),
    }
}

fn clone_depth(node: &SpanNode) -> Option<u32> {
    let sidecar = node.sidecar();
    let sources = [node.params(), sidecar.root()];
    first(&sources, |p| p.find("depth").as_f64())
        .filter(|d| *d >= 1.0)
        .map(|d| d as u32)
}

fn first<'a, T>(sources: &[Param<'a>], read: impl Fn(&Param<'a>) -> Option<T>) -> Option<T> {
    sources.iter().find_map(read)
}

/// `branches: [[name: '*/main']]` as exported by the git SCM step.
fn branch_spec(branches: Param<'_>) -> Option<String> {
    match branches.as_list().first() {
        Some(entry) => Param::new(Some(entry)).get("name").as_text(),
        None => branches.get("name").as_text(),
    }
}

fn normalize_branch(branch: &str) -> String {
    let trimmed = branch.trim();
    let trimmed = trimmed.strip_prefix("refs/heads/").unwrap_or(trimmed);
    trimmed.strip_prefix("*/").unwrap_or(trimmed).to_string()
}
