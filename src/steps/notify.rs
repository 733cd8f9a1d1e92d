//! Notification steps: Slack, email and Jira.
//!
//! Values the trace cannot supply are emitted as `<+input>` runtime inputs
//! or `<+secrets.getValue(...)>` references. Both are opaque tokens and are
//! written out unchanged.

use crate::ir::{PluginSpec, Step, StepSpec};
use crate::lower::context::StepContext;
use crate::parse::SpanNode;

use super::{Converted, required, step_for};

pub const SLACK_IMAGE: &str = "plugins/slack";
pub const EMAIL_IMAGE: &str = "plugins/email";
pub const JIRA_IMAGE: &str = "plugins/jira";

const RUNTIME_INPUT: &str = "<+input>";

fn secret(name: &str) -> String {
    format!("<+secrets.getValue(\"{}\")>", name)
}

pub fn slack_send(node: &SpanNode, ctx: &StepContext) -> Converted {
    let webhook_secret = node
        .param("tokenCredentialId")
        .as_text()
        .unwrap_or_else(|| "slack_webhook".to_string());
    let plugin = PluginSpec::new(SLACK_IMAGE)
        .with("webhook", secret(&webhook_secret))
        .with_opt("channel", node.param("channel").as_text())
        .with_opt("template", node.param("message").as_text())
        .with_opt("color", node.param("color").as_text());
    Ok(vec![plugin_step(node, ctx, plugin)])
}

/// `mail` and `emailext` share parameter names.
pub fn mail(node: &SpanNode, ctx: &StepContext) -> Converted {
    let to = required(node.param("to").as_text(), "recipients")?;
    let plugin = PluginSpec::new(EMAIL_IMAGE)
        .with("recipients", to)
        .with_opt("cc", node.param("cc").as_text())
        .with_opt("bcc", node.param("bcc").as_text())
        .with_opt("from", node.param("from").as_text())
        .with_opt("subject", node.param("subject").as_text())
        .with_opt("body", node.param("body").as_text())
        .with("host", RUNTIME_INPUT)
        .with("port", RUNTIME_INPUT)
        .with("password", secret("smtp_password"));
    Ok(vec![plugin_step(node, ctx, plugin)])
}

pub fn jira_build_info(node: &SpanNode, ctx: &StepContext) -> Converted {
    let sidecar = node.sidecar();
    let site = sidecar
        .get("site")
        .as_text()
        .or_else(|| node.param("site").as_text());
    let plugin = PluginSpec::new(JIRA_IMAGE)
        .with("connect_key", secret("jira_connect_key"))
        .with("instance", site.unwrap_or_else(|| RUNTIME_INPUT.to_string()))
        .with("project", RUNTIME_INPUT)
        .with_opt("branch", sidecar.get("branch").as_text());
    Ok(vec![plugin_step(node, ctx, plugin)])
}

pub fn jira_deployment_info(node: &SpanNode, ctx: &StepContext) -> Converted {
    let sidecar = node.sidecar();
    let read = |key: &str| {
        sidecar
            .get(key)
            .as_text()
            .or_else(|| node.param(key).as_text())
    };
    let plugin = PluginSpec::new(JIRA_IMAGE)
        .with("connect_key", secret("jira_connect_key"))
        .with("instance", read("site").unwrap_or_else(|| RUNTIME_INPUT.to_string()))
        .with("project", RUNTIME_INPUT)
        .with_opt("environment_id", read("environmentId"))
        .with_opt("environment_name", read("environmentName"))
        .with_opt("environment_type", read("environmentType"))
        .with_opt("state", read("state"));
    Ok(vec![plugin_step(node, ctx, plugin)])
}

fn plugin_step(node: &SpanNode, ctx: &StepContext, mut plugin: PluginSpec) -> Step {
    plugin.connector = ctx.container.connector.clone();
    plugin.envs = ctx.environment.clone();
    step_for(node, ctx, StepSpec::Plugin(plugin))
}
