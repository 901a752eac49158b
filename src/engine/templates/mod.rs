//! Notification templates.
//!
//! Every template is compiled once into a shared minijinja environment; each
//! text field of a template becomes its own named minijinja template.
//! Rendering a list of templates merges the results field by field: a later
//! template only overrides fields it renders to non-empty text.

pub mod filters;

use std::collections::BTreeMap;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    EmailNotification, Notification, SlackNotification, TemplateSpec, WebhookNotification,
};

/// Error type for the TemplateService.
#[derive(Debug, Error)]
pub enum TemplateServiceError {
    /// The requested template is unknown.
    #[error("template '{0}' is not supported")]
    NotSupported(String),

    /// A template field failed to parse.
    #[error("failed to compile template '{name}': {source}")]
    Compilation {
        /// Template name.
        name: String,
        /// Underlying minijinja error.
        #[source]
        source: minijinja::Error,
    },

    /// An error occurred while rendering the template.
    #[error("Failed to render template: {0}")]
    RenderError(#[from] minijinja::Error),
}

#[derive(Debug, Default)]
struct CompiledWebhook {
    method: String,
    path: Option<String>,
    body: Option<String>,
}

/// Names of the minijinja templates that make up one notification template.
/// `None` means the field was left empty and is never rendered.
#[derive(Debug, Default)]
struct CompiledTemplate {
    message: Option<String>,
    email: Option<(Option<String>, Option<String>)>,
    slack: Option<(Option<String>, Option<String>)>,
    webhook: BTreeMap<String, CompiledWebhook>,
}

/// A service for rendering notification templates using the minijinja
/// templating engine.
pub struct TemplateService {
    env: Environment<'static>,
    templates: BTreeMap<String, CompiledTemplate>,
}

impl std::fmt::Debug for TemplateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateService").field("templates", &self.templates.keys()).finish()
    }
}

impl Default for TemplateService {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateService {
    /// Creates a service with no templates.
    ///
    /// Missing variables render as empty text, and output is never
    /// HTML-escaped. Templates only see the variables they are rendered with;
    /// there is no access to the environment or the file system.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        env.add_filter("sum", filters::sum);
        env.add_filter("avg", filters::avg);
        env.add_filter("decimals", filters::decimals);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("quote", filters::quote);
        env.add_filter("repo_url_to_https", filters::repo_url_to_https);
        env.add_filter("full_name_by_repo_url", filters::full_name_by_repo_url);
        env.add_filter("date", filters::date);
        env.add_function("now", filters::now);

        Self { env, templates: BTreeMap::new() }
    }

    /// Compiles every template of `specs`.
    pub fn from_specs(specs: &BTreeMap<String, TemplateSpec>) -> Result<Self, TemplateServiceError> {
        let mut service = Self::new();
        for (name, spec) in specs {
            service.compile(name, spec)?;
        }
        Ok(service)
    }

    fn add_field(&mut self, name: &str, field: String, source: &str) -> Result<Option<String>, TemplateServiceError> {
        if source.is_empty() {
            return Ok(None);
        }
        self.env
            .add_template_owned(field.clone(), source.to_string())
            .map_err(|source| TemplateServiceError::Compilation { name: name.to_string(), source })?;
        Ok(Some(field))
    }

    /// Compiles `spec` under `name`, replacing a previous template with the
    /// same name.
    pub fn compile(&mut self, name: &str, spec: &TemplateSpec) -> Result<(), TemplateServiceError> {
        let mut compiled = CompiledTemplate {
            message: self.add_field(name, format!("{name}/message"), &spec.message)?,
            ..Default::default()
        };

        if let Some(email) = &spec.email {
            compiled.email = Some((
                self.add_field(name, format!("{name}/email/subject"), &email.subject)?,
                self.add_field(name, format!("{name}/email/body"), &email.body)?,
            ));
        }
        if let Some(slack) = &spec.slack {
            compiled.slack = Some((
                self.add_field(name, format!("{name}/slack/attachments"), &slack.attachments)?,
                self.add_field(name, format!("{name}/slack/blocks"), &slack.blocks)?,
            ));
        }
        for (hook, webhook) in &spec.webhook {
            compiled.webhook.insert(
                hook.clone(),
                CompiledWebhook {
                    method: webhook.method.clone(),
                    path: self.add_field(name, format!("{name}/webhook/{hook}/path"), &webhook.path)?,
                    body: self.add_field(name, format!("{name}/webhook/{hook}/body"), &webhook.body)?,
                },
            );
        }

        tracing::debug!(template = name, "Compiled notification template");
        self.templates.insert(name.to_string(), compiled);
        Ok(())
    }

    /// Whether a template named `name` is compiled.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Names of the compiled templates.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    fn render_field(&self, field: &Option<String>, vars: &Value) -> Result<String, TemplateServiceError> {
        let Some(field) = field else {
            return Ok(String::new());
        };
        let rendered = self.env.get_template(field)?.render(vars).map_err(|e| {
            tracing::warn!(template = %field, error = %e, "Failed to render template");
            TemplateServiceError::RenderError(e)
        })?;
        Ok(rendered)
    }

    /// Renders `names`, in order, into a single notification.
    pub fn render(&self, names: &[String], vars: &Value) -> Result<Notification, TemplateServiceError> {
        let mut notification = Notification::default();
        for name in names {
            let template =
                self.templates.get(name).ok_or_else(|| TemplateServiceError::NotSupported(name.clone()))?;

            set_if_not_empty(&mut notification.message, self.render_field(&template.message, vars)?);

            if let Some((subject, body)) = &template.email {
                let email = notification.email.get_or_insert_with(EmailNotification::default);
                set_if_not_empty(&mut email.subject, self.render_field(subject, vars)?);
                set_if_not_empty(&mut email.body, self.render_field(body, vars)?);
            }
            if let Some((attachments, blocks)) = &template.slack {
                let slack = notification.slack.get_or_insert_with(SlackNotification::default);
                set_if_not_empty(&mut slack.attachments, self.render_field(attachments, vars)?);
                set_if_not_empty(&mut slack.blocks, self.render_field(blocks, vars)?);
            }
            for (hook, compiled) in &template.webhook {
                let webhook = notification.webhook.entry(hook.clone()).or_insert_with(WebhookNotification::default);
                set_if_not_empty(&mut webhook.method, compiled.method.clone());
                set_if_not_empty(&mut webhook.path, self.render_field(&compiled.path, vars)?);
                set_if_not_empty(&mut webhook.body, self.render_field(&compiled.body, vars)?);
            }
        }
        Ok(notification)
    }
}

fn set_if_not_empty(target: &mut String, value: String) {
    if !value.is_empty() {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec(message: &str) -> TemplateSpec {
        Notification::with_message(message)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_render_message() {
        let mut service = TemplateService::new();
        service.compile("sync-failed", &spec("{{ app.metadata.name }} failed to sync")).unwrap();

        let vars = json!({ "app": { "metadata": { "name": "guestbook" } } });
        let notification = service.render(&names(&["sync-failed"]), &vars).unwrap();
        assert_eq!(notification.message, "guestbook failed to sync");
        assert!(notification.email.is_none());
    }

    #[test]
    fn test_unknown_template() {
        let service = TemplateService::new();
        let err = service.render(&names(&["missing"]), &json!({})).unwrap_err();
        assert!(matches!(err, TemplateServiceError::NotSupported(name) if name == "missing"));
    }

    #[test]
    fn test_invalid_template_fails_compilation() {
        let mut service = TemplateService::new();
        let err = service.compile("broken", &spec("Hello, {{ name }")).unwrap_err();
        assert!(matches!(err, TemplateServiceError::Compilation { ref name, .. } if name == "broken"));
        assert!(!service.contains("broken"));
    }

    #[test]
    fn test_missing_variables_render_empty() {
        let mut service = TemplateService::new();
        service.compile("t", &spec("[{{ app.status.sync.revision }}]")).unwrap();
        let notification = service.render(&names(&["t"]), &json!({ "app": {} })).unwrap();
        assert_eq!(notification.message, "[]");
    }

    #[test]
    fn test_merge_precedence() {
        let mut service = TemplateService::new();
        service
            .compile(
                "base",
                &TemplateSpec {
                    message: "base message".into(),
                    email: Some(EmailNotification {
                        subject: "base subject".into(),
                        body: "base body".into(),
                    }),
                    ..Default::default()
                },
            )
            .unwrap();
        service
            .compile(
                "override",
                &TemplateSpec {
                    message: "{{ missing }}".into(),
                    email: Some(EmailNotification { subject: "new subject".into(), body: String::new() }),
                    ..Default::default()
                },
            )
            .unwrap();

        let notification = service.render(&names(&["base", "override"]), &json!({})).unwrap();
        assert_eq!(notification.message, "base message");
        let email = notification.email.unwrap();
        assert_eq!(email.subject, "new subject");
        assert_eq!(email.body, "base body");
    }

    #[test]
    fn test_channel_payloads() {
        let mut webhook = BTreeMap::new();
        webhook.insert(
            "github".to_string(),
            WebhookNotification {
                method: "POST".into(),
                path: "/repos/{{ app.repo }}/statuses/{{ app.revision }}".into(),
                body: r#"{"state": "{{ state }}"}"#.into(),
            },
        );
        let template = TemplateSpec {
            slack: Some(SlackNotification {
                attachments: String::new(),
                blocks: r#"[{"type": "section", "text": {"type": "mrkdwn", "text": "{{ app.name }}"}}]"#
                    .into(),
            }),
            webhook,
            ..Default::default()
        };
        let service =
            TemplateService::from_specs(&BTreeMap::from([("deployed".to_string(), template)])).unwrap();

        let vars = json!({ "app": { "name": "guestbook", "repo": "org/app", "revision": "abc" }, "state": "success" });
        let notification = service.render(&names(&["deployed"]), &vars).unwrap();

        let slack = notification.slack.unwrap();
        assert!(slack.blocks.contains(r#""text": "guestbook""#));
        assert_eq!(slack.attachments, "");
        let hook = &notification.webhook["github"];
        assert_eq!(hook.method, "POST");
        assert_eq!(hook.path, "/repos/org/app/statuses/abc");
        assert_eq!(hook.body, r#"{"state": "success"}"#);
    }

    #[test]
    fn test_output_is_not_escaped() {
        let mut service = TemplateService::new();
        service.compile("t", &spec("{{ text }}")).unwrap();
        let notification = service.render(&names(&["t"]), &json!({ "text": "<b>&\"" })).unwrap();
        assert_eq!(notification.message, "<b>&\"");
    }

    #[test]
    fn test_custom_filters_are_available() {
        let mut service = TemplateService::new();
        service
            .compile(
                "t",
                &spec("{{ repo | full_name_by_repo_url }} {{ name | trunc(3) }} {{ costs | sum }}"),
            )
            .unwrap();
        let vars = json!({
            "repo": "git@github.com:argoproj/argo-cd.git",
            "name": "guestbook",
            "costs": ["1.5", "2"]
        });
        let notification = service.render(&names(&["t"]), &vars).unwrap();
        assert_eq!(notification.message, "argoproj/argo-cd gue 3.5");
    }
}
