//! Minijinja template rendering for alert notification messages.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use crate::traits::{AlertEvent, NotifyError};

/// Context data available to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub alert_type: String,
    pub severity: String,
    pub batch_id: Option<String>,
    pub value: Option<f64>,
    pub message: String,
    pub metadata: serde_json::Value,
    /// Current timestamp in ISO 8601 format.
    pub now: String,
}

impl From<&AlertEvent> for TemplateContext {
    fn from(event: &AlertEvent) -> Self {
        Self {
            alert_type: event.alert_type.clone(),
            severity: event.severity.clone(),
            batch_id: event.batch_id.clone(),
            value: event.value,
            message: event.message.clone(),
            metadata: event.metadata.clone(),
            now: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Renders notification templates using minijinja.
///
/// A fresh [`minijinja::Environment`] is created per render call since
/// templates are dynamic strings, not pre-registered files.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    /// Create a new template renderer.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        // Register custom filters
        env.add_filter("round", round_filter);

        // `lower` and `upper` are built-in with the "builtins" feature,
        // but we register explicit versions to guarantee availability.
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);

        // Register global `env()` function for environment variable access
        env.add_function("env", env_function);

        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails (e.g., type errors, undefined variables in strict mode).
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    ///
    /// This does not evaluate the template — it only checks syntax.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template has syntax errors.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        // Parse the template to check for syntax errors without evaluating.
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

/// Custom filter: lowercase a string.
fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

/// Custom filter: uppercase a string.
fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Global function: read an environment variable by name.
///
/// Returns the variable value, or an empty string if not found
/// (with a warning logged via tracing).
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}

/// Default subject/body templates used when no custom template is configured.
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "[{{ severity | upper }}] {{ alert_type }}";
pub const DEFAULT_BODY_TEMPLATE: &str =
    "{{ message }}\n\nbatch_id: {{ batch_id }}\nvalue: {{ value }}\nraised_at: {{ now }}";

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> TemplateContext {
        TemplateContext {
            alert_type: "batch.success_rate".to_string(),
            severity: "critical".to_string(),
            batch_id: Some("batch-123".to_string()),
            value: Some(0.62),
            message: "success rate dropped below threshold".to_string(),
            metadata: serde_json::json!({}),
            now: "2026-02-16T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn render_basic_template() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();

        let template = "Alert: {{ alert_type }} for {{ batch_id }}";
        let result = renderer.render(template, &ctx).unwrap();
        assert_eq!(result, "Alert: batch.success_rate for batch-123");
    }

    #[test]
    fn render_round_filter() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();

        let template = "Value: {{ value | round(2) }}";
        let result = renderer.render(template, &ctx).unwrap();
        assert_eq!(result, "Value: 0.62");
    }

    #[test]
    fn render_upper_lower_filters() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();

        assert_eq!(renderer.render("{{ severity | upper }}", &ctx).unwrap(), "CRITICAL");
        assert_eq!(renderer.render("{{ severity | lower }}", &ctx).unwrap(), "critical");
    }

    #[test]
    fn render_env_function() {
        std::env::set_var("FEEDLINE_NOTIFY_TEST_VAR", "hello_notify");

        let renderer = TemplateRenderer::new();
        let ctx = sample_context();

        let template = "Env: {{ env('FEEDLINE_NOTIFY_TEST_VAR') }}";
        let result = renderer.render(template, &ctx).unwrap();
        assert_eq!(result, "Env: hello_notify");

        std::env::remove_var("FEEDLINE_NOTIFY_TEST_VAR");
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();

        let result = renderer.render("{{ unclosed", &ctx);
        assert!(result.is_err());
    }

    #[test]
    fn validate_invalid_template() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.validate("{{ unclosed").is_err());
    }

    #[test]
    fn default_templates_render_without_error() {
        let renderer = TemplateRenderer::new();
        let ctx = sample_context();
        assert!(renderer.render(DEFAULT_SUBJECT_TEMPLATE, &ctx).is_ok());
        assert!(renderer.render(DEFAULT_BODY_TEMPLATE, &ctx).is_ok());
    }
}
