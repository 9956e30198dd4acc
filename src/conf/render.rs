//! Per-host placeholder rendering for configuration values.

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::Result;

/// Values a configuration template may refer to.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateVars {
    pub hostname: String,
    pub coordinator: String,
    pub http_port: String,
    pub node_environment: String,
}

pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    /// Strict mode: a placeholder naming an unknown variable is an error.
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        handlebars_misc_helpers::register(&mut registry);
        Self { registry }
    }

    pub fn render(&self, template: &str, vars: &TemplateVars) -> Result<String> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        Ok(self.registry.render_template(template, vars)?)
    }
}
