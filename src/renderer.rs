//! Template rendering for skeleton files.
//! Files are Mustache templates: `{{name}}` interpolation (HTML-escaped),
//! `{{{name}}}` for raw output, and `{{#section}}` / `{{^inverted}}` blocks.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Values substituted into templates, keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderContext(serde_json::Map<String, serde_json::Value>);

impl RenderContext {
    pub fn new(values: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(values)
    }

    /// Parses a JSON object, falling back to YAML for hand-written values.
    pub fn parse(content: &str) -> Result<Self> {
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(content) {
            Ok(values) => Ok(Self(values)),
            Err(json_err) => serde_yaml::from_str(content).map(Self).map_err(|_| json_err.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

/// Trait for template rendering engines.
pub trait TemplateRenderer: Send + Sync {
    /// Parses the whole of `template`, then renders it into `out`.
    ///
    /// # Errors
    /// * `Error::TemplateSyntaxError` if the template can not be parsed
    /// * `Error::TemplateExecutionError` if evaluation fails
    fn render(
        &self,
        template: &mut dyn Read,
        context: &RenderContext,
        out: &mut dyn Write,
    ) -> Result<()>;

    /// Renders a template held in memory and returns the output.
    fn render_str(&self, template: &str, context: &RenderContext) -> Result<String> {
        let mut out = Vec::new();
        self.render(&mut template.as_bytes(), context, &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Mustache rendering engine. Missing variables render as empty strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MustacheRenderer;

impl MustacheRenderer {
    pub fn new() -> Self {
        MustacheRenderer
    }
}

impl TemplateRenderer for MustacheRenderer {
    fn render(
        &self,
        template: &mut dyn Read,
        context: &RenderContext,
        out: &mut dyn Write,
    ) -> Result<()> {
        let mut source = String::new();
        template
            .read_to_string(&mut source)
            .map_err(|e| Error::io("<template>", e))?;

        let tmpl = mustache::compile_str(&source).map_err(Error::TemplateSyntaxError)?;
        let mut out = out;
        tmpl.render(&mut out, context)
            .map_err(Error::TemplateExecutionError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: serde_json::Value) -> RenderContext {
        match value {
            serde_json::Value::Object(map) => RenderContext::new(map),
            _ => panic!("context must be an object"),
        }
    }

    #[test]
    fn test_renders_variables_and_nested_values() {
        let renderer = MustacheRenderer::new();
        let ctx = context(json!({"name": "world", "app": {"port": 8080}}));

        assert_eq!(renderer.render_str("hello {{name}}", &ctx).unwrap(), "hello world");
        assert_eq!(renderer.render_str("port: {{ app.port }}\n", &ctx).unwrap(), "port: 8080\n");
    }

    #[test]
    fn test_missing_variables_render_empty() {
        let renderer = MustacheRenderer::new();
        let ctx = context(json!({"name": "world"}));

        assert_eq!(renderer.render_str("[{{ missing }}]", &ctx).unwrap(), "[]");
    }

    #[test]
    fn test_escaping_and_triple_stash() {
        let renderer = MustacheRenderer::new();
        let ctx = context(json!({"html": "<b>&</b>", "name": "world"}));

        assert_eq!(renderer.render_str("{{html}}", &ctx).unwrap(), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(renderer.render_str("{{{html}}}", &ctx).unwrap(), "<b>&</b>");
        assert_eq!(renderer.render_str("hello {{{name}}}", &ctx).unwrap(), "hello world");
    }

    #[test]
    fn test_sections_and_inverted_sections() {
        let renderer = MustacheRenderer::new();
        let ctx = context(json!({"enabled": true, "disabled": false, "items": [{"n": "a"}, {"n": "b"}]}));

        assert_eq!(renderer.render_str("{{#enabled}}on{{/enabled}}", &ctx).unwrap(), "on");
        assert_eq!(renderer.render_str("{{#disabled}}on{{/disabled}}", &ctx).unwrap(), "");
        assert_eq!(renderer.render_str("{{^disabled}}off{{/disabled}}", &ctx).unwrap(), "off");
        assert_eq!(renderer.render_str("{{#items}}[{{n}}]{{/items}}", &ctx).unwrap(), "[a][b]");
    }

    #[test]
    fn test_jinja_like_text_is_literal() {
        let renderer = MustacheRenderer::new();
        let ctx = context(json!({"name": "world"}));

        let script = "echo ${#args[@]} {{name}}\n{% raw %} {# note #}\n";
        assert_eq!(
            renderer.render_str(script, &ctx).unwrap(),
            "echo ${#args[@]} world\n{% raw %} {# note #}\n"
        );
    }

    #[test]
    fn test_unclosed_section_is_a_syntax_error() {
        let renderer = MustacheRenderer::new();
        let ctx = RenderContext::default();

        let err = renderer.render_str("{{#open}}never closed", &ctx).unwrap_err();
        assert!(matches!(err, Error::TemplateSyntaxError(_)), "{err}");
    }

    #[test]
    fn test_context_parses_json_and_yaml() {
        let ctx = RenderContext::parse(r#"{"name": "demo"}"#).unwrap();
        assert_eq!(ctx.get("name"), Some(&json!("demo")));

        let ctx = RenderContext::parse("name: demo\nreplicas: 2\n").unwrap();
        assert_eq!(ctx.get("replicas"), Some(&json!(2)));

        assert!(RenderContext::parse("- just\n- a list\n").is_err());
    }
}
