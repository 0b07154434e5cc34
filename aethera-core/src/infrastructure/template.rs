// aethera-core/src/infrastructure/template.rs

// Renders legal rule message templates ({{ metric_name }}) over the flat
// metrics namespace. It is the bridge between rule-set text and the values
// a specific run produced.

use crate::application::ports::TemplateEngine;
use crate::error::AetheraError;
use crate::infrastructure::error::InfrastructureError;
use minijinja::Environment;

pub struct JinjaRenderer<'a> {
    env: Environment<'a>,
}

impl<'a> JinjaRenderer<'a> {
    pub fn new() -> Self {
        let mut env = Environment::new();

        // Metric values are f64; reports want them short.
        env.add_filter("round1", |value: f64| (value * 10.0).round() / 10.0);
        env.add_filter("round2", |value: f64| (value * 100.0).round() / 100.0);

        // Basic filters
        env.add_filter("upper", |value: &str| Ok::<_, minijinja::Error>(value.to_uppercase()));
        env.add_filter("lower", |value: &str| Ok::<_, minijinja::Error>(value.to_lowercase()));

        Self { env }
    }
}

impl<'a> Default for JinjaRenderer<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> TemplateEngine for JinjaRenderer<'a> {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, AetheraError> {
        self.env
            .render_str(template, context)
            .map_err(|e| AetheraError::Infrastructure(InfrastructureError::TemplateError(e)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_render_metric_interpolation() -> Result<()> {
        let renderer = JinjaRenderer::new();
        let context = serde_json::json!({"protected_overlap_pct": 2.5, "country": "ita"});
        let result = renderer.render(
            "Overlap of {{ protected_overlap_pct }}% in {{ country | upper }}",
            &context,
        )?;
        assert_eq!(result, "Overlap of 2.5% in ITA");
        Ok(())
    }

    #[test]
    fn test_round_filters() -> Result<()> {
        let renderer = JinjaRenderer::new();
        let context = serde_json::json!({"x": 3.14159});
        assert_eq!(renderer.render("{{ x | round2 }}", &context)?, "3.14");
        assert_eq!(renderer.render("{{ x | round1 }}", &context)?, "3.1");
        Ok(())
    }

    #[test]
    fn test_bad_syntax_is_an_error() {
        let renderer = JinjaRenderer::new();
        let result = renderer.render("{{ unclosed", &serde_json::json!({}));
        assert!(result.is_err());
    }
}
