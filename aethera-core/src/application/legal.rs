// aethera-core/src/application/legal.rs
//
// Rule-set loading and evaluation. An unparseable rule set degrades to
// "absent with a warning" and the run continues without legal output.

use crate::application::context::AnalysisContext;
use crate::domain::legal::{LegalEvaluationResult, RuleSet, evaluate};
use crate::domain::metrics::MetricsMap;
use std::fs;
use tracing::{info, instrument, warn};

pub const STAGE: &str = "legal";
pub const ARTIFACT: &str = "processed/legal_evaluation.json";

/// Outcome of the per-country rule-set lookup.
#[derive(Debug)]
pub enum RuleSetLoad {
    Loaded(RuleSet),
    Absent,
    /// Present but unparseable: treated as absent, the warning travels
    /// into the manifest.
    Unparseable(String),
}

#[instrument(skip(ctx))]
pub fn load_rule_set(ctx: &AnalysisContext, country: &str) -> RuleSetLoad {
    let dir = ctx.config.resolve(&ctx.config.rule_sets_dir);
    let iso3 = country.to_ascii_uppercase();

    for filename in [
        format!("{iso3}.yaml"),
        format!("{iso3}.yml"),
        format!("{iso3}.json"),
    ] {
        let path = dir.join(&filename);
        if !path.exists() {
            continue;
        }
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = ?path, error = %e, "rule set unreadable");
                return RuleSetLoad::Unparseable(format!(
                    "rule set {filename} unreadable: {e}"
                ));
            }
        };
        // serde_yaml parses both YAML and JSON bundles.
        return match serde_yaml::from_str::<RuleSet>(&content) {
            Ok(rule_set) => {
                info!(country = %iso3, rules = rule_set.rules.len(), "rule set loaded");
                RuleSetLoad::Loaded(rule_set)
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "rule set unparseable, continuing without legal output");
                RuleSetLoad::Unparseable(format!("rule set {filename} unparseable: {e}"))
            }
        };
    }
    RuleSetLoad::Absent
}

/// Evaluate the rules; failing messages are rendered over the metrics
/// namespace through the template port.
pub fn evaluate_rules(
    ctx: &AnalysisContext,
    rule_set: &RuleSet,
    metrics: &MetricsMap,
) -> LegalEvaluationResult {
    let context = metrics.to_json();
    evaluate(rule_set, metrics, |template| {
        ctx.renderer.render(template, &context).ok()
    })
}
