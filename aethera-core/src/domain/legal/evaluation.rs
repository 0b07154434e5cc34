// aethera-core/src/domain/legal/evaluation.rs

use crate::domain::legal::rule::{RuleSet, Severity};
use crate::domain::metrics::MetricsMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Passed,
    Failed,
    NotApplicable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleStatus {
    pub rule_id: String,
    pub name: String,
    pub category: String,
    pub severity: Severity,
    pub outcome: RuleOutcome,
    /// Rendered message, present on failures only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Persisted as `legal_evaluation.json` and summarized in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalEvaluationResult {
    pub country_code: String,
    pub rule_set_version: String,
    /// False iff at least one critical rule failed.
    pub overall_compliant: bool,
    pub statuses: Vec<RuleStatus>,
    pub critical_violations: Vec<RuleStatus>,
    pub warnings: Vec<RuleStatus>,
    pub informational: Vec<RuleStatus>,
}

impl LegalEvaluationResult {
    pub fn critical_count(&self) -> usize {
        self.critical_violations.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

/// Evaluate every rule against the metrics namespace.
///
/// `render` formats a failing rule's message template over the namespace;
/// returning `None` falls back to the raw template (the evaluation itself
/// never fails on a template error).
pub fn evaluate<F>(
    rule_set: &RuleSet,
    metrics: &MetricsMap,
    render: F,
) -> LegalEvaluationResult
where
    F: Fn(&str) -> Option<String>,
{
    let mut statuses = Vec::with_capacity(rule_set.rules.len());
    let mut critical = Vec::new();
    let mut warnings = Vec::new();
    let mut informational = Vec::new();

    for rule in &rule_set.rules {
        let outcome = match rule.condition.evaluate(metrics) {
            Some(true) => RuleOutcome::Failed,
            Some(false) => RuleOutcome::Passed,
            None => RuleOutcome::NotApplicable,
        };

        let message = if outcome == RuleOutcome::Failed {
            Some(render(&rule.message_template).unwrap_or_else(|| rule.message_template.clone()))
        } else {
            None
        };

        let status = RuleStatus {
            rule_id: rule.id.clone(),
            name: rule.name.clone(),
            category: rule.category.clone(),
            severity: rule.severity,
            outcome,
            message,
            references: rule.references.clone(),
        };

        if outcome == RuleOutcome::Failed {
            if rule.severity.is_critical() {
                critical.push(status.clone());
            } else if rule.severity.is_warning() {
                warnings.push(status.clone());
            } else {
                informational.push(status.clone());
            }
        }
        statuses.push(status);
    }

    LegalEvaluationResult {
        country_code: rule_set.country_code.clone(),
        rule_set_version: rule_set.version.clone(),
        overall_compliant: critical.is_empty(),
        statuses,
        critical_violations: critical,
        warnings,
        informational,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rule_set() -> RuleSet {
        serde_yaml::from_str(
            r#"
country_code: GRC
country_name: Greece
version: "1"
rules:
  - id: GRC-001
    name: Natura 2000 overlap
    category: biodiversity
    severity: critical
    condition: { protected_overlap_pct: { ">": 0.0 } }
    message_template: "overlap {{ protected_overlap_pct }}%"
  - id: GRC-002
    name: Large footprint scrutiny
    category: land_use
    severity: high
    condition: { aoi_area_ha: { ">": 1000 } }
    message_template: "footprint {{ aoi_area_ha }} ha"
  - id: GRC-003
    name: Water proximity notice
    category: water
    severity: low
    condition: { distance_to_water_km: { "<": 0.5 } }
    message_template: "close to water"
"#,
        )
        .unwrap()
    }

    fn metrics(overlap: f64) -> MetricsMap {
        let mut m = MetricsMap::new();
        m.insert("protected_overlap_pct", overlap);
        m.insert("aoi_area_ha", 10.0);
        m
    }

    #[test]
    fn test_critical_failure_breaks_compliance() {
        let result = evaluate(&rule_set(), &metrics(1.0), |t| Some(t.to_string()));
        assert!(!result.overall_compliant);
        assert_eq!(result.critical_count(), 1);
        assert_eq!(result.warning_count(), 0);
        assert_eq!(result.critical_violations[0].rule_id, "GRC-001");
        assert!(result.critical_violations[0].message.is_some());
    }

    #[test]
    fn test_compliant_when_no_critical_failure() {
        let result = evaluate(&rule_set(), &metrics(0.0), |t| Some(t.to_string()));
        assert!(result.overall_compliant);
        // overlap == 0 -> GRC-001 passed, GRC-002 passed, GRC-003 not applicable
        assert_eq!(
            result
                .statuses
                .iter()
                .filter(|s| s.outcome == RuleOutcome::NotApplicable)
                .count(),
            1
        );
    }

    #[test]
    fn test_render_fallback_keeps_raw_template() {
        let result = evaluate(&rule_set(), &metrics(2.0), |_| None);
        assert_eq!(
            result.critical_violations[0].message.as_deref(),
            Some("overlap {{ protected_overlap_pct }}%")
        );
    }
}
