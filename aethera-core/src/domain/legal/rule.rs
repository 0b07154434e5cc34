// aethera-core/src/domain/legal/rule.rs

use crate::domain::legal::condition::Condition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Informational,
}

impl Severity {
    pub fn is_critical(self) -> bool {
        matches!(self, Severity::Critical)
    }

    /// High and medium failures land in the warnings partition.
    pub fn is_warning(self) -> bool {
        matches!(self, Severity::High | Severity::Medium)
    }
}

/// One compliance rule. The condition describes the VIOLATION trigger:
/// when it matches, the rule fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub severity: Severity,
    pub condition: Condition,
    /// minijinja template rendered over the metrics namespace on failure.
    pub message_template: String,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Per-country rule bundle, loaded once per run, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub country_code: String,
    pub country_name: String,
    pub version: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub rules: Vec<LegalRule>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_set_yaml_round() {
        let yaml = r#"
country_code: ITA
country_name: Italy
version: "2024.1"
metadata:
  source: national transposition of EIA directive
rules:
  - id: ITA-N2K-001
    name: Natura 2000 overlap
    description: Any overlap with a Natura 2000 site requires appropriate assessment.
    category: biodiversity
    severity: critical
    condition:
      protected_overlap_pct: { ">": 0.0 }
    message_template: "AOI overlaps protected sites by {{ protected_overlap_pct }}%"
    references:
      - "Habitats Directive 92/43/EEC Art. 6(3)"
  - id: ITA-EMI-002
    name: Operational emissions disclosure
    severity: informational
    condition:
      project_operation_tco2e_per_year: { ">=": 0.0 }
    message_template: "Operational emissions: {{ project_operation_tco2e_per_year }} tCO2e/yr"
"#;
        let set: RuleSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(set.country_code, "ITA");
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].severity, Severity::Critical);
        assert!(set.rules[0].references.len() == 1);
        assert_eq!(set.rules[1].category, "");
    }

    #[test]
    fn test_severity_partitions() {
        assert!(Severity::Critical.is_critical());
        assert!(Severity::High.is_warning());
        assert!(Severity::Medium.is_warning());
        assert!(!Severity::Low.is_warning());
        assert!(!Severity::Informational.is_critical());
    }
}
