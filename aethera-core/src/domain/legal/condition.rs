// aethera-core/src/domain/legal/condition.rs
//
// The restricted condition DSL of rule-set files:
//
//   condition:
//     protected_overlap_pct: { ">": 1.0 }
//
//   condition:
//     all:
//       - aoi_area_ha: { ">=": 50 }
//       - distance_to_protected_km: { "<": 2.0 }
//
// `all`/`any` (aliases `and`/`or`) combine sub-conditions; a bare mapping of
// several fields or several ops is an implicit `all`. A condition that
// matches means the rule FAILS.

use crate::domain::metrics::MetricsMap;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            ">" | "gt" => Some(Self::Gt),
            "<" | "lt" => Some(Self::Lt),
            ">=" | "gte" => Some(Self::Gte),
            "<=" | "lte" => Some(Self::Lte),
            "==" | "eq" => Some(Self::Eq),
            "!=" | "ne" => Some(Self::Ne),
            _ => None,
        }
    }

    fn apply(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Gt => observed > expected,
            Self::Lt => observed < expected,
            Self::Gte => observed >= expected,
            Self::Lte => observed <= expected,
            Self::Eq => (observed - expected).abs() < 1e-9,
            Self::Ne => (observed - expected).abs() >= 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare {
        field: String,
        op: CompareOp,
        value: f64,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    /// Evaluate against the metrics namespace.
    ///
    /// Returns `None` when a referenced field is absent; the rule is then
    /// reported as not applicable rather than failed.
    pub fn evaluate(&self, metrics: &MetricsMap) -> Option<bool> {
        match self {
            Condition::Compare { field, op, value } => {
                metrics.get(field).map(|observed| op.apply(observed, *value))
            }
            Condition::All(children) => {
                let mut verdict = true;
                for child in children {
                    verdict &= child.evaluate(metrics)?;
                }
                Some(verdict)
            }
            Condition::Any(children) => {
                let mut verdict = false;
                for child in children {
                    verdict |= child.evaluate(metrics)?;
                }
                Some(verdict)
            }
        }
    }

    /// Parse the JSON/YAML condition form.
    pub fn parse(value: &serde_json::Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "condition must be a mapping".to_string())?;
        if obj.is_empty() {
            return Err("condition mapping is empty".into());
        }

        let mut parts = Vec::new();
        for (key, val) in obj {
            match key.as_str() {
                "all" | "and" => parts.push(Self::parse_list(val).map(Condition::All)?),
                "any" | "or" => parts.push(Self::parse_list(val).map(Condition::Any)?),
                field => parts.extend(Self::parse_field(field, val)?),
            }
        }

        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::All(parts)
        })
    }

    fn parse_list(value: &serde_json::Value) -> Result<Vec<Condition>, String> {
        let items = value
            .as_array()
            .ok_or_else(|| "'all'/'any' expects a list of sub-conditions".to_string())?;
        if items.is_empty() {
            return Err("'all'/'any' list is empty".into());
        }
        items.iter().map(Self::parse).collect()
    }

    fn parse_field(field: &str, value: &serde_json::Value) -> Result<Vec<Condition>, String> {
        let ops = value
            .as_object()
            .ok_or_else(|| format!("field '{field}' expects an {{op: value}} mapping"))?;
        if ops.is_empty() {
            return Err(format!("field '{field}' has no operator"));
        }
        let mut out = Vec::new();
        for (op_str, raw) in ops {
            let op = CompareOp::parse(op_str)
                .ok_or_else(|| format!("unknown operator '{op_str}' on field '{field}'"))?;
            let expected = raw
                .as_f64()
                .ok_or_else(|| format!("field '{field}' expects a numeric threshold"))?;
            out.push(Condition::Compare {
                field: field.to_string(),
                op,
                value: expected,
            });
        }
        Ok(out)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Condition::parse(&raw).map_err(D::Error::custom)
    }
}
