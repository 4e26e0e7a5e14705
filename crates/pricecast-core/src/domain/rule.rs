//! 결정적 알람 규칙.
//!
//! 모델과 무관하게 그날의 피처 값만으로 평가하는 규칙입니다. 규칙은 설정 데이터로
//! 정의되며 모든 조건이 참일 때 발동합니다.
//!
//! ```rust
//! use pricecast_core::domain::{ComparisonOperator, DeterministicRule, RuleCondition};
//!
//! let rule = DeterministicRule::new("cost_gap_high")
//!     .with_condition(RuleCondition::new("cost_gap_pct", ComparisonOperator::Gt, 3.0));
//! assert_eq!(rule.conditions.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 비교 연산자.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    /// 같음 (==)
    Eq,
    /// 같지 않음 (!=)
    Ne,
    /// 보다 큼 (>)
    Gt,
    /// 보다 크거나 같음 (>=)
    Gte,
    /// 보다 작음 (<)
    Lt,
    /// 보다 작거나 같음 (<=)
    Lte,
}

impl ComparisonOperator {
    /// 두 값을 비교하여 조건 충족 여부 반환.
    pub fn evaluate(&self, current: f64, threshold: f64) -> bool {
        match self {
            Self::Eq => (current - threshold).abs() < f64::EPSILON,
            Self::Ne => (current - threshold).abs() >= f64::EPSILON,
            Self::Gt => current > threshold,
            Self::Gte => current >= threshold,
            Self::Lt => current < threshold,
            Self::Lte => current <= threshold,
        }
    }
}

/// 피처 하나에 대한 조건.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// 피처 이름
    pub feature: String,
    /// 비교 연산자
    pub operator: ComparisonOperator,
    /// 비교 값
    pub value: f64,
}

impl RuleCondition {
    pub fn new(feature: impl Into<String>, operator: ComparisonOperator, value: f64) -> Self {
        Self {
            feature: feature.into(),
            operator,
            value,
        }
    }

    /// 피처 값으로 조건을 평가합니다. 없는 피처는 0.0으로 봅니다.
    pub fn evaluate(&self, features: &BTreeMap<String, f64>) -> bool {
        let current = features.get(&self.feature).copied().unwrap_or(0.0);
        self.operator.evaluate(current, self.value)
    }
}

/// 이름 붙은 결정적 규칙 (조건 AND).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterministicRule {
    /// 규칙 이름 (결정 기록에 남음)
    pub name: String,
    /// 조건 목록
    pub conditions: Vec<RuleCondition>,
}

impl DeterministicRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
        }
    }

    /// 조건을 추가합니다.
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// 모든 조건이 참이면 발동합니다. 조건이 없는 규칙은 발동하지 않습니다.
    pub fn evaluate(&self, features: &BTreeMap<String, f64>) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.evaluate(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_operator_evaluate() {
        assert!(ComparisonOperator::Gt.evaluate(3.1, 3.0));
        assert!(!ComparisonOperator::Gt.evaluate(3.0, 3.0));
        assert!(ComparisonOperator::Gte.evaluate(7.0, 7.0));
        assert!(ComparisonOperator::Lt.evaluate(-1.01, -1.0));
        assert!(ComparisonOperator::Lte.evaluate(-1.0, -1.0));
        assert!(ComparisonOperator::Eq.evaluate(0.5, 0.5));
        assert!(ComparisonOperator::Ne.evaluate(0.4, 0.5));
    }

    #[test]
    fn test_rule_all_conditions_required() {
        let rule = DeterministicRule::new("mbe_gap_stale")
            .with_condition(RuleCondition::new("mbe_value", ComparisonOperator::Lt, -1.0))
            .with_condition(RuleCondition::new(
                "days_since_last_change",
                ComparisonOperator::Gte,
                7.0,
            ));

        assert!(rule.evaluate(&features(&[
            ("mbe_value", -1.5),
            ("days_since_last_change", 8.0)
        ])));
        assert!(!rule.evaluate(&features(&[
            ("mbe_value", -1.5),
            ("days_since_last_change", 3.0)
        ])));
        // 없는 피처는 0.0
        assert!(!rule.evaluate(&features(&[("days_since_last_change", 8.0)])));
    }

    #[test]
    fn test_operator_serde() {
        let json = serde_json::to_string(&ComparisonOperator::Gte).unwrap();
        assert_eq!(json, "\"gte\"");
    }
}
