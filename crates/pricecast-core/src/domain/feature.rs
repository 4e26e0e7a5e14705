//! 일별 피처 벡터.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Instrument;

/// (날짜, 상품) 하나의 피처 값들.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// 날짜
    pub date: NaiveDate,
    /// 상품
    pub instrument: Instrument,
    /// 피처 이름 → 값
    pub values: BTreeMap<String, f64>,
}

impl FeatureRow {
    pub fn new(date: NaiveDate, instrument: Instrument) -> Self {
        Self {
            date,
            instrument,
            values: BTreeMap::new(),
        }
    }

    /// 피처 값을 추가합니다.
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// 피처 값을 조회합니다.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// 주어진 피처 순서로 밀집 벡터를 만듭니다. 없는 피처와 비유한 값은 0.0입니다.
    pub fn dense(&self, feature_order: &[String]) -> Vec<f64> {
        feature_order
            .iter()
            .map(|name| match self.values.get(name) {
                Some(v) if v.is_finite() => *v,
                _ => 0.0,
            })
            .collect()
    }

    /// 피처 이름 목록 (정렬됨).
    pub fn feature_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_fills_missing_with_zero() {
        let row = FeatureRow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "lpg".into())
            .with_value("mbe_value", -1.2)
            .with_value("fx_close", f64::NAN);
        let order = vec![
            "fx_close".to_string(),
            "mbe_value".to_string(),
            "risk_composite".to_string(),
        ];
        assert_eq!(row.dense(&order), vec![0.0, -1.2, 0.0]);
    }
}
