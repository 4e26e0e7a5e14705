//! 피처/라벨 정렬과 밀집 행렬 변환.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::{info, warn};

use pricecast_core::{DecimalExt, EventLabel, FeatureRow, PipelineError, PipelineResult};

/// 날짜 기준으로 inner join 된 학습 데이터. 날짜 오름차순, 날짜당 한 행입니다.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub dates: Vec<NaiveDate>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<EventLabel>,
    pub feature_order: Vec<String>,
}

impl TrainingSet {
    /// 피처와 라벨을 날짜로 정렬(join)합니다.
    ///
    /// `feature_order`가 없으면 모든 피처 이름의 합집합(사전순)을 사용합니다.
    /// 행에 없는 피처는 0.0으로 채워집니다. 겹치는 날짜가 없으면
    /// [`PipelineError::AlignmentMismatch`].
    pub fn align(
        features: &[FeatureRow],
        labels: &[EventLabel],
        feature_order: Option<&[String]>,
    ) -> PipelineResult<Self> {
        if features.is_empty() || labels.is_empty() {
            return Err(PipelineError::AlignmentMismatch(format!(
                "empty input: features={}, labels={}",
                features.len(),
                labels.len()
            )));
        }

        // 같은 날짜가 여러 번 나오면 마지막 행 사용
        let by_date: BTreeMap<NaiveDate, &FeatureRow> =
            features.iter().map(|row| (row.date, row)).collect();
        let labels_by_date: BTreeMap<NaiveDate, &EventLabel> =
            labels.iter().map(|label| (label.run_date, label)).collect();

        let order: Vec<String> = match feature_order {
            Some(order) => order.to_vec(),
            None => by_date
                .values()
                .flat_map(|row| row.values.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };

        let mut set = TrainingSet {
            feature_order: order,
            ..Default::default()
        };
        for (date, label) in &labels_by_date {
            if let Some(row) = by_date.get(date) {
                set.dates.push(*date);
                set.features.push(row.dense(&set.feature_order));
                set.labels.push((*label).clone());
            }
        }

        if set.is_empty() {
            return Err(PipelineError::AlignmentMismatch(format!(
                "no common dates between {} feature rows and {} labels",
                by_date.len(),
                labels_by_date.len()
            )));
        }

        let dropped = labels_by_date.len() - set.len();
        if dropped > 0 {
            warn!(dropped, "Labels without matching feature rows dropped");
        }
        info!(
            rows = set.len(),
            features = set.feature_order.len(),
            positives = set.n_positive(),
            "Features and labels aligned"
        );

        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn y_binary(&self) -> Vec<u8> {
        self.labels.iter().map(|l| l.binary_flag).collect()
    }

    pub fn first_amounts(&self) -> Vec<f64> {
        self.labels
            .iter()
            .map(|l| l.first_event_amount.to_f64_lossy())
            .collect()
    }

    pub fn net_amounts(&self) -> Vec<f64> {
        self.labels.iter().map(|l| l.net_amount.to_f64_lossy()).collect()
    }

    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|l| l.binary_flag == 1).count()
    }

    /// 양성 라벨 행만 남긴 부분 집합 (날짜 순서 유지).
    pub fn positives(&self) -> TrainingSet {
        let indices: Vec<usize> = (0..self.len())
            .filter(|i| self.labels[*i].binary_flag == 1)
            .collect();
        self.subset(&indices)
    }

    pub fn subset(&self, indices: &[usize]) -> TrainingSet {
        TrainingSet {
            dates: indices.iter().map(|i| self.dates[*i]).collect(),
            features: indices.iter().map(|i| self.features[*i].clone()).collect(),
            labels: indices.iter().map(|i| self.labels[*i].clone()).collect(),
            feature_order: self.feature_order.clone(),
        }
    }
}

/// `n_neg / n_pos`. 양성이 없으면 1.0.
pub fn scale_pos_weight(y: &[u8]) -> f64 {
    let n_pos = y.iter().filter(|v| **v == 1).count();
    if n_pos == 0 {
        return 1.0;
    }
    (y.len() - n_pos) as f64 / n_pos as f64
}

/// 0/1 라벨을 f64 타깃으로 변환합니다.
pub fn as_targets(y: &[u8]) -> Vec<f64> {
    y.iter().map(|v| f64::from(*v)).collect()
}
