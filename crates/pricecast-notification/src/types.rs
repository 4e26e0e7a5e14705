//! 알람 결정 입력 및 오류 타입.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use pricecast_core::{AlarmState, PipelineError};

/// 알람 결정 중 발생하는 오류.
///
/// 엔진 밖으로는 나가지 않습니다. 모든 오류는 알람 없음 결정으로 바뀝니다.
#[derive(Debug, Error)]
pub enum AlarmError {
    /// 확률이 범위를 벗어났거나 NaN
    #[error("잘못된 예측 값: {0}")]
    InvalidPrediction(String),

    /// 예측 이전 단계 실패
    #[error("상류 단계 오류: {0}")]
    Upstream(#[from] PipelineError),
}

/// 알람 작업용 Result 타입.
pub type AlarmResult<T> = Result<T, AlarmError>;

/// 하루치 알람 결정에 필요한 주변 정보.
///
/// 리스크 추세는 결정에 쓰이지 않으므로 [`AlarmEngine::risk_trend`](crate::AlarmEngine::risk_trend)로 따로 계산합니다.
#[derive(Debug, Clone)]
pub struct AlarmContext<'a> {
    /// 상품별 마지막 알람 시각
    pub state: &'a AlarmState,
    /// 오늘 이미 가격이 바뀌었는지 여부
    pub price_changed_today: bool,
    /// 그날의 피처 값 (결정적 규칙, 리스크 보조 조건용)
    pub features: Option<&'a BTreeMap<String, f64>>,
    /// 결정 시각
    pub now: DateTime<Utc>,
}

impl<'a> AlarmContext<'a> {
    pub fn new(state: &'a AlarmState, now: DateTime<Utc>) -> Self {
        Self {
            state,
            price_changed_today: false,
            features: None,
            now,
        }
    }

    pub fn with_price_changed_today(mut self, changed: bool) -> Self {
        self.price_changed_today = changed;
        self
    }

    pub fn with_features(mut self, features: &'a BTreeMap<String, f64>) -> Self {
        self.features = Some(features);
        self
    }

    /// 피처 값. 없으면 0.0.
    pub fn feature(&self, name: &str) -> f64 {
        self.features
            .and_then(|f| f.get(name).copied())
            .unwrap_or(0.0)
    }
}
