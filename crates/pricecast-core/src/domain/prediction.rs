//! 하루치 모델 출력.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Instrument;

/// 추론 결과.
///
/// Stage 2 값은 확률이 알람 임계값 이상일 때만 채워집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 상품
    pub instrument: Instrument,
    /// 기준일
    pub run_date: NaiveDate,
    /// 분류기 raw 확률
    pub raw_probability: f64,
    /// 의사결정에 쓰는 확률 (캘리브레이션 적용 시 보정값)
    pub probability: f64,
    /// 캘리브레이션 적용 여부
    pub calibrated: bool,
    /// 예측 첫 이벤트 금액 (클리핑됨)
    pub first_event_amount: Option<Decimal>,
    /// 예측 첫 이벤트 방향
    pub first_event_direction: i8,
    /// 예측 누적 순변동 (클리핑됨)
    pub net_amount: Option<Decimal>,
    /// 모델 버전
    pub model_version: String,
}
