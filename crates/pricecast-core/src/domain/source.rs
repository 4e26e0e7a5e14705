//! 외부 데이터 소스 추상화.
//!
//! 파이프라인은 피처 파이프라인과 가격 저장소를 직접 알지 못하고, 아래 trait을 통해
//! 날짜 범위 단위로 데이터를 받습니다. 범위는 양 끝을 포함합니다.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{FeatureRow, PricePoint};
use crate::error::PipelineResult;
use crate::types::Instrument;

/// 일별 기준 가격 제공자.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// `[start, end]` 구간의 가격 관측치를 조회합니다. 관측이 없는 날은 빠집니다.
    async fn get_prices(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<PricePoint>>;
}

/// 일별 피처 벡터 제공자.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// `[start, end]` 구간의 피처 행을 조회합니다.
    async fn get_features(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<FeatureRow>>;
}
