//! 학습된 모델 번들.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pricecast_core::Instrument;

use super::gbdt::GbdtModel;
use super::trainer::TrainingMetrics;
use crate::calibration::Calibrator;

/// 배포 단위 모델 묶음.
///
/// `(instrument, version)`으로 저장되며 저장 후에는 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModelBundle {
    pub instrument: Instrument,
    pub version: String,
    /// Stage 1 이진 분류기
    pub classifier: GbdtModel,
    /// Stage 2 첫 이벤트 금액 회귀 (건너뛰었으면 없음)
    pub regressor_first: Option<GbdtModel>,
    /// Stage 2 순변동 금액 회귀 (건너뛰었으면 없음)
    pub regressor_net: Option<GbdtModel>,
    pub calibrator: Option<Calibrator>,
    pub feature_order: Vec<String>,
    pub metrics: TrainingMetrics,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModelBundle {
    pub fn has_stage2(&self) -> bool {
        self.regressor_first.is_some() && self.regressor_net.is_some()
    }

    /// 학습 시각 기반 기본 버전 문자열.
    pub fn default_version(at: DateTime<Utc>) -> String {
        format!("v{}", at.format("%Y%m%d%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_version_format() {
        let at = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(TrainedModelBundle::default_version(at), "v20250203040506");
    }
}
