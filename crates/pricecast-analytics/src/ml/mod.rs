//! 2단계 이벤트 예측 모델.
//!
//! # 아키텍처
//!
//! ```text
//! FeatureRow + EventLabel
//!        │  (날짜 inner join)
//!        ▼
//! ┌─────────────────┐
//! │  TrainingSet    │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Stage 1 (GBDT)  │     │ Stage 2 (GBDT×2) │ ← 양성 행만
//! │ 이진 분류기     │     │ 금액 회귀        │
//! └────────┬────────┘     └────────┬─────────┘
//!          │ OOF 확률              │
//!          ▼                       │
//!   Calibrator 선택                │
//!          └───────────┬───────────┘
//!                      ▼
//!             TrainedModelBundle → EventPredictor
//! ```

pub mod bundle;
pub mod dataset;
pub mod error;
pub mod gbdt;
pub mod predictor;
pub mod trainer;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use bundle::TrainedModelBundle;
pub use dataset::{scale_pos_weight, TrainingSet};
pub use error::{MlError, MlResult};
pub use gbdt::{GbdtModel, GbdtTrainer, Objective};
pub use predictor::{EventPredictor, PredictorConfig};
pub use trainer::{
    DeploymentCalibration, RegressionFoldMetrics, RegressionSummary, Stage1FoldMetrics,
    Stage1Metrics, Stage2Metrics, TrainingMetrics, TwoStageTrainer,
};

/// 단계/상품을 건너뛴 이유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoData,
    AlignmentFailed,
    InsufficientDataForFolds,
    NoValidFolds,
    InsufficientPositiveSamples,
    InsufficientCalibrationFolds,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::AlignmentFailed => "alignment_failed",
            Self::InsufficientDataForFolds => "insufficient_data_for_folds",
            Self::NoValidFolds => "no_valid_folds",
            Self::InsufficientPositiveSamples => "insufficient_positive_samples",
            Self::InsufficientCalibrationFolds => "insufficient_calibration_folds",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
