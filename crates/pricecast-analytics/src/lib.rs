//! 가격 변동 이벤트 분석 엔진.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 이벤트 라벨 생성 (일별/누적 변동)
//! - Purged walk-forward 교차 검증 분할
//! - 확률 캘리브레이션 (Platt → Beta → Isotonic)
//! - 2단계 GBDT 학습 및 추론
//! - Walk-forward 백테스트와 리포트
//!
//! # Re-exports
//!
//! - [`labels`]: 라벨 생성 (LabelGenerator, compute_labels)
//! - [`cv`]: 폴드 분할 (PurgedWalkForwardCv, split_folds)
//! - [`calibration`]: 캘리브레이터 선택 (select_calibrator)
//! - [`ml`]: 학습/추론 (TwoStageTrainer, EventPredictor)
//! - [`backtest`]: 백테스트 (BacktestEngine, render_markdown)

pub mod backtest;
pub mod calibration;
pub mod cv;
pub mod labels;
pub mod ml;
pub mod performance;

// Labels 모듈 re-exports
pub use labels::{compute_labels, LabelGenerator};

// CV 모듈 re-exports
pub use cv::{split_folds, Fold, FoldInfo, PurgedWalkForwardCv};

// Calibration 모듈 re-exports
pub use calibration::{
    select_calibrator, CalibrationKind, CalibrationSelection, CalibrationSummary, Calibrator,
};

// ML 모듈 re-exports
pub use ml::{
    EventPredictor, MlError, MlResult, PredictorConfig, SkipReason, TrainedModelBundle,
    TrainingMetrics, TwoStageTrainer,
};

// Backtest 모듈 re-exports
pub use backtest::{render_markdown, BacktestEngine, BacktestError, BacktestReport};

// Performance 모듈 re-exports
pub use performance::ClassificationMetrics;
