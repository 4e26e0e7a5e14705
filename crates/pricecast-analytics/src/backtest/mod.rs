//! 백테스팅 모듈
//!
//! 과거 피처/라벨로 2단계 모델을 walk-forward 방식으로 재현하고 성과를 분석합니다.
//!
//! # 주요 구성요소
//!
//! - [`BacktestEngine`]: 폴드별 학습/캘리브레이션/평가 실행 엔진
//! - [`BacktestReport`]: 상품별 결과 리포트 (폴드 상세, 예측 대 실제)
//! - [`render_markdown`]: 여러 상품 결과의 Markdown 문서

pub mod engine;
pub mod report;

pub use engine::{
    BacktestEngine, BacktestError, BacktestReport, BacktestResult, FoldDetail, FoldStage1,
    FoldStage2, MetricSummary, PredictionRecord, Stage1Summary, Stage2Summary,
};
pub use report::render_markdown;
