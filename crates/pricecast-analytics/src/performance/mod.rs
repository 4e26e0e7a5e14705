//! 성과 분석 모듈
//!
//! 학습 CV와 백테스트에서 사용하는 분류/회귀 지표를 제공합니다.
//!
//! # 모듈 구성
//!
//! - [`metrics`]: AUC, F1, 정밀도, 재현율, MAE, RMSE, 방향 정확도, 평균/표준편차

pub mod metrics;

pub use metrics::*;
