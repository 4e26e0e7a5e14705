//! CLI 도구 모음.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 라벨 생성과 폴드 구성 확인
//! - 상품별 2단계 모델 학습
//! - walk-forward 백테스트와 리포트
//! - 일일 예측 및 알람 결정

pub mod commands;
pub mod pipeline;

pub use pipeline::{price_changed_on, DailyOutcome, Pipeline, TrainingOutcome};
