//! # Pricecast Core
//!
//! 가격 변동 이벤트 파이프라인의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 가격 시계열, 이벤트 라벨, 피처 행
//! - 알람 상태 및 결정 기록
//! - 외부 데이터 소스 트레이트
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
