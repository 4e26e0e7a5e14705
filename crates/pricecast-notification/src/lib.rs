//! # Pricecast Notification
//!
//! 하루치 예측을 사용자 알람 결정으로 바꿉니다.
//!
//! 구성:
//! - 알람 결정 엔진 (쿨다운, ML 조건, 결정적 규칙)
//! - 리스크 추세 계산
//! - 알람 유형별 메시지 템플릿
//!
//! 메시지 발송 채널은 이 crate의 범위 밖입니다. 결정과 메시지 문자열만 만듭니다.

pub mod alarm;
pub mod templates;
pub mod types;

pub use alarm::*;
pub use templates::*;
pub use types::*;
