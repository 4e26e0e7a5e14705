//! 파이프라인 에러 타입.
//!
//! 라벨 생성부터 알람 결정까지 파이프라인 전반에서 사용되는 에러 타입을 정의합니다.
//! 데이터 부족은 대부분 호출 지점에서 `skipped`/`reason` 필드로 복구되며,
//! 캘리브레이션 소진과 영속화 에러만 상위로 전파됩니다.

use thiserror::Error;

/// 핵심 파이프라인 에러.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 데이터 부족
    #[error("데이터 부족 ({context}): {available}개 사용 가능, 최소 {required}개 필요")]
    InsufficientData {
        /// 발생 위치
        context: String,
        /// 필요한 최소 개수
        required: usize,
        /// 실제 개수
        available: usize,
    },

    /// 피처와 라벨 정렬 실패
    #[error("정렬 불일치: {0}")]
    AlignmentMismatch(String),

    /// 모든 캘리브레이션 후보 실패
    #[error("캘리브레이션 후보 소진: {0}")]
    CalibrationExhausted(String),

    /// 영속화 에러
    #[error("영속화 에러: {0}")]
    Persistence(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),
}

/// 파이프라인 작업을 위한 Result 타입.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// 데이터 부족 에러를 생성합니다.
    pub fn insufficient(context: impl Into<String>, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            context: context.into(),
            required,
            available,
        }
    }

    /// 로컬에서 skip 처리로 복구 가능한 에러인지 확인합니다.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::InsufficientData { .. } | PipelineError::AlignmentMismatch(_)
        )
    }

    /// 호출자에게 반드시 전파되어야 하는 에러인지 확인합니다.
    pub fn is_escalated(&self) -> bool {
        matches!(
            self,
            PipelineError::CalibrationExhausted(_) | PipelineError::Persistence(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}
