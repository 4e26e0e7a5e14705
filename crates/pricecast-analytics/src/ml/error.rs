//! ML 모듈 에러 타입.

use thiserror::Error;

use pricecast_core::PipelineError;

/// 모델 학습/추론에서 발생할 수 있는 에러.
#[derive(Debug, Error)]
pub enum MlError {
    /// 모델 번들 로드 에러
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// 학습 중 에러
    #[error("Training error: {0}")]
    Training(String),

    /// 모델 추론 중 에러
    #[error("Inference error: {0}")]
    Inference(String),

    /// 피처 차원 불일치
    #[error("Feature mismatch: expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    /// 유효하지 않은 하이퍼파라미터
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// 유효하지 않은 입력 데이터
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 학습을 위한 데이터 부족
    #[error("Insufficient data: need {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },
}

/// ML 작업을 위한 Result 타입.
pub type MlResult<T> = Result<T, MlError>;

impl MlError {
    /// 이 에러가 복구 가능한지 확인 (다른 데이터로 재시도 가능).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MlError::InsufficientData { .. } | MlError::InvalidInput(_)
        )
    }

    /// 이 에러가 모델 리로드를 필요로 하는지 확인.
    pub fn requires_reload(&self) -> bool {
        matches!(
            self,
            MlError::ModelLoad(_) | MlError::FeatureMismatch { .. }
        )
    }
}

impl From<MlError> for PipelineError {
    fn from(err: MlError) -> Self {
        match err {
            MlError::InsufficientData { required, actual } => {
                PipelineError::insufficient("model", required, actual)
            }
            MlError::ModelLoad(msg) => PipelineError::Persistence(msg),
            MlError::InvalidParams(msg) => PipelineError::Config(msg),
            other => PipelineError::InvalidInput(other.to_string()),
        }
    }
}
