//! 데이터 모듈 오류 타입.

use pricecast_core::PipelineError;
use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 파일 입출력 오류
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 레코드를 찾을 수 없음
    #[error("Record not found: {0}")]
    NotFound(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 파싱 오류
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// 캐시 로더 오류
    #[error("Cache load error: {0}")]
    CacheLoad(String),
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

impl From<DataError> for PipelineError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound(msg) => PipelineError::NotFound(msg),
            DataError::Serialization(msg) => PipelineError::Serialization(msg),
            DataError::InvalidData(msg) => PipelineError::InvalidInput(msg),
            DataError::Parse { line, message } => {
                PipelineError::InvalidInput(format!("line {line}: {message}"))
            }
            other => PipelineError::Persistence(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_pipeline_error() {
        let err: PipelineError = DataError::NotFound("benzin/v1".into()).into();
        assert!(matches!(err, PipelineError::NotFound(_)));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err: PipelineError = DataError::from(io).into();
        assert!(err.is_escalated());
    }
}
