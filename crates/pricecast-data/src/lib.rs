//! 데이터 관리 및 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - 모델 번들 저장소 (파일 / 인메모리), 상품별 최신 버전 포인터
//! - 라벨, 결정 기록, 알람 상태를 위한 레코드 저장소
//! - 명시적 clear/evict를 지원하는 모델 캐시
//! - CSV 가격/피처 데이터 소스

pub mod cache;
pub mod error;
pub mod provider;
pub mod storage;

pub use error::{DataError, Result};

pub use cache::{CacheKey, CacheStats, ModelCache};
pub use provider::{CsvFeatureSource, CsvPriceSource};
pub use storage::model_store::{
    load_bundle, save_bundle, FileModelStore, InMemoryModelStore, ModelKey, ModelStore,
};
pub use storage::records::{InMemoryRecordStore, JsonFileRecordStore, RecordStore};
