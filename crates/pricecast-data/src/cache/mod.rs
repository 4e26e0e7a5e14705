//! 캐싱 레이어.
//!
//! - 모델 캐시: (상품, 아티팩트) 키로 로드된 모델 번들을 보관

pub mod model_cache;

pub use model_cache::{CacheKey, CacheStats, ModelCache};
