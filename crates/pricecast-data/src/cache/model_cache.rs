//! 모델 번들 캐시.
//!
//! 프로세스 단위로 주입되는 명시적 캐시입니다. 전역 상태를 두지 않고 호출자가
//! 인스턴스를 만들어 넘깁니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! let cache: ModelCache<TrainedModelBundle> = ModelCache::new();
//! let bundle = cache
//!     .get_or_load(CacheKey::latest(&instrument), false, || async {
//!         load_latest_bundle(&store, &instrument).await
//!     })
//!     .await?;
//! ```

use pricecast_core::Instrument;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 캐시 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub instrument: Instrument,
    /// 아티팩트 이름 (예: 버전 문자열 또는 "latest")
    pub artifact: String,
}

impl CacheKey {
    pub fn new(instrument: Instrument, artifact: impl Into<String>) -> Self {
        Self {
            instrument,
            artifact: artifact.into(),
        }
    }

    /// 상품의 최신 번들 키.
    pub fn latest(instrument: &Instrument) -> Self {
        Self::new(instrument.clone(), "latest")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.instrument, self.artifact)
    }
}

/// 캐시 통계.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// 명시적 get/put/clear/evict를 지원하는 캐시.
pub struct ModelCache<T> {
    entries: RwLock<HashMap<CacheKey, Arc<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<T> ModelCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 캐시된 값을 가져옵니다.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        let result = self.entries.read().await.get(key).cloned();
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// 값을 넣습니다. 같은 키의 이전 값은 대체됩니다.
    pub async fn put(&self, key: CacheKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries.write().await.insert(key, Arc::clone(&value));
        value
    }

    /// 키 하나를 제거하고 제거 여부를 반환합니다.
    pub async fn evict(&self, key: &CacheKey) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            debug!(key = %key, "Cache entry evicted");
        }
        removed
    }

    /// 상품의 모든 항목을 제거하고 제거한 개수를 반환합니다.
    pub async fn evict_instrument(&self, instrument: &Instrument) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| &k.instrument != instrument);
        before - entries.len()
    }

    /// 모든 항목을 제거합니다.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        info!(count, "Model cache cleared");
    }

    /// 항목 수.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 캐시 통계를 반환합니다.
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            entries: self.len().await,
            hits,
            misses,
            hit_rate,
        }
    }

    /// 캐시에 있으면 반환하고, 없으면 로더로 읽어 넣습니다.
    ///
    /// `force_reload`가 참이면 먼저 항목을 제거하므로 오래된 값이 반환되지 않습니다.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: CacheKey,
        force_reload: bool,
        loader: F,
    ) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if force_reload {
            self.evict(&key).await;
        } else if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }

        let value = loader().await?;
        debug!(key = %key, "Cache entry loaded");
        Ok(self.put(key, value).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn key(inst: &str) -> CacheKey {
        CacheKey::latest(&Instrument::new(inst))
    }

    #[tokio::test]
    async fn test_get_put_evict_clear() {
        let cache: ModelCache<u32> = ModelCache::new();
        assert!(cache.get(&key("benzin")).await.is_none());

        cache.put(key("benzin"), 1).await;
        cache.put(key("lpg"), 2).await;
        assert_eq!(*cache.get(&key("benzin")).await.unwrap(), 1);

        assert!(cache.evict(&key("benzin")).await);
        assert!(!cache.evict(&key("benzin")).await);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_get_or_load_uses_cache_until_forced() {
        let cache: ModelCache<usize> = ModelCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        let load = move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<usize, String>(n)
        };

        assert_eq!(*cache.get_or_load(key("motorin"), false, load).await.unwrap(), 1);
        assert_eq!(*cache.get_or_load(key("motorin"), false, load).await.unwrap(), 1);
        assert_eq!(*cache.get_or_load(key("motorin"), true, load).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_forced_reload_leaves_no_stale_entry() {
        let cache: ModelCache<usize> = ModelCache::new();
        cache.put(key("lpg"), 7).await;

        let result = cache
            .get_or_load(key("lpg"), true, || async { Err::<usize, _>("gone") })
            .await;
        assert!(result.is_err());
        assert!(cache.get(&key("lpg")).await.is_none());
    }

    #[tokio::test]
    async fn test_evict_instrument() {
        let cache: ModelCache<u8> = ModelCache::new();
        let inst = Instrument::new("benzin");
        cache.put(CacheKey::new(inst.clone(), "v1"), 1).await;
        cache.put(CacheKey::new(inst.clone(), "v2"), 2).await;
        cache.put(key("lpg"), 3).await;

        assert_eq!(cache.evict_instrument(&inst).await, 2);
        assert_eq!(cache.len().await, 1);
    }
}
