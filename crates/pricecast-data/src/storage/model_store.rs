//! 모델 번들 저장소.
//!
//! 번들은 `(instrument, version)` 키로 저장되며 한 번 저장된 버전은 바뀌지 않습니다.
//! 새 버전이 저장되면 상품의 최신 포인터가 갱신됩니다.
//!
//! 파일 레이아웃:
//!
//! ```text
//! {root}/{instrument}/{version}.json
//! {root}/{instrument}/LATEST
//! ```

use async_trait::async_trait;
use pricecast_core::Instrument;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::write_atomic;
use crate::error::{DataError, Result};

const LATEST_FILE: &str = "LATEST";

/// 모델 번들 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub instrument: Instrument,
    pub version: String,
}

impl ModelKey {
    pub fn new(instrument: Instrument, version: impl Into<String>) -> Self {
        Self {
            instrument,
            version: version.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instrument, self.version)
    }
}

/// 모델 번들 저장소 trait.
///
/// 번들 내용은 JSON 값으로 다루며, 타입 변환은 [`save_bundle`]/[`load_bundle`]이 맡습니다.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// 번들을 저장하고 최신 포인터를 갱신합니다. 같은 버전이 있으면 덮어씁니다.
    async fn save(&self, key: &ModelKey, payload: serde_json::Value) -> Result<()>;

    /// 번들을 로드합니다. 없으면 `NotFound`.
    async fn load(&self, key: &ModelKey) -> Result<serde_json::Value>;

    /// 상품의 최신 버전 이름.
    async fn latest_version(&self, instrument: &Instrument) -> Result<Option<String>>;

    /// 상품의 저장된 버전 목록 (정렬됨).
    async fn list_versions(&self, instrument: &Instrument) -> Result<Vec<String>>;

    /// 상품의 최신 번들을 로드합니다.
    async fn load_latest(&self, instrument: &Instrument) -> Result<(ModelKey, serde_json::Value)> {
        let version = self
            .latest_version(instrument)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("no model for {}", instrument)))?;
        let key = ModelKey::new(instrument.clone(), version);
        let payload = self.load(&key).await?;
        Ok((key, payload))
    }
}

/// 타입 있는 번들을 저장합니다.
pub async fn save_bundle<S, T>(store: &S, key: &ModelKey, bundle: &T) -> Result<()>
where
    S: ModelStore + ?Sized,
    T: Serialize,
{
    let payload = serde_json::to_value(bundle)?;
    store.save(key, payload).await
}

/// 타입 있는 번들을 로드합니다.
pub async fn load_bundle<S, T>(store: &S, key: &ModelKey) -> Result<T>
where
    S: ModelStore + ?Sized,
    T: DeserializeOwned,
{
    let payload = store.load(key).await?;
    Ok(serde_json::from_value(payload)?)
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value == LATEST_FILE
        || value.contains(['/', '\\']);
    if bad {
        return Err(DataError::InvalidData(format!("invalid {kind}: '{value}'")));
    }
    Ok(())
}

/// 디렉토리 기반 모델 저장소.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
}

impl FileModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn instrument_dir(&self, instrument: &Instrument) -> PathBuf {
        self.root.join(instrument.as_str())
    }

    fn bundle_path(&self, key: &ModelKey) -> PathBuf {
        self.instrument_dir(&key.instrument)
            .join(format!("{}.json", key.version))
    }
}

#[async_trait]
impl ModelStore for FileModelStore {
    async fn save(&self, key: &ModelKey, payload: serde_json::Value) -> Result<()> {
        validate_segment("instrument", key.instrument.as_str())?;
        validate_segment("version", &key.version)?;

        let path = self.bundle_path(key);
        let replaced = tokio::fs::try_exists(&path).await?;

        let bytes = serde_json::to_vec_pretty(&payload)?;
        write_atomic(&path, &bytes).await?;
        write_atomic(
            &self.instrument_dir(&key.instrument).join(LATEST_FILE),
            key.version.as_bytes(),
        )
        .await?;

        info!(model = %key, path = %path.display(), replaced, "Model bundle saved");
        Ok(())
    }

    async fn load(&self, key: &ModelKey) -> Result<serde_json::Value> {
        let path = self.bundle_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        debug!(model = %key, "Model bundle loaded from disk");
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn latest_version(&self, instrument: &Instrument) -> Result<Option<String>> {
        let path = self.instrument_dir(instrument).join(LATEST_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => {
                let version = s.trim().to_string();
                Ok((!version.is_empty()).then_some(version))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_versions(&self, instrument: &Instrument) -> Result<Vec<String>> {
        let dir = self.instrument_dir(instrument);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(version) = name.strip_suffix(".json") {
                versions.push(version.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }
}

/// 테스트와 단발성 실행을 위한 인메모리 모델 저장소.
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    bundles: RwLock<HashMap<ModelKey, serde_json::Value>>,
    latest: RwLock<HashMap<Instrument, String>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn save(&self, key: &ModelKey, payload: serde_json::Value) -> Result<()> {
        let replaced = self
            .bundles
            .write()
            .await
            .insert(key.clone(), payload)
            .is_some();
        debug!(model = %key, replaced, "Model bundle stored in memory");
        self.latest
            .write()
            .await
            .insert(key.instrument.clone(), key.version.clone());
        Ok(())
    }

    async fn load(&self, key: &ModelKey) -> Result<serde_json::Value> {
        self.bundles
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| DataError::NotFound(key.to_string()))
    }

    async fn latest_version(&self, instrument: &Instrument) -> Result<Option<String>> {
        Ok(self.latest.read().await.get(instrument).cloned())
    }

    async fn list_versions(&self, instrument: &Instrument) -> Result<Vec<String>> {
        let mut versions: Vec<String> = self
            .bundles
            .read()
            .await
            .keys()
            .filter(|k| &k.instrument == instrument)
            .map(|k| k.version.clone())
            .collect();
        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_latest_tracks_last_save() {
        let store = InMemoryModelStore::new();
        let inst = Instrument::new("benzin");

        store
            .save(&ModelKey::new(inst.clone(), "v1"), json!({"a": 1}))
            .await
            .unwrap();
        store
            .save(&ModelKey::new(inst.clone(), "v2"), json!({"a": 2}))
            .await
            .unwrap();

        let (key, payload) = store.load_latest(&inst).await.unwrap();
        assert_eq!(key.version, "v2");
        assert_eq!(payload["a"], 2);
        assert_eq!(store.list_versions(&inst).await.unwrap(), vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn test_in_memory_resave_replaces_bundle() {
        let store = InMemoryModelStore::new();
        let inst = Instrument::new("lpg");
        let key = ModelKey::new(inst.clone(), "v1");
        store.save(&key, json!({})).await.unwrap();
        store.save(&key, json!({"x": 1})).await.unwrap();

        assert_eq!(store.load(&key).await.unwrap()["x"], 1);
        assert_eq!(store.list_versions(&inst).await.unwrap(), vec!["v1"]);
        assert_eq!(store.latest_version(&inst).await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_load_latest_missing_instrument() {
        let store = InMemoryModelStore::new();
        let err = store.load_latest(&Instrument::new("lpg")).await.unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[test]
    fn test_segment_validation() {
        assert!(validate_segment("version", "20240101T000000").is_ok());
        assert!(validate_segment("version", "../etc").is_err());
        assert!(validate_segment("version", "LATEST").is_err());
        assert!(validate_segment("instrument", "").is_err());
    }
}
