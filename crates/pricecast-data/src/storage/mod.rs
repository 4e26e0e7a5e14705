//! 영속 저장소.
//!
//! - `model_store`: (상품, 버전) 키의 모델 번들 저장
//! - `records`: 라벨, 결정 기록, 알람 상태 업서트

pub mod model_store;
pub mod records;

use std::path::Path;

use crate::error::Result;

/// 임시 파일에 쓴 뒤 rename 하여 부분 쓰기를 남기지 않습니다.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
