//! 일일 예측 및 알람 결정 명령어.
//!
//! # 사용 예시
//!
//! ```bash
//! # 오늘 기준, 설정된 전체 상품
//! pricecast predict
//!
//! # 특정 날짜, 모델 다시 로드
//! pricecast predict -i lpg -d 2025-01-31 --reload
//! ```

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::error;

use pricecast_core::Instrument;

use crate::pipeline::{DailyOutcome, Pipeline};

/// 예측 명령 설정.
#[derive(Debug, Clone)]
pub struct PredictCliConfig {
    pub instruments: Vec<Instrument>,
    pub run_date: NaiveDate,
    /// 캐시를 비우고 최신 번들을 다시 읽을지 여부
    pub force_reload: bool,
    /// JSON으로 출력
    pub json: bool,
}

/// 상품별 하루치 결정을 만듭니다.
///
/// 예측 실패는 알람 없음으로 처리되므로 여기서 오류가 되는 것은 저장소 실패뿐입니다.
pub async fn run_predict(
    pipeline: &Pipeline,
    config: PredictCliConfig,
    now: DateTime<Utc>,
) -> Result<Vec<DailyOutcome>> {
    let mut outcomes = Vec::with_capacity(config.instruments.len());

    for instrument in &config.instruments {
        let outcome = pipeline
            .predict(instrument, config.run_date, now, config.force_reload)
            .await
            .map_err(|e| {
                error!(instrument = %instrument, error = %e, "Decision could not be stored");
                e
            })?;

        if !config.json {
            println!("\n{}", outcome.summary(&pipeline.display_name(instrument)));
        }
        outcomes.push(outcome);
    }

    if config.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }

    Ok(outcomes)
}
