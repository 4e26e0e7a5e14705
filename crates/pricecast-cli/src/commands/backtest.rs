//! 백테스트 명령어.
//!
//! 피처 CSV와 가격 CSV로 walk-forward 백테스트를 실행합니다.
//!
//! # 사용 예시
//!
//! ```bash
//! # 설정된 전체 상품 백테스트
//! pricecast backtest -f 2021-01-01 -t 2025-01-31
//!
//! # 경유만, Markdown 리포트 저장
//! pricecast backtest -i motorin -f 2021-01-01 -t 2025-01-31 -o reports/motorin.md
//!
//! # JSON으로 저장
//! pricecast backtest -f 2021-01-01 -t 2025-01-31 -o reports/backtest.json
//! ```

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::path::Path;
use tracing::{info, warn};

use pricecast_analytics::backtest::BacktestReport;
use pricecast_core::Instrument;

use crate::pipeline::Pipeline;

/// 백테스트 CLI 설정
#[derive(Debug, Clone)]
pub struct BacktestCliConfig {
    /// 대상 상품
    pub instruments: Vec<Instrument>,
    /// 시작일
    pub start_date: NaiveDate,
    /// 종료일
    pub end_date: NaiveDate,
    /// 결과 저장 경로 (옵션, `.json`이면 JSON, 그 외 Markdown)
    pub output_path: Option<String>,
}

/// 백테스트를 실행하고 요약을 출력합니다.
pub async fn run_backtest(
    pipeline: &Pipeline,
    config: BacktestCliConfig,
) -> Result<Vec<BacktestReport>> {
    info!(
        instruments = config.instruments.len(),
        start = %config.start_date,
        end = %config.end_date,
        "Starting backtest"
    );

    let reports = pipeline
        .backtest(&config.instruments, config.start_date, config.end_date)
        .await
        .context("Backtest setup failed")?;

    for report in &reports {
        if let Some(error) = &report.error {
            warn!(instrument = %report.instrument, error = %error, "Backtest skipped");
        }
        println!("\n{}", report.summary());
    }

    if let Some(output_path) = &config.output_path {
        let content = if is_json(output_path) {
            serde_json::to_string_pretty(&reports)?
        } else {
            pipeline.render_backtest(&reports, Utc::now().date_naive())
        };
        if let Some(parent) = Path::new(output_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(output_path, content)
            .with_context(|| format!("Failed to write {}", output_path))?;
        info!("Report saved to: {}", output_path);
    }

    Ok(reports)
}

fn is_json(path: &str) -> bool {
    Path::new(path)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_by_extension() {
        assert!(is_json("reports/backtest.json"));
        assert!(is_json("OUT.JSON"));
        assert!(!is_json("reports/backtest.md"));
        assert!(!is_json("report"));
    }
}
