//! 폴드 구성 확인 명령어.
//!
//! # 사용 예시
//!
//! ```bash
//! pricecast folds -i motorin -f 2021-01-01 -t 2025-01-31
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;

use pricecast_analytics::cv::FoldInfo;
use pricecast_core::Instrument;

use crate::pipeline::Pipeline;

/// 폴드 구성을 계산하고 표로 출력합니다.
pub async fn run_folds(
    pipeline: &Pipeline,
    instrument: &Instrument,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<FoldInfo>> {
    let folds = pipeline
        .fold_plan(instrument, start, end)
        .await
        .with_context(|| format!("Fold planning failed for {}", instrument))?;

    println!("\n{}", render_table(&folds));
    Ok(folds)
}

/// 폴드 목록을 표로 렌더링합니다.
pub fn render_table(folds: &[FoldInfo]) -> String {
    if folds.is_empty() {
        return "폴드 없음: 데이터가 최소 학습 기간 + embargo보다 짧습니다".to_string();
    }

    let mut lines = vec![
        format!(
            "{:>4}  {:<23}  {:>5}  {:<23}  {:<23}  {:>4}",
            "Fold", "Train", "N", "Embargo", "Test", "N"
        ),
        "─".repeat(92),
    ];
    for f in folds {
        let embargo = match (f.embargo_start, f.embargo_end) {
            (Some(s), Some(e)) => format!("{s}..{e}"),
            _ => "-".to_string(),
        };
        lines.push(format!(
            "{:>4}  {:<23}  {:>5}  {:<23}  {:<23}  {:>4}",
            f.fold,
            format!("{}..{}", f.train_start, f.train_end),
            f.train_size,
            embargo,
            format!("{}..{}", f.test_start, f.test_end),
            f.test_size
        ));
    }
    lines.join("\n")
}
