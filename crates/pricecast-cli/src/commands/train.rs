//! 모델 학습 명령어.
//!
//! # 사용 예시
//!
//! ```bash
//! # 설정된 전체 상품 학습
//! pricecast train -f 2021-01-01 -t 2025-01-31
//!
//! # 한 상품만
//! pricecast train -i benzin -f 2021-01-01 -t 2025-01-31
//! ```

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{error, info};

use pricecast_core::Instrument;

use crate::pipeline::{Pipeline, TrainingOutcome};

/// 상품별로 학습합니다. 한 상품의 실패가 다른 상품 학습을 막지 않습니다.
///
/// 하나라도 실패하면 마지막에 오류를 반환합니다.
pub async fn run_train(
    pipeline: &Pipeline,
    instruments: &[Instrument],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<TrainingOutcome>> {
    let mut outcomes = Vec::new();
    let mut failed = Vec::new();

    for instrument in instruments {
        match pipeline.train(instrument, start, end).await {
            Ok(outcome) => {
                info!(key = %outcome.key, "Training completed");
                println!("\n{}", summarize(&outcome, &pipeline.display_name(instrument)));
                outcomes.push(outcome);
            }
            Err(e) => {
                error!(instrument = %instrument, error = %e, "Training failed");
                println!("\n❌ {} 학습 실패: {}", pipeline.display_name(instrument), e);
                failed.push(instrument.to_string());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Training failed for: {}", failed.join(", "));
    }
    Ok(outcomes)
}

/// 학습 결과 요약.
pub fn summarize(outcome: &TrainingOutcome, display_name: &str) -> String {
    let m = &outcome.metrics;
    let mut lines = vec![
        format!("✅ {} 모델 저장: {}", display_name, outcome.key),
        format!(
            "  샘플: {} (양성 {}), 폴드: {}",
            m.n_samples, m.n_positive, m.stage1.n_folds
        ),
        format!(
            "  Stage 1 AUC {:.4}, F1 {:.4}, scale_pos_weight {:.3}",
            m.stage1.mean_auc, m.stage1.mean_f1, m.stage1.scale_pos_weight
        ),
    ];

    if m.stage2.skipped {
        let reason = m.stage2.reason.map(|r| r.as_str()).unwrap_or("N/A");
        lines.push(format!("  Stage 2 건너뜀: {reason}"));
    } else {
        lines.push(format!("  Stage 2 학습 (양성 {})", m.stage2.n_positive));
    }

    match &m.calibration.summary {
        Some(summary) => lines.push(format!(
            "  캘리브레이션: {} (ECE {:.4})",
            summary.selected_method, summary.ece
        )),
        None => {
            let reason = m.calibration.skipped_reason.map(|r| r.as_str()).unwrap_or("N/A");
            lines.push(format!("  캘리브레이션 없음: {reason}"));
        }
    }
    lines.join("\n")
}
