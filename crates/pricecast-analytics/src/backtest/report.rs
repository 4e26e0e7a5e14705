//! 여러 상품의 백테스트 결과를 Markdown 문서로 렌더링합니다.

use chrono::NaiveDate;

use pricecast_core::Instrument;

use super::engine::BacktestReport;

/// 백테스트 결과 Markdown 리포트.
///
/// `display_name`은 상품 코드를 사람이 읽는 이름으로 바꿉니다.
pub fn render_markdown<F>(reports: &[BacktestReport], generated_on: NaiveDate, display_name: F) -> String
where
    F: Fn(&Instrument) -> String,
{
    let instruments: Vec<String> = reports.iter().map(|r| r.instrument.to_string()).collect();
    let mut lines = vec![
        "# 가격 변동 이벤트 예측 백테스트 리포트".to_string(),
        String::new(),
        format!("**작성일:** {generated_on}"),
        format!("**상품:** {}", instruments.join(", ")),
        String::new(),
    ];

    for report in reports {
        render_instrument(&mut lines, report, &display_name(&report.instrument));
    }

    lines.join("\n")
}

fn render_instrument(lines: &mut Vec<String>, report: &BacktestReport, name: &str) {
    let code = report.instrument.as_str().to_uppercase();
    if name.eq_ignore_ascii_case(&code) {
        lines.push(format!("## {code}"));
    } else {
        lines.push(format!("## {name} ({code})"));
    }
    lines.push(String::new());

    if let Some(error) = &report.error {
        lines.push(format!("**오류:** {error}"));
        lines.push(String::new());
        return;
    }

    lines.push(format!("**폴드 수:** {}", report.n_folds));
    lines.push(String::new());

    lines.push("### Stage 1: 이진 분류기".to_string());
    lines.push(String::new());
    lines.push("| 지표 | 평균 | 표준편차 |".to_string());
    lines.push("|------|------|----------|".to_string());
    for (label, summary) in report.stage1.rows() {
        lines.push(format!("| {label} | {:.4} | ±{:.4} |", summary.mean, summary.std));
    }
    lines.push(String::new());

    let stage2 = &report.stage2;
    if stage2.skipped {
        let reason = stage2.reason.map(|r| r.as_str()).unwrap_or("N/A");
        lines.push(format!("### Stage 2: 금액 회귀 (건너뜀: {reason})"));
    } else {
        lines.push("### Stage 2: 이중 회귀".to_string());
        lines.push(String::new());
        lines.push(format!("**양성 샘플 수:** {}", stage2.n_positive_samples));
        lines.push(format!("**Stage 2 폴드 수:** {}", stage2.n_folds_with_stage2));
        lines.push(String::new());
        lines.push("| 지표 | 값 |".to_string());
        lines.push("|------|----|".to_string());
        for (label, summary) in stage2.rows() {
            lines.push(format!("| {label} | {:.6} |", summary.mean));
        }
    }
    lines.push(String::new());

    lines.push("### 폴드 상세".to_string());
    lines.push(String::new());
    lines.push("| Fold | Train | Test | AUC | F1 | Prec | Rec | ECE | Cal | S2 |".to_string());
    lines.push("|------|-------|------|-----|----|------|-----|-----|-----|----|".to_string());
    for detail in &report.fold_details {
        let s1 = &detail.stage1;
        lines.push(format!(
            "| {} | {} | {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} | {} | {} |",
            detail.fold,
            detail.train_size,
            detail.test_size,
            s1.metrics.auc,
            s1.metrics.f1,
            s1.metrics.precision,
            s1.metrics.recall,
            s1.ece,
            detail.calibration_method,
            if detail.stage2.is_some() { "OK" } else { "SKIP" },
        ));
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(String::new());
}
