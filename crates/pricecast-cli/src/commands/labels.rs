//! 라벨 생성 명령어.
//!
//! # 사용 예시
//!
//! ```bash
//! # 휘발유 2024년 라벨 생성
//! pricecast labels -i benzin -f 2024-01-01 -t 2024-12-31
//!
//! # CSV로 내보내기
//! pricecast labels -i lpg -f 2024-01-01 -t 2024-06-30 -o data/lpg_labels.csv
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use pricecast_core::{EventKind, EventLabel, Instrument};

use crate::pipeline::Pipeline;

/// 라벨 명령 설정.
#[derive(Debug, Clone)]
pub struct LabelsCliConfig {
    pub instrument: Instrument,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// CSV 출력 경로 (옵션)
    pub output_path: Option<String>,
}

/// 라벨을 생성하고 요약을 출력합니다.
pub async fn run_labels(pipeline: &Pipeline, config: LabelsCliConfig) -> Result<Vec<EventLabel>> {
    let labels = pipeline
        .generate_labels(&config.instrument, config.start, config.end)
        .await
        .with_context(|| format!("Label generation failed for {}", config.instrument))?;

    println!("\n{}", summarize(&labels, &pipeline.display_name(&config.instrument)));

    if let Some(path) = &config.output_path {
        std::fs::write(path, to_csv(&labels))
            .with_context(|| format!("Failed to write {}", path))?;
        info!("Labels saved to: {}", path);
    }

    Ok(labels)
}

/// 라벨 분포 요약.
pub fn summarize(labels: &[EventLabel], display_name: &str) -> String {
    let total = labels.len();
    let positives = labels.iter().filter(|l| l.binary_flag == 1).count();
    let daily = labels.iter().filter(|l| l.event_kind == EventKind::Daily).count();
    let cumulative = labels
        .iter()
        .filter(|l| l.event_kind == EventKind::Cumulative)
        .count();
    let ratio = if total > 0 {
        positives as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut lines = vec![format!("{display_name} 라벨 {total}개")];
    if let (Some(first), Some(last)) = (labels.first(), labels.last()) {
        lines.push(format!("기간: {} ~ {}", first.run_date, last.run_date));
    }
    lines.push(format!("이벤트: {positives}개 ({ratio:.1}%)"));
    lines.push(format!("  daily: {daily}, cumulative: {cumulative}"));
    lines.join("\n")
}

/// 라벨을 CSV 문자열로 변환합니다.
pub fn to_csv(labels: &[EventLabel]) -> String {
    let mut out = String::from(
        "run_date,instrument,binary_flag,event_kind,first_event_amount,first_event_direction,net_amount,reference_price,window_end_date\n",
    );
    for l in labels {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            l.run_date,
            l.instrument,
            l.binary_flag,
            l.event_kind,
            l.first_event_amount,
            l.first_event_direction,
            l.net_amount,
            l.reference_price,
            l.window_end_date
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn label(day: u32, flag: u8, kind: EventKind) -> EventLabel {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        EventLabel {
            run_date: date,
            instrument: Instrument::new("benzin"),
            binary_flag: flag,
            event_kind: kind,
            first_event_amount: if flag == 1 { dec!(0.30) } else { Decimal::ZERO },
            first_event_direction: i8::from(flag == 1),
            net_amount: dec!(0.30),
            reference_price: dec!(58.00),
            window_end_date: date + chrono::Duration::days(3),
        }
    }

    #[test]
    fn test_summary_and_csv() {
        let labels = vec![
            label(1, 1, EventKind::Daily),
            label(2, 0, EventKind::None),
            label(3, 1, EventKind::Cumulative),
            label(4, 0, EventKind::None),
        ];

        let summary = summarize(&labels, "휘발유");
        assert!(summary.contains("휘발유 라벨 4개"));
        assert!(summary.contains("이벤트: 2개 (50.0%)"));
        assert!(summary.contains("daily: 1, cumulative: 1"));

        let csv = to_csv(&labels);
        assert_eq!(csv.lines().count(), 5);
        assert!(csv.lines().nth(1).unwrap().starts_with("2024-03-01,benzin,1,daily,0.30,1,"));
    }
}
