//! 캘리브레이션 품질 지표 (ECE, MCE, Brier, reliability).

use serde::{Deserialize, Serialize};

use pricecast_core::round_f64;

/// bin별 신뢰도 데이터. 빈 bin은 평균값 0.0으로 채워집니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityData {
    pub mean_predicted: Vec<f64>,
    pub fraction_positive: Vec<f64>,
    pub bin_counts: Vec<usize>,
}

/// 캘리브레이션 평가 결과. 수치는 소수점 6자리로 반올림됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub ece: f64,
    pub mce: f64,
    pub brier_score: f64,
    pub reliability: ReliabilityData,
}

/// 등간격 bin으로 캘리브레이션 품질을 평가합니다.
///
/// 마지막 bin은 1.0을 포함합니다. 입력이 비어 있으면 모든 값이 0입니다.
pub fn evaluate_calibration(y_prob: &[f64], y_true: &[u8], n_bins: usize) -> CalibrationReport {
    let n = y_prob.len().min(y_true.len());
    if n == 0 || n_bins == 0 {
        return CalibrationReport::default();
    }

    let brier = y_prob
        .iter()
        .zip(y_true)
        .map(|(p, y)| (p - f64::from(*y)).powi(2))
        .sum::<f64>()
        / n as f64;

    let mut reliability = ReliabilityData::default();
    let mut ece = 0.0;
    let mut mce: f64 = 0.0;

    for bin in 0..n_bins {
        let lower = bin as f64 / n_bins as f64;
        let upper = (bin + 1) as f64 / n_bins as f64;
        let last = bin + 1 == n_bins;

        let (mut count, mut sum_pred, mut sum_true) = (0usize, 0.0, 0.0);
        for (p, y) in y_prob.iter().zip(y_true) {
            let inside = *p >= lower && if last { *p <= upper } else { *p < upper };
            if inside {
                count += 1;
                sum_pred += p;
                sum_true += f64::from(*y);
            }
        }

        reliability.bin_counts.push(count);
        if count > 0 {
            let avg_pred = sum_pred / count as f64;
            let avg_true = sum_true / count as f64;
            reliability.mean_predicted.push(round_f64(avg_pred, 6));
            reliability.fraction_positive.push(round_f64(avg_true, 6));

            let gap = (avg_pred - avg_true).abs();
            ece += (count as f64 / n as f64) * gap;
            mce = mce.max(gap);
        } else {
            reliability.mean_predicted.push(0.0);
            reliability.fraction_positive.push(0.0);
        }
    }

    CalibrationReport {
        ece: round_f64(ece, 6),
        mce: round_f64(mce, 6),
        brier_score: round_f64(brier, 6),
        reliability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let report = evaluate_calibration(&[], &[], 10);
        assert_eq!(report, CalibrationReport::default());
    }

    #[test]
    fn test_perfectly_calibrated_bins() {
        // 0.25 bin: 4개 중 1개 양성, 0.75 bin: 4개 중 3개 양성
        let probs = [0.25, 0.25, 0.25, 0.25, 0.75, 0.75, 0.75, 0.75];
        let labels = [1, 0, 0, 0, 1, 1, 1, 0];
        let report = evaluate_calibration(&probs, &labels, 10);

        assert_eq!(report.ece, 0.0);
        assert_eq!(report.mce, 0.0);
        assert_eq!(report.reliability.bin_counts.iter().sum::<usize>(), 8);
        assert_eq!(report.reliability.bin_counts[2], 4);
        assert_eq!(report.reliability.bin_counts[7], 4);
    }

    #[test]
    fn test_last_bin_includes_one() {
        let report = evaluate_calibration(&[1.0, 0.0], &[1, 0], 10);
        assert_eq!(report.reliability.bin_counts[9], 1);
        assert_eq!(report.reliability.bin_counts[0], 1);
        assert_eq!(report.ece, 0.0);
        assert_eq!(report.brier_score, 0.0);
    }

    #[test]
    fn test_gap_metrics() {
        let report = evaluate_calibration(&[0.9, 0.9], &[0, 0], 10);
        assert!((report.ece - 0.9).abs() < 1e-9);
        assert!((report.mce - 0.9).abs() < 1e-9);
        assert!((report.brier_score - 0.81).abs() < 1e-9);
    }
}
