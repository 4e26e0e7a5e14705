//! 우선순위 기반 캘리브레이터 자동 선택.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use pricecast_core::{CalibrationConfig, PipelineError, PipelineResult};

use super::{evaluate_calibration, CalibrationKind, CalibrationReport, Calibrator};

/// 적합에 성공한 후보와 검증 지표.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCandidate {
    pub method: CalibrationKind,
    pub calibrator: Calibrator,
    pub ece: f64,
    pub mce: f64,
    pub brier_score: f64,
}

/// 선택 결과 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub selected_method: CalibrationKind,
    pub ece: f64,
    pub mce: f64,
    pub brier_score: f64,
    pub reliability: super::ReliabilityData,
    /// 시도된 후보 (선택 시점까지)
    pub all_candidates: Vec<CandidateScore>,
}

/// 후보별 ECE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub method: CalibrationKind,
    pub ece: f64,
}

/// 선택된 캘리브레이터와 요약.
#[derive(Debug, Clone)]
pub struct CalibrationSelection {
    pub calibrator: Calibrator,
    pub summary: CalibrationSummary,
    pub candidates: Vec<CalibrationCandidate>,
}

/// 학습 구간에서 후보를 적합하고 검증 구간 ECE로 캘리브레이터를 선택합니다.
///
/// 후보 적합이 실패하면 경고 후 다음 후보로 넘어갑니다. 하나도 적합되지 않으면
/// [`PipelineError::CalibrationExhausted`]를 반환합니다.
pub fn select_calibrator(
    prob_train: &[f64],
    label_train: &[u8],
    prob_val: &[f64],
    label_val: &[u8],
    config: &CalibrationConfig,
) -> PipelineResult<CalibrationSelection> {
    let mut candidates: Vec<(CalibrationCandidate, CalibrationReport)> = Vec::new();
    let mut early_pick: Option<usize> = None;

    for kind in CalibrationKind::PRIORITY {
        let calibrator = match kind.fit(prob_train, label_train, config) {
            Ok(calibrator) => calibrator,
            Err(e) => {
                warn!(method = %kind, error = %e, "Calibration candidate failed");
                continue;
            }
        };

        let calibrated = calibrator.transform_all(prob_val);
        let report = evaluate_calibration(&calibrated, label_val, config.n_bins);
        info!(method = %kind, ece = report.ece, "Calibration candidate evaluated");

        candidates.push((
            CalibrationCandidate {
                method: kind,
                calibrator,
                ece: report.ece,
                mce: report.mce,
                brier_score: report.brier_score,
            },
            report,
        ));

        let last_ece = candidates[candidates.len() - 1].0.ece;
        if last_ece < config.ece_threshold {
            info!(method = %kind, threshold = config.ece_threshold, "Calibration threshold met");
            early_pick = Some(candidates.len() - 1);
            break;
        }
    }

    if candidates.is_empty() {
        return Err(PipelineError::CalibrationExhausted(
            "모든 캘리브레이션 후보 적합 실패 (platt, beta, isotonic)".to_string(),
        ));
    }

    // 동점이면 우선순위가 앞선 후보
    let best = early_pick.unwrap_or_else(|| {
        let mut best = 0;
        for (i, (candidate, _)) in candidates.iter().enumerate() {
            if candidate.ece < candidates[best].0.ece {
                best = i;
            }
        }
        best
    });

    let all_candidates = candidates
        .iter()
        .map(|(c, _)| CandidateScore {
            method: c.method,
            ece: c.ece,
        })
        .collect();

    let (winner, report) = candidates[best].clone();
    info!(method = %winner.method, ece = winner.ece, "Calibration selected");

    Ok(CalibrationSelection {
        calibrator: winner.calibrator,
        summary: CalibrationSummary {
            selected_method: winner.method,
            ece: report.ece,
            mce: report.mce,
            brier_score: report.brier_score,
            reliability: report.reliability,
            all_candidates,
        },
        candidates: candidates.into_iter().map(|(c, _)| c).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_training_data_is_exhausted() {
        let err = select_calibrator(&[], &[], &[0.5], &[1], &CalibrationConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::CalibrationExhausted(_)));
        assert!(err.is_escalated());
    }

    /// 점수마다 100개씩, 양성 비율이 점수와 정확히 같은 표본.
    fn already_calibrated() -> (Vec<f64>, Vec<u8>) {
        let mut probs = Vec::new();
        let mut labels = Vec::new();
        for (p, positives) in [(0.1, 10), (0.3, 30), (0.5, 50), (0.7, 70), (0.9, 90)] {
            for i in 0..100 {
                probs.push(p);
                labels.push(u8::from(i < positives));
            }
        }
        (probs, labels)
    }

    #[test]
    fn test_stops_at_first_candidate_under_threshold() {
        let (probs, labels) = already_calibrated();
        let selection =
            select_calibrator(&probs, &labels, &probs, &labels, &CalibrationConfig::default()).unwrap();

        assert_eq!(selection.summary.selected_method, CalibrationKind::Platt);
        assert_eq!(selection.summary.all_candidates.len(), 1);
        assert_eq!(selection.candidates.len(), 1);
        assert!(selection.summary.ece < 1e-6, "ece = {}", selection.summary.ece);
    }

    #[test]
    fn test_all_candidates_tried_when_threshold_unmet() {
        let (probs, labels) = already_calibrated();
        let config = CalibrationConfig {
            ece_threshold: 0.0,
            ..CalibrationConfig::default()
        };
        let selection = select_calibrator(&probs, &labels, &probs, &labels, &config).unwrap();

        let tried: Vec<CalibrationKind> = selection
            .summary
            .all_candidates
            .iter()
            .map(|c| c.method)
            .collect();
        assert_eq!(tried, CalibrationKind::PRIORITY.to_vec());

        let best = selection
            .summary
            .all_candidates
            .iter()
            .map(|c| c.ece)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(selection.summary.ece, best);
    }

    #[test]
    fn test_single_class_labels_select_constant_map() {
        let probs: Vec<f64> = (0..50).map(|i| i as f64 / 50.0).collect();
        let labels = vec![0u8; 50];
        let selection =
            select_calibrator(&probs, &labels, &probs, &labels, &CalibrationConfig::default()).unwrap();

        assert_eq!(selection.summary.selected_method, CalibrationKind::Platt);
        assert_eq!(selection.summary.ece, 0.0);
        assert_eq!(selection.calibrator.transform(0.9), 0.0);
    }
}
