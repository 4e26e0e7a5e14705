//! 분류 및 회귀 성과 지표.
//!
//! 백테스트와 학습 CV에서 사용하는 지표를 제공합니다:
//! - ROC AUC (동점은 평균 순위로 처리, 단일 클래스면 0.0)
//! - 정밀도 / 재현율 / F1 / 정확도 (분모가 0이면 0.0)
//! - MAE / RMSE
//! - 방향 정확도 (부호 일치 비율)
//! - 평균 / 모표준편차
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! use pricecast_analytics::performance::metrics::ClassificationMetrics;
//!
//! let metrics = ClassificationMetrics::compute(&y_true, &y_prob, 0.5);
//! println!("AUC: {:.4}", metrics.auc);
//! ```

use serde::{Deserialize, Serialize};

use pricecast_core::round_f64;

/// 이진 분류 지표 묶음. 모든 값은 소수점 4자리로 반올림됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub auc: f64,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    pub accuracy: f64,
}

impl ClassificationMetrics {
    /// 확률과 판정 임계값으로 지표를 계산합니다.
    pub fn compute(y_true: &[u8], y_prob: &[f64], threshold: f64) -> Self {
        let y_pred: Vec<u8> = y_prob.iter().map(|p| u8::from(*p >= threshold)).collect();
        let auc = if has_both_classes(y_true) {
            roc_auc(y_true, y_prob)
        } else {
            0.0
        };

        Self {
            auc: round_f64(auc, 4),
            f1: round_f64(f1_score(y_true, &y_pred), 4),
            precision: round_f64(precision(y_true, &y_pred), 4),
            recall: round_f64(recall(y_true, &y_pred), 4),
            accuracy: round_f64(accuracy(y_true, &y_pred), 4),
        }
    }
}

/// 두 클래스가 모두 존재하는지.
pub fn has_both_classes(y_true: &[u8]) -> bool {
    let positives = y_true.iter().filter(|y| **y == 1).count();
    positives > 0 && positives < y_true.len()
}

/// 양성 비율.
pub fn positive_ratio(y: &[u8]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    y.iter().filter(|v| **v == 1).count() as f64 / y.len() as f64
}

/// Mann-Whitney U 통계량 기반 ROC AUC.
///
/// 단일 클래스 입력이면 0.0을 반환합니다.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> f64 {
    let n = y_true.len().min(scores.len());
    let n_pos = y_true[..n].iter().filter(|y| **y == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    // 동점 그룹은 평균 순위
    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = (0..n).filter(|k| y_true[*k] == 1).map(|k| ranks[k]).sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

fn confusion(y_true: &[u8], y_pred: &[u8]) -> (usize, usize, usize, usize) {
    let (mut tp, mut fp, mut tn, mut fn_) = (0, 0, 0, 0);
    for (t, p) in y_true.iter().zip(y_pred) {
        match (*t == 1, *p == 1) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }
    (tp, fp, tn, fn_)
}

fn safe_div(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn precision(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let (tp, fp, _, _) = confusion(y_true, y_pred);
    safe_div(tp, tp + fp)
}

pub fn recall(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let (tp, _, _, fn_) = confusion(y_true, y_pred);
    safe_div(tp, tp + fn_)
}

pub fn f1_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let (tp, fp, _, fn_) = confusion(y_true, y_pred);
    safe_div(2 * tp, 2 * tp + fp + fn_)
}

pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let (tp, _, tn, _) = confusion(y_true, y_pred);
    safe_div(tp + tn, y_true.len().min(y_pred.len()))
}

/// 평균 절대 오차.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum::<f64>() / n as f64
}

/// 평균 제곱근 오차.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mse = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n as f64;
    mse.sqrt()
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// 부호(-1, 0, +1)가 일치하는 비율.
pub fn directional_accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let hits = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| sign(**a) == sign(**p))
        .count();
    hits as f64 / n as f64
}

/// 산술 평균. 비어 있으면 0.0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 모표준편차 (ddof = 0). 비어 있으면 0.0.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
