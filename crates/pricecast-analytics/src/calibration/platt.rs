//! Platt scaling.
//!
//! 원시 확률의 logit에 대한 1차원 로지스틱 회귀
//! `q = sigmoid(slope * logit(p) + intercept)`를 Newton-Raphson으로 적합합니다.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pricecast_core::{CalibrationConfig, PipelineError, PipelineResult};

use super::{logit, sigmoid};

const MAX_NEWTON_ITER: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-10;
/// 분리 가능한 데이터에서 계수 발산을 막는 아주 작은 L2 항
const RIDGE: f64 = 1e-8;

/// Platt 캘리브레이터 파라미터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlattCalibrator {
    pub slope: f64,
    pub intercept: f64,
    /// 학습 라벨이 단일 클래스였으면 해당 클래스 값
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<f64>,
    pub clip_eps: f64,
}

impl PlattCalibrator {
    pub fn fit(probs: &[f64], labels: &[u8], config: &CalibrationConfig) -> PipelineResult<Self> {
        let n = probs.len().min(labels.len());
        if n == 0 {
            return Err(PipelineError::insufficient("platt", 1, 0));
        }
        if n < config.min_samples {
            warn!(samples = n, minimum = config.min_samples, "Platt: fitting with few samples");
        }

        let positives = labels[..n].iter().filter(|y| **y == 1).count();
        if positives == 0 || positives == n {
            let value = if positives == 0 { 0.0 } else { 1.0 };
            warn!(class = value, "Platt: single-class labels, using constant map");
            return Ok(Self {
                slope: 0.0,
                intercept: 0.0,
                constant: Some(value),
                clip_eps: config.clip_eps,
            });
        }

        let xs: Vec<f64> = probs[..n].iter().map(|p| logit(*p, config.clip_eps)).collect();
        let ys: Vec<f64> = labels[..n].iter().map(|y| f64::from(*y)).collect();

        let (mut slope, mut intercept) = (1.0, 0.0);
        let mut loss = neg_log_likelihood(&xs, &ys, slope, intercept);

        for iter in 0..MAX_NEWTON_ITER {
            let (mut g_s, mut g_i) = (RIDGE * slope, 0.0);
            let (mut h_ss, mut h_si, mut h_ii) = (RIDGE, 0.0, 1e-12);
            for (x, y) in xs.iter().zip(&ys) {
                let q = sigmoid(slope * x + intercept);
                let r = q - y;
                let w = q * (1.0 - q);
                g_s += r * x;
                g_i += r;
                h_ss += w * x * x;
                h_si += w * x;
                h_ii += w;
            }

            let det = h_ss * h_ii - h_si * h_si;
            if !det.is_finite() || det <= 0.0 {
                debug!(iter, "Platt: singular Hessian, stopping");
                break;
            }
            let step_s = (h_ii * g_s - h_si * g_i) / det;
            let step_i = (h_ss * g_i - h_si * g_s) / det;

            // 손실이 줄어들 때까지 step 절반씩 축소
            let mut scale = 1.0;
            let mut accepted = false;
            while scale > 1e-6 {
                let cand_s = slope - scale * step_s;
                let cand_i = intercept - scale * step_i;
                let cand_loss = neg_log_likelihood(&xs, &ys, cand_s, cand_i);
                if cand_loss.is_finite() && cand_loss <= loss {
                    slope = cand_s;
                    intercept = cand_i;
                    let improvement = loss - cand_loss;
                    loss = cand_loss;
                    accepted = improvement > NEWTON_TOLERANCE;
                    break;
                }
                scale *= 0.5;
            }
            if !accepted {
                break;
            }
        }

        if !slope.is_finite() || !intercept.is_finite() {
            return Err(PipelineError::InvalidInput(
                "Platt fit diverged".to_string(),
            ));
        }

        debug!(slope, intercept, loss, "Platt fit");
        Ok(Self {
            slope,
            intercept,
            constant: None,
            clip_eps: config.clip_eps,
        })
    }

    pub fn transform(&self, prob: f64) -> f64 {
        let q = match self.constant {
            Some(value) => value,
            None => sigmoid(self.slope * logit(prob, self.clip_eps) + self.intercept),
        };
        q.clamp(0.0, 1.0)
    }
}

fn neg_log_likelihood(xs: &[f64], ys: &[f64], slope: f64, intercept: f64) -> f64 {
    let mut total = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let z = slope * x + intercept;
        // log(1 + e^z) - y*z 를 수치적으로 안정하게
        let softplus = if z > 0.0 { z + (-z).exp().ln_1p() } else { z.exp().ln_1p() };
        total += softplus - y * z;
    }
    total + 0.5 * RIDGE * slope * slope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_class_is_constant() {
        let config = CalibrationConfig::default();
        let cal = PlattCalibrator::fit(&[0.1, 0.7, 0.9], &[1, 1, 1], &config).unwrap();
        assert_eq!(cal.constant, Some(1.0));
        assert_eq!(cal.transform(0.0), 1.0);

        let cal = PlattCalibrator::fit(&[0.1, 0.7], &[0, 0], &config).unwrap();
        assert_eq!(cal.transform(0.99), 0.0);
    }

    #[test]
    fn test_monotone_and_bounded() {
        let config = CalibrationConfig::default();
        let probs: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let labels: Vec<u8> = (0..100).map(|i| u8::from(i % 3 == 0 || i > 70)).collect();
        let cal = PlattCalibrator::fit(&probs, &labels, &config).unwrap();

        let mut prev = -1.0;
        for p in [0.0, 0.1, 0.3, 0.5, 0.8, 1.0] {
            let q = cal.transform(p);
            assert!((0.0..=1.0).contains(&q));
            assert!(q >= prev);
            prev = q;
        }
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(PlattCalibrator::fit(&[], &[], &CalibrationConfig::default()).is_err());
    }
}
