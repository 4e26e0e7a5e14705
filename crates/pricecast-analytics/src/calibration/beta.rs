//! Beta 캘리브레이션.
//!
//! `q = sigmoid(c + a * ln(p) + b * ln(1 - p))`의 음의 로그우도를
//! Nelder-Mead로 최소화합니다. 시작점은 `(a, b, c) = (1, 1, 0)`입니다.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pricecast_core::{CalibrationConfig, PipelineError, PipelineResult};

use super::sigmoid;

/// Beta 캘리브레이터 파라미터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaCalibrator {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// 학습 라벨이 단일 클래스였으면 해당 클래스 값
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<f64>,
    pub clip_eps: f64,
}

impl BetaCalibrator {
    pub fn fit(probs: &[f64], labels: &[u8], config: &CalibrationConfig) -> PipelineResult<Self> {
        let n = probs.len().min(labels.len());
        if n == 0 {
            return Err(PipelineError::insufficient("beta", 1, 0));
        }
        if n < config.min_samples {
            warn!(samples = n, minimum = config.min_samples, "Beta: fitting with few samples");
        }

        let positives = labels[..n].iter().filter(|y| **y == 1).count();
        if positives == 0 || positives == n {
            let value = if positives == 0 { 0.0 } else { 1.0 };
            warn!(class = value, "Beta: single-class labels, using constant map");
            return Ok(Self {
                a: 0.0,
                b: 0.0,
                c: 0.0,
                constant: Some(value),
                clip_eps: config.clip_eps,
            });
        }

        let eps = config.clip_eps;
        let ys: Vec<f64> = labels[..n].iter().map(|y| f64::from(*y)).collect();
        let logs: Vec<(f64, f64)> = probs[..n]
            .iter()
            .map(|p| {
                let p = p.clamp(eps, 1.0 - eps);
                (p.ln(), (1.0 - p).ln())
            })
            .collect();

        let objective = |params: &[f64]| -> f64 {
            let (a, b, c) = (params[0], params[1], params[2]);
            let mut total = 0.0;
            for ((ln_p, ln_q), y) in logs.iter().zip(&ys) {
                let q = sigmoid(c + a * ln_p + b * ln_q).clamp(eps, 1.0 - eps);
                total += y * q.ln() + (1.0 - y) * (1.0 - q).ln();
            }
            -total / n as f64
        };

        let result = nelder_mead(
            objective,
            &[1.0, 1.0, 0.0],
            config.beta_max_iter,
            config.beta_tolerance,
            config.beta_tolerance,
        );

        if result.x.iter().any(|v| !v.is_finite()) || !result.fun.is_finite() {
            return Err(PipelineError::InvalidInput(
                "Beta fit produced non-finite parameters".to_string(),
            ));
        }

        debug!(
            a = result.x[0],
            b = result.x[1],
            c = result.x[2],
            nll = result.fun,
            iterations = result.iterations,
            "Beta fit"
        );

        Ok(Self {
            a: result.x[0],
            b: result.x[1],
            c: result.x[2],
            constant: None,
            clip_eps: eps,
        })
    }

    pub fn transform(&self, prob: f64) -> f64 {
        if let Some(value) = self.constant {
            return value;
        }
        let p = prob.clamp(self.clip_eps, 1.0 - self.clip_eps);
        sigmoid(self.c + self.a * p.ln() + self.b * (1.0 - p).ln()).clamp(0.0, 1.0)
    }
}

/// Nelder-Mead 최적화 결과.
#[derive(Debug, Clone)]
pub(crate) struct Minimum {
    pub x: Vec<f64>,
    pub fun: f64,
    pub iterations: usize,
}

/// 표준 계수(반사 1, 확장 2, 수축 0.5, 축소 0.5)의 Nelder-Mead.
///
/// 초기 simplex는 각 좌표를 5% 늘린 점들이며, 0인 좌표는 0.00025를 사용합니다.
/// 모든 정점이 `xatol`, 모든 함숫값이 `fatol` 이내로 모이면 종료합니다.
pub(crate) fn nelder_mead<F>(f: F, x0: &[f64], max_iter: usize, xatol: f64, fatol: f64) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    const RHO: f64 = 1.0;
    const CHI: f64 = 2.0;
    const PSI: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    let dim = x0.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    simplex.push(x0.to_vec());
    for k in 0..dim {
        let mut vertex = x0.to_vec();
        vertex[k] = if vertex[k] != 0.0 { vertex[k] * 1.05 } else { 0.00025 };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v.as_slice())).collect();

    let mut iterations = 0;
    while iterations < max_iter {
        // 함숫값 오름차순 정렬
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
        simplex = order.iter().map(|i| simplex[*i].clone()).collect();
        values = order.iter().map(|i| values[*i]).collect();

        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        if x_spread <= xatol && f_spread <= fatol {
            break;
        }

        let centroid: Vec<f64> = (0..dim)
            .map(|j| simplex[..dim].iter().map(|v| v[j]).sum::<f64>() / dim as f64)
            .collect();
        let worst = simplex[dim].clone();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&worst)
                .map(|(c, w)| (1.0 + t) * c - t * w)
                .collect()
        };

        let reflected = along(RHO);
        let f_reflected = f(reflected.as_slice());
        let mut shrink = false;

        if f_reflected < values[0] {
            let expanded = along(RHO * CHI);
            let f_expanded = f(expanded.as_slice());
            if f_expanded < f_reflected {
                simplex[dim] = expanded;
                values[dim] = f_expanded;
            } else {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
            }
        } else if f_reflected < values[dim - 1] {
            simplex[dim] = reflected;
            values[dim] = f_reflected;
        } else if f_reflected < values[dim] {
            let contracted = along(PSI * RHO);
            let f_contracted = f(contracted.as_slice());
            if f_contracted <= f_reflected {
                simplex[dim] = contracted;
                values[dim] = f_contracted;
            } else {
                shrink = true;
            }
        } else {
            let contracted = along(-PSI);
            let f_contracted = f(contracted.as_slice());
            if f_contracted < values[dim] {
                simplex[dim] = contracted;
                values[dim] = f_contracted;
            } else {
                shrink = true;
            }
        }

        if shrink {
            let best = simplex[0].clone();
            for k in 1..=dim {
                for j in 0..dim {
                    simplex[k][j] = best[j] + SIGMA * (simplex[k][j] - best[j]);
                }
                values[k] = f(simplex[k].as_slice());
            }
        }

        iterations += 1;
    }

    let best = (0..=dim)
        .min_by(|a, b| values[*a].total_cmp(&values[*b]))
        .unwrap_or(0);

    Minimum {
        x: simplex[best].clone(),
        fun: values[best],
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nelder_mead_quadratic() {
        let result = nelder_mead(
            |x| (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
            5000,
            1e-10,
            1e-10,
        );
        assert!((result.x[0] - 3.0).abs() < 1e-4);
        assert!((result.x[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_single_class_is_constant() {
        let config = CalibrationConfig::default();
        let probs: Vec<f64> = (0..40).map(|i| i as f64 / 40.0).collect();

        let cal = BetaCalibrator::fit(&probs, &[0; 40], &config).unwrap();
        assert_eq!(cal.constant, Some(0.0));
        for p in [0.0, 0.5, 0.9, 1.0] {
            assert_eq!(cal.transform(p), 0.0);
        }

        let cal = BetaCalibrator::fit(&probs, &[1; 40], &config).unwrap();
        assert_eq!(cal.constant, Some(1.0));
        assert_eq!(cal.transform(0.05), 1.0);

        let restored: BetaCalibrator =
            serde_json::from_str(&serde_json::to_string(&cal).unwrap()).unwrap();
        assert_eq!(restored, cal);
    }

    #[test]
    fn test_fitted_parameters_have_no_constant() {
        let probs: Vec<f64> = (0..60).map(|i| i as f64 / 60.0).collect();
        let labels: Vec<u8> = (0..60).map(|i| u8::from(i > 30)).collect();
        let cal = BetaCalibrator::fit(&probs, &labels, &CalibrationConfig::default()).unwrap();
        assert!(cal.constant.is_none());

        // 이전 형식(constant 없음)도 역직렬화됨
        let legacy = r#"{"a":1.0,"b":-1.0,"c":0.0,"clip_eps":1e-7}"#;
        let restored: BetaCalibrator = serde_json::from_str(legacy).unwrap();
        assert!(restored.constant.is_none());
        assert!((restored.transform(0.3) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_beta_bounded_on_extremes() {
        let probs: Vec<f64> = (0..60).map(|i| i as f64 / 60.0).collect();
        let labels: Vec<u8> = (0..60).map(|i| u8::from(i % 4 == 0 || i > 45)).collect();
        let cal = BetaCalibrator::fit(&probs, &labels, &CalibrationConfig::default()).unwrap();

        for p in [0.0, 1e-12, 0.5, 1.0 - 1e-12, 1.0] {
            let q = cal.transform(p);
            assert!((0.0..=1.0).contains(&q), "p={p} q={q}");
        }
    }
}
