//! Isotonic 회귀 캘리브레이션 (pool-adjacent-violators).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pricecast_core::{CalibrationConfig, PipelineError, PipelineResult};

/// 단조 증가 구간 선형 보간 캘리브레이터.
///
/// `thresholds_x`는 엄격히 증가하며, 범위 밖 입력은 양 끝 값으로 잘립니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    pub thresholds_x: Vec<f64>,
    pub thresholds_y: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    x_sum: f64,
    y_sum: f64,
    weight: f64,
    x_min: f64,
    x_max: f64,
}

impl Block {
    fn y_mean(&self) -> f64 {
        self.y_sum / self.weight
    }
}

impl IsotonicCalibrator {
    pub fn fit(probs: &[f64], labels: &[u8], config: &CalibrationConfig) -> PipelineResult<Self> {
        let n = probs.len().min(labels.len());
        if n == 0 {
            return Err(PipelineError::insufficient("isotonic", 1, 0));
        }
        if n < config.min_samples {
            warn!(samples = n, minimum = config.min_samples, "Isotonic: fitting with few samples");
        }
        if probs[..n].iter().any(|p| !p.is_finite()) {
            return Err(PipelineError::InvalidInput(
                "Isotonic: non-finite probability".to_string(),
            ));
        }

        let mut pairs: Vec<(f64, f64)> = probs[..n]
            .iter()
            .zip(&labels[..n])
            .map(|(p, y)| (*p, f64::from(*y)))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // 같은 x는 하나의 가중 블록으로 합침
        let mut blocks: Vec<Block> = Vec::new();
        for (x, y) in pairs {
            match blocks.last_mut() {
                Some(last) if last.x_max == x => {
                    last.y_sum += y;
                    last.x_sum += x;
                    last.weight += 1.0;
                }
                _ => blocks.push(Block {
                    x_sum: x,
                    y_sum: y,
                    weight: 1.0,
                    x_min: x,
                    x_max: x,
                }),
            }
        }
        let unique_x: Vec<f64> = blocks.iter().map(|b| b.x_min).collect();

        // PAVA
        let mut stack: Vec<Block> = Vec::with_capacity(blocks.len());
        for block in blocks {
            stack.push(block);
            while stack.len() >= 2 {
                let top = stack[stack.len() - 1];
                let below = stack[stack.len() - 2];
                if below.y_mean() <= top.y_mean() {
                    break;
                }
                stack.pop();
                if let Some(merged) = stack.last_mut() {
                    merged.x_sum += top.x_sum;
                    merged.y_sum += top.y_sum;
                    merged.weight += top.weight;
                    merged.x_max = top.x_max;
                }
            }
        }

        // 각 고유 x에 블록 평균을 배정
        let mut thresholds_x = Vec::with_capacity(unique_x.len());
        let mut thresholds_y = Vec::with_capacity(unique_x.len());
        let mut block_iter = stack.iter().peekable();
        for x in unique_x {
            while let Some(block) = block_iter.peek() {
                if x > block.x_max {
                    block_iter.next();
                } else {
                    break;
                }
            }
            let y = block_iter.peek().map_or(0.0, |b| b.y_mean()).clamp(0.0, 1.0);
            thresholds_x.push(x);
            thresholds_y.push(y);
        }

        debug!(knots = thresholds_x.len(), blocks = stack.len(), "Isotonic fit");
        Ok(Self {
            thresholds_x,
            thresholds_y,
        })
    }

    pub fn transform(&self, prob: f64) -> f64 {
        let xs = &self.thresholds_x;
        let ys = &self.thresholds_y;
        let (Some(first_x), Some(last_x)) = (xs.first(), xs.last()) else {
            return prob.clamp(0.0, 1.0);
        };

        let x = prob.clamp(*first_x, *last_x);
        let idx = xs.partition_point(|v| *v < x);
        let q = if idx == 0 {
            ys[0]
        } else if idx >= xs.len() {
            ys[ys.len() - 1]
        } else if xs[idx] == x {
            ys[idx]
        } else {
            let (x0, x1) = (xs[idx - 1], xs[idx]);
            let (y0, y1) = (ys[idx - 1], ys[idx]);
            y0 + (y1 - y0) * (x - x0) / (x1 - x0)
        };
        q.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pava_pools_violators() {
        let config = CalibrationConfig::default();
        let cal = IsotonicCalibrator::fit(&[0.1, 0.2, 0.3, 0.4], &[0, 1, 0, 1], &config).unwrap();

        // 0.2, 0.3 구간이 평균 0.5로 합쳐짐
        assert_eq!(cal.thresholds_y, vec![0.0, 0.5, 0.5, 1.0]);
        assert!((cal.transform(0.35) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_is_clipped() {
        let config = CalibrationConfig::default();
        let cal = IsotonicCalibrator::fit(&[0.2, 0.8], &[0, 1], &config).unwrap();
        assert_eq!(cal.transform(0.0), 0.0);
        assert_eq!(cal.transform(1.0), 1.0);
        assert!((cal.transform(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_is_flat() {
        let config = CalibrationConfig::default();
        let probs: Vec<f64> = (0..40).map(|i| i as f64 / 40.0).collect();

        let cal = IsotonicCalibrator::fit(&probs, &[0; 40], &config).unwrap();
        assert!(cal.thresholds_y.iter().all(|y| *y == 0.0));
        for p in [0.0, 0.5, 0.9, 1.0] {
            assert_eq!(cal.transform(p), 0.0);
        }

        let cal = IsotonicCalibrator::fit(&probs, &[1; 40], &config).unwrap();
        assert_eq!(cal.transform(0.01), 1.0);
    }

    #[test]
    fn test_duplicate_inputs_are_averaged() {
        let config = CalibrationConfig::default();
        let cal = IsotonicCalibrator::fit(&[0.5, 0.5, 0.5, 0.9], &[1, 0, 0, 1], &config).unwrap();
        assert_eq!(cal.thresholds_x, vec![0.5, 0.9]);
        assert!((cal.thresholds_y[0] - 1.0 / 3.0).abs() < 1e-12);
    }
}
