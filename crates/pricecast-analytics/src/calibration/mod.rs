//! 확률 캘리브레이션.
//!
//! Stage 1 분류기의 원시 확률을 실제 이벤트 빈도에 맞게 보정합니다.
//! 후보는 우선순위 순서(Platt → Beta → Isotonic)로 시도되며, 검증 ECE가 임계값
//! 미만인 첫 후보가 선택됩니다. 임계값을 만족하는 후보가 없으면 ECE가 가장 낮은
//! 후보가 선택됩니다.
//!
//! # 모듈 구성
//!
//! - [`metrics`]: ECE / MCE / Brier / reliability 평가
//! - [`platt`], [`beta`], [`isotonic`]: 개별 캘리브레이터
//! - [`selector`]: 우선순위 기반 자동 선택

pub mod beta;
pub mod isotonic;
pub mod metrics;
pub mod platt;
pub mod selector;

use std::fmt;

use serde::{Deserialize, Serialize};

use pricecast_core::{CalibrationConfig, PipelineResult};

pub use beta::BetaCalibrator;
pub use isotonic::IsotonicCalibrator;
pub use metrics::{evaluate_calibration, CalibrationReport, ReliabilityData};
pub use platt::PlattCalibrator;
pub use selector::{select_calibrator, CalibrationCandidate, CalibrationSelection, CalibrationSummary};

/// 캘리브레이션 방법.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationKind {
    Platt,
    Beta,
    Isotonic,
}

impl CalibrationKind {
    /// 시도 우선순위.
    pub const PRIORITY: [CalibrationKind; 3] = [Self::Platt, Self::Beta, Self::Isotonic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platt => "platt",
            Self::Beta => "beta",
            Self::Isotonic => "isotonic",
        }
    }

    /// 해당 방법으로 캘리브레이터를 적합합니다.
    pub fn fit(
        &self,
        probs: &[f64],
        labels: &[u8],
        config: &CalibrationConfig,
    ) -> PipelineResult<Calibrator> {
        Ok(match self {
            Self::Platt => Calibrator::Platt(PlattCalibrator::fit(probs, labels, config)?),
            Self::Beta => Calibrator::Beta(BetaCalibrator::fit(probs, labels, config)?),
            Self::Isotonic => Calibrator::Isotonic(IsotonicCalibrator::fit(probs, labels, config)?),
        })
    }
}

impl fmt::Display for CalibrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 적합된 캘리브레이터. 모든 출력은 `[0, 1]`로 잘립니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Calibrator {
    Platt(PlattCalibrator),
    Beta(BetaCalibrator),
    Isotonic(IsotonicCalibrator),
}

impl Calibrator {
    pub fn kind(&self) -> CalibrationKind {
        match self {
            Self::Platt(_) => CalibrationKind::Platt,
            Self::Beta(_) => CalibrationKind::Beta,
            Self::Isotonic(_) => CalibrationKind::Isotonic,
        }
    }

    pub fn transform(&self, prob: f64) -> f64 {
        let q = match self {
            Self::Platt(c) => c.transform(prob),
            Self::Beta(c) => c.transform(prob),
            Self::Isotonic(c) => c.transform(prob),
        };
        if q.is_nan() {
            0.0
        } else {
            q.clamp(0.0, 1.0)
        }
    }

    pub fn transform_all(&self, probs: &[f64]) -> Vec<f64> {
        probs.iter().map(|p| self.transform(*p)).collect()
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

pub(crate) fn logit(p: f64, eps: f64) -> f64 {
    let p = p.clamp(eps, 1.0 - eps);
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_logit_inverse() {
        for p in [0.01, 0.25, 0.5, 0.9] {
            assert!((sigmoid(logit(p, 1e-7)) - p).abs() < 1e-12);
        }
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
    }

    #[test]
    fn test_calibrator_serde_tag() {
        let cal = Calibrator::Isotonic(IsotonicCalibrator {
            thresholds_x: vec![0.0, 1.0],
            thresholds_y: vec![0.1, 0.9],
        });
        let json = serde_json::to_value(&cal).unwrap();
        assert_eq!(json["method"], "isotonic");

        let back: Calibrator = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), CalibrationKind::Isotonic);
        assert!((back.transform(0.5) - 0.5).abs() < 1e-12);
    }
}
