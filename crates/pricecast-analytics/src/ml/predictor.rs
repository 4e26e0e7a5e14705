//! 학습된 번들을 사용한 단일 일자 추론.
//!
//! 1. Stage 1 원시 확률 계산
//! 2. 설정에 따라 캘리브레이션 적용 (없으면 원시 확률 사용)
//! 3. 확률이 Stage 2 임계값 이상이고 회귀 모델이 있으면 금액 예측
//! 4. 금액은 상품별 한도로 잘리며 방향은 잘린 첫 이벤트 금액의 부호

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use pricecast_core::{
    decimal_from_f64, round_f64, AppConfig, ClipLimits, DecimalExt, FeatureRow, Prediction,
};

use super::bundle::TrainedModelBundle;
use super::error::{MlError, MlResult};

/// 추론 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// 번들의 캘리브레이터를 적용할지 여부
    pub use_calibration: bool,
    /// Stage 2를 실행하는 최소 확률
    pub stage2_threshold: f64,
    /// Stage 2 출력 한도
    pub clip: ClipLimits,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            use_calibration: false,
            stage2_threshold: 0.25,
            clip: ClipLimits::default(),
        }
    }
}

impl PredictorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 애플리케이션 설정에서 상품별 추론 설정을 만듭니다.
    pub fn from_app_config(config: &AppConfig, instrument: &str) -> Self {
        Self {
            use_calibration: config.inference.use_calibration,
            stage2_threshold: config.alarm.alarm_threshold,
            clip: config.inference.clip_for(instrument),
        }
    }

    /// 캘리브레이션 적용 여부 설정.
    pub fn with_calibration(mut self, enabled: bool) -> Self {
        self.use_calibration = enabled;
        self
    }

    /// Stage 2 임계값 설정.
    pub fn with_stage2_threshold(mut self, threshold: f64) -> Self {
        self.stage2_threshold = threshold;
        self
    }

    /// 출력 한도 설정.
    pub fn with_clip(mut self, clip: ClipLimits) -> Self {
        self.clip = clip;
        self
    }
}

/// 2단계 이벤트 예측기.
#[derive(Debug, Clone, Default)]
pub struct EventPredictor {
    config: PredictorConfig,
}

impl EventPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// 하루치 피처 행으로 예측합니다.
    pub fn predict(&self, bundle: &TrainedModelBundle, row: &FeatureRow) -> MlResult<Prediction> {
        if row.instrument != bundle.instrument {
            return Err(MlError::InvalidInput(format!(
                "instrument mismatch: bundle={}, row={}",
                bundle.instrument, row.instrument
            )));
        }

        let x = row.dense(&bundle.feature_order);
        let raw_probability = bundle.classifier.predict_checked(&x)?;

        let (probability, calibrated) = match (&bundle.calibrator, self.config.use_calibration) {
            (Some(calibrator), true) => {
                let p = calibrator.transform(raw_probability);
                info!(
                    method = %calibrator.kind(),
                    raw = raw_probability,
                    calibrated = p,
                    "Calibration applied"
                );
                (p, true)
            }
            (None, true) => {
                warn!(instrument = %row.instrument, "Calibrator missing, using raw probability");
                (raw_probability, false)
            }
            (_, false) => (raw_probability, false),
        };

        let mut first_event_amount = None;
        let mut net_amount = None;
        let mut first_event_direction = 0i8;

        if probability >= self.config.stage2_threshold {
            match (&bundle.regressor_first, &bundle.regressor_net) {
                (Some(first_model), Some(net_model)) => {
                    let first = clip_amount(first_model.predict_checked(&x)?, self.config.clip.first);
                    let net = clip_amount(net_model.predict_checked(&x)?, self.config.clip.net);
                    first_event_direction = first.signum_i8();
                    first_event_amount = Some(first);
                    net_amount = Some(net);
                }
                _ => warn!(instrument = %row.instrument, "Stage 2 models missing, amounts unavailable"),
            }
        } else {
            debug!(
                probability,
                threshold = self.config.stage2_threshold,
                "Stage 2 not triggered"
            );
        }

        Ok(Prediction {
            instrument: row.instrument.clone(),
            run_date: row.date,
            raw_probability: round_f64(raw_probability, 6),
            probability: round_f64(probability, 6),
            calibrated,
            first_event_amount,
            first_event_direction,
            net_amount,
            model_version: bundle.version.clone(),
        })
    }
}

/// `[-limit, limit]`로 자른 뒤 소수점 6자리 Decimal로 변환합니다.
fn clip_amount(value: f64, limit: Decimal) -> Decimal {
    let amount = decimal_from_f64(round_f64(value, 6)).round_dp(6);
    let clipped = amount.clamp(-limit, limit);
    if clipped != amount {
        info!(raw = %amount, clipped = %clipped, "Stage 2 output clipped");
    }
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_clip_amount() {
        assert_eq!(clip_amount(3.7, dec!(2.50)), dec!(2.50));
        assert_eq!(clip_amount(-9.0, dec!(4.00)), dec!(-4.00));
        assert_eq!(clip_amount(0.123456789, dec!(1.5)), dec!(0.123457));
    }

    #[test]
    fn test_config_builder() {
        let config = PredictorConfig::new()
            .with_calibration(true)
            .with_stage2_threshold(0.4);
        assert!(config.use_calibration);
        assert_eq!(config.stage2_threshold, 0.4);
        assert_eq!(config.clip, ClipLimits::default());
    }

    #[test]
    fn test_from_app_config_uses_overrides() {
        let app = AppConfig::default();
        let config = PredictorConfig::from_app_config(&app, "lpg");
        assert!(!config.use_calibration);
        assert_eq!(config.clip.first, dec!(1.50));
        assert_eq!(config.stage2_threshold, 0.25);
    }
}
