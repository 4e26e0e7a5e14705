//! 2단계 모델 학습.
//!
//! - Stage 1: 이벤트 발생 여부 이진 분류기. `scale_pos_weight = n_neg / n_pos`로
//!   클래스 불균형을 보정합니다.
//! - Stage 2: 양성 행만으로 학습하는 두 개의 회귀 모델(첫 이벤트 금액, 순변동 금액).
//!   양성 샘플이 부족하면 에러 없이 건너뜁니다.
//!
//! 모든 분할은 시간 순서를 따르며 행을 섞지 않습니다. 폴드별 지표를 계산한 뒤
//! 배포용 모델은 전체 데이터로 다시 학습합니다.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use pricecast_core::{
    pipeline_span, round_f64, AppConfig, CalibrationConfig, EventLabel, FeatureRow, Instrument,
    PipelineResult, TrainerConfig,
};

use super::bundle::TrainedModelBundle;
use super::dataset::{as_targets, scale_pos_weight, TrainingSet};
use super::gbdt::{GbdtModel, GbdtTrainer};
use super::SkipReason;
use crate::calibration::{select_calibrator, CalibrationSummary, Calibrator};
use crate::cv::PurgedWalkForwardCv;
use crate::performance::metrics::{mae, mean, positive_ratio, rmse, ClassificationMetrics};

/// Stage 1 이진 판정 임계값.
const DECISION_THRESHOLD: f64 = 0.5;

/// Stage 1 폴드 지표.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1FoldMetrics {
    /// 1부터 시작
    pub fold: usize,
    #[serde(flatten)]
    pub metrics: ClassificationMetrics,
    pub train_size: usize,
    pub test_size: usize,
    pub pos_ratio_train: f64,
    pub pos_ratio_test: f64,
}

/// Stage 1 CV 요약. 평균은 소수점 4자리.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage1Metrics {
    pub n_folds: usize,
    pub folds: Vec<Stage1FoldMetrics>,
    pub mean_auc: f64,
    pub mean_f1: f64,
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub mean_accuracy: f64,
    pub scale_pos_weight: f64,
}

impl Stage1Metrics {
    fn aggregate(folds: Vec<Stage1FoldMetrics>, scale_pos_weight: f64) -> Self {
        let avg = |f: fn(&ClassificationMetrics) -> f64| {
            let values: Vec<f64> = folds.iter().map(|m| f(&m.metrics)).collect();
            round_f64(mean(&values), 4)
        };
        Self {
            n_folds: folds.len(),
            mean_auc: avg(|m| m.auc),
            mean_f1: avg(|m| m.f1),
            mean_precision: avg(|m| m.precision),
            mean_recall: avg(|m| m.recall),
            mean_accuracy: avg(|m| m.accuracy),
            scale_pos_weight,
            folds,
        }
    }
}

/// 회귀 폴드 지표. 소수점 6자리.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionFoldMetrics {
    pub fold: usize,
    pub rmse: f64,
    pub mae: f64,
    pub train_size: usize,
    pub test_size: usize,
}

/// 회귀 타깃별 CV 요약.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionSummary {
    pub n_folds: usize,
    pub folds: Vec<RegressionFoldMetrics>,
    pub mean_rmse: f64,
    pub mean_mae: f64,
}

impl RegressionSummary {
    fn aggregate(folds: Vec<RegressionFoldMetrics>) -> Self {
        let rmses: Vec<f64> = folds.iter().map(|f| f.rmse).collect();
        let maes: Vec<f64> = folds.iter().map(|f| f.mae).collect();
        Self {
            n_folds: folds.len(),
            mean_rmse: round_f64(mean(&rmses), 6),
            mean_mae: round_f64(mean(&maes), 6),
            folds,
        }
    }
}

/// Stage 2 결과. 건너뛴 경우 `skipped`와 `reason`이 채워집니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage2Metrics {
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    pub n_positive: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_event: Option<RegressionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<RegressionSummary>,
}

impl Stage2Metrics {
    pub fn skipped(reason: SkipReason, n_positive: usize) -> Self {
        Self {
            skipped: true,
            reason: Some(reason),
            n_positive,
            ..Default::default()
        }
    }
}

/// 배포용 캘리브레이터 적합 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCalibration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CalibrationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<SkipReason>,
    pub oof_samples: usize,
}

/// 전체 학습 지표.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub n_samples: usize,
    pub n_positive: usize,
    pub stage1: Stage1Metrics,
    pub stage2: Stage2Metrics,
    pub calibration: DeploymentCalibration,
}

/// 폴드 하나의 out-of-fold 예측.
#[derive(Debug, Clone)]
struct OofBatch {
    probs: Vec<f64>,
    labels: Vec<u8>,
}

/// 2단계 학습기.
#[derive(Debug, Clone, Default)]
pub struct TwoStageTrainer {
    config: TrainerConfig,
    calibration: CalibrationConfig,
}

impl TwoStageTrainer {
    pub fn new(config: TrainerConfig, calibration: CalibrationConfig) -> Self {
        Self {
            config,
            calibration,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.trainer.clone(), config.calibration.clone())
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// 피처와 라벨을 정렬한 뒤 두 단계를 학습합니다.
    pub fn train(
        &self,
        instrument: &Instrument,
        features: &[FeatureRow],
        labels: &[EventLabel],
        cv: &PurgedWalkForwardCv,
    ) -> PipelineResult<(TrainedModelBundle, TrainingMetrics)> {
        let data = TrainingSet::align(features, labels, None)?;
        self.train_aligned(instrument, &data, cv)
    }

    /// 이미 정렬된 데이터로 학습합니다.
    pub fn train_aligned(
        &self,
        instrument: &Instrument,
        data: &TrainingSet,
        cv: &PurgedWalkForwardCv,
    ) -> PipelineResult<(TrainedModelBundle, TrainingMetrics)> {
        let _span = pipeline_span!("train", instrument).entered();
        info!(rows = data.len(), cv = %cv, "Training two-stage model");

        let (classifier, stage1, oof) = self.train_stage1(data, cv)?;
        let (regressors, stage2) = self.train_stage2(data, cv)?;
        let (calibrator, calibration) = self.fit_deployment_calibrator(&oof)?;

        let metrics = TrainingMetrics {
            n_samples: data.len(),
            n_positive: data.n_positive(),
            stage1,
            stage2,
            calibration,
        };

        let trained_at = Utc::now();
        let version = self
            .config
            .model_version
            .clone()
            .unwrap_or_else(|| TrainedModelBundle::default_version(trained_at));
        let (regressor_first, regressor_net) = match regressors {
            Some((first, net)) => (Some(first), Some(net)),
            None => (None, None),
        };

        let bundle = TrainedModelBundle {
            instrument: instrument.clone(),
            version,
            classifier,
            regressor_first,
            regressor_net,
            calibrator,
            feature_order: data.feature_order.clone(),
            metrics: metrics.clone(),
            trained_at,
        };

        info!(
            version = %bundle.version,
            mean_auc = metrics.stage1.mean_auc,
            stage2 = !metrics.stage2.skipped,
            calibrated = bundle.calibrator.is_some(),
            "Training complete"
        );
        Ok((bundle, metrics))
    }

    /// Stage 1: 폴드별 지표, OOF 확률, 전체 데이터 재학습 모델.
    fn train_stage1(
        &self,
        data: &TrainingSet,
        cv: &PurgedWalkForwardCv,
    ) -> PipelineResult<(GbdtModel, Stage1Metrics, Vec<OofBatch>)> {
        let y = data.y_binary();
        let spw = scale_pos_weight(&y);
        info!(
            samples = y.len(),
            positives = data.n_positive(),
            scale_pos_weight = spw,
            "Stage 1 data"
        );

        let trainer = GbdtTrainer::classifier(self.config.stage1.clone()).with_scale_pos_weight(spw);
        let mut folds = Vec::new();
        let mut oof = Vec::new();

        for (i, fold) in cv.split(data.len()).iter().enumerate() {
            if fold.train.is_empty() || fold.test.is_empty() {
                warn!(fold = i + 1, "Empty train/test split, skipping fold");
                continue;
            }

            let x_train = &data.features[fold.train.clone()];
            let y_train = &y[fold.train.clone()];
            let x_test = &data.features[fold.test.clone()];
            let y_test = &y[fold.test.clone()];

            let model = trainer.fit(x_train, &as_targets(y_train))?;
            let probs = model.predict_batch(x_test);
            let metrics = ClassificationMetrics::compute(y_test, &probs, DECISION_THRESHOLD);

            info!(
                fold = i + 1,
                auc = metrics.auc,
                f1 = metrics.f1,
                precision = metrics.precision,
                recall = metrics.recall,
                train = x_train.len(),
                test = x_test.len(),
                "Stage 1 fold"
            );

            folds.push(Stage1FoldMetrics {
                fold: i + 1,
                metrics,
                train_size: x_train.len(),
                test_size: x_test.len(),
                pos_ratio_train: round_f64(positive_ratio(y_train), 4),
                pos_ratio_test: round_f64(positive_ratio(y_test), 4),
            });
            oof.push(OofBatch {
                probs,
                labels: y_test.to_vec(),
            });
        }

        let metrics = Stage1Metrics::aggregate(folds, spw);
        info!(
            n_folds = metrics.n_folds,
            mean_auc = metrics.mean_auc,
            mean_f1 = metrics.mean_f1,
            mean_precision = metrics.mean_precision,
            "Stage 1 CV complete"
        );

        let final_model = trainer.fit(&data.features, &as_targets(&y))?;
        Ok((final_model, metrics, oof))
    }

    /// Stage 2: 양성 행의 날짜 위에서 다시 폴드를 나눠 두 회귀 모델을 평가/학습합니다.
    fn train_stage2(
        &self,
        data: &TrainingSet,
        cv: &PurgedWalkForwardCv,
    ) -> PipelineResult<(Option<(GbdtModel, GbdtModel)>, Stage2Metrics)> {
        let positives = data.positives();
        let n_positive = positives.len();

        if data.is_empty() {
            return Ok((None, Stage2Metrics::skipped(SkipReason::NoData, 0)));
        }
        if n_positive < self.config.min_stage2_positives {
            warn!(
                n_positive,
                required = self.config.min_stage2_positives,
                "Stage 2 skipped: insufficient positive samples"
            );
            return Ok((
                None,
                Stage2Metrics::skipped(SkipReason::InsufficientPositiveSamples, n_positive),
            ));
        }

        let y_first = positives.first_amounts();
        let y_net = positives.net_amounts();
        let trainer = GbdtTrainer::regressor(self.config.stage2.clone());

        let mut first_folds = Vec::new();
        let mut net_folds = Vec::new();

        for (i, fold) in cv.split(n_positive).iter().enumerate() {
            if fold.train.len() < self.config.min_stage2_fold_rows || fold.test.is_empty() {
                warn!(fold = i + 1, train = fold.train.len(), "Stage 2 fold skipped");
                continue;
            }

            let x_train = &positives.features[fold.train.clone()];
            let x_test = &positives.features[fold.test.clone()];

            for (target, out) in [(&y_first, &mut first_folds), (&y_net, &mut net_folds)] {
                let model = trainer.fit(x_train, &target[fold.train.clone()])?;
                let predicted = model.predict_batch(x_test);
                let actual = &target[fold.test.clone()];
                out.push(RegressionFoldMetrics {
                    fold: i + 1,
                    rmse: round_f64(rmse(actual, &predicted), 6),
                    mae: round_f64(mae(actual, &predicted), 6),
                    train_size: x_train.len(),
                    test_size: x_test.len(),
                });
            }
        }

        let first_summary = RegressionSummary::aggregate(first_folds);
        let net_summary = RegressionSummary::aggregate(net_folds);
        info!(
            n_positive,
            n_folds = first_summary.n_folds,
            first_rmse = first_summary.mean_rmse,
            net_rmse = net_summary.mean_rmse,
            "Stage 2 CV complete"
        );

        let final_first = trainer.fit(&positives.features, &y_first)?;
        let final_net = trainer.fit(&positives.features, &y_net)?;

        Ok((
            Some((final_first, final_net)),
            Stage2Metrics {
                skipped: false,
                reason: None,
                n_positive,
                first_event: Some(first_summary),
                net_amount: Some(net_summary),
            },
        ))
    }

    /// 마지막 폴드를 제외한 OOF 확률로 적합하고 마지막 폴드로 검증합니다.
    fn fit_deployment_calibrator(
        &self,
        oof: &[OofBatch],
    ) -> PipelineResult<(Option<Calibrator>, DeploymentCalibration)> {
        let oof_samples = oof.iter().map(|b| b.probs.len()).sum();
        let Some((validation, fitting)) = oof.split_last().filter(|(_, rest)| !rest.is_empty()) else {
            warn!(folds = oof.len(), "Deployment calibration skipped: need at least two folds");
            return Ok((
                None,
                DeploymentCalibration {
                    summary: None,
                    skipped_reason: Some(SkipReason::InsufficientCalibrationFolds),
                    oof_samples,
                },
            ));
        };

        let fit_probs: Vec<f64> = fitting.iter().flat_map(|b| b.probs.iter().copied()).collect();
        let fit_labels: Vec<u8> = fitting.iter().flat_map(|b| b.labels.iter().copied()).collect();

        let selection = select_calibrator(
            &fit_probs,
            &fit_labels,
            &validation.probs,
            &validation.labels,
            &self.calibration,
        )?;

        Ok((
            Some(selection.calibrator),
            DeploymentCalibration {
                summary: Some(selection.summary),
                skipped_reason: None,
                oof_samples,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage2_skip_shape() {
        let m = Stage2Metrics::skipped(SkipReason::InsufficientPositiveSamples, 7);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["skipped"], true);
        assert_eq!(json["reason"], "insufficient_positive_samples");
        assert_eq!(json["n_positive"], 7);
        assert!(json.get("first_event").is_none());
    }

    #[test]
    fn test_stage1_aggregate_rounding() {
        let fold = |auc: f64| Stage1FoldMetrics {
            fold: 1,
            metrics: ClassificationMetrics {
                auc,
                ..Default::default()
            },
            train_size: 10,
            test_size: 5,
            pos_ratio_train: 0.1,
            pos_ratio_test: 0.2,
        };
        let m = Stage1Metrics::aggregate(vec![fold(0.7), fold(0.8), fold(0.8)], 3.0);
        assert_eq!(m.n_folds, 3);
        assert_eq!(m.mean_auc, 0.7667);
        assert_eq!(m.scale_pos_weight, 3.0);
    }
}
