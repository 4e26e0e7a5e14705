//! Walk-forward 백테스트 엔진
//!
//! 폴드마다 새 모델을 학습해 테스트 구간을 예측하고, 폴드 지표를 평균/표준편차로 묶습니다.
//!
//! # 폴드 흐름
//!
//! 1. 학습 구간으로 Stage 1 분류기 학습 (폴드 학습 구간의 `scale_pos_weight`)
//! 2. 학습 구간 끝 `max(25%, 10)` 행의 원시 확률로 캘리브레이터 선택
//! 3. 테스트 구간 확률 보정 (실패 시 원시 확률, 방법 `none`)
//! 4. `p ≥ 0.5` 판정으로 분류 지표와 ECE 계산
//! 5. 양성 샘플이 충분하면 Stage 2 회귀 두 개를 학습해 오차 계산
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! use pricecast_analytics::backtest::BacktestEngine;
//!
//! let engine = BacktestEngine::from_config(&app_config)?;
//! let report = engine.run_backtest(&instrument, &features, &labels);
//! println!("{}", report.summary());
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use pricecast_core::{
    pipeline_span, round_f64, AppConfig, BacktestConfig, CalibrationConfig, EventLabel,
    FeatureRow, FeatureSource, Instrument, PipelineError, PriceSource, TrainerConfig,
};

use crate::calibration::{evaluate_calibration, select_calibrator};
use crate::cv::{Fold, PurgedWalkForwardCv};
use crate::labels::LabelGenerator;
use crate::ml::dataset::as_targets;
use crate::ml::{scale_pos_weight, GbdtTrainer, MlError, SkipReason, TrainingSet};
use crate::performance::{
    directional_accuracy, mae, mean, positive_ratio, rmse, std_dev, ClassificationMetrics,
};

/// 백테스트 오류
#[derive(Debug, Error)]
pub enum BacktestError {
    /// 설정 오류
    #[error("백테스트 설정 오류: {0}")]
    ConfigError(String),

    /// 데이터 조회 오류
    #[error("데이터 오류: {0}")]
    DataError(#[from] PipelineError),

    /// 모델 학습 오류
    #[error("모델 학습 오류: {0}")]
    ModelError(#[from] MlError),
}

/// 백테스트 결과 타입
pub type BacktestResult<T> = Result<T, BacktestError>;

/// 폴드 Stage 1 지표.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FoldStage1 {
    #[serde(flatten)]
    pub metrics: ClassificationMetrics,
    pub ece: f64,
}

/// 폴드 Stage 2 지표.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FoldStage2 {
    pub mae_first_event: f64,
    pub rmse_first_event: f64,
    pub mae_net_amount: f64,
    pub rmse_net_amount: f64,
    pub directional_accuracy: f64,
    pub n_positive_train: usize,
    pub n_positive_test: usize,
}

/// 폴드 상세.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldDetail {
    /// 1부터 시작하는 폴드 번호
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    /// `"시작..끝"` 형식의 학습 구간
    pub train_dates: String,
    pub test_dates: String,
    pub pos_ratio_train: f64,
    pub pos_ratio_test: f64,
    /// 선택된 캘리브레이션 방법, 실패 시 `none`
    pub calibration_method: String,
    pub stage1: FoldStage1,
    pub stage2: Option<FoldStage2>,
}

/// 테스트 구간 하루의 예측과 실제값.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: NaiveDate,
    pub fold: usize,
    pub y_true: u8,
    pub y_prob: f64,
    pub y_pred: u8,
}

/// 평균과 모표준편차.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    fn of(values: &[f64], dp: i32) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            mean: round_f64(mean(values), dp),
            std: round_f64(std_dev(values), dp),
        }
    }
}

/// 폴드 간 Stage 1 집계.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage1Summary {
    pub auc: MetricSummary,
    pub f1: MetricSummary,
    pub precision: MetricSummary,
    pub recall: MetricSummary,
    pub accuracy: MetricSummary,
    pub ece: MetricSummary,
}

impl Stage1Summary {
    fn aggregate(folds: &[FoldDetail]) -> Self {
        let collect = |f: fn(&FoldStage1) -> f64| -> Vec<f64> {
            folds.iter().map(|d| f(&d.stage1)).collect()
        };
        Self {
            auc: MetricSummary::of(&collect(|s| s.metrics.auc), 4),
            f1: MetricSummary::of(&collect(|s| s.metrics.f1), 4),
            precision: MetricSummary::of(&collect(|s| s.metrics.precision), 4),
            recall: MetricSummary::of(&collect(|s| s.metrics.recall), 4),
            accuracy: MetricSummary::of(&collect(|s| s.metrics.accuracy), 4),
            ece: MetricSummary::of(&collect(|s| s.ece), 4),
        }
    }

    /// `(이름, 집계)` 목록. 리포트 표 순서와 같습니다.
    pub fn rows(&self) -> [(&'static str, MetricSummary); 6] {
        [
            ("AUC", self.auc),
            ("F1", self.f1),
            ("PRECISION", self.precision),
            ("RECALL", self.recall),
            ("ACCURACY", self.accuracy),
            ("ECE", self.ece),
        ]
    }
}

/// 폴드 간 Stage 2 집계.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage2Summary {
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    /// Stage 2를 실행한 폴드들의 테스트 양성 샘플 합
    pub n_positive_samples: usize,
    pub n_folds_with_stage2: usize,
    pub mae_first_event: MetricSummary,
    pub rmse_first_event: MetricSummary,
    pub mae_net_amount: MetricSummary,
    pub rmse_net_amount: MetricSummary,
    pub directional_accuracy: MetricSummary,
}

impl Stage2Summary {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: true,
            reason: Some(reason),
            ..Default::default()
        }
    }

    fn aggregate(folds: &[FoldDetail]) -> Self {
        let stage2: Vec<FoldStage2> = folds.iter().filter_map(|d| d.stage2).collect();
        if stage2.is_empty() {
            return Self::skipped(SkipReason::InsufficientPositiveSamples);
        }
        let collect = |f: fn(&FoldStage2) -> f64| -> Vec<f64> { stage2.iter().map(f).collect() };
        Self {
            skipped: false,
            reason: None,
            n_positive_samples: stage2.iter().map(|s| s.n_positive_test).sum(),
            n_folds_with_stage2: stage2.len(),
            mae_first_event: MetricSummary::of(&collect(|s| s.mae_first_event), 6),
            rmse_first_event: MetricSummary::of(&collect(|s| s.rmse_first_event), 6),
            mae_net_amount: MetricSummary::of(&collect(|s| s.mae_net_amount), 6),
            rmse_net_amount: MetricSummary::of(&collect(|s| s.rmse_net_amount), 6),
            directional_accuracy: MetricSummary::of(&collect(|s| s.directional_accuracy), 6),
        }
    }

    /// `(이름, 집계)` 목록. 리포트 표 순서와 같습니다.
    pub fn rows(&self) -> [(&'static str, MetricSummary); 5] {
        [
            ("mae_first_event", self.mae_first_event),
            ("rmse_first_event", self.rmse_first_event),
            ("mae_net_amount", self.mae_net_amount),
            ("rmse_net_amount", self.rmse_net_amount),
            ("directional_accuracy", self.directional_accuracy),
        ]
    }
}

/// 상품 하나의 백테스트 결과 리포트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub instrument: Instrument,
    pub n_folds: usize,
    pub stage1: Stage1Summary,
    pub stage2: Stage2Summary,
    pub fold_details: Vec<FoldDetail>,
    pub predictions: Vec<PredictionRecord>,
    /// 건너뛴 이유 또는 실패 메시지
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BacktestReport {
    /// 건너뛴 이유가 있는 빈 리포트.
    pub fn skipped(instrument: Instrument, reason: SkipReason) -> Self {
        Self {
            instrument,
            n_folds: 0,
            stage1: Stage1Summary::default(),
            stage2: Stage2Summary::skipped(reason),
            fold_details: Vec::new(),
            predictions: Vec::new(),
            error: Some(reason.to_string()),
        }
    }

    /// 실행 중 오류가 난 상품의 빈 리포트.
    pub fn failed(instrument: Instrument, message: impl Into<String>) -> Self {
        Self {
            stage2: Stage2Summary {
                skipped: true,
                ..Default::default()
            },
            error: Some(message.into()),
            ..Self::skipped(instrument, SkipReason::NoData)
        }
    }

    fn from_folds(
        instrument: Instrument,
        fold_details: Vec<FoldDetail>,
        predictions: Vec<PredictionRecord>,
    ) -> Self {
        if fold_details.is_empty() {
            return Self::skipped(instrument, SkipReason::NoValidFolds);
        }
        Self {
            instrument,
            n_folds: fold_details.len(),
            stage1: Stage1Summary::aggregate(&fold_details),
            stage2: Stage2Summary::aggregate(&fold_details),
            fold_details,
            predictions,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 요약 문자열 생성
    pub fn summary(&self) -> String {
        let period = match (self.predictions.first(), self.predictions.last()) {
            (Some(first), Some(last)) => format!("{} → {}", first.date, last.date),
            _ => "-".to_string(),
        };
        let stage2 = if self.stage2.skipped {
            format!(
                "Stage 2: 건너뜀 ({})\n",
                self.stage2.reason.map(|r| r.as_str()).unwrap_or("-")
            )
        } else {
            format!(
                "Stage 2 폴드: {} (양성 {})\n\
                 첫 이벤트 MAE: {:.6}\n\
                 순변동 MAE: {:.6}\n\
                 방향 정확도: {:.4}\n",
                self.stage2.n_folds_with_stage2,
                self.stage2.n_positive_samples,
                self.stage2.mae_first_event.mean,
                self.stage2.mae_net_amount.mean,
                self.stage2.directional_accuracy.mean,
            )
        };

        format!(
            "백테스트 결과 요약\n\
             ═══════════════════════════════════════\n\
             상품: {}\n\
             테스트 기간: {}\n\
             폴드 수: {}\n\
             예측 수: {}\n\
             ───────────────────────────────────────\n\
             AUC: {:.4} ± {:.4}\n\
             F1: {:.4} ± {:.4}\n\
             정밀도: {:.4} ± {:.4}\n\
             재현율: {:.4} ± {:.4}\n\
             정확도: {:.4} ± {:.4}\n\
             ECE: {:.4} ± {:.4}\n\
             ───────────────────────────────────────\n\
             {}\
             ═══════════════════════════════════════{}",
            self.instrument,
            period,
            self.n_folds,
            self.predictions.len(),
            self.stage1.auc.mean,
            self.stage1.auc.std,
            self.stage1.f1.mean,
            self.stage1.f1.std,
            self.stage1.precision.mean,
            self.stage1.precision.std,
            self.stage1.recall.mean,
            self.stage1.recall.std,
            self.stage1.accuracy.mean,
            self.stage1.accuracy.std,
            self.stage1.ece.mean,
            self.stage1.ece.std,
            stage2,
            self.error
                .as_ref()
                .map(|e| format!("\n오류: {e}"))
                .unwrap_or_default(),
        )
    }
}

/// Walk-forward 백테스트 엔진
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: BacktestConfig,
    trainer: TrainerConfig,
    calibration: CalibrationConfig,
    cv: PurgedWalkForwardCv,
}

impl BacktestEngine {
    /// 새 엔진 생성
    pub fn new(
        config: BacktestConfig,
        trainer: TrainerConfig,
        calibration: CalibrationConfig,
        cv: PurgedWalkForwardCv,
    ) -> BacktestResult<Self> {
        if !(config.calibration_fraction > 0.0 && config.calibration_fraction < 1.0) {
            return Err(BacktestError::ConfigError(format!(
                "calibration_fraction must be in (0, 1): {}",
                config.calibration_fraction
            )));
        }
        if !(config.decision_threshold > 0.0 && config.decision_threshold < 1.0) {
            return Err(BacktestError::ConfigError(format!(
                "decision_threshold must be in (0, 1): {}",
                config.decision_threshold
            )));
        }
        Ok(Self {
            config,
            trainer,
            calibration,
            cv,
        })
    }

    /// 애플리케이션 설정으로 엔진 생성
    pub fn from_config(config: &AppConfig) -> BacktestResult<Self> {
        let cv = PurgedWalkForwardCv::from_config(&config.cv)
            .map_err(|e| BacktestError::ConfigError(e.to_string()))?;
        Self::new(
            config.backtest.clone(),
            config.trainer.clone(),
            config.calibration.clone(),
            cv,
        )
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn cv(&self) -> &PurgedWalkForwardCv {
        &self.cv
    }

    /// 미리 계산된 피처/라벨로 한 상품의 백테스트를 실행합니다.
    ///
    /// 데이터 부족은 오류 대신 `error`에 이유가 담긴 빈 리포트로 돌아옵니다.
    pub fn run_backtest(
        &self,
        instrument: &Instrument,
        features: &[FeatureRow],
        labels: &[EventLabel],
    ) -> BacktestReport {
        let _span = pipeline_span!("backtest", instrument).entered();

        if features.is_empty() || labels.is_empty() {
            warn!(
                features = features.len(),
                labels = labels.len(),
                "No data for backtest"
            );
            return BacktestReport::skipped(instrument.clone(), SkipReason::NoData);
        }

        let data = match TrainingSet::align(features, labels, None) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Feature/label alignment failed");
                return BacktestReport::skipped(instrument.clone(), SkipReason::AlignmentFailed);
            }
        };

        let folds = self.cv.split(data.len());
        if folds.is_empty() {
            warn!(
                samples = data.len(),
                required = self.cv.min_required(),
                "Not enough data to build folds"
            );
            return BacktestReport::skipped(
                instrument.clone(),
                SkipReason::InsufficientDataForFolds,
            );
        }
        info!(samples = data.len(), folds = folds.len(), "Backtest started");

        let mut fold_details = Vec::with_capacity(folds.len());
        let mut predictions = Vec::new();

        for (i, fold) in folds.iter().enumerate() {
            let fold_no = i + 1;
            let _fold_span = pipeline_span!("backtest_fold", instrument, fold_no).entered();

            match self.run_fold(&data, fold, fold_no) {
                Ok((detail, records)) => {
                    info!(
                        auc = detail.stage1.metrics.auc,
                        f1 = detail.stage1.metrics.f1,
                        precision = detail.stage1.metrics.precision,
                        recall = detail.stage1.metrics.recall,
                        ece = detail.stage1.ece,
                        calibration = %detail.calibration_method,
                        stage2 = if detail.stage2.is_some() { "OK" } else { "SKIP" },
                        "Fold complete"
                    );
                    fold_details.push(detail);
                    predictions.extend(records);
                }
                Err(e) => warn!(error = %e, "Fold failed, skipping"),
            }
        }

        let report = BacktestReport::from_folds(instrument.clone(), fold_details, predictions);
        info!(
            n_folds = report.n_folds,
            auc_mean = report.stage1.auc.mean,
            stage2 = !report.stage2.skipped,
            "Backtest complete"
        );
        report
    }

    /// 폴드 하나를 학습/평가합니다.
    fn run_fold(
        &self,
        data: &TrainingSet,
        fold: &Fold,
        fold_no: usize,
    ) -> BacktestResult<(FoldDetail, Vec<PredictionRecord>)> {
        if fold.train.is_empty() || fold.test.is_empty() {
            return Err(BacktestError::DataError(PipelineError::insufficient(
                "fold",
                1,
                0,
            )));
        }

        let y: Vec<u8> = data.y_binary();
        let x_train = &data.features[fold.train.clone()];
        let y_train = &y[fold.train.clone()];
        let x_test = &data.features[fold.test.clone()];
        let y_test = &y[fold.test.clone()];

        // Stage 1
        let spw = scale_pos_weight(y_train);
        let classifier = GbdtTrainer::classifier(self.trainer.stage1.clone())
            .with_scale_pos_weight(spw)
            .fit(x_train, &as_targets(y_train))?;
        let raw_test = classifier.predict_batch(x_test);

        // 학습 구간 끝부분으로 캘리브레이션
        let n_train = x_train.len();
        let tail = self.calibration_rows(n_train);
        let tail_start = n_train - tail;
        let raw_tail = classifier.predict_batch(&x_train[tail_start..]);

        let (probs, calibration_method) = match select_calibrator(
            &raw_tail,
            &y_train[tail_start..],
            &raw_test,
            y_test,
            &self.calibration,
        ) {
            Ok(selection) => (
                selection.calibrator.transform_all(&raw_test),
                selection.summary.selected_method.as_str().to_string(),
            ),
            Err(e) => {
                warn!(error = %e, "Calibration failed, using raw probabilities");
                (raw_test.clone(), "none".to_string())
            }
        };

        let threshold = self.config.decision_threshold;
        let y_pred: Vec<u8> = probs.iter().map(|p| u8::from(*p >= threshold)).collect();
        let stage1 = FoldStage1 {
            metrics: ClassificationMetrics::compute(y_test, &probs, threshold),
            ece: round_f64(
                evaluate_calibration(&probs, y_test, self.calibration.n_bins).ece,
                6,
            ),
        };

        let stage2 = self.run_stage2(data, fold);

        let dates = &data.dates;
        let detail = FoldDetail {
            fold: fold_no,
            train_size: x_train.len(),
            test_size: x_test.len(),
            train_dates: format!("{}..{}", dates[fold.train.start], dates[fold.train.end - 1]),
            test_dates: format!("{}..{}", dates[fold.test.start], dates[fold.test.end - 1]),
            pos_ratio_train: round_f64(positive_ratio(y_train), 4),
            pos_ratio_test: round_f64(positive_ratio(y_test), 4),
            calibration_method,
            stage1,
            stage2,
        };

        let records = fold
            .test
            .clone()
            .zip(probs.iter().zip(&y_pred))
            .map(|(idx, (p, pred))| PredictionRecord {
                date: dates[idx],
                fold: fold_no,
                y_true: y[idx],
                y_prob: round_f64(*p, 4),
                y_pred: *pred,
            })
            .collect();

        Ok((detail, records))
    }

    /// Stage 2 평가. 양성 샘플이 부족하거나 학습이 실패하면 `None`.
    fn run_stage2(&self, data: &TrainingSet, fold: &Fold) -> Option<FoldStage2> {
        let positive = |idx: &usize| data.labels[*idx].binary_flag == 1;
        let train_pos: Vec<usize> = fold.train.clone().filter(positive).collect();
        let test_pos: Vec<usize> = fold.test.clone().filter(positive).collect();

        if train_pos.len() < self.config.stage2_min_train_positives
            || test_pos.len() < self.config.stage2_min_test_positives
        {
            return None;
        }

        match self.fit_stage2(&data.subset(&train_pos), &data.subset(&test_pos)) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, "Stage 2 failed");
                None
            }
        }
    }

    fn fit_stage2(&self, train: &TrainingSet, test: &TrainingSet) -> BacktestResult<FoldStage2> {
        let regressor = GbdtTrainer::regressor(self.trainer.stage2.clone());
        let first_model = regressor.fit(&train.features, &train.first_amounts())?;
        let net_model = regressor.fit(&train.features, &train.net_amounts())?;

        let pred_first = first_model.predict_batch(&test.features);
        let pred_net = net_model.predict_batch(&test.features);
        let true_first = test.first_amounts();
        let true_net = test.net_amounts();

        Ok(FoldStage2 {
            mae_first_event: round_f64(mae(&true_first, &pred_first), 6),
            rmse_first_event: round_f64(rmse(&true_first, &pred_first), 6),
            mae_net_amount: round_f64(mae(&true_net, &pred_net), 6),
            rmse_net_amount: round_f64(rmse(&true_net, &pred_net), 6),
            directional_accuracy: round_f64(directional_accuracy(&true_net, &pred_net), 4),
            n_positive_train: train.len(),
            n_positive_test: test.len(),
        })
    }

    /// 캘리브레이션 구간 행 수: `max(⌊n·fraction⌋, min_rows)`, 최대 `n`.
    fn calibration_rows(&self, n_train: usize) -> usize {
        let by_fraction = (n_train as f64 * self.config.calibration_fraction) as usize;
        by_fraction.max(self.config.min_calibration_rows).min(n_train)
    }

    /// 데이터 소스에서 피처와 라벨을 가져와 여러 상품을 차례로 백테스트합니다.
    ///
    /// 한 상품의 실패는 그 상품의 리포트에만 기록되고 나머지는 계속 진행됩니다.
    pub async fn run_full_backtest<P, F>(
        &self,
        prices: &P,
        features: &F,
        labels: &LabelGenerator,
        instruments: &[Instrument],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<BacktestReport>
    where
        P: PriceSource + ?Sized,
        F: FeatureSource + ?Sized,
    {
        let mut reports = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            info!(instrument = %instrument, %start, %end, "=== Backtest started ===");
            let report = match self
                .fetch_and_run(prices, features, labels, instrument, start, end)
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    error!(instrument = %instrument, error = %e, "Backtest failed");
                    BacktestReport::failed(instrument.clone(), e.to_string())
                }
            };
            reports.push(report);
        }
        reports
    }

    async fn fetch_and_run<P, F>(
        &self,
        prices: &P,
        features: &F,
        labels: &LabelGenerator,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BacktestResult<BacktestReport>
    where
        P: PriceSource + ?Sized,
        F: FeatureSource + ?Sized,
    {
        let rows = features.get_features(instrument, start, end).await?;
        let event_labels = labels.generate_labels(prices, instrument, start, end).await?;
        Ok(self.run_backtest(instrument, &rows, &event_labels))
    }
}
