//! 백테스트 시스템 End-to-end 통합 테스트.
//!
//! 1. 합성 피처/라벨 생성 (피처 하나가 이벤트를 결정)
//! 2. Walk-forward 백테스트 실행
//! 3. 폴드 상세, 예측 대 실제, 집계 지표 검증
//! 4. 여러 상품 실행 시 실패 격리 확인

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use pricecast_analytics::backtest::{render_markdown, BacktestEngine};
use pricecast_analytics::cv::PurgedWalkForwardCv;
use pricecast_analytics::labels::LabelGenerator;
use pricecast_core::{
    decimal_from_f64, BacktestConfig, CalibrationConfig, EventKind, EventLabel, FeatureRow,
    FeatureSource, GbdtParams, Instrument, LabelConfig, PipelineError, PipelineResult, PricePoint,
    PriceSource, TrainerConfig,
};

// ============================================================================
// 테스트 헬퍼 함수
// ============================================================================

fn day(offset: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(offset as i64)
}

/// 고정 시드 선형 합동 생성기로 `[-1, 1)` 값을 만듭니다.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

/// `signal > 0.3`이면 이벤트인 합성 데이터.
fn synthetic(instrument: &Instrument, n: usize) -> (Vec<FeatureRow>, Vec<EventLabel>) {
    let mut rng = Lcg(7);
    let mut features = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);

    for i in 0..n {
        let signal = rng.next();
        let noise = rng.next();
        features.push(
            FeatureRow::new(day(i), instrument.clone())
                .with_value("signal", signal)
                .with_value("noise", noise),
        );

        let event = signal > 0.3;
        let amount = if event {
            decimal_from_f64(0.15 + signal * 0.2).round_dp(2)
        } else {
            Decimal::ZERO
        };
        labels.push(EventLabel {
            run_date: day(i),
            instrument: instrument.clone(),
            binary_flag: u8::from(event),
            event_kind: if event { EventKind::Daily } else { EventKind::None },
            first_event_amount: amount,
            first_event_direction: if event { 1 } else { 0 },
            net_amount: amount,
            reference_price: dec!(58.00),
            window_end_date: day(i + 3),
        });
    }

    (features, labels)
}

fn small_params() -> GbdtParams {
    GbdtParams {
        n_estimators: 30,
        learning_rate: 0.1,
        max_depth: 3,
        num_leaves: 4,
        min_child_samples: 5,
        ..GbdtParams::default()
    }
}

fn engine() -> BacktestEngine {
    let trainer = TrainerConfig {
        stage1: small_params(),
        stage2: small_params(),
        ..TrainerConfig::default()
    };
    BacktestEngine::new(
        BacktestConfig::default(),
        trainer,
        CalibrationConfig::default(),
        PurgedWalkForwardCv::new(120, 30, 30, 4).unwrap(),
    )
    .unwrap()
}

// ============================================================================
// 단일 상품 백테스트
// ============================================================================

#[test]
fn test_backtest_on_learnable_signal() {
    let instrument = Instrument::new("benzin");
    let (features, labels) = synthetic(&instrument, 240);

    let report = engine().run_backtest(&instrument, &features, &labels);

    assert!(report.is_ok(), "unexpected error: {:?}", report.error);
    assert_eq!(report.n_folds, 4);
    assert_eq!(report.fold_details.len(), 4);

    let total_test: usize = report.fold_details.iter().map(|d| d.test_size).sum();
    assert_eq!(report.predictions.len(), total_test);

    for (i, detail) in report.fold_details.iter().enumerate() {
        assert_eq!(detail.fold, i + 1);
        assert_eq!(detail.train_size, 120 + 30 * i);
        assert!(detail.train_dates.starts_with(&day(0).to_string()));
        assert!(!detail.calibration_method.is_empty());
    }

    for p in &report.predictions {
        assert!((0.0..=1.0).contains(&p.y_prob));
        assert!(p.y_true <= 1 && p.y_pred <= 1);
    }
    assert!(report.predictions.windows(2).all(|w| w[0].date < w[1].date));

    // 신호 피처 하나로 완전히 분리되므로 순위 성능은 높아야 함
    assert!(report.stage1.auc.mean > 0.7, "auc = {}", report.stage1.auc.mean);
    assert!(report.stage1.auc.std >= 0.0);

    assert!(!report.stage2.skipped);
    assert!(report.stage2.n_folds_with_stage2 >= 1);
    assert!(report.stage2.n_positive_samples >= 1);

    let summary = report.summary();
    assert!(summary.starts_with("백테스트 결과 요약"));
    assert!(summary.contains("폴드 수: 4"));
}

#[test]
fn test_backtest_is_deterministic() {
    let instrument = Instrument::new("motorin");
    let (features, labels) = synthetic(&instrument, 200);

    let a = engine().run_backtest(&instrument, &features, &labels);
    let b = engine().run_backtest(&instrument, &features, &labels);

    assert_eq!(a.stage1, b.stage1);
    assert_eq!(a.predictions, b.predictions);
}

#[test]
fn test_backtest_skip_reasons() {
    let instrument = Instrument::new("lpg");
    let engine = engine();

    let (features, labels) = synthetic(&instrument, 100);
    let report = engine.run_backtest(&instrument, &features, &labels);
    assert_eq!(report.error.as_deref(), Some("insufficient_data_for_folds"));
    assert_eq!(report.n_folds, 0);

    // 라벨 날짜가 피처와 겹치지 않음
    let shifted: Vec<EventLabel> = labels
        .iter()
        .cloned()
        .map(|mut l| {
            l.run_date += Duration::days(1000);
            l
        })
        .collect();
    let report = engine.run_backtest(&instrument, &features, &shifted);
    assert_eq!(report.error.as_deref(), Some("alignment_failed"));

    let report = engine.run_backtest(&instrument, &[], &labels);
    assert_eq!(report.error.as_deref(), Some("no_data"));
    assert!(report.stage2.skipped);
}

#[test]
fn test_report_json_shape() {
    let instrument = Instrument::new("benzin");
    let (features, labels) = synthetic(&instrument, 200);
    let report = engine().run_backtest(&instrument, &features, &labels);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["instrument"], "benzin");
    assert!(json["stage1"]["auc"]["mean"].is_number());
    assert!(json["fold_details"][0]["stage1"]["ece"].is_number());
    assert!(json["fold_details"][0]["stage1"]["f1"].is_number());
    assert!(json.get("error").is_none());
}

// ============================================================================
// 다중 상품 백테스트
// ============================================================================

/// 완만하게 움직이는 가격 소스.
struct SteadyPrices;

#[async_trait]
impl PriceSource for SteadyPrices {
    async fn get_prices(
        &self,
        _instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<PricePoint>> {
        let mut points = Vec::new();
        let mut date = start;
        let mut i = 0i64;
        while date <= end {
            points.push(PricePoint::new(date, dec!(58.00) + Decimal::from(i % 5) * dec!(0.05)));
            date += Duration::days(1);
            i += 1;
        }
        Ok(points)
    }
}

/// `lpg`만 실패하는 피처 소스.
struct FlakyFeatures;

#[async_trait]
impl FeatureSource for FlakyFeatures {
    async fn get_features(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<FeatureRow>> {
        if instrument.as_str() == "lpg" {
            return Err(PipelineError::NotFound("lpg feature table".to_string()));
        }
        let mut rows = Vec::new();
        let mut date = start;
        while date <= end {
            rows.push(FeatureRow::new(date, instrument.clone()).with_value("x", 1.0));
            date += Duration::days(1);
        }
        Ok(rows)
    }
}

#[tokio::test]
async fn test_full_backtest_isolates_failures() {
    let instruments = vec![Instrument::new("benzin"), Instrument::new("lpg")];
    let generator = LabelGenerator::new(LabelConfig::default());

    let reports = engine()
        .run_full_backtest(
            &SteadyPrices,
            &FlakyFeatures,
            &generator,
            &instruments,
            day(0),
            day(59),
        )
        .await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].instrument, instruments[0]);
    assert_eq!(reports[0].error.as_deref(), Some("insufficient_data_for_folds"));

    assert_eq!(reports[1].instrument, instruments[1]);
    let message = reports[1].error.as_deref().unwrap();
    assert!(message.contains("lpg feature table"), "message = {message}");
    assert_eq!(reports[1].n_folds, 0);

    let markdown = render_markdown(&reports, day(60), |i| i.as_str().to_string());
    assert!(markdown.contains("## BENZIN"));
    assert!(markdown.contains("## LPG"));
    assert!(markdown.contains("lpg feature table"));
}
