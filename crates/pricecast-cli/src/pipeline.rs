//! 파이프라인 오케스트레이션.
//!
//! 데이터 소스, 모델 저장소, 레코드 저장소, 모델 캐시를 묶어 CLI 명령이 쓰는
//! 단위 작업(라벨 생성, 학습, 백테스트, 일일 예측)을 제공합니다.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use pricecast_analytics::backtest::{render_markdown, BacktestEngine, BacktestReport};
use pricecast_analytics::cv::{FoldInfo, PurgedWalkForwardCv};
use pricecast_analytics::labels::LabelGenerator;
use pricecast_analytics::ml::{
    EventPredictor, PredictorConfig, TrainedModelBundle, TrainingMetrics, TwoStageTrainer,
};
use pricecast_core::{
    AlarmDecision, AppConfig, DecisionRecord, EventLabel, FeatureRow, FeatureSource, Instrument,
    PipelineError, PipelineResult, Prediction, PricePoint, PriceSource, RiskTrend,
};
use pricecast_data::{
    save_bundle, CacheKey, CsvFeatureSource, CsvPriceSource, DataError, FileModelStore,
    JsonFileRecordStore, ModelCache, ModelKey, ModelStore, RecordStore,
};
use pricecast_notification::{AlarmContext, AlarmEngine};

/// 가격 변경 판단 시 조회하는 과거 일수.
const PRICE_LOOKBACK_DAYS: i64 = 10;

/// 이 값보다 크게 달라야 가격 변경으로 봅니다.
fn price_change_epsilon() -> Decimal {
    Decimal::new(1, 3)
}

/// `date`에 관측된 가격이 직전 관측과 다른지 여부.
pub fn price_changed_on(points: &[PricePoint], date: NaiveDate) -> bool {
    let mut relevant: Vec<&PricePoint> = points.iter().filter(|p| p.date <= date).collect();
    relevant.sort_by_key(|p| p.date);
    match relevant.as_slice() {
        [.., prev, last] => {
            last.date == date && (last.price - prev.price).abs() > price_change_epsilon()
        }
        _ => false,
    }
}

/// 학습 실행 결과.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub key: ModelKey,
    pub metrics: TrainingMetrics,
}

/// 하루치 예측과 알람 결정.
#[derive(Debug, Clone, Serialize)]
pub struct DailyOutcome {
    pub instrument: Instrument,
    pub run_date: NaiveDate,
    pub prediction: Option<Prediction>,
    pub risk_trend: RiskTrend,
    pub decision: AlarmDecision,
    /// 예측 실패 사유 (알람은 억제됨)
    pub error: Option<String>,
}

impl DailyOutcome {
    /// 사람이 읽는 요약.
    pub fn summary(&self, display_name: &str) -> String {
        let mut lines = vec![format!("[{}] {} ({})", self.run_date, display_name, self.instrument)];

        match &self.prediction {
            Some(p) => {
                lines.push(format!(
                    "  확률: {:.4} (raw {:.4}{})",
                    p.probability,
                    p.raw_probability,
                    if p.calibrated { ", 보정됨" } else { "" }
                ));
                let fmt_amount =
                    |v: Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
                lines.push(format!(
                    "  첫 이벤트: {} (방향 {}), 순변동: {}",
                    fmt_amount(p.first_event_amount),
                    p.first_event_direction,
                    fmt_amount(p.net_amount)
                ));
                lines.push(format!("  모델 버전: {}", p.model_version));
            }
            None => lines.push("  예측 없음".to_string()),
        }

        lines.push(format!("  리스크 추세: {}", self.risk_trend));
        let d = &self.decision;
        if d.should_alert {
            lines.push(format!(
                "  알람: {} (신뢰도 {:.2})",
                d.alarm_kind.map(|k| k.as_str()).unwrap_or("-"),
                d.confidence
            ));
            if let Some(message) = &d.message {
                lines.push(format!("  {message}"));
            }
            if !d.deterministic_rules.is_empty() {
                lines.push(format!("  규칙: {}", d.deterministic_rules.join(", ")));
            }
        } else if d.cooldown_active {
            lines.push(format!("  알람 없음 (쿨다운 {:.1}시간 남음)", d.cooldown_remaining_hours));
        } else {
            lines.push("  알람 없음".to_string());
        }

        if let Some(error) = &self.error {
            lines.push(format!("  오류: {error}"));
        }
        lines.join("\n")
    }
}

/// 파이프라인 협력 객체 묶음.
pub struct Pipeline {
    config: AppConfig,
    prices: Arc<dyn PriceSource>,
    features: Arc<dyn FeatureSource>,
    models: Arc<dyn ModelStore>,
    records: Arc<dyn RecordStore>,
    cache: ModelCache<TrainedModelBundle>,
    labels: LabelGenerator,
    alarm: AlarmEngine,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        prices: Arc<dyn PriceSource>,
        features: Arc<dyn FeatureSource>,
        models: Arc<dyn ModelStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            labels: LabelGenerator::new(config.labels.clone()),
            alarm: AlarmEngine::from_config(&config),
            cache: ModelCache::new(),
            config,
            prices,
            features,
            models,
            records,
        }
    }

    /// `[storage]` 설정의 CSV 파일과 디렉토리로 파이프라인을 구성합니다.
    pub fn from_storage(config: AppConfig) -> PipelineResult<Self> {
        let storage = config.storage.clone();
        let prices = CsvPriceSource::from_path(&storage.price_csv)?;
        let features = CsvFeatureSource::from_path(&storage.feature_csv)?;

        Ok(Self::new(
            config,
            Arc::new(prices),
            Arc::new(features),
            Arc::new(FileModelStore::new(&storage.model_dir)),
            Arc::new(JsonFileRecordStore::new(&storage.record_dir)),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache<TrainedModelBundle> {
        &self.cache
    }

    /// 지정한 상품 하나, 또는 설정된 전체 상품.
    pub fn instruments(&self, only: Option<&str>) -> Vec<Instrument> {
        match only {
            Some(code) => vec![Instrument::new(code)],
            None => self
                .config
                .instruments
                .iter()
                .map(|i| Instrument::new(&i.code))
                .collect(),
        }
    }

    pub fn display_name(&self, instrument: &Instrument) -> String {
        self.config.display_name(instrument.as_str())
    }

    /// 라벨을 생성하고 레코드 저장소에 업서트합니다.
    pub async fn generate_labels(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<EventLabel>> {
        let labels = self
            .labels
            .generate_labels(&*self.prices, instrument, start, end)
            .await?;
        let written = self.records.upsert_labels(&labels).await?;
        info!(instrument = %instrument, labels = labels.len(), written, "Labels stored");
        Ok(labels)
    }

    /// 피처 날짜에 대한 폴드 구성을 계산합니다.
    pub async fn fold_plan(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<FoldInfo>> {
        let cv = PurgedWalkForwardCv::from_config(&self.config.cv)?;
        let rows = self.features.get_features(instrument, start, end).await?;
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        Ok(cv.fold_info(&dates))
    }

    /// 두 단계 모델을 학습하고 번들을 저장합니다.
    ///
    /// 저장 후 상품의 캐시 항목을 모두 비우므로 다음 예측은 새 번들을 읽습니다.
    pub async fn train(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<TrainingOutcome> {
        let cv = PurgedWalkForwardCv::from_config(&self.config.cv)?;
        let features = self.features.get_features(instrument, start, end).await?;
        let labels = self.generate_labels(instrument, start, end).await?;

        let trainer = TwoStageTrainer::from_config(&self.config);
        let (bundle, metrics) = trainer.train(instrument, &features, &labels, &cv)?;

        let key = ModelKey::new(instrument.clone(), bundle.version.clone());
        save_bundle(&*self.models, &key, &bundle).await?;
        let evicted = self.cache.evict_instrument(instrument).await;
        info!(key = %key, evicted, "Model bundle saved");

        Ok(TrainingOutcome { key, metrics })
    }

    /// 상품의 최신 번들을 캐시를 통해 로드합니다.
    pub async fn load_model(
        &self,
        instrument: &Instrument,
        force_reload: bool,
    ) -> PipelineResult<Arc<TrainedModelBundle>> {
        let models = Arc::clone(&self.models);
        let bundle = self
            .cache
            .get_or_load(CacheKey::latest(instrument), force_reload, || async move {
                let (key, payload) = models.load_latest(instrument).await?;
                debug!(key = %key, "Loading model bundle");
                let bundle: TrainedModelBundle = serde_json::from_value(payload)?;
                Ok::<_, DataError>(bundle)
            })
            .await?;
        Ok(bundle)
    }

    /// 하루치 예측과 알람 결정을 수행합니다.
    ///
    /// 예측 단계의 실패는 알람 없음 결정으로 처리되고 `error`에 남습니다.
    /// 알람 상태나 결정 기록 저장 실패는 그대로 전파됩니다.
    pub async fn predict(
        &self,
        instrument: &Instrument,
        run_date: NaiveDate,
        now: DateTime<Utc>,
        force_reload: bool,
    ) -> PipelineResult<DailyOutcome> {
        let window = self.config.alarm.risk_trend_window.max(1) as i64;
        let rows = self
            .features
            .get_features(instrument, run_date - Duration::days(window - 1), run_date)
            .await;

        let (today, risk_history) = match &rows {
            Ok(rows) => (
                rows.iter().find(|r| r.date == run_date).cloned(),
                self.risk_history(rows),
            ),
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Feature fetch failed");
                (None, Vec::new())
            }
        };
        let risk_trend = self.alarm.risk_trend(&risk_history);
        let price_changed = self.price_changed_today(instrument, run_date).await;

        let predicted = match rows {
            Ok(_) => self.predict_row(instrument, run_date, today.as_ref(), force_reload).await,
            Err(e) => Err(e),
        };
        let prediction = predicted.as_ref().ok().cloned();
        let error = predicted.as_ref().err().map(ToString::to_string);

        let mut state = self.records.load_alarm_state().await?;
        let decision = {
            let mut ctx =
                AlarmContext::new(&state, now).with_price_changed_today(price_changed);
            if let Some(row) = &today {
                ctx = ctx.with_features(&row.values);
            }
            self.alarm.decide_from_result(instrument, predicted, &ctx)
        };

        if decision.should_alert {
            self.alarm.record(&decision, &mut state, instrument, now);
            self.records.save_alarm_state(&state).await?;
        }

        if let Some(p) = &prediction {
            let record = DecisionRecord {
                run_date,
                instrument: instrument.clone(),
                model_version: p.model_version.clone(),
                raw_probability: p.raw_probability,
                probability: p.probability,
                first_event_amount: p.first_event_amount,
                first_event_direction: p.first_event_direction,
                net_amount: p.net_amount,
                risk_trend,
                decision: decision.clone(),
                created_at: now,
            };
            self.records.upsert_decision(&record).await?;
        }

        info!(
            instrument = %instrument,
            %run_date,
            should_alert = decision.should_alert,
            kind = ?decision.alarm_kind,
            %risk_trend,
            "Daily decision made"
        );

        Ok(DailyOutcome {
            instrument: instrument.clone(),
            run_date,
            prediction,
            risk_trend,
            decision,
            error,
        })
    }

    /// 여러 상품 백테스트. 상품별 실패는 해당 리포트에만 기록됩니다.
    pub async fn backtest(
        &self,
        instruments: &[Instrument],
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<BacktestReport>> {
        let engine = BacktestEngine::from_config(&self.config)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(engine
            .run_full_backtest(&*self.prices, &*self.features, &self.labels, instruments, start, end)
            .await)
    }

    /// 백테스트 리포트를 Markdown으로 렌더링합니다.
    pub fn render_backtest(&self, reports: &[BacktestReport], generated_on: NaiveDate) -> String {
        render_markdown(reports, generated_on, |i| self.display_name(i))
    }

    fn risk_history(&self, rows: &[FeatureRow]) -> Vec<f64> {
        let mut dated: Vec<(NaiveDate, f64)> = rows
            .iter()
            .filter_map(|r| r.get(&self.config.alarm.risk_feature).map(|v| (r.date, v)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        dated.sort_by_key(|(d, _)| *d);
        dated.into_iter().map(|(_, v)| v).collect()
    }

    async fn price_changed_today(&self, instrument: &Instrument, run_date: NaiveDate) -> bool {
        let start = run_date - Duration::days(PRICE_LOOKBACK_DAYS);
        match self.prices.get_prices(instrument, start, run_date).await {
            Ok(points) => price_changed_on(&points, run_date),
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Price fetch failed, assuming unchanged");
                false
            }
        }
    }

    async fn predict_row(
        &self,
        instrument: &Instrument,
        run_date: NaiveDate,
        row: Option<&FeatureRow>,
        force_reload: bool,
    ) -> PipelineResult<Prediction> {
        let row = row.ok_or_else(|| {
            PipelineError::NotFound(format!("features for {instrument} on {run_date}"))
        })?;
        let bundle = self.load_model(instrument, force_reload).await?;
        let predictor = EventPredictor::new(PredictorConfig::from_app_config(
            &self.config,
            instrument.as_str(),
        ));
        Ok(predictor.predict(&bundle, row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_price_changed_on() {
        let points = vec![
            PricePoint::new(day(5), dec!(41.20)),
            PricePoint::new(day(7), dec!(41.55)),
        ];
        assert!(price_changed_on(&points, day(7)));
        // 마지막 관측이 그날이 아니면 변경 아님
        assert!(!price_changed_on(&points, day(8)));
        // 그날 이후 관측은 무시
        assert!(!price_changed_on(&points, day(6)));

        let flat = vec![
            PricePoint::new(day(6), dec!(41.20)),
            PricePoint::new(day(7), dec!(41.2005)),
        ];
        assert!(!price_changed_on(&flat, day(7)));
        assert!(!price_changed_on(&flat[1..], day(7)));
    }
}
