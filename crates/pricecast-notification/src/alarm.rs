//! 알람 결정 엔진.
//!
//! 하루치 예측을 받아 알람 여부와 유형을 정합니다. 판단 순서:
//!
//! 1. 오늘 이미 가격이 바뀌었으면 `already_happened` 알람 (쿨다운 무시)
//! 2. 쿨다운 중이면 알람 없음
//! 3. ML 조건 충족 시 예측 방향/크기로 유형 결정
//! 4. 결정적 규칙이 하나라도 발동하면 `deterministic` 알람
//! 5. 그 외 알람 없음
//!
//! 어떤 오류도 호출자에게 전달하지 않고 알람 없음으로 처리합니다.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

use pricecast_core::{
    round_f64, AlarmConfig, AlarmDecision, AlarmKind, AlarmState, AppConfig, DecimalExt,
    Instrument, Prediction, RiskTrend,
};

use crate::templates::{render_message, MessageContext};
use crate::types::{AlarmContext, AlarmError, AlarmResult};

/// 기본 예측 창 길이 (일).
const DEFAULT_HORIZON_DAYS: u32 = 3;

/// 최근 리스크 점수로 추세를 계산합니다.
///
/// 마지막 `window`개 관측을 절반으로 나눠 최근 평균과 이전 평균의 차이를 봅니다.
/// 관측이 `window`개보다 적으면 `Stable`입니다.
pub fn compute_risk_trend(history: &[f64], window: usize, delta: f64) -> RiskTrend {
    let half = window / 2;
    if half == 0 || history.len() < window {
        return RiskTrend::Stable;
    }

    let recent = &history[history.len() - half..];
    let prior = &history[history.len() - 2 * half..history.len() - half];
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let diff = mean(recent) - mean(prior);

    if diff > delta {
        RiskTrend::Up
    } else if diff < -delta {
        RiskTrend::Down
    } else {
        RiskTrend::Stable
    }
}

/// 예측 방향과 순변동으로 ML 알람 유형을 정합니다.
pub fn determine_alarm_kind(
    first_event_direction: i8,
    net_amount: Option<Decimal>,
    consistent_threshold: f64,
) -> AlarmKind {
    let net = match net_amount {
        Some(net) if first_event_direction != 0 => net,
        _ => return AlarmKind::NoChange,
    };

    if net.signum_i8() != first_event_direction {
        AlarmKind::Volatile
    } else if net.abs().to_f64_lossy() >= consistent_threshold {
        AlarmKind::Consistent
    } else {
        AlarmKind::Gradual
    }
}

/// 알람 결정 엔진.
#[derive(Debug, Clone)]
pub struct AlarmEngine {
    config: AlarmConfig,
    horizon_days: u32,
    display_names: HashMap<String, String>,
}

impl AlarmEngine {
    pub fn new(config: AlarmConfig) -> Self {
        Self {
            config,
            horizon_days: DEFAULT_HORIZON_DAYS,
            display_names: HashMap::new(),
        }
    }

    /// 애플리케이션 설정에서 생성합니다. 메시지의 예측 창과 상품 이름을 함께 가져옵니다.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            config: config.alarm.clone(),
            horizon_days: config.labels.window_days,
            display_names: config
                .instruments
                .iter()
                .map(|i| (i.code.clone(), i.display_name.clone()))
                .collect(),
        }
    }

    pub fn with_display_name(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.display_names.insert(code.into(), name.into());
        self
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    /// 설정된 창과 임계값으로 리스크 추세를 계산합니다.
    pub fn risk_trend(&self, history: &[f64]) -> RiskTrend {
        compute_risk_trend(
            history,
            self.config.risk_trend_window,
            self.config.risk_trend_delta,
        )
    }

    /// 하루치 알람을 결정합니다. 입력이 잘못되어도 알람 없음을 반환합니다.
    pub fn decide_alarm(&self, prediction: &Prediction, ctx: &AlarmContext<'_>) -> AlarmDecision {
        match self.try_decide(prediction, ctx) {
            Ok(decision) => decision,
            Err(e) => self.fail_safe(&prediction.instrument, &e),
        }
    }

    /// 예측 단계 결과를 그대로 받아 결정합니다. 예측이 실패했으면 알람 없음입니다.
    pub fn decide_from_result<E>(
        &self,
        instrument: &Instrument,
        prediction: Result<Prediction, E>,
        ctx: &AlarmContext<'_>,
    ) -> AlarmDecision
    where
        E: Into<AlarmError>,
    {
        match prediction {
            Ok(prediction) => self.decide_alarm(&prediction, ctx),
            Err(e) => {
                let error: AlarmError = e.into();
                self.fail_safe(instrument, &error)
            }
        }
    }

    /// 알람이 발송되면 상태에 시각을 기록합니다.
    pub fn record(
        &self,
        decision: &AlarmDecision,
        state: &mut AlarmState,
        instrument: &Instrument,
        at: DateTime<Utc>,
    ) {
        if decision.should_alert {
            state.record_alarm(instrument.clone(), at);
        }
    }

    fn fail_safe(&self, instrument: &Instrument, error: &dyn fmt::Display) -> AlarmDecision {
        warn!(instrument = %instrument, error = %error, "Alarm decision failed, suppressing alarm");
        AlarmDecision::no_alert(0.0)
    }

    fn try_decide(&self, prediction: &Prediction, ctx: &AlarmContext<'_>) -> AlarmResult<AlarmDecision> {
        let p = prediction.probability;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(AlarmError::InvalidPrediction(format!(
                "probability {p} is outside [0, 1]"
            )));
        }

        let instrument = &prediction.instrument;
        let (cooldown_active, remaining) =
            self.cooldown(ctx.state.last_alarm_time(instrument), ctx.now);

        if ctx.price_changed_today {
            info!(instrument = %instrument, "Price already changed today");
            let message = self.message(AlarmKind::AlreadyHappened, prediction);
            return Ok(AlarmDecision::alert(AlarmKind::AlreadyHappened, message, p)
                .with_cooldown(cooldown_active, remaining));
        }

        if cooldown_active {
            debug!(
                instrument = %instrument,
                remaining_hours = remaining,
                "Alarm suppressed by cooldown"
            );
            return Ok(AlarmDecision::no_alert(p).with_cooldown(true, remaining));
        }

        let risk = ctx.feature(&self.config.risk_feature);
        if self.ml_triggered(p, risk) {
            let kind = determine_alarm_kind(
                prediction.first_event_direction,
                prediction.net_amount,
                self.config.consistent_net_threshold,
            );
            info!(
                instrument = %instrument,
                kind = %kind,
                probability = p,
                risk,
                "ML alarm triggered"
            );
            let message = self.message(kind, prediction);
            return Ok(AlarmDecision::alert(kind, message, p));
        }

        let fired = self.fired_rules(ctx.features);
        if !fired.is_empty() {
            let confidence = (self.config.rule_confidence_step * fired.len() as f64).min(1.0);
            info!(
                instrument = %instrument,
                rules = ?fired,
                "Deterministic alarm triggered"
            );
            let message = self.message(AlarmKind::Deterministic, prediction);
            return Ok(AlarmDecision::alert(AlarmKind::Deterministic, message, confidence)
                .with_rules(fired));
        }

        debug!(instrument = %instrument, probability = p, "No alarm");
        Ok(AlarmDecision::no_alert(p))
    }

    /// 쿨다운 활성 여부와 남은 시간 (소수점 1자리).
    fn cooldown(&self, last_alarm: Option<DateTime<Utc>>, now: DateTime<Utc>) -> (bool, f64) {
        let Some(last) = last_alarm else {
            return (false, 0.0);
        };
        let window = Duration::hours(self.config.cooldown_hours);
        let elapsed = now - last;
        if elapsed >= window {
            return (false, 0.0);
        }
        let remaining = (window - elapsed).num_seconds() as f64 / 3600.0;
        (true, round_f64(remaining, 1))
    }

    fn ml_triggered(&self, probability: f64, risk: f64) -> bool {
        probability >= self.config.alarm_threshold
            || (risk >= self.config.risk_alarm_threshold
                && probability >= self.config.risk_min_probability)
    }

    fn fired_rules(&self, features: Option<&BTreeMap<String, f64>>) -> Vec<String> {
        let empty = BTreeMap::new();
        let features = features.unwrap_or(&empty);
        self.config
            .rules
            .iter()
            .filter(|rule| rule.evaluate(features))
            .map(|rule| rule.name.clone())
            .collect()
    }

    fn message(&self, kind: AlarmKind, prediction: &Prediction) -> String {
        let code = prediction.instrument.as_str();
        let name = self
            .display_names
            .get(code)
            .map(String::as_str)
            .unwrap_or(code);
        render_message(
            kind,
            &MessageContext {
                display_name: name,
                probability: prediction.probability,
                net_amount: prediction.net_amount,
                horizon_days: self.horizon_days,
            },
        )
    }
}

impl Default for AlarmEngine {
    fn default() -> Self {
        Self::new(AlarmConfig::default())
    }
}
