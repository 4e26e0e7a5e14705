//! 알람 결정 엔진 통합 테스트.
//!
//! 판단 순서(가격 변경 → 쿨다운 → ML → 결정적 규칙)와 fail-safe 동작을 검증합니다.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use pricecast_core::{
    AlarmConfig, AlarmKind, AlarmState, AppConfig, Instrument, PipelineError, Prediction,
};
use pricecast_notification::{AlarmContext, AlarmEngine};

// ============================================================================
// 테스트 헬퍼 함수
// ============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 7, 18, 0, 0).unwrap()
}

fn prediction(p: f64, direction: i8, net: Option<Decimal>) -> Prediction {
    Prediction {
        instrument: Instrument::new("benzin"),
        run_date: NaiveDate::from_ymd_opt(2024, 6, 7).unwrap(),
        raw_probability: p,
        probability: p,
        calibrated: false,
        first_event_amount: net,
        first_event_direction: direction,
        net_amount: net,
        model_version: "v1".to_string(),
    }
}

fn features(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn engine() -> AlarmEngine {
    AlarmEngine::from_config(&AppConfig::default())
}

// ============================================================================
// 판단 순서
// ============================================================================

#[test]
fn test_price_changed_today_overrides_cooldown() {
    let mut state = AlarmState::new();
    state.record_alarm(Instrument::new("benzin"), now() - Duration::hours(2));
    let ctx = AlarmContext::new(&state, now()).with_price_changed_today(true);

    let decision = engine().decide_alarm(&prediction(0.05, 0, None), &ctx);

    assert!(decision.should_alert);
    assert_eq!(decision.alarm_kind, Some(AlarmKind::AlreadyHappened));
    assert_eq!(decision.confidence, 0.05);
    assert!(decision.cooldown_active);
    assert_eq!(decision.cooldown_remaining_hours, 10.0);
    assert!(decision.message.unwrap().contains("휘발유"));
}

#[test]
fn test_cooldown_suppresses_alarm() {
    let mut state = AlarmState::new();
    state.record_alarm(Instrument::new("benzin"), now() - Duration::minutes(90));
    let ctx = AlarmContext::new(&state, now());

    let decision = engine().decide_alarm(&prediction(0.97, 1, Some(dec!(0.80))), &ctx);

    assert!(!decision.should_alert);
    assert!(decision.alarm_kind.is_none());
    assert!(decision.cooldown_active);
    assert_eq!(decision.cooldown_remaining_hours, 10.5);
    assert_eq!(decision.confidence, 0.97);
}

#[test]
fn test_cooldown_is_per_instrument() {
    let mut state = AlarmState::new();
    state.record_alarm(Instrument::new("motorin"), now() - Duration::hours(1));
    let ctx = AlarmContext::new(&state, now());

    let decision = engine().decide_alarm(&prediction(0.60, 1, Some(dec!(0.40))), &ctx);
    assert!(decision.should_alert);
    assert!(!decision.cooldown_active);
}

#[test]
fn test_ml_alarm_kinds() {
    let state = AlarmState::new();
    let ctx = AlarmContext::new(&state, now());
    let engine = engine();

    let cases = [
        (prediction(0.55, 1, Some(dec!(0.45))), AlarmKind::Consistent),
        (prediction(0.55, -1, Some(dec!(0.10))), AlarmKind::Volatile),
        (prediction(0.55, -1, Some(dec!(-0.12))), AlarmKind::Gradual),
        (prediction(0.55, 0, Some(dec!(0.50))), AlarmKind::NoChange),
        (prediction(0.25, 1, None), AlarmKind::NoChange),
    ];
    for (pred, expected) in cases {
        let decision = engine.decide_alarm(&pred, &ctx);
        assert!(decision.should_alert);
        assert_eq!(decision.alarm_kind, Some(expected));
        assert_eq!(decision.confidence, pred.probability);
        assert!(decision.deterministic_rules.is_empty());
    }
}

#[test]
fn test_risk_composite_lowers_probability_bar() {
    let state = AlarmState::new();
    let risky = features(&[("risk_composite", 0.70)]);
    let calm = features(&[("risk_composite", 0.40)]);
    let engine = AlarmEngine::new(AlarmConfig {
        rules: Vec::new(),
        ..AlarmConfig::default()
    });
    let pred = prediction(0.18, 1, Some(dec!(0.20)));

    let decision = engine.decide_alarm(&pred, &AlarmContext::new(&state, now()).with_features(&risky));
    assert!(decision.should_alert);
    assert_eq!(decision.alarm_kind, Some(AlarmKind::Gradual));

    let decision = engine.decide_alarm(&pred, &AlarmContext::new(&state, now()).with_features(&calm));
    assert!(!decision.should_alert);

    // 최소 확률 미만이면 리스크가 높아도 알람 없음
    let decision = engine.decide_alarm(
        &prediction(0.10, 1, None),
        &AlarmContext::new(&state, now()).with_features(&risky),
    );
    assert!(!decision.should_alert);
}

#[test]
fn test_deterministic_rules() {
    let state = AlarmState::new();
    let day_features = features(&[
        ("mbe_value", -1.4),
        ("days_since_last_change", 9.0),
        ("cost_gap_pct", 3.5),
        ("delta_mbe_3d", -0.2),
        ("risk_composite", 0.30),
    ]);
    let ctx = AlarmContext::new(&state, now()).with_features(&day_features);

    let decision = engine().decide_alarm(&prediction(0.05, 0, None), &ctx);

    assert!(decision.should_alert);
    assert_eq!(decision.alarm_kind, Some(AlarmKind::Deterministic));
    assert_eq!(
        decision.deterministic_rules,
        vec!["mbe_gap_stale".to_string(), "cost_gap_high".to_string()]
    );
    assert_eq!(decision.confidence, 0.5);
}

#[test]
fn test_rule_confidence_is_capped() {
    let state = AlarmState::new();
    let day_features = features(&[
        ("mbe_value", -2.0),
        ("days_since_last_change", 10.0),
        ("cost_gap_pct", 4.0),
        ("delta_mbe_3d", -2.0),
        ("risk_composite", 0.75),
    ]);
    let engine = AlarmEngine::new(AlarmConfig {
        rule_confidence_step: 0.4,
        // 리스크 보조 조건이 먼저 걸리지 않도록
        risk_min_probability: 0.5,
        ..AlarmConfig::default()
    });
    let ctx = AlarmContext::new(&state, now()).with_features(&day_features);

    let decision = engine.decide_alarm(&prediction(0.05, 0, None), &ctx);
    assert_eq!(decision.deterministic_rules.len(), 4);
    assert_eq!(decision.confidence, 1.0);
}

#[test]
fn test_no_alert_below_threshold() {
    let state = AlarmState::new();
    let ctx = AlarmContext::new(&state, now());

    let decision = engine().decide_alarm(&prediction(0.12, 1, None), &ctx);
    assert!(!decision.should_alert);
    assert_eq!(decision.confidence, 0.12);
    assert!(!decision.cooldown_active);
    assert!(decision.message.is_none());
}

// ============================================================================
// Fail-safe 및 상태 갱신
// ============================================================================

#[test]
fn test_upstream_error_yields_no_alert() {
    let state = AlarmState::new();
    let ctx = AlarmContext::new(&state, now()).with_price_changed_today(true);
    let failed: Result<Prediction, PipelineError> =
        Err(PipelineError::NotFound("model bundle benzin".to_string()));

    let decision = engine().decide_from_result(&Instrument::new("benzin"), failed, &ctx);
    assert!(!decision.should_alert);
    assert_eq!(decision.confidence, 0.0);
}

#[test]
fn test_invalid_probability_yields_no_alert() {
    let state = AlarmState::new();
    let ctx = AlarmContext::new(&state, now());

    for p in [f64::NAN, 1.5, -0.1] {
        let decision = engine().decide_alarm(&prediction(p, 1, Some(dec!(1.0))), &ctx);
        assert!(!decision.should_alert);
    }
}

#[test]
fn test_record_updates_state_only_on_alert() {
    let engine = engine();
    let instrument = Instrument::new("benzin");
    let mut state = AlarmState::new();

    let quiet = {
        let ctx = AlarmContext::new(&state, now());
        engine.decide_alarm(&prediction(0.05, 0, None), &ctx)
    };
    engine.record(&quiet, &mut state, &instrument, now());
    assert!(state.last_alarm_time(&instrument).is_none());

    let loud = {
        let ctx = AlarmContext::new(&state, now());
        engine.decide_alarm(&prediction(0.90, 1, Some(dec!(0.50))), &ctx)
    };
    engine.record(&loud, &mut state, &instrument, now());
    assert_eq!(state.last_alarm_time(&instrument), Some(now()));

    // 같은 날 다시 평가하면 쿨다운
    let ctx = AlarmContext::new(&state, now() + Duration::hours(1));
    let again = engine.decide_alarm(&prediction(0.90, 1, Some(dec!(0.50))), &ctx);
    assert!(!again.should_alert);
    assert_eq!(again.cooldown_remaining_hours, 11.0);
}

#[test]
fn test_risk_trend_uses_configured_window() {
    let engine = engine();
    assert_eq!(engine.risk_trend(&[0.2, 0.2, 0.2, 0.3, 0.3]).to_string(), "stable");
    assert_eq!(engine.risk_trend(&[0.2, 0.2, 0.2, 0.3, 0.3, 0.3]).to_string(), "up");
}

#[test]
fn test_decision_json_shape() {
    let state = AlarmState::new();
    let ctx = AlarmContext::new(&state, now());
    let decision = engine().decide_alarm(&prediction(0.55, 1, Some(dec!(0.45))), &ctx);

    let json = serde_json::to_value(&decision).unwrap();
    assert_eq!(json["should_alert"], true);
    assert_eq!(json["alarm_kind"], "consistent");
    assert_eq!(json["cooldown_active"], false);
}

proptest! {
    #[test]
    fn prop_cooldown_blocks_any_probability(
        p in 0.0f64..=1.0,
        minutes_ago in 0i64..700,
        direction in -1i8..=1,
    ) {
        let mut state = AlarmState::new();
        state.record_alarm(Instrument::new("benzin"), now() - Duration::minutes(minutes_ago));
        let risky = features(&[("risk_composite", 0.9), ("cost_gap_pct", 9.0)]);
        let ctx = AlarmContext::new(&state, now()).with_features(&risky);

        let decision = engine().decide_alarm(&prediction(p, direction, Some(dec!(1.0))), &ctx);
        prop_assert!(!decision.should_alert);
        prop_assert!(decision.cooldown_active);
        prop_assert!(decision.cooldown_remaining_hours > 0.0);
    }
}
