//! 알람 결정 및 상태.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::Instrument;

/// 알람 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// 방향과 크기가 일관된 큰 변동
    Consistent,
    /// 첫 이벤트와 순변동 방향이 다름
    Volatile,
    /// 방향은 일관되나 작은 변동
    Gradual,
    /// 뚜렷한 변동 없음
    NoChange,
    /// 오늘 이미 가격이 바뀜
    AlreadyHappened,
    /// 모델과 무관한 결정적 규칙
    Deterministic,
}

impl AlarmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::Consistent => "consistent",
            AlarmKind::Volatile => "volatile",
            AlarmKind::Gradual => "gradual",
            AlarmKind::NoChange => "no_change",
            AlarmKind::AlreadyHappened => "already_happened",
            AlarmKind::Deterministic => "deterministic",
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 최근 리스크 추세.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskTrend {
    Up,
    Down,
    #[default]
    Stable,
}

impl fmt::Display for RiskTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTrend::Up => write!(f, "up"),
            RiskTrend::Down => write!(f, "down"),
            RiskTrend::Stable => write!(f, "stable"),
        }
    }
}

/// 하루치 알람 결정. 호출마다 새로 만들어지며 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDecision {
    /// 알람 발송 여부
    pub should_alert: bool,
    /// 알람 유형
    pub alarm_kind: Option<AlarmKind>,
    /// 렌더링된 메시지
    pub message: Option<String>,
    /// 신뢰도 (0~1)
    pub confidence: f64,
    /// 쿨다운 활성 여부
    pub cooldown_active: bool,
    /// 남은 쿨다운 시간 (소수점 1자리)
    pub cooldown_remaining_hours: f64,
    /// 발동한 결정적 규칙 이름
    #[serde(default)]
    pub deterministic_rules: Vec<String>,
}

impl AlarmDecision {
    /// 알람 없음 결정을 생성합니다.
    pub fn no_alert(confidence: f64) -> Self {
        Self {
            should_alert: false,
            alarm_kind: None,
            message: None,
            confidence,
            cooldown_active: false,
            cooldown_remaining_hours: 0.0,
            deterministic_rules: Vec::new(),
        }
    }

    /// 알람 결정을 생성합니다.
    pub fn alert(kind: AlarmKind, message: String, confidence: f64) -> Self {
        Self {
            should_alert: true,
            alarm_kind: Some(kind),
            message: Some(message),
            confidence,
            cooldown_active: false,
            cooldown_remaining_hours: 0.0,
            deterministic_rules: Vec::new(),
        }
    }

    /// 쿨다운 정보를 설정합니다.
    pub fn with_cooldown(mut self, active: bool, remaining_hours: f64) -> Self {
        self.cooldown_active = active;
        self.cooldown_remaining_hours = remaining_hours;
        self
    }

    /// 발동한 규칙을 설정합니다.
    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.deterministic_rules = rules;
        self
    }
}

/// 상품별 마지막 알람 시각.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmState {
    last_alarm_time: HashMap<Instrument, DateTime<Utc>>,
}

impl AlarmState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 상품의 마지막 알람 시각.
    pub fn last_alarm_time(&self, instrument: &Instrument) -> Option<DateTime<Utc>> {
        self.last_alarm_time.get(instrument).copied()
    }

    /// 알람 발송을 기록합니다.
    pub fn record_alarm(&mut self, instrument: Instrument, at: DateTime<Utc>) {
        self.last_alarm_time.insert(instrument, at);
    }

    /// 상품의 기록을 지웁니다.
    pub fn clear(&mut self, instrument: &Instrument) {
        self.last_alarm_time.remove(instrument);
    }
}

/// 영속화되는 결정 기록. (run_date, instrument, model_version)이 키입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// 기준일
    pub run_date: NaiveDate,
    /// 상품
    pub instrument: Instrument,
    /// 모델 버전
    pub model_version: String,
    /// 분류기 raw 확률
    pub raw_probability: f64,
    /// 결정에 쓴 확률
    pub probability: f64,
    /// 예측 첫 이벤트 금액
    pub first_event_amount: Option<Decimal>,
    /// 예측 첫 이벤트 방향
    pub first_event_direction: i8,
    /// 예측 누적 순변동
    pub net_amount: Option<Decimal>,
    /// 리스크 추세
    pub risk_trend: RiskTrend,
    /// 알람 결정
    pub decision: AlarmDecision,
    /// 기록 시각
    pub created_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// 업서트 키.
    pub fn key(&self) -> (NaiveDate, Instrument, String) {
        (self.run_date, self.instrument.clone(), self.model_version.clone())
    }
}
