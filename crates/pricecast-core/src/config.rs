//! 설정 관리.
//!
//! 파이프라인 전체 설정을 정의하고 관리합니다. 모든 섹션은 기본값을 가지므로
//! 설정 파일에는 변경할 값만 적으면 됩니다.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::domain::{ComparisonOperator, DeterministicRule, RuleCondition};
use crate::error::{PipelineError, PipelineResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// 라벨 생성 설정
    #[serde(default)]
    pub labels: LabelConfig,
    /// 교차 검증 설정
    #[serde(default)]
    pub cv: CvConfig,
    /// 학습 설정
    #[serde(default)]
    pub trainer: TrainerConfig,
    /// 캘리브레이션 설정
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// 백테스트 설정
    #[serde(default)]
    pub backtest: BacktestConfig,
    /// 알람 설정
    #[serde(default)]
    pub alarm: AlarmConfig,
    /// 추론 설정
    #[serde(default)]
    pub inference: InferenceConfig,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 추적 대상 상품 목록
    #[serde(default = "default_instruments")]
    pub instruments: Vec<InstrumentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            labels: LabelConfig::default(),
            cv: CvConfig::default(),
            trainer: TrainerConfig::default(),
            calibration: CalibrationConfig::default(),
            backtest: BacktestConfig::default(),
            alarm: AlarmConfig::default(),
            inference: InferenceConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            instruments: default_instruments(),
        }
    }
}

/// 이벤트 라벨 생성 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelConfig {
    /// 전방 윈도우 (달력일)
    pub window_days: u32,
    /// 절대 변동 임계값
    pub threshold: Decimal,
    /// 최대 forward-fill 기간 (달력일)
    pub max_fill_days: u32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            window_days: 3,
            threshold: dec!(0.15),
            max_fill_days: 15,
        }
    }
}

/// Purged walk-forward 교차 검증 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CvConfig {
    /// 최소 학습 기간 (인덱스 수)
    pub min_train_days: usize,
    /// 테스트 기간
    pub test_days: usize,
    /// 폴드 간 이동 간격
    pub step_days: usize,
    /// 학습 끝과 테스트 시작 사이 간격
    pub embargo_days: usize,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            min_train_days: 365,
            test_days: 90,
            step_days: 90,
            embargo_days: 4,
        }
    }
}

/// GBDT 하이퍼파라미터.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GbdtParams {
    /// 부스팅 라운드 수
    pub n_estimators: usize,
    /// 학습률
    pub learning_rate: f64,
    /// 최대 깊이 (0 이하면 제한 없음)
    pub max_depth: i32,
    /// 트리당 최대 리프 수
    pub num_leaves: usize,
    /// 리프당 최소 샘플 수
    pub min_child_samples: usize,
    /// 행 샘플링 비율
    pub subsample: f64,
    /// 행 샘플링 주기 (0이면 비활성)
    pub subsample_freq: usize,
    /// 트리당 피처 샘플링 비율
    pub colsample_bytree: f64,
    /// L1 정규화
    pub reg_alpha: f64,
    /// L2 정규화
    pub reg_lambda: f64,
    /// 피처당 최대 히스토그램 bin 수
    pub max_bin: usize,
    /// 난수 시드
    pub seed: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 6,
            num_leaves: 31,
            min_child_samples: 20,
            subsample: 0.8,
            subsample_freq: 0,
            colsample_bytree: 0.8,
            reg_alpha: 0.1,
            reg_lambda: 0.1,
            max_bin: 255,
            seed: 42,
        }
    }
}

impl GbdtParams {
    /// Stage 2 회귀 모델 기본값 (리프당 최소 샘플만 다름).
    pub fn stage2_default() -> Self {
        Self {
            min_child_samples: 10,
            ..Default::default()
        }
    }

    /// 파라미터 범위를 검증합니다.
    pub fn validate(&self, name: &str) -> PipelineResult<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::Config(format!("{name}.n_estimators must be >= 1")));
        }
        if !(self.learning_rate > 0.0) {
            return Err(PipelineError::Config(format!("{name}.learning_rate must be > 0")));
        }
        if self.num_leaves < 2 {
            return Err(PipelineError::Config(format!("{name}.num_leaves must be >= 2")));
        }
        if self.min_child_samples == 0 {
            return Err(PipelineError::Config(format!(
                "{name}.min_child_samples must be >= 1"
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PipelineError::Config(format!("{name}.subsample must be in (0, 1]")));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(PipelineError::Config(format!(
                "{name}.colsample_bytree must be in (0, 1]"
            )));
        }
        if self.reg_alpha < 0.0 || self.reg_lambda < 0.0 {
            return Err(PipelineError::Config(format!(
                "{name}.reg_alpha/reg_lambda must be >= 0"
            )));
        }
        if self.max_bin < 2 {
            return Err(PipelineError::Config(format!("{name}.max_bin must be >= 2")));
        }
        Ok(())
    }
}

/// 2단계 학습 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Stage 1 분류기 파라미터
    #[serde(default)]
    pub stage1: GbdtParams,
    /// Stage 2 회귀 모델 파라미터
    #[serde(default = "GbdtParams::stage2_default")]
    pub stage2: GbdtParams,
    /// Stage 2 학습에 필요한 최소 양성 샘플 수
    pub min_stage2_positives: usize,
    /// Stage 2 CV 폴드당 최소 학습 행 수
    pub min_stage2_fold_rows: usize,
    /// 모델 버전 (없으면 학습 시각으로 생성)
    #[serde(default)]
    pub model_version: Option<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            stage1: GbdtParams::default(),
            stage2: GbdtParams::stage2_default(),
            min_stage2_positives: 20,
            min_stage2_fold_rows: 5,
            model_version: None,
        }
    }
}

/// 확률 캘리브레이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// 이 값 미만의 ECE를 달성하면 후보 탐색 중단
    pub ece_threshold: f64,
    /// 신뢰도 bin 수
    pub n_bins: usize,
    /// 이 수보다 적으면 경고 로그
    pub min_samples: usize,
    /// logit 변환 전 클리핑 epsilon
    pub clip_eps: f64,
    /// Beta 캘리브레이션 Nelder-Mead 최대 반복
    pub beta_max_iter: usize,
    /// Beta 캘리브레이션 수렴 허용 오차
    pub beta_tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ece_threshold: 0.05,
            n_bins: 10,
            min_samples: 30,
            clip_eps: 1e-7,
            beta_max_iter: 5000,
            beta_tolerance: 1e-8,
        }
    }
}

/// 백테스트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// 학습 구간 끝에서 캘리브레이션용으로 떼어낼 비율
    pub calibration_fraction: f64,
    /// 캘리브레이션 구간 최소 행 수
    pub min_calibration_rows: usize,
    /// 이진 판정 임계값
    pub decision_threshold: f64,
    /// Stage 2 평가에 필요한 학습 양성 샘플 수
    pub stage2_min_train_positives: usize,
    /// Stage 2 평가에 필요한 테스트 양성 샘플 수
    pub stage2_min_test_positives: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            calibration_fraction: 0.25,
            min_calibration_rows: 10,
            decision_threshold: 0.5,
            stage2_min_train_positives: 10,
            stage2_min_test_positives: 1,
        }
    }
}

/// 알람 결정 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// ML 알람 확률 임계값
    pub alarm_threshold: f64,
    /// 알람 간 최소 간격 (시간)
    pub cooldown_hours: i64,
    /// 복합 리스크 피처 이름
    pub risk_feature: String,
    /// 리스크 보조 조건: 리스크 임계값
    pub risk_alarm_threshold: f64,
    /// 리스크 보조 조건: 최소 확률
    pub risk_min_probability: f64,
    /// `consistent` 판정 최소 |net| 크기
    pub consistent_net_threshold: f64,
    /// 리스크 추세 계산 관측 수
    pub risk_trend_window: usize,
    /// 리스크 추세 판정 임계값
    pub risk_trend_delta: f64,
    /// 결정적 규칙 하나당 신뢰도
    pub rule_confidence_step: f64,
    /// 결정적 규칙 목록
    #[serde(default = "default_rules")]
    pub rules: Vec<DeterministicRule>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            alarm_threshold: 0.25,
            cooldown_hours: 12,
            risk_feature: "risk_composite".to_string(),
            risk_alarm_threshold: 0.65,
            risk_min_probability: 0.15,
            consistent_net_threshold: 0.30,
            risk_trend_window: 6,
            risk_trend_delta: 0.02,
            rule_confidence_step: 0.25,
            rules: default_rules(),
        }
    }
}

fn default_rules() -> Vec<DeterministicRule> {
    use ComparisonOperator::*;
    vec![
        DeterministicRule::new("mbe_gap_stale")
            .with_condition(RuleCondition::new("mbe_value", Lt, -1.0))
            .with_condition(RuleCondition::new("days_since_last_change", Gte, 7.0)),
        DeterministicRule::new("cost_gap_high")
            .with_condition(RuleCondition::new("cost_gap_pct", Gt, 3.0)),
        DeterministicRule::new("mbe_rapid_decline")
            .with_condition(RuleCondition::new("delta_mbe_3d", Lt, -1.5)),
        DeterministicRule::new("high_risk_stale")
            .with_condition(RuleCondition::new("risk_composite", Gte, 0.70))
            .with_condition(RuleCondition::new("days_since_last_change", Gte, 5.0)),
    ]
}

/// Stage 2 예측값 클리핑 한도.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClipLimits {
    /// 첫 이벤트 금액 한도 (절대값)
    pub first: Decimal,
    /// 누적 순변동 한도 (절대값)
    pub net: Decimal,
}

impl Default for ClipLimits {
    fn default() -> Self {
        Self {
            first: dec!(2.50),
            net: dec!(4.00),
        }
    }
}

/// 추론 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// 캘리브레이터 적용 여부 (false면 raw 확률 사용)
    pub use_calibration: bool,
    /// 기본 클리핑 한도
    #[serde(default)]
    pub default_clip: ClipLimits,
    /// 상품별 클리핑 한도
    #[serde(default = "default_clip_overrides")]
    pub clip_overrides: HashMap<String, ClipLimits>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            use_calibration: false,
            default_clip: ClipLimits::default(),
            clip_overrides: default_clip_overrides(),
        }
    }
}

impl InferenceConfig {
    /// 상품의 클리핑 한도를 반환합니다.
    pub fn clip_for(&self, instrument: &str) -> ClipLimits {
        self.clip_overrides
            .get(instrument)
            .copied()
            .unwrap_or(self.default_clip)
    }
}

fn default_clip_overrides() -> HashMap<String, ClipLimits> {
    let mut map = HashMap::new();
    map.insert(
        "lpg".to_string(),
        ClipLimits {
            first: dec!(1.50),
            net: dec!(2.50),
        },
    );
    map
}

/// 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 모델 번들 디렉토리
    pub model_dir: String,
    /// 라벨/결정 기록/알람 상태 디렉토리
    pub record_dir: String,
    /// 가격 CSV 경로
    pub price_csv: String,
    /// 피처 CSV 경로
    pub feature_csv: String,
    /// 리포트 출력 디렉토리
    pub report_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_dir: "data/models".to_string(),
            record_dir: "data/records".to_string(),
            price_csv: "data/prices.csv".to_string(),
            feature_csv: "data/features.csv".to_string(),
            report_dir: "reports".to_string(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
    /// span 진입/종료 이벤트 출력
    #[serde(default)]
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            span_events: false,
        }
    }
}

/// 추적 대상 상품 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InstrumentConfig {
    /// 상품 코드
    pub code: String,
    /// 메시지에 표시할 이름
    pub display_name: String,
}

impl InstrumentConfig {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
        }
    }
}

fn default_instruments() -> Vec<InstrumentConfig> {
    vec![
        InstrumentConfig::new("benzin", "휘발유"),
        InstrumentConfig::new("motorin", "경유"),
        InstrumentConfig::new("lpg", "LPG"),
    ]
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수는 `PRICECAST__ALARM__COOLDOWN_HOURS=6` 형식입니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("PRICECAST")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }

    /// 상품 표시 이름을 반환합니다. 등록되지 않은 상품은 코드를 그대로 씁니다.
    pub fn display_name(&self, instrument: &str) -> String {
        self.instruments
            .iter()
            .find(|i| i.code == instrument)
            .map(|i| i.display_name.clone())
            .unwrap_or_else(|| instrument.to_string())
    }

    /// 설정 값의 범위와 상호 제약을 검증합니다.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.labels.window_days == 0 {
            return Err(PipelineError::Config("labels.window_days must be >= 1".into()));
        }
        if self.labels.threshold <= Decimal::ZERO {
            return Err(PipelineError::Config("labels.threshold must be > 0".into()));
        }
        if self.cv.min_train_days == 0 || self.cv.test_days == 0 || self.cv.step_days == 0 {
            return Err(PipelineError::Config(
                "cv.min_train_days, cv.test_days and cv.step_days must be >= 1".into(),
            ));
        }
        if self.cv.embargo_days < self.labels.window_days as usize {
            return Err(PipelineError::Config(format!(
                "cv.embargo_days ({}) must be >= labels.window_days ({})",
                self.cv.embargo_days, self.labels.window_days
            )));
        }
        self.trainer.stage1.validate("trainer.stage1")?;
        self.trainer.stage2.validate("trainer.stage2")?;

        if !(self.calibration.ece_threshold > 0.0) || self.calibration.n_bins == 0 {
            return Err(PipelineError::Config(
                "calibration.ece_threshold must be > 0 and calibration.n_bins >= 1".into(),
            ));
        }
        if !(self.backtest.calibration_fraction > 0.0 && self.backtest.calibration_fraction < 1.0)
        {
            return Err(PipelineError::Config(
                "backtest.calibration_fraction must be in (0, 1)".into(),
            ));
        }
        for (name, p) in [
            ("alarm.alarm_threshold", self.alarm.alarm_threshold),
            ("alarm.risk_min_probability", self.alarm.risk_min_probability),
            ("backtest.decision_threshold", self.backtest.decision_threshold),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(PipelineError::Config(format!("{name} must be in [0, 1]")));
            }
        }
        if self.alarm.cooldown_hours < 0 {
            return Err(PipelineError::Config("alarm.cooldown_hours must be >= 0".into()));
        }
        if self.alarm.risk_trend_window < 2 || self.alarm.risk_trend_window % 2 != 0 {
            return Err(PipelineError::Config(
                "alarm.risk_trend_window must be an even number >= 2".into(),
            ));
        }
        for rule in &self.alarm.rules {
            if rule.conditions.is_empty() {
                return Err(PipelineError::Config(format!(
                    "alarm rule '{}' has no conditions",
                    rule.name
                )));
            }
        }
        if self.instruments.is_empty() {
            return Err(PipelineError::Config("instruments must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trainer.stage2.min_child_samples, 10);
        assert_eq!(config.alarm.rules.len(), 4);
    }

    #[test]
    fn test_embargo_shorter_than_window_rejected() {
        let mut config = AppConfig::default();
        config.cv.embargo_days = 2;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_clip_for_instrument() {
        let inference = InferenceConfig::default();
        assert_eq!(inference.clip_for("lpg").first, dec!(1.50));
        assert_eq!(inference.clip_for("benzin").net, dec!(4.00));
    }

    #[test]
    fn test_display_name_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.display_name("motorin"), "경유");
        assert_eq!(config.display_name("kerosene"), "kerosene");
    }
}
