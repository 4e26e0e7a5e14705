//! 이벤트 라벨 생성.
//!
//! 일별 기준 가격을 달력 기준으로 forward-fill 한 뒤, 각 실행일 `D`에 대해
//! `D+1..=D+W` 창 안에서 임계값 `T` 이상의 가격 변동이 있었는지 판정합니다.
//!
//! - 일별 변동(`filled(D+i) - filled(D+i-1)`)을 먼저 끝까지 스캔합니다.
//! - 일별 변동에서 이벤트가 없을 때만 누적 변동(`filled(D+i) - ref`)을 스캔합니다.
//! - forward-fill은 최대 `H`일까지만 유효하며, 그보다 오래된 값은 "알 수 없음"입니다.
//!
//! 알 수 없는 기준 가격이나 창 내 가격이 있는 날은 에러 없이 조용히 제외됩니다.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use pricecast_core::{
    normalize_prices, DecimalExt, EventKind, EventLabel, Instrument, LabelConfig, PipelineError,
    PipelineResult, PricePoint, PriceSource,
};

/// 달력 일자별 forward-fill 가격.
///
/// `origin`부터 하루 단위로 인덱싱되며 `None`은 알 수 없는 가격입니다.
#[derive(Debug, Clone)]
pub struct FilledSeries {
    origin: NaiveDate,
    values: Vec<Option<Decimal>>,
}

impl FilledSeries {
    /// `[start, end]` 달력 구간을 forward-fill 합니다.
    ///
    /// `points`는 날짜순으로 정렬되어 있어야 합니다. 관측일로부터 `max_fill_days`일
    /// 이내인 날만 마지막 관측값을 이어받습니다.
    pub fn build(points: &[PricePoint], start: NaiveDate, end: NaiveDate, max_fill_days: u32) -> Self {
        let days = (end - start).num_days();
        let len = if days < 0 { 0 } else { days as usize + 1 };
        let mut values = vec![None; len];

        let mut observed = points.iter().filter(|p| p.date >= start && p.date <= end).peekable();
        let mut last: Option<(NaiveDate, Decimal)> = None;

        // 구간 시작 이전의 마지막 관측값도 fill 대상
        for p in points.iter().filter(|p| p.date < start) {
            last = Some((p.date, p.price));
        }

        for (offset, slot) in values.iter_mut().enumerate() {
            let day = start + Duration::days(offset as i64);
            while let Some(p) = observed.peek() {
                if p.date > day {
                    break;
                }
                last = Some((p.date, p.price));
                observed.next();
            }
            *slot = match last {
                Some((seen, price)) if (day - seen).num_days() <= i64::from(max_fill_days) => {
                    Some(price)
                }
                _ => None,
            };
        }

        Self {
            origin: start,
            values,
        }
    }

    /// 해당 날짜의 채워진 가격.
    pub fn get(&self, date: NaiveDate) -> Option<Decimal> {
        let offset = (date - self.origin).num_days();
        if offset < 0 {
            return None;
        }
        self.values.get(offset as usize).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 단일 실행일의 라벨을 계산합니다. 데이터가 부족하면 `None`.
pub fn label_for_day(
    instrument: &Instrument,
    run_date: NaiveDate,
    filled: &FilledSeries,
    config: &LabelConfig,
) -> Option<EventLabel> {
    let reference = filled.get(run_date)?;
    let window = config.window_days.max(1) as i64;

    let mut window_prices = Vec::with_capacity(window as usize);
    for i in 1..=window {
        window_prices.push(filled.get(run_date + Duration::days(i))?);
    }

    let mut daily_diffs = Vec::with_capacity(window_prices.len());
    let mut prev = reference;
    for price in &window_prices {
        daily_diffs.push(*price - prev);
        prev = *price;
    }

    let threshold = config.threshold;
    let mut binary_flag = u8::from(daily_diffs.iter().any(|d| d.abs() >= threshold));

    let mut event_kind = EventKind::None;
    let mut first_event_amount = Decimal::ZERO;
    let mut first_event_direction = 0i8;

    if let Some(diff) = daily_diffs.iter().find(|d| d.abs() >= threshold) {
        event_kind = EventKind::Daily;
        first_event_amount = *diff;
        first_event_direction = if *diff > Decimal::ZERO { 1 } else { -1 };
    }

    if event_kind == EventKind::None {
        if let Some(cumulative) = window_prices
            .iter()
            .map(|price| *price - reference)
            .find(|c| c.abs() >= threshold)
        {
            event_kind = EventKind::Cumulative;
            first_event_amount = cumulative;
            first_event_direction = cumulative.signum_i8();
            binary_flag = 1;
        }
    }

    let net_amount = window_prices.last().map_or(Decimal::ZERO, |last| *last - reference);

    Some(EventLabel {
        run_date,
        instrument: instrument.clone(),
        binary_flag,
        event_kind,
        first_event_amount,
        first_event_direction,
        net_amount,
        reference_price: reference,
        window_end_date: run_date + Duration::days(window),
    })
}

/// 가격 관측치에서 `[start, end]` 실행일의 라벨을 계산합니다.
///
/// `points`는 최소한 `[start - H, end + W]` 구간을 포함해야 모든 날짜가 라벨링됩니다.
pub fn compute_labels(
    instrument: &Instrument,
    points: Vec<PricePoint>,
    start: NaiveDate,
    end: NaiveDate,
    config: &LabelConfig,
) -> PipelineResult<Vec<EventLabel>> {
    if start > end {
        return Err(PipelineError::InvalidInput(format!(
            "start ({start}) > end ({end})"
        )));
    }

    let points = normalize_prices(points);
    if points.is_empty() {
        warn!(instrument = %instrument, %start, %end, "No price observations for label range");
        return Ok(Vec::new());
    }

    let (fetch_start, fetch_end) = fetch_range(start, end, config);
    let filled = FilledSeries::build(&points, fetch_start, fetch_end, config.max_fill_days);

    let mut labels = Vec::new();
    let mut day = start;
    while day <= end {
        match label_for_day(instrument, day, &filled, config) {
            Some(label) => labels.push(label),
            None => debug!(instrument = %instrument, date = %day, "Label skipped: insufficient prices"),
        }
        day += Duration::days(1);
    }

    let positives = labels.iter().filter(|l| l.is_event()).count();
    let positive_pct = if labels.is_empty() {
        0.0
    } else {
        positives as f64 / labels.len() as f64 * 100.0
    };
    info!(
        instrument = %instrument,
        rows = labels.len(),
        positives,
        positive_pct,
        "Label generation complete"
    );

    Ok(labels)
}

/// forward-fill과 예측 창을 위해 조회해야 하는 가격 구간.
pub fn fetch_range(start: NaiveDate, end: NaiveDate, config: &LabelConfig) -> (NaiveDate, NaiveDate) {
    (
        start - Duration::days(i64::from(config.max_fill_days)),
        end + Duration::days(i64::from(config.window_days)),
    )
}

/// 가격 소스를 사용하는 라벨 생성기.
#[derive(Debug, Clone, Default)]
pub struct LabelGenerator {
    config: LabelConfig,
}

impl LabelGenerator {
    pub fn new(config: LabelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    /// 가격 소스에서 필요한 구간을 조회하여 라벨을 생성합니다.
    pub async fn generate_labels<S>(
        &self,
        source: &S,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<EventLabel>>
    where
        S: PriceSource + ?Sized,
    {
        if start > end {
            return Err(PipelineError::InvalidInput(format!(
                "start ({start}) > end ({end})"
            )));
        }

        let (fetch_start, fetch_end) = fetch_range(start, end, &self.config);
        info!(
            instrument = %instrument,
            %start,
            %end,
            %fetch_start,
            %fetch_end,
            "Generating labels"
        );

        let points = source.get_prices(instrument, fetch_start, fetch_end).await?;
        debug!(instrument = %instrument, observations = points.len(), "Fetched prices");

        compute_labels(instrument, points, start, end, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn config(threshold: Decimal) -> LabelConfig {
        LabelConfig {
            window_days: 3,
            threshold,
            max_fill_days: 15,
        }
    }

    #[test]
    fn test_forward_fill_respects_horizon() {
        let points = vec![PricePoint::new(day(1), dec!(10.00))];
        let filled = FilledSeries::build(&points, day(1), day(20), 3);

        assert_eq!(filled.len(), 20);
        assert_eq!(filled.get(day(1)), Some(dec!(10.00)));
        assert_eq!(filled.get(day(4)), Some(dec!(10.00)));
        assert_eq!(filled.get(day(5)), None);
        assert_eq!(filled.get(day(21)), None);
    }

    #[test]
    fn test_forward_fill_uses_observation_before_range() {
        let points = vec![PricePoint::new(day(1), dec!(10.00))];
        let filled = FilledSeries::build(&points, day(3), day(5), 15);
        assert_eq!(filled.get(day(3)), Some(dec!(10.00)));
    }

    #[test]
    fn test_missing_reference_is_skipped() {
        let points = vec![PricePoint::new(day(5), dec!(10.00))];
        let filled = FilledSeries::build(&points, day(1), day(10), 15);
        let inst = Instrument::new("benzin");
        assert!(label_for_day(&inst, day(2), &filled, &config(dec!(0.15))).is_none());
        assert!(label_for_day(&inst, day(5), &filled, &config(dec!(0.15))).is_some());
    }

    #[test]
    fn test_net_amount_uses_window_end() {
        let points = vec![
            PricePoint::new(day(1), dec!(10.00)),
            PricePoint::new(day(2), dec!(10.50)),
            PricePoint::new(day(4), dec!(10.20)),
        ];
        let filled = FilledSeries::build(&points, day(1), day(4), 15);
        let label = label_for_day(&Instrument::new("lpg"), day(1), &filled, &config(dec!(0.15)))
            .unwrap();

        assert_eq!(label.binary_flag, 1);
        assert_eq!(label.event_kind, EventKind::Daily);
        assert_eq!(label.first_event_amount, dec!(0.50));
        assert_eq!(label.net_amount, dec!(0.20));
        assert_eq!(label.window_end_date, day(4));
    }

    #[test]
    fn test_start_after_end_is_invalid() {
        let err = compute_labels(
            &Instrument::new("benzin"),
            vec![PricePoint::new(day(1), dec!(1))],
            day(5),
            day(4),
            &config(dec!(0.15)),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
