//! CSV 파일 기반 가격/피처 소스.
//!
//! 예상 형식:
//!
//! ```text
//! date,instrument,price
//! 2024-01-01,benzin,42.15
//! ```
//!
//! ```text
//! date,instrument,mbe_value,risk_composite,...
//! 2024-01-01,benzin,-0.8,0.41,...
//! ```
//!
//! 피처 CSV의 빈 칸은 값 없음으로 처리됩니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use pricecast_core::{
    normalize_prices, FeatureRow, FeatureSource, Instrument, PipelineResult, PricePoint,
    PriceSource,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::{DataError, Result};

fn parse_date(raw: &str, line: usize) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| DataError::Parse {
        line,
        message: format!("invalid date '{}': {}", raw.trim(), e),
    })
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty() || line.trim_start().starts_with('#')
}

/// CSV 가격 소스.
#[derive(Debug, Clone, Default)]
pub struct CsvPriceSource {
    series: HashMap<Instrument, Vec<PricePoint>>,
}

impl CsvPriceSource {
    /// CSV 파일에서 로드합니다.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let source = Self::parse(&content)?;
        info!(
            path = %path.as_ref().display(),
            instruments = source.series.len(),
            "Price CSV loaded"
        );
        Ok(source)
    }

    /// CSV 문자열을 파싱합니다.
    pub fn parse(content: &str) -> Result<Self> {
        let mut series: HashMap<Instrument, Vec<PricePoint>> = HashMap::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            // 헤더 건너뛰기
            if idx == 0 && line.to_lowercase().starts_with("date") {
                continue;
            }
            if is_blank(line) {
                continue;
            }

            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() < 3 {
                return Err(DataError::Parse {
                    line: line_no,
                    message: format!("expected 3 columns, got {}", parts.len()),
                });
            }

            let date = parse_date(parts[0], line_no)?;
            let instrument = Instrument::new(parts[1]);
            let price = Decimal::from_str(parts[2].trim()).map_err(|e| DataError::Parse {
                line: line_no,
                message: format!("invalid price '{}': {}", parts[2].trim(), e),
            })?;

            series
                .entry(instrument)
                .or_default()
                .push(PricePoint::new(date, price));
        }

        let series = series
            .into_iter()
            .map(|(k, v)| (k, normalize_prices(v)))
            .collect();
        Ok(Self { series })
    }

    /// 한 상품의 관측치로 직접 생성합니다.
    pub fn from_points(instrument: Instrument, points: Vec<PricePoint>) -> Self {
        let mut series = HashMap::new();
        series.insert(instrument, normalize_prices(points));
        Self { series }
    }

    /// 포함된 상품 목록.
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut list: Vec<Instrument> = self.series.keys().cloned().collect();
        list.sort();
        list
    }
}

#[async_trait]
impl PriceSource for CsvPriceSource {
    async fn get_prices(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<PricePoint>> {
        Ok(self
            .series
            .get(instrument)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.date >= start && p.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// CSV 피처 소스.
#[derive(Debug, Clone, Default)]
pub struct CsvFeatureSource {
    rows: HashMap<Instrument, Vec<FeatureRow>>,
}

impl CsvFeatureSource {
    /// CSV 파일에서 로드합니다.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let source = Self::parse(&content)?;
        info!(
            path = %path.as_ref().display(),
            instruments = source.rows.len(),
            "Feature CSV loaded"
        );
        Ok(source)
    }

    /// CSV 문자열을 파싱합니다. 첫 줄은 반드시 헤더여야 합니다.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().enumerate();
        let header: Vec<String> = match lines.next() {
            Some((_, line)) => line.split(',').map(|s| s.trim().to_string()).collect(),
            None => return Ok(Self::default()),
        };
        if header.len() < 2
            || !header[0].eq_ignore_ascii_case("date")
            || !header[1].eq_ignore_ascii_case("instrument")
        {
            return Err(DataError::Parse {
                line: 1,
                message: "header must start with 'date,instrument'".to_string(),
            });
        }

        let mut rows: HashMap<Instrument, Vec<FeatureRow>> = HashMap::new();
        for (idx, line) in lines {
            let line_no = idx + 1;
            if is_blank(line) {
                continue;
            }
            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() != header.len() {
                return Err(DataError::Parse {
                    line: line_no,
                    message: format!("expected {} columns, got {}", header.len(), parts.len()),
                });
            }

            let date = parse_date(parts[0], line_no)?;
            let mut row = FeatureRow::new(date, Instrument::new(parts[1]));
            for (name, raw) in header.iter().zip(parts.iter()).skip(2) {
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                let value = raw.parse::<f64>().map_err(|e| DataError::Parse {
                    line: line_no,
                    message: format!("invalid value for '{}': {}", name, e),
                })?;
                row.values.insert(name.clone(), value);
            }
            rows.entry(row.instrument.clone()).or_default().push(row);
        }

        for list in rows.values_mut() {
            list.sort_by_key(|r| r.date);
            list.dedup_by(|later, earlier| {
                if later.date == earlier.date {
                    std::mem::swap(later, earlier);
                    true
                } else {
                    false
                }
            });
        }
        Ok(Self { rows })
    }

    /// 피처 행으로 직접 생성합니다.
    pub fn from_rows(rows: Vec<FeatureRow>) -> Self {
        let mut map: HashMap<Instrument, Vec<FeatureRow>> = HashMap::new();
        for row in rows {
            map.entry(row.instrument.clone()).or_default().push(row);
        }
        for list in map.values_mut() {
            list.sort_by_key(|r| r.date);
        }
        Self { rows: map }
    }
}

#[async_trait]
impl FeatureSource for CsvFeatureSource {
    async fn get_features(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineResult<Vec<FeatureRow>> {
        Ok(self
            .rows
            .get(instrument)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.date >= start && r.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_price_csv_filters_by_instrument_and_range() {
        let csv = "date,instrument,price\n\
                   2024-01-02,benzin,42.20\n\
                   2024-01-01,benzin,42.15\n\
                   2024-01-01,lpg,21.00\n\
                   \n\
                   2024-01-05,benzin,42.50\n";
        let source = CsvPriceSource::parse(csv).unwrap();
        let inst = Instrument::new("benzin");

        let prices = source
            .get_prices(&inst, d(2024, 1, 1), d(2024, 1, 3))
            .await
            .unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].price, dec!(42.15));
        assert_eq!(prices[1].date, d(2024, 1, 2));
        assert_eq!(source.instruments().len(), 2);
    }

    #[test]
    fn test_price_csv_bad_price_reports_line() {
        let csv = "date,instrument,price\n2024-01-01,benzin,abc\n";
        let err = CsvPriceSource::parse(csv).unwrap_err();
        assert!(matches!(err, DataError::Parse { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_feature_csv_blank_cells_are_missing() {
        let csv = "date,instrument,mbe_value,risk_composite\n\
                   2024-01-01,motorin,-1.2,\n\
                   2024-01-02,motorin,-0.9,0.71\n";
        let source = CsvFeatureSource::parse(csv).unwrap();
        let rows = source
            .get_features(&Instrument::new("motorin"), d(2024, 1, 1), d(2024, 1, 31))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("mbe_value"), Some(-1.2));
        assert_eq!(rows[0].get("risk_composite"), None);
        assert_eq!(rows[1].get("risk_composite"), Some(0.71));
    }

    #[test]
    fn test_feature_csv_requires_header() {
        let csv = "2024-01-01,motorin,1.0\n";
        assert!(CsvFeatureSource::parse(csv).is_err());
    }
}
