//! 일별 기준 가격 관측치.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 하루의 가격 관측치.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// 관측 날짜
    pub date: NaiveDate,
    /// 가격
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: Decimal) -> Self {
        Self { date, price }
    }
}

/// 날짜 기준으로 정렬하고 같은 날짜는 마지막 관측치만 남깁니다.
pub fn normalize_prices(mut points: Vec<PricePoint>) -> Vec<PricePoint> {
    points.sort_by_key(|p| p.date);
    let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(last) if last.date == p.date => *last = p,
            _ => out.push(p),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let points = vec![
            PricePoint::new(d(3), dec!(58.10)),
            PricePoint::new(d(1), dec!(58.00)),
            PricePoint::new(d(3), dec!(58.20)),
        ];
        let out = normalize_prices(points);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, d(1));
        assert_eq!(out[1].price, dec!(58.20));
    }
}
