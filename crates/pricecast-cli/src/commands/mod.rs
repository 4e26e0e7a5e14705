//! CLI 명령어 구현 모듈.

pub mod backtest;
pub mod folds;
pub mod labels;
pub mod predict;
pub mod train;

use anyhow::{Context, Result};
use chrono::NaiveDate;

/// `YYYY-MM-DD` 날짜를 파싱합니다.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format: {}. Expected YYYY-MM-DD", s))
}

/// 시작/종료 날짜 쌍을 파싱하고 순서를 확인합니다.
pub fn parse_range(from: &str, to: &str) -> Result<(NaiveDate, NaiveDate)> {
    let start = parse_date(from)?;
    let end = parse_date(to)?;
    if start > end {
        anyhow::bail!("Start date must be before end date ({} > {})", start, end);
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        let (start, end) = parse_range("2024-01-01", "2024-12-31").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        assert!(parse_range("2024-12-31", "2024-01-01").is_err());
        assert!(parse_date("2024/01/01").is_err());
    }
}
