//! 가격 계산을 위한 Decimal 유틸리티.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// 정밀 가격 타입.
pub type Price = Decimal;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 부호를 -1, 0, +1로 반환합니다.
    fn signum_i8(&self) -> i8;

    /// 지정된 소수점 자릿수로 반올림합니다 (0.5는 0에서 멀어지는 방향).
    fn round_half_up(&self, dp: u32) -> Decimal;

    /// f64로 변환합니다. 표현할 수 없으면 0.0.
    fn to_f64_lossy(&self) -> f64;
}

impl DecimalExt for Decimal {
    fn signum_i8(&self) -> i8 {
        if self.is_zero() {
            0
        } else if self.is_sign_negative() {
            -1
        } else {
            1
        }
    }

    fn round_half_up(&self, dp: u32) -> Decimal {
        self.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
    }

    fn to_f64_lossy(&self) -> f64 {
        self.to_f64().unwrap_or(0.0)
    }
}

/// f64 값을 Decimal로 변환합니다 (비유한 값은 0).
pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

/// f64 값을 지정된 소수점 자릿수로 반올림합니다.
pub fn round_f64(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signum() {
        assert_eq!(dec!(0.30).signum_i8(), 1);
        assert_eq!(dec!(-0.01).signum_i8(), -1);
        assert_eq!(dec!(0).signum_i8(), 0);
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(dec!(0.125).round_half_up(2), dec!(0.13));
        assert_eq!(dec!(-0.125).round_half_up(2), dec!(-0.13));
    }

    #[test]
    fn test_round_f64() {
        assert_eq!(round_f64(0.123456789, 4), 0.1235);
        assert_eq!(round_f64(2.34, 1), 2.3);
    }
}
