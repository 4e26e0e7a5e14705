//! 이벤트 라벨.
//!
//! 기준일 D의 가격 대비 D+1..D+W 구간에서 임계값 이상의 변동이 있었는지를 기록합니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Instrument;

/// 첫 이벤트의 발생 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 이벤트 없음
    #[default]
    None,
    /// 하루 변동이 임계값 이상
    Daily,
    /// 기준가 대비 누적 변동이 임계값 이상
    Cumulative,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::None => write!(f, "none"),
            EventKind::Daily => write!(f, "daily"),
            EventKind::Cumulative => write!(f, "cumulative"),
        }
    }
}

/// 기준일 하나에 대한 이벤트 라벨.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLabel {
    /// 기준일
    pub run_date: NaiveDate,
    /// 상품
    pub instrument: Instrument,
    /// 이벤트 발생 여부 (0 또는 1)
    pub binary_flag: u8,
    /// 첫 이벤트 유형
    pub event_kind: EventKind,
    /// 첫 이벤트의 부호 있는 변동액 (이벤트 없으면 0)
    pub first_event_amount: Decimal,
    /// 첫 이벤트 방향 (-1, 0, +1)
    pub first_event_direction: i8,
    /// D+W 가격 - 기준가
    pub net_amount: Decimal,
    /// 기준가 (D의 forward-fill 값)
    pub reference_price: Decimal,
    /// 라벨 윈도우 끝 날짜 (D+W)
    pub window_end_date: NaiveDate,
}

impl EventLabel {
    /// 이벤트가 발생했는지 확인합니다.
    pub fn is_event(&self) -> bool {
        self.binary_flag == 1
    }
}
