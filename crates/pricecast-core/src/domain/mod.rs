//! 가격 변동 이벤트 파이프라인의 도메인 모델.

mod alarm;
mod feature;
mod label;
mod prediction;
mod price;
mod rule;
mod source;

pub use alarm::*;
pub use feature::*;
pub use label::*;
pub use prediction::*;
pub use price::*;
pub use rule::*;
pub use source::*;
