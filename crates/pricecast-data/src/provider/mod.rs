//! 외부 데이터 소스 구현.

pub mod csv;

pub use self::csv::{CsvFeatureSource, CsvPriceSource};
