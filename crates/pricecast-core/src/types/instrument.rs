//! 상품(instrument) 식별자.
//!
//! 추적 대상 상품(예: `benzin`, `motorin`, `lpg`)을 나타내는 소문자 코드입니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 추적 대상 상품 코드.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    /// 새 상품 코드를 생성합니다. 앞뒤 공백은 제거되고 소문자로 정규화됩니다.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_lowercase())
    }

    /// 코드 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 빈 코드인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Instrument {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Instrument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
