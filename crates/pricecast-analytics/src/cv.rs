//! Purged walk-forward 교차 검증.
//!
//! 학습 구간은 항상 0번 인덱스부터 시작해 폴드마다 `step`만큼 늘어나고(expanding
//! window), 학습 끝과 테스트 시작 사이에는 `embargo`일의 공백을 둡니다.
//! 라벨 창이 `W`일이면 `embargo >= W`여야 테스트 라벨이 학습에 새지 않습니다.
//!
//! 폴드 k:
//! - `train_end  = min_train - 1 + k * step`
//! - `test_start = train_end + embargo + 1`
//! - `test_end   = min(test_start + test - 1, n - 1)`

use std::fmt;
use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricecast_core::{CvConfig, PipelineError, PipelineResult};

/// 정렬된 날짜 인덱스 위의 학습/테스트 분할.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// 학습 인덱스 `[0, train_end]`
    pub train: Range<usize>,
    /// 테스트 인덱스 `[test_start, test_end]`
    pub test: Range<usize>,
}

impl Fold {
    pub fn train_indices(&self) -> Vec<usize> {
        self.train.clone().collect()
    }

    pub fn test_indices(&self) -> Vec<usize> {
        self.test.clone().collect()
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }

    /// 학습 마지막 인덱스와 테스트 첫 인덱스의 간격.
    pub fn gap(&self) -> usize {
        self.test.start.saturating_sub(self.train.end)
    }
}

/// 사람이 읽을 수 있는 폴드 정보.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldInfo {
    /// 1부터 시작하는 폴드 번호
    pub fold: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub train_size: usize,
    /// embargo가 0이면 없음
    pub embargo_start: Option<NaiveDate>,
    pub embargo_end: Option<NaiveDate>,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub test_size: usize,
}

/// Expanding window + embargo 교차 검증 분할기.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgedWalkForwardCv {
    min_train: usize,
    test_size: usize,
    step_size: usize,
    embargo: usize,
}

impl PurgedWalkForwardCv {
    /// 파라미터를 검증하여 분할기를 생성합니다.
    pub fn new(min_train: usize, test_size: usize, step_size: usize, embargo: usize) -> PipelineResult<Self> {
        if min_train < 1 {
            return Err(PipelineError::InvalidInput(format!(
                "min_train must be >= 1, got {min_train}"
            )));
        }
        if test_size < 1 {
            return Err(PipelineError::InvalidInput(format!(
                "test_size must be >= 1, got {test_size}"
            )));
        }
        if step_size < 1 {
            return Err(PipelineError::InvalidInput(format!(
                "step_size must be >= 1, got {step_size}"
            )));
        }

        Ok(Self {
            min_train,
            test_size,
            step_size,
            embargo,
        })
    }

    /// 설정에서 분할기를 생성합니다.
    pub fn from_config(config: &CvConfig) -> PipelineResult<Self> {
        Self::new(
            config.min_train_days,
            config.test_days,
            config.step_days,
            config.embargo_days,
        )
    }

    pub fn embargo(&self) -> usize {
        self.embargo
    }

    /// 폴드를 하나라도 만들기 위한 최소 날짜 수.
    pub fn min_required(&self) -> usize {
        self.min_train + self.embargo + 1
    }

    /// `n`개의 정렬된 날짜에 대한 폴드를 생성합니다. 데이터가 부족하면 빈 목록.
    pub fn split(&self, n: usize) -> Vec<Fold> {
        let mut folds = Vec::new();
        let mut k = 0usize;

        loop {
            let train_end = self.min_train - 1 + k * self.step_size;
            if train_end >= n {
                break;
            }

            let test_start = train_end + self.embargo + 1;
            if test_start >= n {
                break;
            }

            let test_end = (test_start + self.test_size - 1).min(n - 1);
            folds.push(Fold {
                train: 0..train_end + 1,
                test: test_start..test_end + 1,
            });
            k += 1;
        }

        folds
    }

    /// 날짜 목록 기준 폴드 정보.
    pub fn fold_info(&self, dates: &[NaiveDate]) -> Vec<FoldInfo> {
        self.split(dates.len())
            .iter()
            .enumerate()
            .map(|(i, fold)| {
                let embargo_range = fold.train.end..fold.test.start;
                let (embargo_start, embargo_end) = if embargo_range.is_empty() {
                    (None, None)
                } else {
                    (
                        dates.get(embargo_range.start).copied(),
                        dates.get(embargo_range.end - 1).copied(),
                    )
                };

                FoldInfo {
                    fold: i + 1,
                    train_start: dates[fold.train.start],
                    train_end: dates[fold.train.end - 1],
                    train_size: fold.train_len(),
                    embargo_start,
                    embargo_end,
                    test_start: dates[fold.test.start],
                    test_end: dates[fold.test.end - 1],
                    test_size: fold.test_len(),
                }
            })
            .collect()
    }

    pub fn n_splits(&self, n: usize) -> usize {
        self.split(n).len()
    }
}

impl Default for PurgedWalkForwardCv {
    fn default() -> Self {
        let config = CvConfig::default();
        Self {
            min_train: config.min_train_days,
            test_size: config.test_days,
            step_size: config.step_days,
            embargo: config.embargo_days,
        }
    }
}

impl fmt::Display for PurgedWalkForwardCv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PurgedWalkForwardCv(min_train={}, test_size={}, step_size={}, embargo={})",
            self.min_train, self.test_size, self.step_size, self.embargo
        )
    }
}

/// 날짜 목록과 설정으로 폴드를 생성합니다.
pub fn split_folds(dates: &[NaiveDate], config: &CvConfig) -> PipelineResult<Vec<Fold>> {
    Ok(PurgedWalkForwardCv::from_config(config)?.split(dates.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameters() {
        assert!(PurgedWalkForwardCv::new(0, 90, 90, 4).is_err());
        assert!(PurgedWalkForwardCv::new(365, 0, 90, 4).is_err());
        assert!(PurgedWalkForwardCv::new(365, 90, 0, 4).is_err());
        assert!(PurgedWalkForwardCv::new(365, 90, 90, 0).is_ok());
    }

    #[test]
    fn test_empty_and_short_inputs() {
        let cv = PurgedWalkForwardCv::default();
        assert!(cv.split(0).is_empty());
        assert!(cv.split(300).is_empty());
        // 학습은 들어가지만 테스트 시작이 범위를 넘는 경우
        assert!(cv.split(369).is_empty());
        assert_eq!(cv.split(370).len(), 1);
    }

    #[test]
    fn test_small_split_layout() {
        let cv = PurgedWalkForwardCv::new(5, 3, 2, 1).unwrap();
        let folds = cv.split(12);

        assert_eq!(folds[0].train, 0..5);
        assert_eq!(folds[0].test, 6..9);
        assert_eq!(folds[1].train, 0..7);
        assert_eq!(folds[1].test, 8..11);
        // 마지막 폴드 테스트는 n-1에서 잘림
        assert_eq!(folds[2].train, 0..9);
        assert_eq!(folds[2].test, 10..12);
        assert_eq!(folds.len(), 3);
    }

    #[test]
    fn test_fold_info_embargo_bounds() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<_> = (0..12).map(|i| start + chrono::Duration::days(i)).collect();

        let info = PurgedWalkForwardCv::new(5, 3, 2, 1).unwrap().fold_info(&dates);
        assert_eq!(info[0].fold, 1);
        assert_eq!(info[0].train_end, dates[4]);
        assert_eq!(info[0].embargo_start, Some(dates[5]));
        assert_eq!(info[0].embargo_end, Some(dates[5]));
        assert_eq!(info[0].test_start, dates[6]);

        let no_embargo = PurgedWalkForwardCv::new(5, 3, 2, 0).unwrap().fold_info(&dates);
        assert_eq!(no_embargo[0].embargo_start, None);
    }
}
