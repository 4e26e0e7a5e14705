//! Purged walk-forward 분할 속성 테스트.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use pricecast_analytics::cv::{split_folds, PurgedWalkForwardCv};
use pricecast_core::CvConfig;

fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

#[test]
fn test_four_years_of_daily_data() {
    let config = CvConfig {
        min_train_days: 365,
        test_days: 90,
        step_days: 90,
        embargo_days: 4,
    };
    let folds = split_folds(&dates(1488), &config).unwrap();

    assert!((10..=14).contains(&folds.len()), "got {} folds", folds.len());
    assert_eq!(folds[0].train, 0..365);
    assert_eq!(folds[0].test.start, 369);
    assert_eq!(folds[0].test_len(), 90);
    assert!(folds.iter().all(|f| f.test.end <= 1488));
}

#[test]
fn test_fold_info_matches_dates() {
    let d = dates(500);
    let cv = PurgedWalkForwardCv::new(365, 90, 90, 4).unwrap();
    let info = cv.fold_info(&d);

    assert_eq!(info.len(), cv.n_splits(d.len()));
    assert_eq!(info[0].train_start, d[0]);
    assert_eq!(info[0].train_end, d[364]);
    assert_eq!(info[0].embargo_start, Some(d[365]));
    assert_eq!(info[0].embargo_end, Some(d[368]));
    assert_eq!(info[0].test_start, d[369]);
}

proptest! {
    #[test]
    fn prop_folds_are_purged_and_expanding(
        n in 0usize..800,
        min_train in 1usize..200,
        test_size in 1usize..60,
        step_size in 1usize..60,
        embargo in 0usize..10,
    ) {
        let cv = PurgedWalkForwardCv::new(min_train, test_size, step_size, embargo).unwrap();
        let folds = cv.split(n);

        let mut prev_train = 0usize;
        for fold in &folds {
            // 학습은 항상 0부터 시작하는 확장 구간
            prop_assert_eq!(fold.train.start, 0);
            prop_assert!(fold.train.len() > prev_train);
            prev_train = fold.train.len();

            prop_assert!(!fold.test.is_empty());
            prop_assert!(fold.test.len() <= test_size);
            prop_assert!(fold.test.end <= n);

            // 겹치지 않고 embargo 이상 떨어짐
            prop_assert!(fold.test.start >= fold.train.end + embargo);
            prop_assert_eq!(fold.test.start - (fold.train.end - 1), embargo + 1);
            prop_assert_eq!(fold.gap(), embargo);
        }

        if n < cv.min_required() {
            prop_assert!(folds.is_empty());
        } else {
            prop_assert!(!folds.is_empty());
        }
    }
}
