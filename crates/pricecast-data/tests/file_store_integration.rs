//! 파일 기반 저장소 통합 테스트.
//!
//! 임시 디렉토리에서 모델 번들 저장과 레코드 업서트를 확인합니다.

use chrono::{NaiveDate, TimeZone, Utc};
use pricecast_core::{
    AlarmDecision, AlarmState, DecisionRecord, EventKind, EventLabel, Instrument, RiskTrend,
};
use pricecast_data::storage::model_store::{load_bundle, save_bundle};
use pricecast_data::{DataError, FileModelStore, JsonFileRecordStore, ModelKey, ModelStore, RecordStore};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct DummyBundle {
    version: String,
    weights: Vec<f64>,
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

fn label(day: u32, flag: u8) -> EventLabel {
    EventLabel {
        run_date: d(day),
        instrument: Instrument::new("benzin"),
        binary_flag: flag,
        event_kind: if flag == 1 { EventKind::Daily } else { EventKind::None },
        first_event_amount: if flag == 1 { dec!(0.30) } else { dec!(0) },
        first_event_direction: flag as i8,
        net_amount: dec!(0.30) * rust_decimal::Decimal::from(flag),
        reference_price: dec!(58.00),
        window_end_date: d(day + 3),
    }
}

#[tokio::test]
async fn test_file_model_store_layout_and_latest() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileModelStore::new(dir.path());
    let inst = Instrument::new("motorin");

    let v1 = DummyBundle {
        version: "20240101T000000".into(),
        weights: vec![0.1, 0.2],
    };
    let key1 = ModelKey::new(inst.clone(), &v1.version);
    save_bundle(&store, &key1, &v1).await.unwrap();

    assert!(dir.path().join("motorin").join("20240101T000000.json").exists());
    assert!(!dir.path().join("motorin").join("20240101T000000.json.tmp").exists());

    let v2 = DummyBundle {
        version: "20240201T000000".into(),
        weights: vec![0.3],
    };
    let key2 = ModelKey::new(inst.clone(), &v2.version);
    save_bundle(&store, &key2, &v2).await.unwrap();

    let (latest_key, payload) = store.load_latest(&inst).await.unwrap();
    assert_eq!(latest_key, key2);
    let loaded: DummyBundle = serde_json::from_value(payload).unwrap();
    assert_eq!(loaded, v2);

    let older: DummyBundle = load_bundle(&store, &key1).await.unwrap();
    assert_eq!(older, v1);
    assert_eq!(store.list_versions(&inst).await.unwrap().len(), 2);

}

#[tokio::test]
async fn test_file_model_store_resave_is_upsert() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileModelStore::new(dir.path());
    let inst = Instrument::new("benzin");
    let key = ModelKey::new(inst.clone(), "v1");

    let first = DummyBundle {
        version: "v1".into(),
        weights: vec![0.1],
    };
    save_bundle(&store, &key, &first).await.unwrap();
    // 같은 내용으로 재시도해도 성공
    save_bundle(&store, &key, &first).await.unwrap();

    let retrained = DummyBundle {
        version: "v1".into(),
        weights: vec![0.7, 0.8],
    };
    save_bundle(&store, &key, &retrained).await.unwrap();

    let loaded: DummyBundle = load_bundle(&store, &key).await.unwrap();
    assert_eq!(loaded, retrained);
    assert_eq!(store.list_versions(&inst).await.unwrap(), vec!["v1"]);
    assert_eq!(store.latest_version(&inst).await.unwrap().as_deref(), Some("v1"));
    assert!(!dir.path().join("benzin").join("v1.json.tmp").exists());
}

#[tokio::test]
async fn test_file_model_store_missing_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileModelStore::new(dir.path());
    let key = ModelKey::new(Instrument::new("lpg"), "nope");

    assert!(matches!(store.load(&key).await, Err(DataError::NotFound(_))));
    assert!(store.latest_version(&key.instrument).await.unwrap().is_none());
    assert!(store.list_versions(&key.instrument).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_json_record_store_upserts() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileRecordStore::new(dir.path());
    let inst = Instrument::new("benzin");

    store.upsert_labels(&[label(1, 0), label(2, 1)]).await.unwrap();
    // 같은 키는 덮어씀
    store.upsert_labels(&[label(2, 0), label(3, 1)]).await.unwrap();

    let labels = store.get_labels(&inst, d(1), d(30)).await.unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels[1].binary_flag, 0);
    assert_eq!(store.get_labels(&inst, d(2), d(2)).await.unwrap().len(), 1);

    let record = DecisionRecord {
        run_date: d(10),
        instrument: inst.clone(),
        model_version: "v1".into(),
        raw_probability: 0.4,
        probability: 0.4,
        first_event_amount: Some(dec!(0.35)),
        first_event_direction: 1,
        net_amount: Some(dec!(0.40)),
        risk_trend: RiskTrend::Up,
        decision: AlarmDecision::no_alert(0.4),
        created_at: Utc.with_ymd_and_hms(2024, 6, 10, 18, 30, 0).unwrap(),
    };
    store.upsert_decision(&record).await.unwrap();
    let mut updated = record.clone();
    updated.probability = 0.5;
    store.upsert_decision(&updated).await.unwrap();

    let decisions = store.get_decisions(&inst).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].probability, 0.5);

    let mut state = AlarmState::new();
    state.record_alarm(inst.clone(), record.created_at);
    store.save_alarm_state(&state).await.unwrap();

    let reopened = JsonFileRecordStore::new(dir.path());
    let loaded = reopened.load_alarm_state().await.unwrap();
    assert_eq!(loaded.last_alarm_time(&inst), Some(record.created_at));
}
