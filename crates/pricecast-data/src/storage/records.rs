//! 라벨, 결정 기록, 알람 상태 저장소.
//!
//! 모든 쓰기는 키 기준 업서트입니다:
//! - 라벨: `(run_date, instrument)`
//! - 결정 기록: `(run_date, instrument, model_version)`

use async_trait::async_trait;
use chrono::NaiveDate;
use pricecast_core::{AlarmState, DecisionRecord, EventLabel, Instrument};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::write_atomic;
use crate::error::Result;

type LabelKey = (Instrument, NaiveDate);
type DecisionKey = (NaiveDate, Instrument, String);

/// 레코드 저장소 trait.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 라벨을 업서트하고 처리한 개수를 반환합니다.
    async fn upsert_labels(&self, labels: &[EventLabel]) -> Result<usize>;

    /// `[start, end]` 구간의 라벨을 날짜순으로 조회합니다.
    async fn get_labels(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<EventLabel>>;

    /// 결정 기록을 업서트합니다.
    async fn upsert_decision(&self, record: &DecisionRecord) -> Result<()>;

    /// 상품의 결정 기록을 날짜순으로 조회합니다.
    async fn get_decisions(&self, instrument: &Instrument) -> Result<Vec<DecisionRecord>>;

    /// 알람 상태를 로드합니다. 저장된 적이 없으면 빈 상태.
    async fn load_alarm_state(&self) -> Result<AlarmState>;

    /// 알람 상태를 저장합니다.
    async fn save_alarm_state(&self, state: &AlarmState) -> Result<()>;
}

fn merge_labels(map: &mut BTreeMap<LabelKey, EventLabel>, labels: &[EventLabel]) -> usize {
    for label in labels {
        map.insert((label.instrument.clone(), label.run_date), label.clone());
    }
    labels.len()
}

fn select_labels(
    map: &BTreeMap<LabelKey, EventLabel>,
    instrument: &Instrument,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<EventLabel> {
    if start > end {
        return Vec::new();
    }
    map.range((instrument.clone(), start)..=(instrument.clone(), end))
        .map(|(_, l)| l.clone())
        .collect()
}

fn select_decisions(
    map: &BTreeMap<DecisionKey, DecisionRecord>,
    instrument: &Instrument,
) -> Vec<DecisionRecord> {
    map.values()
        .filter(|r| &r.instrument == instrument)
        .cloned()
        .collect()
}

/// 인메모리 레코드 저장소.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    labels: RwLock<BTreeMap<LabelKey, EventLabel>>,
    decisions: RwLock<BTreeMap<DecisionKey, DecisionRecord>>,
    alarm_state: RwLock<AlarmState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert_labels(&self, labels: &[EventLabel]) -> Result<usize> {
        let mut map = self.labels.write().await;
        Ok(merge_labels(&mut map, labels))
    }

    async fn get_labels(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<EventLabel>> {
        Ok(select_labels(&*self.labels.read().await, instrument, start, end))
    }

    async fn upsert_decision(&self, record: &DecisionRecord) -> Result<()> {
        self.decisions
            .write()
            .await
            .insert(record.key(), record.clone());
        Ok(())
    }

    async fn get_decisions(&self, instrument: &Instrument) -> Result<Vec<DecisionRecord>> {
        Ok(select_decisions(&*self.decisions.read().await, instrument))
    }

    async fn load_alarm_state(&self) -> Result<AlarmState> {
        Ok(self.alarm_state.read().await.clone())
    }

    async fn save_alarm_state(&self, state: &AlarmState) -> Result<()> {
        *self.alarm_state.write().await = state.clone();
        Ok(())
    }
}

const LABELS_FILE: &str = "labels.json";
const DECISIONS_FILE: &str = "decisions.json";
const ALARM_STATE_FILE: &str = "alarm_state.json";

/// JSON 파일 기반 레코드 저장소.
///
/// 각 종류의 레코드를 파일 하나에 배열로 저장합니다. 쓰기는 읽기-수정-쓰기이며
/// 프로세스 내에서는 잠금으로 직렬화됩니다.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        read_json_file(&self.dir.join(name)).await
    }

    async fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.dir.join(name), &bytes).await
    }

    async fn label_map(&self) -> Result<BTreeMap<LabelKey, EventLabel>> {
        let labels: Vec<EventLabel> = self.read_json(LABELS_FILE).await?;
        let mut map = BTreeMap::new();
        merge_labels(&mut map, &labels);
        Ok(map)
    }

    async fn decision_map(&self) -> Result<BTreeMap<DecisionKey, DecisionRecord>> {
        let records: Vec<DecisionRecord> = self.read_json(DECISIONS_FILE).await?;
        Ok(records.into_iter().map(|r| (r.key(), r)).collect())
    }
}

async fn read_json_file<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn upsert_labels(&self, labels: &[EventLabel]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.label_map().await?;
        let count = merge_labels(&mut map, labels);
        let all: Vec<&EventLabel> = map.values().collect();
        self.write_json(LABELS_FILE, &all).await?;
        debug!(count, total = all.len(), "Labels upserted");
        Ok(count)
    }

    async fn get_labels(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<EventLabel>> {
        let map = self.label_map().await?;
        Ok(select_labels(&map, instrument, start, end))
    }

    async fn upsert_decision(&self, record: &DecisionRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.decision_map().await?;
        map.insert(record.key(), record.clone());
        let all: Vec<&DecisionRecord> = map.values().collect();
        self.write_json(DECISIONS_FILE, &all).await
    }

    async fn get_decisions(&self, instrument: &Instrument) -> Result<Vec<DecisionRecord>> {
        let map = self.decision_map().await?;
        Ok(select_decisions(&map, instrument))
    }

    async fn load_alarm_state(&self) -> Result<AlarmState> {
        self.read_json(ALARM_STATE_FILE).await
    }

    async fn save_alarm_state(&self, state: &AlarmState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(ALARM_STATE_FILE, state).await
    }
}
