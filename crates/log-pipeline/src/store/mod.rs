//! 색인 스토어 -- 용량 제한 레코드 보관 및 역색인 기반 키워드 검색
//!
//! [`IndexedStore`]는 최대 `capacity`개의 레코드를 삽입 순서대로 보관합니다.
//! 용량을 넘으면 가장 먼저 들어온 레코드부터 축출하며, 축출된 레코드는
//! 역색인의 모든 term에서 함께 제거됩니다.
//!
//! # 동시성
//! 단일 `RwLock`으로 보호됩니다. 삽입과 축출은 쓰기 잠금 한 번 안에서 끝나므로
//! 읽기 측은 중간 상태를 관찰하지 않습니다. 검색과 통계는 읽기 잠금을 사용합니다.
//!
//! # 검색 순위
//! 질의 term 중 레코드가 포함한 *서로 다른* term 수가 많을수록 앞에 오고,
//! 같으면 타임스탬프 최신순, 그래도 같으면 나중에 삽입된 순서입니다.

pub mod tokenizer;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use logharbor_core::metrics as m;
use logharbor_core::types::{LogLevel, LogRecord};

use crate::error::LogPipelineError;
use crate::filter::RecordFilter;

use self::tokenizer::record_terms;

/// 잠금 안쪽 상태
///
/// `records[i]`의 시퀀스 번호는 `next_seq - records.len() + i`입니다.
#[derive(Default)]
struct StoreInner {
    /// 보관 중인 레코드 (삽입 순서)
    records: VecDeque<Arc<LogRecord>>,
    /// 다음에 부여할 시퀀스 번호
    next_seq: u64,
    /// term -> 시퀀스 번호 집합
    index: HashMap<String, HashSet<u64>>,
    /// 시퀀스 번호 -> 색인된 term 목록 (축출용 역참조)
    terms: HashMap<u64, Vec<String>>,
    /// 지금까지 삽입된 총 레코드 수 (축출 포함)
    total_count: u64,
}

impl StoreInner {
    fn front_seq(&self) -> u64 {
        self.next_seq - self.records.len() as u64
    }

    fn get(&self, seq: u64) -> Option<&Arc<LogRecord>> {
        let offset = seq.checked_sub(self.front_seq())?;
        self.records.get(usize::try_from(offset).ok()?)
    }

    fn insert(&mut self, record: Arc<LogRecord>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let terms = record_terms(&record);
        for term in &terms {
            self.index.entry(term.clone()).or_default().insert(seq);
        }
        self.terms.insert(seq, terms);
        self.records.push_back(record);
    }

    fn evict_oldest(&mut self) -> Option<Arc<LogRecord>> {
        let seq = self.front_seq();
        let record = self.records.pop_front()?;

        for term in self.terms.remove(&seq).unwrap_or_default() {
            if let Some(seqs) = self.index.get_mut(&term) {
                seqs.remove(&seq);
                if seqs.is_empty() {
                    self.index.remove(&term);
                }
            }
        }
        Some(record)
    }

    fn enumerate(&self) -> impl Iterator<Item = (u64, &Arc<LogRecord>)> {
        let front = self.front_seq();
        self.records
            .iter()
            .enumerate()
            .map(move |(i, record)| (front + i as u64, record))
    }
}

/// (시퀀스, 레코드)를 타임스탬프 최신순으로 정렬해 최대 `limit`개 반환
fn newest_first<'a>(
    candidates: impl Iterator<Item = (u64, &'a Arc<LogRecord>)>,
    limit: usize,
) -> Vec<Arc<LogRecord>> {
    let mut sorted: Vec<_> = candidates.collect();
    sorted.sort_by(|(a_seq, a), (b_seq, b)| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b_seq.cmp(a_seq))
    });
    sorted
        .into_iter()
        .take(limit)
        .map(|(_, record)| Arc::clone(record))
        .collect()
}

/// 색인 스토어
pub struct IndexedStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
}

impl IndexedStore {
    /// 새 스토어를 생성합니다. `capacity`는 최소 1로 보정됩니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// 레코드 한 건을 저장합니다.
    pub fn store(&self, record: impl Into<Arc<LogRecord>>) -> Result<(), LogPipelineError> {
        self.store_batch(&[record.into()])
    }

    /// 레코드 묶음을 주어진 순서대로 저장합니다.
    ///
    /// 공간이 부족하면 가장 오래된 레코드부터 축출합니다. 용량보다 큰 묶음은
    /// 뒤쪽 `capacity`개만 보관됩니다 (앞쪽은 저장 즉시 축출된 것으로 집계).
    pub fn store_batch(&self, batch: &[Arc<LogRecord>]) -> Result<(), LogPipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let skipped = batch.len().saturating_sub(self.capacity);
        let incoming = &batch[skipped..];

        let mut inner = self.write()?;
        let mut evicted = 0usize;
        while inner.records.len() + incoming.len() > self.capacity {
            if inner.evict_oldest().is_none() {
                break;
            }
            evicted += 1;
        }

        for record in incoming {
            inner.insert(Arc::clone(record));
        }
        inner.total_count += batch.len() as u64;

        let size = inner.records.len();
        let term_count = inner.index.len();
        let total = inner.total_count;
        drop(inner);

        let evicted = evicted + skipped;
        metrics::counter!(m::STORE_RECORDS_STORED_TOTAL).increment(batch.len() as u64);
        if evicted > 0 {
            metrics::counter!(m::STORE_RECORDS_EVICTED_TOTAL).increment(evicted as u64);
        }
        metrics::gauge!(m::STORE_SIZE).set(size as f64);
        metrics::gauge!(m::STORE_INDEX_TERMS).set(term_count as f64);

        tracing::debug!(
            stored = batch.len(),
            evicted,
            size,
            total,
            "stored batch"
        );
        Ok(())
    }

    /// 키워드 검색
    ///
    /// 빈 질의는 최신 레코드 `limit`개를 반환합니다.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Arc<LogRecord>> {
        let inner = self.read();

        let terms: HashSet<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return newest_first(inner.enumerate(), limit);
        }

        let mut scores: HashMap<u64, usize> = HashMap::new();
        for term in &terms {
            if let Some(seqs) = inner.index.get(term) {
                for seq in seqs {
                    *scores.entry(*seq).or_default() += 1;
                }
            }
        }

        let mut hits: Vec<(usize, u64, &Arc<LogRecord>)> = scores
            .into_iter()
            .filter_map(|(seq, score)| inner.get(seq).map(|record| (score, seq, record)))
            .collect();
        hits.sort_by(|(a_score, a_seq, a), (b_score, b_seq, b)| {
            b_score
                .cmp(a_score)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| b_seq.cmp(a_seq))
        });

        hits.into_iter()
            .take(limit)
            .map(|(_, _, record)| Arc::clone(record))
            .collect()
    }

    /// 필터와 일치하는 레코드를 최신순으로 최대 `limit`개 반환합니다.
    pub fn filter(&self, filter: &RecordFilter, limit: usize) -> Vec<Arc<LogRecord>> {
        let inner = self.read();
        newest_first(
            inner.enumerate().filter(|(_, record)| filter.matches(record)),
            limit,
        )
    }

    /// 타임스탬프 최신순 레코드 `count`개
    pub fn recent(&self, count: usize) -> Vec<Arc<LogRecord>> {
        let inner = self.read();
        newest_first(inner.enumerate(), count)
    }

    /// 보관 중인 레코드의 레벨별 개수
    pub fn level_statistics(&self) -> BTreeMap<LogLevel, u64> {
        let inner = self.read();
        let mut stats = BTreeMap::new();
        for record in &inner.records {
            *stats.entry(record.level).or_insert(0) += 1;
        }
        stats
    }

    /// 지금까지 삽입된 총 레코드 수 (축출된 레코드 포함)
    pub fn total_count(&self) -> u64 {
        self.read().total_count
    }

    /// 현재 보관 중인 레코드 수
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    /// 보관 중인 레코드가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// 최대 보관 수
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 역색인 term 수
    pub fn term_count(&self) -> usize {
        self.read().index.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>, LogPipelineError> {
        self.inner
            .write()
            .map_err(|_| LogPipelineError::LockPoisoned("indexed store".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn record(msg: &str) -> Arc<LogRecord> {
        Arc::new(LogRecord::new("app", msg, LogLevel::Info, msg))
    }

    fn record_at(msg: &str, secs: u64) -> Arc<LogRecord> {
        Arc::new(
            LogRecord::new("app", msg, LogLevel::Info, msg)
                .with_timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)),
        )
    }

    fn messages(records: &[Arc<LogRecord>]) -> Vec<&str> {
        records.iter().map(|r| r.message.as_str()).collect()
    }

    #[test]
    fn evicts_oldest_first() {
        let store = IndexedStore::new(3);
        for msg in ["alpha", "bravo", "charlie", "delta"] {
            store.store(record(msg)).unwrap();
        }

        assert_eq!(store.len(), 3);
        assert_eq!(store.total_count(), 4);
        assert!(store.search("alpha", 10).is_empty());
        assert_eq!(store.search("bravo", 10).len(), 1);
    }

    #[test]
    fn eviction_scrubs_index_terms() {
        let store = IndexedStore::new(1);
        store.store(record("unique-token-one")).unwrap();
        let before = store.term_count();
        store.store(record("another")).unwrap();

        assert!(before > 0);
        assert!(store.search("unique", 10).is_empty());
        // app, info, another
        assert_eq!(store.term_count(), 3);
    }

    #[test]
    fn oversized_batch_keeps_tail() {
        let store = IndexedStore::new(2);
        store.store(record("old")).unwrap();
        let batch: Vec<_> = ["one", "two", "three"].into_iter().map(record).collect();
        store.store_batch(&batch).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.total_count(), 4);
        assert!(store.search("one", 10).is_empty());
        assert!(store.search("old", 10).is_empty());
        assert_eq!(store.search("two", 10).len(), 1);
        assert_eq!(store.search("three", 10).len(), 1);
    }

    #[test]
    fn search_ranks_by_distinct_term_matches() {
        let store = IndexedStore::new(10);
        store.store(record_at("disk almost full", 1)).unwrap();
        store.store(record_at("disk check ok", 2)).unwrap();

        let hits = store.search("disk full", 10);
        assert_eq!(messages(&hits), ["disk almost full", "disk check ok"]);
    }

    #[test]
    fn duplicate_query_terms_count_once() {
        let store = IndexedStore::new(10);
        store.store(record_at("disk full", 1)).unwrap();
        store.store(record_at("disk disk disk", 2)).unwrap();

        let hits = store.search("disk disk full", 10);
        assert_eq!(hits[0].message, "disk full");
    }

    #[test]
    fn search_ties_broken_by_newest_timestamp() {
        let store = IndexedStore::new(10);
        store.store(record_at("cache miss early", 10)).unwrap();
        store.store(record_at("cache miss late", 20)).unwrap();
        store.store(record_at("cache miss middle", 15)).unwrap();

        let hits = store.search("cache", 10);
        assert_eq!(
            messages(&hits),
            ["cache miss late", "cache miss middle", "cache miss early"]
        );
    }

    #[test]
    fn search_is_case_insensitive_and_respects_limit() {
        let store = IndexedStore::new(10);
        for i in 0..5 {
            store.store(record_at(&format!("Request {i} served"), i)).unwrap();
        }
        let hits = store.search("REQUEST", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].message, "Request 4 served");
    }

    #[test]
    fn blank_query_returns_recent() {
        let store = IndexedStore::new(10);
        store.store(record_at("first", 1)).unwrap();
        store.store(record_at("third", 3)).unwrap();
        store.store(record_at("second", 2)).unwrap();

        let hits = store.search("   ", 2);
        assert_eq!(messages(&hits), ["third", "second"]);
        assert_eq!(messages(&store.recent(10)), ["third", "second", "first"]);
    }

    #[test]
    fn search_matches_source_level_and_fields() {
        let store = IndexedStore::new(10);
        store
            .store(Arc::new(
                LogRecord::new("billing", "", LogLevel::Warn, "slow query")
                    .with_field("table", "invoices"),
            ))
            .unwrap();

        assert_eq!(store.search("billing", 10).len(), 1);
        assert_eq!(store.search("warn", 10).len(), 1);
        assert_eq!(store.search("invoices", 10).len(), 1);
    }

    #[test]
    fn level_statistics_counts_retained_records() {
        let store = IndexedStore::new(3);
        for level in [LogLevel::Info, LogLevel::Error, LogLevel::Error, LogLevel::Warn] {
            store
                .store(Arc::new(LogRecord::new("app", "", level, "x")))
                .unwrap();
        }

        let stats = store.level_statistics();
        // 첫 번째 Info는 축출됨
        assert_eq!(stats.get(&LogLevel::Info), None);
        assert_eq!(stats.get(&LogLevel::Error), Some(&2));
        assert_eq!(stats.get(&LogLevel::Warn), Some(&1));
    }

    #[test]
    fn filter_returns_newest_matching() {
        let store = IndexedStore::new(10);
        store
            .store(Arc::new(
                LogRecord::new("api", "", LogLevel::Error, "a")
                    .with_timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(1)),
            ))
            .unwrap();
        store
            .store(Arc::new(
                LogRecord::new("api", "", LogLevel::Info, "b")
                    .with_timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(2)),
            ))
            .unwrap();
        store
            .store(Arc::new(
                LogRecord::new("api", "", LogLevel::Error, "c")
                    .with_timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(3)),
            ))
            .unwrap();

        let filter = RecordFilter::new().levels([LogLevel::Error]);
        assert_eq!(messages(&store.filter(&filter, 10)), ["c", "a"]);
        assert_eq!(messages(&store.filter(&filter, 1)), ["c"]);
    }

    #[test]
    fn empty_batch_is_noop() {
        let store = IndexedStore::new(3);
        store.store_batch(&[]).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.total_count(), 0);
    }
}
