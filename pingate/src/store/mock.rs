//! In-memory [`ContentStore`] for tests.
//!
//! Behaves like a content-addressed store out of the box (identical bytes give identical
//! identifiers, `pin_add` makes `pin_exists` true) and lets tests queue scripted results for
//! individual calls. Scripted results are consumed in FIFO order; once a queue is empty the
//! default behaviour applies again.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use super::{ChunkStream, ContentStore, EntryKind, Stat, StoreError};
use crate::types::Cid;

/// Record of a call made to the mock store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Add { name: String, size: usize },
    PinExists(Cid),
    PinAdd(Cid),
    Stat(Cid),
    Cat(Cid),
}

#[derive(Default)]
struct MockState {
    add_results: VecDeque<Result<Cid, StoreError>>,
    pin_exists_results: VecDeque<Result<bool, StoreError>>,
    pin_add_results: VecDeque<Result<(), StoreError>>,
    pin_add_failures_by_cid: HashMap<Cid, VecDeque<StoreError>>,
    stat_results: VecDeque<StoreError>,
    entries: HashMap<Cid, (Stat, Bytes)>,
    pinned: HashSet<Cid>,
    calls: Vec<MockCall>,
    add_delays_by_name: HashMap<String, Duration>,
    add_failures_by_name: HashMap<String, StoreError>,
    add_panics_by_name: HashSet<String>,
    adds_in_flight: usize,
    max_adds_in_flight: usize,
}

/// Mock content store for testing.
#[derive(Clone, Default)]
pub struct MockContentStore {
    state: Arc<Mutex<MockState>>,
}

impl MockContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier the mock assigns to `bytes` when no add result is scripted.
    pub fn cid_for(bytes: &[u8]) -> Cid {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Cid::new(format!("bafymock{:016x}", hasher.finish()))
    }

    /// Delay `add` calls for files named `name`.
    pub fn delay_add_for(&self, name: &str, delay: Duration) {
        self.state.lock().add_delays_by_name.insert(name.to_string(), delay);
    }

    /// Make every `add` of a file named `name` fail with `error`.
    pub fn fail_add_for(&self, name: &str, error: StoreError) {
        self.state.lock().add_failures_by_name.insert(name.to_string(), error);
    }

    /// Panic inside `add` for files named `name`, after the call is recorded.
    pub fn panic_add_for(&self, name: &str) {
        self.state.lock().add_panics_by_name.insert(name.to_string());
    }

    pub fn push_add_result(&self, result: Result<Cid, StoreError>) {
        self.state.lock().add_results.push_back(result);
    }

    pub fn push_pin_exists_result(&self, result: Result<bool, StoreError>) {
        self.state.lock().pin_exists_results.push_back(result);
    }

    /// Make the next `times` pin attempts fail with `error`.
    pub fn fail_pin_add(&self, times: usize, error: StoreError) {
        let mut state = self.state.lock();
        for _ in 0..times {
            state.pin_add_results.push_back(Err(error.clone()));
        }
    }

    /// Make the next `times` pin attempts for `cid` fail with `error`, leaving other identifiers alone.
    pub fn fail_pin_add_for(&self, cid: &Cid, times: usize, error: StoreError) {
        let mut state = self.state.lock();
        let failures = state.pin_add_failures_by_cid.entry(cid.clone()).or_default();
        failures.extend(std::iter::repeat_n(error, times));
    }

    /// Make the next `stat` call fail with `error`.
    pub fn push_stat_error(&self, error: StoreError) {
        self.state.lock().stat_results.push_back(error);
    }

    pub fn mark_pinned(&self, cid: &Cid) {
        self.state.lock().pinned.insert(cid.clone());
    }

    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.state.lock().pinned.contains(cid)
    }

    /// Store a file entry directly, bypassing `add`.
    pub fn insert_file(&self, cid: &Cid, name: Option<&str>, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        let stat = Stat {
            kind: EntryKind::File,
            name: name.map(str::to_string),
            size: Some(bytes.len() as u64),
        };
        self.state.lock().entries.insert(cid.clone(), (stat, bytes));
    }

    pub fn insert_directory(&self, cid: &Cid) {
        let stat = Stat {
            kind: EntryKind::Directory,
            name: None,
            size: None,
        };
        self.state.lock().entries.insert(cid.clone(), (stat, Bytes::new()));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn add_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Add { .. }))
    }

    pub fn pin_exists_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::PinExists(_)))
    }

    pub fn pin_add_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::PinAdd(_)))
    }

    pub fn pin_add_count_for(&self, cid: &Cid) -> usize {
        self.count(|call| matches!(call, MockCall::PinAdd(pinned) if pinned == cid))
    }

    pub fn cat_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Cat(_)))
    }

    /// Number of `add` calls currently running.
    pub fn adds_in_flight(&self) -> usize {
        self.state.lock().adds_in_flight
    }

    /// Highest number of `add` calls observed running at the same time.
    pub fn max_concurrent_adds(&self) -> usize {
        self.state.lock().max_adds_in_flight
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }
}

/// Counts an `add` as in flight until it returns or its future is dropped.
struct AddInFlight(Arc<Mutex<MockState>>);

impl AddInFlight {
    fn enter(state: &Arc<Mutex<MockState>>) -> Self {
        let mut guard = state.lock();
        guard.adds_in_flight += 1;
        guard.max_adds_in_flight = guard.max_adds_in_flight.max(guard.adds_in_flight);
        Self(state.clone())
    }
}

impl Drop for AddInFlight {
    fn drop(&mut self) {
        self.0.lock().adds_in_flight -= 1;
    }
}

#[async_trait]
impl ContentStore for MockContentStore {
    async fn add(&self, bytes: Bytes, name: &str) -> Result<Cid, StoreError> {
        let (delay, panics) = {
            let mut state = self.state.lock();
            state.calls.push(MockCall::Add {
                name: name.to_string(),
                size: bytes.len(),
            });
            (
                state.add_delays_by_name.get(name).copied(),
                state.add_panics_by_name.contains(name),
            )
        };

        let in_flight = AddInFlight::enter(&self.state);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        drop(in_flight);

        if panics {
            panic!("mock store panicked while adding {name}");
        }

        let mut state = self.state.lock();

        let failure = state.add_failures_by_name.get(name).cloned();
        let result = match failure {
            Some(error) => Err(error),
            None => state
                .add_results
                .pop_front()
                .unwrap_or_else(|| Ok(Self::cid_for(&bytes))),
        };

        if let Ok(cid) = &result {
            let stat = Stat {
                kind: EntryKind::File,
                name: Some(name.to_string()),
                size: Some(bytes.len() as u64),
            };
            state.entries.insert(cid.clone(), (stat, bytes));
        }
        result
    }

    async fn pin_exists(&self, cid: &Cid) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::PinExists(cid.clone()));
        match state.pin_exists_results.pop_front() {
            Some(result) => result,
            None => Ok(state.pinned.contains(cid)),
        }
    }

    async fn pin_add(&self, cid: &Cid) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::PinAdd(cid.clone()));
        let scripted = state.pin_add_failures_by_cid.get_mut(cid).and_then(VecDeque::pop_front);
        let result = match scripted {
            Some(error) => Err(error),
            None => state.pin_add_results.pop_front().unwrap_or(Ok(())),
        };
        if result.is_ok() {
            state.pinned.insert(cid.clone());
        }
        result
    }

    async fn stat(&self, cid: &Cid) -> Result<Stat, StoreError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Stat(cid.clone()));
        if let Some(error) = state.stat_results.pop_front() {
            return Err(error);
        }
        state
            .entries
            .get(cid)
            .map(|(stat, _)| stat.clone())
            .ok_or_else(|| StoreError::NotFound(format!("no such file: {cid}")))
    }

    async fn cat(&self, cid: &Cid) -> Result<ChunkStream, StoreError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Cat(cid.clone()));
        let bytes = match state.entries.get(cid) {
            Some((stat, bytes)) if stat.kind == EntryKind::File => bytes.clone(),
            Some(_) => return Err(StoreError::Api {
                status: 500,
                message: "this dag node is a directory".to_string(),
            }),
            None => return Err(StoreError::NotFound(format!("no such file: {cid}"))),
        };

        // Split into two chunks so consumers have to concatenate.
        let mid = bytes.len() / 2;
        let chunks = vec![Ok(bytes.slice(..mid)), Ok(bytes.slice(mid..))];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identical_content_gets_identical_cid() {
        let store = MockContentStore::new();
        let a = store.add(Bytes::from_static(b"same"), "a.json").await.unwrap();
        let b = store.add(Bytes::from_static(b"same"), "b.json").await.unwrap();
        let c = store.add(Bytes::from_static(b"other"), "c.json").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.add_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_pin_results_then_default() {
        let store = MockContentStore::new();
        let cid = Cid::new("bafyx");
        store.fail_pin_add(1, StoreError::Timeout("slow".to_string()));

        assert!(store.pin_add(&cid).await.is_err());
        assert!(!store.pin_exists(&cid).await.unwrap());
        assert!(store.pin_add(&cid).await.is_ok());
        assert!(store.pin_exists(&cid).await.unwrap());
        assert_eq!(store.pin_add_count(), 2);
    }

    #[tokio::test]
    async fn test_added_content_can_be_read_back() {
        let store = MockContentStore::new();
        let cid = store.add(Bytes::from_static(b"hello world"), "hello.json").await.unwrap();

        let stat = store.stat(&cid).await.unwrap();
        assert_eq!(stat.kind, EntryKind::File);
        assert_eq!(stat.name.as_deref(), Some("hello.json"));

        let chunks: Vec<_> = store.cat(&cid).await.unwrap().collect().await;
        let content: Vec<u8> = chunks.into_iter().flat_map(|c| c.unwrap().to_vec()).collect();
        assert_eq!(content, b"hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_add_is_no_longer_in_flight() {
        let store = MockContentStore::new();
        store.delay_add_for("slow.png", Duration::from_secs(10));

        let pending = store.add(Bytes::from_static(b"slow"), "slow.png");
        assert!(
            tokio::time::timeout(Duration::from_secs(1), pending).await.is_err(),
            "add should still be sleeping"
        );

        assert_eq!(store.adds_in_flight(), 0);
        assert_eq!(store.max_concurrent_adds(), 1);
    }

    #[tokio::test]
    async fn test_missing_content_is_not_found() {
        let store = MockContentStore::new();
        let err = store.stat(&Cid::new("bafymissing")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
