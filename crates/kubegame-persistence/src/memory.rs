//! In-memory store and connector for tests and local runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use kubegame_core::BoxFuture;

use crate::connector::{ConnectTarget, StoreConnector};
use crate::error::{StoreError, StoreResult};
use crate::record::{InsertOutcome, WORLD_TABLE, WorldRecord, WorldStore};

#[derive(Default)]
struct MemoryState {
    tables: BTreeSet<String>,
    worlds: BTreeMap<String, WorldRecord>,
    fail_next: Option<String>,
}

/// A store that keeps its tables in a map.
#[derive(Default)]
pub struct MemoryWorldStore {
    state: Mutex<MemoryState>,
}

impl MemoryWorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, ordered by name.
    pub async fn records(&self) -> Vec<WorldRecord> {
        self.state.lock().await.worlds.values().cloned().collect()
    }

    pub async fn has_table(&self, table: &str) -> bool {
        self.state.lock().await.tables.contains(table)
    }

    /// Make the next operation fail with a query error.
    pub async fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().await.fail_next = Some(reason.into());
    }

    fn take_failure(state: &mut MemoryState) -> StoreResult<()> {
        match state.fail_next.take() {
            Some(reason) => Err(StoreError::Query(reason)),
            None => Ok(()),
        }
    }
}

impl WorldStore for MemoryWorldStore {
    fn table_exists<'a>(&'a self, table: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            Self::take_failure(&mut state)?;
            Ok(state.tables.contains(table))
        })
    }

    fn create_world_table(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            Self::take_failure(&mut state)?;
            state.tables.insert(WORLD_TABLE.to_string());
            Ok(())
        })
    }

    fn insert_world<'a>(
        &'a self,
        record: &'a WorldRecord,
    ) -> BoxFuture<'a, StoreResult<InsertOutcome>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            Self::take_failure(&mut state)?;
            if !state.tables.contains(WORLD_TABLE) {
                return Err(StoreError::Query(format!(
                    "relation \"{WORLD_TABLE}\" does not exist"
                )));
            }
            if state.worlds.contains_key(&record.name) {
                return Ok(InsertOutcome::AlreadyPresent);
            }
            state.worlds.insert(record.name.clone(), record.clone());
            Ok(InsertOutcome::Inserted)
        })
    }
}

/// Hands out one shared [`MemoryWorldStore`] and counts what it was asked.
#[derive(Default)]
pub struct MemoryConnector {
    store: Arc<MemoryWorldStore>,
    connects: AtomicUsize,
    invalidations: AtomicUsize,
    refuse: AtomicBool,
    last_target: StdMutex<Option<ConnectTarget>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared store every connect returns.
    pub fn store(&self) -> Arc<MemoryWorldStore> {
        Arc::clone(&self.store)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn invalidation_count(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Target of the most recent connect attempt.
    pub fn last_target(&self) -> Option<ConnectTarget> {
        self.last_target
            .lock()
            .map(|t| t.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// While set, every connect fails.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl StoreConnector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
    ) -> BoxFuture<'a, StoreResult<Arc<dyn WorldStore>>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.last_target.lock() {
                Ok(mut last) => *last = Some(target.clone()),
                Err(poisoned) => *poisoned.into_inner() = Some(target.clone()),
            }
            if self.refuse.load(Ordering::SeqCst) {
                return Err(StoreError::Connect(format!("{target}: connection refused")));
            }
            Ok(Arc::clone(&self.store) as Arc<dyn WorldStore>)
        })
    }

    fn invalidate<'a>(&'a self, _target: &'a ConnectTarget) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        })
    }
}
