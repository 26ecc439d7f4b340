// Copyright 2026 The branchfs-core Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An in-memory [`MetadataStore`] reference implementation. The concurrency
//! shape (one lock-guarded registry per table, entries addressed by key) is
//! grounded on `examples/KiKaraage-schaltwerk`'s `DashMap`-backed lock
//! registries; tables use `Mutex<BTreeMap<..>>` rather than `DashMap` itself
//! because secondary-index range scans (`RangeByIndex`) need ordered
//! iteration, which `DashMap` does not provide. A `tokio::sync::broadcast`
//! channel per table stands in for a real change feed.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt as _;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::StoreError;
use crate::store::ChangeEvent;
use crate::store::IndexEntry;
use crate::store::Key;
use crate::store::MetadataStore;
use crate::store::OnConflict;
use crate::store::Op;
use crate::store::Order;
use crate::store::Row;
use crate::store::RowFilter;
use crate::store::Table;

const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Debug)]
struct TableState {
    rows: BTreeMap<Key, Row>,
    indexes: HashMap<&'static str, BTreeMap<Key, Vec<Key>>>,
    index_entries_by_key: HashMap<Key, Vec<IndexEntry>>,
    next_seq: u64,
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for TableState {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            rows: BTreeMap::new(),
            indexes: HashMap::new(),
            index_entries_by_key: HashMap::new(),
            next_seq: 0,
            tx,
        }
    }
}

impl TableState {
    fn remove_index_entries(&mut self, key: &Key) {
        if let Some(entries) = self.index_entries_by_key.remove(key) {
            for entry in entries {
                if let Some(bucket) = self.indexes.get_mut(entry.index) {
                    if let Some(keys) = bucket.get_mut(&entry.key) {
                        keys.retain(|k| k != key);
                        if keys.is_empty() {
                            bucket.remove(&entry.key);
                        }
                    }
                }
            }
        }
    }

    fn add_index_entries(&mut self, key: &Key, entries: Vec<IndexEntry>) {
        for entry in &entries {
            self.indexes
                .entry(entry.index)
                .or_default()
                .entry(entry.key.clone())
                .or_default()
                .push(key.clone());
        }
        self.index_entries_by_key.insert(key.clone(), entries);
    }

    fn put(&mut self, key: Key, value: Value, index_entries: Vec<IndexEntry>) -> Row {
        self.remove_index_entries(&key);
        // `seq` is a creation-order stamp, not a mutation counter: a row
        // already present keeps the `seq` it was first inserted with, so
        // later updates (e.g. FinishCommit) never change where it sorts.
        let seq = match self.rows.get(&key) {
            Some(existing) => existing.seq,
            None => {
                let s = self.next_seq;
                self.next_seq += 1;
                s
            }
        };
        let row = Row {
            key: key.clone(),
            value,
            seq,
        };
        self.rows.insert(key.clone(), row.clone());
        self.add_index_entries(&key, index_entries);
        let _ = self.tx.send(ChangeEvent {
            row: row.clone(),
            deleted: false,
        });
        row
    }

    fn remove(&mut self, key: &Key) -> Option<Row> {
        self.remove_index_entries(key);
        let removed = self.rows.remove(key);
        if let Some(row) = &removed {
            let _ = self.tx.send(ChangeEvent {
                row: row.clone(),
                deleted: true,
            });
        }
        removed
    }
}

/// In-memory reference implementation of [`MetadataStore`].
#[derive(Debug)]
pub struct MemoryStore {
    repos: Mutex<TableState>,
    commits: Mutex<TableState>,
    diffs: Mutex<TableState>,
    clocks: Mutex<TableState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            repos: Mutex::new(TableState::default()),
            commits: Mutex::new(TableState::default()),
            diffs: Mutex::new(TableState::default()),
            clocks: Mutex::new(TableState::default()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, table: Table) -> &Mutex<TableState> {
        match table {
            Table::Repos => &self.repos,
            Table::Commits => &self.commits,
            Table::Diffs => &self.diffs,
            Table::Clocks => &self.clocks,
        }
    }
}

fn insert_locked(
    state: &mut TableState,
    table_name: &'static str,
    key: Key,
    value: Value,
    on_conflict: OnConflict,
    index_entries: Vec<IndexEntry>,
) -> Result<Row, StoreError> {
    if let Some(existing) = state.rows.get(&key).cloned() {
        let merged = match on_conflict {
            OnConflict::Fail => {
                return Err(StoreError::Conflict { table: table_name });
            }
            OnConflict::Replace => value,
            OnConflict::Update => {
                let mut merged = existing.value.clone();
                merge_json(&mut merged, &value);
                merged
            }
            OnConflict::Merge(f) => f(&key, &existing.value, &value),
        };
        Ok(state.put(key, merged, index_entries))
    } else {
        Ok(state.put(key, value, index_entries))
    }
}

fn merge_json(dst: &mut Value, patch: &Value) {
    if let (Some(dst_obj), Some(patch_obj)) = (dst.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_obj {
            dst_obj.insert(k.clone(), v.clone());
        }
    } else {
        *dst = patch.clone();
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, table: Table, key: &Key) -> Result<Option<Row>, StoreError> {
        let state = self.state(table).lock().unwrap();
        Ok(state.rows.get(key).cloned())
    }

    async fn scan(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let state = self.state(table).lock().unwrap();
        Ok(state.rows.values().cloned().collect())
    }

    async fn insert(
        &self,
        table: Table,
        key: Key,
        value: Value,
        on_conflict: OnConflict,
        index_entries: Vec<IndexEntry>,
    ) -> Result<Row, StoreError> {
        let mut state = self.state(table).lock().unwrap();
        insert_locked(&mut state, table.name(), key, value, on_conflict, index_entries)
    }

    async fn update(&self, table: Table, key: &Key, patch: Value) -> Result<Row, StoreError> {
        let mut state = self.state(table).lock().unwrap();
        let existing = state
            .rows
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound { table: table.name() })?;
        let mut merged = existing.value.clone();
        merge_json(&mut merged, &patch);
        let entries = state.index_entries_by_key.get(key).cloned().unwrap_or_default();
        Ok(state.put(key.clone(), merged, entries))
    }

    async fn increment(
        &self,
        table: Table,
        key: &Key,
        field: &'static str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let mut state = self.state(table).lock().unwrap();
        let existing = state
            .rows
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound { table: table.name() })?;
        let mut merged = existing.value.clone();
        let current = merged.get(field).and_then(Value::as_i64).unwrap_or(0);
        let updated = current + delta;
        if let Some(obj) = merged.as_object_mut() {
            obj.insert(field.to_string(), Value::from(updated));
        }
        let entries = state.index_entries_by_key.get(key).cloned().unwrap_or_default();
        state.put(key.clone(), merged, entries);
        Ok(updated)
    }

    async fn delete(&self, table: Table, key: &Key) -> Result<(), StoreError> {
        let mut state = self.state(table).lock().unwrap();
        state.remove(key);
        Ok(())
    }

    async fn range_by_index(
        &self,
        table: Table,
        index: &'static str,
        lo: Key,
        hi: Key,
        order: Order,
    ) -> Result<Vec<Row>, StoreError> {
        let state = self.state(table).lock().unwrap();
        let Some(bucket) = state.indexes.get(index) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (_idx_key, primary_keys) in bucket.range(lo..=hi) {
            for pk in primary_keys {
                if let Some(row) = state.rows.get(pk) {
                    out.push(row.clone());
                }
            }
        }
        if order == Order::Desc {
            out.reverse();
        }
        Ok(out)
    }

    async fn change_feed(
        &self,
        table: Table,
        filter: RowFilter,
        include_initial: bool,
    ) -> BoxStream<'static, ChangeEvent> {
        let (initial, rx) = {
            let state = self.state(table).lock().unwrap();
            let initial = if include_initial {
                let mut rows: Vec<Row> = state.rows.values().filter(|row| filter(&row.value)).cloned().collect();
                // `rows` is keyed by primary key, not creation order; sort by
                // `seq` so the snapshot is delivered in insertion order.
                rows.sort_by_key(|row| row.seq);
                rows.into_iter().map(|row| ChangeEvent { row, deleted: false }).collect::<Vec<_>>()
            } else {
                Vec::new()
            };
            (initial, state.tx.subscribe())
        };
        let tail = BroadcastStream::new(rx)
            .filter_map(|r| async move { r.ok() })
            .filter(move |event| {
                let keep = filter(&event.row.value);
                async move { keep }
            });
        Box::pin(futures::stream::iter(initial).chain(tail))
    }

    async fn transact(&self, ops: Vec<Op>) -> Result<(), StoreError> {
        // Lock tables in a fixed order to avoid deadlocks across concurrent
        // transactions, then apply every op; on failure, nothing has been
        // mutated because guards for all four tables are held up front.
        let mut repos = self.repos.lock().unwrap();
        let mut commits = self.commits.lock().unwrap();
        let mut diffs = self.diffs.lock().unwrap();
        let mut clocks = self.clocks.lock().unwrap();

        for op in &ops {
            let state = match op.table() {
                Table::Repos => &mut *repos,
                Table::Commits => &mut *commits,
                Table::Diffs => &mut *diffs,
                Table::Clocks => &mut *clocks,
            };
            match op {
                Op::Insert {
                    key,
                    value,
                    on_conflict,
                    index_entries,
                    ..
                } => {
                    insert_locked(
                        state,
                        op.table().name(),
                        key.clone(),
                        value.clone(),
                        on_conflict.clone(),
                        index_entries.clone(),
                    )?;
                }
                Op::Update { key, patch, .. } => {
                    if let Some(existing) = state.rows.get(key).cloned() {
                        let mut merged = existing.value.clone();
                        merge_json(&mut merged, patch);
                        let entries = state.index_entries_by_key.get(key).cloned().unwrap_or_default();
                        state.put(key.clone(), merged, entries);
                    }
                }
                Op::Delete { key, .. } => {
                    state.remove(key);
                }
            }
        }
        Ok(())
    }
}
