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

//! The metadata adapter (spec §6) — a thin, generic layer over an indexed
//! document store. Domain modules (`repo`, `commit`, `diff`) build typed
//! queries on top of this, per spec §9's "express as a small strongly-typed
//! query builder over the adapter abstraction, not as ad-hoc string
//! composition."

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::StoreError;

/// The four tables named in spec §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Repos,
    Commits,
    Diffs,
    Clocks,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Repos => "Repos",
            Table::Commits => "Commits",
            Table::Diffs => "Diffs",
            Table::Clocks => "Clocks",
        }
    }
}

/// A primary or secondary-index key: raw bytes compared lexicographically,
/// so callers encode fixed-width big-endian integers to keep numeric fields
/// in numeric order (see `encode_u64`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub Vec<u8>);

impl Key {
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut buf = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                buf.push(0x1f); // unit separator
            }
            buf.extend_from_slice(part);
        }
        Self(buf)
    }
}

/// Encodes `n` so that byte-lexicographic order matches numeric order.
pub fn encode_u64(n: u64) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

/// A secondary-index registration supplied by the caller at insert time.
/// Domain modules (`repo`, `commit`, `diff`) know their own index keys; the
/// generic store only stores and scans them (spec §9: query composition
/// lives above the adapter, not inside it).
#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub index: &'static str,
    pub key: Key,
}

/// A stored document: its key, its JSON value, and the monotone sequence
/// number assigned at insertion (used as the subscription resume token,
/// spec §4.5/§9).
#[derive(Clone, Debug)]
pub struct Row {
    pub key: Key,
    pub value: Value,
    pub seq: u64,
}

/// Conflict policy for `insert` (spec §6).
#[derive(Clone)]
pub enum OnConflict {
    Fail,
    Replace,
    Update,
    /// `(key, old, new) -> new`.
    Merge(Arc<dyn Fn(&Key, &Value, &Value) -> Value + Send + Sync>),
}

impl std::fmt::Debug for OnConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnConflict::Fail => write!(f, "Fail"),
            OnConflict::Replace => write!(f, "Replace"),
            OnConflict::Update => write!(f, "Update"),
            OnConflict::Merge(_) => write!(f, "Merge(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// One operation within a [`MetadataStore::transact`] call.
#[derive(Clone, Debug)]
pub enum Op {
    Insert {
        table: Table,
        key: Key,
        value: Value,
        on_conflict: OnConflict,
        index_entries: Vec<IndexEntry>,
    },
    Update {
        table: Table,
        key: Key,
        patch: Value,
    },
    Delete {
        table: Table,
        key: Key,
    },
}

impl Op {
    pub(crate) fn table(&self) -> Table {
        match self {
            Op::Insert { table, .. } | Op::Update { table, .. } | Op::Delete { table, .. } => *table,
        }
    }
}

/// A change-feed event.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub row: Row,
    pub deleted: bool,
}

/// A predicate over a row's value, used to filter `RangeByIndex` and
/// `ChangeFeed` results.
pub type RowFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// The metadata adapter consumed by the core (spec §6). Required operations:
/// `Get`, `Insert`, `Update`, `Delete`, `RangeByIndex`, `ChangeFeed`,
/// `Transaction`.
#[async_trait]
pub trait MetadataStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, table: Table, key: &Key) -> Result<Option<Row>, StoreError>;

    /// Full table scan, used by operations with no narrower index to use
    /// (e.g. `ListRepo`, spec §4.2).
    async fn scan(&self, table: Table) -> Result<Vec<Row>, StoreError>;

    /// Inserts `value` at `key`, registering any secondary-index entries it
    /// participates in. Pass an empty `index_entries` for records with no
    /// secondary index use.
    async fn insert(
        &self,
        table: Table,
        key: Key,
        value: Value,
        on_conflict: OnConflict,
        index_entries: Vec<IndexEntry>,
    ) -> Result<Row, StoreError>;

    async fn update(&self, table: Table, key: &Key, patch: Value) -> Result<Row, StoreError>;

    /// Atomically adds `delta` to the numeric field named `field` on the
    /// record at `key`, returning its new value (spec §5's "atomic add on the
    /// repo record").
    async fn increment(
        &self,
        table: Table,
        key: &Key,
        field: &'static str,
        delta: i64,
    ) -> Result<i64, StoreError>;

    async fn delete(&self, table: Table, key: &Key) -> Result<(), StoreError>;

    /// Scans `index` on `table` for keys in `[lo, hi]` (both inclusive).
    async fn range_by_index(
        &self,
        table: Table,
        index: &'static str,
        lo: Key,
        hi: Key,
        order: Order,
    ) -> Result<Vec<Row>, StoreError>;

    /// Opens a change feed on `table`, filtered by `filter`. If
    /// `include_initial`, the first items delivered are a snapshot of
    /// currently-matching rows (at the instant the feed opens), after which
    /// new matching writes are tailed — an atomic "snapshot then tail",
    /// per spec §9.
    async fn change_feed(
        &self,
        table: Table,
        filter: RowFilter,
        include_initial: bool,
    ) -> BoxStream<'static, ChangeEvent>;

    /// Multi-record atomic write, at minimum across `Repos`/`Commits`/
    /// `Diffs`/`Clocks` within one repo scope (spec §6).
    async fn transact(&self, ops: Vec<Op>) -> Result<(), StoreError>;
}
