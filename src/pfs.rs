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

//! The top-level facade wiring the repo manager, commit manager, diff layer,
//! and subscriber together over one pair of injected store handles.

use std::sync::Arc;

use crate::block::BlockStore;
use crate::commit::CommitManager;
use crate::diff::DiffLayer;
use crate::repo::RepoManager;
use crate::store::MetadataStore;
use crate::subscribe::Subscriber;

/// The versioned file system core (spec §1): constructed once per process
/// from a metadata adapter and a block-store client, both externally owned.
#[derive(Debug)]
pub struct Pfs {
    pub repos: RepoManager,
    pub commits: Arc<CommitManager>,
    pub diffs: DiffLayer,
    pub subscriber: Subscriber,
}

impl Pfs {
    pub fn new(store: Arc<dyn MetadataStore>, blocks: Arc<dyn BlockStore>) -> Self {
        let commits = Arc::new(CommitManager::new(store.clone()));
        let diffs = DiffLayer::new(store.clone(), blocks, commits.clone());
        let subscriber = Subscriber::new(store.clone(), commits.clone());
        Self {
            repos: RepoManager::new(store),
            commits,
            diffs,
            subscriber,
        }
    }

    /// Convenience constructor wiring the in-memory reference
    /// implementations of both external collaborators (spec §1's "out of
    /// scope" block store and metadata adapter) — for tests and embedders
    /// who don't need durability.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::store::memory::MemoryStore::new()),
            Arc::new(crate::block::MemoryBlockStore::new()),
        )
    }
}
