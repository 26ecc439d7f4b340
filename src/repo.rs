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

//! The repo manager (spec §4.2): create/inspect/list/delete repositories.

use std::sync::Arc;
use std::sync::OnceLock;

use chrono::DateTime;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::error::CoreError;
use crate::error::CoreResult;
use crate::store::Key;
use crate::store::MetadataStore;
use crate::store::OnConflict;
use crate::store::Op;
use crate::store::Order;
use crate::store::Table;

/// `by_repo` index key shared by the `Commits`, `Diffs`, and `Clocks` tables,
/// used by [`RepoManager::delete_repo`] to find everything to purge.
pub(crate) const BY_REPO_INDEX: &str = "by_repo";

pub(crate) fn repo_index_key(repo: &str) -> Key {
    Key::from_parts(&[repo.as_bytes()])
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Repo {
    pub name: String,
    pub created: DateTime<Utc>,
    pub size_bytes: u64,
}

pub(crate) fn repo_key(name: &str) -> Key {
    Key::from_parts(&[name.as_bytes()])
}

fn is_valid_repo_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());
    !name.is_empty() && re.is_match(name)
}

/// Create/inspect/list/delete repositories (spec §4.2).
#[derive(Debug)]
pub struct RepoManager {
    store: Arc<dyn MetadataStore>,
}

impl RepoManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub async fn create_repo(&self, name: &str) -> CoreResult<Repo> {
        if !is_valid_repo_name(name) {
            return Err(CoreError::InvalidRepoName { name: name.to_string() });
        }
        let repo = Repo {
            name: name.to_string(),
            created: Utc::now(),
            size_bytes: 0,
        };
        let value = serde_json::to_value(&repo).expect("Repo is serializable");
        self.store
            .insert(Table::Repos, repo_key(name), value, OnConflict::Fail, Vec::new())
            .await
            .map_err(|_| CoreError::RepoExists { name: name.to_string() })?;
        info!(repo = name, "created repo");
        Ok(repo)
    }

    pub async fn inspect_repo(&self, name: &str) -> CoreResult<Repo> {
        let row = self
            .store
            .get(Table::Repos, &repo_key(name))
            .await
            .map_err(CoreError::Store)?
            .ok_or_else(|| CoreError::RepoNotFound { name: name.to_string() })?;
        Ok(serde_json::from_value(row.value).expect("stored Repo is well-formed"))
    }

    pub async fn list_repo(&self) -> CoreResult<Vec<Repo>> {
        let rows = self.store.scan(Table::Repos).await.map_err(CoreError::Store)?;
        let mut repos: Vec<Repo> = rows
            .into_iter()
            .map(|row| serde_json::from_value(row.value).expect("stored Repo is well-formed"))
            .collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    /// Atomically deletes the repo record and every commit, clock-id, and
    /// diff bearing `repo = name`, in the order diffs -> clocks -> commits ->
    /// repo (spec §4.2/§7), and in a way that is idempotent if re-run after a
    /// partial failure (all index scans are re-derived from current state,
    /// not cached).
    pub async fn delete_repo(&self, name: &str) -> CoreResult<()> {
        self.inspect_repo(name).await?;

        let index_key = repo_index_key(name);
        let diff_rows = self
            .store
            .range_by_index(Table::Diffs, BY_REPO_INDEX, index_key.clone(), index_key.clone(), Order::Asc)
            .await
            .map_err(CoreError::Store)?;
        let clock_rows = self
            .store
            .range_by_index(Table::Clocks, BY_REPO_INDEX, index_key.clone(), index_key.clone(), Order::Asc)
            .await
            .map_err(CoreError::Store)?;
        let commit_rows = self
            .store
            .range_by_index(Table::Commits, BY_REPO_INDEX, index_key.clone(), index_key.clone(), Order::Asc)
            .await
            .map_err(CoreError::Store)?;

        let mut ops = Vec::new();
        for row in diff_rows {
            ops.push(Op::Delete {
                table: Table::Diffs,
                key: row.key,
            });
        }
        for row in clock_rows {
            ops.push(Op::Delete {
                table: Table::Clocks,
                key: row.key,
            });
        }
        for row in commit_rows {
            ops.push(Op::Delete {
                table: Table::Commits,
                key: row.key,
            });
        }
        ops.push(Op::Delete {
            table: Table::Repos,
            key: repo_key(name),
        });

        self.store.transact(ops).await.map_err(CoreError::Store)?;
        info!(repo = name, "deleted repo");
        Ok(())
    }
}
