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

//! The commit manager (spec §4.3): start/finish/inspect/list commits, branch
//! head tracking, and commit-ref resolution built on top of the clock
//! algebra.

use std::sync::OnceLock;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use futures::StreamExt as _;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::clock::BranchClock;
use crate::error::CoreError;
use crate::error::CoreResult;
use crate::repo::repo_index_key;
use crate::repo::repo_key;
use crate::repo::BY_REPO_INDEX;
use crate::store::IndexEntry;
use crate::store::Key;
use crate::store::MetadataStore;
use crate::store::OnConflict;
use crate::store::Order;
use crate::store::Table;

/// `CommitBranch` index (spec §3): `(repo, branch, n) -> commit`.
pub(crate) const BRANCH_N_INDEX: &str = "by_branch_n";
/// `ClockBranch` index (spec §3): `(repo, branch) -> clock-id rows`, used for
/// head-of-branch lookup and branch enumeration.
pub(crate) const CLOCK_BRANCH_INDEX: &str = "by_repo_branch";
/// `DiffCommit` index (spec §3), shared with the diff layer: `commit_id ->
/// diffs`, used here only to sum sizes at finish.
pub(crate) const DIFF_COMMIT_INDEX: &str = "by_commit";

fn branch_n_key(repo: &str, branch: &str, n: u64) -> Key {
    Key::from_parts(&[repo.as_bytes(), branch.as_bytes(), &n.to_be_bytes()])
}

fn clock_branch_key(repo: &str, branch: &str) -> Key {
    Key::from_parts(&[repo.as_bytes(), branch.as_bytes()])
}

fn clock_id_key(repo: &str, branch: &str, n: u64) -> Key {
    branch_n_key(repo, branch, n)
}

fn commit_key(id: &str) -> Key {
    Key::from_parts(&[id.as_bytes()])
}

pub(crate) fn diff_commit_key(commit_id: &str) -> Key {
    Key::from_parts(&[commit_id.as_bytes()])
}

fn is_valid_branch_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());
    !name.is_empty() && re.is_match(name)
}

fn parse_alias(s: &str) -> Option<(&str, u64)> {
    let (branch, n) = s.rsplit_once('/')?;
    if !is_valid_branch_name(branch) {
        return None;
    }
    n.parse().ok().map(|n| (branch, n))
}

/// The `ClockID` record (spec §3): the mutex inserted exclusively at commit
/// start, and the branch's head pointer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClockIdRecord {
    pub repo: String,
    pub branch: String,
    pub n: u64,
    pub commit_id: String,
}

/// `WRITE` if the commit is unfinished, `READ` once finished (spec §4.3's
/// `InspectCommit`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitKind {
    Write,
    Read,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub repo: String,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub branch_clocks: Vec<BranchClock>,
    pub provenance: Vec<String>,
    pub size: u64,
}

impl Commit {
    /// The branch-clock this commit is canonically addressed by; commits
    /// created through this core always carry exactly one (merges, which
    /// would populate more than one, are unsupported — spec §4.3).
    fn primary(&self) -> &BranchClock {
        self.branch_clocks.first().expect("commit has at least one branch-clock")
    }

    pub fn branch(&self) -> &str {
        self.primary().branch_name()
    }

    /// The branch-clock this commit is canonically addressed by.
    pub fn branch_clock(&self) -> &BranchClock {
        self.primary()
    }
}

#[derive(Clone, Debug)]
pub struct CommitInfo {
    pub commit_id: String,
    pub branch: String,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub commit_type: CommitKind,
    pub size_bytes: u64,
}

#[derive(Clone, Debug)]
pub struct BranchHead {
    pub branch: String,
    pub head: Commit,
}

#[derive(Clone, Debug, Default)]
pub struct ListCommitQuery {
    pub commit_type: Option<CommitKind>,
    pub from: Option<String>,
    pub provenance: Vec<String>,
    pub include_cancelled: bool,
    pub block: bool,
}

fn commit_index_entries(repo: &str, id: &str, branch_clocks: &[BranchClock]) -> Vec<IndexEntry> {
    let mut entries = vec![IndexEntry {
        index: BY_REPO_INDEX,
        key: repo_index_key(repo),
    }];
    for bc in branch_clocks {
        entries.push(IndexEntry {
            index: BRANCH_N_INDEX,
            key: branch_n_key(repo, bc.branch_name(), bc.tail().n),
        });
    }
    let _ = id;
    entries
}

fn clock_index_entries(repo: &str, branch: &str) -> Vec<IndexEntry> {
    vec![
        IndexEntry {
            index: BY_REPO_INDEX,
            key: repo_index_key(repo),
        },
        IndexEntry {
            index: CLOCK_BRANCH_INDEX,
            key: clock_branch_key(repo, branch),
        },
    ]
}

/// Start/finish/inspect/list commits; branch head tracking (spec §4.3).
#[derive(Debug)]
pub struct CommitManager {
    store: Arc<dyn MetadataStore>,
}

impl CommitManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    async fn get_commit(&self, id: &str) -> CoreResult<Option<Commit>> {
        let row = self.store.get(Table::Commits, &commit_key(id)).await.map_err(CoreError::Store)?;
        Ok(row.map(|r| serde_json::from_value(r.value).expect("stored Commit is well-formed")))
    }

    async fn head_of_branch(&self, repo: &str, branch: &str) -> CoreResult<Option<Commit>> {
        let rows = self
            .store
            .range_by_index(
                Table::Clocks,
                CLOCK_BRANCH_INDEX,
                clock_branch_key(repo, branch),
                clock_branch_key(repo, branch),
                Order::Desc,
            )
            .await
            .map_err(CoreError::Store)?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let record: ClockIdRecord = serde_json::from_value(row.value.clone()).expect("stored ClockIdRecord is well-formed");
        self.get_commit(&record.commit_id).await
    }

    async fn commit_at_branch_n(&self, repo: &str, branch: &str, n: u64) -> CoreResult<Option<Commit>> {
        let key = branch_n_key(repo, branch, n);
        let rows = self
            .store
            .range_by_index(Table::Commits, BRANCH_N_INDEX, key.clone(), key, Order::Asc)
            .await
            .map_err(CoreError::Store)?;
        match rows.first() {
            Some(row) => Ok(Some(serde_json::from_value(row.value.clone()).expect("stored Commit is well-formed"))),
            None => Ok(None),
        }
    }

    /// Resolves a commit ref against a repo (spec §4.3's `Resolve`): a
    /// `branch/n` alias, else a bare branch name (its head), else a raw
    /// commit id.
    pub async fn resolve(&self, repo: &str, commit_ref: &str) -> CoreResult<Commit> {
        if let Some((branch, n)) = parse_alias(commit_ref) {
            return self
                .commit_at_branch_n(repo, branch, n)
                .await?
                .ok_or_else(|| CoreError::CommitNotFound { commit_ref: commit_ref.to_string() });
        }
        if is_valid_branch_name(commit_ref) {
            if let Some(head) = self.head_of_branch(repo, commit_ref).await? {
                return Ok(head);
            }
        }
        self.get_commit(commit_ref)
            .await?
            .ok_or_else(|| CoreError::CommitNotFound { commit_ref: commit_ref.to_string() })
    }

    /// The parent commit per spec §3's definition: on `b`'s clock `n`, the
    /// commit at `(b, n-1)` if `n>0`, else the commit named by this
    /// branch-clock's next-to-last entry (the exact commit `branch_off`
    /// copied from), or `None` at the root.
    async fn parent_of(&self, commit: &Commit) -> CoreResult<Option<Commit>> {
        let bc = commit.primary();
        let tail = bc.tail();
        if tail.n > 0 {
            return self.commit_at_branch_n(&commit.repo, &tail.branch, tail.n - 1).await;
        }
        let clocks = bc.clocks();
        if clocks.len() < 2 {
            return Ok(None);
        }
        let parent_clock = &clocks[clocks.len() - 2];
        self.commit_at_branch_n(&commit.repo, &parent_clock.branch, parent_clock.n).await
    }

    /// `StartCommit(repo, parent_ref, branch_hint) -> commit_id` (spec §4.3).
    pub async fn start_commit(
        &self,
        repo: &str,
        parent_ref: Option<&str>,
        branch_hint: Option<&str>,
    ) -> CoreResult<String> {
        loop {
            // Step 1: resolve the parent and the branch we are extending.
            let (parent, mut branch): (Option<Commit>, String) = if parent_ref.is_none() && branch_hint.is_none() {
                (None, uuid::Uuid::new_v4().simple().to_string())
            } else if parent_ref.is_none() {
                let branch = branch_hint.expect("checked above").to_string();
                let head = self.head_of_branch(repo, &branch).await?;
                (head, branch)
            } else {
                let parent = self.resolve(repo, parent_ref.expect("checked above")).await?;
                let branch = parent.branch().to_string();
                (Some(parent), branch)
            };

            // Step 2: compute the new branch-clocks and whether this attempt
            // is claiming a brand-new branch name (fails BranchExists on
            // contention) or continuing one (retries on contention).
            let (branch_clocks, creates_new_branch) = match &parent {
                None => {
                    branch = branch_hint.unwrap_or(&branch).to_string();
                    // A fresh or not-yet-existing branch name: a losing
                    // ClockID conflict here means a concurrent writer got
                    // there first, so we retry rather than fail.
                    (vec![BranchClock::new_branch(branch.clone())], false)
                }
                Some(parent) => {
                    let parent_branch = parent.branch();
                    if branch_hint.is_none() || branch_hint == Some(parent_branch) {
                        branch = parent_branch.to_string();
                        let bc = parent.primary().child();
                        (vec![bc], false)
                    } else {
                        let new_branch = branch_hint.expect("checked above");
                        branch = new_branch.to_string();
                        let bc = BranchClock::branch_off(&parent.branch_clocks, parent_branch, new_branch)
                            .map_err(|_| CoreError::BranchExists { branch: new_branch.to_string() })?;
                        (vec![bc], true)
                    }
                }
            };
            let n = branch_clocks[0].tail().n;

            // Step 3: reserve the head. The commit id is generated up front
            // so the reserved clock record points at a real commit from the
            // instant it exists; a reader resolving the branch head never
            // observes a commit id with nothing behind it.
            let id = uuid::Uuid::new_v4().simple().to_string();
            let clock_record = ClockIdRecord {
                repo: repo.to_string(),
                branch: branch.clone(),
                n,
                commit_id: id.clone(),
            };
            let reserve = self
                .store
                .insert(
                    Table::Clocks,
                    clock_id_key(repo, &branch, n),
                    serde_json::to_value(&clock_record).expect("ClockIdRecord is serializable"),
                    OnConflict::Fail,
                    clock_index_entries(repo, &branch),
                )
                .await;
            if let Err(_conflict) = reserve {
                if creates_new_branch {
                    return Err(CoreError::BranchExists { branch });
                }
                continue;
            }

            // Step 4: insert the commit record.
            let commit = Commit {
                id: id.clone(),
                repo: repo.to_string(),
                started: Utc::now(),
                finished: None,
                cancelled: false,
                branch_clocks,
                provenance: Vec::new(),
                size: 0,
            };
            let value = serde_json::to_value(&commit).expect("Commit is serializable");
            if let Err(err) = self
                .store
                .insert(
                    Table::Commits,
                    commit_key(&id),
                    value,
                    OnConflict::Fail,
                    commit_index_entries(repo, &id, &commit.branch_clocks),
                )
                .await
            {
                warn!(repo, branch, n, error = %err, "commit insert failed after clock reservation, attempting cleanup");
                if let Err(cleanup_err) = self.store.delete(Table::Clocks, &clock_id_key(repo, &branch, n)).await {
                    warn!(repo, branch, n, error = %cleanup_err, "failed to roll back reserved clock id; branch head is now orphaned");
                }
                return Err(CoreError::Store(err));
            }

            info!(repo, branch, n, commit_id = %id, "started commit");
            return Ok(id);
        }
    }

    /// `FinishCommit(commit_ref, cancel)` (spec §4.3).
    pub async fn finish_commit(&self, repo: &str, commit_ref: &str, cancel: bool) -> CoreResult<()> {
        let commit = self.resolve(repo, commit_ref).await?;
        if commit.finished.is_some() {
            return Err(CoreError::CommitAlreadyFinished { commit_id: commit.id });
        }

        let parent_cancelled = match self.parent_of(&commit).await? {
            Some(parent) if parent.finished.is_none() => self.wait_for_finish(&parent).await?,
            Some(parent) => parent.cancelled,
            None => false,
        };

        let size = self.sum_diff_sizes(&commit.id).await?;
        self.store
            .increment(Table::Repos, &repo_key(repo), "size_bytes", size as i64)
            .await
            .map_err(CoreError::Store)?;

        let cancelled = cancel || parent_cancelled;
        self.store
            .update(
                Table::Commits,
                &commit_key(&commit.id),
                json!({ "finished": Utc::now(), "cancelled": cancelled, "size": size }),
            )
            .await
            .map_err(CoreError::Store)?;
        info!(repo, commit_id = %commit.id, size, cancelled, "finished commit");
        Ok(())
    }

    /// Blocks on the commit table's change feed until `parent` is observed
    /// finished, returning its (possibly cascaded) `cancelled` flag.
    async fn wait_for_finish(&self, parent: &Commit) -> CoreResult<bool> {
        let parent_id = parent.id.clone();
        let filter: crate::store::RowFilter = {
            let parent_id = parent_id.clone();
            Arc::new(move |v: &serde_json::Value| v.get("id").and_then(|i| i.as_str()) == Some(parent_id.as_str()))
        };
        let mut feed = self.store.change_feed(Table::Commits, filter, true).await;
        while let Some(event) = feed.next().await {
            let c: Commit = serde_json::from_value(event.row.value).expect("stored Commit is well-formed");
            if c.finished.is_some() {
                return Ok(c.cancelled);
            }
        }
        Ok(false)
    }

    async fn sum_diff_sizes(&self, commit_id: &str) -> CoreResult<u64> {
        let key = diff_commit_key(commit_id);
        let rows = self
            .store
            .range_by_index(Table::Diffs, DIFF_COMMIT_INDEX, key.clone(), key, Order::Asc)
            .await
            .map_err(CoreError::Store)?;
        Ok(rows
            .iter()
            .map(|r| r.value.get("size").and_then(|s| s.as_u64()).unwrap_or(0))
            .sum())
    }

    /// `InspectCommit(commit_ref)` (spec §4.3).
    pub async fn inspect_commit(&self, repo: &str, commit_ref: &str) -> CoreResult<CommitInfo> {
        let commit = self.resolve(repo, commit_ref).await?;
        let size_bytes = if commit.finished.is_some() {
            commit.size
        } else {
            self.sum_diff_sizes(&commit.id).await?
        };
        Ok(CommitInfo {
            commit_id: commit.id,
            branch: commit.branch().to_string(),
            started: commit.started,
            finished: commit.finished,
            cancelled: commit.cancelled,
            commit_type: if commit.finished.is_none() { CommitKind::Write } else { CommitKind::Read },
            size_bytes,
        })
    }

    /// `ListBranch(repo)` (spec §4.3): distinct branch names with their head
    /// commit.
    pub async fn list_branch(&self, repo: &str) -> CoreResult<Vec<BranchHead>> {
        let rows = self
            .store
            .range_by_index(
                Table::Clocks,
                BY_REPO_INDEX,
                repo_index_key(repo),
                repo_index_key(repo),
                Order::Asc,
            )
            .await
            .map_err(CoreError::Store)?;
        let mut heads: std::collections::HashMap<String, (u64, String)> = std::collections::HashMap::new();
        for row in rows {
            let record: ClockIdRecord = serde_json::from_value(row.value).expect("stored ClockIdRecord is well-formed");
            let entry = heads.entry(record.branch.clone()).or_insert((record.n, record.commit_id.clone()));
            if record.n >= entry.0 {
                *entry = (record.n, record.commit_id);
            }
        }
        let mut out = Vec::with_capacity(heads.len());
        for (branch, (_n, commit_id)) in heads {
            if let Some(head) = self.get_commit(&commit_id).await? {
                out.push(BranchHead { branch, head });
            }
        }
        out.sort_by(|a, b| a.branch.cmp(&b.branch));
        Ok(out)
    }

    /// `ListCommit(repo, ...)` (spec §4.3), scoped to one repo per call; a
    /// caller enumerating several repos invokes this once per repo.
    pub async fn list_commit(&self, repo: &str, query: &ListCommitQuery) -> CoreResult<Vec<CommitInfo>> {
        let mut matches = Vec::new();
        let branches = match &query.from {
            Some(from) => {
                let from_commit = self.resolve(repo, from).await?;
                vec![(from_commit.branch().to_string(), from_commit.primary().tail().n + 1)]
            }
            None => self
                .list_branch(repo)
                .await?
                .into_iter()
                .map(|b| (b.branch, 0))
                .collect(),
        };

        for (branch, from_n) in branches {
            let lo = branch_n_key(repo, &branch, from_n);
            let hi = branch_n_key(repo, &branch, u64::MAX);
            let rows = self
                .store
                .range_by_index(Table::Commits, BRANCH_N_INDEX, lo, hi, Order::Desc)
                .await
                .map_err(CoreError::Store)?;
            for row in rows {
                let commit: Commit = serde_json::from_value(row.value).expect("stored Commit is well-formed");
                if !query.include_cancelled && commit.cancelled {
                    continue;
                }
                if !query.provenance.iter().all(|p| commit.provenance.iter().any(|cp| cp == p)) {
                    continue;
                }
                let commit_type = if commit.finished.is_none() { CommitKind::Write } else { CommitKind::Read };
                if let Some(want) = query.commit_type {
                    if want != commit_type {
                        continue;
                    }
                }
                matches.push(CommitInfo {
                    commit_id: commit.id,
                    branch: branch.clone(),
                    started: commit.started,
                    finished: commit.finished,
                    cancelled: commit.cancelled,
                    commit_type,
                    size_bytes: commit.size,
                });
            }
        }

        if matches.is_empty() && query.block {
            return self.wait_for_next_commit(repo, query).await;
        }
        Ok(matches)
    }

    async fn wait_for_next_commit(&self, repo: &str, query: &ListCommitQuery) -> CoreResult<Vec<CommitInfo>> {
        let repo_owned = repo.to_string();
        let filter: crate::store::RowFilter = Arc::new(move |v: &serde_json::Value| v.get("repo").and_then(|r| r.as_str()) == Some(repo_owned.as_str()));
        let mut feed = self.store.change_feed(Table::Commits, filter, false).await;
        let timeout = Duration::from_secs(3600);
        match tokio::time::timeout(timeout, feed.next()).await {
            Ok(Some(event)) => {
                let commit: Commit = serde_json::from_value(event.row.value).expect("stored Commit is well-formed");
                let commit_type = if commit.finished.is_none() { CommitKind::Write } else { CommitKind::Read };
                if !query.include_cancelled && commit.cancelled {
                    return Ok(Vec::new());
                }
                Ok(vec![CommitInfo {
                    commit_id: commit.id,
                    branch: commit.branch().to_string(),
                    started: commit.started,
                    finished: commit.finished,
                    cancelled: commit.cancelled,
                    commit_type,
                    size_bytes: commit.size,
                }])
            }
            _ => Ok(Vec::new()),
        }
    }

    /// `Merge`/`DeleteCommit` are explicitly unsupported (spec §1, §7).
    pub fn delete_commit(&self, _commit_ref: &str) -> CoreResult<()> {
        Err(CoreError::Unsupported { operation: "DeleteCommit" })
    }

    pub fn merge(&self, _commit_refs: &[&str]) -> CoreResult<()> {
        Err(CoreError::Unsupported { operation: "Merge" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoManager;
    use crate::store::memory::MemoryStore;

    fn managers() -> (RepoManager, CommitManager) {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        (RepoManager::new(store.clone()), CommitManager::new(store))
    }

    #[tokio::test]
    async fn start_then_finish_linear_history() {
        let (repos, commits) = managers();
        repos.create_repo("r").await.unwrap();

        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();
        let c1 = commits.start_commit("r", Some("master"), None).await.unwrap();
        commits.finish_commit("r", &c1, false).await.unwrap();

        let info = commits.inspect_commit("r", "master").await.unwrap();
        assert_eq!(info.commit_id, c1);
        assert!(info.finished.is_some());
    }

    #[tokio::test]
    async fn first_commit_on_fresh_branch_has_no_parent_wait() {
        let (repos, commits) = managers();
        repos.create_repo("r").await.unwrap();
        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();
        let info = commits.inspect_commit("r", &c0).await.unwrap();
        assert_eq!(info.branch, "master");
        assert!(!info.cancelled);
    }

    #[tokio::test]
    async fn branch_off_creates_new_branch_from_parent() {
        let (repos, commits) = managers();
        repos.create_repo("r").await.unwrap();
        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();

        let dev0 = commits.start_commit("r", Some("master"), Some("dev")).await.unwrap();
        commits.finish_commit("r", &dev0, false).await.unwrap();

        let heads = commits.list_branch("r").await.unwrap();
        let names: Vec<_> = heads.iter().map(|h| h.branch.clone()).collect();
        assert!(names.contains(&"master".to_string()));
        assert!(names.contains(&"dev".to_string()));
    }

    #[tokio::test]
    async fn branch_off_rejects_existing_branch_name() {
        let (repos, commits) = managers();
        repos.create_repo("r").await.unwrap();
        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();
        let dev0 = commits.start_commit("r", Some("master"), Some("dev")).await.unwrap();
        commits.finish_commit("r", &dev0, false).await.unwrap();

        // "dev" already names a branch distinct from master's tail, so this
        // is a branch_off attempt that collides with an existing branch.
        let err = commits.start_commit("r", Some("master"), Some("dev")).await.unwrap_err();
        assert!(matches!(err, CoreError::BranchExists { .. }));
    }

    #[tokio::test]
    async fn finishing_twice_fails() {
        let (repos, commits) = managers();
        repos.create_repo("r").await.unwrap();
        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();
        let err = commits.finish_commit("r", &c0, false).await.unwrap_err();
        assert!(matches!(err, CoreError::CommitAlreadyFinished { .. }));
    }

    #[tokio::test]
    async fn concurrent_start_on_same_branch_all_succeed_with_no_gaps() {
        let (repos, commits) = managers();
        repos.create_repo("r").await.unwrap();
        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();

        let commits = Arc::new(commits);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let commits = commits.clone();
            handles.push(tokio::spawn(async move { commits.start_commit("r", Some("master"), None).await.unwrap() }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        assert_eq!(ids.len(), 10);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 10);

        let heads = commits.list_branch("r").await.unwrap();
        let head = heads.iter().find(|h| h.branch == "master").unwrap();
        assert_eq!(head.head.primary().tail().n, 10);
    }
}
