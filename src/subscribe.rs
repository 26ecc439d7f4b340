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

//! Commit subscription (spec §4.5): a long-poll stream of new commits,
//! resumable from a server-side insertion order rather than wall time.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt as _;

use crate::commit::Commit;
use crate::commit::CommitManager;
use crate::error::CoreError;
use crate::error::CoreResult;
use crate::store::MetadataStore;
use crate::store::RowFilter;
use crate::store::Table;

/// One delivered commit, tagged with the insertion-order token a caller
/// reconnecting with `SubscribeCommit` should resume from.
#[derive(Clone, Debug)]
pub struct SubscribedCommit {
    pub commit: Commit,
    pub insertion_order: u64,
}

/// `SubscribeCommit(repo, since_commit)` (spec §4.5).
#[derive(Debug)]
pub struct Subscriber {
    store: Arc<dyn MetadataStore>,
    commits: Arc<CommitManager>,
}

impl Subscriber {
    pub fn new(store: Arc<dyn MetadataStore>, commits: Arc<CommitManager>) -> Self {
        Self { store, commits }
    }

    /// Resolves `since_commit` to its insertion order, then opens a change
    /// feed on the commit table delivering every commit started after it, in
    /// insertion order. Reconnecting with the `insertion_order` of the last
    /// delivered commit resumes exactly where the previous stream left off.
    pub async fn subscribe_commit(&self, repo: &str, since_commit: Option<&str>) -> CoreResult<BoxStream<'static, SubscribedCommit>> {
        let since_order = match since_commit {
            Some(commit_ref) => {
                let commit = self.commits.resolve(repo, commit_ref).await?;
                self.insertion_order_of(&commit.id).await?
            }
            None => 0,
        };

        let repo_owned = repo.to_string();
        let filter: RowFilter = Arc::new(move |v: &serde_json::Value| v.get("repo").and_then(|r| r.as_str()) == Some(repo_owned.as_str()));
        let feed = self.store.change_feed(Table::Commits, filter, true).await;

        let stream = feed.filter_map(move |event| {
            let since_order = since_order;
            async move {
                if event.deleted || event.row.seq <= since_order {
                    return None;
                }
                let commit: Commit = serde_json::from_value(event.row.value).ok()?;
                Some(SubscribedCommit {
                    commit,
                    insertion_order: event.row.seq,
                })
            }
        });
        Ok(Box::pin(stream))
    }

    async fn insertion_order_of(&self, commit_id: &str) -> CoreResult<u64> {
        let key = crate::store::Key::from_parts(&[commit_id.as_bytes()]);
        let row = self
            .store
            .get(Table::Commits, &key)
            .await
            .map_err(CoreError::Store)?
            .ok_or_else(|| CoreError::CommitNotFound {
                commit_ref: commit_id.to_string(),
            })?;
        Ok(row.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoManager;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn subscriber_delivers_only_commits_after_since() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let repos = RepoManager::new(store.clone());
        let commits = Arc::new(CommitManager::new(store.clone()));
        repos.create_repo("r").await.unwrap();

        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();

        let sub = Subscriber::new(store, commits.clone());
        let mut stream = sub.subscribe_commit("r", Some(&c0)).await.unwrap();

        let c1 = commits.start_commit("r", Some("master"), None).await.unwrap();
        commits.finish_commit("r", &c1, false).await.unwrap();
        let c2 = commits.start_commit("r", Some("master"), None).await.unwrap();
        commits.finish_commit("r", &c2, false).await.unwrap();

        let first = stream.next().await.unwrap();
        assert_eq!(first.commit.id, c1);
        let second = stream.next().await.unwrap();
        assert_eq!(second.commit.id, c2);
    }

    #[tokio::test]
    async fn reconnecting_from_last_delivered_resumes_without_duplicates() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let repos = RepoManager::new(store.clone());
        let commits = Arc::new(CommitManager::new(store.clone()));
        repos.create_repo("r").await.unwrap();

        let c0 = commits.start_commit("r", None, Some("master")).await.unwrap();
        commits.finish_commit("r", &c0, false).await.unwrap();
        let c1 = commits.start_commit("r", Some("master"), None).await.unwrap();
        commits.finish_commit("r", &c1, false).await.unwrap();

        let sub = Subscriber::new(store, commits.clone());
        let mut first_stream = sub.subscribe_commit("r", Some(&c0)).await.unwrap();
        let delivered = first_stream.next().await.unwrap();
        assert_eq!(delivered.commit.id, c1);

        let c2 = commits.start_commit("r", Some("master"), None).await.unwrap();
        commits.finish_commit("r", &c2, false).await.unwrap();

        let mut second_stream = sub.subscribe_commit("r", Some(&delivered.commit.id)).await.unwrap();
        let next = second_stream.next().await.unwrap();
        assert_eq!(next.commit.id, c2);
    }
}
