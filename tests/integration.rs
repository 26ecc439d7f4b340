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

//! End-to-end scenarios against the in-memory reference implementations,
//! one per testable property in the specification.

use branchfs_core::block::BytesReader;
use branchfs_core::block::Delimiter;
use branchfs_core::error::CoreError;
use branchfs_core::pfs::Pfs;
use futures::StreamExt as _;

async fn put(pfs: &Pfs, repo: &str, commit_ref: &str, path: &str, content: &[u8]) {
    let mut reader = BytesReader::new(content.to_vec());
    pfs.diffs
        .put_file(repo, commit_ref, path, Delimiter::None, &mut reader)
        .await
        .unwrap();
}

async fn get(pfs: &Pfs, repo: &str, commit_ref: &str, path: &str) -> Vec<u8> {
    pfs.diffs
        .get_file(repo, commit_ref, path, None, "", 0, None, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn s1_linear_history() {
    let pfs = Pfs::in_memory();
    pfs.repos.create_repo("r").await.unwrap();

    for i in 0..2 {
        let commit = if i == 0 {
            pfs.commits.start_commit("r", None, Some("master")).await.unwrap()
        } else {
            pfs.commits.start_commit("r", Some("master"), None).await.unwrap()
        };
        put(&pfs, "r", &commit, "/a/b", format!("v{i}").as_bytes()).await;
        pfs.commits.finish_commit("r", &commit, false).await.unwrap();
    }

    assert_eq!(get(&pfs, "r", "master/1", "/a/b").await, b"v1");
    assert_eq!(get(&pfs, "r", "master/0", "/a/b").await, b"v0");

    let info = pfs.commits.inspect_commit("r", "master").await.unwrap();
    assert_eq!(info.size_bytes, 2);
}

#[tokio::test]
async fn s2_branch_off() {
    let pfs = Pfs::in_memory();
    pfs.repos.create_repo("r").await.unwrap();

    for i in 0..2 {
        let commit = if i == 0 {
            pfs.commits.start_commit("r", None, Some("master")).await.unwrap()
        } else {
            pfs.commits.start_commit("r", Some("master"), None).await.unwrap()
        };
        put(&pfs, "r", &commit, "/a/b", format!("v{i}").as_bytes()).await;
        pfs.commits.finish_commit("r", &commit, false).await.unwrap();
    }

    let dev = pfs
        .commits
        .start_commit("r", Some("master/1"), Some("dev"))
        .await
        .unwrap();
    put(&pfs, "r", &dev, "/a/b", b"dev0").await;
    pfs.commits.finish_commit("r", &dev, false).await.unwrap();

    assert_eq!(get(&pfs, "r", "dev", "/a/b").await, b"dev0");
    assert_eq!(get(&pfs, "r", "master/1", "/a/b").await, b"v1");
}

#[tokio::test]
async fn s3_delete() {
    let pfs = Pfs::in_memory();
    pfs.repos.create_repo("r").await.unwrap();

    let c0 = pfs.commits.start_commit("r", None, Some("master")).await.unwrap();
    put(&pfs, "r", &c0, "/a/b", b"v0").await;
    pfs.commits.finish_commit("r", &c0, false).await.unwrap();

    let c1 = pfs.commits.start_commit("r", Some("master"), None).await.unwrap();
    pfs.diffs.delete_file("r", &c1, "/a").await.unwrap();
    pfs.commits.finish_commit("r", &c1, false).await.unwrap();

    let err = pfs.diffs.inspect_file("r", "master", "/a/b").await.unwrap_err();
    assert!(matches!(err, CoreError::FileNotFound { .. }));

    let listing = pfs.diffs.list_file("r", "master", "/", false, None).await.unwrap();
    assert!(listing.is_empty());
}

#[tokio::test]
async fn s4_type_conflict() {
    let pfs = Pfs::in_memory();
    pfs.repos.create_repo("r").await.unwrap();

    let commit = pfs.commits.start_commit("r", None, Some("master")).await.unwrap();
    put(&pfs, "r", &commit, "/x", b"file content").await;

    let mut reader = BytesReader::new(b"nested".to_vec());
    let err = pfs
        .diffs
        .put_file("r", &commit, "/x/y", Delimiter::None, &mut reader)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::FileTypeConflict { .. }));
}

#[tokio::test]
async fn s5_concurrent_start() {
    let pfs = std::sync::Arc::new(Pfs::in_memory());
    pfs.repos.create_repo("r").await.unwrap();

    let seed = pfs.commits.start_commit("r", None, Some("master")).await.unwrap();
    pfs.commits.finish_commit("r", &seed, false).await.unwrap();
    let before = pfs.commits.resolve("r", "master").await.unwrap();
    let h = before.branch_clock().tail().n;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let pfs = pfs.clone();
        tasks.push(tokio::spawn(async move {
            pfs.commits.start_commit("r", Some("master"), None).await.unwrap()
        }));
    }

    let mut ids = std::collections::HashSet::new();
    let mut ns = Vec::new();
    for task in tasks {
        let commit_id = task.await.unwrap();
        let commit = pfs.commits.resolve("r", &commit_id).await.unwrap();
        ns.push(commit.branch_clock().tail().n);
        ids.insert(commit_id);
    }
    ns.sort_unstable();

    assert_eq!(ids.len(), 10);
    assert_eq!(ns, ((h + 1)..=(h + 10)).collect::<Vec<_>>());

    let head = pfs.commits.resolve("r", "master").await.unwrap();
    assert_eq!(head.branch_clock().tail().n, h + 10);
}

#[tokio::test]
async fn s6_subscribe() {
    let pfs = Pfs::in_memory();
    pfs.repos.create_repo("r").await.unwrap();

    let c0 = pfs.commits.start_commit("r", None, Some("master")).await.unwrap();
    pfs.commits.finish_commit("r", &c0, false).await.unwrap();

    let mut stream = pfs.subscriber.subscribe_commit("r", Some("master/0")).await.unwrap();

    let c1 = pfs.commits.start_commit("r", Some("master"), None).await.unwrap();
    pfs.commits.finish_commit("r", &c1, false).await.unwrap();
    let c2 = pfs.commits.start_commit("r", Some("master"), None).await.unwrap();
    pfs.commits.finish_commit("r", &c2, false).await.unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.commit.branch_clock().tail().n, 1);
    let second = stream.next().await.unwrap();
    assert_eq!(second.commit.branch_clock().tail().n, 2);

    let mut resumed = pfs.subscriber.subscribe_commit("r", Some("master/1")).await.unwrap();
    let only = resumed.next().await.unwrap();
    assert_eq!(only.commit.id, c2);
}
