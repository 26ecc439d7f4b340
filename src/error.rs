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

//! Wire-visible error taxonomy for the core (spec §6, §7).

use thiserror::Error;

/// Error returned by the metadata adapter (spec §6's "Metadata adapter").
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found in table {table}")]
    NotFound { table: &'static str },
    #[error("conflicting insert into table {table}")]
    Conflict { table: &'static str },
    #[error("transaction aborted: {reason}")]
    TransactionAborted { reason: String },
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Error returned by the block-store client (spec §6's "Block store client").
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block {hash} not found")]
    NotFound { hash: String },
    #[error("failed to read from source: {0}")]
    Read(std::io::Error),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Every fallible core operation returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("repo {name} not found")]
    RepoNotFound { name: String },
    #[error("repo {name} already exists")]
    RepoExists { name: String },
    #[error("invalid repo name: {name}")]
    InvalidRepoName { name: String },
    #[error("commit {commit_ref} not found")]
    CommitNotFound { commit_ref: String },
    #[error("commit {commit_id} is already finished")]
    CommitAlreadyFinished { commit_id: String },
    #[error("branch {branch} already exists")]
    BranchExists { branch: String },
    #[error("file {path} not found at commit {commit_id}")]
    FileNotFound { path: String, commit_id: String },
    #[error("path {path} has conflicting file types in commit {commit_id}")]
    FileTypeConflict { path: String, commit_id: String },
    #[error("{operation} is not supported")]
    Unsupported { operation: &'static str },
    #[error("requested byte range exceeds file size")]
    RangeExceeded,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Block(#[from] BlockError),
}

pub type CoreResult<T> = Result<T, CoreError>;
