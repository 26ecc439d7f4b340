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

//! The block store client (spec §6) — deliberately out of scope to
//! reimplement (spec §1), consumed here only through the [`BlockStore`]
//! trait, plus a content-addressed in-memory reference implementation
//! (`MemoryBlockStore`) used by tests and embedders who don't need
//! durability.

use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt as _;

use crate::content_hash::hash_bytes;
use crate::error::BlockError;
use crate::id::BlockHash;
use crate::repo_path::RepoPathBuf;

/// How `PutFile` should split the incoming byte stream into blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delimiter {
    /// Split into one block for the whole stream.
    None,
    /// Split on newlines, never splitting a line across two blocks.
    Line,
    /// Split on top-level JSON value boundaries.
    Json,
}

/// `(hash, lower, upper)`: a slice of bytes `[lower, upper)` within the
/// content-addressed block named by `hash`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockRef {
    pub hash: BlockHash,
    pub lower: u64,
    pub upper: u64,
}

impl BlockRef {
    pub fn len(&self) -> u64 {
        self.upper - self.lower
    }

    pub fn is_empty(&self) -> bool {
        self.upper == self.lower
    }
}

/// The external block-store client (spec §6). `PutFile` streams bytes
/// through `put_block`; reads walk the returned [`BlockRef`]s against
/// `get_block`.
#[async_trait]
pub trait BlockStore: Send + Sync + std::fmt::Debug {
    /// Streams `contents` into the store, splitting per `delimiter`, and
    /// returns the ordered block references covering the whole stream.
    async fn put_block(
        &self,
        delimiter: Delimiter,
        contents: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Vec<BlockRef>, BlockError>;

    /// Reads `size` bytes starting at `offset` within the block named by
    /// `hash`.
    async fn get_block(&self, hash: &BlockHash, offset: u64, size: u64) -> Result<Vec<u8>, BlockError>;
}

/// A predicate selecting which `(shard, file, block)` triples this reader is
/// responsible for serving (spec §6, §9). The policy is supplied externally;
/// the core only threads it through reads.
pub type BlockInShardFn = Arc<dyn Fn(&str, &RepoPathBuf, &BlockRef) -> bool + Send + Sync>;

/// A predicate selecting which `(shard, file)` pairs this reader owns.
pub type FileInShardFn = Arc<dyn Fn(&str, &RepoPathBuf) -> bool + Send + Sync>;

/// Selects every block and every file (the default when no sharding is in
/// effect).
pub fn no_shard_filter() -> (BlockInShardFn, FileInShardFn) {
    (Arc::new(|_, _, _| true), Arc::new(|_, _| true))
}

/// Splits `data` into chunks per `delimiter`. Each chunk becomes exactly one
/// block in [`MemoryBlockStore`]; real backends may pack many logical slices
/// into one physical block for dedup, which is why `BlockRef` carries its own
/// `lower`/`upper` independent of block storage layout.
fn split(delimiter: Delimiter, data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }
    match delimiter {
        Delimiter::None => vec![data],
        Delimiter::Line => {
            let mut chunks = Vec::new();
            let mut start = 0;
            for (i, b) in data.iter().enumerate() {
                if *b == b'\n' {
                    chunks.push(&data[start..=i]);
                    start = i + 1;
                }
            }
            if start < data.len() {
                chunks.push(&data[start..]);
            }
            chunks
        }
        Delimiter::Json => {
            // Splits on top-level `}`/`]` boundaries at depth zero; adequate
            // for a sequence of whole JSON values, not a validating parser.
            let mut chunks = Vec::new();
            let mut start = 0;
            let mut depth = 0i32;
            let mut in_string = false;
            let mut escaped = false;
            for (i, b) in data.iter().enumerate() {
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if *b == b'\\' {
                        escaped = true;
                    } else if *b == b'"' {
                        in_string = false;
                    }
                    continue;
                }
                match *b {
                    b'"' => in_string = true,
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        depth -= 1;
                        if depth == 0 {
                            chunks.push(&data[start..=i]);
                            start = i + 1;
                        }
                    }
                    _ => {}
                }
            }
            if start < data.len() {
                chunks.push(&data[start..]);
            }
            chunks
        }
    }
}

/// A content-addressed, in-memory reference implementation of
/// [`BlockStore`]; grounded on `simple_backend.rs`'s file-backed
/// `SimpleBackend`, with disk replaced by a `DashMap` for the reference case.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put_block(
        &self,
        delimiter: Delimiter,
        contents: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Vec<BlockRef>, BlockError> {
        let mut buf = Vec::new();
        contents.read_to_end(&mut buf).await.map_err(BlockError::Read)?;

        let mut refs = Vec::with_capacity(4);
        for chunk in split(delimiter, &buf) {
            let digest = hash_bytes(chunk);
            self.blocks.insert(digest.clone(), chunk.to_vec());
            refs.push(BlockRef {
                hash: BlockHash::new(digest),
                lower: 0,
                upper: chunk.len() as u64,
            });
        }
        Ok(refs)
    }

    async fn get_block(&self, hash: &BlockHash, offset: u64, size: u64) -> Result<Vec<u8>, BlockError> {
        let bytes = self.blocks.get(hash.as_bytes()).ok_or_else(|| BlockError::NotFound {
            hash: hash.hex(),
        })?;
        let start = offset as usize;
        let end = ((offset + size) as usize).min(bytes.len());
        if start > bytes.len() {
            return Ok(Vec::new());
        }
        Ok(bytes[start..end].to_vec())
    }
}

/// Thread-safe byte-buffer cursor, used by tests as the `reader` argument to
/// `put_block` without pulling in a temp-file dependency.
#[derive(Debug)]
pub struct BytesReader {
    data: Arc<RwLock<std::io::Cursor<Vec<u8>>>>,
}

impl BytesReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(std::io::Cursor::new(data))),
        }
    }
}

impl AsyncRead for BytesReader {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        use std::io::Read as _;
        let mut cursor = self.data.write().unwrap();
        let mut tmp = vec![0u8; buf.remaining()];
        let n = cursor.read(&mut tmp)?;
        buf.put_slice(&tmp[..n]);
        std::task::Poll::Ready(Ok(()))
    }
}
