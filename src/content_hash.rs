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

//! Deterministic content hashing, used to derive diff ids and block hashes.
//!
//! The clock algebra (spec §4.1) must be "totally deterministic: byte-identical
//! outputs for equal inputs, so that index keys computed from clocks match
//! across processes" — the same property is needed for `Diff::id` and for
//! content-addressed block hashes, so both go through this module.

use blake2::Blake2b512;
use blake2::Digest as _;
use serde::Serialize;

/// Hashes the canonical (serde_json) encoding of `value` with Blake2b-512 and
/// returns the raw digest bytes.
pub fn hash_of<T: Serialize>(value: &T) -> Vec<u8> {
    let bytes = serde_json::to_vec(value).expect("value must be serializable");
    let mut hasher = Blake2b512::new();
    hasher.update(&bytes);
    hasher.finalize().to_vec()
}

/// Hashes raw bytes directly, used for content-addressing block payloads.
pub fn hash_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(bytes);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_of(&("master", 3u64));
        let b = hash_of(&("master", 3u64));
        assert_eq!(a, b);
    }

    #[test]
    fn hash_distinguishes_inputs() {
        let a = hash_of(&("master", 3u64));
        let b = hash_of(&("master", 4u64));
        assert_ne!(a, b);
    }
}
