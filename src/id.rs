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

#![allow(missing_docs)]

//! Opaque, content-hashed identifier newtypes.

/// Defines a newtype wrapping `Vec<u8>` with hex `Display`/`Debug`/`Serialize`.
///
/// Example:
/// ```ignore
/// id_type!(pub DiffId);
/// ```
macro_rules! id_type {
    ($(#[$attr:meta])* $vis:vis $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn hex(&self) -> String {
                hex::encode(&self.0)
            }

            pub fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
                hex::decode(hex).ok().map(Self)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.hex()).finish()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.hex())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.hex().serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::try_from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid hex id"))
            }
        }
    };
}

id_type!(
    /// Identifier for a [`crate::diff::Diff`]; `hash(commit_id, path)` (spec §3).
    pub DiffId
);
id_type!(
    /// Content hash of one block stored in the block store.
    pub BlockHash
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = DiffId::new(vec![1, 2, 3, 255]);
        let hex = id.hex();
        let back = DiffId::try_from_hex(&hex).unwrap();
        assert_eq!(id, back);
    }
}
