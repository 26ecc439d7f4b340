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

//! Path normalization for file references (spec §6): leading `/` is added if
//! missing, trailing `/` is stripped unless the path is exactly `/`, and
//! internal separators are not collapsed.

use std::fmt;

/// A normalized, absolute repo path.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoPathBuf(String);

impl RepoPathBuf {
    /// Normalizes `path` per spec §6.
    pub fn normalize(path: impl AsRef<str>) -> Self {
        let path = path.as_ref();
        let mut normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        if normalized != "/" {
            while normalized.len() > 1 && normalized.ends_with('/') {
                normalized.pop();
            }
        }
        Self(normalized)
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The parent directory, or `None` if this path is the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Every strict ancestor directory, root-most first, excluding `self`.
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            let is_root = p.is_root();
            out.push(p.clone());
            if is_root {
                break;
            }
            cur = p.parent();
        }
        out.reverse();
        out
    }

    /// True if `self` is `prefix` or lives strictly below it.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0 || self.0.starts_with(&format!("{}/", prefix.0))
    }

    /// The first path component strictly below `prefix`, as a full path
    /// rooted at `prefix` (used by recursive listing to group descendants by
    /// their immediate child under `prefix`).
    pub fn first_component_below(&self, prefix: &Self) -> Option<Self> {
        if !self.starts_with(prefix) || self == prefix {
            return None;
        }
        let rest = if prefix.is_root() {
            &self.0[1..]
        } else {
            &self.0[prefix.0.len() + 1..]
        };
        match rest.find('/') {
            Some(idx) => {
                let head = &rest[..idx];
                if prefix.is_root() {
                    Some(Self::normalize(format!("/{head}")))
                } else {
                    Some(Self::normalize(format!("{}/{head}", prefix.0)))
                }
            }
            None => Some(self.clone()),
        }
    }
}

impl fmt::Debug for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RepoPathBuf").field(&self.0).finish()
    }
}

impl fmt::Display for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for RepoPathBuf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for RepoPathBuf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::normalize(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_leading_slash() {
        assert_eq!(RepoPathBuf::normalize("a/b").as_str(), "/a/b");
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(RepoPathBuf::normalize("/a/b/").as_str(), "/a/b");
        assert_eq!(RepoPathBuf::normalize("/").as_str(), "/");
        assert_eq!(RepoPathBuf::normalize("").as_str(), "/");
    }

    #[test]
    fn ancestors_are_root_most_first() {
        let p = RepoPathBuf::normalize("/a/b/c");
        let ancestors: Vec<_> = p.ancestors().iter().map(|a| a.as_str().to_string()).collect();
        assert_eq!(ancestors, vec!["/".to_string(), "/a".to_string(), "/a/b".to_string()]);
    }

    #[test]
    fn starts_with_root_is_always_true() {
        let p = RepoPathBuf::normalize("/a/b");
        assert!(p.starts_with(&RepoPathBuf::root()));
    }

    #[test]
    fn first_component_below() {
        let prefix = RepoPathBuf::normalize("/a");
        let deep = RepoPathBuf::normalize("/a/b/c");
        assert_eq!(
            deep.first_component_below(&prefix).unwrap().as_str(),
            "/a/b"
        );
        let shallow = RepoPathBuf::normalize("/a/b");
        assert_eq!(
            shallow.first_component_below(&prefix).unwrap().as_str(),
            "/a/b"
        );
    }
}
