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

//! The clock algebra (spec §4.1): the branch-clock data type and the pure
//! operations used to name, order, and fold over commits.
//!
//! Every function here is pure and must be deterministic across processes —
//! index keys computed from clocks are compared byte-for-byte between
//! writers.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// A single step on one branch: `n` is monotone within `branch`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Clock {
    pub branch: String,
    pub n: u64,
}

impl Clock {
    pub fn new(branch: impl Into<String>, n: u64) -> Self {
        Self {
            branch: branch.into(),
            n,
        }
    }
}

/// An ordered sequence of [`Clock`]s whose branches are all distinct; the last
/// entry names the branch the commit lives on and is its canonical
/// `branch/n` identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchClock(Vec<Clock>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("branch {branch} already exists in this branch-clock set")]
    BranchExists { branch: String },
    #[error("no branch-clock found for branch {branch}")]
    BranchNotFound { branch: String },
}

impl BranchClock {
    /// `new_branch(b) -> [[(b,0)]]` (spec §4.1): a fresh branch's first commit.
    pub fn new_branch(branch: impl Into<String>) -> Self {
        Self(vec![Clock::new(branch, 0)])
    }

    /// Internal constructor used by the commit manager when rehydrating
    /// stored clocks; callers must uphold the "distinct branches" invariant.
    pub fn from_clocks(clocks: Vec<Clock>) -> Self {
        debug_assert!(!clocks.is_empty(), "branch-clock must be non-empty");
        Self(clocks)
    }

    /// `child(bc)`: increments the last clock's `n` by one.
    pub fn child(&self) -> Self {
        let mut clocks = self.0.clone();
        let last = clocks.last_mut().expect("branch-clock is non-empty");
        last.n += 1;
        Self(clocks)
    }

    /// `branch_off(bcs, parent_branch, new_branch)`: finds the branch-clock
    /// ending in `parent_branch` among `bcs` and appends `(new_branch, 0)` to
    /// a copy of it.
    pub fn branch_off(
        bcs: &[Self],
        parent_branch: &str,
        new_branch: impl Into<String>,
    ) -> Result<Self, ClockError> {
        let new_branch = new_branch.into();
        if Self::get_for_branch(bcs, &new_branch).is_some() {
            return Err(ClockError::BranchExists { branch: new_branch });
        }
        let parent = Self::get_for_branch(bcs, parent_branch).ok_or_else(|| {
            ClockError::BranchNotFound {
                branch: parent_branch.to_string(),
            }
        })?;
        let mut clocks = parent.0.clone();
        clocks.push(Clock::new(new_branch, 0));
        Ok(Self(clocks))
    }

    /// `get_for_branch(bcs, b)`: the unique branch-clock ending in `b`.
    pub fn get_for_branch<'a>(bcs: &'a [Self], branch: &str) -> Option<&'a Self> {
        bcs.iter().find(|bc| bc.branch_name() == branch)
    }

    /// `branch_name(bc)`: the last clock's branch.
    pub fn branch_name(&self) -> &str {
        &self.tail().branch
    }

    /// The tail clock: this branch-clock's canonical `(branch, n)` identity.
    pub fn tail(&self) -> &Clock {
        self.0.last().expect("branch-clock is non-empty")
    }

    pub fn clocks(&self) -> &[Clock] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// One linear clock run produced by [`intervals`]: all commits on `branch`
/// with `n` in `[from, to]` (both bounds inclusive).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    pub branch: String,
    pub from: u64,
    pub to: u64,
}

/// `intervals(from_bc, to_bc)`: decomposes the ancestry walk from `from_bc`
/// (exclusive; `None` means root) to `to_bc` (inclusive) into per-branch
/// linear runs.
///
/// Open-question decision (see `DESIGN.md`): interval bounds are
/// inclusive-inclusive, matching spec §4.1's "`[from,to]` ranges" bracket
/// notation and the fact that a branch-clock's non-tail entry names the
/// exact commit branched from, which must be included in the fold.
pub fn intervals(from_bc: Option<&BranchClock>, to_bc: &BranchClock) -> Vec<Interval> {
    let to_clocks = to_bc.clocks();
    let from_clocks = from_bc.map(BranchClock::clocks).unwrap_or(&[]);

    let common_len = from_clocks
        .iter()
        .zip(to_clocks.iter())
        .take_while(|(f, t)| f.branch == t.branch)
        .count();

    let mut out = Vec::new();
    for (i, clock) in to_clocks.iter().enumerate() {
        let from_n = if i + 1 == common_len && i < from_clocks.len() {
            // This branch is shared with `from_bc`; only the commits strictly
            // after `from_bc`'s position on it are new.
            from_clocks[i].n + 1
        } else if i < common_len {
            // Fully shared prefix; nothing new on this branch.
            continue;
        } else {
            0
        };
        if from_n > clock.n {
            continue;
        }
        out.push(Interval {
            branch: clock.branch.clone(),
            from: from_n,
            to: clock.n,
        });
    }
    out
}

/// `interval_to_clocks(intervals, reverse)`: flattens intervals into an
/// ordered sequence of individual [`Clock`] steps.
///
/// Open-question decision: spec §4.1 says this yields "`BranchClock` values",
/// but the only thing distinguishing one step from the next within an
/// interval is its `(branch, n)` pair (the index keys in §3 are keyed on
/// exactly that), so this returns [`Clock`] rather than reconstructing a
/// full ancestor chain per step.
pub fn interval_to_clocks(intervals: &[Interval], reverse: bool) -> Vec<Clock> {
    let mut out = Vec::new();
    for interval in intervals {
        for n in interval.from..=interval.to {
            out.push(Clock::new(interval.branch.clone(), n));
        }
    }
    if reverse {
        out.reverse();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_branch_starts_at_zero() {
        let bc = BranchClock::new_branch("master");
        assert_eq!(bc.tail(), &Clock::new("master", 0));
    }

    #[test]
    fn child_increments_tail_only() {
        let bc = BranchClock::new_branch("master").child().child();
        assert_eq!(bc.tail().n, 2);
        assert_eq!(bc.branch_name(), "master");
    }

    #[test]
    fn branch_off_appends_new_tail() {
        let master = BranchClock::new_branch("master").child().child().child();
        let dev = BranchClock::branch_off(std::slice::from_ref(&master), "master", "dev").unwrap();
        assert_eq!(dev.clocks(), &[Clock::new("master", 3), Clock::new("dev", 0)]);
        assert_eq!(dev.branch_name(), "dev");
    }

    #[test]
    fn branch_off_rejects_existing_branch() {
        let master = BranchClock::new_branch("master");
        let err = BranchClock::branch_off(std::slice::from_ref(&master), "master", "master")
            .unwrap_err();
        assert_eq!(
            err,
            ClockError::BranchExists {
                branch: "master".to_string()
            }
        );
    }

    #[test]
    fn intervals_from_root_spans_every_branch_from_zero() {
        let to = BranchClock::from_clocks(vec![Clock::new("master", 3), Clock::new("dev", 2)]);
        let got = intervals(None, &to);
        assert_eq!(
            got,
            vec![
                Interval {
                    branch: "master".into(),
                    from: 0,
                    to: 3
                },
                Interval {
                    branch: "dev".into(),
                    from: 0,
                    to: 2
                },
            ]
        );
    }

    #[test]
    fn intervals_from_ancestor_on_same_branch_excludes_from() {
        let from = BranchClock::from_clocks(vec![Clock::new("master", 1)]);
        let to = BranchClock::from_clocks(vec![Clock::new("master", 3)]);
        let got = intervals(Some(&from), &to);
        assert_eq!(
            got,
            vec![Interval {
                branch: "master".into(),
                from: 2,
                to: 3
            }]
        );
    }

    #[test]
    fn intervals_from_shared_ancestor_branch_then_fork() {
        let from = BranchClock::from_clocks(vec![Clock::new("master", 1)]);
        let to = BranchClock::from_clocks(vec![Clock::new("master", 3), Clock::new("dev", 2)]);
        let got = intervals(Some(&from), &to);
        assert_eq!(
            got,
            vec![
                Interval {
                    branch: "master".into(),
                    from: 2,
                    to: 3
                },
                Interval {
                    branch: "dev".into(),
                    from: 0,
                    to: 2
                },
            ]
        );
    }

    #[test]
    fn interval_to_clocks_flattens_ascending_and_descending() {
        let ivals = vec![Interval {
            branch: "master".into(),
            from: 0,
            to: 2,
        }];
        let asc = interval_to_clocks(&ivals, false);
        assert_eq!(
            asc,
            vec![
                Clock::new("master", 0),
                Clock::new("master", 1),
                Clock::new("master", 2)
            ]
        );
        let desc = interval_to_clocks(&ivals, true);
        assert_eq!(
            desc,
            vec![
                Clock::new("master", 2),
                Clock::new("master", 1),
                Clock::new("master", 0)
            ]
        );
    }
}
