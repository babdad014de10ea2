//! Source revision selection.
//!
//! A build is started either from a movable reference (a branch name) or
//! from an exact commit. The distinction matters for revision pinning:
//! once any build in a run resolves a concrete commit, every later build
//! in the same run is started from that exact commit.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static COMMIT_SHA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[0-9a-f]{5,40}$").expect("commit sha pattern is valid")
});

/// Whether a reference string has the shape of an abbreviated or full
/// git commit hash.
pub fn is_commit_sha(reference: &str) -> bool {
    COMMIT_SHA.is_match(reference)
}

/// What to build: an exact commit, or the tip of a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionSelector {
    CommitSha(String),
    BranchName(String),
}

impl RevisionSelector {
    pub fn from_ref(reference: &str) -> Self {
        if is_commit_sha(reference) {
            RevisionSelector::CommitSha(reference.to_string())
        } else {
            RevisionSelector::BranchName(reference.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RevisionSelector::CommitSha(sha) => sha,
            RevisionSelector::BranchName(branch) => branch,
        }
    }
}
