//! Wire types for the Cloud Build v1 REST API.

use cascade_core::revision::RevisionSelector;
use cascade_core::status::BuildStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Substitution key carrying the commit the build resolved to.
pub const REVISION_ID: &str = "REVISION_ID";

#[derive(Debug, Default, Deserialize)]
pub struct ListTriggersResponse {
    #[serde(default)]
    pub triggers: Vec<WireTrigger>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTrigger {
    pub id: String,
    pub name: String,
}

/// The revision a triggered build starts from: exactly one of the two
/// fields is set.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepoSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

impl From<&RevisionSelector> for RepoSource {
    fn from(revision: &RevisionSelector) -> Self {
        match revision {
            RevisionSelector::CommitSha(sha) => RepoSource {
                commit_sha: Some(sha.clone()),
                branch_name: None,
            },
            RevisionSelector::BranchName(branch) => RepoSource {
                commit_sha: None,
                branch_name: Some(branch.clone()),
            },
        }
    }
}

/// The long-running operation envelope returned by `triggers.run`. Only
/// the embedded build is interesting here.
#[derive(Debug, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub metadata: Option<OperationMetadata>,
    #[serde(default)]
    pub error: Option<StatusBody>,
}

#[derive(Debug, Deserialize)]
pub struct OperationMetadata {
    #[serde(default)]
    pub build: Option<WireBuild>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBuild {
    pub id: String,
    #[serde(default)]
    pub status: Option<BuildStatus>,
    #[serde(default)]
    pub log_url: String,
    #[serde(default)]
    pub substitutions: HashMap<String, String>,
}

/// Error envelope wrapping googleapis `Status` bodies.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: StatusBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    pub message: String,
}
