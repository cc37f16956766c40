//! Build records: one executed build plus its derived classification and
//! identity facts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::artifact::ArtifactDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Succeeded,
    Failed,
    InProgress,
    Stopped,
    Timeout,
    Fault,
    Unknown,
}

impl BuildStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SUCCEEDED" | "SUCCESS" => Self::Succeeded,
            "FAILED" | "FAILURE" => Self::Failed,
            "IN_PROGRESS" | "RUNNING" => Self::InProgress,
            "STOPPED" | "CANCELLED" => Self::Stopped,
            "TIMED_OUT" | "TIMEOUT" => Self::Timeout,
            "FAULT" => Self::Fault,
            _ => Self::Unknown,
        }
    }

    /// The only terminal state a deployed artifact may come from.
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildCategory {
    Production,
    DevTest,
    MainTest,
    Unknown,
}

impl BuildCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::DevTest => "dev-test",
            Self::MainTest => "main-test",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_deployable(self) -> bool {
        self != Self::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBranch {
    Main,
    Dev,
    Feature,
}

impl SourceBranch {
    /// Direct commits to a tracked branch (as opposed to PR builds).
    pub fn is_tracked(self) -> bool {
        matches!(self, Self::Main | Self::Dev)
    }
}

/// Which step of the resolution cascade produced a pull-request number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrSource {
    Trigger,
    ExecutionMetadata,
    SourceReference,
    CommitMessage,
    MergeCommitSearch,
}

impl PrSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::ExecutionMetadata => "execution_metadata",
            Self::SourceReference => "source_reference",
            Self::CommitMessage => "commit_message",
            Self::MergeCommitSearch => "merge_commit_search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotfixDetails {
    pub is_hotfix: bool,
    pub branch: SourceBranch,
    pub author: String,
    pub message: String,
    pub date: Option<DateTime<Utc>>,
}

/// Why a build exists. A build is a PR build or a hotfix, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildOrigin {
    PullRequest { number: u64, resolved_by: PrSource },
    Hotfix(HotfixDetails),
    Unresolved,
}

/// A build execution as read from the build service, before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBuild {
    pub id: String,
    pub project_name: String,
    pub status: String,
    #[serde(default)]
    pub source_reference: String,
    pub resolved_commit: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// PR number carried by the webhook trigger, if any.
    pub trigger_pr: Option<u64>,
    /// Execution environment (e.g. `PR_NUMBER`).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub artifact: ArtifactDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: String,
    pub project_name: String,
    pub status: BuildStatus,
    pub source_reference: String,
    pub resolved_commit: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub category: BuildCategory,
    pub source_branch: Option<SourceBranch>,
    pub origin: BuildOrigin,
    pub artifact: ArtifactDescriptor,
    #[serde(skip)]
    pub metadata: BTreeMap<String, String>,
}

impl BuildRecord {
    pub fn pull_request_number(&self) -> Option<u64> {
        match self.origin {
            BuildOrigin::PullRequest { number, .. } => Some(number),
            _ => None,
        }
    }

    pub fn hotfix(&self) -> Option<&HotfixDetails> {
        match &self.origin {
            BuildOrigin::Hotfix(details) => Some(details),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.origin == BuildOrigin::Unresolved
    }

    /// Record a PR number unless an earlier stage already settled the origin.
    /// Returns whether the number was taken.
    pub fn set_pull_request(&mut self, number: u64, resolved_by: PrSource) -> bool {
        if !self.is_unresolved() {
            return false;
        }
        self.origin = BuildOrigin::PullRequest {
            number,
            resolved_by,
        };
        true
    }

    /// Mark as hotfix; refused when the build already carries a PR number.
    pub fn set_hotfix(&mut self, details: HotfixDetails) -> bool {
        if !self.is_unresolved() {
            return false;
        }
        self.origin = BuildOrigin::Hotfix(details);
        true
    }

    /// Timestamp used for ordering: end time, else start time.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.or(self.start_time)
    }
}
