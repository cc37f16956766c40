//! Pipeline executions: one deployment attempt of one component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    InProgress,
    Stopped,
    Superseded,
    Unknown,
}

impl ExecutionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SUCCEEDED" | "SUCCESS" => Self::Succeeded,
            "FAILED" | "FAILURE" => Self::Failed,
            "IN_PROGRESS" | "INPROGRESS" | "RUNNING" => Self::InProgress,
            "STOPPED" | "STOPPING" | "CANCELLED" => Self::Stopped,
            "SUPERSEDED" => Self::Superseded,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRevision {
    #[serde(default)]
    pub action_name: String,
    pub revision_id: String,
    pub summary: Option<String>,
    pub url: Option<String>,
}

impl SourceRevision {
    /// Whether the revision id names an object-store version rather than a
    /// version-control commit.
    pub fn is_object_version(&self) -> bool {
        self.summary
            .as_deref()
            .map(|s| {
                let lower = s.to_ascii_lowercase();
                lower.contains("version id")
                    || lower.contains("versionid")
                    || lower.contains("s3 version")
            })
            .unwrap_or(false)
    }
}

/// Where a pipeline's source action reads its artifact bundle from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceStageConfig {
    pub bucket: String,
    pub object_key: String,
}

/// Listing entry for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecutionRecord {
    pub pipeline_name: String,
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_revisions: Vec<SourceRevision>,
}

impl PipelineExecutionRecord {
    pub fn primary_revision(&self) -> Option<&SourceRevision> {
        self.source_revisions.first()
    }
}
