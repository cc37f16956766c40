//! Interfaces of the external services the tracker reads from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ExecutionSummary, PipelineExecutionRecord, RawBuild, SourceStageConfig};

/// Build-execution service.
#[async_trait]
pub trait BuildSource: Send + Sync {
    /// Most recent build ids of a project, newest first.
    async fn list_build_ids(&self, project: &str, limit: usize) -> Result<Vec<String>>;

    /// Details for up to [`MAX_BATCH`] builds. Unknown ids are skipped.
    async fn batch_get_builds(&self, ids: &[String]) -> Result<Vec<RawBuild>>;
}

pub const MAX_BATCH: usize = 100;

/// Pipeline-execution service.
#[async_trait]
pub trait PipelineSource: Send + Sync {
    async fn list_pipelines(&self) -> Result<Vec<String>>;

    /// Most recent runs of a pipeline, newest first.
    async fn list_executions(&self, pipeline: &str, limit: usize) -> Result<Vec<ExecutionSummary>>;

    async fn get_execution(
        &self,
        pipeline: &str,
        execution_id: &str,
    ) -> Result<PipelineExecutionRecord>;

    /// Artifact location of the pipeline's source action, if it reads from
    /// object storage.
    async fn get_source_stage(&self, pipeline: &str) -> Result<Option<SourceStageConfig>>;
}

/// Object storage, used only to resolve object-version revisions.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub message: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareResult {
    /// Commits in `head` that `base` lacks.
    pub ahead_by: u32,
    /// Commits in `base` that `head` lacks.
    pub behind_by: u32,
}

/// Version-control hosting API.
#[async_trait]
pub trait VcsHost: Send + Sync {
    async fn get_commit(&self, sha: &str) -> Result<CommitInfo>;

    /// Pull request whose merge commit is `sha`.
    async fn find_merged_pull_request(&self, sha: &str) -> Result<Option<u64>>;

    async fn compare(&self, base: &str, head: &str) -> Result<CompareResult>;
}
