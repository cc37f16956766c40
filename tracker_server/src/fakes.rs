//! In-memory fakes of the external services (tests and local runs)
//!
//! Every fake counts calls per operation and can be told to fail the next
//! call(s) of an operation with a given error.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Result, TrackerError};
use crate::models::{ExecutionSummary, PipelineExecutionRecord, RawBuild, SourceStageConfig};
use crate::services::sources::{
    BuildSource, CommitInfo, CompareResult, ObjectStore, PipelineSource, VcsHost,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

/// Call counters plus queued failures, keyed by operation name.
#[derive(Debug, Default)]
pub struct Faults {
    queued: Mutex<HashMap<&'static str, VecDeque<TrackerError>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Faults {
    /// Count a call and pop the next queued failure, if any.
    fn enter(&self, operation: &'static str) -> Result<()> {
        *lock(&self.calls).entry(operation).or_default() += 1;
        match lock(&self.queued).get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn fail_next(&self, operation: &'static str, error: TrackerError) {
        lock(&self.queued).entry(operation).or_default().push_back(error);
    }

    /// Queue `times` rate-limit refusals for `operation`.
    pub fn rate_limit(&self, operation: &'static str, service: &'static str, times: usize) {
        for _ in 0..times {
            self.fail_next(
                operation,
                TrackerError::RateLimited {
                    service,
                    message: "Rate exceeded".to_string(),
                },
            );
        }
    }

    pub fn calls(&self, operation: &str) -> usize {
        lock(&self.calls).get(operation).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// MemoryBuildSource
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryBuildSource {
    builds: Mutex<Vec<RawBuild>>,
    batch_sizes: Mutex<Vec<usize>>,
    pub faults: Faults,
}

impl MemoryBuildSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, build: RawBuild) {
        lock(&self.builds).push(build);
    }

    /// Sizes of every batch request received, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batch_sizes).clone()
    }
}

#[async_trait]
impl BuildSource for MemoryBuildSource {
    async fn list_build_ids(&self, project: &str, limit: usize) -> Result<Vec<String>> {
        self.faults.enter("list_build_ids")?;
        let mut builds: Vec<RawBuild> = lock(&self.builds)
            .iter()
            .filter(|b| b.project_name == project)
            .cloned()
            .collect();
        builds.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(builds.into_iter().take(limit).map(|b| b.id).collect())
    }

    async fn batch_get_builds(&self, ids: &[String]) -> Result<Vec<RawBuild>> {
        self.faults.enter("batch_get_builds")?;
        lock(&self.batch_sizes).push(ids.len());
        let builds = lock(&self.builds);
        Ok(ids
            .iter()
            .filter_map(|id| builds.iter().find(|b| &b.id == id).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryPipelineSource
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPipelineSource {
    executions: Mutex<HashMap<String, Vec<PipelineExecutionRecord>>>,
    source_stages: Mutex<HashMap<String, SourceStageConfig>>,
    pub faults: Faults,
}

impl MemoryPipelineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_execution(&self, execution: PipelineExecutionRecord) {
        lock(&self.executions)
            .entry(execution.pipeline_name.clone())
            .or_default()
            .push(execution);
    }

    pub fn set_source_stage(&self, pipeline: &str, config: SourceStageConfig) {
        lock(&self.source_stages).insert(pipeline.to_string(), config);
    }
}

#[async_trait]
impl PipelineSource for MemoryPipelineSource {
    async fn list_pipelines(&self) -> Result<Vec<String>> {
        self.faults.enter("list_pipelines")?;
        let mut names: Vec<String> = lock(&self.executions).keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn list_executions(&self, pipeline: &str, limit: usize) -> Result<Vec<ExecutionSummary>> {
        self.faults.enter("list_executions")?;
        let mut runs = lock(&self.executions).get(pipeline).cloned().unwrap_or_default();
        runs.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(runs
            .into_iter()
            .take(limit)
            .map(|run| ExecutionSummary {
                execution_id: run.execution_id,
                status: run.status,
                last_update: run.completed_at,
            })
            .collect())
    }

    async fn get_execution(
        &self,
        pipeline: &str,
        execution_id: &str,
    ) -> Result<PipelineExecutionRecord> {
        self.faults.enter("get_execution")?;
        lock(&self.executions)
            .get(pipeline)
            .and_then(|runs| runs.iter().find(|r| r.execution_id == execution_id).cloned())
            .ok_or_else(|| TrackerError::NotFound(format!("execution {pipeline}/{execution_id}")))
    }

    async fn get_source_stage(&self, pipeline: &str) -> Result<Option<SourceStageConfig>> {
        self.faults.enter("get_source_stage")?;
        Ok(lock(&self.source_stages).get(pipeline).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String, String), Vec<u8>>>,
    pub faults: Faults,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, version_id: &str, bytes: Vec<u8>) {
        lock(&self.objects).insert(
            (bucket.to_string(), key.to_string(), version_id.to_string()),
            bytes,
        );
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<Vec<u8>> {
        self.faults.enter("get_object_version")?;
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string(), version_id.to_string()))
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("object {bucket}/{key}@{version_id}")))
    }
}

// ---------------------------------------------------------------------------
// MemoryVcs
// ---------------------------------------------------------------------------

/// Commits are looked up by case-insensitive prefix, so short and full
/// hashes both resolve.
#[derive(Debug, Default)]
pub struct MemoryVcs {
    commits: Mutex<Vec<CommitInfo>>,
    merged: Mutex<HashMap<String, u64>>,
    comparisons: Mutex<HashMap<(String, String), CompareResult>>,
    pub faults: Faults,
}

impl MemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_commit(&self, sha: &str, author: &str, message: &str) {
        lock(&self.commits).push(CommitInfo {
            sha: sha.to_ascii_lowercase(),
            author: author.to_string(),
            message: message.to_string(),
            date: None,
        });
    }

    pub fn add_merged_pull_request(&self, merge_sha: &str, number: u64) {
        lock(&self.merged).insert(merge_sha.to_ascii_lowercase(), number);
    }

    pub fn set_comparison(&self, base: &str, head: &str, result: CompareResult) {
        lock(&self.comparisons).insert(
            (base.to_ascii_lowercase(), head.to_ascii_lowercase()),
            result,
        );
    }
}

#[async_trait]
impl VcsHost for MemoryVcs {
    async fn get_commit(&self, sha: &str) -> Result<CommitInfo> {
        self.faults.enter("get_commit")?;
        let sha = sha.to_ascii_lowercase();
        lock(&self.commits)
            .iter()
            .find(|c| c.sha.starts_with(&sha) || sha.starts_with(&c.sha))
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("commit {sha}")))
    }

    async fn find_merged_pull_request(&self, sha: &str) -> Result<Option<u64>> {
        self.faults.enter("find_merged_pull_request")?;
        Ok(lock(&self.merged).get(&sha.to_ascii_lowercase()).copied())
    }

    async fn compare(&self, base: &str, head: &str) -> Result<CompareResult> {
        self.faults.enter("compare")?;
        lock(&self.comparisons)
            .get(&(base.to_ascii_lowercase(), head.to_ascii_lowercase()))
            .copied()
            .ok_or_else(|| TrackerError::NotFound(format!("comparison {base}...{head}")))
    }
}
