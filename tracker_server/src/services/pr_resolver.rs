//! Pull-request resolution: an ordered list of strategies, first success
//! wins and an already-set number is never replaced.
//!
//! Per-build stages: execution metadata hint, source reference, commit
//! message. The merge-commit search runs afterwards over the whole batch
//! (see [`PrResolver::resolve_merged_main`]).

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::events::{self, TrackerEvent};
use crate::models::{BuildRecord, PrSource, SourceBranch};
use crate::services::cache::TrackerCaches;
use crate::services::classifier::parse_pr_reference;
use crate::services::sources::VcsHost;
use crate::services::upstream::Upstream;

/// Commit-message patterns in priority order. A bare `#N` is deliberately
/// absent: hotfix bodies reference issues that way.
static COMMIT_PR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"Merge pull request #(\d+)").unwrap(),
        Regex::new(r"\(#(\d+)\)").unwrap(),
        Regex::new(r"(?i)\bPR #(\d+)").unwrap(),
    ]
});

/// Execution-metadata keys that may carry a PR number.
const PR_HINT_KEYS: &[&str] = &[
    "PR_NUMBER",
    "PULL_REQUEST_NUMBER",
    "GITHUB_PR_NUMBER",
    "CODEBUILD_WEBHOOK_TRIGGER",
];

/// A failed lookup inside one resolution stage.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: PrSource,
    pub error: crate::error::TrackerError,
}

#[async_trait]
pub trait PrStrategy: Send + Sync {
    fn stage(&self) -> PrSource;

    async fn attempt(&self, build: &BuildRecord) -> Result<Option<u64>>;
}

/// Stage 1: PR hint in the build's execution metadata.
pub struct MetadataHint;

#[async_trait]
impl PrStrategy for MetadataHint {
    fn stage(&self) -> PrSource {
        PrSource::ExecutionMetadata
    }

    async fn attempt(&self, build: &BuildRecord) -> Result<Option<u64>> {
        Ok(PR_HINT_KEYS
            .iter()
            .filter_map(|key| build.metadata.get(*key))
            .find_map(|value| parse_hint(value)))
    }
}

fn parse_hint(value: &str) -> Option<u64> {
    let value = value.trim();
    value
        .parse::<u64>()
        .ok()
        .or_else(|| parse_pr_reference(value))
        .filter(|n| *n > 0)
}

/// Stage 2: PR number embedded in the source reference.
pub struct SourceReference;

#[async_trait]
impl PrStrategy for SourceReference {
    fn stage(&self) -> PrSource {
        PrSource::SourceReference
    }

    async fn attempt(&self, build: &BuildRecord) -> Result<Option<u64>> {
        Ok(parse_pr_reference(&build.source_reference))
    }
}

/// Stage 3: PR number in the resolved commit's message.
pub struct CommitMessage {
    vcs: Arc<dyn VcsHost>,
    upstream: Upstream,
    caches: Arc<TrackerCaches>,
}

impl CommitMessage {
    pub fn new(vcs: Arc<dyn VcsHost>, upstream: Upstream, caches: Arc<TrackerCaches>) -> Self {
        Self { vcs, upstream, caches }
    }
}

#[async_trait]
impl PrStrategy for CommitMessage {
    fn stage(&self) -> PrSource {
        PrSource::CommitMessage
    }

    async fn attempt(&self, build: &BuildRecord) -> Result<Option<u64>> {
        let Some(sha) = build.resolved_commit.as_deref() else {
            return Ok(None);
        };
        let commit = fetch_commit(&self.vcs, &self.upstream, &self.caches, sha).await?;
        Ok(pr_from_commit_message(&commit.message))
    }
}

pub fn pr_from_commit_message(message: &str) -> Option<u64> {
    COMMIT_PR_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// Commit metadata through the cache and throttler. Shared with the hotfix
/// detector so each commit is fetched at most once per TTL.
pub async fn fetch_commit(
    vcs: &Arc<dyn VcsHost>,
    upstream: &Upstream,
    caches: &TrackerCaches,
    sha: &str,
) -> Result<crate::services::sources::CommitInfo> {
    caches
        .commits
        .get_or_try_insert_with(sha.to_string(), || {
            upstream.call("github", "get_commit", || vcs.get_commit(sha))
        })
        .await
}

pub struct PrResolver {
    strategies: Vec<Box<dyn PrStrategy>>,
    vcs: Arc<dyn VcsHost>,
    upstream: Upstream,
    caches: Arc<TrackerCaches>,
}

impl PrResolver {
    pub fn new(vcs: Arc<dyn VcsHost>, upstream: Upstream, caches: Arc<TrackerCaches>) -> Self {
        let strategies: Vec<Box<dyn PrStrategy>> = vec![
            Box::new(MetadataHint),
            Box::new(SourceReference),
            Box::new(CommitMessage::new(vcs.clone(), upstream.clone(), caches.clone())),
        ];
        Self {
            strategies,
            vcs,
            upstream,
            caches,
        }
    }

    /// Run the per-build cascade. A failing stage is recorded and the next
    /// stage still runs.
    pub async fn resolve(&self, build: &mut BuildRecord) -> Vec<StageFailure> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            if !build.is_unresolved() {
                break;
            }
            match strategy.attempt(build).await {
                Ok(Some(number)) => {
                    if build.set_pull_request(number, strategy.stage()) {
                        events::emit(&TrackerEvent::PullRequestResolved {
                            build_id: &build.id,
                            number,
                            stage: strategy.stage(),
                        });
                    }
                }
                Ok(None) => {}
                Err(error) => failures.push(StageFailure {
                    stage: strategy.stage(),
                    error,
                }),
            }
        }
        failures
    }

    /// Final pass: unresolved `main` builds are looked up by merge commit.
    pub async fn resolve_merged_main(
        &self,
        builds: &mut [BuildRecord],
    ) -> Vec<(String, StageFailure)> {
        let mut failures = Vec::new();
        for build in builds.iter_mut() {
            if !build.is_unresolved() || build.source_branch != Some(SourceBranch::Main) {
                continue;
            }
            let Some(sha) = build.resolved_commit.clone() else {
                continue;
            };
            let found = self
                .caches
                .merged_prs
                .get_or_try_insert_with(sha.clone(), || {
                    self.upstream
                        .call("github", "find_merged_pull_request", || {
                            self.vcs.find_merged_pull_request(&sha)
                        })
                })
                .await;
            match found {
                Ok(Some(number)) => {
                    if build.set_pull_request(number, PrSource::MergeCommitSearch) {
                        events::emit(&TrackerEvent::PullRequestResolved {
                            build_id: &build.id,
                            number,
                            stage: PrSource::MergeCommitSearch,
                        });
                    }
                }
                Ok(None) => {}
                Err(error) => failures.push((
                    build.id.clone(),
                    StageFailure {
                        stage: PrSource::MergeCommitSearch,
                        error,
                    },
                )),
            }
        }
        failures
    }
}
