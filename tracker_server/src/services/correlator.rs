//! Artifact correlator: finds the build whose artifact a pipeline execution
//! deployed.
//!
//! The source revision is first resolved to what was deployed (an image
//! reference and/or a commit). Matching strategies then run in order and the
//! first hit wins:
//!
//! 1. exact image reference
//! 2. image tag
//! 3. commit hash
//!
//! No hit yields an uncorrelated record. There is deliberately no
//! closest-in-time fallback.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Result, TrackerError};
use crate::events::{self, TrackerEvent};
use crate::models::artifact::image_tag;
use crate::models::{
    BuildRecord, Component, DeploymentRecord, Environment, MatchMethod, PipelineExecutionRecord,
};
use crate::services::bundle::{self, BundleManifest, SHORT_SHA_LEN};
use crate::services::cache::TrackerCaches;
use crate::services::sources::{ObjectStore, PipelineSource};
use crate::services::upstream::Upstream;

/// What the execution actually deployed, as far as it could be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployedArtifact {
    pub image_reference: Option<String>,
    pub commit: Option<String>,
}

pub trait MatchStrategy: Send + Sync {
    fn method(&self) -> MatchMethod;

    /// Candidates reaching a strategy are already filtered to successful
    /// builds.
    fn matches(&self, deployed: &DeployedArtifact, candidate: &BuildRecord) -> bool;
}

pub struct ExactImage;

impl MatchStrategy for ExactImage {
    fn method(&self) -> MatchMethod {
        MatchMethod::ExactImage
    }

    fn matches(&self, deployed: &DeployedArtifact, candidate: &BuildRecord) -> bool {
        match (&deployed.image_reference, &candidate.artifact.image_reference) {
            (Some(deployed), Some(built)) => deployed.trim() == built.trim(),
            _ => false,
        }
    }
}

pub struct TagSuffix;

impl MatchStrategy for TagSuffix {
    fn method(&self) -> MatchMethod {
        MatchMethod::TagSuffix
    }

    fn matches(&self, deployed: &DeployedArtifact, candidate: &BuildRecord) -> bool {
        let deployed_tag = deployed.image_reference.as_deref().and_then(image_tag);
        match (deployed_tag, candidate.artifact.tag()) {
            (Some(deployed), Some(built)) => deployed == built,
            _ => false,
        }
    }
}

pub struct CommitHash;

impl MatchStrategy for CommitHash {
    fn method(&self) -> MatchMethod {
        MatchMethod::CommitHash
    }

    fn matches(&self, deployed: &DeployedArtifact, candidate: &BuildRecord) -> bool {
        match (&deployed.commit, &candidate.resolved_commit) {
            (Some(deployed), Some(built)) => commits_match(deployed, built),
            _ => false,
        }
    }
}

/// Case-insensitive prefix match in either direction, at least seven chars.
pub fn commits_match(a: &str, b: &str) -> bool {
    let a = a.trim().to_ascii_lowercase();
    let b = b.trim().to_ascii_lowercase();
    if a.len() < SHORT_SHA_LEN || b.len() < SHORT_SHA_LEN {
        return false;
    }
    a.starts_with(&b) || b.starts_with(&a)
}

pub fn default_strategies() -> Vec<Box<dyn MatchStrategy>> {
    vec![Box::new(ExactImage), Box::new(TagSuffix), Box::new(CommitHash)]
}

/// Run the matching cascade over `candidates`. Unsuccessful builds are never
/// considered. Several hits in one stage resolve to the latest finished build,
/// then the greatest id, so the result is stable.
pub fn match_build<'a>(
    strategies: &[Box<dyn MatchStrategy>],
    deployed: &DeployedArtifact,
    candidates: &'a [BuildRecord],
) -> Option<(&'a BuildRecord, MatchMethod)> {
    let eligible: Vec<&BuildRecord> = candidates.iter().filter(|b| b.status.is_success()).collect();

    for strategy in strategies {
        let best = eligible
            .iter()
            .copied()
            .filter(|build| strategy.matches(deployed, build))
            .max_by(|a, b| newest_first(a, b));
        if let Some(build) = best {
            return Some((build, strategy.method()));
        }
        events::emit(&TrackerEvent::CorrelationStageMissed {
            method: strategy.method(),
        });
    }
    None
}

fn newest_first(a: &BuildRecord, b: &BuildRecord) -> Ordering {
    a.finished_at()
        .cmp(&b.finished_at())
        .then_with(|| a.id.cmp(&b.id))
}

pub struct ArtifactCorrelator {
    pipelines: Arc<dyn PipelineSource>,
    objects: Arc<dyn ObjectStore>,
    upstream: Upstream,
    caches: Arc<TrackerCaches>,
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl ArtifactCorrelator {
    pub fn new(
        pipelines: Arc<dyn PipelineSource>,
        objects: Arc<dyn ObjectStore>,
        upstream: Upstream,
        caches: Arc<TrackerCaches>,
    ) -> Self {
        Self {
            pipelines,
            objects,
            upstream,
            caches,
            strategies: default_strategies(),
        }
    }

    /// Correlate one completed execution against the candidate builds of the
    /// same project. A malformed bundle only removes information and the
    /// cascade still ends in a record; failed lookups are returned as errors.
    pub async fn correlate(
        &self,
        environment: Environment,
        component: Component,
        execution: &PipelineExecutionRecord,
        candidates: &[BuildRecord],
    ) -> Result<DeploymentRecord> {
        let deployed = self.resolve_revision(execution).await?;

        let record = match match_build(&self.strategies, &deployed, candidates) {
            Some((build, method)) => {
                events::emit(&TrackerEvent::BuildCorrelated {
                    environment,
                    component,
                    execution_id: &execution.execution_id,
                    build_id: &build.id,
                    method,
                });
                DeploymentRecord::correlated(
                    environment,
                    component,
                    execution,
                    build.clone(),
                    method,
                    deployed.commit.clone(),
                )
            }
            None => {
                events::emit(&TrackerEvent::DeploymentUncorrelated {
                    environment,
                    component,
                    execution_id: &execution.execution_id,
                    commit: deployed.commit.as_deref(),
                });
                DeploymentRecord::uncorrelated(environment, component, execution, deployed.commit)
            }
        };
        crate::metrics::correlation(record.match_method());
        Ok(record)
    }

    /// Stage 1 and 2: classify the primary revision and, for object versions,
    /// read the deployed image out of the bundle. An unusable bundle resolves
    /// to nothing; a failed or rate-limited lookup is an error.
    pub async fn resolve_revision(
        &self,
        execution: &PipelineExecutionRecord,
    ) -> Result<DeployedArtifact> {
        let Some(revision) = execution.primary_revision() else {
            return Ok(DeployedArtifact::default());
        };

        if !revision.is_object_version() {
            let commit = revision.revision_id.trim();
            return Ok(DeployedArtifact {
                image_reference: None,
                commit: (!commit.is_empty()).then(|| commit.to_ascii_lowercase()),
            });
        }

        match self.read_bundle(&execution.pipeline_name, &revision.revision_id).await {
            Ok(Some(manifest)) => Ok(DeployedArtifact {
                image_reference: Some(manifest.image_reference),
                commit: manifest.commit,
            }),
            Ok(None) => Ok(DeployedArtifact::default()),
            Err(TrackerError::MalformedBundle(reason)) => {
                tracing::warn!(
                    execution_id = %execution.execution_id,
                    %reason,
                    "Unreadable artifact bundle"
                );
                Ok(DeployedArtifact::default())
            }
            Err(err) => Err(err),
        }
    }

    /// `Ok(None)` when the bundle is unusable (no source stage, malformed
    /// archive or manifest); `Err` only for failed lookups.
    async fn read_bundle(
        &self,
        pipeline: &str,
        version_id: &str,
    ) -> Result<Option<BundleManifest>> {
        let source = self
            .caches
            .source_stages
            .get_or_try_insert_with(pipeline.to_string(), || {
                self.upstream.call("pipelines", "get_source_stage", || {
                    self.pipelines.get_source_stage(pipeline)
                })
            })
            .await?;
        let Some(source) = source else {
            tracing::debug!(pipeline, "Pipeline has no object-store source stage");
            return Ok(None);
        };

        let cache_key = (
            format!("{}/{}", source.bucket, source.object_key),
            version_id.to_string(),
        );
        self.caches
            .bundles
            .get_or_try_insert_with(cache_key, || async move {
                let bytes = self
                    .upstream
                    .call("objects", "get_object_version", || {
                        self.objects
                            .get_object_version(&source.bucket, &source.object_key, version_id)
                    })
                    .await?;
                let parsed = tokio::task::spawn_blocking(move || bundle::read_manifest(&bytes))
                    .await
                    .map_err(|e| {
                        TrackerError::MalformedBundle(format!("bundle reader panicked: {e}"))
                    })?;
                match parsed {
                    Ok(manifest) => Ok(Some(manifest)),
                    Err(err) => {
                        tracing::warn!(
                            pipeline,
                            version_id,
                            error = %err,
                            "Unusable artifact bundle"
                        );
                        Ok(None)
                    }
                }
            })
            .await
    }
}
