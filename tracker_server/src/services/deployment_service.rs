//! What is deployed where, what could be deployed next, and whether the
//! production builds lag their reference environment.

use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::models::{
    BuildRecord, Component, DeploymentRecord, Environment, ExecutionStatus, PipelineExecutionRecord,
};
use crate::services::cache::TrackerCaches;
use crate::services::correlator::{commits_match, ArtifactCorrelator};
use crate::services::sources::{CompareResult, ObjectStore, PipelineSource, VcsHost};
use crate::services::upstream::Upstream;

pub struct DeploymentService {
    config: Arc<TrackerConfig>,
    pipelines: Arc<dyn PipelineSource>,
    vcs: Arc<dyn VcsHost>,
    upstream: Upstream,
    caches: Arc<TrackerCaches>,
    correlator: ArtifactCorrelator,
}

impl DeploymentService {
    pub fn new(
        config: Arc<TrackerConfig>,
        pipelines: Arc<dyn PipelineSource>,
        objects: Arc<dyn ObjectStore>,
        vcs: Arc<dyn VcsHost>,
        upstream: Upstream,
        caches: Arc<TrackerCaches>,
    ) -> Self {
        let correlator =
            ArtifactCorrelator::new(pipelines.clone(), objects, upstream.clone(), caches.clone());
        Self {
            config,
            pipelines,
            vcs,
            upstream,
            caches,
            correlator,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Builds of the project feeding `environment`, ignored ids removed.
    pub fn candidates(
        &self,
        environment: Environment,
        component: Component,
        builds: &[BuildRecord],
    ) -> Vec<BuildRecord> {
        let project = self.config.build_project(environment, component);
        builds
            .iter()
            .filter(|b| b.project_name == project && b.category.is_deployable())
            .filter(|b| !self.config.is_ignored(&b.id))
            .cloned()
            .collect()
    }

    /// Whether the pipeline service knows `pipeline`. The listing is cached.
    pub async fn pipeline_exists(&self, pipeline: &str) -> Result<bool> {
        let known = self
            .caches
            .pipelines
            .get_or_try_insert_with((), || {
                self.upstream
                    .call("pipelines", "list_pipelines", || self.pipelines.list_pipelines())
            })
            .await?;
        Ok(known.iter().any(|name| name == pipeline))
    }

    /// Latest successful run among the most recent executions of the
    /// component's pipeline. `None` when the pipeline does not exist.
    pub async fn latest_execution(
        &self,
        environment: Environment,
        component: Component,
    ) -> Result<Option<PipelineExecutionRecord>> {
        let pipeline = self.config.pipeline_name(environment, component);
        if !self.pipeline_exists(&pipeline).await? {
            tracing::debug!(%pipeline, "Pipeline not found");
            return Ok(None);
        }
        let lookback = self.config.execution_lookback;
        let runs = self
            .upstream
            .call("pipelines", "list_executions", || {
                self.pipelines.list_executions(&pipeline, lookback)
            })
            .await?;

        let Some(latest) = runs.into_iter().find(|r| r.status == ExecutionStatus::Succeeded) else {
            tracing::debug!(%pipeline, lookback, "No successful execution in lookback");
            return Ok(None);
        };
        let execution = self
            .upstream
            .call("pipelines", "get_execution", || {
                self.pipelines.get_execution(&pipeline, &latest.execution_id)
            })
            .await?;
        Ok(Some(execution))
    }

    /// Correlate the current deployment of `component`. `None` when the
    /// pipeline never completed successfully.
    pub async fn current_deployment(
        &self,
        environment: Environment,
        component: Component,
        builds: &[BuildRecord],
    ) -> Result<Option<DeploymentRecord>> {
        let Some(execution) = self.latest_execution(environment, component).await? else {
            return Ok(None);
        };
        let candidates = self.candidates(environment, component, builds);
        let record = self
            .correlator
            .correlate(environment, component, &execution, &candidates)
            .await?;
        Ok(Some(record))
    }

    /// Whether the newest successful build feeding `environment` lags the
    /// newest successful build of its reference environment. Environments
    /// without a reference are never stale.
    pub async fn is_stale(
        &self,
        environment: Environment,
        component: Component,
        builds: &[BuildRecord],
    ) -> Result<bool> {
        let Some(reference) = environment.reference() else {
            return Ok(false);
        };
        let target = latest_successful_commit(&self.candidates(environment, component, builds));
        let reference = latest_successful_commit(&self.candidates(reference, component, builds));
        let (Some(base), Some(head)) = (target, reference) else {
            return Ok(false);
        };
        if commits_match(&base, &head) {
            return Ok(false);
        }

        let result: CompareResult = self
            .caches
            .comparisons
            .get_or_try_insert_with((base.clone(), head.clone()), || {
                self.upstream
                    .call("github", "compare", || self.vcs.compare(&base, &head))
            })
            .await?;
        Ok(result.ahead_by >= 1)
    }
}

/// Builds that could replace the current deployment.
///
/// Correlated: newer successful builds with a different commit. Uncorrelated:
/// successful builds finished after the deployment. Nothing deployed: every
/// successful build.
pub fn available_builds(
    deployment: Option<&DeploymentRecord>,
    candidates: &[BuildRecord],
) -> Vec<BuildRecord> {
    let successful = candidates.iter().filter(|b| b.status.is_success());
    let mut available: Vec<BuildRecord> = match deployment {
        None => successful.cloned().collect(),
        Some(record) => match record.correlated_build() {
            Some(deployed) => successful
                .filter(|b| b.finished_at() > deployed.finished_at())
                .filter(|b| match (&b.resolved_commit, &deployed.resolved_commit) {
                    (Some(candidate), Some(current)) => !commits_match(candidate, current),
                    _ => true,
                })
                .cloned()
                .collect(),
            None => match record.deployed_at() {
                Some(deployed_at) => successful
                    .filter(|b| b.finished_at().is_some_and(|t| t > deployed_at))
                    .cloned()
                    .collect(),
                None => successful.cloned().collect(),
            },
        },
    };
    available.sort_by(|a, b| {
        b.finished_at()
            .cmp(&a.finished_at())
            .then_with(|| b.id.cmp(&a.id))
    });
    available
}

fn latest_successful_commit(builds: &[BuildRecord]) -> Option<String> {
    builds
        .iter()
        .filter(|b| b.status.is_success() && b.resolved_commit.is_some())
        .max_by(|a, b| {
            a.finished_at()
                .cmp(&b.finished_at())
                .then_with(|| a.id.cmp(&b.id))
        })
        .and_then(|b| b.resolved_commit.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArtifactDescriptor, BuildCategory, BuildOrigin, BuildStatus, MatchMethod, SourceBranch,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn build(id: &str, status: BuildStatus, commit: &str, minute: u32) -> BuildRecord {
        BuildRecord {
            id: id.into(),
            project_name: "shop-backend".into(),
            status,
            source_reference: "refs/heads/main".into(),
            resolved_commit: Some(commit.into()),
            start_time: None,
            end_time: Some(at(minute)),
            category: BuildCategory::Production,
            source_branch: Some(SourceBranch::Main),
            origin: BuildOrigin::Unresolved,
            artifact: ArtifactDescriptor::default(),
            metadata: BTreeMap::new(),
        }
    }

    fn execution(minute: u32) -> PipelineExecutionRecord {
        PipelineExecutionRecord {
            pipeline_name: "shop-backend-production".into(),
            execution_id: "e1".into(),
            status: ExecutionStatus::Succeeded,
            completed_at: Some(at(minute)),
            source_revisions: Vec::new(),
        }
    }

    #[test]
    fn newer_builds_with_new_commits_are_available() {
        let candidates = vec![
            build("old", BuildStatus::Succeeded, "1111111aaa", 1),
            build("current", BuildStatus::Succeeded, "2222222aaa", 5),
            build("rebuild", BuildStatus::Succeeded, "2222222aaa", 8),
            build("broken", BuildStatus::Failed, "3333333aaa", 9),
            build("next", BuildStatus::Succeeded, "4444444aaa", 10),
        ];
        let record = DeploymentRecord::correlated(
            Environment::Production,
            Component::Backend,
            &execution(6),
            candidates[1].clone(),
            MatchMethod::CommitHash,
            None,
        );
        let ids: Vec<String> = available_builds(Some(&record), &candidates)
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec!["next"]);
    }

    #[test]
    fn uncorrelated_deployments_compare_by_time() {
        let candidates = vec![
            build("before", BuildStatus::Succeeded, "1111111aaa", 1),
            build("after", BuildStatus::Succeeded, "2222222aaa", 20),
        ];
        let record = DeploymentRecord::uncorrelated(
            Environment::Production,
            Component::Backend,
            &execution(10),
            None,
        );
        let available = available_builds(Some(&record), &candidates);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "after");

        assert_eq!(available_builds(None, &candidates).len(), 2);
    }
}
