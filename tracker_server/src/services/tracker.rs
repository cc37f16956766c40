//! `DeployTracker`: the query surface. Wires the enrichment, correlation and
//! coordination stages over one set of external sources.

use std::sync::Arc;

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::dashboard::overview::{environment_overview, EnvironmentOverview};
use crate::events::{self, TrackerEvent};
use crate::models::{CoordinationState, Environment};
use crate::services::cache::TrackerCaches;
use crate::services::coordinator;
use crate::services::deployment_service::DeploymentService;
use crate::services::enrichment::{BuildEnricher, EnrichmentReport, RecordFailure};
use crate::services::sources::{BuildSource, ObjectStore, PipelineSource, VcsHost};
use crate::services::upstream::Upstream;

/// The external services a tracker reads from.
#[derive(Clone)]
pub struct Sources {
    pub builds: Arc<dyn BuildSource>,
    pub pipelines: Arc<dyn PipelineSource>,
    pub objects: Arc<dyn ObjectStore>,
    pub vcs: Arc<dyn VcsHost>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinationReport {
    pub environment: Environment,
    #[serde(flatten)]
    pub state: CoordinationState,
    pub warnings: Vec<String>,
    pub failures: Vec<RecordFailure>,
}

pub struct DeployTracker {
    config: Arc<TrackerConfig>,
    caches: Arc<TrackerCaches>,
    enricher: BuildEnricher,
    deployments: DeploymentService,
}

impl DeployTracker {
    pub fn new(config: TrackerConfig, sources: Sources) -> Self {
        let upstream = Upstream::from_config(&config);
        Self::with_upstream(config, sources, upstream)
    }

    /// Build a tracker around an explicit throttler/retry setup.
    pub fn with_upstream(config: TrackerConfig, sources: Sources, upstream: Upstream) -> Self {
        let config = Arc::new(config);
        let caches = Arc::new(TrackerCaches::new(config.cache_ttl));
        let enricher = BuildEnricher::new(
            config.clone(),
            sources.builds,
            sources.vcs.clone(),
            upstream.clone(),
            caches.clone(),
        );
        let deployments = DeploymentService::new(
            config.clone(),
            sources.pipelines,
            sources.objects,
            sources.vcs,
            upstream,
            caches.clone(),
        );
        Self {
            config,
            caches,
            enricher,
            deployments,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn caches(&self) -> &Arc<TrackerCaches> {
        &self.caches
    }

    /// Every tracked build, classified and enriched.
    pub async fn enriched_builds(&self) -> EnrichmentReport {
        self.enricher.enriched_builds().await
    }

    pub async fn environment_overview(&self, environment: Environment) -> EnvironmentOverview {
        let report = self.enricher.enriched_builds().await;
        let mut overview =
            environment_overview(&self.deployments, environment, &report.builds).await;
        let mut failures = report.failures;
        failures.append(&mut overview.failures);
        overview.failures = failures;
        overview
    }

    /// Coordination state of `environment`, recomputed on every call.
    pub async fn coordination_state(&self, environment: Environment) -> CoordinationReport {
        let overview = self.environment_overview(environment).await;
        let state = coordinator::evaluate(
            &overview.coordination_input(),
            self.config.coordination_window,
        );
        events::emit(&TrackerEvent::CoordinationEvaluated {
            environment,
            status: state.status,
        });
        CoordinationReport {
            environment,
            state,
            warnings: overview.warnings,
            failures: overview.failures,
        }
    }
}
