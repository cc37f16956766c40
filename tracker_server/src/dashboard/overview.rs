//! Environment overview: deployments, available updates and staleness for
//! both components of one environment.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::models::{BuildRecord, Component, DeploymentRecord, Environment};
use crate::services::coordinator::{ComponentReadiness, CoordinationInput};
use crate::services::deployment_service::{available_builds, DeploymentService};
use crate::services::enrichment::RecordFailure;

#[derive(Debug, Clone, Serialize)]
pub struct ComponentOverview {
    pub component: Component,
    pub project: String,
    pub pipeline: String,
    /// `None` when the pipeline has no successful run in the lookback, or
    /// when the lookup failed (`deployment_unknown`).
    pub deployment: Option<DeploymentRecord>,
    pub deployment_unknown: bool,
    /// Empty when the deployment is unknown.
    pub available_builds: Vec<BuildRecord>,
    pub update_timestamp: Option<DateTime<Utc>>,
    pub stale: bool,
}

impl ComponentOverview {
    pub fn readiness(&self) -> ComponentReadiness {
        ComponentReadiness {
            update_available: !self.available_builds.is_empty(),
            stale: self.stale,
            update_timestamp: self.update_timestamp,
            deployment_unknown: self.deployment_unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentOverview {
    pub environment: Environment,
    pub components: Vec<ComponentOverview>,
    pub warnings: Vec<String>,
    pub failures: Vec<RecordFailure>,
}

impl EnvironmentOverview {
    pub fn component(&self, component: Component) -> Option<&ComponentOverview> {
        self.components.iter().find(|c| c.component == component)
    }

    pub fn coordination_input(&self) -> CoordinationInput {
        let readiness =
            |c: Component| self.component(c).map(ComponentOverview::readiness).unwrap_or_default();
        CoordinationInput {
            backend: readiness(Component::Backend),
            frontend: readiness(Component::Frontend),
        }
    }

    pub fn rate_limited(&self) -> bool {
        self.failures.iter().any(|f| f.rate_limited)
    }
}

/// Assemble the overview of `environment` from already enriched builds.
/// Lookup failures become warnings plus per-record failures; the overview is
/// always produced.
pub async fn environment_overview(
    service: &DeploymentService,
    environment: Environment,
    builds: &[BuildRecord],
) -> EnvironmentOverview {
    let started = std::time::Instant::now();
    let results = join_all(
        Component::ALL
            .into_iter()
            .map(|component| component_overview(service, environment, component, builds)),
    )
    .await;

    let mut overview = EnvironmentOverview {
        environment,
        components: Vec::with_capacity(results.len()),
        warnings: Vec::new(),
        failures: Vec::new(),
    };
    for (component, warnings, failures) in results {
        overview.components.push(component);
        overview.warnings.extend(warnings);
        overview.failures.extend(failures);
    }

    crate::metrics::refresh_duration(environment.as_str(), started.elapsed().as_millis() as u64);
    overview
}

async fn component_overview(
    service: &DeploymentService,
    environment: Environment,
    component: Component,
    builds: &[BuildRecord],
) -> (ComponentOverview, Vec<String>, Vec<RecordFailure>) {
    let config = service.config();
    let pipeline = config.pipeline_name(environment, component);
    let mut warnings = Vec::new();
    let mut failures = Vec::new();

    let (deployment, stale) = futures::join!(
        service.current_deployment(environment, component, builds),
        service.is_stale(environment, component, builds),
    );

    let mut deployment_unknown = false;
    let deployment = match deployment {
        Ok(deployment) => {
            match &deployment {
                None => {
                    warnings.push(format!("{component}: no successful deployment of {pipeline}"))
                }
                Some(record) if record.correlated_build().is_none() => warnings.push(format!(
                    "{component}: deployment {} matches no known build",
                    record.execution_id()
                )),
                Some(_) => {}
            }
            deployment
        }
        Err(err) => {
            warnings.push(format!("{component}: deployment lookup failed: {err}"));
            failures.push(RecordFailure::new(pipeline.as_str(), "deployment", &err));
            deployment_unknown = true;
            None
        }
    };

    let stale = match stale {
        Ok(stale) => stale,
        Err(err) => {
            warnings.push(format!("{component}: staleness comparison failed: {err}"));
            failures.push(RecordFailure::new(pipeline.as_str(), "staleness", &err));
            false
        }
    };

    let candidates = service.candidates(environment, component, builds);
    let available = if deployment_unknown {
        Vec::new()
    } else {
        available_builds(deployment.as_ref(), &candidates)
    };
    let update_timestamp = available.first().and_then(BuildRecord::finished_at);

    let overview = ComponentOverview {
        component,
        project: config.build_project(environment, component),
        pipeline,
        deployment,
        deployment_unknown,
        available_builds: available,
        update_timestamp,
        stale,
    };
    (overview, warnings, failures)
}
