//! Deployment coordinator: readiness of one environment's backend/frontend
//! pair. A pure function of its inputs; nothing here touches the network.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{Component, CoordinationState, CoordinationStatus, RecommendedAction};

/// What the coordinator needs to know about one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComponentReadiness {
    pub update_available: bool,
    /// The component's latest production-target build lags its reference.
    pub stale: bool,
    /// End time of the newest available build.
    pub update_timestamp: Option<DateTime<Utc>>,
    /// The current deployment could not be looked up, so update
    /// availability is not known.
    pub deployment_unknown: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinationInput {
    pub backend: ComponentReadiness,
    pub frontend: ComponentReadiness,
}

impl CoordinationInput {
    fn readiness(&self, component: Component) -> ComponentReadiness {
        match component {
            Component::Backend => self.backend,
            Component::Frontend => self.frontend,
        }
    }
}

/// Evaluate the coordination state. States are checked in a fixed order and
/// the first that applies wins.
pub fn evaluate(input: &CoordinationInput, window: Duration) -> CoordinationState {
    let stale: Vec<Component> = Component::ALL
        .into_iter()
        .filter(|c| input.readiness(*c).stale)
        .collect();
    if !stale.is_empty() {
        let names: Vec<&str> = stale.iter().map(|c| c.as_str()).collect();
        return CoordinationState {
            status: CoordinationStatus::BuildsOutOfDate,
            reason: format!(
                "Production builds are behind the reference environment for: {}",
                names.join(", ")
            ),
            blocking: stale,
            recommended_action: RecommendedAction::None,
            independent_deploy_allowed: false,
        };
    }

    let unknown: Vec<Component> = Component::ALL
        .into_iter()
        .filter(|c| input.readiness(*c).deployment_unknown)
        .collect();
    if !unknown.is_empty() {
        let names: Vec<&str> = unknown.iter().map(|c| c.as_str()).collect();
        return CoordinationState {
            status: CoordinationStatus::Unknown,
            reason: format!(
                "Current deployment could not be determined for: {}",
                names.join(", ")
            ),
            blocking: unknown,
            recommended_action: RecommendedAction::None,
            independent_deploy_allowed: true,
        };
    }

    let backend = input.backend;
    let frontend = input.frontend;

    match (backend.update_available, frontend.update_available) {
        (false, false) => state(
            CoordinationStatus::NoUpdatesAvailable,
            "Neither component has a build newer than the deployed one".to_string(),
            RecommendedAction::None,
            false,
        ),
        (true, true) => match (backend.update_timestamp, frontend.update_timestamp) {
            (Some(b), Some(f)) => {
                let apart = (b - f).abs();
                let minutes = apart.num_minutes();
                if apart <= window {
                    state(
                        CoordinationStatus::BothReadyCoordinated,
                        format!(
                            "Backend and frontend updates were built {minutes} minute(s) apart"
                        ),
                        RecommendedAction::DeployBoth,
                        true,
                    )
                } else {
                    state(
                        CoordinationStatus::BothReadyIndependent,
                        format!(
                            "Backend and frontend updates were built {minutes} minute(s) apart, \
                             outside the {} minute window",
                            window.num_minutes()
                        ),
                        RecommendedAction::DeployIndependently,
                        true,
                    )
                }
            }
            _ => state(
                CoordinationStatus::Unknown,
                "Both components have updates but a build timestamp is missing".to_string(),
                RecommendedAction::None,
                true,
            ),
        },
        (true, false) => state(
            CoordinationStatus::BackendOnlyReady,
            "Only the backend has a newer build".to_string(),
            RecommendedAction::DeployBackend,
            true,
        ),
        (false, true) => state(
            CoordinationStatus::FrontendOnlyReady,
            "Only the frontend has a newer build".to_string(),
            RecommendedAction::DeployFrontend,
            true,
        ),
    }
}

fn state(
    status: CoordinationStatus,
    reason: String,
    recommended_action: RecommendedAction,
    independent_deploy_allowed: bool,
) -> CoordinationState {
    CoordinationState {
        status,
        reason,
        blocking: Vec::new(),
        recommended_action,
        independent_deploy_allowed,
    }
}
