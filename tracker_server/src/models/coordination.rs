//! Coordination state: deployment readiness for one environment's
//! backend/frontend pair. Recomputed on every query.

use serde::Serialize;

use crate::models::environment::Component;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinationStatus {
    BuildsOutOfDate,
    NoUpdatesAvailable,
    BothReadyCoordinated,
    BothReadyIndependent,
    BackendOnlyReady,
    FrontendOnlyReady,
    Unknown,
}

impl CoordinationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildsOutOfDate => "BUILDS_OUT_OF_DATE",
            Self::NoUpdatesAvailable => "NO_UPDATES_AVAILABLE",
            Self::BothReadyCoordinated => "BOTH_READY_COORDINATED",
            Self::BothReadyIndependent => "BOTH_READY_INDEPENDENT",
            Self::BackendOnlyReady => "BACKEND_ONLY_READY",
            Self::FrontendOnlyReady => "FRONTEND_ONLY_READY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedAction {
    DeployBoth,
    DeployIndependently,
    DeployBackend,
    DeployFrontend,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinationState {
    pub status: CoordinationStatus,
    pub reason: String,
    pub blocking: Vec<Component>,
    pub recommended_action: RecommendedAction,
    /// Deploying one component alone is still allowed (recovery path).
    pub independent_deploy_allowed: bool,
}
