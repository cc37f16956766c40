//! Tracker services: enrichment, correlation and coordination over the
//! external build, pipeline and version-control sources.

pub mod bundle;
pub mod cache;
pub mod classifier;
pub mod coordinator;
pub mod correlator;
pub mod deployment_service;
pub mod enrichment;
pub mod gateway_client;
pub mod github_service;
pub mod hotfix_service;
pub mod pr_resolver;
pub mod retry;
pub mod sources;
pub mod throttle;
pub mod tracker;
pub mod upstream;

pub use tracker::{DeployTracker, Sources};
