//! Deploy Tracker: build classification and deployment correlation for a
//! backend/frontend application across dev, staging and production.
//!
//! Builds are listed from the CI service, classified by project and branch,
//! and enriched with pull-request or hotfix origin. The latest successful
//! pipeline run of each environment is correlated back to the build it
//! deployed, and the two components' pending updates are combined into a
//! coordination state.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod fakes;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod services;

pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use services::{DeployTracker, Sources};
