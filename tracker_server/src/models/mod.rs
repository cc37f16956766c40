//! Tracker data model: builds, pipeline runs, deployments, coordination.

pub mod artifact;
pub mod build;
pub mod coordination;
pub mod deployment;
pub mod environment;
pub mod pipeline;

pub use artifact::ArtifactDescriptor;
pub use build::{
    BuildCategory, BuildOrigin, BuildRecord, BuildStatus, HotfixDetails, PrSource, RawBuild,
    SourceBranch,
};
pub use coordination::{CoordinationState, CoordinationStatus, RecommendedAction};
pub use deployment::{DeploymentRecord, MatchMethod};
pub use environment::{Component, Environment};
pub use pipeline::{
    ExecutionStatus, ExecutionSummary, PipelineExecutionRecord, SourceRevision, SourceStageConfig,
};
