//! Deployment records: a pipeline execution correlated with the build whose
//! artifact it deployed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::build::BuildRecord;
use crate::models::environment::{Component, Environment};
use crate::models::pipeline::PipelineExecutionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactImage,
    TagSuffix,
    CommitHash,
    None,
}

impl MatchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactImage => "exact_image",
            Self::TagSuffix => "tag_suffix",
            Self::CommitHash => "commit_hash",
            Self::None => "none",
        }
    }
}

/// Fields are private so a record is only built through [`correlated`] or
/// [`uncorrelated`]: a present build always carries a real method, an absent
/// one always carries `None` and the too-old flag.
///
/// [`correlated`]: DeploymentRecord::correlated
/// [`uncorrelated`]: DeploymentRecord::uncorrelated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentRecord {
    environment: Environment,
    component: Component,
    pipeline_name: String,
    execution_id: String,
    deployed_at: Option<DateTime<Utc>>,
    resolved_commit: Option<String>,
    pull_request_number: Option<u64>,
    correlated_build: Option<BuildRecord>,
    match_method: MatchMethod,
    is_too_old: bool,
}

impl DeploymentRecord {
    pub fn correlated(
        environment: Environment,
        component: Component,
        execution: &PipelineExecutionRecord,
        build: BuildRecord,
        method: MatchMethod,
        resolved_commit: Option<String>,
    ) -> Self {
        debug_assert!(method != MatchMethod::None);
        let resolved_commit = build.resolved_commit.clone().or(resolved_commit);
        Self {
            environment,
            component,
            pipeline_name: execution.pipeline_name.clone(),
            execution_id: execution.execution_id.clone(),
            deployed_at: execution.completed_at,
            pull_request_number: build.pull_request_number(),
            resolved_commit,
            correlated_build: Some(build),
            match_method: method,
            is_too_old: false,
        }
    }

    pub fn uncorrelated(
        environment: Environment,
        component: Component,
        execution: &PipelineExecutionRecord,
        resolved_commit: Option<String>,
    ) -> Self {
        Self {
            environment,
            component,
            pipeline_name: execution.pipeline_name.clone(),
            execution_id: execution.execution_id.clone(),
            deployed_at: execution.completed_at,
            resolved_commit,
            pull_request_number: None,
            correlated_build: None,
            match_method: MatchMethod::None,
            is_too_old: true,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn deployed_at(&self) -> Option<DateTime<Utc>> {
        self.deployed_at
    }

    pub fn resolved_commit(&self) -> Option<&str> {
        self.resolved_commit.as_deref()
    }

    pub fn pull_request_number(&self) -> Option<u64> {
        self.pull_request_number
    }

    pub fn correlated_build(&self) -> Option<&BuildRecord> {
        self.correlated_build.as_ref()
    }

    pub fn match_method(&self) -> MatchMethod {
        self.match_method
    }

    pub fn is_too_old(&self) -> bool {
        self.is_too_old
    }
}
