//! Domain events emitted by the enrichment and correlation stages.
//!
//! Decision code returns data; events only report what happened. Each variant
//! maps to a tracing level and, where useful, a metric.

use crate::error::TrackerError;
use crate::models::{
    Component, CoordinationStatus, Environment, MatchMethod, PrSource, SourceBranch,
};

#[derive(Debug)]
pub enum TrackerEvent<'a> {
    BuildsEnriched {
        total: usize,
        failures: usize,
    },
    PullRequestResolved {
        build_id: &'a str,
        number: u64,
        stage: PrSource,
    },
    HotfixDetected {
        build_id: &'a str,
        branch: SourceBranch,
    },
    CorrelationStageMissed {
        method: MatchMethod,
    },
    BuildCorrelated {
        environment: Environment,
        component: Component,
        execution_id: &'a str,
        build_id: &'a str,
        method: MatchMethod,
    },
    DeploymentUncorrelated {
        environment: Environment,
        component: Component,
        execution_id: &'a str,
        commit: Option<&'a str>,
    },
    ExternalLookupFailed {
        subject: &'a str,
        stage: &'a str,
        error: &'a TrackerError,
    },
    CoordinationEvaluated {
        environment: Environment,
        status: CoordinationStatus,
    },
}

pub fn emit(event: &TrackerEvent<'_>) {
    match event {
        TrackerEvent::BuildsEnriched { total, failures } => {
            tracing::info!(total, failures, "Build list enriched");
        }
        TrackerEvent::PullRequestResolved {
            build_id,
            number,
            stage,
        } => {
            tracing::debug!(build_id, pr_number = number, ?stage, "Pull request resolved");
        }
        TrackerEvent::HotfixDetected { build_id, branch } => {
            tracing::info!(build_id, ?branch, "Hotfix build detected");
        }
        TrackerEvent::CorrelationStageMissed { method } => {
            tracing::trace!(method = method.as_str(), "Correlation stage found no match");
        }
        TrackerEvent::BuildCorrelated {
            environment,
            component,
            execution_id,
            build_id,
            method,
        } => {
            tracing::debug!(
                environment = environment.as_str(),
                component = component.as_str(),
                execution_id,
                build_id,
                method = method.as_str(),
                "Deployment correlated"
            );
        }
        TrackerEvent::DeploymentUncorrelated {
            environment,
            component,
            execution_id,
            commit,
        } => {
            tracing::warn!(
                environment = environment.as_str(),
                component = component.as_str(),
                execution_id,
                commit = commit.unwrap_or("-"),
                "No build matches deployed artifact"
            );
        }
        TrackerEvent::ExternalLookupFailed {
            subject,
            stage,
            error,
        } => {
            crate::metrics::lookup_failed(stage, error.is_rate_limited());
            if error.is_rate_limited() {
                tracing::warn!(
                    subject,
                    stage,
                    service = error.service(),
                    %error,
                    "Lookup rate limited"
                );
            } else {
                tracing::warn!(subject, stage, service = error.service(), %error, "Lookup failed");
            }
        }
        TrackerEvent::CoordinationEvaluated {
            environment,
            status,
        } => {
            crate::metrics::coordination(environment.as_str(), status.as_str());
            tracing::debug!(
                environment = environment.as_str(),
                status = status.as_str(),
                "Coordination evaluated"
            );
        }
    }
}
