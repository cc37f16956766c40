//! Build classifier: assigns category, source branch and trigger-provided PR
//! number to a raw build. Pure and deterministic, no external calls.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::TrackerConfig;
use crate::models::{
    BuildCategory, BuildOrigin, BuildRecord, BuildStatus, PrSource, RawBuild, SourceBranch,
};

static PR_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:refs/)?(?:pull|pr|pull-requests|merge-requests)/",
        r"(\d+)(?:/(?:head|merge))?$"
    ))
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: BuildCategory,
    pub pull_request_number: Option<u64>,
    pub source_branch: Option<SourceBranch>,
}

#[derive(Debug, Clone)]
pub struct BuildClassifier {
    main_ref: String,
    dev_ref: String,
    dev_test_marker: String,
    main_test_marker: String,
}

impl BuildClassifier {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            main_ref: config.main_ref.clone(),
            dev_ref: config.dev_ref.clone(),
            dev_test_marker: config.dev_test_marker.clone(),
            main_test_marker: config.main_test_marker.clone(),
        }
    }

    pub fn classify(&self, raw: &RawBuild) -> Classification {
        let category = self.category(&raw.project_name);
        let source_branch = self.source_branch(&raw.source_reference);
        let pull_request_number = match source_branch {
            Some(branch) if branch.is_tracked() => None,
            _ => raw.trigger_pr.filter(|n| *n > 0),
        };
        Classification {
            category,
            pull_request_number,
            source_branch,
        }
    }

    /// Classify and lift into an un-enriched [`BuildRecord`].
    pub fn to_record(&self, raw: &RawBuild) -> BuildRecord {
        let classification = self.classify(raw);
        let origin = match classification.pull_request_number {
            Some(number) => BuildOrigin::PullRequest {
                number,
                resolved_by: PrSource::Trigger,
            },
            None => BuildOrigin::Unresolved,
        };
        BuildRecord {
            id: raw.id.clone(),
            project_name: raw.project_name.clone(),
            status: BuildStatus::parse(&raw.status),
            source_reference: raw.source_reference.clone(),
            resolved_commit: raw
                .resolved_commit
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_ascii_lowercase),
            start_time: raw.start_time,
            end_time: raw.end_time,
            category: classification.category,
            source_branch: classification.source_branch,
            origin,
            artifact: raw.artifact.clone(),
            metadata: raw.metadata.clone(),
        }
    }

    fn category(&self, project_name: &str) -> BuildCategory {
        let name = project_name.trim();
        if name.is_empty() {
            return BuildCategory::Unknown;
        }
        if !self.dev_test_marker.is_empty() && name.contains(&self.dev_test_marker) {
            BuildCategory::DevTest
        } else if !self.main_test_marker.is_empty() && name.contains(&self.main_test_marker) {
            BuildCategory::MainTest
        } else {
            BuildCategory::Production
        }
    }

    fn source_branch(&self, reference: &str) -> Option<SourceBranch> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if ref_matches(reference, &self.main_ref) {
            Some(SourceBranch::Main)
        } else if ref_matches(reference, &self.dev_ref) {
            Some(SourceBranch::Dev)
        } else if parse_pr_reference(reference).is_some() {
            Some(SourceBranch::Feature)
        } else {
            None
        }
    }
}

/// `reference` equals `tracked` or ends with it on a path boundary, comparing
/// short branch names so `main` and `refs/heads/main` agree.
pub fn ref_matches(reference: &str, tracked: &str) -> bool {
    let short_tracked = short_ref(tracked);
    if short_tracked.is_empty() {
        return false;
    }
    let short_reference = short_ref(reference);
    reference == tracked
        || short_reference == short_tracked
        || short_reference.ends_with(&format!("/{short_tracked}"))
}

fn short_ref(reference: &str) -> &str {
    let reference = reference.trim();
    reference
        .strip_prefix("refs/heads/")
        .or_else(|| reference.strip_prefix("heads/"))
        .or_else(|| reference.strip_prefix("branch/"))
        .unwrap_or(reference)
}

/// PR number of a pull-request style reference (`pr/12`, `refs/pull/12/head`).
pub fn parse_pr_reference(reference: &str) -> Option<u64> {
    PR_REF_REGEX
        .captures(reference.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> BuildClassifier {
        BuildClassifier::new(&TrackerConfig::default())
    }

    fn raw(project: &str, reference: &str) -> RawBuild {
        RawBuild {
            id: "b-1".into(),
            project_name: project.into(),
            status: "SUCCEEDED".into(),
            source_reference: reference.into(),
            ..Default::default()
        }
    }

    #[test]
    fn main_build_without_hint_is_production() {
        let result = classifier().classify(&raw("app-backend", "refs/heads/main"));
        assert_eq!(
            result,
            Classification {
                category: BuildCategory::Production,
                pull_request_number: None,
                source_branch: Some(SourceBranch::Main),
            }
        );
    }

    #[test]
    fn project_markers_take_precedence_in_order() {
        let c = classifier();
        assert_eq!(
            c.classify(&raw("app-backend-dev-test", "dev")).category,
            BuildCategory::DevTest
        );
        assert_eq!(
            c.classify(&raw("app-backend-main-test", "main")).category,
            BuildCategory::MainTest
        );
        // dev-test is checked first.
        assert_eq!(
            c.classify(&raw("app-dev-test-main-test", "main")).category,
            BuildCategory::DevTest
        );
        assert_eq!(c.classify(&raw("   ", "main")).category, BuildCategory::Unknown);
    }

    #[test]
    fn direct_branch_builds_never_take_trigger_pr() {
        let mut build = raw("app-backend", "refs/heads/dev");
        build.trigger_pr = Some(77);
        let result = classifier().classify(&build);
        assert_eq!(result.source_branch, Some(SourceBranch::Dev));
        assert_eq!(result.pull_request_number, None);

        let mut build = raw("app-backend", "pr/77");
        build.trigger_pr = Some(77);
        let result = classifier().classify(&build);
        assert_eq!(result.source_branch, Some(SourceBranch::Feature));
        assert_eq!(result.pull_request_number, Some(77));
    }

    #[test]
    fn reference_matching_respects_path_boundaries() {
        assert!(ref_matches("main", "refs/heads/main"));
        assert!(ref_matches("refs/heads/main", "refs/heads/main"));
        assert!(ref_matches("origin/main", "refs/heads/main"));
        assert!(!ref_matches("refs/heads/domain", "refs/heads/main"));
        assert!(!ref_matches("refs/heads/main-fix", "refs/heads/main"));
    }

    #[test]
    fn pr_references_parse() {
        assert_eq!(parse_pr_reference("pr/12"), Some(12));
        assert_eq!(parse_pr_reference("refs/pull/34/head"), Some(34));
        assert_eq!(parse_pr_reference("pull/5/merge"), Some(5));
        assert_eq!(parse_pr_reference("refs/heads/feature/pr/12"), None);
        assert_eq!(parse_pr_reference("pr/0"), None);
    }

    #[test]
    fn classification_is_idempotent() {
        let c = classifier();
        let mut build = raw("app-frontend-main-test", "refs/pull/9/head");
        build.trigger_pr = Some(9);
        let first = c.to_record(&build);
        for _ in 0..5 {
            assert_eq!(c.to_record(&build), first);
        }
    }
}
