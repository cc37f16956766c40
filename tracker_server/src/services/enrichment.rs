//! Build enrichment: list builds, classify them, resolve pull requests and
//! flag hotfixes. Failed lookups are collected per record instead of
//! aborting the batch.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::events::{self, TrackerEvent};
use crate::models::{BuildRecord, RawBuild};
use crate::services::cache::TrackerCaches;
use crate::services::classifier::BuildClassifier;
use crate::services::hotfix_service::HotfixDetector;
use crate::services::pr_resolver::PrResolver;
use crate::services::sources::{BuildSource, VcsHost, MAX_BATCH};
use crate::services::upstream::Upstream;

/// One lookup that failed while producing a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Build id, or the project name when listing itself failed.
    pub subject: String,
    pub stage: String,
    pub message: String,
    pub rate_limited: bool,
}

impl RecordFailure {
    pub fn new(subject: impl Into<String>, stage: impl Into<String>, error: &TrackerError) -> Self {
        let subject = subject.into();
        let stage = stage.into();
        events::emit(&TrackerEvent::ExternalLookupFailed {
            subject: &subject,
            stage: &stage,
            error,
        });
        Self {
            subject,
            stage,
            message: error.to_string(),
            rate_limited: error.is_rate_limited(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    pub builds: Vec<BuildRecord>,
    pub failures: Vec<RecordFailure>,
}

impl EnrichmentReport {
    pub fn rate_limited(&self) -> bool {
        self.failures.iter().any(|f| f.rate_limited)
    }
}

pub struct BuildEnricher {
    config: Arc<TrackerConfig>,
    builds: Arc<dyn BuildSource>,
    upstream: Upstream,
    classifier: BuildClassifier,
    resolver: PrResolver,
    hotfix: HotfixDetector,
}

impl BuildEnricher {
    pub fn new(
        config: Arc<TrackerConfig>,
        builds: Arc<dyn BuildSource>,
        vcs: Arc<dyn VcsHost>,
        upstream: Upstream,
        caches: Arc<TrackerCaches>,
    ) -> Self {
        Self {
            classifier: BuildClassifier::new(&config),
            resolver: PrResolver::new(vcs.clone(), upstream.clone(), caches.clone()),
            hotfix: HotfixDetector::new(vcs, upstream.clone(), caches),
            config,
            builds,
            upstream,
        }
    }

    /// Recent builds of one project, ignored ids removed, details fetched in
    /// batches of at most [`MAX_BATCH`].
    pub async fn list_project(&self, project: &str) -> Result<Vec<RawBuild>> {
        let lookback = self.config.build_lookback;
        let ids: Vec<String> = self
            .upstream
            .call("builds", "list_build_ids", || {
                self.builds.list_build_ids(project, lookback)
            })
            .await?
            .into_iter()
            .filter(|id| !self.config.is_ignored(id))
            .collect();

        let mut raw = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH) {
            let batch = self
                .upstream
                .call("builds", "batch_get_builds", || self.builds.batch_get_builds(chunk))
                .await?;
            raw.extend(batch.into_iter().filter(|b| !self.config.is_ignored(&b.id)));
        }
        tracing::debug!(project, count = raw.len(), "Listed builds");
        Ok(raw)
    }

    /// Raw builds of every tracked project. A project whose listing fails is
    /// reported and skipped.
    pub async fn list_all(&self) -> (Vec<RawBuild>, Vec<RecordFailure>) {
        let projects = self.config.build_projects();
        let results = join_all(projects.iter().map(|p| self.list_project(p))).await;

        let mut raw = Vec::new();
        let mut failures = Vec::new();
        for (project, result) in projects.iter().zip(results) {
            match result {
                Ok(builds) => raw.extend(builds),
                Err(err) => {
                    failures.push(RecordFailure::new(project.as_str(), "list_builds", &err))
                }
            }
        }
        (raw, failures)
    }

    /// Classify, resolve pull requests, then detect hotfixes. Output is
    /// ordered newest first, ties by id.
    ///
    /// A build whose PR resolution hit a failed lookup is not known to lack a
    /// PR, so it is left unresolved rather than checked for a hotfix.
    pub async fn enrich(&self, raw: &[RawBuild]) -> EnrichmentReport {
        let mut records: Vec<BuildRecord> =
            raw.iter().map(|b| self.classifier.to_record(b)).collect();
        let mut failures = Vec::new();
        let mut incomplete: HashSet<String> = HashSet::new();

        let resolved = join_all(records.iter_mut().map(|build| self.resolver.resolve(build))).await;
        for (build, stage_failures) in records.iter().zip(resolved) {
            if !stage_failures.is_empty() {
                incomplete.insert(build.id.clone());
            }
            for failure in stage_failures {
                failures.push(RecordFailure::new(
                    build.id.as_str(),
                    failure.stage.as_str(),
                    &failure.error,
                ));
            }
        }

        for (build_id, failure) in self.resolver.resolve_merged_main(&mut records).await {
            failures.push(RecordFailure::new(
                build_id.as_str(),
                failure.stage.as_str(),
                &failure.error,
            ));
            incomplete.insert(build_id);
        }

        let hotfix = &self.hotfix;
        let detected = join_all(
            records
                .iter_mut()
                .filter(|b| HotfixDetector::applies_to(b) && !incomplete.contains(&b.id))
                .map(|build| async move {
                    let id = build.id.clone();
                    (id, hotfix.detect(build).await)
                }),
        )
        .await;
        for (build_id, result) in detected {
            if let Err(err) = result {
                failures.push(RecordFailure::new(build_id, "hotfix", &err));
            }
        }

        records.sort_by(|a, b| {
            b.finished_at()
                .cmp(&a.finished_at())
                .then_with(|| b.id.cmp(&a.id))
        });

        events::emit(&TrackerEvent::BuildsEnriched {
            total: records.len(),
            failures: failures.len(),
        });
        EnrichmentReport {
            builds: records,
            failures,
        }
    }

    /// List and enrich every tracked project.
    pub async fn enriched_builds(&self) -> EnrichmentReport {
        let (raw, mut listing_failures) = self.list_all().await;
        let mut report = self.enrich(&raw).await;
        listing_failures.append(&mut report.failures);
        report.failures = listing_failures;
        report
    }
}
