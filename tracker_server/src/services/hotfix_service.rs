//! Hotfix detection: direct commits to a tracked branch with no pull request.

use std::sync::Arc;

use crate::error::Result;
use crate::events::{self, TrackerEvent};
use crate::models::{BuildRecord, HotfixDetails};
use crate::services::cache::TrackerCaches;
use crate::services::pr_resolver::fetch_commit;
use crate::services::sources::VcsHost;
use crate::services::upstream::Upstream;

pub struct HotfixDetector {
    vcs: Arc<dyn VcsHost>,
    upstream: Upstream,
    caches: Arc<TrackerCaches>,
}

impl HotfixDetector {
    pub fn new(vcs: Arc<dyn VcsHost>, upstream: Upstream, caches: Arc<TrackerCaches>) -> Self {
        Self { vcs, upstream, caches }
    }

    /// Whether `build` qualifies: still no PR after resolution, built directly
    /// from `main` or `dev`, and has a commit to look up.
    pub fn applies_to(build: &BuildRecord) -> bool {
        build.is_unresolved()
            && build.source_branch.is_some_and(|b| b.is_tracked())
            && build.resolved_commit.is_some()
    }

    /// Attach hotfix details. Returns `Ok(false)` when the build does not
    /// qualify.
    pub async fn detect(&self, build: &mut BuildRecord) -> Result<bool> {
        if !Self::applies_to(build) {
            return Ok(false);
        }
        let (Some(branch), Some(sha)) = (build.source_branch, build.resolved_commit.clone()) else {
            return Ok(false);
        };

        let commit = fetch_commit(&self.vcs, &self.upstream, &self.caches, &sha).await?;
        let attached = build.set_hotfix(HotfixDetails {
            is_hotfix: true,
            branch,
            author: commit.author,
            message: commit.message,
            date: commit.date,
        });
        if attached {
            events::emit(&TrackerEvent::HotfixDetected {
                build_id: &build.id,
                branch,
            });
        }
        Ok(attached)
    }
}
