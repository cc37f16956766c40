#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use deploy_tracker::config::TrackerConfig;
use deploy_tracker::fakes::{MemoryBuildSource, MemoryObjectStore, MemoryPipelineSource, MemoryVcs};
use deploy_tracker::models::{
    ArtifactDescriptor, ExecutionStatus, PipelineExecutionRecord, RawBuild, SourceRevision,
};
use deploy_tracker::{DeployTracker, Sources};

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

pub fn config() -> TrackerConfig {
    TrackerConfig {
        app_name: "shop".into(),
        min_request_interval: Duration::ZERO,
        max_concurrent_requests: 4,
        retry_attempts: 0,
        ..Default::default()
    }
}

pub fn build(id: &str, project: &str, commit: &str, finished: DateTime<Utc>) -> RawBuild {
    RawBuild {
        id: id.into(),
        project_name: project.into(),
        status: "SUCCEEDED".into(),
        source_reference: "refs/heads/main".into(),
        resolved_commit: Some(commit.into()),
        start_time: Some(finished - chrono::Duration::minutes(5)),
        end_time: Some(finished),
        ..Default::default()
    }
}

pub fn with_image(mut raw: RawBuild, image: &str) -> RawBuild {
    raw.artifact = ArtifactDescriptor {
        image_reference: Some(image.into()),
        ..Default::default()
    };
    raw
}

pub fn commit_execution(
    pipeline: &str,
    id: &str,
    commit: &str,
    completed: DateTime<Utc>,
) -> PipelineExecutionRecord {
    PipelineExecutionRecord {
        pipeline_name: pipeline.into(),
        execution_id: id.into(),
        status: ExecutionStatus::Succeeded,
        completed_at: Some(completed),
        source_revisions: vec![SourceRevision {
            action_name: "Source".into(),
            revision_id: commit.into(),
            summary: Some("Merge pull request #1 from shop/feature".into()),
            url: None,
        }],
    }
}

pub fn object_execution(
    pipeline: &str,
    id: &str,
    version_id: &str,
    completed: DateTime<Utc>,
) -> PipelineExecutionRecord {
    PipelineExecutionRecord {
        pipeline_name: pipeline.into(),
        execution_id: id.into(),
        status: ExecutionStatus::Succeeded,
        completed_at: Some(completed),
        source_revisions: vec![SourceRevision {
            action_name: "Artifact".into(),
            revision_id: version_id.into(),
            summary: Some(format!("Amazon S3 version id: {version_id}")),
            url: None,
        }],
    }
}

/// A tar.gz holding `files`.
pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn image_bundle(image: &str) -> Vec<u8> {
    tar_gz(&[(
        "imagedefinitions.json",
        &format!(r#"[{{"name":"web","imageUri":"{image}"}}]"#),
    )])
}

/// In-memory sources plus handles for seeding them.
pub struct Fixture {
    pub builds: Arc<MemoryBuildSource>,
    pub pipelines: Arc<MemoryPipelineSource>,
    pub objects: Arc<MemoryObjectStore>,
    pub vcs: Arc<MemoryVcs>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            builds: Arc::new(MemoryBuildSource::new()),
            pipelines: Arc::new(MemoryPipelineSource::new()),
            objects: Arc::new(MemoryObjectStore::new()),
            vcs: Arc::new(MemoryVcs::new()),
        }
    }

    /// Add a build and a commit for it whose message names `pr`.
    pub fn add_pr_build(&self, raw: RawBuild, pr: u64) {
        if let Some(commit) = raw.resolved_commit.as_deref() {
            let message = format!("Merge pull request #{pr} from shop/feature-{pr}");
            self.vcs.add_commit(commit, "dana", &message);
        }
        self.builds.add(raw);
    }

    pub fn sources(&self) -> Sources {
        Sources {
            builds: self.builds.clone(),
            pipelines: self.pipelines.clone(),
            objects: self.objects.clone(),
            vcs: self.vcs.clone(),
        }
    }

    pub fn tracker(&self) -> DeployTracker {
        DeployTracker::new(config(), self.sources())
    }
}

/// Production fixture: backend deployed from a commit revision, frontend from
/// an artifact bundle, each with one newer build waiting.
pub fn production_fixture(frontend_update: DateTime<Utc>) -> Fixture {
    let fx = Fixture::new();

    fx.add_pr_build(build("be-1", "shop-backend", "aaaaaaa1111", at(10, 0)), 11);
    fx.add_pr_build(build("be-2", "shop-backend", "bbbbbbb2222", at(10, 30)), 12);
    fx.add_pr_build(build("be-stg", "shop-backend-main-test", "bbbbbbb2222", at(10, 20)), 12);
    fx.pipelines.add_execution(commit_execution(
        "shop-backend-production",
        "exec-be",
        "aaaaaaa1111",
        at(10, 5),
    ));

    fx.add_pr_build(
        with_image(
            build("fe-1", "shop-frontend", "ccccccc3333", at(10, 0)),
            "registry/shop-frontend:ccccccc3333",
        ),
        13,
    );
    fx.add_pr_build(build("fe-2", "shop-frontend", "ddddddd4444", frontend_update), 14);
    fx.add_pr_build(build("fe-stg", "shop-frontend-main-test", "ddddddd4444", at(10, 25)), 14);
    fx.pipelines.set_source_stage(
        "shop-frontend-production",
        deploy_tracker::models::SourceStageConfig {
            bucket: "artifacts".into(),
            object_key: "shop/frontend.tar.gz".into(),
        },
    );
    fx.objects.put(
        "artifacts",
        "shop/frontend.tar.gz",
        "v-7",
        image_bundle("registry/shop-frontend:ccccccc3333"),
    );
    fx.pipelines.add_execution(object_execution(
        "shop-frontend-production",
        "exec-fe",
        "v-7",
        at(10, 6),
    ));

    fx
}
