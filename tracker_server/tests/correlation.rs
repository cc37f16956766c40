mod common;

use std::sync::Arc;
use std::time::Duration;

use deploy_tracker::config::TrackerConfig;
use deploy_tracker::models::{
    BuildRecord, Component, Environment, MatchMethod, SourceStageConfig,
};
use deploy_tracker::TrackerError;
use deploy_tracker::services::cache::TrackerCaches;
use deploy_tracker::services::classifier::BuildClassifier;
use deploy_tracker::services::correlator::ArtifactCorrelator;
use deploy_tracker::services::retry::RetryPolicy;
use deploy_tracker::services::throttle::RequestThrottler;
use deploy_tracker::services::upstream::Upstream;

use common::{at, build, object_execution, tar_gz, Fixture};

const PIPELINE: &str = "app-backend-production";

fn correlator(fx: &Fixture) -> ArtifactCorrelator {
    let upstream = Upstream::new(
        Arc::new(RequestThrottler::new(2, Duration::ZERO, Duration::from_secs(5))),
        RetryPolicy::with_retries(1),
    );
    ArtifactCorrelator::new(
        fx.pipelines.clone(),
        fx.objects.clone(),
        upstream,
        Arc::new(TrackerCaches::new(Duration::from_secs(60))),
    )
}

fn records(raw: &[deploy_tracker::models::RawBuild]) -> Vec<BuildRecord> {
    let classifier = BuildClassifier::new(&TrackerConfig::default());
    raw.iter().map(|b| classifier.to_record(b)).collect()
}

fn with_bundle(fx: &Fixture, version_id: &str, bundle: Vec<u8>) {
    fx.pipelines.set_source_stage(
        PIPELINE,
        SourceStageConfig {
            bucket: "deploy-artifacts".into(),
            object_key: "app/backend.tar.gz".into(),
        },
    );
    fx.objects.put("deploy-artifacts", "app/backend.tar.gz", version_id, bundle);
}

#[tokio::test]
async fn object_version_resolves_commit_from_manifest_tag() {
    let fx = Fixture::new();
    with_bundle(
        &fx,
        "v1",
        tar_gz(&[(
            "imagedefinitions.json",
            r#"[{"name":"api","imageUri":"registry/app:abcdef12"}]"#,
        )]),
    );
    let execution = object_execution(PIPELINE, "exec-1", "v1", at(12, 0));

    let mut failed = build("failed", "app-backend", "abcdef1234", at(11, 50));
    failed.status = "FAILED".into();
    let candidates = records(&[failed, build("ok", "app-backend", "abcdef1234", at(11, 40))]);

    let correlator = correlator(&fx);
    let deployed = correlator.resolve_revision(&execution).await.unwrap();
    assert_eq!(deployed.commit.as_deref(), Some("abcdef1"));

    let record = correlator
        .correlate(Environment::Production, Component::Backend, &execution, &candidates)
        .await
        .unwrap();
    assert_eq!(record.correlated_build().map(|b| b.id.as_str()), Some("ok"));
    assert_eq!(record.match_method(), MatchMethod::CommitHash);
    assert_eq!(record.resolved_commit(), Some("abcdef1234"));
}

#[tokio::test]
async fn bundles_are_fetched_once_per_version() {
    let fx = Fixture::new();
    with_bundle(
        &fx,
        "v1",
        tar_gz(&[("imageDetail.json", r#"{"ImageURI":"registry/app:abcdef12"}"#)]),
    );
    let execution = object_execution(PIPELINE, "exec-1", "v1", at(12, 0));
    let candidates = records(&[build("ok", "app-backend", "abcdef1234", at(11, 40))]);

    let correlator = correlator(&fx);
    let first = correlator
        .correlate(Environment::Production, Component::Backend, &execution, &candidates)
        .await
        .unwrap();
    let second = correlator
        .correlate(Environment::Production, Component::Backend, &execution, &candidates)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.objects.faults.calls("get_object_version"), 1);
    assert_eq!(fx.pipelines.faults.calls("get_source_stage"), 1);
}

#[tokio::test]
async fn malformed_bundle_leaves_deployment_uncorrelated() {
    let fx = Fixture::new();
    with_bundle(&fx, "v2", b"not an archive".to_vec());
    let execution = object_execution(PIPELINE, "exec-2", "v2", at(12, 0));
    let candidates = records(&[build("ok", "app-backend", "abcdef1234", at(11, 40))]);

    let record = correlator(&fx)
        .correlate(Environment::Production, Component::Backend, &execution, &candidates)
        .await
        .unwrap();
    assert!(record.correlated_build().is_none());
    assert_eq!(record.match_method(), MatchMethod::None);
    assert!(record.is_too_old());
    assert_eq!(record.resolved_commit(), None);
}

#[tokio::test]
async fn unmatched_commit_is_never_guessed() {
    let fx = Fixture::new();
    let execution = common::commit_execution(PIPELINE, "exec-3", "9999999aaaa", at(12, 0));
    let candidates = records(&[
        build("close-in-time", "app-backend", "1234567aaaa", at(11, 59)),
        build("older", "app-backend", "7654321aaaa", at(10, 0)),
    ]);

    let record = correlator(&fx)
        .correlate(Environment::Production, Component::Backend, &execution, &candidates)
        .await
        .unwrap();
    assert!(record.correlated_build().is_none());
    assert!(record.is_too_old());
    assert_eq!(record.resolved_commit(), Some("9999999aaaa"));
}

#[tokio::test]
async fn transient_object_store_failure_is_retried() {
    let fx = Fixture::new();
    with_bundle(
        &fx,
        "v3",
        tar_gz(&[(
            "imagedefinitions.json",
            r#"[{"name":"api","imageUri":"registry/app:abcdef12"}]"#,
        )]),
    );
    fx.objects.faults.fail_next(
        "get_object_version",
        TrackerError::Http {
            service: "objects",
            status: 503,
            message: "unavailable".into(),
        },
    );
    let execution = object_execution(PIPELINE, "exec-4", "v3", at(12, 0));

    let deployed = correlator(&fx).resolve_revision(&execution).await.unwrap();
    assert_eq!(deployed.image_reference.as_deref(), Some("registry/app:abcdef12"));
    assert_eq!(fx.objects.faults.calls("get_object_version"), 2);
}

#[tokio::test]
async fn rate_limited_object_fetch_is_an_error() {
    let fx = Fixture::new();
    with_bundle(
        &fx,
        "v5",
        tar_gz(&[("imageDetail.json", r#"{"ImageURI":"registry/app:abcdef12"}"#)]),
    );
    fx.objects.faults.rate_limit("get_object_version", "objects", 1);
    let execution = object_execution(PIPELINE, "exec-5", "v5", at(12, 0));
    let candidates = records(&[build("ok", "app-backend", "abcdef1234", at(11, 40))]);

    let correlator = correlator(&fx);
    let err = correlator
        .correlate(Environment::Production, Component::Backend, &execution, &candidates)
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(fx.objects.faults.calls("get_object_version"), 1);

    // Nothing was cached for the failed version, so the next attempt reads it.
    let record = correlator
        .correlate(Environment::Production, Component::Backend, &execution, &candidates)
        .await
        .unwrap();
    assert_eq!(record.correlated_build().map(|b| b.id.as_str()), Some("ok"));
}

#[tokio::test]
async fn exhausted_source_stage_retries_are_an_error() {
    let fx = Fixture::new();
    with_bundle(
        &fx,
        "v6",
        tar_gz(&[("imageDetail.json", r#"{"ImageURI":"registry/app:abcdef12"}"#)]),
    );
    for _ in 0..2 {
        fx.pipelines.faults.fail_next(
            "get_source_stage",
            TrackerError::Http {
                service: "pipelines",
                status: 503,
                message: "unavailable".into(),
            },
        );
    }
    let execution = object_execution(PIPELINE, "exec-6", "v6", at(12, 0));

    let err = correlator(&fx).resolve_revision(&execution).await.unwrap_err();
    assert!(!err.is_rate_limited());
    assert!(matches!(err, TrackerError::Http { status: 503, .. }));
    assert_eq!(fx.pipelines.faults.calls("get_source_stage"), 2);
    assert_eq!(fx.objects.faults.calls("get_object_version"), 0);
}
