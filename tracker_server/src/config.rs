//! Tracker configuration: loaded from environment variables.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{BuildCategory, Component, Environment};

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Application prefix used to derive project and pipeline names.
    pub app_name: String,
    /// Tracked "main" ref (e.g. `refs/heads/main`).
    pub main_ref: String,
    /// Tracked "dev" ref.
    pub dev_ref: String,
    /// Project-name marker of builds targeting the dev environment.
    pub dev_test_marker: String,
    /// Project-name marker of builds targeting the staging environment.
    pub main_test_marker: String,
    /// Base URL of the CI gateway (build, pipeline and object-store API).
    pub gateway_url: String,
    /// GitHub personal access token for API calls.
    pub github_token: String,
    /// Repository in `owner/name` form.
    pub github_repo: String,
    pub github_api_url: String,
    /// Maximum in-flight external requests.
    pub max_concurrent_requests: usize,
    /// Minimum spacing between two dispatches.
    pub min_request_interval: Duration,
    pub request_timeout: Duration,
    /// Retries for transient failures (rate limiting is never retried).
    pub retry_attempts: u32,
    pub cache_ttl: Duration,
    /// Most recent builds fetched per project.
    pub build_lookback: usize,
    /// Most recent runs inspected per pipeline.
    pub execution_lookback: usize,
    /// Tolerance within which backend and frontend updates form a release pair.
    pub coordination_window: chrono::Duration,
    /// Build ids excluded from listing and correlation.
    pub ignored_builds: HashSet<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            main_ref: "refs/heads/main".to_string(),
            dev_ref: "refs/heads/dev".to_string(),
            dev_test_marker: "-dev-test".to_string(),
            main_test_marker: "-main-test".to_string(),
            gateway_url: "http://localhost:8085".to_string(),
            github_token: String::new(),
            github_repo: String::new(),
            github_api_url: "https://api.github.com".to_string(),
            max_concurrent_requests: 2,
            min_request_interval: Duration::from_millis(350),
            request_timeout: Duration::from_secs(15),
            retry_attempts: 3,
            cache_ttl: Duration::from_secs(300),
            build_lookback: 50,
            execution_lookback: 10,
            coordination_window: chrono::Duration::minutes(10),
            ignored_builds: HashSet::new(),
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let app_name = var_or("TRACKER_APP_NAME", defaults.app_name);
        let main_ref = var_or("TRACKER_MAIN_REF", defaults.main_ref);
        let dev_ref = var_or("TRACKER_DEV_REF", defaults.dev_ref);
        let dev_test_marker = var_or("TRACKER_DEV_TEST_MARKER", defaults.dev_test_marker);
        let main_test_marker = var_or("TRACKER_MAIN_TEST_MARKER", defaults.main_test_marker);
        let gateway_url = var_or("TRACKER_GATEWAY_URL", defaults.gateway_url);
        let github_token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
        let github_repo = std::env::var("GITHUB_REPO").unwrap_or_default();
        let github_api_url = var_or("GITHUB_API_URL", defaults.github_api_url);
        let max_concurrent_requests =
            parse_or("TRACKER_MAX_CONCURRENT", defaults.max_concurrent_requests).max(1);
        let min_request_interval = Duration::from_millis(parse_or("TRACKER_MIN_INTERVAL_MS", 350));
        let request_timeout = Duration::from_secs(parse_or("TRACKER_REQUEST_TIMEOUT_SECS", 15));
        let retry_attempts = parse_or("TRACKER_RETRY_ATTEMPTS", defaults.retry_attempts);
        let cache_ttl = Duration::from_secs(parse_or("TRACKER_CACHE_TTL_SECS", 300));
        let build_lookback = parse_or("TRACKER_BUILD_LOOKBACK", defaults.build_lookback);
        let execution_lookback =
            parse_or("TRACKER_EXECUTION_LOOKBACK", defaults.execution_lookback);
        let coordination_window =
            chrono::Duration::minutes(parse_or("TRACKER_COORDINATION_WINDOW_MIN", 10));
        let ignored_builds = std::env::var("TRACKER_IGNORED_BUILDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if github_token.is_empty() {
            tracing::warn!(
                "GITHUB_TOKEN not set -- GitHub lookups are unauthenticated and rate limited"
            );
        }
        if github_repo.is_empty() {
            tracing::warn!("GITHUB_REPO not set -- the GitHub client cannot be created");
        }

        Self {
            app_name,
            main_ref,
            dev_ref,
            dev_test_marker,
            main_test_marker,
            gateway_url,
            github_token,
            github_repo,
            github_api_url,
            max_concurrent_requests,
            min_request_interval,
            request_timeout,
            retry_attempts,
            cache_ttl,
            build_lookback,
            execution_lookback,
            coordination_window,
            ignored_builds,
        }
    }

    /// Build project feeding `environment` for `component`.
    pub fn build_project(&self, environment: Environment, component: Component) -> String {
        let marker = match environment.build_category() {
            BuildCategory::DevTest => self.dev_test_marker.as_str(),
            BuildCategory::MainTest => self.main_test_marker.as_str(),
            BuildCategory::Production | BuildCategory::Unknown => "",
        };
        format!("{}-{}{}", self.app_name, component, marker)
    }

    /// Pipeline deploying `component` into `environment`.
    pub fn pipeline_name(&self, environment: Environment, component: Component) -> String {
        format!("{}-{}-{}", self.app_name, component, environment)
    }

    /// Every build project the tracker lists.
    pub fn build_projects(&self) -> Vec<String> {
        Environment::ALL
            .iter()
            .flat_map(|env| Component::ALL.iter().map(move |c| self.build_project(*env, *c)))
            .collect()
    }

    pub fn is_ignored(&self, build_id: &str) -> bool {
        self.ignored_builds.contains(build_id)
    }
}

fn var_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_convention() {
        let config = TrackerConfig {
            app_name: "shop".into(),
            ..TrackerConfig::default()
        };
        assert_eq!(
            config.build_project(Environment::Production, Component::Backend),
            "shop-backend"
        );
        assert_eq!(
            config.build_project(Environment::Dev, Component::Frontend),
            "shop-frontend-dev-test"
        );
        assert_eq!(
            config.build_project(Environment::Staging, Component::Backend),
            "shop-backend-main-test"
        );
        assert_eq!(
            config.pipeline_name(Environment::Production, Component::Frontend),
            "shop-frontend-production"
        );
        assert_eq!(config.build_projects().len(), 6);
    }
}
