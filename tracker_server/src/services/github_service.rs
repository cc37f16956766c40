//! GitHub integration: commit metadata, merged pull requests, commit comparison.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::services::sources::{CommitInfo, CompareResult, VcsHost};

const SERVICE: &str = "github";

#[derive(Clone, Debug)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    repo: String,
    token: String,
}

impl GitHubClient {
    pub fn new(
        api_url: &str,
        repo: &str,
        token: &str,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        if repo.is_empty() {
            return Err(TrackerError::Config("GitHub repository not configured".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("deploy-tracker")
            .build()
            .map_err(|e| TrackerError::Config(format!("GitHub client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(
            &config.github_api_url,
            &config.github_repo,
            &config.github_token,
            config.request_timeout,
        )
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}/repos/{}/{}", self.api_url, self.repo, path);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if !self.token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.token));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| TrackerError::transport(SERVICE, e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let exhausted = resp
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0");
            let text = resp.text().await.unwrap_or_default();
            tracing::debug!(%url, status, "GitHub request failed");
            if exhausted {
                return Err(TrackerError::RateLimited {
                    service: SERVICE,
                    message: text,
                });
            }
            if status == 404 {
                return Err(TrackerError::NotFound(format!("{SERVICE}: {path}")));
            }
            return Err(TrackerError::from_response(SERVICE, status, None, text));
        }

        resp.json::<T>().await.map_err(|e| TrackerError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitBody,
    author: Option<UserRef>,
}

#[derive(Deserialize)]
struct CommitBody {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct UserRef {
    login: String,
}

#[derive(Deserialize)]
struct PullRequestRef {
    number: u64,
    merge_commit_sha: Option<String>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CompareResponse {
    ahead_by: u32,
    behind_by: u32,
}

#[async_trait]
impl VcsHost for GitHubClient {
    async fn get_commit(&self, sha: &str) -> Result<CommitInfo> {
        let resp: CommitResponse = self.get_json(&format!("commits/{sha}")).await?;
        let author = resp
            .author
            .map(|a| a.login)
            .or_else(|| resp.commit.author.as_ref().and_then(|a| a.name.clone()))
            .unwrap_or_else(|| "unknown".to_string());
        Ok(CommitInfo {
            sha: resp.sha,
            author,
            message: resp.commit.message,
            date: resp.commit.author.and_then(|a| a.date),
        })
    }

    async fn find_merged_pull_request(&self, sha: &str) -> Result<Option<u64>> {
        let pulls: Vec<PullRequestRef> = self.get_json(&format!("commits/{sha}/pulls")).await?;
        let sha = sha.to_ascii_lowercase();
        Ok(pulls
            .into_iter()
            .filter(|pr| pr.merged_at.is_some())
            .find(|pr| {
                pr.merge_commit_sha
                    .as_deref()
                    .is_some_and(|merge| merge.to_ascii_lowercase().starts_with(&sha))
            })
            .map(|pr| pr.number))
    }

    async fn compare(&self, base: &str, head: &str) -> Result<CompareResult> {
        let resp: CompareResponse = self.get_json(&format!("compare/{base}...{head}")).await?;
        Ok(CompareResult {
            ahead_by: resp.ahead_by,
            behind_by: resp.behind_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&server.uri(), "acme/shop", "token-123", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn missing_repository_is_a_config_error() {
        let config = TrackerConfig {
            github_repo: String::new(),
            ..TrackerConfig::default()
        };
        let err = GitHubClient::from_config(&config).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[tokio::test]
    async fn commit_metadata_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/shop/commits/abc1234"))
            .and(header("Authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "abc1234ffff",
                "author": {"login": "dana"},
                "commit": {
                    "message": "Merge pull request #12 from acme/login",
                    "author": {"name": "Dana", "date": "2024-05-01T10:00:00Z"}
                }
            })))
            .mount(&server)
            .await;

        let commit = client(&server).get_commit("abc1234").await.unwrap();
        assert_eq!(commit.author, "dana");
        assert_eq!(commit.message, "Merge pull request #12 from acme/login");
        assert!(commit.date.is_some());
    }

    #[tokio::test]
    async fn only_the_merging_pull_request_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/shop/commits/feed123/pulls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"number": 3, "merge_commit_sha": "0000000", "merged_at": "2024-05-01T10:00:00Z"},
                {"number": 4, "merge_commit_sha": "feed123abc", "merged_at": null},
                {"number": 5, "merge_commit_sha": "FEED123abc", "merged_at": "2024-05-01T10:00:00Z"}
            ])))
            .mount(&server)
            .await;

        assert_eq!(client(&server).find_merged_pull_request("feed123").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn rate_limit_responses_are_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/shop/compare/aaa...bbb"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .set_body_string("API rate limit exceeded"),
            )
            .mount(&server)
            .await;

        let err = client(&server).compare("aaa", "bbb").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn compare_reports_ahead_and_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/shop/compare/aaa...bbb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ahead", "ahead_by": 3, "behind_by": 0
            })))
            .mount(&server)
            .await;

        let result = client(&server).compare("aaa", "bbb").await.unwrap();
        assert_eq!(result, CompareResult { ahead_by: 3, behind_by: 0 });
    }
}
