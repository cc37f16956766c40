//! Remote CI gateway: builds, pipeline executions and artifact objects over
//! one JSON API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::models::{ExecutionSummary, PipelineExecutionRecord, RawBuild, SourceStageConfig};
use crate::services::sources::{BuildSource, ObjectStore, PipelineSource, MAX_BATCH};

#[derive(Clone, Debug)]
pub struct RemoteCiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "__type", alias = "code")]
    error_class: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct BuildIdsResponse {
    ids: Vec<String>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    ids: &'a [String],
}

#[derive(Deserialize)]
struct BatchResponse {
    builds: Vec<RawBuild>,
}

#[derive(Deserialize)]
struct PipelinesResponse {
    pipelines: Vec<String>,
}

#[derive(Deserialize)]
struct ExecutionsResponse {
    executions: Vec<ExecutionSummary>,
}

impl RemoteCiClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(TrackerError::Config("CI gateway URL not configured".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("deploy-tracker")
            .build()
            .map_err(|e| TrackerError::Config(format!("CI gateway client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(&config.gateway_url, config.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(
        &self,
        service: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let resp = request
            .send()
            .await
            .map_err(|e| TrackerError::transport(service, e))?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ErrorBody>(&text).ok();
        let error_class = body.as_ref().and_then(|b| b.error_class.clone());
        let message = body.and_then(|b| b.message).unwrap_or(text);
        if status == 404 && error_class.is_none() {
            return Err(TrackerError::NotFound(format!("{service}: {message}")));
        }
        Err(TrackerError::from_response(
            service,
            status,
            error_class.as_deref(),
            message,
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, service: &'static str, path: &str) -> Result<T> {
        let resp = self.send(service, self.client.get(self.url(path))).await?;
        decode(service, resp).await
    }
}

async fn decode<T: DeserializeOwned>(service: &'static str, resp: reqwest::Response) -> Result<T> {
    resp.json::<T>().await.map_err(|e| TrackerError::Decode {
        service,
        message: e.to_string(),
    })
}

#[async_trait]
impl BuildSource for RemoteCiClient {
    async fn list_build_ids(&self, project: &str, limit: usize) -> Result<Vec<String>> {
        let request = self
            .client
            .get(self.url(&format!("projects/{project}/builds")))
            .query(&[("limit", limit)]);
        let resp = self.send("builds", request).await?;
        let body: BuildIdsResponse = decode("builds", resp).await?;
        Ok(body.ids)
    }

    async fn batch_get_builds(&self, ids: &[String]) -> Result<Vec<RawBuild>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_BATCH {
            return Err(TrackerError::Config(format!(
                "batch of {} exceeds the {MAX_BATCH} id limit",
                ids.len()
            )));
        }
        let request = self
            .client
            .post(self.url("builds/batch"))
            .json(&BatchRequest { ids });
        let resp = self.send("builds", request).await?;
        let body: BatchResponse = decode("builds", resp).await?;
        Ok(body.builds)
    }
}

#[async_trait]
impl PipelineSource for RemoteCiClient {
    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let body: PipelinesResponse = self.get_json("pipelines", "pipelines").await?;
        Ok(body.pipelines)
    }

    async fn list_executions(&self, pipeline: &str, limit: usize) -> Result<Vec<ExecutionSummary>> {
        let request = self
            .client
            .get(self.url(&format!("pipelines/{pipeline}/executions")))
            .query(&[("limit", limit)]);
        let resp = self.send("pipelines", request).await?;
        let body: ExecutionsResponse = decode("pipelines", resp).await?;
        Ok(body.executions)
    }

    async fn get_execution(
        &self,
        pipeline: &str,
        execution_id: &str,
    ) -> Result<PipelineExecutionRecord> {
        self.get_json("pipelines", &format!("pipelines/{pipeline}/executions/{execution_id}"))
            .await
    }

    async fn get_source_stage(&self, pipeline: &str) -> Result<Option<SourceStageConfig>> {
        let path = format!("pipelines/{pipeline}/source");
        match self.get_json::<Option<SourceStageConfig>>("pipelines", &path).await {
            Err(TrackerError::NotFound(_)) => Ok(None),
            other => other,
        }
    }
}

#[async_trait]
impl ObjectStore for RemoteCiClient {
    async fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<Vec<u8>> {
        let request = self
            .client
            .get(self.url(&format!("objects/{bucket}/{key}")))
            .query(&[("versionId", version_id)]);
        let resp = self.send("objects", request).await?;
        let bytes = resp.bytes().await.map_err(|e| TrackerError::Decode {
            service: "objects",
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
