//! HTTP client for the collection store service.
//!
//! Talks to the REST wrapper in front of the vector database. Failures
//! split into "service unreachable" (transport) and "request rejected";
//! a rejection arrives either as an HTTP error status with a `detail`
//! field or as a 2xx wrapper body whose `success` flag is false.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::config::StoreConfig;
use crate::core::errors::PipelineError;
use crate::store::CollectionStore;

/// Store client backed by the collection REST service.
pub struct HttpCollectionStore {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl HttpCollectionStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            client: Client::new(),
        }
    }

    fn collection_url(&self, name: &str, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.base_url,
            urlencoding::encode(name),
            suffix
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Value, PipelineError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| connection_error(e, &self.base_url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| connection_error(e, &self.base_url))?;
        let payload = interpret_response(status, &body, context)?;
        debug!(context, "store request succeeded");
        Ok(payload)
    }
}

fn interpret_response(
    status: StatusCode,
    body: &str,
    context: &str,
) -> Result<Value, PipelineError> {
    if !status.is_success() {
        return Err(PipelineError::store_request(format!(
            "{context} failed with {status}: {}",
            extract_detail(body)
        )));
    }
    let payload: Value = serde_json::from_str(body).map_err(|e| {
        PipelineError::store_request(format!("{context} returned invalid JSON: {e}"))
    })?;
    if payload["success"].as_bool() == Some(false) {
        let error = payload["error"].as_str().unwrap_or(body);
        return Err(PipelineError::store_request(format!(
            "{context} rejected: {error}"
        )));
    }
    Ok(payload)
}

fn connection_error(e: reqwest::Error, base_url: &str) -> PipelineError {
    if e.is_connect() || e.is_timeout() {
        PipelineError::store_unavailable(format!(
            "collection store at {base_url} is not reachable: {e}"
        ))
    } else {
        PipelineError::store_request(e)
    }
}

/// Pulls the `detail` field out of an error body, falling back to the
/// raw text.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["detail"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl CollectionStore for HttpCollectionStore {
    async fn health(&self) -> Result<(), PipelineError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                PipelineError::store_unavailable(format!(
                    "collection store at {} is not reachable: {e}",
                    self.base_url
                ))
            })?;
        if !response.status().is_success() {
            return Err(PipelineError::store_unavailable(format!(
                "collection store health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, PipelineError> {
        let url = self.collection_url(name, "/exists");
        let payload = self
            .send(self.client.get(&url), "existence check")
            .await?;
        Ok(payload["exists"].as_bool().unwrap_or(false))
    }

    async fn create_collection(&self, name: &str, metadata: Value) -> Result<(), PipelineError> {
        if self.exists(name).await? {
            debug!(collection = name, "collection already exists, recreating");
            self.delete_collection(name).await?;
        }
        let url = format!("{}/collections", self.base_url);
        let body = json!({ "name": name, "metadata": metadata });
        self.send(self.client.post(&url).json(&body), "collection creation")
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), PipelineError> {
        let url = self.collection_url(name, "");
        self.send(self.client.delete(&url), "collection deletion")
            .await?;
        Ok(())
    }

    async fn add_documents(
        &self,
        name: &str,
        documents: &[String],
        metadatas: &[Value],
        ids: &[String],
    ) -> Result<(), PipelineError> {
        let url = self.collection_url(name, "/add");
        let body = json!({
            "documents": documents,
            "metadatas": metadatas,
            "ids": ids,
        });
        self.send(self.client.post(&url).json(&body), "document insertion")
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        query_texts: &[String],
        n_results: u32,
        include: &[&str],
    ) -> Result<Value, PipelineError> {
        let url = self.collection_url(name, "/query");
        let body = json!({
            "query_texts": query_texts,
            "n_results": n_results,
            "include": include,
        });
        let mut payload = self
            .send(self.client.post(&url).json(&body), "collection query")
            .await?;
        Ok(payload["results"].take())
    }

    async fn get_all(&self, name: &str, include: &[&str]) -> Result<Value, PipelineError> {
        let url = self.collection_url(name, "/get");
        let body = json!({ "include": include });
        let mut payload = self
            .send(self.client.post(&url).json(&body), "collection fetch")
            .await?;
        Ok(payload["data"].take())
    }
}
