use crate::{Error, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Lightweight REST client for the trusted backend.
///
/// The bearer credential is attached per request here and nowhere else, so
/// requests built from other clients never carry it.
#[derive(Clone)]
pub struct BackendHttpClient {
    pub(crate) client: Client,
    credential: Option<String>,
    pub(crate) base_url: String,
}

impl BackendHttpClient {
    pub fn new(base_url: String, credential: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(base_url, credential, client))
    }

    pub fn new_with_client(base_url: String, credential: Option<String>, client: Client) -> Self {
        Self {
            client,
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        url: &str,
        on_error: fn(String) -> Error,
    ) -> Result<Response> {
        let response = self.authorize(builder).send().await.map_err(|e| {
            tracing::error!("Failed to send request to backend {}: {}", url, e);
            on_error(format!("request to {} failed: {}", url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Backend error (status {}): {}", status, error_text);
            return Err(on_error(format!(
                "backend returned status {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    /// GET `path` with `query` and decode the JSON body.
    ///
    /// Every failure is reported through `on_error` so callers keep their
    /// own error kind.
    pub async fn get_json<Resp: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        on_error: fn(String) -> Error,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .send(self.client.get(&url).query(query), &url, on_error)
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| on_error(format!("failed to read backend response: {}", e)))?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse backend response: {}\nBody: {}", e, body);
            on_error(format!("failed to parse backend response: {}", e))
        })
    }

    /// PUT `body` as JSON to `path`. The response body is ignored.
    pub async fn put_json<Req: Serialize + Sync>(
        &self,
        path: &str,
        body: &Req,
        on_error: fn(String) -> Error,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.client.put(&url).json(body), &url, on_error)
            .await?;
        Ok(())
    }
}
