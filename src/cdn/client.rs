use super::mime::detect_image_mime;
use super::TransferService;
use crate::models::{CdnUploadParameters, CdnUploadResult, SourceFile, UploadSource};
use crate::progress::{percent_of, ProgressEvent, ProgressSender, WeakProgressSender};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.cloudinary.com/v1_1";
const MAX_CHUNK_SIZE: usize = 64 * 1024;
const MIN_CHUNK_SIZE: usize = 1024;
/// Roughly how many progress steps a payload is split into.
const TARGET_STEPS: usize = 20;

/// Error body returned by the CDN upload API.
#[derive(Debug, Deserialize)]
struct CdnErrorBody {
    error: CdnErrorMessage,
}

#[derive(Debug, Deserialize)]
struct CdnErrorMessage {
    message: String,
}

/// Chunk size for a payload of `total` bytes, capped at `max_chunk`.
fn chunk_size_for(total: usize, max_chunk: usize) -> usize {
    max_chunk.min((total / TARGET_STEPS).max(MIN_CHUNK_SIZE)).max(1)
}

/// Split `data` into chunks and report progress as the transport consumes them.
///
/// A chunk counts as sent once the transport asks for the next one (or for
/// the end of the stream), not when it is handed out. Holds a weak sender
/// since the transport may keep the body alive after the response arrives.
fn progress_stream(
    data: Bytes,
    chunk_size: usize,
    progress: WeakProgressSender,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static {
    let total = data.len() as u64;
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect();

    let mut sent = 0u64;
    let mut in_flight = 0u64;
    let mut last_percent = 0u8;
    let polls = chunks.into_iter().map(Some).chain(std::iter::once(None));
    stream::iter(polls.filter_map(move |chunk: Option<Bytes>| {
        if in_flight > 0 {
            sent += in_flight;
            let percent = percent_of(sent, total);
            if percent != last_percent {
                last_percent = percent;
                progress.emit(ProgressEvent::transfer(Some(percent)));
            }
        }
        in_flight = chunk.as_ref().map_or(0, |chunk| chunk.len() as u64);
        chunk.map(Ok::<Bytes, std::io::Error>)
    }))
}

pub struct CdnClient {
    client: Client,
    base_url: String,
    cloud_name: String,
    max_chunk_size: usize,
}

impl CdnClient {
    pub fn new(cloud_name: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(cloud_name, client))
    }

    /// `client` must not carry default credentials for other services.
    pub fn new_with_client(cloud_name: String, client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            cloud_name,
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Upper bound on the body chunk size; small payloads use smaller chunks.
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn upload_url(&self, resource_type: &str) -> String {
        format!(
            "{}/{}/{}/upload",
            self.base_url, self.cloud_name, resource_type
        )
    }

    async fn send_file(
        &self,
        url: &str,
        params: &CdnUploadParameters,
        file: &SourceFile,
        progress: &ProgressSender,
    ) -> Result<Response> {
        let total = file.data.len() as u64;
        let body = Body::wrap_stream(progress_stream(
            file.data.clone(),
            chunk_size_for(file.data.len(), self.max_chunk_size),
            progress.downgrade(),
        ));
        let file_part = Part::stream_with_length(body, total)
            .file_name(file.file_name.clone())
            .mime_str(detect_image_mime(&file.data))
            .map_err(|e| Error::Transfer(format!("invalid MIME type for file part: {}", e)))?;

        let form = params
            .fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
            .part("file", file_part);

        debug!(
            "Uploading {} ({} bytes) to {}",
            file.file_name, total, url
        );
        progress.emit(ProgressEvent::transfer(Some(0)));

        self.client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send file to CDN: {}", e);
                Error::Transfer(format!("request to {} failed: {}", url, e))
            })
    }

    async fn send_remote_url(
        &self,
        url: &str,
        params: &CdnUploadParameters,
        source_url: &str,
    ) -> Result<Response> {
        let mut body: serde_json::Map<String, serde_json::Value> = params
            .fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), serde_json::Value::String(value)))
            .collect();
        body.insert(
            "file".to_string(),
            serde_json::Value::String(source_url.to_string()),
        );

        debug!("Asking CDN at {} to fetch {}", url, source_url);

        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send remote URL to CDN: {}", e);
                Error::Transfer(format!("request to {} failed: {}", url, e))
            })
    }
}

#[async_trait]
impl TransferService for CdnClient {
    async fn transfer(
        &self,
        params: &CdnUploadParameters,
        progress: &ProgressSender,
    ) -> Result<CdnUploadResult> {
        if !params.is_signed() {
            return Err(Error::Invariant(format!(
                "upload parameters for '{}' must be signed before transfer",
                params.public_id
            )));
        }

        let url = self.upload_url(&params.resource_type);
        let response = match &params.request.source {
            UploadSource::File(file) => self.send_file(&url, params, file, progress).await?,
            UploadSource::Url(source_url) => {
                self.send_remote_url(&url, params, source_url).await?
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transfer(format!("failed to read CDN response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<CdnErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            tracing::error!("CDN upload error (status {}): {}", status, message);
            return Err(Error::Transfer(format!(
                "CDN returned status {}: {}",
                status, message
            )));
        }

        let result: CdnUploadResult = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse CDN response: {}\nBody: {}", e, body);
            Error::Transfer(format!("failed to parse CDN response: {}", e))
        })?;

        info!(
            "CDN stored {} (version {}, format {})",
            result.public_id, result.version, result.format
        );
        Ok(result)
    }
}
