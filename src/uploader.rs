//! Upload orchestration: sign, transfer, then link.

use crate::backend::{
    BackendHttpClient, LinkingClient, LinkingService, SigningClient, SigningService,
};
use crate::cdn::{CdnClient, TransferService};
use crate::models::{Asset, CdnUploadParameters, Config, UploadRequest};
use crate::progress::{self, ProgressEvent, ProgressSender, ProgressStream};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Runs the three upload steps in order against injectable services.
#[derive(Clone)]
pub struct Uploader {
    signing: Arc<dyn SigningService>,
    transfer: Arc<dyn TransferService>,
    linking: Arc<dyn LinkingService>,
}

/// Injectable service bundle used to construct [`Uploader`] in tests/harnesses.
pub struct UploaderServices {
    pub signing: Arc<dyn SigningService>,
    pub transfer: Arc<dyn TransferService>,
    pub linking: Arc<dyn LinkingService>,
}

/// The final outcome of an upload, resolved exactly once.
pub struct UploadResult {
    rx: oneshot::Receiver<Result<Asset>>,
}

impl UploadResult {
    pub async fn wait(self) -> Result<Asset> {
        self.rx
            .await
            .map_err(|_| Error::Generic("upload task ended without a result".to_string()))?
    }
}

/// An in-flight upload: ordered progress events plus the final result.
///
/// The event stream ends once the result is available.
pub struct UploadHandle {
    events: ProgressStream,
    result: UploadResult,
}

impl UploadHandle {
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.next().await
    }

    /// Wait for the upload to settle, discarding any unread events.
    pub async fn finish(self) -> Result<Asset> {
        self.result.wait().await
    }

    pub fn into_parts(self) -> (ProgressStream, UploadResult) {
        (self.events, self.result)
    }
}

impl Uploader {
    pub fn with_services(services: UploaderServices) -> Self {
        Self {
            signing: services.signing,
            transfer: services.transfer,
            linking: services.linking,
        }
    }

    /// Build an uploader talking to the configured backend and CDN.
    pub fn from_config(config: &Config) -> Result<Self> {
        // One connection pool for both hosts; it carries no default headers.
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let backend = BackendHttpClient::new_with_client(
            config.backend_base_url.clone(),
            config.backend_api_token.clone(),
            http_client.clone(),
        );
        let cdn = CdnClient::new_with_client(config.cloud_name.clone(), http_client)
            .with_base_url(config.cdn_base_url.clone());

        Ok(Self::with_services(UploaderServices {
            signing: Arc::new(SigningClient::new(backend.clone())),
            transfer: Arc::new(cdn),
            linking: Arc::new(LinkingClient::new(backend)),
        }))
    }

    /// Start an upload in the background.
    ///
    /// The progress channel exists before the upload task is spawned, so
    /// no event can be emitted before the handle could observe it. Must be
    /// called from within a tokio runtime.
    pub fn upload(&self, request: UploadRequest) -> UploadHandle {
        let (progress, events) = progress::channel();
        let (tx, rx) = oneshot::channel();
        let uploader = self.clone();

        tokio::spawn(async move {
            let result = uploader.upload_with_progress(request, &progress).await;
            // Close the event stream before the result becomes visible.
            drop(progress);
            let _ = tx.send(result);
        });

        UploadHandle {
            events,
            result: UploadResult { rx },
        }
    }

    /// Run the full pipeline, emitting progress on `progress`.
    pub async fn upload_with_progress(
        &self,
        request: UploadRequest,
        progress: &ProgressSender,
    ) -> Result<Asset> {
        let mut params = CdnUploadParameters::new(request);
        let public_id = params.public_id.clone();
        info!("[{}] Starting upload", public_id);

        self.signing.sign(&mut params, progress).await.map_err(|e| {
            error!("[{}] Signing failed: {}", public_id, e);
            e
        })?;

        let result = self.transfer.transfer(&params, progress).await.map_err(|e| {
            error!("[{}] Transfer failed: {}", public_id, e);
            e
        })?;
        info!("[{}] Transferred to CDN as {}", public_id, result.public_id);

        let asset = self
            .linking
            .link(&params, &result, progress)
            .await
            .map_err(|e| {
                error!(
                    "[{}] Linking failed; CDN asset {} is not registered: {}",
                    public_id, result.public_id, e
                );
                e
            })?;

        info!("[{}] Upload complete", public_id);
        Ok(asset)
    }
}
