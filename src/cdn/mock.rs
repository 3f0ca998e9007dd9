use super::TransferService;
use crate::models::{CdnUploadParameters, CdnUploadResult, UploadSource};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// In-memory CDN that replays a fixed progress sequence for file payloads.
#[derive(Clone)]
pub struct MockCdnClient {
    progress_steps: Vec<u8>,
    format: String,
    version: i64,
    should_fail: Arc<Mutex<bool>>,
    transferred: Arc<Mutex<Vec<String>>>,
}

impl MockCdnClient {
    pub fn new() -> Self {
        Self {
            progress_steps: vec![0, 50, 100],
            format: "png".to_string(),
            version: 1_700_000_000,
            should_fail: Arc::new(Mutex::new(false)),
            transferred: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_progress_steps(mut self, steps: Vec<u8>) -> Self {
        self.progress_steps = steps;
        self
    }

    pub fn with_format(mut self, format: String) -> Self {
        self.format = format;
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_transfer_count(&self) -> usize {
        self.transferred.lock().unwrap().len()
    }

    /// Public ids of every successful transfer, oldest first.
    pub fn get_transferred(&self) -> Vec<String> {
        self.transferred.lock().unwrap().clone()
    }
}

impl Default for MockCdnClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferService for MockCdnClient {
    async fn transfer(
        &self,
        params: &CdnUploadParameters,
        progress: &ProgressSender,
    ) -> Result<CdnUploadResult> {
        if !params.is_signed() {
            return Err(Error::Invariant(
                "upload parameters must be signed before transfer".to_string(),
            ));
        }
        if *self.should_fail.lock().unwrap() {
            return Err(Error::Transfer("mock transfer failure".to_string()));
        }

        if let UploadSource::File(_) = params.request.source {
            for percent in &self.progress_steps {
                progress.emit(ProgressEvent::transfer(Some(*percent)));
            }
        }

        self.transferred
            .lock()
            .unwrap()
            .push(params.public_id.clone());

        Ok(CdnUploadResult {
            public_id: params.public_id.clone(),
            version: self.version,
            format: params
                .request
                .format
                .clone()
                .unwrap_or_else(|| self.format.clone()),
            folder: None,
            width: None,
            height: None,
            bytes: None,
            secure_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadRequest;
    use crate::progress;

    fn signed(request: UploadRequest) -> CdnUploadParameters {
        let mut params = CdnUploadParameters::new(request);
        params
            .apply_signature("sig".to_string(), "key".to_string())
            .unwrap();
        params
    }

    #[tokio::test]
    async fn test_mock_cdn_file_reports_progress() {
        let client = MockCdnClient::new();
        let request = UploadRequest::from_file("a.png", vec![1, 2], "a").unwrap();
        let (tx, rx) = progress::channel();

        let result = client.transfer(&signed(request), &tx).await.unwrap();
        drop(tx);

        assert_eq!(result.format, "png");
        let percents: Vec<Option<u8>> = rx
            .collect()
            .await
            .into_iter()
            .map(|e| e.percent_complete)
            .collect();
        assert_eq!(percents, vec![Some(0), Some(50), Some(100)]);
        assert_eq!(client.get_transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_cdn_url_is_silent() {
        let client = MockCdnClient::new().with_format("jpg".to_string());
        let request = UploadRequest::from_url("https://x/y.jpg", "a").unwrap();
        let (tx, rx) = progress::channel();

        let result = client.transfer(&signed(request), &tx).await.unwrap();
        drop(tx);

        assert_eq!(result.format, "jpg");
        assert!(rx.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_cdn_failure() {
        let client = MockCdnClient::new().with_failure(true);
        let request = UploadRequest::from_url("https://x/y.jpg", "a").unwrap();

        let result = client
            .transfer(&signed(request), &ProgressSender::disconnected())
            .await;
        assert!(matches!(result, Err(Error::Transfer(_))));
        assert_eq!(client.get_transfer_count(), 0);
    }
}
