use super::{LinkingService, SigningService};
use crate::models::{Asset, CdnUploadParameters, CdnUploadResult};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MockSigningClient {
    signature: String,
    api_key: String,
    should_fail: Arc<Mutex<bool>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockSigningClient {
    pub fn new() -> Self {
        Self {
            signature: "mock-signature".to_string(),
            api_key: "mock-api-key".to_string(),
            should_fail: Arc::new(Mutex::new(false)),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_signature(mut self, signature: String, api_key: String) -> Self {
        self.signature = signature;
        self.api_key = api_key;
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockSigningClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SigningService for MockSigningClient {
    async fn sign(
        &self,
        params: &mut CdnUploadParameters,
        progress: &ProgressSender,
    ) -> Result<()> {
        *self.call_count.lock().unwrap() += 1;
        progress.emit(ProgressEvent::signature_requested());

        if *self.should_fail.lock().unwrap() {
            return Err(Error::Signing("mock signing failure".to_string()));
        }

        params.apply_signature(self.signature.clone(), self.api_key.clone())
    }
}

/// In-memory asset store with upsert semantics.
#[derive(Clone)]
pub struct MockLinkingClient {
    assets: Arc<Mutex<HashMap<String, Asset>>>,
    should_fail: Arc<Mutex<bool>>,
    link_count: Arc<Mutex<usize>>,
}

impl MockLinkingClient {
    pub fn new() -> Self {
        Self {
            assets: Arc::new(Mutex::new(HashMap::new())),
            should_fail: Arc::new(Mutex::new(false)),
            link_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_link_count(&self) -> usize {
        *self.link_count.lock().unwrap()
    }

    pub fn get_assets(&self) -> HashMap<String, Asset> {
        self.assets.lock().unwrap().clone()
    }
}

impl Default for MockLinkingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkingService for MockLinkingClient {
    async fn link(
        &self,
        params: &CdnUploadParameters,
        result: &CdnUploadResult,
        progress: &ProgressSender,
    ) -> Result<Asset> {
        *self.link_count.lock().unwrap() += 1;

        let mut asset = Asset::from_upload(result, &params.request);
        progress.emit(ProgressEvent::linking());

        if *self.should_fail.lock().unwrap() {
            return Err(Error::Linking("mock linking failure".to_string()));
        }

        asset.mark_persisted();
        self.assets
            .lock()
            .unwrap()
            .insert(asset.asset_id.clone(), asset.clone());
        Ok(asset)
    }
}
