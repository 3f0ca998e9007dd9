//! CDN integration for transferring image payloads
//!
//! Sends either the image bytes (multipart, with progress) or a remote URL
//! for the CDN to fetch. Requests to the CDN never carry the backend
//! credential.

pub mod client;
pub mod mime;
pub mod mock;

pub use client::CdnClient;
pub use mock::MockCdnClient;

use crate::models::{CdnUploadParameters, CdnUploadResult};
use crate::progress::ProgressSender;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TransferService: Send + Sync {
    /// Transfer the payload of already-signed `params` to the CDN.
    async fn transfer(
        &self,
        params: &CdnUploadParameters,
        progress: &ProgressSender,
    ) -> Result<CdnUploadResult>;
}
