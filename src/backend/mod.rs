//! Trusted backend integration
//!
//! The backend signs upload parameters so the CDN can trust the browser's
//! request, and stores the resulting asset once the CDN has it.

pub mod client;
pub mod linking;
pub mod mock;
pub mod signing;

pub use client::BackendHttpClient;
pub use linking::LinkingClient;
pub use mock::{MockLinkingClient, MockSigningClient};
pub use signing::{canonical_signable_string, SigningClient};

use crate::models::{Asset, CdnUploadParameters, CdnUploadResult};
use crate::progress::ProgressSender;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SigningService: Send + Sync {
    /// Populate `signature` and `api_key` on `params`.
    ///
    /// `params` is left untouched when the request fails.
    async fn sign(&self, params: &mut CdnUploadParameters, progress: &ProgressSender)
        -> Result<()>;
}

#[async_trait]
pub trait LinkingService: Send + Sync {
    /// Upsert the asset described by `result` and the request metadata.
    async fn link(
        &self,
        params: &CdnUploadParameters,
        result: &CdnUploadResult,
        progress: &ProgressSender,
    ) -> Result<Asset>;
}
