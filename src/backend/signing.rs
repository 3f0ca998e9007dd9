use super::client::BackendHttpClient;
use super::SigningService;
use crate::models::{CdnUploadParameters, SignatureResponse, SIGNED_PARAMETERS};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

pub const SIGNATURE_PATH: &str = "/cloudinary/signature";

/// Whitelisted `(name, value)` pairs in canonical order.
fn signable_pairs<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = fields
        .iter()
        .filter(|(name, _)| SIGNED_PARAMETERS.contains(&name.as_ref()))
        .map(|(name, value)| (name.as_ref().to_string(), value.as_ref().to_string()))
        .collect();
    pairs.sort_by(|a, b| format!("{}={}", a.0, a.1).cmp(&format!("{}={}", b.0, b.1)));
    pairs
}

/// Render the string the backend signs: whitelisted `name=value` entries,
/// sorted bytewise and joined with `&`.
///
/// The result depends only on the set of fields, never on their order.
pub fn canonical_signable_string<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)]) -> String {
    signable_pairs(fields)
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&")
}

pub struct SigningClient {
    http: BackendHttpClient,
}

impl SigningClient {
    pub fn new(http: BackendHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SigningService for SigningClient {
    async fn sign(
        &self,
        params: &mut CdnUploadParameters,
        progress: &ProgressSender,
    ) -> Result<()> {
        if params.is_signed() {
            return Err(Error::Invariant(format!(
                "upload parameters for '{}' are already signed",
                params.public_id
            )));
        }

        let fields = params.fields();
        debug!(
            "Signable string for {}: {}",
            params.public_id,
            canonical_signable_string(&fields)
        );
        let pairs = signable_pairs(&fields);
        let query: Vec<(&str, String)> = pairs
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();

        progress.emit(ProgressEvent::signature_requested());

        let response: SignatureResponse = self
            .http
            .get_json(SIGNATURE_PATH, &query, Error::Signing)
            .await?;

        if response.signature.is_empty() || response.api_key.is_empty() {
            return Err(Error::Signing(
                "backend returned an empty signature or api key".to_string(),
            ));
        }

        params.apply_signature(response.signature, response.api_key)?;
        info!("Signed upload parameters for {}", params.public_id);
        Ok(())
    }
}
