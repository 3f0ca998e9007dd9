//! Data models and structures
//!
//! Defines the upload request, the CDN parameter set derived from it, the CDN
//! response, the persisted asset record, and runtime configuration.

use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub const RESOURCE_TYPE_IMAGE: &str = "image";
pub const UPLOAD_TYPE_UPLOAD: &str = "upload";

/// Parameter names the backend includes when it re-derives the signable string.
pub const SIGNED_PARAMETERS: [&str; 8] = [
    "callback",
    "eager",
    "format",
    "public_id",
    "tags",
    "timestamp",
    "transformation",
    "type",
];

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file_name: String,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

/// Where the CDN pulls the image from. Exactly one per request.
#[derive(Debug, Clone)]
pub enum UploadSource {
    File(SourceFile),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: UploadSource,
    pub alt_text: String,
    pub title: Option<String>,
    pub asset_id: Option<String>,
    pub tags: Vec<String>,
    pub transformation: Option<String>,
    pub format: Option<String>,
}

impl UploadRequest {
    /// Build a request from the two optional transfer sources.
    ///
    /// Fails unless exactly one of `source_file` and `source_url` is set.
    pub fn new(
        source_file: Option<SourceFile>,
        source_url: Option<String>,
        alt_text: impl Into<String>,
    ) -> Result<Self> {
        let source = match (source_file, source_url) {
            (Some(file), None) => {
                if file.data.is_empty() {
                    return Err(Error::InvalidRequest(format!(
                        "source file '{}' is empty",
                        file.file_name
                    )));
                }
                UploadSource::File(file)
            }
            (None, Some(url)) => {
                reqwest::Url::parse(&url).map_err(|e| {
                    Error::InvalidRequest(format!("invalid source URL '{}': {}", url, e))
                })?;
                UploadSource::Url(url)
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidRequest(
                    "both a source file and a source URL were given".to_string(),
                ))
            }
            (None, None) => {
                return Err(Error::InvalidRequest(
                    "either a source file or a source URL is required".to_string(),
                ))
            }
        };

        let alt_text = alt_text.into();
        if alt_text.trim().is_empty() {
            return Err(Error::InvalidRequest("alt text is required".to_string()));
        }

        Ok(Self {
            source,
            alt_text,
            title: None,
            asset_id: None,
            tags: Vec::new(),
            transformation: None,
            format: None,
        })
    }

    pub fn from_file(
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        alt_text: impl Into<String>,
    ) -> Result<Self> {
        Self::new(Some(SourceFile::new(file_name, data)), None, alt_text)
    }

    pub fn from_url(url: impl Into<String>, alt_text: impl Into<String>) -> Result<Self> {
        Self::new(None, Some(url.into()), alt_text)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_transformation(mut self, transformation: impl Into<String>) -> Self {
        self.transformation = Some(transformation.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// The title to persist, falling back to the alt text.
    pub fn effective_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.alt_text)
    }
}

/// Parameters sent to the CDN, derived once per upload.
///
/// `signature` and `api_key` stay unset until the backend signs the
/// parameters, and can only be set once.
#[derive(Debug, Clone)]
pub struct CdnUploadParameters {
    pub request: UploadRequest,
    pub public_id: String,
    pub timestamp: i64,
    pub resource_type: String,
    pub upload_type: String,
    api_key: Option<String>,
    signature: Option<String>,
}

impl CdnUploadParameters {
    /// Derive parameters with the current unix time as the timestamp.
    pub fn new(request: UploadRequest) -> Self {
        Self::with_timestamp(request, chrono::Utc::now().timestamp())
    }

    pub fn with_timestamp(request: UploadRequest, timestamp: i64) -> Self {
        let public_id = request
            .asset_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request,
            public_id,
            timestamp,
            resource_type: RESOURCE_TYPE_IMAGE.to_string(),
            upload_type: UPLOAD_TYPE_UPLOAD.to_string(),
            api_key: None,
            signature: None,
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some() && self.api_key.is_some()
    }

    pub fn apply_signature(&mut self, signature: String, api_key: String) -> Result<()> {
        if self.signature.is_some() || self.api_key.is_some() {
            return Err(Error::Invariant(format!(
                "upload parameters for '{}' are already signed",
                self.public_id
            )));
        }
        self.signature = Some(signature);
        self.api_key = Some(api_key);
        Ok(())
    }

    /// Every scalar parameter that is present, in no particular order.
    ///
    /// Excludes the payload and the originating request.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("public_id", self.public_id.clone()),
            ("timestamp", self.timestamp.to_string()),
            ("type", self.upload_type.clone()),
            ("resource_type", self.resource_type.clone()),
        ];

        if !self.request.tags.is_empty() {
            fields.push(("tags", self.request.tags.join(",")));
        }
        if let Some(transformation) = &self.request.transformation {
            fields.push(("transformation", transformation.clone()));
        }
        if let Some(format) = &self.request.format {
            fields.push(("format", format.clone()));
        }
        if let Some(api_key) = &self.api_key {
            fields.push(("api_key", api_key.clone()));
        }
        if let Some(signature) = &self.signature {
            fields.push(("signature", signature.clone()));
        }

        fields
    }
}

/// Response body of a successful CDN upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CdnUploadResult {
    pub public_id: String,
    pub version: i64,
    pub format: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub secure_url: Option<String>,
}

/// An image registered with the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub asset_id: String,
    pub version: i64,
    pub folder: Option<String>,
    pub format: String,
    pub alt_text: String,
    pub title: String,
    #[serde(skip)]
    persisted: bool,
}

impl Asset {
    pub fn from_upload(result: &CdnUploadResult, request: &UploadRequest) -> Self {
        Self {
            asset_id: result.public_id.clone(),
            version: result.version,
            folder: result.folder.clone().filter(|folder| !folder.is_empty()),
            format: result.format.clone(),
            alt_text: request.alt_text.clone(),
            title: request.effective_title().to_string(),
            persisted: false,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    /// Public delivery URL for this version of the asset.
    pub fn delivery_url(&self, cloud_name: &str) -> String {
        format!(
            "https://res.cloudinary.com/{}/image/upload/v{}/{}.{}",
            cloud_name, self.version, self.asset_id, self.format
        )
    }
}

/// Reply of the backend signing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub signature: String,
    #[serde(rename = "apiKey", alias = "api_key")]
    pub api_key: String,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_base_url: String,
    pub backend_api_token: Option<String>,
    pub cdn_base_url: String,
    pub cloud_name: String,
    pub http_timeout: Duration,
}

/// A missing env file is fine; a malformed one is not.
fn env_file_loaded<T>(loaded: dotenvy::Result<T>) -> Result<()> {
    match loaded {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        env_file_loaded(dotenvy::dotenv())?;

        let http_timeout = match std::env::var("HTTP_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                Error::Config(format!("HTTP_TIMEOUT_SECS must be an integer, got '{}'", raw))
            })?),
            Err(_) => Duration::from_secs(60),
        };

        Ok(Self {
            backend_base_url: std::env::var("BACKEND_BASE_URL")
                .map_err(|_| Error::Config("BACKEND_BASE_URL not set".to_string()))?,
            backend_api_token: std::env::var("BACKEND_API_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            cdn_base_url: std::env::var("CDN_BASE_URL")
                .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string()),
            cloud_name: std::env::var("CLOUDINARY_CLOUD_NAME")
                .map_err(|_| Error::Config("CLOUDINARY_CLOUD_NAME not set".to_string()))?,
            http_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cdn_result() -> CdnUploadResult {
        CdnUploadResult {
            public_id: "abc".to_string(),
            version: 1_700_000_000,
            format: "png".to_string(),
            folder: None,
            width: Some(10),
            height: Some(10),
            bytes: Some(42),
            secure_url: None,
        }
    }

    #[test]
    fn test_request_requires_exactly_one_source() {
        let neither = UploadRequest::new(None, None, "cat");
        assert!(matches!(neither, Err(Error::InvalidRequest(_))));

        let both = UploadRequest::new(
            Some(SourceFile::new("cat.png", vec![1, 2, 3])),
            Some("https://x/y.png".to_string()),
            "cat",
        );
        assert!(matches!(both, Err(Error::InvalidRequest(_))));

        assert!(UploadRequest::from_file("cat.png", vec![1, 2, 3], "cat").is_ok());
        assert!(UploadRequest::from_url("https://x/y.png", "cat").is_ok());
    }

    #[test]
    fn test_request_rejects_bad_inputs() {
        assert!(UploadRequest::from_file("cat.png", Vec::new(), "cat").is_err());
        assert!(UploadRequest::from_url("not a url", "cat").is_err());
        assert!(UploadRequest::from_url("https://x/y.png", "  ").is_err());
    }

    #[test]
    fn test_effective_title_defaults_to_alt_text() {
        let request = UploadRequest::from_url("https://x/y.png", "a").unwrap();
        assert_eq!(request.effective_title(), "a");

        let request = request.with_title("b");
        assert_eq!(request.effective_title(), "b");
    }

    #[test]
    fn test_parameters_use_asset_id_or_generate_one() {
        let request = UploadRequest::from_url("https://x/y.png", "a")
            .unwrap()
            .with_asset_id("slot-1");
        let params = CdnUploadParameters::with_timestamp(request, 100);
        assert_eq!(params.public_id, "slot-1");
        assert_eq!(params.timestamp, 100);
        assert_eq!(params.resource_type, "image");
        assert_eq!(params.upload_type, "upload");

        let request = UploadRequest::from_url("https://x/y.png", "a").unwrap();
        let first = CdnUploadParameters::new(request.clone());
        let second = CdnUploadParameters::new(request);
        assert!(Uuid::parse_str(&first.public_id).is_ok());
        assert_ne!(first.public_id, second.public_id);
    }

    #[test]
    fn test_signature_applies_once() {
        let request = UploadRequest::from_url("https://x/y.png", "a").unwrap();
        let mut params = CdnUploadParameters::new(request);
        assert!(!params.is_signed());

        params
            .apply_signature("sig".to_string(), "key".to_string())
            .unwrap();
        assert!(params.is_signed());

        let err = params
            .apply_signature("other".to_string(), "key2".to_string())
            .unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
        assert_eq!(params.signature(), Some("sig"));
        assert_eq!(params.api_key(), Some("key"));
    }

    #[test]
    fn test_fields_include_only_present_values() {
        let request = UploadRequest::from_url("https://x/y.png", "a")
            .unwrap()
            .with_tags(vec!["pets".to_string(), "cats".to_string()]);
        let params = CdnUploadParameters::with_timestamp(request, 5);
        let fields = params.fields();

        assert!(fields.contains(&("tags", "pets,cats".to_string())));
        assert!(fields.contains(&("timestamp", "5".to_string())));
        assert!(!fields.iter().any(|(name, _)| *name == "signature"));
        assert!(!fields.iter().any(|(name, _)| *name == "format"));
    }

    #[test]
    fn test_asset_from_upload() {
        let request = UploadRequest::from_file("cat.png", vec![1], "cat").unwrap();
        let mut result = cdn_result();
        result.folder = Some(String::new());

        let asset = Asset::from_upload(&result, &request);
        assert_eq!(asset.asset_id, "abc");
        assert_eq!(asset.title, "cat");
        assert_eq!(asset.alt_text, "cat");
        assert_eq!(asset.folder, None);
        assert!(!asset.is_persisted());
        assert_eq!(
            asset.delivery_url("demo"),
            "https://res.cloudinary.com/demo/image/upload/v1700000000/abc.png"
        );
    }

    #[test]
    fn test_asset_serialization_skips_persisted_flag() {
        let request = UploadRequest::from_url("https://x/y.png", "a").unwrap();
        let mut asset = Asset::from_upload(&cdn_result(), &request);
        asset.mark_persisted();

        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["asset_id"], "abc");
        assert!(json.get("persisted").is_none());
    }

    #[test]
    fn test_signature_response_accepts_both_key_spellings() {
        let camel: SignatureResponse =
            serde_json::from_str(r#"{"signature":"s","apiKey":"k"}"#).unwrap();
        let snake: SignatureResponse =
            serde_json::from_str(r#"{"signature":"s","api_key":"k"}"#).unwrap();
        assert_eq!(camel.api_key, "k");
        assert_eq!(snake.api_key, "k");
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let loaded = dotenvy::from_path("/definitely/not/here/.env");
        assert!(env_file_loaded(loaded).is_ok());
    }

    #[test]
    fn test_malformed_env_file_is_an_error() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "UPLOADER_TEST_BROKEN='unterminated").unwrap();

        let err = env_file_loaded(dotenvy::from_path(file.path())).unwrap_err();
        assert!(matches!(err, Error::EnvVar(_)));
    }
}
