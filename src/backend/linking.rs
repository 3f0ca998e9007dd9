use super::client::BackendHttpClient;
use super::LinkingService;
use crate::models::{Asset, CdnUploadParameters, CdnUploadResult};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{info, warn};

pub fn asset_path(asset_id: &str) -> String {
    format!("/images/{}", urlencoding::encode(asset_id))
}

pub struct LinkingClient {
    http: BackendHttpClient,
}

impl LinkingClient {
    pub fn new(http: BackendHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl LinkingService for LinkingClient {
    async fn link(
        &self,
        params: &CdnUploadParameters,
        result: &CdnUploadResult,
        progress: &ProgressSender,
    ) -> Result<Asset> {
        if result.public_id != params.public_id {
            warn!(
                "CDN stored asset as '{}' but '{}' was requested",
                result.public_id, params.public_id
            );
        }

        let mut asset = Asset::from_upload(result, &params.request);

        progress.emit(ProgressEvent::linking());

        // PUT is an upsert keyed by asset id, so repeating it is harmless.
        self.http
            .put_json(&asset_path(&asset.asset_id), &asset, Error::Linking)
            .await?;

        asset.mark_persisted();
        info!("Linked asset {} (version {})", asset.asset_id, asset.version);
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadRequest;
    use crate::progress::{self, ProgressPhase};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cdn_result(public_id: &str) -> CdnUploadResult {
        CdnUploadResult {
            public_id: public_id.to_string(),
            version: 1_712_345_678,
            format: "jpg".to_string(),
            folder: None,
            width: None,
            height: None,
            bytes: None,
            secure_url: None,
        }
    }

    fn client(uri: String) -> LinkingClient {
        LinkingClient::new(BackendHttpClient::new(uri, None, Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_asset_path_encodes_id() {
        assert_eq!(asset_path("abc"), "/images/abc");
        assert_eq!(asset_path("team/cat"), "/images/team%2Fcat");
    }

    #[tokio::test]
    async fn test_link_puts_asset_and_defaults_title() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/images/img-1"))
            .and(body_json(serde_json::json!({
                "asset_id": "img-1",
                "version": 1_712_345_678,
                "folder": null,
                "format": "jpg",
                "alt_text": "cat",
                "title": "cat"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let request = UploadRequest::from_file("cat.jpg", vec![1], "cat")
            .unwrap()
            .with_asset_id("img-1");
        let params = CdnUploadParameters::new(request);
        let (tx, rx) = progress::channel();

        let asset = client(server.uri())
            .link(&params, &cdn_result("img-1"), &tx)
            .await
            .unwrap();
        drop(tx);

        assert!(asset.is_persisted());
        assert_eq!(asset.title, "cat");
        assert_eq!(asset.format, "jpg");

        let events = rx.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, ProgressPhase::LinkingInProgress);
    }

    #[tokio::test]
    async fn test_link_twice_is_idempotent() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/images/img-2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let request = UploadRequest::from_url("https://x/y.png", "a")
            .unwrap()
            .with_title("b")
            .with_asset_id("img-2");
        let params = CdnUploadParameters::new(request);
        let client = client(server.uri());
        let progress = ProgressSender::disconnected();

        let first = client
            .link(&params, &cdn_result("img-2"), &progress)
            .await
            .unwrap();
        let second = client
            .link(&params, &cdn_result("img-2"), &progress)
            .await
            .unwrap();
        assert_eq!(first, second);

        let bodies: Vec<serde_json::Value> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect();
        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[0]["title"], "b");
    }

    #[tokio::test]
    async fn test_link_failure_returns_no_asset() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/images/img-3"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let request = UploadRequest::from_url("https://x/y.png", "a")
            .unwrap()
            .with_asset_id("img-3");
        let params = CdnUploadParameters::new(request);

        let err = client(server.uri())
            .link(&params, &cdn_result("img-3"), &ProgressSender::disconnected())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Linking(_)));
    }
}
