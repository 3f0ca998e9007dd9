use anyhow::{Context, Result};
use clap::Parser;
use image_asset_uploader::models::{Config, UploadRequest};
use image_asset_uploader::uploader::Uploader;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-asset-uploader")]
#[command(about = "Upload an image to the CDN and register it with the backend")]
struct CliArgs {
    /// Local image file, or an http(s) URL for the CDN to fetch.
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Alternative text describing the image.
    #[arg(long)]
    alt_text: String,

    /// Title to store; defaults to the alt text.
    #[arg(long)]
    title: Option<String>,

    /// Stable asset id to upload into; a new id is generated when omitted.
    #[arg(long)]
    asset_id: Option<String>,

    /// Tag to attach on the CDN. Repeatable.
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Incoming transformation applied by the CDN, e.g. `c_limit,w_2048`.
    #[arg(long)]
    transformation: Option<String>,
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn build_request(args: CliArgs) -> Result<UploadRequest> {
    let mut request = if is_remote(&args.source) {
        UploadRequest::from_url(args.source, args.alt_text)?
    } else {
        let path = Path::new(&args.source);
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();
        UploadRequest::from_file(file_name, data, args.alt_text)?
    };

    if let Some(title) = args.title {
        request = request.with_title(title);
    }
    if let Some(asset_id) = args.asset_id {
        request = request.with_asset_id(asset_id);
    }
    if let Some(transformation) = args.transformation {
        request = request.with_transformation(transformation);
    }
    Ok(request.with_tags(args.tags))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_asset_uploader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let uploader = Uploader::from_config(&config)?;
    let request = build_request(args).await?;

    let mut handle = uploader.upload(request);
    while let Some(event) = handle.next_event().await {
        info!("{}", event.message);
    }

    match handle.finish().await {
        Ok(asset) => {
            info!("Upload completed successfully");
            println!("{}", serde_json::to_string_pretty(&asset)?);
            println!("{}", asset.delivery_url(&config.cloud_name));
            Ok(())
        }
        Err(e) => {
            error!("Upload failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_asset_uploader::models::UploadSource;
    use std::io::Write;

    fn args(source: &str) -> CliArgs {
        CliArgs::parse_from([
            "image-asset-uploader",
            source,
            "--alt-text",
            "cat",
            "--tag",
            "pets",
            "--tag",
            "cats",
        ])
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://x/y.png"));
        assert!(is_remote("http://x/y.png"));
        assert!(!is_remote("./cat.png"));
    }

    #[tokio::test]
    async fn test_build_request_from_url() {
        let request = build_request(args("https://x/y.png")).await.unwrap();
        assert!(matches!(request.source, UploadSource::Url(ref url) if url == "https://x/y.png"));
        assert_eq!(request.tags, vec!["pets".to_string(), "cats".to_string()]);
        assert_eq!(request.effective_title(), "cat");
    }

    #[tokio::test]
    async fn test_build_request_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x89, 0x50, 0x4E, 0x47]).unwrap();
        let source = file.path().to_string_lossy().to_string();

        let request = build_request(args(&source)).await.unwrap();
        match request.source {
            UploadSource::File(file) => assert_eq!(file.data.len(), 4),
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_build_request_missing_file() {
        assert!(build_request(args("/definitely/not/here.png")).await.is_err());
    }
}
