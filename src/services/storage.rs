use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use reqwest::StatusCode;

use crate::core::config::Settings;
use crate::services::content::ContentError;

#[derive(Debug, Clone)]
pub(crate) struct FetchedImage {
    pub(crate) bytes: Vec<u8>,
    pub(crate) mime_type: String,
}

/// Source of archived page images, addressed by bucket key or absolute URL.
#[async_trait]
pub(crate) trait ImageSource: Send + Sync {
    async fn fetch(&self, image_url: &str) -> Result<FetchedImage, ContentError>;
}

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if settings.s3().access_key.is_empty() || settings.s3().secret_key.is_empty() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "scriptorium-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.s3().endpoint.clone())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let client = Client::new(&config);

        Ok(Some(Self { client, bucket: settings.s3().bucket.clone() }))
    }

    pub(crate) async fn get_object(
        &self,
        key: &str,
    ) -> Result<(Vec<u8>, Option<String>), ContentError> {
        let output =
            self.client.get_object().bucket(&self.bucket).key(key).send().await.map_err(|err| {
                if err.as_service_error().is_some_and(|service| service.is_no_such_key()) {
                    ContentError::ImageNotFound(key.to_string())
                } else {
                    ContentError::Fetch { url: key.to_string(), message: err.to_string() }
                }
            })?;

        let content_type = output.content_type().map(ToString::to_string);
        let bytes = output.body.collect().await.map_err(|err| ContentError::Fetch {
            url: key.to_string(),
            message: err.to_string(),
        })?;

        Ok((bytes.into_bytes().to_vec(), content_type))
    }
}

/// Absolute `http(s)` URLs go through HTTP, everything else is a bucket key.
pub(crate) struct ArchiveImageSource {
    http: reqwest::Client,
    storage: Option<StorageService>,
}

impl ArchiveImageSource {
    pub(crate) fn new(storage: Option<StorageService>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build image HTTP client")?;

        Ok(Self { http, storage })
    }

    async fn fetch_url(&self, url: &str) -> Result<FetchedImage, ContentError> {
        let fetch_error =
            |err: reqwest::Error| ContentError::Fetch { url: url.to_string(), message: err.to_string() };

        let response = self.http.get(url).send().await.map_err(fetch_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ContentError::ImageNotFound(url.to_string()));
        }
        let response = response.error_for_status().map_err(fetch_error)?;

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let bytes = response.bytes().await.map_err(fetch_error)?;

        Ok(FetchedImage { bytes: bytes.to_vec(), mime_type: image_mime_type(url, header_type) })
    }
}

#[async_trait]
impl ImageSource for ArchiveImageSource {
    async fn fetch(&self, image_url: &str) -> Result<FetchedImage, ContentError> {
        if image_url.starts_with("http://") || image_url.starts_with("https://") {
            return self.fetch_url(image_url).await;
        }

        let Some(storage) = &self.storage else {
            return Err(ContentError::Fetch {
                url: image_url.to_string(),
                message: "object storage is not configured".to_string(),
            });
        };

        let key = image_url.trim_start_matches('/');
        let (bytes, content_type) = storage.get_object(key).await?;
        Ok(FetchedImage { bytes, mime_type: image_mime_type(key, content_type) })
    }
}

/// Prefers a concrete `image/*` content type, then the file extension.
pub(crate) fn image_mime_type(location: &str, content_type: Option<String>) -> String {
    if let Some(content_type) = content_type.filter(|value| value.starts_with("image/")) {
        return content_type;
    }

    let path = location.split(['?', '#']).next().unwrap_or(location);
    let extension = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match extension.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        _ => "image/jpeg",
    }
    .to_string()
}
