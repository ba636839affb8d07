//! Thumbnail lookup for new todos.
//!
//! New todos get a representative image found by searching their title. The
//! lookup is best effort: callers log failures and store the todo without an
//! image.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;

/// Errors that can occur while looking up an image.
#[derive(Error, Debug)]
pub enum ImageSearchError {
    /// The request could not be sent or its body could not be decoded.
    #[error("Image search request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("Image search returned status {0}")]
    Status(u16),
}

/// Finds an image URL for a free-text query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Returns the URL of the best matching image, or `None` when nothing matched.
    async fn find_image(&self, query: &str) -> Result<Option<String>, ImageSearchError>;
}

/// Image search backed by the Pexels photo API.
pub struct PexelsImageSearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PexelsSearchResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsPhotoSources,
}

#[derive(Debug, Deserialize)]
struct PexelsPhotoSources {
    medium: Option<String>,
}

impl PexelsSearchResponse {
    fn first_medium_url(self) -> Option<String> {
        self.photos
            .into_iter()
            .next()
            .and_then(|photo| photo.src.medium)
            .filter(|url| !url.is_empty())
    }
}

impl PexelsImageSearch {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageSearch for PexelsImageSearch {
    #[tracing::instrument(skip(self))]
    async fn find_image(&self, query: &str) -> Result<Option<String>, ImageSearchError> {
        let response = self
            .client
            .get(format!("{}/v1/search", self.base_url))
            .header("Authorization", &self.api_key)
            .query(&[("query", query), ("per_page", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImageSearchError::Status(response.status().as_u16()));
        }

        let body: PexelsSearchResponse = response.json().await?;
        Ok(body.first_medium_url())
    }
}

/// Image search used when no API key is configured; never finds anything.
pub struct DisabledImageSearch;

#[async_trait]
impl ImageSearch for DisabledImageSearch {
    async fn find_image(&self, _query: &str) -> Result<Option<String>, ImageSearchError> {
        Ok(None)
    }
}

/// Picks the image search implementation for the given configuration.
pub fn from_config(config: &Config) -> Box<dyn ImageSearch> {
    match &config.pexels_api_key {
        Some(api_key) if !api_key.is_empty() => Box::new(PexelsImageSearch::new(
            api_key.clone(),
            config.pexels_base_url.clone(),
        )),
        _ => {
            tracing::info!("No Pexels API key configured, image search disabled");
            Box::new(DisabledImageSearch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_pick_first_medium_image() {
        let body = r#"{
            "page": 1,
            "photos": [
                { "id": 1, "src": { "medium": "https://images.example/1-medium.jpg", "large": "x" } },
                { "id": 2, "src": { "medium": "https://images.example/2-medium.jpg" } }
            ]
        }"#;

        let response: PexelsSearchResponse = serde_json::from_str(body).unwrap();

        assert_eq!(
            response.first_medium_url().as_deref(),
            Some("https://images.example/1-medium.jpg")
        );
    }

    #[test]
    fn can_handle_search_without_photos() {
        let response: PexelsSearchResponse =
            serde_json::from_str(r#"{ "page": 1, "photos": [] }"#).unwrap();
        assert_eq!(response.first_medium_url(), None);

        let response: PexelsSearchResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(response.first_medium_url(), None);
    }

    #[tokio::test]
    async fn disabled_search_finds_nothing() {
        let search = DisabledImageSearch;

        assert_eq!(search.find_image("groceries").await.unwrap(), None);
    }

    #[tokio::test]
    async fn can_disable_search_with_empty_api_key() {
        let config = Config {
            db_url: String::new(),
            port: 8080,
            pexels_api_key: Some(String::new()),
            pexels_base_url: "https://api.pexels.com".to_string(),
        };

        let search = from_config(&config);

        assert_eq!(search.find_image("anything").await.unwrap(), None);
    }
}
