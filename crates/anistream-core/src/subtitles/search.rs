//! External subtitle search client
//!
//! Talks to the subtitle search service:
//! - `POST {base}/subtitles/search` ranks candidates across providers
//! - `POST {base}/subtitles/download` resolves a candidate to a fetchable URL

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub title: String,
    pub episode_number: u32,
    /// Languages to search for; empty means all
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_language: Option<String>,
}

impl SearchRequest {
    pub fn new(title: impl Into<String>, episode_number: u32) -> Self {
        Self {
            title: title.into(),
            episode_number,
            ..Default::default()
        }
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter_language(mut self, language: impl Into<String>) -> Self {
        self.filter_language = Some(language.into());
        self
    }
}

/// One ranked candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubtitleSearchResult {
    pub id: String,
    pub language: String,
    /// Provider name
    pub source: String,
    pub match_score: f64,
    pub download_count: u64,
    pub rating: f64,
    pub is_trusted: bool,
    pub is_ai_translated: bool,
    pub release: Option<String>,
}

/// Search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResponse {
    pub results: Vec<SubtitleSearchResult>,
    pub available_languages: Vec<String>,
    /// Result count per provider
    pub source_stats: HashMap<String, u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequest<'a> {
    id: &'a str,
    source: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResponse {
    download_url: String,
}

/// External subtitle search capability
#[async_trait]
pub trait SubtitleSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;

    /// Resolve a candidate to a download URL
    async fn resolve(&self, result: &SubtitleSearchResult) -> Result<String>;
}

/// HTTP client for the search service
pub struct HttpSubtitleSearch {
    base_url: Url,
    client: Client,
}

impl HttpSubtitleSearch {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: with_trailing_slash(base_url),
            client,
        })
    }

    /// Create with a base URL string (for testing)
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: with_trailing_slash(&Url::parse(base_url)?),
            client: Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl SubtitleSearch for HttpSubtitleSearch {
    #[instrument(skip(self), fields(title = %request.title, episode = request.episode_number))]
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let response = self
            .client
            .post(self.endpoint("subtitles/search")?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::SubtitleSearch(format!(
                "search service returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::SubtitleSearch(format!("malformed search response: {}", e)))?;

        debug!(
            results = body.results.len(),
            languages = body.available_languages.len(),
            "Subtitle search complete"
        );
        Ok(body)
    }

    #[instrument(skip(self), fields(id = %result.id, source = %result.source))]
    async fn resolve(&self, result: &SubtitleSearchResult) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("subtitles/download")?)
            .json(&DownloadRequest {
                id: &result.id,
                source: &result.source,
                language: &result.language,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::SubtitleSearch(format!(
                "download resolution returned {}",
                response.status()
            )));
        }

        let body: DownloadResponse = response
            .json()
            .await
            .map_err(|e| Error::SubtitleSearch(format!("malformed download response: {}", e)))?;
        Ok(body.download_url)
    }
}
