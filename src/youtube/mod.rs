use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

pub mod model;

pub use model::{Page, RawItem};

const USER_AGENT: &str = "youtube-watcher/0.1";

/// A paginated collection exposed by the YouTube Data API, with its filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Membership of a playlist (`playlistItems?playlistId=`).
    PlaylistItems { playlist_id: String },
    /// Full snippet and statistics for one video (`videos?id=`).
    Videos { video_id: String },
}

impl Resource {
    pub fn playlist_items(playlist_id: impl Into<String>) -> Self {
        Resource::PlaylistItems {
            playlist_id: playlist_id.into(),
        }
    }

    pub fn videos(video_id: impl Into<String>) -> Self {
        Resource::Videos {
            video_id: video_id.into(),
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            Resource::PlaylistItems { .. } => "playlistItems",
            Resource::Videos { .. } => "videos",
        }
    }

    fn part(&self) -> &'static str {
        match self {
            Resource::PlaylistItems { .. } => "contentDetails",
            Resource::Videos { .. } => "snippet,statistics",
        }
    }

    fn filter(&self) -> (&'static str, &str) {
        match self {
            Resource::PlaylistItems { playlist_id } => ("playlistId", playlist_id),
            Resource::Videos { video_id } => ("id", video_id),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (key, value) = self.filter();
        write!(f, "{}({}={})", self.endpoint(), key, value)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {resource} failed: {source}")]
    Network {
        resource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{resource} returned HTTP {status}: {body}")]
    Status {
        resource: String,
        status: u16,
        body: String,
    },
    #[error("invalid page JSON from {resource}: {source}")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One HTTP round trip: fetch the page of `resource` that starts at `cursor`.
///
/// `cursor == None` requests the first page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, resource: &Resource, cursor: Option<&str>) -> Result<Page, FetchError>;
}

#[derive(Clone)]
pub struct YoutubeClient {
    http: Client,
    base_url: Url,
    api_key: String,
    page_size: u32,
}

impl fmt::Debug for YoutubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YoutubeClient")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl YoutubeClient {
    pub fn new(
        api_key: String,
        mut base_url: Url,
        page_size: u32,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        // Url::join drops the last path segment unless it ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            page_size,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.youtube.base_url)?;
        Ok(Self::new(
            cfg.youtube.api_key.clone(),
            base_url,
            cfg.youtube.page_size,
            cfg.youtube.request_timeout(),
        )?)
    }

    pub fn build_request(
        &self,
        resource: &Resource,
        cursor: Option<&str>,
    ) -> anyhow::Result<reqwest::Request> {
        let url = self
            .base_url
            .join(resource.endpoint())
            .context("invalid YouTube base URL")?;
        let (filter_key, filter_value) = resource.filter();
        let mut query: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone()),
            (filter_key, filter_value.to_string()),
            ("part", resource.part().to_string()),
        ];
        if matches!(resource, Resource::PlaylistItems { .. }) {
            query.push(("maxResults", self.page_size.to_string()));
        }
        if let Some(token) = cursor {
            query.push(("pageToken", token.to_string()));
        }
        self.http
            .get(url)
            .query(&query)
            .build()
            .context("failed to build YouTube request")
    }
}

#[async_trait]
impl PageFetcher for YoutubeClient {
    async fn fetch_page(&self, resource: &Resource, cursor: Option<&str>) -> Result<Page, FetchError> {
        let network = |err: reqwest::Error| FetchError::Network {
            resource: resource.to_string(),
            source: Box::new(err),
        };

        let request = self
            .build_request(resource, cursor)
            .map_err(|err| FetchError::Network {
                resource: resource.to_string(),
                source: err.into(),
            })?;
        let res = self.http.execute(request).await.map_err(network)?;

        let status = res.status();
        let body = if status.is_success() {
            res.text().await.map_err(network)?
        } else {
            res.text().await.unwrap_or_default()
        };
        debug!(%resource, cursor, status = status.as_u16(), payload = %body, "got page");
        parse_page(resource, status, &body)
    }
}

/// Turn one HTTP response into a [`Page`], or the error it stands for.
fn parse_page(resource: &Resource, status: StatusCode, body: &str) -> Result<Page, FetchError> {
    if !status.is_success() {
        return Err(FetchError::Status {
            resource: resource.to_string(),
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    serde_json::from_str(body).map_err(|source| FetchError::Decode {
        resource: resource.to_string(),
        source,
    })
}
