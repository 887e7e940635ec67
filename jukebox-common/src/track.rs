//! Track metadata and play request types

use serde::{Deserialize, Serialize};

/// Resolved playable media metadata
///
/// Urls are treated as opaque playable resources; resolution from queries
/// happens in the media-resolution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub url: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_ms: Option<u64>,
}

impl Track {
    pub fn from_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            thumbnail: None,
            duration_ms: None,
        }
    }
}

/// What the caller wants played: a direct url or a free-text query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSelector {
    Url(String),
    Query(String),
}

/// A play request: selector plus any metadata the caller already has
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayRequest {
    pub selector: MediaSelector,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl PlayRequest {
    pub fn url(url: &str) -> Self {
        Self {
            selector: MediaSelector::Url(url.to_string()),
            title: None,
            thumbnail: None,
            duration_ms: None,
        }
    }

    pub fn query(query: &str) -> Self {
        Self {
            selector: MediaSelector::Query(query.to_string()),
            title: None,
            thumbnail: None,
            duration_ms: None,
        }
    }

    /// Build a track directly when the request already carries a url.
    /// Query-only requests have no direct track; they need resolution first.
    pub fn as_track(&self) -> Option<Track> {
        match &self.selector {
            MediaSelector::Url(url) => Some(Track {
                url: url.clone(),
                title: self.title.clone(),
                thumbnail: self.thumbnail.clone(),
                duration_ms: self.duration_ms,
            }),
            MediaSelector::Query(_) => None,
        }
    }
}
