//! Media resolution seam
//!
//! Search/favorites resolution lives outside this subsystem; the daemon
//! only needs something that turns a query or url into playable metadata.

use async_trait::async_trait;
use jukebox_common::{Error, Result, Track};

/// External media-resolution collaborator
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolve a free-text query or url into playable media metadata.
    /// Fails with `NotFound` or `Resolution`.
    async fn resolve(&self, input: &str) -> Result<Track>;
}

/// Fallback resolver used when no external resolver is wired in: passes
/// urls through untouched and rejects free-text queries.
pub struct PassthroughResolver;

#[async_trait]
impl MediaResolver for PassthroughResolver {
    async fn resolve(&self, input: &str) -> Result<Track> {
        if input.starts_with("http://") || input.starts_with("https://") {
            Ok(Track::from_url(input))
        } else {
            Err(Error::Resolution(format!(
                "no resolver configured for query: {}",
                input
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_accepts_urls() {
        let track = PassthroughResolver
            .resolve("http://media.local/a.mp3")
            .await
            .unwrap();
        assert_eq!(track.url, "http://media.local/a.mp3");
    }

    #[tokio::test]
    async fn test_passthrough_rejects_queries() {
        let err = PassthroughResolver.resolve("some song").await.unwrap_err();
        assert_eq!(err.code(), "resolution_error");
    }
}
