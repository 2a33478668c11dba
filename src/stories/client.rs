use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;
use url::Url;

use super::api_types::ApiEnvelope;
use super::types::Story;
use crate::error::{OfflineError, Result};
use crate::http::Request;
use crate::net::Fetcher;

/// The remote story API, as far as the sync layer needs it.
#[async_trait]
pub trait StoryApi: Send + Sync {
  /// `GET /stories`
  async fn list_stories(&self, token: &str) -> Result<Vec<Story>>;

  /// `GET /stories/:id`
  async fn get_story(&self, token: &str, id: &str) -> Result<Story>;
}

/// Story API client over the network collaborator.
#[derive(Clone)]
pub struct StoryClient {
  base_url: Url,
  fetcher: Arc<dyn Fetcher>,
}

impl StoryClient {
  pub fn new(base_url: Url, fetcher: Arc<dyn Fetcher>) -> Self {
    Self { base_url, fetcher }
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    let base = self.base_url.as_str().trim_end_matches('/');
    Url::parse(&format!("{}/{}", base, path.trim_start_matches('/')))
      .map_err(|e| OfflineError::MalformedResponse(format!("bad endpoint {}: {}", path, e)))
  }

  async fn get(&self, token: &str, path: &str) -> Result<ApiEnvelope> {
    if token.is_empty() {
      return Err(OfflineError::Unauthenticated);
    }

    let request =
      Request::get(self.endpoint(path)?).with_header("Authorization", format!("Bearer {}", token));
    let response = self.fetcher.fetch(&request).await?;

    ApiEnvelope::parse(response.status, &response.body).inspect_err(|e| {
      error!(path, error = %e, "story api request failed");
    })
  }
}

#[async_trait]
impl StoryApi for StoryClient {
  async fn list_stories(&self, token: &str) -> Result<Vec<Story>> {
    self.get(token, "stories").await?.into_list()
  }

  async fn get_story(&self, token: &str, id: &str) -> Result<Story> {
    if id.is_empty() {
      return Err(OfflineError::NotFound("story id is empty".to_string()));
    }
    self.get(token, &format!("stories/{}", id)).await?.into_story()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Response;
  use crate::testing::FakeFetcher;

  fn client(fetcher: Arc<FakeFetcher>) -> StoryClient {
    StoryClient::new(Url::parse("https://api.example/v1").unwrap(), fetcher)
  }

  #[tokio::test]
  async fn test_get_story_sends_bearer_token() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.respond(
      "https://api.example/v1/stories/s1",
      Response::new(
        200,
        r#"{"error":false,"message":"ok","story":{"id":"s1","name":"Ana","createdAt":"2024-05-01T10:00:00Z"}}"#,
      ),
    );

    let story = client(fetcher.clone()).get_story("tok", "s1").await.unwrap();
    assert_eq!(story.id, "s1");

    let seen = fetcher.requests();
    assert_eq!(seen.len(), 1);
    assert!(seen[0]
      .headers
      .contains(&("Authorization".to_string(), "Bearer tok".to_string())));
  }

  #[tokio::test]
  async fn test_api_error_flag_surfaces() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.respond(
      "https://api.example/v1/stories/gone",
      Response::new(404, r#"{"error":true,"message":"Story not found"}"#),
    );

    let err = client(fetcher).get_story("tok", "gone").await.unwrap_err();
    assert!(matches!(err, OfflineError::Api { status: 404, .. }));
  }

  #[tokio::test]
  async fn test_missing_token_never_hits_network() {
    let fetcher = Arc::new(FakeFetcher::new());
    let err = client(fetcher.clone()).list_stories("").await.unwrap_err();
    assert_eq!(err, OfflineError::Unauthenticated);
    assert!(fetcher.requests().is_empty());
  }
}
