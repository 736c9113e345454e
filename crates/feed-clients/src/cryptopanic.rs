use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use watch_core::{MonitorError, NewsItem, NewsSource};

pub const DEFAULT_CRYPTOPANIC_URL: &str = "https://cryptopanic.com/api/v1/posts/";

/// CryptoPanic posts client, filtered by currency codes.
#[derive(Clone)]
pub struct CryptoPanicClient {
    client: Client,
    url: String,
    auth_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    results: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: Option<String>,
    url: Option<String>,
}

impl CryptoPanicClient {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: crate::build_client(timeout),
            url: url.into(),
            auth_token: auth_token.into(),
        }
    }
}

#[async_trait]
impl NewsSource for CryptoPanicClient {
    async fn fetch_news(&self, asset_ids: &[String]) -> Result<Vec<NewsItem>, MonitorError> {
        if asset_ids.is_empty() {
            return Ok(Vec::new());
        }

        let currencies = asset_ids
            .iter()
            .map(|id| id.to_uppercase())
            .collect::<Vec<_>>()
            .join(",");

        let request = self.client.get(&self.url).query(&[
            ("auth_token", self.auth_token.as_str()),
            ("currencies", currencies.as_str()),
            ("kind", "news"),
        ]);

        let body = crate::fetch_body("CryptoPanic", request).await?;
        let items = parse_news(&body)?;
        tracing::debug!("CryptoPanic returned {} posts for {}", items.len(), currencies);
        Ok(items)
    }
}

/// Parse a posts body; posts missing a title or url are dropped.
pub fn parse_news(body: &str) -> Result<Vec<NewsItem>, MonitorError> {
    let response: PostsResponse = serde_json::from_str(body)
        .map_err(|e| MonitorError::MalformedResponse(format!("CryptoPanic: {}", e)))?;

    Ok(response
        .results
        .into_iter()
        .filter_map(|post| match (post.title, post.url) {
            (Some(title), Some(url)) if !url.is_empty() => Some(NewsItem { title, url }),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_news() {
        let body = r#"{
            "count": 2,
            "results": [
                {"kind": "news", "title": "Bitcoin breaks out", "url": "https://cryptopanic.com/news/1/"},
                {"kind": "news", "title": "Ether upgrade", "url": "https://cryptopanic.com/news/2/"}
            ]
        }"#;

        let items = parse_news(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Bitcoin breaks out");
        assert_eq!(items[1].url, "https://cryptopanic.com/news/2/");
    }

    #[test]
    fn test_missing_results_is_empty() {
        assert!(parse_news("{}").unwrap().is_empty());
        assert!(parse_news(r#"{"results": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_incomplete_posts_dropped() {
        let body = r#"{"results": [{"title": "No link"}, {"url": "https://x/"}, {"title": "ok", "url": "https://y/"}]}"#;
        let items = parse_news(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "ok");
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_news("<html>"),
            Err(MonitorError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_error_hides_auth_token() {
        // bind then drop to get a local port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = CryptoPanicClient::new(
            format!("http://127.0.0.1:{}/api/v1/posts/", port),
            "SECRET_TOKEN_123",
            Duration::from_secs(2),
        );
        let err = client.fetch_news(&["bitcoin".to_string()]).await.unwrap_err();

        assert!(matches!(err, MonitorError::TransientFetch(_)));
        let rendered = err.to_string();
        assert!(rendered.starts_with("Fetch failed: CryptoPanic"));
        assert!(!rendered.contains("SECRET_TOKEN_123"), "token leaked: {}", rendered);
        assert!(!rendered.contains("auth_token"), "query leaked: {}", rendered);
    }
}
