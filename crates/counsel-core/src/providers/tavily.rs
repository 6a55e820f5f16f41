use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::ports::{SearchHit, WebSearch};
use crate::security::SecretValue;

pub const TAVILY_API_BASE: &str = "https://api.tavily.com";

#[derive(Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    topic: &'a str,
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default = "not_available")]
    title: String,
    #[serde(default = "not_available")]
    url: String,
    #[serde(default = "not_available")]
    content: String,
}

fn not_available() -> String {
    "N/A".to_string()
}

/// Tavily web search adapter.
pub struct TavilySearch {
    client: Client,
    api_key: SecretValue,
    base_url: String,
}

impl TavilySearch {
    pub fn new(api_key: SecretValue, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: TAVILY_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: &str,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let request = TavilySearchRequest {
            query,
            max_results,
            search_depth: depth,
            topic: "general",
            include_answer: true,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TavilySearchResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Malformed(err.to_string()))?;
        Ok(parsed
            .results
            .into_iter()
            .map(|result| SearchHit {
                title: result.title,
                url: result.url,
                content: result.content,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_maps_results_and_defaults_missing_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_header("authorization", "Bearer tvly-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "query": "legal deposit law judgment precedent",
                "max_results": 5,
                "search_depth": "basic",
                "topic": "general",
                "include_answer": true,
                "include_raw_content": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"answer":"...","results":[{"title":"Deposit Act","url":"https://law.example/d","content":"Caps deposits.","score":0.9},{"url":"https://law.example/x"}]}"#,
            )
            .create_async()
            .await;

        let search = TavilySearch::new(SecretValue::new("tvly-test"), Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.url());
        let hits = search
            .search("legal deposit law judgment precedent", 5, "basic")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Deposit Act");
        assert_eq!(hits[1].title, "N/A");
        assert_eq!(hits[1].content, "N/A");
    }

    #[tokio::test]
    async fn server_errors_surface_as_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let search = TavilySearch::new(SecretValue::new("k"), Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.url());

        assert!(matches!(
            search.search("q", 5, "basic").await,
            Err(ServiceError::Http { status: 500, .. })
        ));
    }
}
