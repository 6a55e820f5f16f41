use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;
use crate::ports::{Embedder, GenerativeModel};
use crate::security::SecretValue;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

fn build_client(timeout: Duration) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ServiceError::Transport(format!("failed to build HTTP client: {err}")))
}

async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    api_key: &SecretValue,
    body: &B,
) -> Result<R, ServiceError> {
    let response = client
        .post(url)
        .header("x-goog-api-key", api_key.expose())
        .json(body)
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
    response
        .json::<R>()
        .await
        .map_err(|err| ServiceError::Malformed(err.to_string()))
}

/// Gemini `generateContent` adapter.
pub struct GeminiModel {
    client: Client,
    api_key: SecretValue,
    model: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(
        api_key: SecretValue,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, ServiceError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response: GenerateResponse = post_json(&self.client, &url, &self.api_key, &request).await?;

        let text = extract_text(response)?;
        debug!(model = %self.model, chars = text.len(), "gemini generation completed");
        Ok(text)
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, ServiceError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::Malformed("response contained no text".into()));
    }
    Ok(text)
}

/// Gemini `embedContent` adapter (defaults to `text-embedding-004`).
pub struct GeminiEmbedder {
    client: Client,
    api_key: SecretValue,
    model: String,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: SecretValue,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let request = EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
        };
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let response: EmbedResponse = post_json(&self.client, &url, &self.api_key, &request).await?;

        if response.embedding.values.is_empty() {
            return Err(ServiceError::Malformed("empty embedding".into()));
        }
        Ok(response.embedding.values)
    }
}
