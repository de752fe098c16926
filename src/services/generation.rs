use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::images;

/// External capability that turns a prompt (and optional reference image)
/// into generated images.
///
/// Implementations return each image as a `data:` URL. Retries, if any,
/// belong to the implementation; the worker calls `generate` once per job.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        input_image: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Client for the Gemini image generation API.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineDataRef<'a> },
}

#[derive(Serialize)]
struct InlineDataRef<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 2],
}

#[derive(Deserialize)]
struct GenerateContentResponse {
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
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// One generateContent round trip. The model may return several image
    /// parts; all of them are kept.
    async fn generate_once(
        &self,
        prompt: &str,
        input_image: Option<(&str, &'static str)>,
    ) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let mut parts = vec![RequestPart::Text { text: prompt }];
        if let Some((data, mime_type)) = input_image {
            parts.push(RequestPart::Image {
                inline_data: InlineDataRef { mime_type, data },
            });
        }

        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("Generation provider returned HTTP {}", status));
            return Err(ProviderError::Rejected {
                status: Some(status.as_u16()),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(ProviderError::Http)?;

        Ok(parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.inline_data)
            .filter(|d| d.mime_type.starts_with("image/"))
            .map(|d| images::to_data_url(&d.mime_type, &d.data))
            .collect())
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        input_image: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, ProviderError> {
        let reference = match input_image {
            Some(encoded) => {
                let image = images::decode_reference_image(encoded)
                    .map_err(|e| ProviderError::InvalidInput(e.to_string()))?;
                Some(image)
            }
            None => None,
        };
        let reference = reference.as_ref().map(|r| (r.base64.as_str(), r.mime_type));

        let mut results = Vec::with_capacity(count);
        for _ in 0..count {
            let mut batch = self.generate_once(prompt, reference).await?;
            results.append(&mut batch);
            if results.len() >= count {
                break;
            }
        }

        results.truncate(count);
        tracing::debug!(model = %self.model, images = results.len(), "Gemini generation finished");
        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider refused the request; `message` is its own error text.
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },

    #[error("Invalid generation input: {0}")]
    InvalidInput(String),
}
