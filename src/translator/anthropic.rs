//! Anthropic Messages API transport
//!
//! # Implementation Notes
//! - HTTP goes through the [`HttpClient`] trait so tests inject canned responses
//! - One request per translation, no streaming, no retries
//! - The API key is read from settings at construction; a missing key fails
//!   the translation, not the process

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use super::{build_prompt, Mode, TranslationRequest, Translator};
use crate::config::settings::Settings;
use crate::error::{ParleyError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Status and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Trait for HTTP communication with the model service.
///
/// This abstraction allows injecting mock HTTP clients for testing without
/// making real network requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or the body cannot be read.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse>;
}

/// HTTP client implementation using reqwest.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| ParleyError::translation(format!("Request to model service failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ParleyError::translation(format!("Could not read model response: {e}")))?;

        Ok(HttpResponse { status, body })
    }
}

/// Translator backed by the Anthropic Messages API
pub struct AnthropicTranslator {
    http: Box<dyn HttpClient>,
    settings: Settings,
}

impl AnthropicTranslator {
    pub fn new(settings: Settings) -> Self {
        Self::with_client(settings, Box::new(ReqwestHttpClient::new()))
    }

    pub fn with_client(settings: Settings, http: Box<dyn HttpClient>) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl Translator for AnthropicTranslator {
    async fn complete(&self, request: &TranslationRequest, mode: Mode) -> Result<String> {
        let api_key = self.settings.api_key.as_deref().ok_or_else(|| {
            ParleyError::translation(
                "No Anthropic API key found. Set ANTHROPIC_API_KEY or add \"api_key\" to settings.json",
            )
        })?;

        let prompt = build_prompt(request, mode);
        let body = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        info!(model = %self.settings.model, %mode, "Sending translation request");
        debug!(%prompt, "Translation prompt");

        let headers = [
            ("x-api-key", api_key),
            ("content-type", "application/json"),
            ("anthropic-version", ANTHROPIC_VERSION),
        ];
        let response = self.http.post_json(&self.settings.api_url, &headers, &body).await?;

        if !(200..300).contains(&response.status) {
            return Err(ParleyError::translation(format!(
                "Model service returned HTTP {}: {}",
                response.status,
                response.body.trim()
            )));
        }

        extract_text(&response.body)
    }
}

/// Pull `content[0].text` out of a Messages API response
fn extract_text(body: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ParleyError::translation(format!("Model response is not JSON: {e}")))?;

    value
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|item| item.get("text"))
        .and_then(|text| text.as_str())
        .map(str::to_string)
        .ok_or_else(|| ParleyError::translation("Model response has no text content"))
}
