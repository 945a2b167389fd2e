use crate::ai::repair::extract_json;
use crate::core::AiSettings;
use crate::utils::error::{InsightError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_ERROR_BODY: usize = 300;

/// 生成式語言 API 的 generateContent 端點
pub struct GenAiClient {
    client: Client,
    settings: AiSettings,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenAiClient {
    pub fn new(settings: AiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }

    /// 送出提示並取回 JSON 回應
    pub async fn generate_json(&self, flow: &str, prompt: &str, temperature: f64) -> Result<Value> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "responseMimeType": "application/json"
            }
        });

        tracing::debug!("🤖 {}: POST {}", flow, self.url());
        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, &self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("🤖 {}: response status {}", flow, status);

        if !status.is_success() {
            let mut detail = response.text().await.unwrap_or_default();
            if detail.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| detail.is_char_boundary(*i))
                    .unwrap_or(0);
                detail.truncate(cut);
            }
            return Err(InsightError::AiError {
                flow: flow.to_string(),
                message: format!("request failed with status {}: {}", status, detail.trim()),
            });
        }

        let reply: GenerateContentResponse = response.json().await?;
        let text: String = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(InsightError::AiResponseError {
                flow: flow.to_string(),
                message: "the model returned no text".to_string(),
            });
        }

        extract_json(&text).ok_or_else(|| InsightError::AiResponseError {
            flow: flow.to_string(),
            message: "the model reply did not contain JSON".to_string(),
        })
    }
}
