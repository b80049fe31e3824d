//! Gemini API プロバイダ
//!
//! generateContent をJSONモード（temperature 0.1）で呼び、
//! `candidates[0].content.parts[0].text` を応答として取り出す。

use super::{complete_dish, complete_ingredients, AnalysisProvider, DishQuery, TextCompletion};
use crate::error::{Result, ScoutError};
use allergen_scout_common::{DishAnalysis, IngredientAnalysis};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const TEMPERATURE: f64 = 0.1;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// 接続先を差し替える（プロキシ・ローカルモック用）
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

fn request_body(prompt: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "responseMimeType": "application/json"
        }
    })
}

/// レスポンス本体から生成テキストを取り出す
fn response_text(payload: &Value) -> Result<String> {
    payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ScoutError::ApiParse("candidates にテキストがありません".into()))
}

#[async_trait]
impl TextCompletion for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Gemini API 呼び出し");

        let response = self
            .client
            .post(self.url())
            .json(&request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(ScoutError::ApiCall(format!("HTTP {}: {}", status, preview)));
        }

        let payload: Value = response.json().await?;
        response_text(&payload)
    }
}

#[async_trait]
impl AnalysisProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini-api"
    }

    async fn analyze_dish(&self, query: &DishQuery) -> Result<DishAnalysis> {
        complete_dish(self, query).await
    }

    async fn analyze_ingredients(&self, ingredients: &[String]) -> Result<IngredientAnalysis> {
        complete_ingredients(self, ingredients).await
    }
}
