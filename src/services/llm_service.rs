use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::config::LlmConfig;
use crate::models::ColumnInfo;

/// A language model that answers a prompt with text
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;

    fn model(&self) -> &str;
}

/// Client for an OpenAI-compatible chat completion API
pub struct OpenAiClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    http_client: HttpClient,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            model: config.model.clone(),
            http_client: HttpClient::new(),
        }
    }
}

#[async_trait]
impl SqlGenerator for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Translation("LLM API key is not configured.".to_string()))?;

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": 0.1,
            }))
            .send()
            .await
            .map_err(|e| AppError::Translation(format!("Failed to call LLM service: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Translation(format!(
                "LLM service returned error {}: {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Translation(format!("Failed to parse LLM response: {}", e)))?;

        result["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Translation("LLM response does not contain a message".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Translates natural language questions about one table into DuckDB SQL
pub struct LlmService {
    generator: Arc<dyn SqlGenerator>,
    timeout: Duration,
}

impl LlmService {
    pub fn new(generator: Arc<dyn SqlGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(Arc::new(OpenAiClient::new(config)), config.timeout())
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub fn build_prompt(table: &str, columns: &[ColumnInfo], question: &str) -> String {
        let column_list = if columns.is_empty() {
            "  (unknown)\n".to_string()
        } else {
            columns
                .iter()
                .map(|c| format!("  - {} ({})\n", c.name, c.data_type))
                .collect()
        };

        format!(
            r#"You are a SQL expert working with DuckDB. Write one SQL query that answers the question below.

Table name: {table}
Columns:
{column_list}
Question: {question}

Instructions:
1. Return exactly one DuckDB SELECT statement and nothing else
2. Do not include any explanations, comments or markdown formatting
3. Query only the table named above
4. Use the column names exactly as listed; quote them with double quotes if they contain spaces or capitals
5. Keep column headings exactly as given unless the question asks for a computed value

SQL Query:"#
        )
    }

    /// Strip a surrounding Markdown code fence and one trailing semicolon
    pub fn clean_sql(raw: &str) -> String {
        let mut sql = raw.trim();

        if let Some(rest) = sql.strip_prefix("```") {
            // The opening fence may carry a language tag such as ```sql
            let body = match rest.split_once('\n') {
                Some((tag, body)) if !tag.trim().contains(char::is_whitespace) => body,
                _ => rest,
            };
            sql = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
        }

        sql.strip_suffix(';').unwrap_or(sql).trim_end().to_string()
    }

    /// Ask the model for a query answering `question` about `table`
    pub async fn translate(
        &self,
        table: &str,
        columns: &[ColumnInfo],
        question: &str,
    ) -> Result<String, AppError> {
        let prompt = Self::build_prompt(table, columns, question);
        tracing::debug!(model = self.model(), "LLM prompt:\n{}", prompt);

        let raw = self.complete_with_timeout(&prompt).await?;
        let sql = Self::clean_sql(&raw);
        if sql.is_empty() {
            return Err(AppError::Translation("Failed to generate SQL query.".to_string()));
        }

        tracing::debug!(table, "Generated SQL: {}", sql);
        Ok(sql)
    }

    /// Trivial completion proving the model is reachable
    pub async fn ping(&self) -> Result<String, AppError> {
        let reply = self
            .complete_with_timeout("Reply with the single word: pong")
            .await?;
        Ok(reply.trim().to_string())
    }

    async fn complete_with_timeout(&self, prompt: &str) -> Result<String, AppError> {
        tokio::time::timeout(self.timeout, self.generator.complete(prompt))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "The language model did not answer within {} seconds.",
                    self.timeout.as_secs()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::StubGenerator;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;

    fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo {
                name: "Region".to_string(),
                data_type: "VARCHAR".to_string(),
            },
            ColumnInfo {
                name: "Sales".to_string(),
                data_type: "BIGINT".to_string(),
            },
        ]
    }

    #[test]
    fn test_prompt_names_table_columns_and_question() {
        let prompt = LlmService::build_prompt("uploaded_data_42", &columns(), "total Sales by Region");
        assert!(prompt.contains("Table name: uploaded_data_42\n"));
        assert!(prompt.contains("  - Region (VARCHAR)"));
        assert!(prompt.contains("  - Sales (BIGINT)"));
        assert!(prompt.contains("Question: total Sales by Region"));
    }

    #[test]
    fn test_clean_sql() {
        assert_eq!(LlmService::clean_sql("  SELECT 1  "), "SELECT 1");
        assert_eq!(LlmService::clean_sql("SELECT 1;"), "SELECT 1");
        assert_eq!(LlmService::clean_sql("```sql\nSELECT 1;\n```"), "SELECT 1");
        assert_eq!(LlmService::clean_sql("```\nSELECT *\nFROM t\n```\n"), "SELECT *\nFROM t");
        assert_eq!(LlmService::clean_sql("```SELECT 1```"), "SELECT 1");
        assert_eq!(LlmService::clean_sql("```sql\n```"), "");
    }

    #[tokio::test]
    async fn test_translate_cleans_model_output() {
        let stub = Arc::new(StubGenerator::new(|_| Ok("```sql\nSELECT 1;\n```".to_string())));
        let service = LlmService::new(stub.clone(), Duration::from_secs(5));

        let sql = service.translate("t", &columns(), "anything").await.unwrap();
        assert_eq!(sql, "SELECT 1");
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_completion_is_translation_error() {
        let stub = Arc::new(StubGenerator::new(|_| Ok("   ".to_string())));
        let service = LlmService::new(stub, Duration::from_secs(5));

        let err = service.translate("t", &[], "anything").await.unwrap_err();
        assert!(matches!(err, AppError::Translation(_)));
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let stub = Arc::new(StubGenerator::with_delay(Duration::from_secs(5), |_| Ok("SELECT 1".to_string())));
        let service = LlmService::new(stub, Duration::from_millis(50));

        let err = service.translate("t", &[], "anything").await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let config = LlmConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 5,
        };
        let err = OpenAiClient::new(&config).complete("hi").await.unwrap_err();
        match err {
            AppError::Translation(msg) => assert!(msg.contains("not configured")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    async fn chat_completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        let content = if prompt.contains("pong") {
            "pong".to_string()
        } else {
            format!("```sql\nSELECT '{}' AS model;\n```", body["model"].as_str().unwrap_or_default())
        };
        (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]})),
        )
    }

    async fn spawn_fake_api() -> String {
        let app = Router::new().route("/v1/chat/completions", post(chat_completions));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn config_for(api_url: String, api_key: &str) -> LlmConfig {
        LlmConfig {
            api_url,
            api_key: Some(api_key.to_string()),
            model: "test-model".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_openai_client_against_local_api() {
        let api_url = spawn_fake_api().await;
        let service = LlmService::from_config(&config_for(api_url, "test-key"));

        let sql = service.translate("t", &columns(), "which model?").await.unwrap();
        assert_eq!(sql, "SELECT 'test-model' AS model");
        assert_eq!(service.ping().await.unwrap(), "pong");
        assert_eq!(service.model(), "test-model");
    }

    #[tokio::test]
    async fn test_openai_client_reports_http_errors() {
        let api_url = spawn_fake_api().await;
        let service = LlmService::from_config(&config_for(api_url, "wrong-key"));

        let err = service.translate("t", &columns(), "anything").await.unwrap_err();
        match err {
            AppError::Translation(msg) => assert!(msg.contains("401")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
