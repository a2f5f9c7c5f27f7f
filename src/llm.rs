//! LLM collaborators - query planning, query repair and narration
//!
//! The retry loop and the CLI only see the traits; `LlmClient` implements
//! all three over an OpenAI-compatible chat-completions API.

use crate::error::LlmError;
use crate::execution_loop::{clean_repair_output, DraftOutcome, QueryDraft, RepairContext, GRAMMAR_RULES};
use crate::ingestion::ColumnProfile;
use crate::value::Row;
use async_trait::async_trait;
use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Result rows per draft shown to the narrator.
const NARRATE_ROW_CAP: usize = 20;

/// Turns a failed query plus its context into one corrected query text.
#[async_trait]
pub trait QueryRepairer: Send + Sync {
    async fn repair(&self, context: &RepairContext) -> Result<String, LlmError>;

    /// Checked once before a batch starts.
    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

/// Writes a plain-language answer from finished draft outcomes.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, question: &str, outcomes: &[DraftOutcome]) -> Result<String, LlmError>;
}

/// Produces query drafts for a natural-language question.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    async fn plan(
        &self,
        question: &str,
        columns: &[ColumnProfile],
        sample_rows: &[Row],
    ) -> Result<Vec<QueryDraft>, LlmError>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(LlmConfig::from_env())
    }

    fn api_key(&self) -> Result<&str, LlmError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY is not set".to_string()))
    }

    async fn call_llm(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let api_key = self.api_key()?;
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 1000
        });

        debug!(model = %self.config.model, "calling chat completions");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Parse("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlannedDrafts {
    List(Vec<QueryDraft>),
    Wrapped { queries: Vec<QueryDraft> },
}

/// Reads planner output: a JSON array of drafts, or `{"queries": [...]}`,
/// optionally inside a markdown fence.
pub fn parse_drafts(raw: &str) -> Result<Vec<QueryDraft>, LlmError> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start_matches("json");
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    }
    let planned: PlannedDrafts =
        serde_json::from_str(text.trim()).map_err(|e| LlmError::Parse(format!("invalid draft list: {}", e)))?;
    let drafts = match planned {
        PlannedDrafts::List(drafts) => drafts,
        PlannedDrafts::Wrapped { queries } => queries,
    };
    if drafts.is_empty() {
        return Err(LlmError::Parse("planner returned no queries".to_string()));
    }
    Ok(drafts)
}

fn schema_summary(columns: &[ColumnProfile]) -> String {
    columns
        .iter()
        .map(|c| format!("- {} ({}, {} distinct, {} null)", c.name, c.column_type, c.cardinality, c.null_count))
        .join("\n")
}

#[async_trait]
impl QueryRepairer for LlmClient {
    async fn repair(&self, context: &RepairContext) -> Result<String, LlmError> {
        info!(attempt = context.attempt, "requesting query repair");
        let raw = self
            .call_llm(
                "You repair queries for a single-table query language. Reply with one query and nothing else.",
                &context.to_prompt(),
            )
            .await?;
        Ok(clean_repair_output(&raw))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        self.api_key().map(|_| ())
    }
}

#[async_trait]
impl QueryPlanner for LlmClient {
    async fn plan(
        &self,
        question: &str,
        columns: &[ColumnProfile],
        sample_rows: &[Row],
    ) -> Result<Vec<QueryDraft>, LlmError> {
        let mut prompt_parts = Vec::new();
        prompt_parts.push(format!("QUESTION: {}", question));
        prompt_parts.push("\nCOLUMNS:".to_string());
        prompt_parts.push(schema_summary(columns));
        if !sample_rows.is_empty() {
            prompt_parts.push("\nSAMPLE ROWS:".to_string());
            for row in sample_rows {
                prompt_parts.push(serde_json::to_string(row).unwrap_or_default());
            }
        }
        prompt_parts.push("\nGRAMMAR:".to_string());
        for rule in GRAMMAR_RULES {
            prompt_parts.push(format!("- {}", rule));
        }
        prompt_parts.push(
            "\nReturn ONLY a JSON array of 1 to 4 objects like {\"purpose\": \"...\", \"query_text\": \"SELECT ... FROM data\"}."
                .to_string(),
        );

        let raw = self
            .call_llm(
                "You plan analysis queries over one table named data. Always return valid JSON, no other text.",
                &prompt_parts.join("\n"),
            )
            .await?;
        let drafts = parse_drafts(&raw)?;
        info!("✅ Planned {} query drafts", drafts.len());
        Ok(drafts)
    }
}

#[async_trait]
impl Narrator for LlmClient {
    async fn narrate(&self, question: &str, outcomes: &[DraftOutcome]) -> Result<String, LlmError> {
        let mut prompt_parts = Vec::new();
        prompt_parts.push(format!("QUESTION: {}", question));
        for outcome in outcomes {
            prompt_parts.push(format!("\n## {}", outcome.purpose));
            prompt_parts.push(format!("Query: {}", outcome.query_text_used));
            if outcome.fallback_used {
                prompt_parts.push("(fallback query; the intended analysis could not be run)".to_string());
            }
            for row in outcome.results.iter().take(NARRATE_ROW_CAP) {
                prompt_parts.push(serde_json::to_string(row).unwrap_or_default());
            }
            if outcome.results.len() > NARRATE_ROW_CAP {
                prompt_parts.push(format!("... {} more rows", outcome.results.len() - NARRATE_ROW_CAP));
            }
        }
        prompt_parts.push("\nAnswer the question in a few sentences using only these results.".to_string());

        self.call_llm(
            "You explain query results to non-technical readers. Never invent numbers.",
            &prompt_parts.join("\n"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drafts_accepts_list_and_wrapper() {
        let list = r#"[{"purpose": "total", "query_text": "SELECT COUNT(*) FROM data"}]"#;
        assert_eq!(parse_drafts(list).unwrap().len(), 1);

        let wrapped = "```json\n{\"queries\": [{\"purpose\": \"a\", \"query_text\": \"SELECT a FROM data\"}, {\"purpose\": \"b\", \"query_text\": \"SELECT b FROM data\"}]}\n```";
        let drafts = parse_drafts(wrapped).unwrap();
        assert_eq!(drafts[1].purpose, "b");
    }

    #[test]
    fn test_parse_drafts_rejects_empty_and_garbage() {
        assert!(matches!(parse_drafts("[]"), Err(LlmError::Parse(_))));
        assert!(matches!(parse_drafts("not json"), Err(LlmError::Parse(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_health_check() {
        let client = LlmClient::new(LlmConfig::default());
        assert!(matches!(client.health_check().await, Err(LlmError::NotConfigured(_))));
    }
}
