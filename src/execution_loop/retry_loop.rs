//! Execution Loop
//!
//! Bounded retry loop that resolves every query draft to a terminal result:
//! pre-validated execution, external repairs, then three syntactic
//! fallbacks of decreasing ambition.

use crate::config::RetryConfig;
use crate::error::RetryLoopError;
use crate::execution_loop::error_classifier::ErrorClassifier;
use crate::execution_loop::error_recovery::{clean_repair_output, RepairContext, GRAMMAR_RULES};
use crate::execution_loop::pattern_memory::PatternMemory;
use crate::execution_loop::prevalidate::prevalidate;
use crate::ingestion::{ColumnProfile, SchemaInference};
use crate::llm::QueryRepairer;
use crate::query::{
    parse_query, schema_columns, AggregateArg, AggregateFunc, FailureKind, QueryEngine, QueryFailure, SelectItem,
    SelectStatement, TABLE_NAME,
};
use crate::value::{CellValue, ColumnTypeMap, Dataset, Row};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Query every dataset can answer. `attempts_used` counts the first try, so
/// with the default settings a draft resolved here reports up to six: the
/// draft, two repairs, the simplified and minimized forms, then this query.
/// Without columns there is no minimized form and the count is five.
pub const GUARANTEED_FALLBACK_QUERY: &str = "SELECT COUNT(*) FROM data";

lazy_static! {
    static ref TRAILING_ORDER_LIMIT: Regex = Regex::new(r"(?is)\s+(order\s+by|limit)\b.*$").unwrap();
}

/// A candidate query from the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDraft {
    pub purpose: String,
    pub query_text: String,
}

impl QueryDraft {
    pub fn new(purpose: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            query_text: query_text.into(),
        }
    }
}

/// Stage that produced a draft's terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Direct,
    AutoFixed,
    Repaired,
    Simplified,
    Minimized,
    GuaranteedFallback,
}

impl Resolution {
    /// The result no longer answers the draft's purpose.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Minimized | Resolution::GuaranteedFallback)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::Direct => "direct",
            Resolution::AutoFixed => "auto_fixed",
            Resolution::Repaired => "repaired",
            Resolution::Simplified => "simplified",
            Resolution::Minimized => "minimized",
            Resolution::GuaranteedFallback => "guaranteed_fallback",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOutcome {
    pub purpose: String,
    pub original_query: String,
    pub query_text_used: String,
    pub results: Vec<Row>,
    pub row_count: usize,
    pub fallback_used: bool,
    /// Queries executed or rejected for this draft, the first try included.
    pub attempts_used: u8,
    pub resolution: Resolution,
    /// Failure reasons in the order they were hit.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryReport {
    pub outcomes: Vec<DraftOutcome>,
    /// Attempts beyond the first, summed over all drafts.
    pub total_retries: usize,
}

/// Read-only inputs shared by every draft of one batch.
struct Batch<'a> {
    dataset: &'a Dataset,
    column_types: &'a ColumnTypeMap,
    columns: Vec<String>,
    profiles: Vec<ColumnProfile>,
    sample_rows: Vec<Row>,
}

/// One pre-validated, possibly executed query.
struct Attempt {
    query_text: String,
    auto_fixed: bool,
    result: Result<Vec<Row>, QueryFailure>,
}

struct Success {
    query_text: String,
    auto_fixed: bool,
    rows: Vec<Row>,
}

/// Per-draft bookkeeping.
struct DraftState<'d> {
    draft: &'d QueryDraft,
    attempts: u8,
    errors: Vec<String>,
    current_query: String,
    last_failure: Option<QueryFailure>,
}

impl<'d> DraftState<'d> {
    fn finish(&self, query_text: String, results: Vec<Row>, resolution: Resolution) -> DraftOutcome {
        DraftOutcome {
            purpose: self.draft.purpose.clone(),
            original_query: self.draft.query_text.clone(),
            query_text_used: query_text,
            row_count: results.len(),
            results,
            fallback_used: resolution.is_fallback(),
            attempts_used: self.attempts,
            resolution,
            errors: self.errors.clone(),
        }
    }
}

/// Retry loop with a fixed attempt budget per draft
pub struct RetryLoop {
    config: RetryConfig,
    engine: QueryEngine,
    classifier: ErrorClassifier,
    schema_inference: SchemaInference,
}

impl RetryLoop {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            engine: QueryEngine::new(),
            classifier: ErrorClassifier::new(),
            schema_inference: SchemaInference::default(),
        }
    }

    /// Repair calls per draft, capped so the three fallback stages always fit.
    fn repair_attempts(&self) -> u8 {
        self.config
            .repair_attempts
            .min(self.config.attempt_budget.saturating_sub(3))
    }

    /// Resolves every draft, in order, to exactly one outcome.
    ///
    /// Only an empty dataset or an unhealthy repair service stop the batch,
    /// and both are checked before the first draft runs.
    pub async fn run(
        &self,
        dataset: &Dataset,
        column_types: &ColumnTypeMap,
        drafts: &[QueryDraft],
        repairer: &dyn QueryRepairer,
    ) -> Result<RetryReport, RetryLoopError> {
        if dataset.is_empty() {
            return Err(RetryLoopError::EmptyDataset);
        }
        repairer
            .health_check()
            .await
            .map_err(|e| RetryLoopError::RepairServiceUnavailable(e.to_string()))?;

        let batch = Batch {
            dataset,
            column_types,
            columns: schema_columns(&dataset.rows, column_types),
            profiles: self.schema_inference.profile_columns(dataset, column_types),
            sample_rows: dataset.rows.iter().take(self.config.sample_rows).cloned().collect(),
        };
        let mut memory = PatternMemory::new();
        let mut outcomes = Vec::with_capacity(drafts.len());

        for (idx, draft) in drafts.iter().enumerate() {
            info!("Draft {} of {}: {}", idx + 1, drafts.len(), draft.purpose);
            let outcome = self.resolve_draft(&batch, draft, &mut memory, repairer).await;
            info!(
                resolution = %outcome.resolution,
                attempts = outcome.attempts_used,
                rows = outcome.row_count,
                "Draft {} resolved",
                idx + 1
            );
            outcomes.push(outcome);
        }

        let total_retries = outcomes
            .iter()
            .map(|o| o.attempts_used.saturating_sub(1) as usize)
            .sum();
        info!("✅ Resolved {} drafts with {} retries", outcomes.len(), total_retries);
        Ok(RetryReport {
            outcomes,
            total_retries,
        })
    }

    fn attempt(&self, batch: &Batch<'_>, query: &str) -> Attempt {
        let pre = prevalidate(query, &batch.columns);
        let rows = &batch.dataset.rows;
        let result = match (&pre.issue, &pre.statement) {
            (Some(issue), _) => Err(QueryFailure::from(issue)),
            (None, Some(stmt)) => self.engine.execute_statement(rows, batch.column_types, stmt).into_result(),
            (None, None) => self.engine.execute(rows, batch.column_types, &pre.query_text).into_result(),
        };
        Attempt {
            auto_fixed: pre.auto_fixed(),
            query_text: pre.query_text,
            result,
        }
    }

    /// Runs one query for `state`, recording the failure if it fails.
    fn try_stage(
        &self,
        batch: &Batch<'_>,
        state: &mut DraftState<'_>,
        stage: &str,
        query: &str,
    ) -> Option<Success> {
        state.attempts += 1;
        info!("Execution attempt {} ({}): {}", state.attempts, stage, query);
        let Attempt {
            query_text,
            auto_fixed,
            result,
        } = self.attempt(batch, query);
        state.current_query = query_text.clone();
        match result {
            Ok(rows) => Some(Success {
                query_text,
                auto_fixed,
                rows,
            }),
            Err(failure) => {
                warn!("{} attempt failed: {}", stage, failure.message);
                state.errors.push(format!("{}: {}", stage, failure.message));
                state.last_failure = Some(failure);
                None
            }
        }
    }

    async fn resolve_draft(
        &self,
        batch: &Batch<'_>,
        draft: &QueryDraft,
        memory: &mut PatternMemory,
        repairer: &dyn QueryRepairer,
    ) -> DraftOutcome {
        let mut state = DraftState {
            draft,
            attempts: 0,
            errors: Vec::new(),
            current_query: draft.query_text.clone(),
            last_failure: None,
        };

        if let Some(ok) = self.try_stage(batch, &mut state, "prevalidated", &draft.query_text) {
            let resolution = if ok.auto_fixed {
                Resolution::AutoFixed
            } else {
                Resolution::Direct
            };
            memory.record(&ok.query_text);
            return state.finish(ok.query_text, ok.rows, resolution);
        }

        let repair_attempts = self.repair_attempts();
        for repair in 1..=repair_attempts {
            let context = self.repair_context(batch, &state, memory, repair, repair_attempts);
            let repaired = match repairer.repair(&context).await {
                Ok(text) => clean_repair_output(&text),
                Err(e) => {
                    state.attempts += 1;
                    warn!("Repair attempt {} of {} failed: {}", repair, repair_attempts, e);
                    state.errors.push(format!("repair {}: {}", repair, e));
                    continue;
                }
            };
            if let Some(ok) = self.try_stage(batch, &mut state, "repaired", &repaired) {
                memory.record(&ok.query_text);
                return state.finish(ok.query_text, ok.rows, Resolution::Repaired);
            }
        }

        let simplified = simplify(&draft.query_text);
        if let Some(ok) = self.try_stage(batch, &mut state, "simplified", &simplified) {
            memory.record(&ok.query_text);
            return state.finish(ok.query_text, ok.rows, Resolution::Simplified);
        }

        if let Some(minimized) = batch.columns.first().map(|col| minimized_query(col)) {
            if let Some(ok) = self.try_stage(batch, &mut state, "minimized", &minimized) {
                memory.record(&ok.query_text);
                return state.finish(ok.query_text, ok.rows, Resolution::Minimized);
            }
        }

        match self.try_stage(batch, &mut state, "guaranteed fallback", GUARANTEED_FALLBACK_QUERY) {
            Some(ok) => {
                memory.record(&ok.query_text);
                state.finish(ok.query_text, ok.rows, Resolution::GuaranteedFallback)
            }
            None => {
                warn!("guaranteed fallback failed; counting rows directly");
                let mut row = Row::new();
                row.insert(
                    "count".to_string(),
                    CellValue::Number(batch.dataset.row_count() as f64),
                );
                state.finish(GUARANTEED_FALLBACK_QUERY.to_string(), vec![row], Resolution::GuaranteedFallback)
            }
        }
    }

    fn repair_context(
        &self,
        batch: &Batch<'_>,
        state: &DraftState<'_>,
        memory: &PatternMemory,
        attempt: u8,
        max_attempts: u8,
    ) -> RepairContext {
        let failure = state.last_failure.clone().unwrap_or_else(|| QueryFailure {
            kind: FailureKind::Execution,
            message: "previous repair produced no query".to_string(),
            columns: Vec::new(),
        });
        let class = self.classifier.classify(&failure);
        RepairContext {
            purpose: state.draft.purpose.clone(),
            failed_query: state.current_query.clone(),
            failure_reason: failure.message.clone(),
            error_class: class.to_string(),
            error_hint: self.classifier.hint(&class, &failure, &batch.columns),
            columns: batch.profiles.clone(),
            sample_rows: batch.sample_rows.clone(),
            grammar_rules: GRAMMAR_RULES.iter().map(|r| r.to_string()).collect(),
            successful_patterns: memory.patterns().to_vec(),
            attempt,
            max_attempts,
        }
    }
}

impl Default for RetryLoop {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Drops ORDER BY and LIMIT.
pub fn simplify(query: &str) -> String {
    match parse_query(query) {
        Ok(mut stmt) => {
            stmt.order_by.clear();
            stmt.limit = None;
            stmt.to_string()
        }
        Err(_) => TRAILING_ORDER_LIMIT.replace(query.trim(), "").into_owned(),
    }
}

/// Count of rows per value of `column`. The count is aliased `count`, or
/// `count_rows` when the group column already uses that name.
pub fn minimized_query(column: &str) -> String {
    let alias = if column == "count" { "count_rows" } else { "count" };
    SelectStatement {
        projections: vec![
            SelectItem::Column {
                name: column.to_string(),
                alias: None,
            },
            SelectItem::Aggregate {
                func: AggregateFunc::Count,
                arg: AggregateArg::Star,
                alias: Some(alias.to_string()),
            },
        ],
        from: Some(TABLE_NAME.to_string()),
        filter: None,
        group_by: vec![column.to_string()],
        order_by: Vec::new(),
        limit: None,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::value::ColumnType;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct StubRepairer {
        healthy: bool,
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        contexts: Mutex<Vec<RepairContext>>,
    }

    impl StubRepairer {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                healthy: true,
                replies: Mutex::new(replies.into()),
                contexts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.contexts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl QueryRepairer for StubRepairer {
        async fn repair(&self, context: &RepairContext) -> Result<String, LlmError> {
            self.contexts.lock().unwrap().push(context.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("SELECT nonsense".to_string()))
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            if self.healthy {
                Ok(())
            } else {
                Err(LlmError::NotConfigured("no key".to_string()))
            }
        }
    }

    fn row(categoria: &str, total: f64) -> Row {
        let mut row = Row::new();
        row.insert("categoria".to_string(), CellValue::Text(categoria.to_string()));
        row.insert("total".to_string(), CellValue::Number(total));
        row
    }

    fn sample() -> (Dataset, ColumnTypeMap) {
        let dataset = Dataset::new(
            vec!["categoria".to_string(), "total".to_string()],
            vec![row("x", 5.0), row("x", 7.0), row("y", 2.0)],
        );
        let mut types = ColumnTypeMap::new();
        types.insert("categoria".to_string(), ColumnType::Text);
        types.insert("total".to_string(), ColumnType::Integer);
        (dataset, types)
    }

    #[tokio::test]
    async fn test_valid_draft_runs_directly() {
        let (dataset, types) = sample();
        let stub = StubRepairer::new(vec![]);
        let drafts = vec![QueryDraft::new("total", "SELECT SUM(total) FROM data")];
        let report = RetryLoop::default().run(&dataset, &types, &drafts, &stub).await.unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.resolution, Resolution::Direct);
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(outcome.results[0]["sum_total"], CellValue::Number(14.0));
        assert_eq!(report.total_retries, 0);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_group_by_is_fixed_without_repair_call() {
        let (dataset, types) = sample();
        let stub = StubRepairer::new(vec![]);
        let drafts = vec![QueryDraft::new("by category", "SELECT categoria, SUM(total) FROM data")];
        let report = RetryLoop::default().run(&dataset, &types, &drafts, &stub).await.unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.resolution, Resolution::AutoFixed);
        assert_eq!(outcome.query_text_used, "SELECT categoria, SUM(total) FROM data GROUP BY categoria");
        assert_eq!(outcome.row_count, 2);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_column_is_repaired_with_context() {
        let (dataset, types) = sample();
        let stub = StubRepairer::new(vec![Ok("```sql\nSELECT categoria FROM data;\n```".to_string())]);
        let drafts = vec![
            QueryDraft::new("count", "SELECT COUNT(*) FROM data"),
            QueryDraft::new("categories", "SELECT categoriaa FROM data"),
        ];
        let report = RetryLoop::default().run(&dataset, &types, &drafts, &stub).await.unwrap();

        let outcome = &report.outcomes[1];
        assert_eq!(outcome.resolution, Resolution::Repaired);
        assert_eq!(outcome.attempts_used, 2);
        assert_eq!(outcome.row_count, 3);
        assert!(!outcome.fallback_used);
        assert_eq!(report.total_retries, 1);

        let contexts = stub.contexts.lock().unwrap();
        assert_eq!(contexts[0].error_class, "ColumnNotFound");
        assert!(contexts[0].error_hint.contains("did you mean 'categoria'"));
        assert_eq!(contexts[0].successful_patterns, vec!["SELECT COUNT(*) FROM data".to_string()]);
        assert_eq!(contexts[0].sample_rows.len(), 3);
        assert_eq!(contexts[0].max_attempts, 2);
    }

    #[tokio::test]
    async fn test_simplification_drops_bad_order_by() {
        let (dataset, types) = sample();
        let stub = StubRepairer::new(vec![Err(LlmError::Transport("timeout".to_string()))]);
        let drafts = vec![QueryDraft::new("sorted", "SELECT categoria FROM data ORDER BY cidade LIMIT 2")];
        let report = RetryLoop::default().run(&dataset, &types, &drafts, &stub).await.unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.resolution, Resolution::Simplified);
        assert_eq!(outcome.query_text_used, "SELECT categoria FROM data");
        assert_eq!(outcome.attempts_used, 4);
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.errors.len(), 3);
    }

    #[tokio::test]
    async fn test_hopeless_draft_falls_back_to_minimized_count() {
        let (dataset, types) = sample();
        let stub = StubRepairer::new(vec![]);
        let drafts = vec![QueryDraft::new("broken", "SELECT banana FROM data")];
        let report = RetryLoop::default().run(&dataset, &types, &drafts, &stub).await.unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.resolution, Resolution::Minimized);
        assert!(outcome.fallback_used);
        assert_eq!(outcome.attempts_used, 5);
        assert_eq!(
            outcome.query_text_used,
            "SELECT categoria, COUNT(*) AS `count` FROM data GROUP BY categoria"
        );
        assert_eq!(outcome.results[0]["count"], CellValue::Number(2.0));
    }

    #[test]
    fn test_minimized_query_keeps_group_key_named_count() {
        assert_eq!(
            minimized_query("count"),
            "SELECT `count`, COUNT(*) AS count_rows FROM data GROUP BY `count`"
        );
    }

    #[tokio::test]
    async fn test_minimized_fallback_on_count_column_keeps_both_columns() {
        let mut first = Row::new();
        first.insert("count".to_string(), CellValue::Text("a".to_string()));
        let mut second = Row::new();
        second.insert("count".to_string(), CellValue::Text("a".to_string()));
        let dataset = Dataset::new(vec!["count".to_string()], vec![first, second]);
        let mut types = ColumnTypeMap::new();
        types.insert("count".to_string(), ColumnType::Text);

        let stub = StubRepairer::new(vec![]);
        let drafts = vec![QueryDraft::new("broken", "SELECT banana FROM data")];
        let report = RetryLoop::default().run(&dataset, &types, &drafts, &stub).await.unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.resolution, Resolution::Minimized);
        assert_eq!(outcome.results[0]["count"], CellValue::from("a"));
        assert_eq!(outcome.results[0]["count_rows"], CellValue::Number(2.0));
    }

    #[tokio::test]
    async fn test_guaranteed_fallback_attempt_accounting() {
        let dataset = Dataset::new(Vec::new(), vec![Row::new()]);
        let stub = StubRepairer::new(vec![]);
        let drafts = vec![QueryDraft::new("anything", "SELECT x FROM data")];
        let report = RetryLoop::default()
            .run(&dataset, &ColumnTypeMap::new(), &drafts, &stub)
            .await
            .unwrap();
        assert_eq!(report.outcomes[0].resolution, Resolution::GuaranteedFallback);
        assert_eq!(report.outcomes[0].attempts_used, 5);
        assert_eq!(report.outcomes[0].errors.len(), 4);
        assert_eq!(report.total_retries, 4);
    }

    #[tokio::test]
    async fn test_dataset_without_columns_reaches_guaranteed_fallback() {
        let dataset = Dataset::new(Vec::new(), vec![Row::new(), Row::new()]);
        let stub = StubRepairer::new(vec![]);
        let drafts = vec![QueryDraft::new("anything", "SELECT x FROM data")];
        let report = RetryLoop::default()
            .run(&dataset, &ColumnTypeMap::new(), &drafts, &stub)
            .await
            .unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.resolution, Resolution::GuaranteedFallback);
        assert_eq!(outcome.query_text_used, GUARANTEED_FALLBACK_QUERY);
        assert_eq!(outcome.results[0]["count"], CellValue::Number(2.0));
    }

    #[tokio::test]
    async fn test_every_draft_gets_an_outcome_in_order() {
        let (dataset, types) = sample();
        let stub = StubRepairer::new(vec![]);
        let drafts = vec![
            QueryDraft::new("a", "DROP TABLE data"),
            QueryDraft::new("b", ""),
            QueryDraft::new("c", "SELECT MAX(total) FROM data"),
            QueryDraft::new("d", "SELECT total FROM data WHERE categoria > 'x'"),
        ];
        let report = RetryLoop::default().run(&dataset, &types, &drafts, &stub).await.unwrap();
        assert_eq!(report.outcomes.len(), 4);
        let purposes: Vec<&str> = report.outcomes.iter().map(|o| o.purpose.as_str()).collect();
        assert_eq!(purposes, vec!["a", "b", "c", "d"]);
        assert!(report.outcomes.iter().all(|o| !o.results.is_empty()));
        assert_eq!(report.outcomes[2].resolution, Resolution::Direct);
    }

    #[tokio::test]
    async fn test_preconditions() {
        let (_, types) = sample();
        let stub = StubRepairer::new(vec![]);
        let drafts = vec![QueryDraft::new("a", GUARANTEED_FALLBACK_QUERY)];
        let empty = Dataset::default();
        let err = RetryLoop::default().run(&empty, &types, &drafts, &stub).await.unwrap_err();
        assert!(matches!(err, RetryLoopError::EmptyDataset));

        let (dataset, types) = sample();
        let mut unhealthy = StubRepairer::new(vec![]);
        unhealthy.healthy = false;
        let err = RetryLoop::default()
            .run(&dataset, &types, &drafts, &unhealthy)
            .await
            .unwrap_err();
        assert!(matches!(err, RetryLoopError::RepairServiceUnavailable(_)));
    }

    #[test]
    fn test_simplify() {
        assert_eq!(simplify("SELECT a FROM data ORDER BY a DESC LIMIT 3"), "SELECT a FROM data");
        assert_eq!(simplify("SELECT a FROM data JOIN b ORDER BY a"), "SELECT a FROM data JOIN b");
    }

    #[test]
    fn test_minimized_query_quotes_odd_names() {
        assert_eq!(
            minimized_query("order"),
            "SELECT `order`, COUNT(*) AS `count` FROM data GROUP BY `order`"
        );
    }
}
