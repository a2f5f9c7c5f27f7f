//! Execution Loop Module - Turns query drafts into terminal results
//!
//! - Pre-validation with cheap syntactic auto-fixes
//! - Known-cause error classification and repair context
//! - Session pattern memory of successful query shapes
//! - Bounded retry loop ending in a guaranteed fallback

pub mod error_classifier;
pub mod error_recovery;
pub mod pattern_memory;
pub mod prevalidate;
pub mod retry_loop;

pub use error_classifier::{closest_column, ErrorClassifier, QueryErrorClass};
pub use error_recovery::{clean_repair_output, RepairContext, GRAMMAR_RULES};
pub use pattern_memory::{normalize_pattern, PatternMemory};
pub use prevalidate::{prevalidate, PreValidation};
pub use retry_loop::{
    minimized_query, simplify, DraftOutcome, QueryDraft, Resolution, RetryLoop, RetryReport,
    GUARANTEED_FALLBACK_QUERY,
};
