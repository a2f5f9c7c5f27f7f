//! Query Module - Constrained SELECT language over one in-memory table
//!
//! Text is tokenized, parsed into an explicit AST and evaluated against the
//! rows of a single ingested dataset, always addressed as `data`.

pub mod ast;
pub mod engine;
pub mod lexer;
pub mod parser;

pub use ast::{
    AggregateArg, AggregateFunc, CompareOp, Condition, Connective, Literal, OrderKey, Predicate,
    SelectItem, SelectStatement, WhereClause, TABLE_NAME,
};
pub use engine::{schema_columns, validate_statement, ExecutionResult, FailureKind, QueryEngine, QueryFailure};
pub use parser::parse_query;
