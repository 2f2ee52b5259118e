//! Classified pipeline failures

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    #[error("Schema mismatch in {table}: {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("Join on '{key}' produced no rows: {context}")]
    EmptyJoinResult { key: String, context: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data frame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Model fitting error: {0}")]
    Linfa(#[from] linfa::Error),

    #[error("Matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn schema(table: &str, reason: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}
