//! Error handling for chromaflow
//!
//! This module defines the crate-level error type and a Result alias used by
//! configuration and graph-file code. Graph operations report
//! [`PipelineError`](crate::pipeline::PipelineError), which converts into it.

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for chromaflow operations
#[derive(Error, Debug)]
pub enum ChromaflowError {
    /// Errors raised by the graph engine
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A graph file refers to a node id it never declared
    #[error("Unknown node '{0}' in graph file")]
    UnknownNode(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ChromaflowError>,
    },
}

impl ChromaflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ChromaflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for chromaflow operations
pub type Result<T> = std::result::Result<T, ChromaflowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ChromaflowError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ChromaflowError::from(e).with_context(f()))
    }
}
