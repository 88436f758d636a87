use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{application::repos::StoreError, config::LoadError, infra::error::InfraError};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failure of a read request, split into caller mistakes and backend trouble.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParams(Vec<&'static str>),
    #[error("Too many values specified for {field}. Maximum {limit} allowed.")]
    TooManyValues { field: &'static str, limit: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueryError::Store(_))
    }

    /// Per-field messages for client errors; empty for backend failures.
    pub fn field_errors(&self) -> Vec<(&'static str, String)> {
        match self {
            QueryError::MissingParams(fields) => fields
                .iter()
                .map(|field| (*field, format!("missing {field} parameter")))
                .collect(),
            QueryError::TooManyValues { field, .. } => vec![(*field, self.to_string())],
            QueryError::Store(_) => Vec::new(),
        }
    }
}

/// Top-level failure of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
