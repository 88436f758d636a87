//! Repository traits describing the document and lookup backends.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("backend timeout")]
    Timeout,
    #[error("analytics query failed: {0}")]
    Analytics(String),
    #[error("malformed backend payload: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn analytics(err: impl std::fmt::Display) -> Self {
        Self::Analytics(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A single predicate on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: &'static str, value: Value },
    In { field: &'static str, values: Vec<Value> },
    /// The field holds an array sharing at least one element with `values`.
    ArrayContainsAny { field: &'static str, values: Vec<Value> },
    Gte { field: &'static str, value: Value },
    Lte { field: &'static str, value: Value },
}

impl Filter {
    pub fn field(&self) -> &'static str {
        match self {
            Filter::Eq { field, .. }
            | Filter::In { field, .. }
            | Filter::ArrayContainsAny { field, .. }
            | Filter::Gte { field, .. }
            | Filter::Lte { field, .. } => field,
        }
    }
}

/// Chained query against one document collection.
///
/// Field names are `'static` so only names compiled into the binary reach a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    collection: &'static str,
    filters: Vec<Filter>,
    order_by: Option<(&'static str, SortDirection)>,
    limit: Option<u32>,
    select: Option<Vec<&'static str>>,
}

impl DocumentQuery {
    pub fn new(collection: &'static str) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
            select: None,
        }
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field,
            value: value.into(),
        });
        self
    }

    pub fn is_in(mut self, field: &'static str, values: &[String]) -> Self {
        self.filters.push(Filter::In {
            field,
            values: string_values(values),
        });
        self
    }

    pub fn array_contains_any(mut self, field: &'static str, values: &[String]) -> Self {
        self.filters.push(Filter::ArrayContainsAny {
            field,
            values: string_values(values),
        });
        self
    }

    pub fn gte(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte {
            field,
            value: value.into(),
        });
        self
    }

    pub fn lte(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte {
            field,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &'static str, direction: SortDirection) -> Self {
        self.order_by = Some((field, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict returned documents to `fields`; later calls replace earlier ones.
    pub fn select(mut self, fields: impl IntoIterator<Item = &'static str>) -> Self {
        self.select = Some(fields.into_iter().collect());
        self
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<(&'static str, SortDirection)> {
        self.order_by
    }

    pub fn max_rows(&self) -> Option<u32> {
        self.limit
    }

    pub fn projection(&self) -> Option<&[&'static str]> {
        self.select.as_deref()
    }
}

fn string_values(values: &[String]) -> Vec<Value> {
    values.iter().cloned().map(Value::String).collect()
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run `query` and return matching documents in backend order.
    async fn find(&self, query: &DocumentQuery) -> Result<Vec<Value>, StoreError>;
}

/// Lookup lists served from the analytics warehouse.
#[async_trait]
pub trait LookupStore: Send + Sync {
    /// `{"geo": ..}` records ordered by origin count, largest first.
    async fn geos(&self) -> Result<Vec<Value>, StoreError>;
    /// `{"rank": ..}` records ordered by origin count, largest first.
    async fn ranks(&self) -> Result<Vec<Value>, StoreError>;
}
