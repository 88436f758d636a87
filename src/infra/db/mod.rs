//! Postgres-backed document store.

mod documents;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    types::Json,
};
use tracing::debug;

use crate::application::repos::{DocumentQuery, DocumentStore, StoreError};

use documents::build_document_query;

#[derive(Clone)]
pub struct PostgresDocuments {
    pool: Arc<PgPool>,
}

impl PostgresDocuments {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl DocumentStore for PostgresDocuments {
    async fn find(&self, query: &DocumentQuery) -> Result<Vec<Value>, StoreError> {
        let mut qb = build_document_query(query);
        debug!(
            target = "techreport::db::documents",
            collection = query.collection(),
            filters = query.filters().len(),
            "querying documents"
        );
        let rows: Vec<Json<Value>> = qb
            .build_query_scalar()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|Json(doc)| doc).collect())
    }
}
