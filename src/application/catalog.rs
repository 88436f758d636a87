//! Catalog lookups: technologies, categories and versions.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::application::error::QueryError;
use crate::application::params::{CategoryFilter, TechnologyFilter, VersionFilter};
use crate::application::repos::{DocumentQuery, DocumentStore, SortDirection};
use crate::cache::{QueryFilters, Records, ReportCache};

const TECHNOLOGIES: &str = "technologies";
const CATEGORIES: &str = "categories";
const VERSIONS: &str = "versions";

/// Fields exposed for a technology in the full listing.
const TECHNOLOGY_FIELDS: [&str; 5] = ["technology", "category", "description", "icon", "origins"];

pub struct CatalogService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<ReportCache>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<ReportCache>) -> Self {
        Self { store, cache }
    }

    pub async fn technologies(&self, filter: &TechnologyFilter) -> Result<Records, QueryError> {
        let filters = QueryFilters {
            technology: filter.technology.clone(),
            category: filter.category.clone(),
            ..Default::default()
        };
        let onlyname = filter.onlyname;

        let records = self
            .cache
            .query(TECHNOLOGIES, filters)
            .extra("onlyname", onlyname)
            .transform(move |rows| {
                if onlyname {
                    names(rows, "technology")
                } else {
                    rows.into_iter().map(present_technology).collect()
                }
            })
            .documents(self.store.as_ref(), || {
                let mut query =
                    DocumentQuery::new(TECHNOLOGIES).order_by("technology", SortDirection::Asc);
                if let Some(technology) = filter.technology.as_deref() {
                    query = query.is_in("technology", technology);
                }
                if let Some(category) = filter.category.as_deref() {
                    query = query.array_contains_any("category_obj", category);
                }
                if onlyname {
                    query.select(["technology"])
                } else {
                    query.select(TECHNOLOGY_FIELDS)
                }
            })
            .await?;
        Ok(records)
    }

    pub async fn categories(&self, filter: &CategoryFilter) -> Result<Records, QueryError> {
        let filters = QueryFilters {
            category: filter.category.clone(),
            ..Default::default()
        };
        let onlyname = filter.onlyname;

        let mut query = self.cache.query(CATEGORIES, filters).extra("onlyname", onlyname);
        if onlyname {
            query = query.transform(|rows| names(rows, "category"));
        }
        let records = query
            .documents(self.store.as_ref(), || {
                let query = DocumentQuery::new(CATEGORIES).order_by("category", SortDirection::Asc);
                let query = match filter.category.as_deref() {
                    Some(category) => query.is_in("category", category),
                    None => query,
                };
                if onlyname {
                    query.select(["category"])
                } else {
                    query
                }
            })
            .await?;
        Ok(records)
    }

    pub async fn versions(&self, filter: &VersionFilter) -> Result<Records, QueryError> {
        let filters = QueryFilters {
            technology: filter.technology.clone(),
            ..Default::default()
        };

        let records = self
            .cache
            .query(VERSIONS, filters)
            .documents(self.store.as_ref(), || match filter.technology.as_deref() {
                Some(technology) => DocumentQuery::new(VERSIONS).is_in("technology", technology),
                None => DocumentQuery::new(VERSIONS),
            })
            .await?;
        Ok(records)
    }
}

/// Collapse documents to the bare value of `field`, skipping documents without it.
fn names(rows: Vec<Value>, field: &str) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|mut row| row.get_mut(field).map(Value::take))
        .collect()
}

fn present_technology(row: Value) -> Value {
    let Value::Object(mut doc) = row else {
        return row;
    };
    let mut presented = Map::new();
    for field in TECHNOLOGY_FIELDS {
        if let Some(value) = doc.remove(field) {
            presented.insert(field.to_string(), value);
        }
    }
    Value::Object(presented)
}
