//! Document queries over the `documents` JSONB table.
//!
//! Every collection lives in one table keyed by `collection`. Field names travel as
//! bind parameters (`doc -> $n`), so no caller-supplied text is spliced into SQL.

use serde_json::Value;
use sqlx::{Postgres, QueryBuilder, types::Json};

use crate::application::repos::{DocumentQuery, Filter, SortDirection};

/// Build the SQL for `query`; the single result column `doc` holds one JSON document.
pub(crate) fn build_document_query(query: &DocumentQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    match query.projection() {
        Some(fields) => {
            let fields: Vec<String> = fields.iter().map(|field| field.to_string()).collect();
            qb.push(
                "(SELECT COALESCE(jsonb_object_agg(e.key, e.value), '{}'::jsonb) \
                 FROM jsonb_each(d.doc) AS e WHERE e.key = ANY(",
            );
            qb.push_bind(fields);
            qb.push(")) AS doc");
        }
        None => {
            qb.push("d.doc AS doc");
        }
    }

    qb.push(" FROM documents AS d WHERE d.collection = ");
    qb.push_bind(query.collection());

    for filter in query.filters() {
        push_filter(&mut qb, filter);
    }

    qb.push(" ORDER BY ");
    if let Some((field, direction)) = query.ordering() {
        qb.push("d.doc -> ");
        qb.push_bind(field);
        qb.push(match direction {
            SortDirection::Asc => " ASC, ",
            SortDirection::Desc => " DESC, ",
        });
    }
    qb.push("d.id ASC");

    if let Some(limit) = query.max_rows() {
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
    }

    qb
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    match filter {
        Filter::Eq { field, value } => {
            qb.push(" AND d.doc -> ");
            qb.push_bind(*field);
            qb.push(" = ");
            qb.push_bind(Json(value.clone()));
        }
        Filter::In { field, values } => {
            qb.push(" AND ");
            qb.push_bind(Json(Value::Array(values.clone())));
            qb.push(" @> jsonb_build_array(d.doc -> ");
            qb.push_bind(*field);
            qb.push(")");
        }
        Filter::ArrayContainsAny { field, values } => {
            let values: Vec<String> = values.iter().map(text_of).collect();
            qb.push(" AND jsonb_typeof(d.doc -> ");
            qb.push_bind(*field);
            qb.push(") = 'array' AND jsonb_exists_any(d.doc -> ");
            qb.push_bind(*field);
            qb.push(", ");
            qb.push_bind(values);
            qb.push(")");
        }
        Filter::Gte { field, value } => push_range(qb, *field, ">=", value),
        Filter::Lte { field, value } => push_range(qb, *field, "<=", value),
    }
}

/// Strings compare as text so ISO dates order correctly; anything else compares as JSONB.
fn push_range(
    qb: &mut QueryBuilder<'static, Postgres>,
    field: &'static str,
    op: &'static str,
    value: &Value,
) {
    match value {
        Value::String(text) => {
            qb.push(" AND d.doc ->> ");
            qb.push_bind(field);
            qb.push(format!(" {op} "));
            qb.push_bind(text.clone());
        }
        other => {
            qb.push(" AND d.doc -> ");
            qb.push_bind(field);
            qb.push(format!(" {op} "));
            qb.push_bind(Json(other.clone()));
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
