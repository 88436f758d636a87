use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use crate::application::error::{ErrorReport, QueryError};
use crate::application::repos::StoreError;

/// A failed read, rendered in the API's two error body shapes.
///
/// Validation failures answer `400` with `{"success": false, "errors": [{field: message}]}`.
/// Backend failures hide their cause behind `Failed to fetch <resource>`; the cause travels
/// to the response logger through the attached [`ErrorReport`].
#[derive(Debug)]
pub struct ApiError {
    source: &'static str,
    resource: &'static str,
    error: QueryError,
}

impl ApiError {
    pub fn new(source: &'static str, resource: &'static str, error: QueryError) -> Self {
        Self {
            source,
            resource,
            error,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.error {
            QueryError::MissingParams(_) | QueryError::TooManyValues { .. } => {
                StatusCode::BAD_REQUEST
            }
            QueryError::Store(StoreError::Timeout) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        if self.error.is_client_error() {
            let errors: Vec<Value> = self
                .error
                .field_errors()
                .into_iter()
                .map(|(field, message)| {
                    let mut entry = Map::new();
                    entry.insert(field.to_string(), Value::String(message));
                    Value::Object(entry)
                })
                .collect();
            json!({ "success": false, "errors": errors })
        } else {
            json!({ "errors": [{ "error": format!("Failed to fetch {}", self.resource) }] })
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.body())).into_response();
        ErrorReport::from_error(self.source, status, &self.error).attach(&mut response);
        response
    }
}
