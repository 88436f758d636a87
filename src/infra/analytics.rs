//! Analytics warehouse client for the geo and rank lookup lists.
//!
//! Speaks the BigQuery v2 REST surface directly: one `jobs.query` call per lookup, followed
//! by `jobs.getQueryResults` only when the job outlives the synchronous wait or pages.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::repos::{LookupStore, StoreError};
use crate::config::AnalyticsSettings;

use super::error::InfraError;

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const MAX_RESULT_POLLS: usize = 5;

pub struct BigQueryLookups {
    client: Client,
    settings: AnalyticsSettings,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    use_query_cache: bool,
    timeout_ms: u64,
    location: &'a str,
    maximum_bytes_billed: String,
    labels: Value,
    job_creation_mode: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    job_reference: Option<JobReference>,
    page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

impl BigQueryLookups {
    pub fn new(settings: AnalyticsSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("tech-report-api/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout + Duration::from_secs(5))
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self {
            client,
            settings,
            token: Mutex::new(None),
        })
    }

    async fn lookup(&self, column: &'static str, table: &str) -> Result<Vec<Value>, StoreError> {
        let sql = lookup_sql(&self.settings, column, table);
        let rows = self.run_query(&sql).await?;
        Ok(project_column(rows, column))
    }

    async fn run_query(&self, sql: &str) -> Result<Vec<Map<String, Value>>, StoreError> {
        let url = self.endpoint(&format!("projects/{}/queries", self.settings.project))?;
        let body = query_request(&self.settings, sql);
        debug!(
            target = "techreport::analytics",
            query = sql,
            "executing warehouse query"
        );

        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let mut page: QueryResponse = decode(response).await?;

        let mut schema = None;
        let mut rows = Vec::new();
        let mut polls = 0;
        loop {
            if page.job_complete {
                if schema.is_none() {
                    schema = page.schema.take();
                }
                rows.append(&mut page.rows);
                if page.page_token.is_none() {
                    break;
                }
            } else {
                polls += 1;
                if polls > MAX_RESULT_POLLS {
                    return Err(StoreError::Timeout);
                }
            }
            let job = page
                .job_reference
                .take()
                .ok_or_else(|| StoreError::analytics("query response lacks a job reference"))?;
            let next = page.page_token.take();
            page = self.query_results(&token, &job, next.as_deref()).await?;
            if page.job_reference.is_none() {
                page.job_reference = Some(job);
            }
        }

        if let Some(job) = page.job_reference.as_ref() {
            info!(
                target = "techreport::analytics",
                job_id = %job.job_id,
                rows = rows.len(),
                "warehouse query completed"
            );
        }
        rows_to_records(&schema.unwrap_or_default(), rows)
    }

    async fn query_results(
        &self,
        token: &str,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, StoreError> {
        let mut url = self.endpoint(&format!(
            "projects/{}/queries/{}",
            self.settings.project, job.job_id
        ))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(
                "location",
                job.location.as_deref().unwrap_or(&self.settings.location),
            );
            pairs.append_pair("timeoutMs", &timeout_ms(&self.settings).to_string());
            if let Some(page_token) = page_token {
                pairs.append_pair("pageToken", page_token);
            }
        }
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        decode(response).await
    }

    async fn bearer_token(&self) -> Result<String, StoreError> {
        if let Some(token) = self.settings.access_token.as_ref() {
            return Ok(token.clone());
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let response = self
            .client
            .get(self.settings.token_endpoint.clone())
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let token: TokenResponse = decode(response).await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.settings
            .endpoint
            .join(path)
            .map_err(StoreError::analytics)
    }
}

#[async_trait]
impl LookupStore for BigQueryLookups {
    async fn geos(&self) -> Result<Vec<Value>, StoreError> {
        self.lookup("geo", "tech_report_geos").await
    }

    async fn ranks(&self) -> Result<Vec<Value>, StoreError> {
        self.lookup("rank", "tech_report_ranks").await
    }
}

fn lookup_sql(settings: &AnalyticsSettings, column: &str, table: &str) -> String {
    format!(
        "SELECT {column} FROM `{}.{}.{table}` ORDER BY mobile_origins DESC",
        settings.project, settings.dataset
    )
}

fn timeout_ms(settings: &AnalyticsSettings) -> u64 {
    u64::try_from(settings.timeout.as_millis()).unwrap_or(u64::MAX)
}

fn query_request<'a>(settings: &'a AnalyticsSettings, sql: &'a str) -> QueryRequest<'a> {
    QueryRequest {
        query: sql,
        use_legacy_sql: false,
        use_query_cache: true,
        timeout_ms: timeout_ms(settings),
        location: &settings.location,
        maximum_bytes_billed: settings.maximum_bytes_billed.to_string(),
        labels: json!({ "app": "tech-report-api", "source": "bigquery-direct" }),
        job_creation_mode: "JOB_CREATION_OPTIONAL",
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return Err(StoreError::Timeout);
    }
    if !status.is_success() {
        let text = String::from_utf8_lossy(&bytes);
        return Err(StoreError::analytics(format!("status {status} body {text}")));
    }
    serde_json::from_slice(&bytes).map_err(StoreError::decode)
}

fn map_reqwest_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else if err.is_decode() {
        StoreError::decode(err)
    } else {
        StoreError::analytics(err)
    }
}

/// Zip each row's cells with the schema's column names, converting scalar cells by type.
fn rows_to_records(
    schema: &TableSchema,
    rows: Vec<TableRow>,
) -> Result<Vec<Map<String, Value>>, StoreError> {
    rows.into_iter()
        .map(|row| {
            if row.f.len() != schema.fields.len() {
                return Err(StoreError::decode(format!(
                    "row has {} cells but schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                )));
            }
            Ok(schema
                .fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| (field.name.clone(), convert_cell(&field.kind, cell.v)))
                .collect())
        })
        .collect()
}

fn convert_cell(kind: &str, value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    match kind {
        "INTEGER" | "INT64" => text.parse::<i64>().map(Value::from).unwrap_or(value),
        "FLOAT" | "FLOAT64" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(value),
        "BOOLEAN" | "BOOL" => match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value,
        },
        _ => value,
    }
}

fn project_column(rows: Vec<Map<String, Value>>, column: &'static str) -> Vec<Value> {
    rows.into_iter()
        .map(|mut row| {
            let value = row.remove(column).unwrap_or(Value::Null);
            let mut record = Map::new();
            record.insert(column.to_string(), value);
            Value::Object(record)
        })
        .collect()
}
