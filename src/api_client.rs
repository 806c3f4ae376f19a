use async_trait::async_trait;
use reqwest::{multipart, Client, Response, Url};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Rows per page requested from the table endpoint
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Upper bound on rows returned by a single search request
pub const DEFAULT_SEARCH_LIMIT: usize = 5000;

/// Column name → cell value, as stored by the remote side
pub type RowData = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote side answered with a non-2xx status
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected before any request was sent
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub record_count: usize,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub data: RowData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TablePage {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub pages: usize,
    #[serde(default)]
    pub current_page: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResult {
    pub table: String,
    #[serde(default)]
    pub data: RowData,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    tables: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct UpdateRowRequest<'a> {
    id: Value,
    table_name: &'a str,
    data: &'a RowData,
}

#[derive(Debug, Serialize)]
struct RenameRequest<'a> {
    old_name: &'a str,
    new_name: &'a str,
}

/// Parameters for one page of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub table: String,
    pub page: usize,
    pub per_page: usize,
    pub search: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ClientError::Invalid(format!(
                "Invalid format '{other}'. Use 'xlsx' or 'csv'"
            ))),
        }
    }
}

/// The remote table service as seen by the controllers.
///
/// Reads (`list_tables`, `fetch_page`, `search`) are idempotent; the rest are
/// mutations that callers always await to completion.
#[async_trait(?Send)]
pub trait TableService {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError>;

    async fn fetch_page(&self, query: &PageQuery) -> Result<TablePage, ClientError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ClientError>;

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        data: &RowData,
    ) -> Result<String, ClientError>;

    async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<String, ClientError>;

    async fn delete_table(&self, name: &str) -> Result<String, ClientError>;

    /// Returns the names of the tables created from the file
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<Vec<String>, ClientError>;

    async fn export_table(&self, name: &str, format: ExportFormat)
        -> Result<Vec<u8>, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Invalid(format!("invalid API url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Invalid(format!("invalid API url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait(?Send)]
impl TableService for ApiClient {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError> {
        let url = self.endpoint(&["tables"])?;
        debug!(target: "api", "GET {}", url);
        let response = check_status(self.client.get(url).send().await?).await?;
        decode(response).await
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<TablePage, ClientError> {
        let url = self.endpoint(&["tables", &query.table])?;
        debug!(target: "api", "GET {} page={} search='{}'", url, query.page, query.search);
        let response = self
            .client
            .get(url)
            .query(&[
                ("page", query.page.to_string()),
                ("per_page", query.per_page.to_string()),
                ("search", query.search.clone()),
            ])
            .send()
            .await?;
        decode(check_status(response).await?).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ClientError> {
        let url = self.endpoint(&["search"])?;
        debug!(target: "api", "GET {} q='{}' limit={}", url, query, limit);
        let response = self
            .client
            .get(url)
            .query(&[("q", query.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        let body: SearchResponse = decode(check_status(response).await?).await?;
        Ok(body.results)
    }

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        data: &RowData,
    ) -> Result<String, ClientError> {
        let url = self.endpoint(&["update_row"])?;
        let request = UpdateRowRequest {
            id: wire_id(id),
            table_name: table,
            data,
        };
        debug!(target: "api", "POST {} id={} table={}", url, id, table);
        let response = self.client.post(url).json(&request).send().await?;
        let body: MessageResponse = decode(check_status(response).await?).await?;
        Ok(body.message)
    }

    async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<String, ClientError> {
        let url = self.endpoint(&["rename_table"])?;
        debug!(target: "api", "POST {} {} -> {}", url, old_name, new_name);
        let response = self
            .client
            .post(url)
            .json(&RenameRequest { old_name, new_name })
            .send()
            .await?;
        let body: MessageResponse = decode(check_status(response).await?).await?;
        Ok(body.message)
    }

    async fn delete_table(&self, name: &str) -> Result<String, ClientError> {
        let url = self.endpoint(&["delete", name])?;
        debug!(target: "api", "DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        let body: MessageResponse = decode(check_status(response).await?).await?;
        Ok(body.message)
    }

    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<Vec<String>, ClientError> {
        let url = self.endpoint(&["upload"])?;
        debug!(target: "api", "POST {} file={} ({} bytes)", url, file_name, bytes.len());
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);
        let response = self.client.post(url).multipart(form).send().await?;
        let body: UploadResponse = decode(check_status(response).await?).await?;
        Ok(body.tables)
    }

    async fn export_table(
        &self,
        name: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, ClientError> {
        let url = self.endpoint(&["export", name])?;
        debug!(target: "api", "GET {} format={}", url, format);
        let response = self
            .client
            .get(url)
            .query(&[("format", format.as_str())])
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        message: error_message(status.as_u16(), &body),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

/// The `{"error": ...}` message when the body carries one
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

/// Record ids are numeric on the wire but kept as strings locally
fn wire_id(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(id.to_string()))
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid record id: {other}"
        ))),
    }
}
