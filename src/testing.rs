//! Testing utilities for sheet-browser
//!
//! [`ScriptedService`] is an in-process [`TableService`] holding a few tables
//! in memory. Latency and failures can be scripted per request so tests can
//! reorder responses on the virtual clock (`#[tokio::test(start_paused = true)]`).

use crate::api_client::{
    ClientError, ExportFormat, PageQuery, Record, RowData, SearchResult, TableInfo, TablePage,
    TableService,
};
use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

/// A request as received by [`ScriptedService`]
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListTables,
    FetchPage(PageQuery),
    Search { query: String, limit: usize },
    UpdateRow { table: String, id: String },
    RenameTable { old_name: String, new_name: String },
    DeleteTable(String),
    Upload(String),
    Export { table: String, format: ExportFormat },
}

#[derive(Debug, Clone)]
struct StoredTable {
    name: String,
    columns: Vec<String>,
    records: Vec<Record>,
}

#[derive(Default)]
pub struct ScriptedService {
    tables: RefCell<Vec<StoredTable>>,
    next_id: Cell<u64>,
    default_latency: Cell<Duration>,
    search_latency: RefCell<HashMap<String, Duration>>,
    page_latency: RefCell<HashMap<usize, Duration>>,
    failing_searches: RefCell<HashSet<String>>,
    failing_pages: RefCell<HashSet<usize>>,
    offline: Cell<bool>,
    requests: RefCell<Vec<Request>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table whose rows get sequential ids
    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<RowData>) -> Self {
        let records = rows
            .into_iter()
            .map(|data| {
                let id = self.next_id.get() + 1;
                self.next_id.set(id);
                Record {
                    id: id.to_string(),
                    data,
                }
            })
            .collect();
        self.tables.borrow_mut().push(StoredTable {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            records,
        });
        self
    }

    /// Latency applied to every request without a specific one
    pub fn with_latency(self, latency: Duration) -> Self {
        self.default_latency.set(latency);
        self
    }

    pub fn set_search_latency(&self, query: &str, latency: Duration) {
        self.search_latency
            .borrow_mut()
            .insert(query.to_string(), latency);
    }

    pub fn set_page_latency(&self, page: usize, latency: Duration) {
        self.page_latency.borrow_mut().insert(page, latency);
    }

    pub fn fail_search(&self, query: &str) {
        self.failing_searches.borrow_mut().insert(query.to_string());
    }

    pub fn fail_page(&self, page: usize) {
        self.failing_pages.borrow_mut().insert(page);
    }

    /// Every request fails as if the service were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn search_requests(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Request::Search { query, .. } => Some(query.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn page_requests(&self) -> Vec<PageQuery> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Request::FetchPage(query) => Some(query.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.borrow().iter().map(|t| t.name.clone()).collect()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<RowData> {
        self.tables
            .borrow()
            .iter()
            .find(|t| t.name == table)?
            .records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.data.clone())
    }

    async fn respond(&self, request: Request, latency: Option<Duration>) -> Result<(), ClientError> {
        self.requests.borrow_mut().push(request);
        let latency = latency.unwrap_or_else(|| self.default_latency.get());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.offline.get() {
            return Err(ClientError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(message: &str) -> ClientError {
        ClientError::Status {
            status: 404,
            message: message.to_string(),
        }
    }
}

/// Case-insensitive match against the row's serialized values
fn row_matches(data: &RowData, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    data.values().any(|value| match value {
        Value::String(s) => s.to_lowercase().contains(&needle),
        other => other.to_string().to_lowercase().contains(&needle),
    })
}

#[async_trait(?Send)]
impl TableService for ScriptedService {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError> {
        self.respond(Request::ListTables, None).await?;
        Ok(self
            .tables
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, t)| TableInfo {
                id: Some(i as i64 + 1),
                name: t.name.clone(),
                columns: t.columns.clone(),
                record_count: t.records.len(),
                created_at: None,
            })
            .collect())
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<TablePage, ClientError> {
        let latency = self.page_latency.borrow().get(&query.page).copied();
        self.respond(Request::FetchPage(query.clone()), latency)
            .await?;
        if self.failing_pages.borrow().contains(&query.page) {
            return Err(ClientError::Status {
                status: 500,
                message: "internal error".to_string(),
            });
        }

        let tables = self.tables.borrow();
        let table = tables
            .iter()
            .find(|t| t.name == query.table)
            .ok_or_else(|| Self::not_found("Table not found"))?;

        let matching: Vec<&Record> = table
            .records
            .iter()
            .filter(|r| query.search.is_empty() || row_matches(&r.data, &query.search))
            .collect();
        let per_page = query.per_page.max(1);
        let total = matching.len();
        let pages = total.div_ceil(per_page);
        let records = matching
            .into_iter()
            .skip((query.page.saturating_sub(1)) * per_page)
            .take(per_page)
            .cloned()
            .collect();

        Ok(TablePage {
            table_name: Some(table.name.clone()),
            columns: table.columns.clone(),
            records,
            total,
            pages,
            current_page: Some(query.page),
        })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ClientError> {
        let latency = self.search_latency.borrow().get(query).copied();
        self.respond(
            Request::Search {
                query: query.to_string(),
                limit,
            },
            latency,
        )
        .await?;
        if self.failing_searches.borrow().contains(query) {
            return Err(ClientError::Status {
                status: 500,
                message: "search backend failure".to_string(),
            });
        }
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let tables = self.tables.borrow();
        let mut results = Vec::new();
        for table in tables.iter() {
            results.extend(
                table
                    .records
                    .iter()
                    .filter(|r| row_matches(&r.data, query))
                    .take(limit)
                    .map(|r| SearchResult {
                        table: table.name.clone(),
                        data: r.data.clone(),
                    }),
            );
        }
        Ok(results)
    }

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        data: &RowData,
    ) -> Result<String, ClientError> {
        self.respond(
            Request::UpdateRow {
                table: table.to_string(),
                id: id.to_string(),
            },
            None,
        )
        .await?;
        if data.is_empty() {
            return Err(ClientError::Status {
                status: 400,
                message: "id, table_name, and data are required.".to_string(),
            });
        }
        let mut tables = self.tables.borrow_mut();
        let record = tables
            .iter_mut()
            .find(|t| t.name == table)
            .and_then(|t| t.records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| Self::not_found("Row not found."))?;
        record.data = data.clone();
        Ok("Row updated successfully.".to_string())
    }

    async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<String, ClientError> {
        self.respond(
            Request::RenameTable {
                old_name: old_name.to_string(),
                new_name: new_name.to_string(),
            },
            None,
        )
        .await?;
        let mut tables = self.tables.borrow_mut();
        if tables.iter().any(|t| t.name == new_name) {
            return Err(ClientError::Status {
                status: 400,
                message: "A table with the new name already exists.".to_string(),
            });
        }
        let table = tables
            .iter_mut()
            .find(|t| t.name == old_name)
            .ok_or_else(|| Self::not_found("Table not found."))?;
        table.name = new_name.to_string();
        Ok("Table renamed successfully.".to_string())
    }

    async fn delete_table(&self, name: &str) -> Result<String, ClientError> {
        self.respond(Request::DeleteTable(name.to_string()), None)
            .await?;
        let mut tables = self.tables.borrow_mut();
        let before = tables.len();
        tables.retain(|t| t.name != name);
        if tables.len() == before {
            return Err(Self::not_found("Table not found"));
        }
        Ok("Table deleted successfully".to_string())
    }

    async fn upload(&self, file_name: &str, _bytes: Vec<u8>) -> Result<Vec<String>, ClientError> {
        self.respond(Request::Upload(file_name.to_string()), None)
            .await?;
        let stem = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name)
            .replace(' ', "_");
        self.tables.borrow_mut().push(StoredTable {
            name: stem.clone(),
            columns: Vec::new(),
            records: Vec::new(),
        });
        Ok(vec![stem])
    }

    async fn export_table(
        &self,
        name: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, ClientError> {
        self.respond(
            Request::Export {
                table: name.to_string(),
                format,
            },
            None,
        )
        .await?;
        if !self.tables.borrow().iter().any(|t| t.name == name) {
            return Err(Self::not_found("Table not found"));
        }
        Ok(format!("{name}.{format}").into_bytes())
    }
}

/// Build a row from column/value pairs
pub fn row(pairs: &[(&str, &str)]) -> RowData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Run `future` on a fresh `LocalSet`
pub async fn run_local<F: Future>(future: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(future).await
}
