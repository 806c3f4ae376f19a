//! TableCatalog - the table list and the mutations that change it
//!
//! Mutations are awaited to completion and never superseded. Local state only
//! changes after the remote side confirmed the change.

use crate::api_client::{ClientError, ExportFormat, RowData, TableInfo, TableService};
use crate::notify::{Notice, Notifier};
use crate::state::{StateDispatcher, StateEvent};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{info, warn};

/// File types the upload endpoint accepts
pub const UPLOAD_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

pub struct TableCatalog {
    client: Rc<dyn TableService>,
    notifier: Rc<dyn Notifier>,
    dispatcher: Rc<StateDispatcher>,
    tables: RefCell<Rc<[TableInfo]>>,
}

impl TableCatalog {
    pub fn new(
        client: Rc<dyn TableService>,
        notifier: Rc<dyn Notifier>,
        dispatcher: Rc<StateDispatcher>,
    ) -> Self {
        Self {
            client,
            notifier,
            dispatcher,
            tables: RefCell::new(Rc::from(Vec::new())),
        }
    }

    pub fn tables(&self) -> Rc<[TableInfo]> {
        Rc::clone(&self.tables.borrow())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.borrow().iter().any(|t| t.name == name)
    }

    /// Reload the table list. On failure the previous list is kept.
    pub async fn refresh(&self) -> bool {
        match self.client.list_tables().await {
            Ok(tables) => {
                info!(target: "catalog", "Loaded {} tables", tables.len());
                let tables: Rc<[TableInfo]> = Rc::from(tables);
                *self.tables.borrow_mut() = Rc::clone(&tables);
                self.dispatcher
                    .dispatch(StateEvent::TablesChanged { tables });
                true
            }
            Err(e) => {
                warn!(target: "catalog", "Listing tables failed: {}", e);
                self.notifier
                    .notify(Notice::error(format!("Tables could not be loaded: {e}")));
                false
            }
        }
    }

    pub async fn delete(&self, name: &str) -> bool {
        match self.client.delete_table(name).await {
            Ok(_) => {
                info!(target: "catalog", "Deleted table '{}'", name);
                self.notifier
                    .notify(Notice::success("Table deleted successfully"));
                self.refresh().await;
                true
            }
            Err(e) => {
                self.reject("delete", format!("Delete error: {e}"));
                false
            }
        }
    }

    pub async fn rename(&self, old_name: &str, new_name: &str) -> bool {
        let new_name = new_name.trim();
        if old_name.trim().is_empty() || new_name.is_empty() {
            self.reject("rename", "Table name cannot be empty".to_string());
            return false;
        }
        if old_name == new_name {
            self.reject("rename", "The new name is the same as the current one".to_string());
            return false;
        }

        match self.client.rename_table(old_name, new_name).await {
            Ok(_) => {
                info!(target: "catalog", "Renamed table '{}' to '{}'", old_name, new_name);
                self.notifier.notify(Notice::success("Table renamed"));
                self.refresh().await;
                true
            }
            Err(e) => {
                self.reject("rename", mutation_error(&e));
                false
            }
        }
    }

    pub async fn update_row(&self, table: &str, id: &str, data: &RowData) -> bool {
        match self.client.update_row(table, id, data).await {
            Ok(_) => {
                info!(target: "catalog", "Updated row {} of '{}'", id, table);
                self.notifier.notify(Notice::success("Row updated"));
                true
            }
            Err(e) => {
                self.reject("update", mutation_error(&e));
                false
            }
        }
    }

    /// Upload a spreadsheet; returns the names of the tables it created
    pub async fn upload(&self, path: &Path) -> Option<Vec<String>> {
        if let Err(e) = check_upload_type(path) {
            self.reject("upload", e.to_string());
            return None;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let outcome = match tokio::fs::read(path).await {
            Ok(bytes) => self.client.upload(&file_name, bytes).await,
            Err(e) => Err(ClientError::Io(e)),
        };

        match outcome {
            Ok(created) => {
                info!(target: "catalog", "Uploaded '{}' as {:?}", file_name, created);
                self.notifier.notify(Notice::success(format!(
                    "File uploaded successfully! Created tables: {}",
                    created.join(", ")
                )));
                self.refresh().await;
                Some(created)
            }
            Err(e) => {
                self.reject("upload", format!("Upload error: {e}"));
                None
            }
        }
    }

    /// Download `name` in `format` and write it to `dest`
    pub async fn export(&self, name: &str, format: ExportFormat, dest: &Path) -> bool {
        self.notifier.notify(Notice::info("Downloading file..."));

        let outcome = match self.client.export_table(name, format).await {
            Ok(bytes) => tokio::fs::write(dest, bytes).await.map_err(ClientError::Io),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(target: "catalog", "Exported '{}' as {} to {}", name, format, dest.display());
                self.notifier
                    .notify(Notice::success("Download completed successfully"));
                true
            }
            Err(e) => {
                self.reject("export", format!("Download failed: {e}"));
                false
            }
        }
    }

    fn reject(&self, operation: &str, message: String) {
        warn!(target: "catalog", "{} rejected: {}", operation, message);
        self.notifier.notify(Notice::error(message));
    }
}

/// Rejections carry the remote message as is; transport failures get a prefix
fn mutation_error(error: &ClientError) -> String {
    match error {
        ClientError::Status { message, .. } | ClientError::Invalid(message) => message.clone(),
        other => format!("Server error: {other}"),
    }
}

pub fn check_upload_type(path: &Path) -> Result<(), ClientError> {
    let accepted = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            UPLOAD_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        });
    if accepted {
        Ok(())
    } else {
        Err(ClientError::Invalid(
            "Please select a valid Excel file (.xlsx, .xls, .csv)".to_string(),
        ))
    }
}
