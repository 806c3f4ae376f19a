use crate::api_client::{ExportFormat, Record, RowData, TableService};
use crate::config::Config;
use crate::core::catalog::TableCatalog;
use crate::core::pagination::PaginationController;
use crate::core::result_aggregator::{self, ResultGroup};
use crate::core::result_filter::ResultFilterEngine;
use crate::core::search_coordinator::SearchCoordinator;
use crate::core::selection::SelectionTracker;
use crate::export::write_records_csv;
use crate::notify::{Notice, Notifier};
use crate::state::StateDispatcher;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

const SETTLE_POLL: Duration = Duration::from_millis(10);

/// Owns every controller of one browsing session and wires them together.
///
/// Search results flow SearchCoordinator -> ResultFilterEngine, page changes
/// flow PaginationController -> SelectionTracker, both through the dispatcher.
/// Catalog mutations are followed up here so the page view never shows a
/// table that no longer exists.
pub struct BrowserSession {
    notifier: Rc<dyn Notifier>,
    dispatcher: Rc<StateDispatcher>,
    search: Rc<SearchCoordinator>,
    filter: Rc<ResultFilterEngine>,
    pagination: Rc<PaginationController>,
    selection: Rc<SelectionTracker>,
    catalog: TableCatalog,
}

impl BrowserSession {
    pub fn new(client: Rc<dyn TableService>, notifier: Rc<dyn Notifier>, config: &Config) -> Self {
        let dispatcher = Rc::new(StateDispatcher::new());

        let search = SearchCoordinator::new(
            Rc::clone(&client),
            Rc::clone(&notifier),
            Rc::clone(&dispatcher),
            config.search.clone(),
        );
        let filter = ResultFilterEngine::new(
            Rc::clone(&client),
            Rc::clone(&notifier),
            Rc::clone(&dispatcher),
            config.filter.clone(),
            config.search.result_limit,
        );
        let pagination = PaginationController::new(
            Rc::clone(&client),
            Rc::clone(&notifier),
            Rc::clone(&dispatcher),
            config.paging.clone(),
        );
        let selection = SelectionTracker::new();
        dispatcher.subscribe(&selection);
        let catalog = TableCatalog::new(client, Rc::clone(&notifier), Rc::clone(&dispatcher));

        Self {
            notifier,
            dispatcher,
            search,
            filter,
            pagination,
            selection,
            catalog,
        }
    }

    /// Load the table list
    pub async fn start(&self) -> bool {
        self.catalog.refresh().await
    }

    // Global search

    pub fn submit_search(&self, query: &str) -> bool {
        self.search.submit(query)
    }

    pub fn clear_search(&self) {
        self.search.clear();
    }

    pub fn set_filter_text(&self, text: &str) {
        self.filter.set_filter_text(text);
    }

    /// Visible search results grouped by table
    pub fn grouped_results(&self) -> Vec<ResultGroup> {
        result_aggregator::group(&self.filter.visible_results())
    }

    // Browsing

    pub fn open_table(&self, name: &str) {
        self.pagination.select_table(name);
    }

    pub fn find_in_table(&self, term: &str) -> bool {
        self.pagination.search_in_table(term)
    }

    pub fn go_to_page(&self, page: usize) -> bool {
        self.pagination.go_to_page(page)
    }

    pub fn next_page(&self) -> bool {
        self.pagination.next_page()
    }

    pub fn previous_page(&self) -> bool {
        self.pagination.previous_page()
    }

    // Selection

    pub fn toggle_row(&self, id: &str) -> bool {
        self.selection.toggle(id)
    }

    pub fn select_all(&self) {
        self.selection.select_all();
    }

    pub fn clear_selection(&self) {
        self.selection.clear();
    }

    pub fn selected_records(&self) -> Vec<Record> {
        self.selection.selected_records()
    }

    /// Write the selected rows of the visible page to a CSV file
    pub fn export_selected(&self, dest: &Path) -> bool {
        let records = self.selection.selected_records();
        let Some(window) = self.pagination.window() else {
            return false;
        };
        if records.is_empty() {
            return false;
        }

        self.notifier
            .notify(Notice::info("Exporting selected rows..."));
        match write_records_csv(dest, &window.columns, &records) {
            Ok(count) => {
                info!(target: "session", "Exported {} selected rows to {}", count, dest.display());
                self.notifier
                    .notify(Notice::success("Selected rows exported successfully"));
                true
            }
            Err(e) => {
                warn!(target: "session", "Exporting selected rows failed: {:#}", e);
                self.notifier
                    .notify(Notice::error(format!("Export failed: {e:#}")));
                false
            }
        }
    }

    // Catalog mutations

    pub async fn refresh_tables(&self) -> bool {
        self.catalog.refresh().await
    }

    pub async fn delete_table(&self, name: &str) -> bool {
        let deleted = self.catalog.delete(name).await;
        if deleted {
            self.pagination.forget_table(name);
        }
        deleted
    }

    pub async fn rename_table(&self, old_name: &str, new_name: &str) -> bool {
        let renamed = self.catalog.rename(old_name, new_name).await;
        if renamed {
            self.pagination.rename_table(old_name, new_name.trim());
        }
        renamed
    }

    /// Update a row of the selected table and reload the page on success
    pub async fn update_row(&self, id: &str, data: &RowData) -> bool {
        let Some(table) = self.pagination.selected_table() else {
            self.notifier.notify(Notice::error("Select a table first"));
            return false;
        };
        let updated = self.catalog.update_row(&table, id, data).await;
        if updated {
            self.pagination.refresh();
        }
        updated
    }

    pub async fn upload(&self, path: &Path) -> Option<Vec<String>> {
        self.catalog.upload(path).await
    }

    pub async fn export_table(&self, name: &str, format: ExportFormat, dest: &Path) -> bool {
        self.catalog.export(name, format, dest).await
    }

    /// True while any debounced submission or read request is outstanding
    pub fn is_busy(&self) -> bool {
        self.search.is_busy() || self.filter.is_busy() || self.pagination.is_busy()
    }

    /// Wait until nothing is outstanding or `timeout` elapses.
    /// Returns false on timeout.
    pub async fn settle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        // Let freshly scheduled tasks register before the first check
        tokio::task::yield_now().await;
        while self.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(SETTLE_POLL).await;
        }
        true
    }

    pub fn search(&self) -> &Rc<SearchCoordinator> {
        &self.search
    }

    pub fn filter(&self) -> &Rc<ResultFilterEngine> {
        &self.filter
    }

    pub fn pagination(&self) -> &Rc<PaginationController> {
        &self.pagination
    }

    pub fn selection(&self) -> &Rc<SelectionTracker> {
        &self.selection
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn dispatcher(&self) -> &Rc<StateDispatcher> {
        &self.dispatcher
    }
}
