//! PaginationController - one page of the selected table at a time
//!
//! Page changes go through a short minimum delay so rapid clicks don't flicker
//! the loading state, and every fetch takes a token from the `page` channel so
//! that only the response for the latest request replaces the window.

use crate::api_client::{PageQuery, Record, TablePage, TableService};
use crate::config::config::PagingConfig;
use crate::core::channel::{RequestChannel, RequestToken};
use crate::notify::{Notice, Notifier};
use crate::state::{StateDispatcher, StateEvent};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The rows of one page plus the totals needed to navigate
#[derive(Debug, Clone, PartialEq)]
pub struct PageWindow {
    pub table_name: String,
    /// 1-based
    pub page_number: usize,
    pub page_size: usize,
    pub total_records: usize,
    pub total_pages: usize,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
    /// In-table search the page was fetched with
    pub search_term: String,
}

impl PageWindow {
    /// Build a window from a page response, keeping the page number in range
    pub fn from_page(
        table_name: &str,
        requested_page: usize,
        page_size: usize,
        search_term: &str,
        page: TablePage,
    ) -> Self {
        let total_pages = if page.pages == 0 && page.total > 0 {
            page.total.div_ceil(page_size.max(1))
        } else {
            page.pages
        };
        let page_number = page
            .current_page
            .unwrap_or(requested_page)
            .clamp(1, total_pages.max(1));

        let mut records = page.records;
        records.truncate(page_size);

        Self {
            table_name: page.table_name.unwrap_or_else(|| table_name.to_string()),
            page_number,
            page_size,
            total_records: page.total,
            total_pages,
            columns: page.columns,
            records,
            search_term: search_term.to_string(),
        }
    }

    pub fn empty(table_name: &str, page_size: usize, search_term: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            page_number: 1,
            page_size,
            total_records: 0,
            total_pages: 0,
            columns: Vec::new(),
            records: Vec::new(),
            search_term: search_term.to_string(),
        }
    }

    /// Same page and totals without any rows
    pub fn emptied(&self) -> Self {
        Self {
            records: Vec::new(),
            ..self.clone()
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages
    }

    pub fn record_ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }
}

/// Page numbers to offer around `current`, at most `width` of them
pub fn page_strip(current: usize, total: usize, width: usize) -> Vec<usize> {
    if total == 0 || width == 0 {
        return Vec::new();
    }
    if total <= width {
        return (1..=total).collect();
    }

    let half = width / 2;
    let start = if current <= half + 1 {
        1
    } else if current + half >= total {
        total - width + 1
    } else {
        current - half
    };
    (start..start + width).collect()
}

pub struct PaginationController {
    client: Rc<dyn TableService>,
    notifier: Rc<dyn Notifier>,
    dispatcher: Rc<StateDispatcher>,
    config: PagingConfig,
    channel: RequestChannel,
    selected: RefCell<Option<String>>,
    search_term: RefCell<String>,
    window: RefCell<Option<Rc<PageWindow>>>,
    loading: Cell<bool>,
    pending_page: Cell<Option<usize>>,
    in_flight: Cell<Option<RequestToken>>,
}

impl PaginationController {
    pub fn new(
        client: Rc<dyn TableService>,
        notifier: Rc<dyn Notifier>,
        dispatcher: Rc<StateDispatcher>,
        config: PagingConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            client,
            notifier,
            dispatcher,
            config,
            channel: RequestChannel::new("page"),
            selected: RefCell::new(None),
            search_term: RefCell::new(String::new()),
            window: RefCell::new(None),
            loading: Cell::new(false),
            pending_page: Cell::new(None),
            in_flight: Cell::new(None),
        })
    }

    /// Switch to `name` and load its first page without an in-table search
    pub fn select_table(self: &Rc<Self>, name: &str) {
        info!(target: "pagination", "Selecting table '{}'", name);
        *self.selected.borrow_mut() = Some(name.to_string());
        self.search_term.borrow_mut().clear();
        *self.window.borrow_mut() = None;

        self.dispatcher.dispatch(StateEvent::TableSwitched {
            table: Some(name.to_string()),
        });
        self.fetch(name.to_string(), 1, String::new(), Duration::ZERO);
    }

    /// Search inside the selected table, starting over at page 1.
    /// Returns false when no table is selected.
    pub fn search_in_table(self: &Rc<Self>, term: &str) -> bool {
        let Some(table) = self.selected_table() else {
            debug!(target: "pagination", "In-table search without a selected table");
            return false;
        };
        let term = if term.trim().is_empty() {
            String::new()
        } else {
            term.to_string()
        };
        *self.search_term.borrow_mut() = term.clone();

        self.dispatcher.dispatch(StateEvent::PageChangeStarted {
            table: table.clone(),
            page: 1,
            search_term: term.clone(),
        });
        self.fetch(table, 1, term, Duration::ZERO);
        true
    }

    /// Request page `n` of the selected table.
    /// Returns false, changing nothing, for out-of-range or redundant requests.
    pub fn go_to_page(self: &Rc<Self>, n: usize) -> bool {
        let Some(table) = self.selected_table() else {
            debug!(target: "pagination", "Ignoring page {} without a selected table", n);
            return false;
        };
        let Some(window) = self.window() else {
            debug!(target: "pagination", "Ignoring page {} before the first page loaded", n);
            return false;
        };

        if n < 1 || n > window.total_pages {
            debug!(target: "pagination", "Page {} out of range 1..={}", n, window.total_pages);
            return false;
        }
        if n == window.page_number || self.pending_page.get() == Some(n) {
            debug!(target: "pagination", "Page {} already shown or loading", n);
            return false;
        }

        let term = self.search_term();
        self.dispatcher.dispatch(StateEvent::PageChangeStarted {
            table: table.clone(),
            page: n,
            search_term: term.clone(),
        });
        self.fetch(table, n, term, self.config.min_flip());
        true
    }

    pub fn next_page(self: &Rc<Self>) -> bool {
        let current = self.current_page();
        self.go_to_page(current + 1)
    }

    pub fn previous_page(self: &Rc<Self>) -> bool {
        let current = self.current_page();
        current > 1 && self.go_to_page(current - 1)
    }

    /// Re-fetch the current page, e.g. after a row was edited.
    /// A page change still loading is re-fetched instead of the page it replaces.
    pub fn refresh(self: &Rc<Self>) {
        if let Some(table) = self.selected_table() {
            let page = self
                .pending_page
                .get()
                .unwrap_or_else(|| self.current_page());
            self.fetch(table, page, self.search_term(), Duration::ZERO);
        }
    }

    /// Drop the selection if `name` is the selected table
    pub fn forget_table(&self, name: &str) {
        if self.selected.borrow().as_deref() != Some(name) {
            return;
        }
        info!(target: "pagination", "Table '{}' is gone, clearing the page view", name);
        self.channel.invalidate();
        *self.selected.borrow_mut() = None;
        *self.window.borrow_mut() = None;
        self.search_term.borrow_mut().clear();
        self.settle();
        self.dispatcher
            .dispatch(StateEvent::TableSwitched { table: None });
    }

    /// Follow a rename of the selected table; other renames leave the view alone
    pub fn rename_table(self: &Rc<Self>, old_name: &str, new_name: &str) {
        if self.selected.borrow().as_deref() != Some(old_name) {
            return;
        }
        debug!(target: "pagination", "Following rename '{}' -> '{}'", old_name, new_name);
        self.select_table(new_name);
    }

    fn fetch(self: &Rc<Self>, table: String, page: usize, term: String, min_delay: Duration) {
        let token = self.channel.issue();
        self.in_flight.set(Some(token));
        self.pending_page.set(Some(page));
        self.loading.set(true);

        let this = Rc::clone(self);
        tokio::task::spawn_local(async move {
            if !min_delay.is_zero() {
                tokio::time::sleep(min_delay).await;
            }
            if !this.channel.is_current(token) {
                debug!(target: "pagination", "Page {} of '{}' superseded before fetch ({})", page, table, token);
                return;
            }

            let query = PageQuery {
                table: table.clone(),
                page,
                per_page: this.config.page_size,
                search: term.clone(),
            };
            debug!(target: "pagination", "Fetching page {} of '{}' ({})", page, table, token);
            let outcome = this.client.fetch_page(&query).await;

            let still_selected = this.selected.borrow().as_deref() == Some(table.as_str());
            if !this.channel.is_current(token) || !still_selected {
                debug!(target: "pagination", "Dropping stale page {} of '{}' ({})", page, table, token);
                return;
            }
            this.settle();

            let window = match outcome {
                Ok(response) => {
                    let window =
                        PageWindow::from_page(&table, page, this.config.page_size, &term, response);
                    info!(
                        target: "pagination",
                        "'{}' page {}/{} ({} records)",
                        table, window.page_number, window.total_pages, window.total_records
                    );
                    window
                }
                Err(e) => {
                    warn!(target: "pagination", "Loading page {} of '{}' failed: {}", page, table, e);
                    this.notifier
                        .notify(Notice::error(format!("Table data could not be loaded: {e}")));
                    match this.window() {
                        Some(previous) if previous.table_name == table => previous.emptied(),
                        _ => PageWindow::empty(&table, this.config.page_size, &term),
                    }
                }
            };

            let window = Rc::new(window);
            *this.window.borrow_mut() = Some(Rc::clone(&window));
            this.dispatcher
                .dispatch(StateEvent::PageCommitted { window });
        });
    }

    fn settle(&self) {
        self.in_flight.set(None);
        self.pending_page.set(None);
        self.loading.set(false);
    }

    pub fn selected_table(&self) -> Option<String> {
        self.selected.borrow().clone()
    }

    pub fn search_term(&self) -> String {
        self.search_term.borrow().clone()
    }

    pub fn window(&self) -> Option<Rc<PageWindow>> {
        self.window.borrow().clone()
    }

    pub fn current_page(&self) -> usize {
        self.window
            .borrow()
            .as_ref()
            .map_or(1, |w| w.page_number)
    }

    /// Page numbers to offer for the current window
    pub fn strip(&self) -> Vec<usize> {
        match self.window() {
            Some(window) => page_strip(
                window.page_number,
                window.total_pages,
                self.config.strip_width,
            ),
            None => Vec::new(),
        }
    }

    pub fn pending_page(&self) -> Option<usize> {
        self.pending_page.get()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoticeLog;
    use crate::testing::{row, run_local, ScriptedService};
    use tokio::time::sleep;

    fn orders(count: usize) -> Vec<crate::api_client::RowData> {
        (1..=count)
            .map(|i| {
                let customer = if i % 3 == 0 { "acme" } else { "globex" };
                row(&[("customer", customer), ("order", &format!("#{i}"))])
            })
            .collect()
    }

    fn controller(
        service: &Rc<ScriptedService>,
    ) -> (Rc<PaginationController>, Rc<NoticeLog>, Rc<StateDispatcher>) {
        let notices = Rc::new(NoticeLog::new());
        let dispatcher = Rc::new(StateDispatcher::new());
        let controller = PaginationController::new(
            service.clone(),
            notices.clone(),
            dispatcher.clone(),
            PagingConfig::default(),
        );
        (controller, notices, dispatcher)
    }

    fn service() -> Rc<ScriptedService> {
        Rc::new(
            ScriptedService::new()
                .with_table("Orders", &["customer", "order"], orders(45))
                .with_table("Clients", &["name"], vec![row(&[("name", "acme")])])
                .with_latency(Duration::from_millis(30)),
        )
    }

    #[test]
    fn test_page_strip() {
        assert_eq!(page_strip(1, 3, 5), vec![1, 2, 3]);
        assert_eq!(page_strip(1, 10, 5), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_strip(3, 10, 5), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_strip(4, 10, 5), vec![2, 3, 4, 5, 6]);
        assert_eq!(page_strip(8, 10, 5), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_strip(10, 10, 5), vec![6, 7, 8, 9, 10]);
        assert!(page_strip(1, 0, 5).is_empty());
    }

    #[test]
    fn test_window_clamps_and_truncates() {
        let page = TablePage {
            table_name: None,
            columns: vec!["name".to_string()],
            records: (0..25)
                .map(|i| Record {
                    id: i.to_string(),
                    data: row(&[("name", "x")]),
                })
                .collect(),
            total: 45,
            pages: 3,
            current_page: Some(9),
        };
        let window = PageWindow::from_page("Orders", 9, 20, "", page);

        assert_eq!(window.table_name, "Orders");
        assert_eq!(window.page_number, 3);
        assert_eq!(window.records.len(), 20);
        assert!(!window.has_next());
        assert!(window.has_previous());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_table_loads_first_page() {
        run_local(async {
            let service = service();
            let (controller, _, dispatcher) = controller(&service);

            controller.select_table("Orders");
            assert!(controller.is_loading());
            sleep(Duration::from_millis(100)).await;

            let window = controller.window().unwrap();
            assert_eq!(window.page_number, 1);
            assert_eq!(window.total_records, 45);
            assert_eq!(window.total_pages, 3);
            assert_eq!(window.records.len(), 20);
            assert!(!controller.is_loading());
            assert_eq!(
                dispatcher.event_history(),
                vec!["table-switched", "page-committed"]
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_page_request_is_noop() {
        run_local(async {
            let service = service();
            let (controller, _, _) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            assert!(controller.go_to_page(2));
            assert!(!controller.go_to_page(2));
            sleep(Duration::from_millis(500)).await;
            assert!(!controller.go_to_page(2));

            assert_eq!(controller.current_page(), 2);
            let pages: Vec<usize> = service.page_requests().iter().map(|q| q.page).collect();
            assert_eq!(pages, vec![1, 2]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_pages_rejected() {
        run_local(async {
            let service = service();
            let (controller, _, _) = controller(&service);

            // Nothing selected yet
            assert!(!controller.go_to_page(2));

            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            assert!(!controller.go_to_page(0));
            assert!(!controller.go_to_page(4));
            assert!(!controller.previous_page());
            sleep(Duration::from_millis(500)).await;

            assert_eq!(controller.current_page(), 1);
            assert_eq!(service.page_requests().len(), 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_flip_delay() {
        run_local(async {
            let service = service();
            let (controller, _, _) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            controller.go_to_page(2);
            sleep(Duration::from_millis(100)).await;
            assert_eq!(service.page_requests().len(), 1);
            assert!(controller.is_loading());

            sleep(Duration::from_millis(100)).await;
            assert_eq!(service.page_requests().len(), 2);

            sleep(Duration::from_millis(100)).await;
            assert!(!controller.is_loading());
            assert_eq!(controller.current_page(), 2);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_page_request_wins() {
        run_local(async {
            let service = service();
            service.set_page_latency(2, Duration::from_millis(500));
            let (controller, _, _) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            controller.go_to_page(2);
            // Let the request for page 2 go out
            sleep(Duration::from_millis(200)).await;
            controller.go_to_page(3);
            sleep(Duration::from_secs(1)).await;

            let window = controller.window().unwrap();
            assert_eq!(window.page_number, 3);
            assert_eq!(window.records.len(), 5);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_requests_skip_superseded_fetch() {
        run_local(async {
            let service = service();
            let (controller, _, _) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            controller.go_to_page(2);
            sleep(Duration::from_millis(50)).await;
            controller.go_to_page(3);
            sleep(Duration::from_secs(1)).await;

            let pages: Vec<usize> = service.page_requests().iter().map(|q| q.page).collect();
            assert_eq!(pages, vec![1, 3]);
            assert_eq!(controller.current_page(), 3);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_table_drops_old_response() {
        run_local(async {
            let service = service();
            service.set_page_latency(1, Duration::from_millis(300));
            let (controller, _, _) = controller(&service);

            controller.select_table("Orders");
            sleep(Duration::from_millis(50)).await;
            service.set_page_latency(1, Duration::from_millis(10));
            controller.select_table("Clients");
            sleep(Duration::from_secs(1)).await;

            let window = controller.window().unwrap();
            assert_eq!(window.table_name, "Clients");
            assert_eq!(window.total_records, 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_table_search_starts_at_page_one() {
        run_local(async {
            let service = service();
            let (controller, _, _) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;
            controller.go_to_page(3);
            sleep(Duration::from_millis(500)).await;

            assert!(controller.search_in_table("acme"));
            sleep(Duration::from_millis(100)).await;

            let window = controller.window().unwrap();
            assert_eq!(window.page_number, 1);
            assert_eq!(window.total_records, 15);
            assert_eq!(window.search_term, "acme");

            // The term sticks for later page changes and is dropped on table switch
            assert!(!controller.go_to_page(2));
            controller.select_table("Orders");
            assert_eq!(controller.search_term(), "");
            sleep(Duration::from_millis(100)).await;
            let last = service.page_requests().pop().unwrap();
            assert_eq!(last.search, "");
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_keeps_position_without_rows() {
        run_local(async {
            let service = service();
            service.fail_page(2);
            let (controller, notices, _) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            controller.go_to_page(2);
            sleep(Duration::from_millis(500)).await;

            let window = controller.window().unwrap();
            assert_eq!(window.page_number, 1);
            assert_eq!(window.total_pages, 3);
            assert!(window.records.is_empty());
            assert_eq!(notices.errors().len(), 1);
            assert!(!controller.is_loading());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_selected_table() {
        run_local(async {
            let service = service();
            let (controller, _, dispatcher) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            controller.forget_table("Clients");
            assert_eq!(controller.selected_table().as_deref(), Some("Orders"));

            controller.forget_table("Orders");
            assert!(controller.selected_table().is_none());
            assert!(controller.window().is_none());
            assert_eq!(
                dispatcher.event_history().last().copied(),
                Some("table-switched")
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_during_page_change_keeps_target_page() {
        run_local(async {
            let service = service();
            let (controller, _, _) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;

            assert!(controller.go_to_page(2));
            controller.refresh();
            assert_eq!(controller.pending_page(), Some(2));
            sleep(Duration::from_secs(1)).await;

            assert_eq!(controller.current_page(), 2);
            let pages: Vec<usize> = service.page_requests().iter().map(|q| q.page).collect();
            assert_eq!(pages, vec![1, 2]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_of_other_table_keeps_view() {
        run_local(async {
            let service = service();
            let (controller, _, dispatcher) = controller(&service);
            controller.select_table("Orders");
            sleep(Duration::from_millis(100)).await;
            let history = dispatcher.event_history();

            controller.rename_table("Clients", "Customers");
            assert_eq!(controller.selected_table().as_deref(), Some("Orders"));
            assert_eq!(dispatcher.event_history(), history);

            controller.rename_table("Orders", "Sales");
            assert_eq!(controller.selected_table().as_deref(), Some("Sales"));
        })
        .await;
    }
}
