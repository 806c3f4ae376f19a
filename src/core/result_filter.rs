//! ResultFilterEngine - narrows the committed search results
//!
//! The filter text starts out mirroring the submitted query. While it is blank
//! or identical to that query the already-fetched results are shown as they
//! are. Any other text is sent to the search endpoint once the user has stopped
//! typing for the debounce period, and only the response for the text that is
//! still in the box when it arrives is shown.

use crate::api_client::TableService;
use crate::config::config::FilterConfig;
use crate::core::channel::{RequestChannel, RequestToken};
use crate::core::{empty_results, SharedResults};
use crate::debouncer::DebouncedTasks;
use crate::notify::{Notice, Notifier};
use crate::state::{StateDispatcher, StateEvent, StateSubscriber};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, warn};

const FILTER_KEY: &str = "filter";
const INDICATOR_KEY: &str = "filter-indicator";

/// Snapshot of the filtered view
#[derive(Debug, Clone)]
pub struct FilterView {
    pub filter_text: String,
    pub visible_results: SharedResults,
}

struct FilterState {
    /// Query of the committed search, empty when none has run
    query: String,
    has_search: bool,
    base: SharedResults,
    filter_text: String,
    visible: SharedResults,
}

impl FilterState {
    fn new() -> Self {
        Self {
            query: String::new(),
            has_search: false,
            base: empty_results(),
            filter_text: String::new(),
            visible: empty_results(),
        }
    }
}

/// True when `text` should show the unfiltered search results
pub fn is_passthrough(text: &str, query: &str) -> bool {
    text.trim().is_empty() || text == query
}

pub struct ResultFilterEngine {
    client: Rc<dyn TableService>,
    notifier: Rc<dyn Notifier>,
    dispatcher: Rc<StateDispatcher>,
    config: FilterConfig,
    search_limit: usize,
    tasks: DebouncedTasks,
    channel: RequestChannel,
    state: RefCell<FilterState>,
    filtering: Cell<bool>,
    in_flight: Cell<Option<RequestToken>>,
}

impl ResultFilterEngine {
    pub fn new(
        client: Rc<dyn TableService>,
        notifier: Rc<dyn Notifier>,
        dispatcher: Rc<StateDispatcher>,
        config: FilterConfig,
        search_limit: usize,
    ) -> Rc<Self> {
        let engine = Rc::new(Self {
            client,
            notifier,
            dispatcher: Rc::clone(&dispatcher),
            config,
            search_limit,
            tasks: DebouncedTasks::new(),
            channel: RequestChannel::new("filter"),
            state: RefCell::new(FilterState::new()),
            filtering: Cell::new(false),
            in_flight: Cell::new(None),
        });
        dispatcher.subscribe(&engine);
        engine
    }

    /// Record an edit of the filter box
    pub fn set_filter_text(self: &Rc<Self>, text: &str) {
        let (passthrough, has_search) = {
            let mut state = self.state.borrow_mut();
            state.filter_text = text.to_string();
            (is_passthrough(text, &state.query), state.has_search)
        };

        if passthrough {
            self.show_base();
            return;
        }
        if !has_search {
            debug!(target: "filter", "No search results to filter yet");
            return;
        }

        let this = Rc::clone(self);
        let text = text.to_string();
        self.tasks
            .schedule(FILTER_KEY, self.config.debounce(), move || async move {
                this.run(text).await
            });
    }

    async fn run(self: Rc<Self>, text: String) {
        let token = self.channel.issue();
        self.in_flight.set(Some(token));

        let watcher = Rc::clone(&self);
        self.tasks
            .schedule(INDICATOR_KEY, self.config.loading_grace(), move || async move {
                if watcher.in_flight.get() == Some(token) {
                    watcher.filtering.set(true);
                }
            });

        debug!(target: "filter", "Filtering results with '{}' ({})", text, token);
        let outcome = self.client.search(&text, self.search_limit).await;

        let still_wanted =
            self.channel.is_current(token) && self.state.borrow().filter_text == text;
        if !still_wanted {
            debug!(target: "filter", "Dropping stale filter response for '{}' ({})", text, token);
            return;
        }
        self.settle();

        let visible: SharedResults = match outcome {
            Ok(results) => {
                info!(target: "filter", "Filter '{}' matched {} results", text, results.len());
                Rc::from(results)
            }
            Err(e) => {
                warn!(target: "filter", "Filter '{}' failed: {}", text, e);
                self.notifier.notify(Notice::error(format!("Search error: {e}")));
                empty_results()
            }
        };
        self.publish(visible);
    }

    /// Show the unfiltered results immediately, superseding pending work
    fn show_base(&self) {
        self.tasks.cancel(FILTER_KEY);
        self.channel.invalidate();
        self.settle();
        let base = Rc::clone(&self.state.borrow().base);
        self.publish(base);
    }

    fn publish(&self, visible: SharedResults) {
        self.state.borrow_mut().visible = Rc::clone(&visible);
        self.dispatcher
            .dispatch(StateEvent::VisibleResultsChanged { results: visible });
    }

    fn settle(&self) {
        self.tasks.cancel(INDICATOR_KEY);
        self.in_flight.set(None);
        self.filtering.set(false);
    }

    fn reset(&self, query: &str, results: SharedResults, has_search: bool) {
        self.tasks.cancel(FILTER_KEY);
        self.channel.invalidate();
        self.settle();
        {
            let mut state = self.state.borrow_mut();
            state.query = query.to_string();
            state.has_search = has_search;
            state.filter_text = query.to_string();
            state.base = Rc::clone(&results);
        }
        self.publish(results);
    }

    pub fn filter_text(&self) -> String {
        self.state.borrow().filter_text.clone()
    }

    pub fn visible_results(&self) -> SharedResults {
        Rc::clone(&self.state.borrow().visible)
    }

    pub fn view(&self) -> FilterView {
        let state = self.state.borrow();
        FilterView {
            filter_text: state.filter_text.clone(),
            visible_results: Rc::clone(&state.visible),
        }
    }

    /// True once a filter query has been outstanding longer than the grace delay
    pub fn is_filtering(&self) -> bool {
        self.filtering.get()
    }

    pub fn is_busy(&self) -> bool {
        self.tasks.is_pending(FILTER_KEY) || self.in_flight.get().is_some()
    }
}

impl StateSubscriber for ResultFilterEngine {
    fn on_state_event(&self, event: &StateEvent) {
        match event {
            StateEvent::SearchCommitted { query, results } => {
                self.reset(query, Rc::clone(results), true);
            }
            StateEvent::SearchCleared => {
                self.reset("", empty_results(), false);
            }
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "ResultFilterEngine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::SearchResult;
    use crate::notify::NoticeLog;
    use crate::testing::{row, run_local, ScriptedService};
    use std::time::Duration;
    use tokio::time::sleep;

    struct Fixture {
        service: Rc<ScriptedService>,
        engine: Rc<ResultFilterEngine>,
        dispatcher: Rc<StateDispatcher>,
        notices: Rc<NoticeLog>,
    }

    fn fixture() -> Fixture {
        let service = Rc::new(
            ScriptedService::new()
                .with_table(
                    "clients",
                    &["name", "city"],
                    vec![
                        row(&[("name", "acme"), ("city", "Izmir")]),
                        row(&[("name", "acme corp"), ("city", "Ankara")]),
                        row(&[("name", "initech"), ("city", "Ankara")]),
                    ],
                )
                .with_latency(Duration::from_millis(40)),
        );
        let notices = Rc::new(NoticeLog::new());
        let dispatcher = Rc::new(StateDispatcher::new());
        let engine = ResultFilterEngine::new(
            service.clone(),
            notices.clone(),
            dispatcher.clone(),
            FilterConfig::default(),
            5000,
        );
        Fixture {
            service,
            engine,
            dispatcher,
            notices,
        }
    }

    fn commit(fixture: &Fixture, query: &str, tables: &[&str]) -> SharedResults {
        let results: SharedResults = tables
            .iter()
            .map(|t| SearchResult {
                table: t.to_string(),
                data: row(&[("name", query)]),
            })
            .collect::<Vec<_>>()
            .into();
        fixture.dispatcher.dispatch(StateEvent::SearchCommitted {
            query: query.to_string(),
            results: Rc::clone(&results),
        });
        results
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_mirrors_query_and_results() {
        run_local(async {
            let f = fixture();
            let results = commit(&f, "acme", &["clients", "orders"]);

            assert_eq!(f.engine.filter_text(), "acme");
            assert!(Rc::ptr_eq(&f.engine.visible_results(), &results));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_passthrough_reuses_results_without_request() {
        run_local(async {
            let f = fixture();
            let results = commit(&f, "acme", &["clients"]);

            f.engine.set_filter_text("acme");
            sleep(Duration::from_secs(1)).await;
            assert!(Rc::ptr_eq(&f.engine.visible_results(), &results));

            f.engine.set_filter_text("");
            sleep(Duration::from_secs(1)).await;
            assert!(Rc::ptr_eq(&f.engine.visible_results(), &results));

            f.engine.set_filter_text("   ");
            sleep(Duration::from_secs(1)).await;
            assert!(Rc::ptr_eq(&f.engine.visible_results(), &results));

            assert!(f.service.requests().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_within_debounce_sends_one_request() {
        run_local(async {
            let f = fixture();
            commit(&f, "a", &["clients"]);

            f.engine.set_filter_text("acme");
            sleep(Duration::from_millis(150)).await;
            f.engine.set_filter_text("acme corp");
            sleep(Duration::from_secs(1)).await;

            assert_eq!(f.service.search_requests(), vec!["acme corp"]);
            let visible = f.engine.visible_results();
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].data["name"], "acme corp");
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_for_edited_text_is_dropped() {
        run_local(async {
            let f = fixture();
            f.service.set_search_latency("acme", Duration::from_millis(600));
            let results = commit(&f, "a", &["clients"]);

            f.engine.set_filter_text("acme");
            // Debounce elapsed, request for "acme" in flight
            sleep(Duration::from_millis(400)).await;
            f.engine.set_filter_text("initech");
            sleep(Duration::from_secs(2)).await;

            assert_eq!(f.service.search_requests(), vec!["acme", "initech"]);
            let visible = f.engine.visible_results();
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].data["name"], "initech");
            assert!(!Rc::ptr_eq(&visible, &results));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_text_reverts_instantly() {
        run_local(async {
            let f = fixture();
            f.service.set_search_latency("acme", Duration::from_millis(600));
            let results = commit(&f, "a", &["clients"]);

            f.engine.set_filter_text("acme");
            sleep(Duration::from_millis(400)).await;
            f.engine.set_filter_text("");

            // No waiting: the full set is back synchronously
            assert!(Rc::ptr_eq(&f.engine.visible_results(), &results));

            sleep(Duration::from_secs(1)).await;
            assert!(Rc::ptr_eq(&f.engine.visible_results(), &results));
            assert!(!f.engine.is_busy());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtering_indicator_after_grace() {
        run_local(async {
            let f = fixture();
            f.service.set_search_latency("acme", Duration::from_millis(900));
            commit(&f, "a", &["clients"]);

            f.engine.set_filter_text("acme");
            sleep(Duration::from_millis(300 + 400)).await;
            assert!(!f.engine.is_filtering());

            sleep(Duration::from_millis(200)).await;
            assert!(f.engine.is_filtering());

            sleep(Duration::from_secs(1)).await;
            assert!(!f.engine.is_filtering());
            assert_eq!(f.engine.visible_results().len(), 2);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_empties_view_and_notifies() {
        run_local(async {
            let f = fixture();
            f.service.fail_search("acme");
            commit(&f, "a", &["clients"]);

            f.engine.set_filter_text("acme");
            sleep(Duration::from_secs(1)).await;

            assert!(f.engine.visible_results().is_empty());
            assert_eq!(f.notices.errors().len(), 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_search_supersedes_pending_filter() {
        run_local(async {
            let f = fixture();
            commit(&f, "a", &["clients"]);

            f.engine.set_filter_text("acme");
            sleep(Duration::from_millis(100)).await;
            let results = commit(&f, "initech", &["clients"]);
            sleep(Duration::from_secs(1)).await;

            assert!(f.service.requests().is_empty());
            assert_eq!(f.engine.filter_text(), "initech");
            assert!(Rc::ptr_eq(&f.engine.visible_results(), &results));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_cleared_resets_view() {
        run_local(async {
            let f = fixture();
            commit(&f, "acme", &["clients"]);
            f.dispatcher.dispatch(StateEvent::SearchCleared);

            let view = f.engine.view();
            assert!(view.filter_text.is_empty());
            assert!(view.visible_results.is_empty());

            // Nothing to filter without a search
            f.engine.set_filter_text("acme corp");
            sleep(Duration::from_secs(1)).await;
            assert!(f.service.requests().is_empty());
        })
        .await;
    }
}
