//! SearchCoordinator - lifecycle of the global cross-table search
//!
//! Every submission takes a token from the `search` channel before its
//! debounce, so only the response of the latest submission commits.
//! Quick responses never raise the `searching` indicator: it only goes up once
//! the configured grace delay has passed without a response.

use crate::api_client::TableService;
use crate::config::config::SearchConfig;
use crate::core::channel::{RequestChannel, RequestToken};
use crate::core::{empty_results, SharedResults};
use crate::debouncer::DebouncedTasks;
use crate::notify::{Notice, Notifier};
use crate::state::{StateDispatcher, StateEvent};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, warn};

const SUBMIT_KEY: &str = "search";
const INDICATOR_KEY: &str = "search-indicator";

/// The committed outcome of the latest global search
#[derive(Debug, Clone)]
pub struct SearchSession {
    /// The literal text that was submitted
    pub query: String,
    pub results: SharedResults,
    pub has_run: bool,
}

impl SearchSession {
    pub fn new() -> Self {
        Self {
            query: String::new(),
            results: empty_results(),
            has_run: false,
        }
    }

    /// The term to show in a "no results" message, if that message applies
    pub fn no_results_term(&self) -> Option<&str> {
        (self.has_run && self.results.is_empty()).then_some(self.query.as_str())
    }
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SearchCoordinator {
    client: Rc<dyn TableService>,
    notifier: Rc<dyn Notifier>,
    dispatcher: Rc<StateDispatcher>,
    config: SearchConfig,
    tasks: DebouncedTasks,
    channel: RequestChannel,
    session: RefCell<Rc<SearchSession>>,
    searching: Cell<bool>,
    in_flight: Cell<Option<RequestToken>>,
}

impl SearchCoordinator {
    pub fn new(
        client: Rc<dyn TableService>,
        notifier: Rc<dyn Notifier>,
        dispatcher: Rc<StateDispatcher>,
        config: SearchConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            client,
            notifier,
            dispatcher,
            config,
            tasks: DebouncedTasks::new(),
            channel: RequestChannel::new("search"),
            session: RefCell::new(Rc::new(SearchSession::new())),
            searching: Cell::new(false),
            in_flight: Cell::new(None),
        })
    }

    /// Submit a search. Blank queries are ignored and return false.
    pub fn submit(self: &Rc<Self>, query: &str) -> bool {
        if query.trim().is_empty() {
            debug!(target: "search", "Ignoring blank search submission");
            return false;
        }

        // Supersedes whatever is still in flight, even while this one waits
        let token = self.channel.issue();
        let this = Rc::clone(self);
        let query = query.to_string();
        self.tasks
            .schedule(SUBMIT_KEY, self.config.debounce(), move || async move {
                this.run(query, token).await
            });
        true
    }

    async fn run(self: Rc<Self>, query: String, token: RequestToken) {
        if !self.channel.is_current(token) {
            debug!(target: "search", "Skipping superseded search for '{}' ({})", query, token);
            return;
        }
        self.in_flight.set(Some(token));

        let watcher = Rc::clone(&self);
        self.tasks
            .schedule(INDICATOR_KEY, self.config.loading_grace(), move || async move {
                if watcher.in_flight.get() == Some(token) {
                    watcher.searching.set(true);
                }
            });

        info!(target: "search", "Searching all tables for '{}' ({})", query, token);
        let outcome = self.client.search(&query, self.config.result_limit).await;

        if !self.channel.is_current(token) {
            debug!(target: "search", "Dropping stale response for '{}' ({})", query, token);
            return;
        }
        self.settle();

        let results: SharedResults = match outcome {
            Ok(results) => {
                info!(target: "search", "'{}' returned {} results", query, results.len());
                Rc::from(results)
            }
            Err(e) => {
                warn!(target: "search", "Search for '{}' failed: {}", query, e);
                self.notifier.notify(Notice::error(format!("Search error: {e}")));
                empty_results()
            }
        };

        *self.session.borrow_mut() = Rc::new(SearchSession {
            query: query.clone(),
            results: Rc::clone(&results),
            has_run: true,
        });
        self.dispatcher
            .dispatch(StateEvent::SearchCommitted { query, results });
    }

    /// Reset to the initial not-run state and drop anything in flight
    pub fn clear(&self) {
        self.tasks.cancel(SUBMIT_KEY);
        self.channel.invalidate();
        self.settle();
        *self.session.borrow_mut() = Rc::new(SearchSession::new());
        info!(target: "search", "Search cleared");
        self.dispatcher.dispatch(StateEvent::SearchCleared);
    }

    fn settle(&self) {
        self.tasks.cancel(INDICATOR_KEY);
        self.in_flight.set(None);
        self.searching.set(false);
    }

    pub fn session(&self) -> Rc<SearchSession> {
        Rc::clone(&self.session.borrow())
    }

    /// True once a search has been outstanding for longer than the grace delay
    pub fn is_searching(&self) -> bool {
        self.searching.get()
    }

    /// True while a submission is waiting out its debounce or a request is outstanding
    pub fn is_busy(&self) -> bool {
        self.tasks.is_pending(SUBMIT_KEY) || self.in_flight.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoticeLog;
    use crate::testing::{row, run_local, ScriptedService};
    use std::time::Duration;
    use tokio::time::sleep;

    fn service() -> Rc<ScriptedService> {
        Rc::new(
            ScriptedService::new()
                .with_table(
                    "orders",
                    &["customer", "item"],
                    vec![
                        row(&[("customer", "acme"), ("item", "anvil")]),
                        row(&[("customer", "globex"), ("item", "rocket")]),
                    ],
                )
                .with_latency(Duration::from_millis(50)),
        )
    }

    fn coordinator(
        service: &Rc<ScriptedService>,
    ) -> (Rc<SearchCoordinator>, Rc<NoticeLog>, Rc<StateDispatcher>) {
        let notices = Rc::new(NoticeLog::new());
        let dispatcher = Rc::new(StateDispatcher::new());
        let coordinator = SearchCoordinator::new(
            service.clone(),
            notices.clone(),
            dispatcher.clone(),
            SearchConfig::default(),
        );
        (coordinator, notices, dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_query_ignored() {
        run_local(async {
            let service = service();
            let (coordinator, _, _) = coordinator(&service);

            assert!(!coordinator.submit("   "));
            sleep(Duration::from_millis(500)).await;

            assert!(service.requests().is_empty());
            assert!(!coordinator.session().has_run);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_search_commits() {
        run_local(async {
            let service = service();
            let (coordinator, notices, dispatcher) = coordinator(&service);

            assert!(coordinator.submit("acme"));
            sleep(Duration::from_millis(200)).await;

            let session = coordinator.session();
            assert!(session.has_run);
            assert_eq!(session.query, "acme");
            assert_eq!(session.results.len(), 1);
            assert_eq!(session.no_results_term(), None);
            assert!(notices.notices().is_empty());
            assert_eq!(dispatcher.event_history(), vec!["search-committed"]);
            assert!(!coordinator.is_busy());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_of_superseded_search_is_dropped() {
        run_local(async {
            let service = service();
            service.set_search_latency("acme", Duration::from_millis(400));
            service.set_search_latency("globex", Duration::from_millis(50));
            let (coordinator, _, dispatcher) = coordinator(&service);

            coordinator.submit("acme");
            sleep(Duration::from_millis(10)).await;
            coordinator.submit("globex");
            sleep(Duration::from_secs(1)).await;

            assert_eq!(service.search_requests(), vec!["acme", "globex"]);
            let session = coordinator.session();
            assert_eq!(session.query, "globex");
            assert_eq!(session.results[0].data["customer"], "globex");
            assert_eq!(dispatcher.event_history(), vec!["search-committed"]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_waiting_on_debounce_blocks_older_response() {
        run_local(async {
            let service = service();
            service.set_search_latency("acme", Duration::from_millis(300));
            service.set_search_latency("globex", Duration::from_millis(50));
            let notices = Rc::new(NoticeLog::new());
            let dispatcher = Rc::new(StateDispatcher::new());
            let config = SearchConfig {
                debounce_ms: 300,
                ..SearchConfig::default()
            };
            let coordinator =
                SearchCoordinator::new(service.clone(), notices, dispatcher.clone(), config);

            coordinator.submit("acme");
            sleep(Duration::from_millis(400)).await;
            coordinator.submit("globex");

            // "acme" answers at 600 ms while "globex" is still debouncing
            sleep(Duration::from_millis(250)).await;
            assert_eq!(service.search_requests(), vec!["acme"]);
            assert!(!coordinator.session().has_run);
            assert!(dispatcher.event_history().is_empty());
            assert!(coordinator.is_busy());

            sleep(Duration::from_secs(1)).await;
            let session = coordinator.session();
            assert_eq!(session.query, "globex");
            assert_eq!(session.results[0].data["customer"], "globex");
            assert_eq!(dispatcher.event_history(), vec!["search-committed"]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_searching_indicator_waits_for_grace_delay() {
        run_local(async {
            let service = service();
            service.set_search_latency("acme", Duration::from_millis(1000));
            let (coordinator, _, _) = coordinator(&service);

            coordinator.submit("acme");
            sleep(Duration::from_millis(100)).await;
            assert!(coordinator.is_busy());
            assert!(!coordinator.is_searching());

            sleep(Duration::from_millis(300)).await;
            assert!(coordinator.is_searching());

            sleep(Duration::from_millis(1000)).await;
            assert!(!coordinator.is_searching());
            assert!(coordinator.session().has_run);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_search_never_shows_indicator() {
        run_local(async {
            let service = service();
            let (coordinator, _, _) = coordinator(&service);

            coordinator.submit("acme");
            for _ in 0..10 {
                sleep(Duration::from_millis(50)).await;
                assert!(!coordinator.is_searching());
            }
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_empties_results_and_notifies() {
        run_local(async {
            let service = service();
            let (coordinator, notices, _) = coordinator(&service);

            coordinator.submit("acme");
            sleep(Duration::from_millis(200)).await;
            assert_eq!(coordinator.session().results.len(), 1);

            service.fail_search("anvil");
            coordinator.submit("anvil");
            sleep(Duration::from_millis(200)).await;

            let session = coordinator.session();
            assert!(session.has_run);
            assert!(session.results.is_empty());
            assert_eq!(session.no_results_term(), Some("anvil"));
            assert_eq!(notices.errors().len(), 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_in_flight_search() {
        run_local(async {
            let service = service();
            service.set_search_latency("acme", Duration::from_millis(300));
            let (coordinator, _, dispatcher) = coordinator(&service);

            coordinator.submit("acme");
            sleep(Duration::from_millis(100)).await;
            coordinator.clear();
            sleep(Duration::from_millis(500)).await;

            let session = coordinator.session();
            assert!(!session.has_run);
            assert!(session.results.is_empty());
            assert_eq!(dispatcher.event_history(), vec!["search-cleared"]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_keeps_literal_term() {
        run_local(async {
            let service = service();
            let (coordinator, notices, _) = coordinator(&service);

            coordinator.submit(" Zeppelin ");
            sleep(Duration::from_millis(200)).await;

            assert_eq!(service.search_requests(), vec![" Zeppelin "]);
            assert_eq!(coordinator.session().no_results_term(), Some(" Zeppelin "));
            assert!(notices.notices().is_empty());
        })
        .await;
    }
}
