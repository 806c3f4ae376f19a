//! State events and changes

use crate::api_client::TableInfo;
use crate::core::pagination::PageWindow;
use crate::core::SharedResults;
use std::rc::Rc;

/// Events emitted by the owner of a state slot after it replaced that slot
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// A global search response was committed
    SearchCommitted {
        query: String,
        results: SharedResults,
    },

    /// The search session was reset by the user
    SearchCleared,

    /// The filtered view over the search results changed
    VisibleResultsChanged { results: SharedResults },

    /// A different table (or none) is now selected
    TableSwitched { table: Option<String> },

    /// A page change or in-table search has started; rows of the old page
    /// are no longer current
    PageChangeStarted {
        table: String,
        page: usize,
        search_term: String,
    },

    /// A page window replaced the previous one
    PageCommitted { window: Rc<PageWindow> },

    /// The table list was reloaded
    TablesChanged { tables: Rc<[TableInfo]> },
}

impl StateEvent {
    /// Short name for logs and event history
    pub fn kind(&self) -> &'static str {
        match self {
            StateEvent::SearchCommitted { .. } => "search-committed",
            StateEvent::SearchCleared => "search-cleared",
            StateEvent::VisibleResultsChanged { .. } => "visible-results-changed",
            StateEvent::TableSwitched { .. } => "table-switched",
            StateEvent::PageChangeStarted { .. } => "page-change-started",
            StateEvent::PageCommitted { .. } => "page-committed",
            StateEvent::TablesChanged { .. } => "tables-changed",
        }
    }
}
