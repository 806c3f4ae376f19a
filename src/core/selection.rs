//! SelectionTracker - rows picked on the current page
//!
//! A selection only ever refers to the page it was made on. Switching table,
//! page or in-table search empties it before any new rows are shown.

use crate::api_client::Record;
use crate::core::pagination::PageWindow;
use crate::state::{StateEvent, StateSubscriber};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    pub table_name: Option<String>,
    pub page_number: usize,
    pub ids: BTreeSet<String>,
}

impl SelectionSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

#[derive(Default)]
pub struct SelectionTracker {
    selection: RefCell<SelectionSet>,
    /// Page the selection applies to; `None` while a page change is in progress
    visible: RefCell<Option<Rc<PageWindow>>>,
}

impl SelectionTracker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Flip `id` in or out of the selection. Ids not on the visible page are ignored.
    pub fn toggle(&self, id: &str) -> bool {
        let visible = self.visible.borrow();
        let Some(window) = visible.as_ref().filter(|w| w.contains(id)) else {
            debug!(target: "selection", "Row {} is not on the visible page", id);
            return false;
        };

        let mut selection = self.selection.borrow_mut();
        if !selection.ids.remove(id) {
            selection.ids.insert(id.to_string());
        }
        selection.table_name = Some(window.table_name.clone());
        selection.page_number = window.page_number;
        true
    }

    /// Select every visible row, or clear if they are all selected already
    pub fn select_all(&self) {
        let visible = self.visible.borrow();
        let Some(window) = visible.as_ref() else {
            return;
        };
        let page_ids: BTreeSet<String> = window.record_ids().map(str::to_string).collect();

        let mut selection = self.selection.borrow_mut();
        if !page_ids.is_empty() && page_ids.is_subset(&selection.ids) {
            selection.ids.clear();
        } else {
            selection.ids = page_ids;
        }
        selection.table_name = Some(window.table_name.clone());
        selection.page_number = window.page_number;
    }

    pub fn clear(&self) {
        self.selection.borrow_mut().ids.clear();
    }

    pub fn selection(&self) -> SelectionSet {
        self.selection.borrow().clone()
    }

    /// Selected rows of the visible page, in page order
    pub fn selected_records(&self) -> Vec<Record> {
        let selection = self.selection.borrow();
        self.visible
            .borrow()
            .as_ref()
            .map(|window| {
                window
                    .records
                    .iter()
                    .filter(|r| selection.contains(&r.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn reset(&self, table_name: Option<String>, page_number: usize) {
        debug!(target: "selection", "Selection reset for {:?} page {}", table_name, page_number);
        *self.selection.borrow_mut() = SelectionSet {
            table_name,
            page_number,
            ids: BTreeSet::new(),
        };
    }

    fn on_page_committed(&self, window: &Rc<PageWindow>) {
        let same_context = self.visible.borrow().as_ref().is_some_and(|previous| {
            previous.table_name == window.table_name
                && previous.page_number == window.page_number
                && previous.search_term == window.search_term
        });

        if same_context {
            let mut selection = self.selection.borrow_mut();
            selection.ids.retain(|id| window.contains(id));
        } else {
            self.reset(Some(window.table_name.clone()), window.page_number);
        }
        *self.visible.borrow_mut() = Some(Rc::clone(window));
    }
}

impl StateSubscriber for SelectionTracker {
    fn on_state_event(&self, event: &StateEvent) {
        match event {
            StateEvent::TableSwitched { table } => {
                *self.visible.borrow_mut() = None;
                self.reset(table.clone(), 1);
            }
            StateEvent::PageChangeStarted { table, page, .. } => {
                *self.visible.borrow_mut() = None;
                self.reset(Some(table.clone()), *page);
            }
            StateEvent::PageCommitted { window } => self.on_page_committed(window),
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "SelectionTracker"
    }
}
