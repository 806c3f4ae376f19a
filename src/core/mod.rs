//! Interactive search, filter, pagination and selection engine
//!
//! Each controller owns exactly one derived slot and replaces it wholesale.
//! Everything runs on a single-threaded `LocalSet`; requests on a channel carry
//! a [`channel::RequestToken`] and only the latest one may commit.

pub mod catalog;
pub mod channel;
pub mod pagination;
pub mod result_aggregator;
pub mod result_filter;
pub mod search_coordinator;
pub mod selection;

use crate::api_client::SearchResult;
use std::rc::Rc;

/// Immutable, cheaply shared search result set
pub type SharedResults = Rc<[SearchResult]>;

pub fn empty_results() -> SharedResults {
    Rc::from(Vec::new())
}
