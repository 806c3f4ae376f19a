//! Configuration module
//!
//! Connection settings and the timing policy of the search, filter and
//! paging channels.

pub mod config;

pub use config::Config;
