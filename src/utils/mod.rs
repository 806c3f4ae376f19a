//! Logging and filesystem locations

pub mod app_paths;
pub mod logging;
