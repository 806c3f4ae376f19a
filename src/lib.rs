pub mod api_client;
pub mod config;
pub mod core;
pub mod debouncer;
pub mod export;
pub mod notify;
pub mod services;
pub mod state;
pub mod testing;
pub mod utils;
