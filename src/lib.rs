pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod shell;
pub mod ssh;
pub mod test_utils;
pub mod utils;
