//! Pushgate — library crate for integration testing.
//!
//! Re-exports modules needed by integration tests in `tests/`.

pub mod api;
pub mod audit;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod provider;
pub mod state;
pub mod store;
