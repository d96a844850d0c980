//! Intent query API: library crate for the resolution REST server.
//!
//! Re-exports all modules so the binary (`main.rs`) and external crates
//! (e.g. `iq-e2e-tests`) can access `AppState`, `build_router`, and the
//! PostgreSQL adapters.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
