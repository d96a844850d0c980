//! Cross-crate integration tests for the intent query resolver.
//!
//! The tests live under `tests/` and drive the Axum router and the engine
//! together over the in-memory rule source and sample store.
