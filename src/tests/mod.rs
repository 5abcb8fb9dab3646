//! Crate-internal scenario tests.
//!
//! - `orchestrator`: state machine, cache, debounce and cancellation
//! - `agent`: access checks and project watching on a temp directory
