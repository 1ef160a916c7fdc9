//! Infrastructure layer: configuration, persistence, resilience, watching
//!
//! Everything with an IO or process-lifetime concern lives here: the
//! settings surface, the persistent manifest and checkpoint, the debounced
//! filesystem watcher, the circuit-breaker/retry layer, and the provider
//! container.

/// Checkpoint persistence for resumable index runs
pub mod checkpoint;
/// Settings sections and layered loading
pub mod config;
/// Provider container and service wiring
pub mod di;
/// Persistent file manifest
pub mod manifest;
/// Circuit breaker and retry with backoff
pub mod resilience;
/// Debounced filesystem change stream
pub mod watcher;
