// src/core/mod.rs

/// Data structures shared across the engine: findings, probe results and the
/// `ScanReport`.
pub mod models;

/// Target URL normalization.
pub mod target;

/// Versioned injection payload matrices and response signatures.
pub mod payloads;

/// Rendered-page snapshots consumed by the DOM-dependent probes.
pub mod dom;

/// The probe implementations and the orchestrator that runs them.
pub mod scanner;

/// The JSON-backed site-analysis history that reports are merged into.
pub mod store;
