// src/lib.rs

pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use crate::config::ScanConfig;
pub use crate::core::dom::DomSnapshot;
pub use crate::core::models::{Finding, ProbeCategory, ProbeResult, ProbeStatus, ScanReport, Severity};
pub use crate::core::scanner::{run_full_scan, Orchestrator, Probe, ScanContext};
pub use crate::core::store::AnalysisStore;
pub use crate::core::target::Target;
