//! CLI command implementations

pub mod analyze;
pub mod analyzers;
pub mod diagnose;
