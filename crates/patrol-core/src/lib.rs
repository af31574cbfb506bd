//! Core types for the Patrol error analysis engine.
//!
//! This crate provides the fundamental types shared across all Patrol
//! components:
//! - Error records and events (`ErrorRecord`, `ErrorEvent`)
//! - Code locations and repository context (`CodeLocation`, `RepositoryContext`)
//! - Analysis results (`AnalysisResult`, `Diagnosis`)
//! - The error taxonomy (`PatrolError`)

mod analysis;
mod error;
mod record;

pub use analysis::{clamp_confidence, AnalysisResult, Diagnosis};
pub use error::PatrolError;
pub use record::{CodeLocation, ErrorEvent, ErrorRecord, RepositoryContext};
