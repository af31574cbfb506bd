pub mod cli;
pub mod config;
pub mod github;
pub mod llms;
pub mod otel;

// Re-export the engine and core types for convenience
pub use patrol_analyzer::{AnalysisEngine, ProcessingOptions, ResolverConfig};
pub use patrol_cache::{fingerprint, AnalysisCache, CacheConfig, EvictionPolicy};
pub use patrol_core::{AnalysisResult, ErrorEvent, ErrorRecord, PatrolError};
