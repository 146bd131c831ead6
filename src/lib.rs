#![warn(missing_docs)]
#![warn(clippy::all)]

//! inciscope - resilient multi-source cosmetic ingredient safety analysis
//!
//! This library fans a single ingredient name out to several unreliable
//! external data sources concurrently (openFDA, PubChem, EWG Skin Deep,
//! INCI/Biodizionario, EU CosIng, and an Ollama-compatible LLM), applies
//! per-upstream resilience (rate limiting, circuit breaking, bulkheading,
//! bounded TTL caching, retries with backoff), merges whatever answered
//! into one scored record, and derives product-level safety/eco scores,
//! risk flags and substitute recommendations.
//!
//! ## Features
//! - Per-upstream circuit breakers, rate limiters, bulkheads and caches
//! - Concurrent fan-out bounded by an overall aggregation deadline
//! - Partial upstream failure as the normal case, never an error
//! - LLM-backed risk analysis and substitute generation
//!
//! ## Usage
//! ```rust,ignore
//! use inciscope::{AnalysisEngine, Config};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let engine = AnalysisEngine::from_config(&config)?;
//!
//!     let names = vec!["Aqua".to_string(), "Parfum".to_string()];
//!     let summary = engine.analyze_product(&names, None).await?;
//!     println!("{}: {:.0}/100", summary.tier, summary.overall_safety_score);
//!     Ok(())
//! }
//! ```

/// Concurrent fan-out/fan-in and result merging
pub mod aggregator;
/// Configuration types and TOML loading
pub mod config;
/// Error handling types and utilities
pub mod error;
/// Logging configuration and utilities
pub mod logging;
/// Metrics collection and reporting
pub mod metrics;
/// Core data model shared across components
pub mod model;
/// Generic resilience primitives
pub mod resilience;
/// Product scoring and substitute recommendations
pub mod scoring;
/// Per-upstream clients and the resilience pipeline
pub mod sources;

// Re-export common types
pub use aggregator::Aggregator;
pub use config::Config;
pub use error::{AnalysisError, Result};
pub use model::{
    ComprehensiveIngredientRecord, FetchStatus, IngredientQuery, IngredientVerdict,
    ProductAnalysisSummary, RecommendationTier, RiskAnalysis, Source, SubstituteRecommendation,
    UpstreamResult, UserSafetyProfile,
};
pub use scoring::AnalysisEngine;
pub use sources::{SourceClient, UpstreamClient};
