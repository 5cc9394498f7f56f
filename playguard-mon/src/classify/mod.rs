//! Classification: engine, aggregation rule, cache, overrides, LLM fallback
//!
//! The engine resolves an artist to a decision through a fixed short-circuit
//! order: override → cache → parallel source queries → aggregation → optional
//! LLM fallback → cache write. Everything downstream of the override check
//! degrades rather than fails; `classify` always returns a decision.

pub mod aggregator;
pub mod cache;
pub mod engine;
pub mod llm;
pub mod overrides;

pub use aggregator::{aggregate, Aggregate, AggregatePolicy};
pub use cache::DecisionCache;
pub use engine::ClassificationEngine;
pub use llm::OllamaFallback;
pub use overrides::OverrideStore;
