//! Identifier and keyword matching over fetched day artifacts.
//!
//! This crate provides:
//! - [`registry`]: the set of known identifiers and their enrichment attributes
//! - [`text`]: free-text collection from nested (and re-encoded) JSON, and normalization
//! - [`engine`]: per-record matching, enrichment, and per-day filtered output

pub mod engine;
pub mod registry;
pub mod text;

pub use engine::{FilterSummary, MatchFilterEngine, Verdict, discover_day_artifacts};
pub use registry::{IDENTIFIER_LEN, IdentifierEntry, IdentifierRegistry, normalize_identifier};
pub use text::{KeywordMatcher, collect_text, normalize_text};
