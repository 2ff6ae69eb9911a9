//! Announcement API client, paginated fetching, and fragment staging.
//!
//! This crate provides:
//! - [`client`]: HTTP access to the records endpoint, one page per call
//! - [`engine`]: cursor-driven pagination with backoff and rate-limit handling
//! - [`staging`]: per-page fragments and their merge into day artifacts

pub mod client;
pub mod engine;
pub mod staging;

pub use client::{ApiClient, PageResponse, extract_records};
pub use engine::{CategoryFetch, PaginatedFetcher, sequence_number};
pub use staging::{FragmentStager, MergeOutcome};
