//! Pipeline orchestration for the BODACC ingestion and filter stages.
//!
//! This crate ties the fetcher, stager and filter engine together into the
//! two end-to-end runs: fetching a day range ([`pipeline`]) and filtering
//! fetched days ([`filter`]).

pub mod filter;
pub mod pipeline;
pub mod window;
