//! Shared types, error model, and configuration for the BODACC pipeline.
//!
//! This crate is the foundation depended on by all other pipeline crates.
//! It provides:
//! - [`BodaccError`]: the unified error type
//! - Domain types ([`Category`], day formatting helpers)
//! - Configuration ([`AppConfig`], [`FetchSettings`], [`FilterSettings`], config loading)
//! - Artifact naming and crash-safe file helpers ([`artifact`])

pub mod artifact;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use artifact::{ArtifactNames, FragmentName, JsonLine, read_jsonl_lines, write_atomic};
pub use config::{
    ApiConfig, AppConfig, ArtifactsConfig, DirectoriesConfig, FetchSettings, FilterConfig,
    FilterSettings, ProxyConfig, ProxySettings, RegistryConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_config,
};
pub use error::{BodaccError, Result};
pub use types::{
    AnnouncementRecord, CATEGORIES, Category, day_stamp, parse_day, parse_publication_date,
};
