//! Filter run: day artifacts + identifier registry → filtered day artifacts.

use std::path::PathBuf;

use tracing::{instrument, warn};

use bodacc_filter::{FilterSummary, IdentifierRegistry, MatchFilterEngine, discover_day_artifacts};
use bodacc_shared::{AppConfig, ArtifactNames, BodaccError, FilterSettings, Result};

/// Inputs and settings for one filter run.
#[derive(Debug, Clone)]
pub struct FilterRunConfig {
    /// Explicit source artifacts; `None` means every day artifact in `daily_dir`.
    pub inputs: Option<Vec<PathBuf>>,
    pub daily_dir: PathBuf,
    pub filtered_dir: PathBuf,
    pub registry_path: PathBuf,
    pub settings: FilterSettings,
    pub names: ArtifactNames,
}

impl FilterRunConfig {
    pub fn from_config(config: &AppConfig, inputs: Option<Vec<PathBuf>>) -> Result<Self> {
        Ok(Self {
            inputs,
            daily_dir: config.directories.daily_path(),
            filtered_dir: config.directories.filtered_path(),
            registry_path: config.registry.path.clone(),
            settings: FilterSettings::from(config),
            names: ArtifactNames::from_config(config)?,
        })
    }
}

/// Resolve the inputs, load the registry, then filter.
///
/// Fails before touching the registry when there is nothing to filter, and
/// before writing anything when the registry yields no identifier.
#[instrument(skip_all, fields(registry = %config.registry_path.display()))]
pub fn run_filter(config: &FilterRunConfig) -> Result<FilterSummary> {
    let inputs: Vec<PathBuf> = match &config.inputs {
        Some(paths) => paths
            .iter()
            .filter(|path| {
                let exists = path.is_file();
                if !exists {
                    warn!(path = %path.display(), "input not found, ignoring");
                }
                exists
            })
            .cloned()
            .collect(),
        None => discover_day_artifacts(&config.daily_dir, &config.names)?,
    };
    if inputs.is_empty() {
        warn!(dir = %config.daily_dir.display(), "nothing to filter");
        return Err(BodaccError::NoSourceArtifacts {
            dir: config.daily_dir.clone(),
        });
    }

    let registry = IdentifierRegistry::load(
        &config.registry_path,
        &config.settings.identifier_column,
        &config.settings.attribute_columns,
    )?;

    let engine = MatchFilterEngine::new(&registry, &config.settings);
    engine.filter_artifacts(&inputs, &config.filtered_dir, &config.names)
}
