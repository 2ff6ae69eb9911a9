//! Application configuration for the BODACC pipeline.
//!
//! User config lives at `~/.bodacc/bodacc.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BodaccError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bodacc.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bodacc";

/// Enrichment columns are capped at three per identifier.
const MAX_ATTRIBUTE_COLUMNS: usize = 3;

/// Upper bound for `[api] backoff_base_secs`.
const MAX_BACKOFF_BASE_SECS: f64 = 3600.0;

// ---------------------------------------------------------------------------
// Config structs (matching bodacc.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Optional outbound proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,

    /// Where artifacts are written.
    #[serde(default)]
    pub directories: DirectoriesConfig,

    /// Artifact naming.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Identifier registry source.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Keyword filter.
    #[serde(default)]
    pub filter: FilterConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Records endpoint of the announcement dataset.
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Page size requested per call.
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Attempts per page before a category is abandoned for the day.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: f64,

    /// Pause after a 429 response, in seconds.
    #[serde(default = "default_too_many_requests_timeout")]
    pub too_many_requests_timeout_secs: u64,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Extra PEM root certificate (corporate TLS interception).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// Length of the trailing window when no start date is given.
    #[serde(default = "default_days_depth")]
    pub default_days_depth: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            per_page: default_per_page(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base(),
            too_many_requests_timeout_secs: default_too_many_requests_timeout(),
            request_timeout_secs: default_request_timeout(),
            cert_file: None,
            default_days_depth: default_days_depth(),
        }
    }
}

fn default_api_url() -> String {
    "https://bodacc-datadila.opendatasoft.com/api/explore/v2.1/catalog/datasets/annonces-commerciales/records".into()
}
fn default_per_page() -> usize {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base() -> f64 {
    1.0
}
fn default_too_many_requests_timeout() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    60
}
fn default_days_depth() -> u32 {
    7
}

/// `[proxy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// `host:port` of the proxy, without scheme.
    pub url: String,

    /// Optional basic-auth user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Name of the env var holding the proxy password (never store the password itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

/// `[directories]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    /// Root of all outputs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Day artifacts, relative to `output_dir`.
    #[serde(default = "default_daily_dir")]
    pub daily_dir: String,

    /// Filtered day artifacts, relative to `output_dir`.
    #[serde(default = "default_filtered_dir")]
    pub filtered_dir: String,

    /// Fragment staging area.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            daily_dir: default_daily_dir(),
            filtered_dir: default_filtered_dir(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

impl DirectoriesConfig {
    /// Directory holding one `YYYYMMDD_<prefix>.jsonl` per fetched day.
    pub fn daily_path(&self) -> PathBuf {
        self.output_dir.join(&self.daily_dir)
    }

    /// Directory holding one `YYYYMMDD_<suffix>.jsonl` per filtered day.
    pub fn filtered_path(&self) -> PathBuf {
        self.output_dir.join(&self.filtered_dir)
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("var/bodacc")
}
fn default_daily_dir() -> String {
    "bodacc_by_day".into()
}
fn default_filtered_dir() -> String {
    "bodacc_filtered_by_day".into()
}
fn default_tmp_dir() -> PathBuf {
    PathBuf::from("var/bodacc/tmp")
}

/// `[artifacts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Name component of day artifacts and their fragments.
    #[serde(default = "default_update_prefix")]
    pub update_prefix: String,

    /// Name component of filtered day artifacts.
    #[serde(default = "default_filtered_suffix")]
    pub filtered_suffix: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            update_prefix: default_update_prefix(),
            filtered_suffix: default_filtered_suffix(),
        }
    }
}

fn default_update_prefix() -> String {
    "bodacc_update".into()
}
fn default_filtered_suffix() -> String {
    "bodacc_filtered".into()
}

/// `[registry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Semicolon-delimited export of known identifiers.
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Header of the identifier column.
    #[serde(default = "default_identifier_column")]
    pub identifier_column: String,

    /// Headers copied onto matching records (at most three).
    #[serde(default = "default_attribute_columns")]
    pub attribute_columns: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            identifier_column: default_identifier_column(),
            attribute_columns: default_attribute_columns(),
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("var/bodacc/tmp/siren.csv")
}
fn default_identifier_column() -> String {
    "CODE_SIREN".into()
}
fn default_attribute_columns() -> Vec<String> {
    vec![
        "MATRICULE_PICRIS_CCPMA".into(),
        "MATRICULE_PICRIS_CPCEA".into(),
        "MATRICULE_PICRIS_AGRI".into(),
    ]
}

/// `[filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Keywords that tag a record (matched case- and accent-insensitively).
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Record fields searched for keywords.
    #[serde(default = "default_text_fields")]
    pub text_fields: Vec<String>,

    /// Field set on tagged records.
    #[serde(default = "default_tag_field")]
    pub tag_field: String,

    /// Value written to `tag_field`.
    #[serde(default = "default_tag_value")]
    pub tag_value: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            text_fields: default_text_fields(),
            tag_field: default_tag_field(),
            tag_value: default_tag_value(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    [
        "sauvegarde",
        "redressement judiciaire",
        "liquidation judiciaire",
        "radiation",
        "cloture pour insuffisance d'actifs",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_text_fields() -> Vec<String> {
    [
        "texte",
        "text",
        "objet",
        "description",
        "resume",
        "familleavis_lib",
        "typeavis_lib",
        "jugement",
        "modificationsgenerales",
        "divers",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_tag_field() -> String {
    "topage_DDJC".into()
}
fn default_tag_value() -> String {
    "oui".into()
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api.url.trim().is_empty() {
            return Err(BodaccError::config("[api] url is empty"));
        }
        url::Url::parse(&self.api.url)
            .map_err(|e| BodaccError::config(format!("[api] url is invalid: {e}")))?;
        if self.api.per_page == 0 {
            return Err(BodaccError::config("[api] per_page must be at least 1"));
        }
        if self.api.max_retries == 0 {
            return Err(BodaccError::config("[api] max_retries must be at least 1"));
        }
        if !self.api.backoff_base_secs.is_finite()
            || !(0.0..=MAX_BACKOFF_BASE_SECS).contains(&self.api.backoff_base_secs)
        {
            return Err(BodaccError::config(format!(
                "[api] backoff_base_secs must be between 0 and {MAX_BACKOFF_BASE_SECS}"
            )));
        }
        if self.api.default_days_depth == 0 {
            return Err(BodaccError::config(
                "[api] default_days_depth must be at least 1",
            ));
        }
        if self.filter.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(BodaccError::config("[filter] keywords must not be empty"));
        }
        if self.registry.attribute_columns.len() > MAX_ATTRIBUTE_COLUMNS {
            return Err(BodaccError::config(format!(
                "[registry] at most {MAX_ATTRIBUTE_COLUMNS} attribute_columns are supported, got {}",
                self.registry.attribute_columns.len()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime settings (derived from config)
// ---------------------------------------------------------------------------

/// Resolved proxy, with the password read from its env var.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Runtime fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Records endpoint.
    pub api_url: String,
    /// Requested page size.
    pub per_page: usize,
    /// Attempts per page for transient failures.
    pub max_retries: u32,
    /// Backoff base; attempt `n` waits `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Fixed pause after a 429, not counted as an attempt.
    pub rate_limit_pause: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Extra root certificate.
    pub cert_file: Option<PathBuf>,
    /// Outbound proxy.
    pub proxy: Option<ProxySettings>,
}

impl From<&AppConfig> for FetchSettings {
    fn from(config: &AppConfig) -> Self {
        let proxy = config.proxy.as_ref().map(|p| ProxySettings {
            url: p.url.clone(),
            user: p.user.clone(),
            password: p
                .password_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|v| !v.is_empty()),
        });

        Self {
            api_url: config.api.url.clone(),
            per_page: config.api.per_page,
            max_retries: config.api.max_retries,
            backoff_base: Duration::try_from_secs_f64(config.api.backoff_base_secs.max(0.0))
                .unwrap_or(Duration::MAX),
            rate_limit_pause: Duration::from_secs(config.api.too_many_requests_timeout_secs),
            request_timeout: Duration::from_secs(config.api.request_timeout_secs),
            cert_file: config.api.cert_file.clone(),
            proxy,
        }
    }
}

/// Runtime filter configuration.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub keywords: Vec<String>,
    pub text_fields: Vec<String>,
    pub tag_field: String,
    pub tag_value: String,
    pub identifier_column: String,
    pub attribute_columns: Vec<String>,
}

impl From<&AppConfig> for FilterSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            keywords: config.filter.keywords.clone(),
            text_fields: config.filter.text_fields.clone(),
            tag_field: config.filter.tag_field.clone(),
            tag_value: config.filter.tag_value.clone(),
            identifier_column: config.registry.identifier_column.clone(),
            attribute_columns: config.registry.attribute_columns.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bodacc/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BodaccError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bodacc/bodacc.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BodaccError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BodaccError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Load an explicit config file when given, else the default one, then validate.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let config = match explicit {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            load_config_from(path)?
        }
        None => load_config()?,
    };
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BodaccError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BodaccError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BodaccError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
