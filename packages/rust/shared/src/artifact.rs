//! Artifact naming and crash-safe file helpers.
//!
//! Every file the pipeline produces is keyed by day:
//! ```text
//! <tmp_dir>/YYYYMMDD_<prefix>_part_<category>_<page:03>.jsonl   fragment (one page)
//! <daily_dir>/YYYYMMDD_<prefix>.jsonl                           day artifact
//! <filtered_dir>/YYYYMMDD_<suffix>.jsonl                        filtered day artifact
//! ```
//! Existence of the last two is the idempotency signal of their stage, so
//! they are only ever written through [`write_atomic`].

use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{BodaccError, Result};
use crate::types::{Category, day_stamp};

/// File extension shared by all artifacts.
const EXTENSION: &str = "jsonl";

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Parsed components of a fragment file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentName {
    pub day: NaiveDate,
    pub category: Category,
    pub page: u32,
}

/// Builds and recognizes artifact file names for one naming scheme.
#[derive(Debug, Clone)]
pub struct ArtifactNames {
    update_prefix: String,
    filtered_suffix: String,
    fragment_re: Regex,
    day_re: Regex,
    filtered_re: Regex,
}

impl ArtifactNames {
    /// Create a naming scheme from the day-artifact prefix and filtered suffix.
    pub fn new(update_prefix: &str, filtered_suffix: &str) -> Result<Self> {
        let prefix = regex::escape(update_prefix);
        let suffix = regex::escape(filtered_suffix);
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .map_err(|e| BodaccError::config(format!("bad artifact pattern: {e}")))
        };

        Ok(Self {
            update_prefix: update_prefix.to_string(),
            filtered_suffix: filtered_suffix.to_string(),
            fragment_re: compile(format!(
                r"^(\d{{8}})_{prefix}_part_([A-Z])_(\d+)\.{EXTENSION}$"
            ))?,
            day_re: compile(format!(r"^(\d{{8}})_{prefix}\.{EXTENSION}$"))?,
            filtered_re: compile(format!(r"^(\d{{8}})_{suffix}\.{EXTENSION}$"))?,
        })
    }

    /// Naming scheme configured in `[artifacts]`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.artifacts.update_prefix,
            &config.artifacts.filtered_suffix,
        )
    }

    /// `YYYYMMDD_<prefix>.jsonl`
    pub fn day_file(&self, day: NaiveDate) -> String {
        format!("{}_{}.{EXTENSION}", day_stamp(day), self.update_prefix)
    }

    /// `YYYYMMDD_<prefix>_part_<category>_<page:03>.jsonl`
    pub fn fragment_file(&self, day: NaiveDate, category: Category, page: u32) -> String {
        format!(
            "{}_{}_part_{category}_{page:03}.{EXTENSION}",
            day_stamp(day),
            self.update_prefix
        )
    }

    /// `YYYYMMDD_<suffix>.jsonl`
    pub fn filtered_file(&self, day: NaiveDate) -> String {
        format!("{}_{}.{EXTENSION}", day_stamp(day), self.filtered_suffix)
    }

    /// Recognize a fragment file name.
    pub fn parse_fragment(&self, file_name: &str) -> Option<FragmentName> {
        let caps = self.fragment_re.captures(file_name)?;
        Some(FragmentName {
            day: parse_stamp(&caps[1])?,
            category: caps[2].parse().ok()?,
            page: caps[3].parse().ok()?,
        })
    }

    /// Recognize a day artifact file name, returning its nominal day.
    pub fn parse_day_file(&self, file_name: &str) -> Option<NaiveDate> {
        let caps = self.day_re.captures(file_name)?;
        parse_stamp(&caps[1])
    }

    /// Recognize a filtered day artifact file name, returning its day.
    pub fn parse_filtered_file(&self, file_name: &str) -> Option<NaiveDate> {
        let caps = self.filtered_re.captures(file_name)?;
        parse_stamp(&caps[1])
    }
}

fn parse_stamp(stamp: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Write `content` to `target` so that readers never observe a partial file.
///
/// The bytes go to a hidden sibling first and are renamed into place.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| BodaccError::validation(format!("{} has no parent", target.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| BodaccError::io(dir, e))?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BodaccError::validation(format!("bad file name: {}", target.display())))?;
    let temp = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| BodaccError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| BodaccError::io(target, e))?;

    debug!(path = %target.display(), bytes = content.len(), "wrote artifact");
    Ok(())
}

/// One valid line of a JSON-lines file.
#[derive(Debug, Clone)]
pub struct JsonLine {
    /// The line exactly as stored, without its terminator.
    pub raw: String,
    /// The decoded value.
    pub value: Value,
}

/// Read a JSON-lines file, skipping blank lines and warning on malformed ones.
pub fn read_jsonl_lines(path: &Path) -> Result<Vec<JsonLine>> {
    let file = std::fs::File::open(path).map_err(|e| BodaccError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BodaccError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => lines.push(JsonLine {
                raw: trimmed.to_string(),
                value,
            }),
            Err(e) => {
                warn!(path = %path.display(), line = index + 1, error = %e, "skipping malformed JSON line");
            }
        }
    }

    Ok(lines)
}
