//! Record matching, enrichment, and per-day filtered artifacts.
//!
//! A record is kept when one of its `registre` identifiers is known AND its
//! free text contains a keyword. Kept records are grouped by their own
//! publication date, not by the artifact they were read from.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use bodacc_shared::{
    AnnouncementRecord, ArtifactNames, BodaccError, FilterSettings, Result,
    parse_publication_date, read_jsonl_lines, write_atomic,
};

use crate::registry::{IdentifierRegistry, normalize_identifier};
use crate::text::{KeywordMatcher, collect_text};

/// Publication date field.
const DATE_FIELD: &str = "dateparution";

/// Identifier field (a string or a list of strings).
const REGISTRE_FIELD: &str = "registre";

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No parseable publication date; the record belongs to no day.
    Undated,
    /// Attributed to `day` but not kept.
    Dropped { day: NaiveDate },
    /// Kept and enriched.
    Kept {
        day: NaiveDate,
        record: AnnouncementRecord,
    },
}

/// Summary of a filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSummary {
    /// Source artifacts read.
    pub files: usize,
    /// Records read across all sources.
    pub records_read: usize,
    /// Records written to filtered artifacts.
    pub records_kept: usize,
    /// Filtered artifacts written (including empty ones).
    pub days_written: usize,
    /// Days skipped because their filtered artifact already existed.
    pub days_skipped: usize,
}

/// Applies identifier and keyword matching to records.
pub struct MatchFilterEngine<'a> {
    registry: &'a IdentifierRegistry,
    keywords: KeywordMatcher,
    text_fields: Vec<String>,
    tag_field: String,
    tag_value: String,
}

impl<'a> MatchFilterEngine<'a> {
    pub fn new(registry: &'a IdentifierRegistry, settings: &FilterSettings) -> Self {
        Self {
            registry,
            keywords: KeywordMatcher::new(&settings.keywords),
            text_fields: settings.text_fields.clone(),
            tag_field: settings.tag_field.clone(),
            tag_value: settings.tag_value.clone(),
        }
    }

    /// Run the per-record pipeline: date, identifier, keyword, enrichment.
    pub fn evaluate(&self, mut record: AnnouncementRecord) -> Verdict {
        let Some(day) = record
            .get(DATE_FIELD)
            .and_then(Value::as_str)
            .and_then(parse_publication_date)
        else {
            return Verdict::Undated;
        };

        let matches = self.matched_identifiers(&record);
        let Some(first) = matches.first() else {
            return Verdict::Dropped { day };
        };
        debug!(identifiers = %matches.join(", "), "identifier hit");

        if !self.keywords.matches(&self.record_text(&record)) {
            return Verdict::Dropped { day };
        }

        record.insert(self.tag_field.clone(), Value::String(self.tag_value.clone()));
        if let Some(entry) = self.registry.get(first) {
            for (column, value) in &entry.attributes {
                record.insert(column.clone(), Value::String(value.clone()));
            }
        }

        Verdict::Kept { day, record }
    }

    /// Known identifiers of the record, in the record's own order.
    pub fn matched_identifiers(&self, record: &AnnouncementRecord) -> Vec<String> {
        let candidates: Vec<&str> = match record.get(REGISTRE_FIELD) {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        candidates
            .into_iter()
            .map(normalize_identifier)
            .filter(|id| !id.is_empty() && self.registry.contains(id))
            .collect()
    }

    /// Space-joined text of the configured fields present on the record.
    pub fn record_text(&self, record: &AnnouncementRecord) -> String {
        let mut parts = Vec::new();
        for field in &self.text_fields {
            if let Some(value) = record.get(field) {
                collect_text(value, &mut parts);
            }
        }
        parts.join(" ")
    }

    /// Filter `inputs` into one artifact per publication day under `output_dir`.
    ///
    /// Days whose filtered artifact already exists are left untouched. Days
    /// seen with no kept record get an empty artifact.
    #[instrument(skip_all, fields(inputs = inputs.len(), output = %output_dir.display()))]
    pub fn filter_artifacts(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        names: &ArtifactNames,
    ) -> Result<FilterSummary> {
        if inputs.is_empty() {
            return Err(BodaccError::NoSourceArtifacts {
                dir: output_dir.to_path_buf(),
            });
        }

        std::fs::create_dir_all(output_dir).map_err(|e| BodaccError::io(output_dir, e))?;
        let existing = existing_days(output_dir, names)?;
        info!(already_done = existing.len(), "scanned filtered artifacts");

        let mut summary = FilterSummary::default();
        let mut kept: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        let mut seen: BTreeSet<NaiveDate> = BTreeSet::new();
        let mut skipped: HashSet<NaiveDate> = HashSet::new();

        for input in inputs {
            info!(path = %input.display(), "filtering day artifact");
            let lines = match read_jsonl_lines(input) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(path = %input.display(), error = %e, "cannot read day artifact, skipping");
                    continue;
                }
            };
            summary.files += 1;

            for line in lines {
                summary.records_read += 1;
                let Value::Object(record) = line.value else {
                    warn!(path = %input.display(), "skipping non-object record");
                    continue;
                };

                let verdict = self.evaluate(record);
                let day = match &verdict {
                    Verdict::Undated => continue,
                    Verdict::Dropped { day } | Verdict::Kept { day, .. } => *day,
                };
                if existing.contains(&day) {
                    skipped.insert(day);
                    continue;
                }
                seen.insert(day);

                if let Verdict::Kept { record, .. } = verdict {
                    let line = serde_json::to_string(&record)
                        .map_err(|e| BodaccError::parse(format!("cannot serialize record: {e}")))?;
                    kept.entry(day).or_default().push(line);
                }
            }
        }

        if summary.files == 0 {
            let dir = inputs[0].parent().map(Path::to_path_buf).unwrap_or_default();
            return Err(BodaccError::NoSourceArtifacts { dir });
        }

        for day in seen {
            let target = output_dir.join(names.filtered_file(day));
            if target.exists() {
                info!(path = %target.display(), "filtered artifact already present, not regenerating");
                skipped.insert(day);
                continue;
            }

            let lines = kept.remove(&day).unwrap_or_default();
            let mut content = lines.join("\n");
            if !content.is_empty() {
                content.push('\n');
            }
            write_atomic(&target, content.as_bytes())?;

            info!(path = %target.display(), records = lines.len(), "wrote filtered artifact");
            summary.records_kept += lines.len();
            summary.days_written += 1;
        }

        summary.days_skipped = skipped.len();
        info!(
            files = summary.files,
            records_read = summary.records_read,
            records_kept = summary.records_kept,
            days_written = summary.days_written,
            days_skipped = summary.days_skipped,
            "filter complete"
        );
        Ok(summary)
    }
}

/// Days that already have a filtered artifact in `output_dir`.
fn existing_days(output_dir: &Path, names: &ArtifactNames) -> Result<HashSet<NaiveDate>> {
    let entries = std::fs::read_dir(output_dir).map_err(|e| BodaccError::io(output_dir, e))?;
    let mut days = HashSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| BodaccError::io(output_dir, e))?;
        if let Some(day) = entry
            .file_name()
            .to_str()
            .and_then(|name| names.parse_filtered_file(name))
        {
            days.insert(day);
        }
    }
    Ok(days)
}

/// Day artifacts in `daily_dir`, sorted by name. A missing directory yields none.
pub fn discover_day_artifacts(daily_dir: &Path, names: &ArtifactNames) -> Result<Vec<PathBuf>> {
    if !daily_dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(daily_dir).map_err(|e| BodaccError::io(daily_dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BodaccError::io(daily_dir, e))?;
        let is_artifact = entry
            .file_name()
            .to_str()
            .is_some_and(|name| names.parse_day_file(name).is_some());
        if is_artifact && entry.path().is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}
