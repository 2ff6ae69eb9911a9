//! Known identifiers loaded from a semicolon-delimited export.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use bodacc_shared::{BodaccError, Result};

/// Digits in a valid identifier.
pub const IDENTIFIER_LEN: usize = 9;

/// One known identifier and the attributes copied onto matching records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierEntry {
    /// Digit-normalized identifier.
    pub identifier: String,
    /// `(column, value)` pairs in configured column order.
    pub attributes: Vec<(String, String)>,
}

/// Read-only map of known identifiers.
#[derive(Debug, Clone)]
pub struct IdentifierRegistry {
    entries: HashMap<String, IdentifierEntry>,
    invalid: usize,
}

/// Keep only the ASCII digits of `raw`.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

impl IdentifierRegistry {
    /// Load the registry file at `path`.
    ///
    /// Fails with [`BodaccError::EmptyRegistry`] when no row yields a valid
    /// identifier.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, identifier_column: &str, attribute_columns: &[String]) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| BodaccError::io(path, e))?;
        let registry = Self::from_reader(file, identifier_column, attribute_columns)?;

        if registry.is_empty() {
            return Err(BodaccError::EmptyRegistry {
                path: PathBuf::from(path),
            });
        }

        info!(
            identifiers = registry.len(),
            invalid = registry.invalid,
            "identifier registry loaded"
        );
        Ok(registry)
    }

    /// Parse registry rows from any reader. An empty result is not an error here.
    pub fn from_reader<R: Read>(
        reader: R,
        identifier_column: &str,
        attribute_columns: &[String],
    ) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv
            .headers()
            .map_err(|e| BodaccError::parse(format!("unreadable registry header: {e}")))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut registry = Self {
            entries: HashMap::new(),
            invalid: 0,
        };

        let id_index = match headers.iter().position(|h| h == identifier_column) {
            Some(index) => index,
            None => {
                warn!(
                    column = identifier_column,
                    "identifier column missing from header, using the first column"
                );
                // Without the expected header the first line may itself be data.
                if let Some(first) = headers.first() {
                    registry.insert(first, Vec::new());
                }
                0
            }
        };

        let attribute_indices: Vec<(String, Option<usize>)> = attribute_columns
            .iter()
            .map(|column| (column.clone(), headers.iter().position(|h| h == column)))
            .collect();

        for row in csv.records() {
            let row = row.map_err(|e| BodaccError::parse(format!("unreadable registry row: {e}")))?;
            let raw = row.get(id_index).unwrap_or("");

            let attributes = attribute_indices
                .iter()
                .map(|(column, index)| {
                    let value = index.and_then(|i| row.get(i)).unwrap_or("").trim();
                    (column.clone(), value.to_string())
                })
                .collect();

            registry.insert(raw, attributes);
        }

        if registry.invalid > 0 {
            warn!(invalid = registry.invalid, "ignored invalid identifiers");
        }

        Ok(registry)
    }

    fn insert(&mut self, raw: &str, attributes: Vec<(String, String)>) {
        let raw = raw.trim();
        let identifier = normalize_identifier(raw);
        if identifier.len() != IDENTIFIER_LEN {
            if !raw.is_empty() {
                self.invalid += 1;
            }
            return;
        }
        self.entries.insert(
            identifier.clone(),
            IdentifierEntry {
                identifier,
                attributes,
            },
        );
    }

    /// Look up a digit-normalized identifier.
    pub fn get(&self, identifier: &str) -> Option<&IdentifierEntry> {
        self.entries.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-empty identifiers rejected while loading.
    pub fn invalid_count(&self) -> usize {
        self.invalid
    }
}

impl FromIterator<IdentifierEntry> for IdentifierRegistry {
    fn from_iter<I: IntoIterator<Item = IdentifierEntry>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|entry| (entry.identifier.clone(), entry))
                .collect(),
            invalid: 0,
        }
    }
}
