//! Core domain types for the announcement pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BodaccError, Result};

/// One announcement as returned by the API: an untyped JSON object.
///
/// Immutable once fetched, except for the enrichment fields the filter stage
/// appends before emitting it.
pub type AnnouncementRecord = Map<String, Value>;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Publication type partitioning the announcements of a day (`publicationavis`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    A,
    B,
    C,
}

/// Every category, in the order they are fetched and merged.
pub const CATEGORIES: [Category; 3] = [Category::A, Category::B, Category::C];

impl Category {
    /// The value sent to the API and embedded in fragment names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    /// Position in [`CATEGORIES`], used to order fragments at merge time.
    pub fn rank(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = BodaccError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            other => Err(BodaccError::validation(format!(
                "unknown publication category '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Days
// ---------------------------------------------------------------------------

/// Accepted layouts for the `dateparution` field, tried in order.
const PUBLICATION_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d"];

/// `YYYYMMDD` stamp used as the prefix of every artifact name.
pub fn day_stamp(day: NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}

/// Parse a user-supplied ISO day (`YYYY-MM-DD`).
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| BodaccError::parse(format!("invalid date '{value}' (expected YYYY-MM-DD): {e}")))
}

/// Parse a record's publication date, accepting any of the known layouts.
pub fn parse_publication_date(value: &str) -> Option<NaiveDate> {
    PUBLICATION_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_ordered() {
        let ranks: Vec<usize> = CATEGORIES.iter().map(|c| c.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!("B".parse::<Category>().unwrap(), Category::B);
        assert!("D".parse::<Category>().is_err());
    }

    #[test]
    fn day_stamp_is_compact() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(day_stamp(day), "20240305");
    }

    #[test]
    fn publication_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_publication_date("2024-03-05"), expected);
        assert_eq!(parse_publication_date("05/03/2024"), expected);
        assert_eq!(parse_publication_date("20240305"), expected);
        assert_eq!(parse_publication_date("March 5th"), None);
        assert_eq!(parse_publication_date(""), None);
    }

    #[test]
    fn parse_day_rejects_garbage() {
        assert!(parse_day("2024-13-01").is_err());
        assert_eq!(
            parse_day(" 2024-03-05 ").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }
}
