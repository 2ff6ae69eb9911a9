//! Fragment staging and day-artifact merging.
//!
//! Each successful page is staged as its own fragment in the temporary
//! directory. Once every category of a day has been fetched, the fragments
//! are merged (category order, then page order) into the single day
//! artifact and deleted. The merge is the only writer of day artifacts.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use bodacc_shared::{
    AnnouncementRecord, ArtifactNames, BodaccError, Category, FragmentName, Result,
    read_jsonl_lines, write_atomic,
};

/// Summary of a completed merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The day artifact written.
    pub path: PathBuf,
    /// Fragments consumed.
    pub fragments: usize,
    /// Records written.
    pub records: usize,
}

/// Owns the fragment-to-day-artifact lifecycle.
#[derive(Debug, Clone)]
pub struct FragmentStager {
    tmp_dir: PathBuf,
    daily_dir: PathBuf,
    names: ArtifactNames,
}

impl FragmentStager {
    pub fn new(tmp_dir: impl Into<PathBuf>, daily_dir: impl Into<PathBuf>, names: ArtifactNames) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
            daily_dir: daily_dir.into(),
            names,
        }
    }

    /// Final artifact location for `day`.
    pub fn day_artifact_path(&self, day: NaiveDate) -> PathBuf {
        self.daily_dir.join(self.names.day_file(day))
    }

    /// Whether `day` has already been fetched to completion.
    pub fn day_artifact_exists(&self, day: NaiveDate) -> bool {
        self.day_artifact_path(day).is_file()
    }

    /// Delete fragments left for `day` by an interrupted run.
    ///
    /// Returns the number of fragments removed. Removal failures are logged
    /// and do not stop the run.
    pub fn cleanup_stale(&self, day: NaiveDate) -> Result<usize> {
        let fragments = self.fragments_for(day)?;
        let mut removed = 0;
        for (_, path) in &fragments {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale fragment"),
            }
        }
        if removed > 0 {
            info!(%day, removed, "removed stale fragments");
        }
        Ok(removed)
    }

    /// Write one page of records as fragment `page` of (day, category).
    pub fn stage(
        &self,
        day: NaiveDate,
        category: Category,
        page: u32,
        records: &[AnnouncementRecord],
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.tmp_dir).map_err(|e| BodaccError::io(&self.tmp_dir, e))?;

        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| BodaccError::parse(format!("cannot serialize record: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let path = self.tmp_dir.join(self.names.fragment_file(day, category, page));
        std::fs::write(&path, content).map_err(|e| BodaccError::io(&path, e))?;
        Ok(path)
    }

    /// Merge every fragment of `day` into its day artifact, then delete them.
    ///
    /// With no fragments an empty artifact is written, so the day counts as
    /// attempted and is not fetched again.
    #[instrument(skip_all, fields(%day))]
    pub fn merge(&self, day: NaiveDate) -> Result<MergeOutcome> {
        let fragments = self.fragments_for(day)?;
        let target = self.day_artifact_path(day);

        let mut content = String::new();
        let mut records = 0;
        for (_, path) in &fragments {
            for line in read_jsonl_lines(path)? {
                content.push_str(&line.raw);
                content.push('\n');
                records += 1;
            }
        }

        write_atomic(&target, content.as_bytes())?;

        for (_, path) in &fragments {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove merged fragment");
            }
        }

        if fragments.is_empty() {
            info!(path = %target.display(), "no fragments, wrote empty day artifact");
        } else {
            info!(
                path = %target.display(),
                fragments = fragments.len(),
                records,
                "merged day artifact"
            );
        }

        Ok(MergeOutcome {
            path: target,
            fragments: fragments.len(),
            records,
        })
    }

    /// Fragments of `day`, ordered by category then page.
    fn fragments_for(&self, day: NaiveDate) -> Result<Vec<(FragmentName, PathBuf)>> {
        let mut fragments = Vec::new();
        if !self.tmp_dir.exists() {
            return Ok(fragments);
        }

        let entries = std::fs::read_dir(&self.tmp_dir).map_err(|e| BodaccError::io(&self.tmp_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BodaccError::io(&self.tmp_dir, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| self.names.parse_fragment(n)) else {
                continue;
            };
            if name.day == day {
                fragments.push((name, entry.path()));
            }
        }

        fragments.sort_by_key(|(name, _)| (name.category.rank(), name.page));
        Ok(fragments)
    }

    /// Staging directory.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Dirs {
        root: PathBuf,
        stager: FragmentStager,
    }

    impl Drop for Dirs {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn setup() -> Dirs {
        let root = std::env::temp_dir().join(format!("bodacc-staging-test-{}", uuid::Uuid::now_v7()));
        let names = ArtifactNames::new("bodacc_update", "bodacc_filtered").unwrap();
        let stager = FragmentStager::new(root.join("tmp"), root.join("daily"), names);
        Dirs { root, stager }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn record(n: i64) -> AnnouncementRecord {
        json!({"numeroannonce": n, "dateparution": "2024-03-05"})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn artifact_numbers(path: &Path) -> Vec<i64> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["numeroannonce"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn merge_orders_by_category_then_page() {
        let d = setup();
        // Staged out of order, including a page index past 999.
        d.stager.stage(day(), Category::C, 1, &[record(30)]).unwrap();
        d.stager.stage(day(), Category::A, 1000, &[record(3)]).unwrap();
        d.stager.stage(day(), Category::A, 2, &[record(2)]).unwrap();
        d.stager.stage(day(), Category::A, 1, &[record(1)]).unwrap();
        d.stager.stage(day(), Category::B, 1, &[record(10), record(11)]).unwrap();

        let outcome = d.stager.merge(day()).unwrap();
        assert_eq!(outcome.fragments, 5);
        assert_eq!(outcome.records, 6);
        assert_eq!(artifact_numbers(&outcome.path), vec![1, 2, 3, 10, 11, 30]);

        // Fragments are consumed.
        assert_eq!(std::fs::read_dir(d.stager.tmp_dir()).unwrap().count(), 0);
        assert!(d.stager.day_artifact_exists(day()));
    }

    #[test]
    fn merge_without_fragments_writes_empty_artifact() {
        let d = setup();
        let outcome = d.stager.merge(day()).unwrap();
        assert_eq!(outcome.fragments, 0);
        assert_eq!(std::fs::read_to_string(&outcome.path).unwrap(), "");
        assert!(d.stager.day_artifact_exists(day()));
    }

    #[test]
    fn merge_ignores_other_days() {
        let d = setup();
        let other = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        d.stager.stage(other, Category::A, 1, &[record(99)]).unwrap();
        d.stager.stage(day(), Category::A, 1, &[record(1)]).unwrap();

        let outcome = d.stager.merge(day()).unwrap();
        assert_eq!(artifact_numbers(&outcome.path), vec![1]);
        assert_eq!(std::fs::read_dir(d.stager.tmp_dir()).unwrap().count(), 1);
    }

    #[test]
    fn merge_drops_malformed_fragment_lines() {
        let d = setup();
        let path = d.stager.stage(day(), Category::A, 1, &[record(1)]).unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"numeroannonce\": 2, truncated\n");
        std::fs::write(&path, content).unwrap();

        let outcome = d.stager.merge(day()).unwrap();
        assert_eq!(outcome.records, 1);
    }

    #[test]
    fn cleanup_removes_only_that_days_fragments() {
        let d = setup();
        let other = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        d.stager.stage(day(), Category::A, 1, &[record(1)]).unwrap();
        d.stager.stage(day(), Category::B, 1, &[record(2)]).unwrap();
        d.stager.stage(other, Category::A, 1, &[record(3)]).unwrap();
        std::fs::write(d.stager.tmp_dir().join("unrelated.txt"), "keep").unwrap();

        assert_eq!(d.stager.cleanup_stale(day()).unwrap(), 2);
        assert_eq!(std::fs::read_dir(d.stager.tmp_dir()).unwrap().count(), 2);
        assert_eq!(d.stager.cleanup_stale(day()).unwrap(), 0);
    }

    #[test]
    fn cleanup_without_staging_dir_is_noop() {
        let d = setup();
        assert_eq!(d.stager.cleanup_stale(day()).unwrap(), 0);
    }

    #[test]
    fn stage_preserves_key_order() {
        let d = setup();
        let rec = json!({"z": 1, "a": 2, "m": {"y": 1, "b": 2}}).as_object().cloned().unwrap();
        let path = d.stager.stage(day(), Category::A, 1, &[rec]).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "{\"z\":1,\"a\":2,\"m\":{\"y\":1,\"b\":2}}\n"
        );
    }
}
