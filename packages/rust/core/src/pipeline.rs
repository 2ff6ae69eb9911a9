//! Day-range fetch run: day window → categories → fragments → day artifacts.

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use bodacc_fetcher::{FragmentStager, PaginatedFetcher};
use bodacc_shared::{AppConfig, ArtifactNames, CATEGORIES, Category, FetchSettings, Result};

use crate::window::DayWindow;

/// Result of a fetch run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Days fetched and merged in this run.
    pub days_fetched: usize,
    /// Days skipped because their artifact already existed.
    pub days_skipped: usize,
    /// Fragments merged into day artifacts.
    pub fragments: usize,
    /// Records written to day artifacts.
    pub records: usize,
    /// Categories given up on after exhausting retries.
    pub abandoned: Vec<(NaiveDate, Category)>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a day's categories are fetched.
    fn day_started(&self, day: NaiveDate, index: usize, total: usize);
    /// Called when a day is skipped because its artifact exists.
    fn day_skipped(&self, day: NaiveDate);
    /// Called after each category, with the records staged for it.
    fn category_done(&self, day: NaiveDate, category: Category, records: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn day_started(&self, _day: NaiveDate, _index: usize, _total: usize) {}
    fn day_skipped(&self, _day: NaiveDate) {}
    fn category_done(&self, _day: NaiveDate, _category: Category, _records: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Fetches every day of a window, one day and one category at a time.
pub struct DayRangeOrchestrator {
    fetcher: PaginatedFetcher,
    stager: FragmentStager,
}

impl DayRangeOrchestrator {
    pub fn new(fetcher: PaginatedFetcher, stager: FragmentStager) -> Self {
        Self { fetcher, stager }
    }

    /// Build the fetcher and stager from the loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = PaginatedFetcher::new(&FetchSettings::from(config))?;
        let stager = FragmentStager::new(
            config.directories.tmp_dir.clone(),
            config.directories.daily_path(),
            ArtifactNames::from_config(config)?,
        );
        Ok(Self::new(fetcher, stager))
    }

    pub fn stager(&self) -> &FragmentStager {
        &self.stager
    }

    /// Fetch every day of `window` that has no day artifact yet.
    ///
    /// A category that exhausts its retries is recorded in
    /// [`RunSummary::abandoned`] and the day is still merged from whatever
    /// was staged. Any other error stops the run; fragments already staged
    /// for the current day are cleaned up by the next run.
    #[instrument(skip_all, fields(start = %window.start, end = %window.end))]
    pub async fn run(&self, window: &DayWindow, progress: &dyn ProgressReporter) -> Result<RunSummary> {
        let started = Instant::now();
        let total = window.day_count();
        let mut summary = RunSummary::default();

        info!(days = total, "starting fetch run");

        for (index, day) in window.days().enumerate() {
            if self.stager.day_artifact_exists(day) {
                info!(%day, "day artifact present, skipping");
                summary.days_skipped += 1;
                progress.day_skipped(day);
                continue;
            }

            progress.day_started(day, index + 1, total);
            self.fetch_day(day, &mut summary, progress).await?;
        }

        summary.elapsed = started.elapsed();
        info!(
            fetched = summary.days_fetched,
            skipped = summary.days_skipped,
            records = summary.records,
            abandoned = summary.abandoned.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "fetch run complete"
        );
        progress.done(&summary);
        Ok(summary)
    }

    #[instrument(skip_all, fields(%day))]
    async fn fetch_day(
        &self,
        day: NaiveDate,
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        self.stager.cleanup_stale(day)?;

        for category in CATEGORIES {
            match self.fetcher.fetch(day, category, &self.stager).await {
                Ok(fetched) => progress.category_done(day, category, fetched.records),
                Err(e) if e.is_recoverable() => {
                    warn!(%category, error = %e, "category incomplete, merging what was staged");
                    summary.abandoned.push((day, category));
                    progress.category_done(day, category, 0);
                }
                Err(e) => return Err(e),
            }
        }

        let merged = self.stager.merge(day)?;
        summary.days_fetched += 1;
        summary.fragments += merged.fragments;
        summary.records += merged.records;
        Ok(())
    }
}
