//! Cursor-driven pagination over one (day, category).
//!
//! Pages are requested in ascending `numeroannonce` order, each one asking
//! for sequence numbers strictly above the highest already seen. Every
//! non-empty page is staged as a fragment before the next request, so an
//! abandoned category keeps the pages it already has.

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use bodacc_shared::{AnnouncementRecord, BodaccError, Category, FetchSettings, Result};

use crate::client::{ApiClient, PageResponse};
use crate::staging::FragmentStager;

/// Field holding the announcement sequence number.
const SEQUENCE_FIELD: &str = "numeroannonce";

/// Summary of one (day, category) pagination pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFetch {
    /// Fragments staged.
    pub pages: usize,
    /// Records staged.
    pub records: usize,
    /// Highest sequence number seen.
    pub cursor: i64,
}

/// Drives pagination, retry and rate-limit handling against the API.
pub struct PaginatedFetcher {
    client: ApiClient,
    per_page: usize,
    max_retries: u32,
    backoff_base: Duration,
    rate_limit_pause: Duration,
}

impl PaginatedFetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        Ok(Self::with_client(ApiClient::new(settings)?, settings))
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: ApiClient, settings: &FetchSettings) -> Self {
        Self {
            client,
            per_page: settings.per_page.max(1),
            max_retries: settings.max_retries.max(1),
            backoff_base: settings.backoff_base,
            rate_limit_pause: settings.rate_limit_pause,
        }
    }

    /// Fetch every record of (day, category), staging one fragment per page.
    ///
    /// Returns [`BodaccError::RetriesExhausted`] when a page keeps failing;
    /// fragments staged before that point stay on disk. Staging I/O errors
    /// are returned as-is.
    #[instrument(skip_all, fields(%day, %category))]
    pub async fn fetch(
        &self,
        day: NaiveDate,
        category: Category,
        stager: &FragmentStager,
    ) -> Result<CategoryFetch> {
        let mut progress = CategoryFetch::default();

        loop {
            let records = self.fetch_page_with_retry(day, category, &progress).await?;

            info!(cursor = progress.cursor, records = records.len(), "page received");

            if records.is_empty() {
                break;
            }

            let page = progress.pages as u32 + 1;
            stager.stage(day, category, page, &records)?;
            progress.pages += 1;
            progress.records += records.len();

            let short_page = records.len() < self.per_page;
            match records.iter().filter_map(sequence_number).max() {
                Some(page_max) if page_max > progress.cursor => progress.cursor = page_max,
                _ if !short_page => {
                    // The next request would be identical to this one.
                    warn!(page, cursor = progress.cursor, "full page did not advance the cursor, stopping");
                    break;
                }
                _ => {}
            }

            if short_page {
                break;
            }
        }

        info!(
            pages = progress.pages,
            records = progress.records,
            cursor = progress.cursor,
            "category fetched"
        );
        Ok(progress)
    }

    /// Request the page after the current cursor until it succeeds.
    ///
    /// Rate-limit responses pause and repeat the same request without using
    /// an attempt; any other failure backs off exponentially.
    async fn fetch_page_with_retry(
        &self,
        day: NaiveDate,
        category: Category,
        progress: &CategoryFetch,
    ) -> Result<Vec<AnnouncementRecord>> {
        let url = self.client.page_url(day, category, progress.cursor, self.per_page);
        let mut attempt: u32 = 0;

        loop {
            match self.client.fetch_page(&url).await {
                Ok(PageResponse::Records(records)) => return Ok(records),
                Ok(PageResponse::RateLimited) => {
                    warn!(
                        pause_secs = self.rate_limit_pause.as_secs_f64(),
                        "429 Too Many Requests, pausing"
                    );
                    tokio::time::sleep(self.rate_limit_pause).await;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        error!(attempts = attempt, error = %e, "giving up on category for this day");
                        return Err(BodaccError::RetriesExhausted {
                            day,
                            category,
                            attempts: attempt,
                            pages_staged: progress.pages,
                            last_error: e.to_string(),
                        });
                    }
                    let wait = self.backoff(attempt - 1);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        wait_secs = wait.as_secs_f64(),
                        error = %e,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// `backoff_base * 2^attempt`, saturating.
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Sequence number of a record, when present as an integer or numeric string.
pub fn sequence_number(record: &AnnouncementRecord) -> Option<i64> {
    match record.get(SEQUENCE_FIELD)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodacc_shared::{AppConfig, ArtifactNames};
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        root: std::path::PathBuf,
        stager: FragmentStager,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn harness() -> Harness {
        let root = std::env::temp_dir().join(format!("bodacc-engine-test-{}", uuid::Uuid::now_v7()));
        let names = ArtifactNames::new("bodacc_update", "bodacc_filtered").unwrap();
        let stager = FragmentStager::new(root.join("tmp"), root.join("daily"), names);
        Harness { root, stager }
    }

    fn settings(server: &MockServer, per_page: usize, max_retries: u32) -> FetchSettings {
        let mut config = AppConfig::default();
        config.api.url = format!("{}/records", server.uri());
        config.api.per_page = per_page;
        config.api.max_retries = max_retries;
        config.api.backoff_base_secs = 0.0;
        config.api.too_many_requests_timeout_secs = 0;
        FetchSettings::from(&config)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn page(numbers: &[i64]) -> serde_json::Value {
        let results: Vec<_> = numbers
            .iter()
            .map(|n| json!({"numeroannonce": n, "dateparution": "2024-03-05"}))
            .collect();
        json!({"total_count": results.len(), "results": results})
    }

    fn after(category: &str, cursor: i64) -> wiremock::matchers::QueryParamExactMatcher {
        query_param(
            "where",
            format!("publicationavis = '{category}' AND numeroannonce > {cursor}"),
        )
    }

    fn fragment_count(stager: &FragmentStager) -> usize {
        std::fs::read_dir(stager.tmp_dir()).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn sequence_number_variants() {
        let rec = |v: serde_json::Value| json!({"numeroannonce": v}).as_object().cloned().unwrap();
        assert_eq!(sequence_number(&rec(json!(12))), Some(12));
        assert_eq!(sequence_number(&rec(json!(" 13 "))), Some(13));
        assert_eq!(sequence_number(&rec(json!("n/a"))), None);
        assert_eq!(sequence_number(&rec(json!(null))), None);
        assert_eq!(sequence_number(&serde_json::Map::new()), None);
    }

    #[tokio::test]
    async fn paginates_until_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(after("A", 0))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[1, 2])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(after("A", 2))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[5, 9])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(after("A", 9))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[11])))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 2, 3)).unwrap();
        let result = fetcher.fetch(day(), Category::A, &h.stager).await.unwrap();

        assert_eq!(
            result,
            CategoryFetch {
                pages: 3,
                records: 5,
                cursor: 11
            }
        );
        assert_eq!(fragment_count(&h.stager), 3);
    }

    #[tokio::test]
    async fn full_pages_continue_until_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(after("B", 0))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(after("B", 2))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 2, 3)).unwrap();
        let result = fetcher.fetch(day(), Category::B, &h.stager).await.unwrap();

        assert_eq!(result.pages, 1);
        assert_eq!(result.records, 2);
    }

    #[tokio::test]
    async fn empty_first_page_stages_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 100, 3)).unwrap();
        let result = fetcher.fetch(day(), Category::C, &h.stager).await.unwrap();

        assert_eq!(result, CategoryFetch::default());
        assert_eq!(fragment_count(&h.stager), 0);
    }

    #[tokio::test]
    async fn rate_limit_does_not_consume_attempts() {
        let server = MockServer::start().await;
        // Three 429s with a budget of two attempts: still succeeds.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(after("A", 0))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[4])))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 10, 2)).unwrap();
        let result = fetcher.fetch(day(), Category::A, &h.stager).await.unwrap();

        assert_eq!(result.records, 1);
        assert_eq!(result.cursor, 4);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[7])))
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 10, 3)).unwrap();
        let result = fetcher.fetch(day(), Category::A, &h.stager).await.unwrap();

        assert_eq!(result.records, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_keep_staged_fragments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(after("A", 0))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(after("A", 2))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 2, 4)).unwrap();
        let err = fetcher.fetch(day(), Category::A, &h.stager).await.unwrap_err();

        match err {
            BodaccError::RetriesExhausted {
                attempts,
                pages_staged,
                category,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(pages_staged, 1);
                assert_eq!(category, Category::A);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(fragment_count(&h.stager), 1);
    }

    #[tokio::test]
    async fn full_page_without_cursor_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "x"}, {"id": "y"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 2, 3)).unwrap();
        let result = fetcher.fetch(day(), Category::A, &h.stager).await.unwrap();

        assert_eq!(result.pages, 1);
        assert_eq!(result.cursor, 0);
    }

    #[tokio::test]
    async fn each_page_starts_above_previous_max() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(after("A", 0))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[3, 1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(after("A", 3))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[4])))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness();
        let fetcher = PaginatedFetcher::new(&settings(&server, 3, 3)).unwrap();
        let result = fetcher.fetch(day(), Category::A, &h.stager).await.unwrap();
        assert_eq!(result.cursor, 4);
    }

    #[test]
    fn backoff_doubles() {
        let mut config = AppConfig::default();
        config.api.backoff_base_secs = 1.5;
        let fetcher = PaginatedFetcher::new(&FetchSettings::from(&config)).unwrap();
        assert_eq!(fetcher.backoff(0), Duration::from_millis(1500));
        assert_eq!(fetcher.backoff(1), Duration::from_secs(3));
        assert_eq!(fetcher.backoff(3), Duration::from_secs(12));
    }
}
