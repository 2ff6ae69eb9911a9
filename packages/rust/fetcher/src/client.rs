//! HTTP client for the announcement records endpoint.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use bodacc_shared::{AnnouncementRecord, BodaccError, Category, FetchSettings, Result};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("bodacc-pipeline/", env!("CARGO_PKG_VERSION"));

/// Outcome of a single page request that reached the server.
#[derive(Debug, Clone)]
pub enum PageResponse {
    /// A decoded page, possibly empty.
    Records(Vec<AnnouncementRecord>),
    /// HTTP 429: the same request must be repeated after a pause.
    RateLimited,
}

/// Client for one records endpoint.
pub struct ApiClient {
    client: Client,
    endpoint: Url,
}

impl ApiClient {
    /// Build a client from the runtime fetch settings (timeout, proxy, extra CA).
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let endpoint = Url::parse(&settings.api_url)
            .map_err(|e| BodaccError::config(format!("invalid API url '{}': {e}", settings.api_url)))?;

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(settings.request_timeout.max(Duration::from_secs(1)));

        if let Some(proxy) = &settings.proxy {
            let proxy_url = if proxy.url.contains("://") {
                proxy.url.clone()
            } else {
                format!("http://{}", proxy.url)
            };
            let mut p = reqwest::Proxy::all(&proxy_url).map_err(|e| {
                BodaccError::config(format!("invalid proxy '{}': {e}", proxy.url))
            })?;
            if let (Some(user), Some(password)) = (&proxy.user, &proxy.password) {
                p = p.basic_auth(user, password);
            }
            builder = builder.proxy(p);
        }

        if let Some(cert_path) = &settings.cert_file {
            let pem = std::fs::read(cert_path).map_err(|e| BodaccError::io(cert_path, e))?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                BodaccError::config(format!("invalid certificate {}: {e}", cert_path.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| BodaccError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    /// URL of the page after `cursor` for one (day, category), ascending by sequence number.
    pub fn page_url(&self, day: NaiveDate, category: Category, cursor: i64, limit: usize) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("refine", &format!("dateparution:{}", day.format("%Y-%m-%d")))
            .append_pair(
                "where",
                &format!("publicationavis = '{category}' AND numeroannonce > {cursor}"),
            )
            .append_pair("order_by", "numeroannonce")
            .append_pair("limit", &limit.to_string());
        url
    }

    /// Issue one GET.
    ///
    /// Network errors, non-2xx statuses other than 429, and undecodable bodies
    /// are returned as errors; the caller treats all of them as transient.
    pub async fn fetch_page(&self, url: &Url) -> Result<PageResponse> {
        debug!(%url, "requesting page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| BodaccError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(PageResponse::RateLimited);
        }
        if !status.is_success() {
            return Err(BodaccError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BodaccError::Network(format!("{url}: body read failed: {e}")))?;

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| BodaccError::parse(format!("{url}: invalid JSON payload: {e}")))?;

        Ok(PageResponse::Records(extract_records(payload)))
    }
}

/// Pull the records out of an API payload.
///
/// `results` items are unwrapped from their `record` or `fields` object when
/// present; `records` items are taken as they are. Non-object items are dropped.
pub fn extract_records(payload: Value) -> Vec<AnnouncementRecord> {
    let Value::Object(mut payload) = payload else {
        return Vec::new();
    };

    if let Some(Value::Array(results)) = payload.remove("results") {
        return results
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(mut wrapper) => {
                    let inner_key = ["record", "fields"]
                        .into_iter()
                        .find(|key| wrapper.get(*key).is_some_and(Value::is_object));
                    match inner_key.and_then(|key| wrapper.remove(key)) {
                        Some(Value::Object(inner)) => Some(inner),
                        _ => Some(wrapper),
                    }
                }
                _ => None,
            })
            .collect();
    }

    if let Some(Value::Array(records)) = payload.remove("records") {
        return records
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect();
    }

    Vec::new()
}
