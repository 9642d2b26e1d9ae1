use std::io::Read;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde::Deserialize;

use crate::domain::Credentials;
use crate::error::TaxlenError;

pub const DEFAULT_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const TOOL_NAME: &str = "kira-taxlen";

/// Server-side handle to a stored ESearch result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHistory {
    pub web_env: String,
    pub query_key: String,
    pub count: u64,
}

pub trait EntrezClient: Send + Sync {
    fn search(&self, db: &str, term: &str) -> Result<SearchHistory, TaxlenError>;

    /// Streams GenBank flat-file text for the first `max_records` entries of `history`.
    fn bulk_fetch(
        &self,
        db: &str,
        history: &SearchHistory,
        max_records: u32,
    ) -> Result<Box<dyn Read + Send>, TaxlenError>;
}

/// Per-run client settings. Built once and handed to the client; nothing global is mutated.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub tool: String,
    pub base_url: String,
}

impl ClientConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            tool: TOOL_NAME.to_string(),
            base_url: DEFAULT_EUTILS_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn identity_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("tool", self.tool.clone()),
            ("email", self.credentials.email.trim().to_string()),
        ];
        if let Some(key) = self.credentials.api_key() {
            params.push(("api_key", key.to_string()));
        }
        params
    }
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    config: ClientConfig,
}

impl EntrezHttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, TaxlenError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("{TOOL_NAME}/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TaxlenError::NcbiHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| TaxlenError::NcbiHttp(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, utility: &str) -> String {
        format!("{}/{utility}.fcgi", self.config.base_url)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, TaxlenError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "NCBI request failed".to_string());
        Err(TaxlenError::NcbiStatus { status, message })
    }

    /// Sends with up to [`MAX_RETRIES`] retries on throttling, 5xx and transport
    /// failures. A 429 waits for NCBI's `Retry-After` when it sends one.
    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, TaxlenError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        let pace = request_spacing(self.config.credentials.api_key().is_some());
        let mut attempt = 0u32;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let retry_after = (status == 429)
                            .then(|| resp.headers().get(RETRY_AFTER))
                            .flatten();
                        let delay = retry_delay(pace, attempt, retry_after);
                        tracing::warn!(
                            status,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "E-utilities busy, retrying"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) if attempt < MAX_RETRIES && is_retryable_error(&err) => {
                    let delay = retry_delay(pace, attempt, None);
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "E-utilities request failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(TaxlenError::NcbiHttp(err.to_string())),
            }
        }
    }
}

impl EntrezClient for EntrezHttpClient {
    fn search(&self, db: &str, term: &str) -> Result<SearchHistory, TaxlenError> {
        let url = self.endpoint("esearch");
        let mut params = vec![
            ("db", db.to_string()),
            ("term", term.to_string()),
            ("usehistory", "y".to_string()),
            ("retmode", "json".to_string()),
        ];
        params.extend(self.config.identity_params());

        tracing::debug!(db, term, "esearch");
        let response = self.send_with_retries(|| self.client.get(&url).query(&params))?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| TaxlenError::NcbiHttp(err.to_string()))?;
        parse_search_response(&body)
    }

    fn bulk_fetch(
        &self,
        db: &str,
        history: &SearchHistory,
        max_records: u32,
    ) -> Result<Box<dyn Read + Send>, TaxlenError> {
        let url = self.endpoint("efetch");
        let mut params = vec![
            ("db", db.to_string()),
            ("WebEnv", history.web_env.clone()),
            ("query_key", history.query_key.clone()),
            ("rettype", "gb".to_string()),
            ("retmode", "text".to_string()),
            ("retmax", max_records.to_string()),
        ];
        params.extend(self.config.identity_params());

        tracing::debug!(db, query_key = %history.query_key, max_records, "efetch");
        let response = self.send_with_retries(|| self.client.get(&url).query(&params))?;
        let response = Self::handle_status(response)?;
        Ok(Box::new(response))
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    esearchresult: Option<SearchResultBody>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResultBody {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    querykey: Option<String>,
    #[serde(default)]
    webenv: Option<String>,
    #[serde(default, rename = "ERROR")]
    error: Option<String>,
}

/// Extracts the history handle and match count from an ESearch JSON body.
pub fn parse_search_response(body: &str) -> Result<SearchHistory, TaxlenError> {
    let envelope: SearchEnvelope = serde_json::from_str(body)
        .map_err(|err| TaxlenError::NcbiResponse(format!("esearch body is not JSON: {err}")))?;
    if let Some(error) = envelope.error {
        return Err(TaxlenError::NcbiResponse(error));
    }
    let result = envelope
        .esearchresult
        .ok_or_else(|| TaxlenError::NcbiResponse("missing esearchresult".to_string()))?;
    if let Some(error) = result.error {
        return Err(TaxlenError::NcbiResponse(error));
    }

    let web_env = result
        .webenv
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TaxlenError::NcbiResponse("missing webenv".to_string()))?;
    let query_key = result
        .querykey
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TaxlenError::NcbiResponse("missing querykey".to_string()))?;
    let count = result
        .count
        .ok_or_else(|| TaxlenError::NcbiResponse("missing count".to_string()))?;
    let count = count
        .trim()
        .parse::<u64>()
        .map_err(|_| TaxlenError::NcbiResponse(format!("invalid count: {count}")))?;

    Ok(SearchHistory {
        web_env,
        query_key,
        count,
    })
}

const MAX_RETRIES: u32 = 3;
// NCBI allows 3 requests/s per client without an API key and 10/s with one.
const SPACING_WITHOUT_KEY: Duration = Duration::from_millis(340);
const SPACING_WITH_KEY: Duration = Duration::from_millis(110);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

fn request_spacing(has_api_key: bool) -> Duration {
    if has_api_key {
        SPACING_WITH_KEY
    } else {
        SPACING_WITHOUT_KEY
    }
}

/// Linear backoff in units of the allowed request spacing, unless the server named a
/// wait in whole seconds. HTTP-date values are ignored.
fn retry_delay(pace: Duration, attempt: u32, retry_after: Option<&HeaderValue>) -> Duration {
    let backoff = pace * (attempt + 1);
    retry_after
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER).max(backoff))
        .unwrap_or(backoff)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_scales_with_key_rate_limit() {
        let without_key = request_spacing(false);
        let with_key = request_spacing(true);
        assert!(with_key < without_key);
        assert_eq!(retry_delay(without_key, 0, None), Duration::from_millis(340));
        assert_eq!(retry_delay(with_key, 2, None), Duration::from_millis(330));
    }

    #[test]
    fn retry_delay_honours_retry_after_seconds() {
        let pace = request_spacing(false);
        let two = HeaderValue::from_static("2");
        assert_eq!(retry_delay(pace, 0, Some(&two)), Duration::from_secs(2));

        let huge = HeaderValue::from_static("3600");
        assert_eq!(retry_delay(pace, 0, Some(&huge)), MAX_RETRY_AFTER);

        let zero = HeaderValue::from_static("0");
        assert_eq!(retry_delay(pace, 1, Some(&zero)), Duration::from_millis(680));

        let date = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(retry_delay(pace, 1, Some(&date)), Duration::from_millis(680));
    }

    #[test]
    fn identity_params_skip_blank_key() {
        let config = ClientConfig::new(Credentials::new(" me@example.org ", ""));
        let params = config.identity_params();
        assert_eq!(
            params,
            vec![
                ("tool", TOOL_NAME.to_string()),
                ("email", "me@example.org".to_string()),
            ]
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ClientConfig::new(Credentials::new("me@example.org", "key"))
            .with_base_url("http://localhost:8080/eutils/");
        assert_eq!(config.base_url, "http://localhost:8080/eutils");
        assert!(config.identity_params().contains(&("api_key", "key".to_string())));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
    }
}
