use crate::breaker::CircuitBreaker;
use crate::config::{GeoConfig, RetryConfig};
use crate::metrics_defs::{BREAKER_REJECTED, LOOKUP_FALLBACK, LOOKUP_SUCCESS, LOOKUP_UNKNOWN};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use shared::counter;
use tokio::time::{Duration, sleep};

/// Returned when the upstream cannot be reached at all (retry exhaustion or
/// open breaker). Distinct from [`UNKNOWN_COUNTRY`].
pub const FALLBACK_COUNTRY: &str = "Fallback Country";

/// Returned when the upstream answered successfully but had no country for
/// the address.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

#[derive(Deserialize)]
struct GeoLookupResponse {
    country: Option<String>,
}

#[derive(thiserror::Error, Debug)]
enum GeoError {
    #[error("invalid lookup URL: {0}")]
    InvalidUrl(String),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
}

const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,     // 429
    StatusCode::INTERNAL_SERVER_ERROR, // 500
    StatusCode::BAD_GATEWAY,           // 502
    StatusCode::SERVICE_UNAVAILABLE,   // 503
    StatusCode::GATEWAY_TIMEOUT,       // 504
];

impl GeoError {
    fn is_retriable(&self) -> bool {
        match self {
            GeoError::InvalidUrl(_) => false,
            // Connect errors and timeouts are transient; a malformed body is not.
            GeoError::Request(e) => !e.is_decode(),
            GeoError::Status(status) => RETRIABLE_STATUS_CODES.contains(status),
        }
    }
}

/// Resolves a network address to a country name through the external lookup
/// service. Transient upstream failure is absorbed by retry, circuit breaker
/// and fallback: every call terminates in a country string.
pub struct GeoResolver {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl GeoResolver {
    pub fn new(config: GeoConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;

        Ok(GeoResolver {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            breaker: CircuitBreaker::new(config.breaker),
        })
    }

    pub async fn resolve_country(&self, addr: &str) -> String {
        if self.breaker.check().is_err() {
            counter!(BREAKER_REJECTED).increment(1);
            counter!(LOOKUP_FALLBACK).increment(1);
            return FALLBACK_COUNTRY.to_string();
        }

        match self.lookup_with_retry(addr).await {
            Ok(country) => {
                self.breaker.record_success();
                if country == UNKNOWN_COUNTRY {
                    counter!(LOOKUP_UNKNOWN).increment(1);
                } else {
                    counter!(LOOKUP_SUCCESS).increment(1);
                }
                country
            }
            Err(err) => {
                tracing::warn!(addr, error = %err, "geo lookup failed, using fallback country");
                self.breaker.record_failure();
                counter!(LOOKUP_FALLBACK).increment(1);
                FALLBACK_COUNTRY.to_string()
            }
        }
    }

    fn lookup_url(&self, addr: &str) -> Result<Url, GeoError> {
        let mut url = Url::parse(&format!("{}/json/{}", self.base_url, addr))
            .map_err(|e| GeoError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("fields", "country");
        Ok(url)
    }

    async fn lookup_with_retry(&self, addr: &str) -> Result<String, GeoError> {
        let url = self.lookup_url(addr)?;
        let mut retries = 0;

        loop {
            match self.attempt(url.clone()).await {
                Ok(country) => return Ok(country),
                Err(err) if err.is_retriable() && retries + 1 < self.retry.max_attempts => {
                    // Backoff between retries
                    let delay = self.retry.base_delay_ms * 2_u64.pow(retries);
                    tracing::debug!(addr, attempt = retries + 1, delay_ms = delay, error = %err, "retrying geo lookup");
                    sleep(Duration::from_millis(delay)).await;
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, url: Url) -> Result<String, GeoError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status()));
        }

        let body = response.json::<GeoLookupResponse>().await?;

        // A success without a country is "Unknown", never the fallback.
        match body.country {
            Some(country) if !country.is_empty() => Ok(country),
            _ => Ok(UNKNOWN_COUNTRY.to_string()),
        }
    }
}
