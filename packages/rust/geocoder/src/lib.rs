//! Address → census block geocoding.
//!
//! [`CensusGeocoder`] calls the Census Bureau geographies-by-address endpoint
//! and reduces its response to a [`BlockGeoid`] or a [`SkipReason`]. Nothing in
//! here fails a run: every per-address problem, including transport errors, is
//! a skip. Retries are bounded by the configured [`RetryPolicy`].
//!
//! The [`Geocode`] trait is the seam the pipeline depends on, so tests can swap
//! in a deterministic implementation.

mod response;

use std::future::Future;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use tractcheck_shared::{
    Address, BlockGeoid, GeocoderConfig, Result, RetryPolicy, SkipReason, TractcheckError,
};

pub use response::{interpret, interpret_value};

/// User-Agent string for geocoding requests.
const USER_AGENT: &str = concat!("tractcheck/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// Result of geocoding one address.
pub type GeocodeOutcome = std::result::Result<BlockGeoid, SkipReason>;

// ---------------------------------------------------------------------------
// Geocode trait
// ---------------------------------------------------------------------------

/// Resolves an address to a census block GEOID.
pub trait Geocode: Send + Sync + 'static {
    /// Geocode one address. Never fails; problems are reported as a [`SkipReason`].
    fn geocode(&self, address: &Address) -> impl Future<Output = GeocodeOutcome> + Send;
}

// ---------------------------------------------------------------------------
// CensusGeocoder
// ---------------------------------------------------------------------------

/// HTTP client for the Census geocoder.
#[derive(Debug, Clone)]
pub struct CensusGeocoder {
    client: Client,
    endpoint: Url,
    benchmark: String,
    vintage: String,
    retry: RetryPolicy,
    geoid_length: usize,
    /// Cuts retry backoff short; never cancelled unless one is attached.
    cancel: CancellationToken,
}

impl CensusGeocoder {
    /// Build a geocoder from runtime configuration.
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            TractcheckError::config(format!("invalid geocoder endpoint '{}': {e}", config.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| TractcheckError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            benchmark: config.benchmark.clone(),
            vintage: config.vintage.clone(),
            retry: config.retry,
            geoid_length: config.geoid_length,
            cancel: CancellationToken::new(),
        })
    }

    /// Stop retrying once `cancel` fires. The attempt in progress still runs
    /// to completion or timeout.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The full request URL for an address.
    ///
    /// Query values are form-encoded, so spaces become `+`.
    pub fn request_url(&self, address: &Address) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("street", address.street.trim())
            .append_pair("city", address.city.trim())
            .append_pair("state", address.state.trim())
            .append_pair("zip", address.zip.trim())
            .append_pair("benchmark", &self.benchmark)
            .append_pair("vintage", &self.vintage)
            .append_pair("format", "json");
        url
    }

    /// One request, no retry.
    async fn attempt(&self, url: &Url) -> GeocodeOutcome {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "geocoder request failed");
                return Err(SkipReason::TransportError);
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(%status, error = %e, "failed to read geocoder response body");
                return Err(SkipReason::TransportError);
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                debug!(%status, "geocoder returned non-JSON error response");
                return Err(SkipReason::TransportError);
            }
            Err(_) => return Err(SkipReason::MalformedResponse),
        };

        if !status.is_success() {
            debug!(%status, "geocoder returned error status with JSON body");
        }

        interpret_value(value, self.geoid_length)
    }
}

impl Geocode for CensusGeocoder {
    #[instrument(skip_all, fields(zip = %address.zip))]
    async fn geocode(&self, address: &Address) -> GeocodeOutcome {
        let url = self.request_url(address);
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let outcome = self.attempt(&url).await;
            match outcome {
                Err(SkipReason::TransportError) if attempt < max_attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "geocoder transport error, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            debug!(attempt, "cancelled during backoff, giving up");
                            return outcome;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                }
                _ => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MATCH_BODY: &str = r#"{"result":{"input":{},"addressMatches":[{"matchedAddress":"4600 SILVER HILL RD, WASHINGTON, DC, 20233","geographies":{"Census Blocks":[{"GEOID":"110010062021006","BLOCK":"1006"}]}}]}}"#;

    fn silver_hill() -> Address {
        Address {
            street: "4600 Silver Hill Rd".into(),
            city: "Washington".into(),
            state: "DC".into(),
            zip: "20233".into(),
        }
    }

    fn config_for(server: &MockServer, max_attempts: u32) -> GeocoderConfig {
        GeocoderConfig {
            endpoint: format!("{}/geocoder/geographies/address", server.uri()),
            benchmark: "Public_AR_Census2020".into(),
            vintage: "Census2010_Census2020".into(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
            geoid_length: 15,
        }
    }

    #[test]
    fn request_url_plus_encodes_spaces() {
        let config = GeocoderConfig {
            endpoint: "https://geocoding.geo.census.gov/geocoder/geographies/address".into(),
            benchmark: "Public_AR_Census2020".into(),
            vintage: "Census2010_Census2020".into(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            geoid_length: 15,
        };
        let geocoder = CensusGeocoder::new(&config).unwrap();
        let url = geocoder.request_url(&silver_hill());

        assert_eq!(
            url.as_str(),
            "https://geocoding.geo.census.gov/geocoder/geographies/address?\
             street=4600+Silver+Hill+Rd&city=Washington&state=DC&zip=20233\
             &benchmark=Public_AR_Census2020&vintage=Census2010_Census2020&format=json"
        );
    }

    #[test]
    fn invalid_endpoint_is_config_error() {
        let config = GeocoderConfig {
            endpoint: "not a url".into(),
            benchmark: "b".into(),
            vintage: "v".into(),
            timeout: Duration::from_secs(1),
            retry: RetryPolicy::none(),
            geoid_length: 15,
        };
        let err = CensusGeocoder::new(&config).unwrap_err();
        assert!(err.to_string().contains("invalid geocoder endpoint"));
    }

    #[tokio::test]
    async fn geocode_with_mock_server() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/geocoder/geographies/address"))
            .and(query_param("street", "4600 Silver Hill Rd"))
            .and(query_param("zip", "20233"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MATCH_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = CensusGeocoder::new(&config_for(&server, 1)).unwrap();
        let geoid = geocoder.geocode(&silver_hill()).await.unwrap();
        assert_eq!(geoid.as_str(), "110010062021006");
        assert_eq!(geoid.tract_prefix(4), "11001006202");
    }

    #[tokio::test]
    async fn no_match_is_skip() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"result":{"addressMatches":[]}}"#),
            )
            .mount(&server)
            .await;

        let geocoder = CensusGeocoder::new(&config_for(&server, 1)).unwrap();
        let outcome = geocoder.geocode(&silver_hill()).await;
        assert_eq!(outcome, Err(SkipReason::NoAddressMatch));
    }

    #[tokio::test]
    async fn non_json_success_body_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let geocoder = CensusGeocoder::new(&config_for(&server, 3)).unwrap();
        let outcome = geocoder.geocode(&silver_hill()).await;
        assert_eq!(outcome, Err(SkipReason::MalformedResponse));
    }

    #[tokio::test]
    async fn server_error_without_retry_is_transport_skip() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = CensusGeocoder::new(&config_for(&server, 1)).unwrap();
        let outcome = geocoder.geocode(&silver_hill()).await;
        assert_eq!(outcome, Err(SkipReason::TransportError));
    }

    #[tokio::test]
    async fn transport_errors_are_retried_up_to_max_attempts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .expect(3)
            .mount(&server)
            .await;

        let geocoder = CensusGeocoder::new(&config_for(&server, 3)).unwrap();
        let outcome = geocoder.geocode(&silver_hill()).await;
        assert_eq!(outcome, Err(SkipReason::TransportError));
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failure() {
        let server = MockServer::start().await;

        // First request fails, every later one succeeds.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MATCH_BODY))
            .mount(&server)
            .await;

        let geocoder = CensusGeocoder::new(&config_for(&server, 2)).unwrap();
        let geoid = geocoder.geocode(&silver_hill()).await.unwrap();
        assert_eq!(geoid.as_str(), "110010062021006");
    }

    #[tokio::test]
    async fn dropped_server_is_transport_skip() {
        // Either nothing listens any more or the pooled server answers 404 with
        // an empty body; both are transport skips.
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let config = GeocoderConfig {
            endpoint: format!("{uri}/geocoder/geographies/address"),
            benchmark: "b".into(),
            vintage: "v".into(),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::none(),
            geoid_length: 15,
        };
        let geocoder = CensusGeocoder::new(&config).unwrap();
        let outcome = geocoder.geocode(&silver_hill()).await;
        assert_eq!(outcome, Err(SkipReason::TransportError));
    }

    #[tokio::test]
    async fn slow_response_times_out_as_transport_skip() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(MATCH_BODY)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server, 1);
        config.timeout = Duration::from_millis(200);
        let geocoder = CensusGeocoder::new(&config).unwrap();

        let outcome = geocoder.geocode(&silver_hill()).await;
        assert_eq!(outcome, Err(SkipReason::TransportError));
    }

    #[tokio::test]
    async fn cancellation_cuts_retry_backoff_short() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server, 3);
        config.retry.initial_backoff = Duration::from_secs(30);
        config.retry.max_backoff = Duration::from_secs(30);

        let cancel = CancellationToken::new();
        let geocoder = CensusGeocoder::new(&config)
            .unwrap()
            .with_cancellation(cancel.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), geocoder.geocode(&silver_hill()))
            .await
            .expect("backoff should end on cancellation");
        assert_eq!(outcome, Err(SkipReason::TransportError));
    }
}
