//! Webhook notifier posting alert payloads over HTTPS.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde_json::json;
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::alert::Alert;
use crate::error::{AlertError, AlertResult, DeliveryError};
use crate::notify::Notifier;

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Configuration for a webhook notification channel.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl WebhookConfig {
    /// Creates a configuration targeting the supplied URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Adds a request header sent with every notification.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Posts alerts as JSON to a configured endpoint (Slack, PagerDuty,
/// custom receivers).
pub struct WebhookNotifier {
    client: HyperClient,
    endpoint: Uri,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    /// Constructs a notifier from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::NotifierConfiguration`] when the URL does not
    /// parse.
    pub fn new(config: WebhookConfig) -> AlertResult<Self> {
        let endpoint =
            config
                .url
                .parse::<Uri>()
                .map_err(|err| AlertError::NotifierConfiguration {
                    reason: format!("invalid webhook url: {err}"),
                })?;
        Ok(Self {
            client: build_https_client(),
            endpoint,
            headers: config.headers,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let payload = json!({
            "rule": alert.rule_name,
            "severity": alert.severity,
            "value": alert.value,
            "threshold": alert.threshold,
            "message": alert.message,
            "timestamp": alert.timestamp,
        });

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(Body::from(payload.to_string()))
            .map_err(DeliveryError::transport)?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| DeliveryError::Timeout)?
            .map_err(DeliveryError::transport)?;

        if response.status().as_u16() < 400 {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                detail: response.status().to_string(),
            })
        }
    }
}

fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Client::builder().build::<_, Body>(connector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_a_configuration_error() {
        let result = WebhookNotifier::new(WebhookConfig::new("not a url"));
        assert!(matches!(
            result,
            Err(AlertError::NotifierConfiguration { .. })
        ));
    }

    #[test]
    fn valid_url_constructs() {
        let config = WebhookConfig::new("https://hooks.example.com/alerts")
            .with_header("Authorization", "Bearer token")
            .with_timeout(Duration::from_secs(3));
        assert!(WebhookNotifier::new(config).is_ok());
    }
}
