//! Completing an SNS subscription handshake.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("confirmation request has no SubscribeURL")]
    MissingUrl,

    #[error("SubscribeURL must be a string, found {found}")]
    InvalidUrl { found: &'static str },

    #[error("confirmation endpoint answered HTTP {status}")]
    Status { status: u16 },

    #[error("confirmation request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Visits the `SubscribeURL` from a `SubscriptionConfirmation` envelope.
#[async_trait]
pub trait SubscriptionConfirmer: Send + Sync {
    async fn confirm(&self, subscribe_url: &str) -> Result<(), ConfirmError>;
}

/// Confirms with a plain `GET`; any non-2xx status is a failure.
pub struct HttpConfirmer {
    http: reqwest::Client,
}

impl HttpConfirmer {
    /// Builds a confirmer whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ConfirmError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SubscriptionConfirmer for HttpConfirmer {
    async fn confirm(&self, subscribe_url: &str) -> Result<(), ConfirmError> {
        let response = self.http.get(subscribe_url).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "confirmation endpoint replied");
        if !status.is_success() {
            return Err(ConfirmError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn success_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/confirm"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ConfirmSubscriptionResponse/>"))
            .expect(1)
            .mount(&server)
            .await;

        let confirmer = HttpConfirmer::new(Duration::from_secs(5)).unwrap();
        confirmer
            .confirm(&format!("{}/confirm", server.uri()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let confirmer = HttpConfirmer::new(Duration::from_secs(5)).unwrap();
        let err = confirmer
            .confirm(&format!("{}/confirm", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfirmError::Status { status: 403 }));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let confirmer = HttpConfirmer::new(Duration::from_millis(100)).unwrap();
        let err = confirmer.confirm(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ConfirmError::Http(e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn malformed_url_is_an_http_error() {
        let confirmer = HttpConfirmer::new(Duration::from_secs(1)).unwrap();
        let err = confirmer.confirm("not a url").await.unwrap_err();
        assert!(matches!(err, ConfirmError::Http(_)));
    }
}
