//! Registering the relay's callback endpoint on an SNS topic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use minidom::Element;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::Credentials;
use super::signing::{self, CanonicalInput, SigningParams};

const API_VERSION: &str = "2010-03-31";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Parameters of one `Subscribe` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub topic_arn: String,
    /// Delivery protocol, `https` or `http`.
    pub protocol: String,
    /// Public URL of our callback endpoint.
    pub endpoint: String,
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("invalid SNS endpoint {url}: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("SNS endpoint {0} has no host")]
    MissingHost(String),

    #[error("SNS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SNS rejected Subscribe with HTTP {status}: {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("SNS response is not valid XML: {0}")]
    Xml(#[from] minidom::Error),

    #[error("SNS response did not contain a SubscriptionArn")]
    MissingArn,
}

/// Registers a delivery endpoint on a topic and returns the subscription ARN
/// (or `pending confirmation` for HTTP(S) endpoints not yet confirmed).
#[async_trait]
pub trait TopicSubscriber: Send + Sync {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<String, SubscribeError>;
}

/// SNS query-API client for the `Subscribe` action.
pub struct SnsClient {
    http: reqwest::Client,
    credentials: Credentials,
    region: String,
    endpoint: Url,
}

impl SnsClient {
    /// Client for the regional endpoint `https://sns.{region}.amazonaws.com/`.
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SubscribeError> {
        let region = region.into();
        let endpoint = format!("https://sns.{region}.amazonaws.com/");
        Self::with_endpoint(credentials, region, &endpoint, timeout)
    }

    /// Client for an explicit API endpoint (e.g. a local emulator).
    pub fn with_endpoint(
        credentials: Credentials,
        region: impl Into<String>,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, SubscribeError> {
        let endpoint = Url::parse(endpoint).map_err(|source| SubscribeError::InvalidEndpoint {
            url: endpoint.to_owned(),
            source,
        })?;
        if endpoint.host_str().is_none() {
            return Err(SubscribeError::MissingHost(endpoint.to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials,
            region: region.into(),
            endpoint,
        })
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }
}

/// Form body of a `Subscribe` call, parameters in lexical order.
fn subscribe_body(request: &SubscribeRequest) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("Action", "Subscribe")
        .append_pair("Endpoint", &request.endpoint)
        .append_pair("Protocol", &request.protocol)
        .append_pair("TopicArn", &request.topic_arn)
        .append_pair("Version", API_VERSION)
        .finish()
}

/// Text of the first element named `name` (any namespace) in document order.
fn find_text(element: &Element, name: &str) -> Option<String> {
    if element.name() == name {
        return Some(element.text().trim().to_owned());
    }
    element.children().find_map(|child| find_text(child, name))
}

/// `Code` and `Message` of an `ErrorResponse`. Bodies that are not XML (a
/// proxy error page, say) yield an `Unknown` code.
fn api_error(status: u16, body: &str) -> SubscribeError {
    let doc = body.parse::<Element>().ok();
    let field = |name: &str| doc.as_ref().and_then(|root| find_text(root, name));
    SubscribeError::Api {
        status,
        code: field("Code").unwrap_or_else(|| "Unknown".to_owned()),
        message: field("Message").unwrap_or_default(),
    }
}

#[async_trait]
impl TopicSubscriber for SnsClient {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<String, SubscribeError> {
        let body = subscribe_body(request);
        let host = self.host_header();
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("content-type", FORM_CONTENT_TYPE),
            ("host", host.as_str()),
            ("x-amz-date", amz_date.as_str()),
        ];
        if let Some(token) = self.credentials.session_token.as_deref() {
            headers.push(("x-amz-security-token", token));
        }

        let signature = signing::sign(
            &SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service: "sns",
                time: now,
            },
            &CanonicalInput {
                method: "POST",
                path: self.endpoint.path(),
                query: "",
                headers: &headers,
                payload: body.as_bytes(),
            },
        );

        let mut call = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header("x-amz-date", signature.amz_date)
            .header(AUTHORIZATION, signature.authorization);
        if let Some(token) = &self.credentials.session_token {
            call = call.header("x-amz-security-token", token.as_str());
        }

        debug!(topic_arn = %request.topic_arn, endpoint = %self.endpoint, "calling SNS Subscribe");
        let response = call.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }

        let doc: Element = text.parse()?;
        find_text(&doc, "SubscriptionArn").ok_or(SubscribeError::MissingArn)
    }
}
