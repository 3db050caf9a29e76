//! Runtime configuration.
//!
//! Layered with the [`config`] crate: built-in defaults, then the standard
//! `AWS_*` variables (`AWS_REGION`, `AWS_ACCESS_KEY_ID`, ...), then `RELAY_*`
//! overrides such as `RELAY_PORT` or `RELAY_TOPIC_ARN`.

use std::net::SocketAddr;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::sns::{Credentials, SubscribeRequest};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid listen address {addr}: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

#[derive(Clone, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub region: String,
    #[serde(default)]
    pub topic_arn: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Public URL of our callback endpoint, registered with SNS.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub protocol: String,
    /// SNS API endpoint override, e.g. a local emulator.
    #[serde(default)]
    pub sns_endpoint: Option<String>,
    pub outbound_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub outbound_queue: usize,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("region", &self.region)
            .field("topic_arn", &self.topic_arn)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("protocol", &self.protocol)
            .field("sns_endpoint", &self.sns_endpoint)
            .field("outbound_timeout_secs", &self.outbound_timeout_secs)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("outbound_queue", &self.outbound_queue)
            .finish()
    }
}

impl RelayConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(Environment::with_prefix("AWS").try_parsing(true))
            .add_source(Environment::with_prefix("RELAY").try_parsing(true));
        Self::from_builder(builder)
    }

    /// Applies defaults beneath the sources already in `builder`.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config = builder
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("region", "eu-central-1")?
            .set_default("protocol", "https")?
            .set_default("outbound_timeout_secs", 10)?
            .set_default("shutdown_grace_secs", 5)?
            .set_default("outbound_queue", 256)?
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|source| ConfigError::Addr { addr, source })
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Signing credentials, when both key halves are set.
    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            access_key_id: self.access_key_id.clone()?,
            secret_access_key: self.secret_access_key.clone()?,
            session_token: self.session_token.clone(),
        })
    }

    /// The startup `Subscribe` call, when a topic and a public endpoint are set.
    pub fn subscribe_request(&self) -> Option<SubscribeRequest> {
        Some(SubscribeRequest {
            topic_arn: self.topic_arn.clone()?,
            protocol: self.protocol.clone(),
            endpoint: self.endpoint.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(overrides: &[(&str, &str)]) -> RelayConfig {
        let mut builder = Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        RelayConfig::from_builder(builder).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = load(&[]);
        assert_eq!(cfg.bind_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.region, "eu-central-1");
        assert_eq!(cfg.protocol, "https");
        assert_eq!(cfg.outbound_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(cfg.outbound_queue, 256);
        assert!(cfg.credentials().is_none());
        assert!(cfg.subscribe_request().is_none());
    }

    #[test]
    fn overrides_win() {
        let cfg = load(&[("host", "127.0.0.1"), ("port", "9000"), ("region", "us-east-1")]);
        assert_eq!(cfg.bind_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.region, "us-east-1");
    }

    #[test]
    fn bad_host_is_reported() {
        let cfg = load(&[("host", "not a host")]);
        assert!(matches!(cfg.bind_addr(), Err(ConfigError::Addr { .. })));
    }

    #[test]
    fn credentials_need_both_halves() {
        let cfg = load(&[("access_key_id", "AKID")]);
        assert!(cfg.credentials().is_none());

        let cfg = load(&[
            ("access_key_id", "AKID"),
            ("secret_access_key", "secret"),
            ("session_token", "tok"),
        ]);
        let creds = cfg.credentials().unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(creds.session_token.as_deref(), Some("tok"));
    }

    #[test]
    fn subscribe_request_needs_topic_and_endpoint() {
        let cfg = load(&[("topic_arn", "arn:aws:sns:eu-central-1:1:t")]);
        assert!(cfg.subscribe_request().is_none());

        let cfg = load(&[
            ("topic_arn", "arn:aws:sns:eu-central-1:1:t"),
            ("endpoint", "https://relay.example.com/sns"),
            ("protocol", "http"),
        ]);
        let req = cfg.subscribe_request().unwrap();
        assert_eq!(req.protocol, "http");
        assert_eq!(req.endpoint, "https://relay.example.com/sns");
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = load(&[("secret_access_key", "hunter2"), ("session_token", "tok")]);
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"tok\""));
    }
}
