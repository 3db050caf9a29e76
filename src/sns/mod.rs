//! Outbound calls to Amazon SNS.
//!
//! Two collaborators, each behind a trait so the relay can be exercised
//! without the network:
//!
//! - [`TopicSubscriber`] registers our callback endpoint on a topic once at
//!   startup ([`SnsClient`] speaks the SNS query API, signed with SigV4).
//! - [`SubscriptionConfirmer`] completes the handshake SNS starts by posting
//!   a `SubscriptionConfirmation` ([`HttpConfirmer`] simply GETs the URL).

use std::fmt;

pub mod confirm;
pub mod signing;
pub mod subscribe;

pub use confirm::{ConfirmError, HttpConfirmer, SubscriptionConfirmer};
pub use subscribe::{SnsClient, SubscribeError, SubscribeRequest, TopicSubscriber};

/// Static AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "very-secret".into(),
            session_token: Some("token".into()),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("AKIDEXAMPLE"));
        assert!(!shown.contains("very-secret"));
        assert!(!shown.contains("\"token\""));
    }
}
