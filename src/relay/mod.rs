//! The notification relay: SNS callback in, WebSocket broadcast out.
//!
//! Only a malformed envelope changes the HTTP status. Every later failure
//! (confirmation fetch, payload normalization, per-client delivery) is
//! logged and the caller still gets a `200`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::http::{Response, StatusCode};
use crate::realtime::{BroadcastReport, ConnectionRegistry};
use crate::router::Router;
use crate::sns::{ConfirmError, SubscribeError, SubscribeRequest, SubscriptionConfirmer, TopicSubscriber};

pub mod envelope;
pub mod normalize;

pub use envelope::{Envelope, MessageType};
pub use normalize::NormalizeError;

/// Path SNS posts to.
pub const CALLBACK_PATH: &str = "/sns";

pub const CONFIRMED_BODY: &str = "Subscription confirmed";
pub const PROCESSED_BODY: &str = "Message processed";
pub const REJECTED_BODY: &str = "Error processing message";

/// What happened to a notification's payload.
#[derive(Debug)]
pub enum NotificationOutcome {
    Broadcast(BroadcastReport),
    Dropped(NormalizeError),
}

/// What the relay did with one callback body.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// A `SubscriptionConfirmation`; `result` is the outcome of the fetch.
    Confirmation { result: Result<(), ConfirmError> },
    Notification(NotificationOutcome),
    /// Any other `Type`.
    Ignored(MessageType),
    /// The body was not a JSON envelope.
    Rejected(serde_json::Error),
}

impl CallbackOutcome {
    /// The HTTP reply SNS gets for this outcome.
    pub fn into_response(self) -> Response {
        match self {
            Self::Confirmation { .. } => Response::new(StatusCode::Ok).body(CONFIRMED_BODY),
            Self::Notification(_) | Self::Ignored(_) => {
                Response::new(StatusCode::Ok).body(PROCESSED_BODY)
            }
            Self::Rejected(_) => Response::new(StatusCode::BadRequest).body(REJECTED_BODY),
        }
    }
}

/// Turns SNS callbacks into broadcasts on a shared [`ConnectionRegistry`].
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    confirmer: Arc<dyn SubscriptionConfirmer>,
}

impl Relay {
    pub fn new(registry: Arc<ConnectionRegistry>, confirmer: Arc<dyn SubscriptionConfirmer>) -> Self {
        Self {
            registry,
            confirmer,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Parses and dispatches one callback body.
    pub async fn handle_callback(&self, body: &[u8]) -> CallbackOutcome {
        let envelope = match Envelope::parse(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, bytes = body.len(), "error processing SNS message");
                return CallbackOutcome::Rejected(e);
            }
        };

        debug!(
            kind = ?envelope.kind,
            message_id = envelope.message_id.as_deref().unwrap_or("-"),
            topic_arn = envelope.topic_arn.as_deref().unwrap_or("-"),
            "received SNS message"
        );

        match envelope.kind {
            MessageType::SubscriptionConfirmation => {
                let result = self.confirm(&envelope).await;
                CallbackOutcome::Confirmation { result }
            }
            MessageType::Notification => {
                CallbackOutcome::Notification(self.relay_notification(&envelope))
            }
            other => CallbackOutcome::Ignored(other),
        }
    }

    async fn confirm(&self, envelope: &Envelope) -> Result<(), ConfirmError> {
        info!(topic_arn = envelope.topic_arn.as_deref().unwrap_or("-"), "confirming SNS subscription");
        let result = match &envelope.subscribe_url {
            Some(Value::String(url)) => self.confirmer.confirm(url).await,
            None | Some(Value::Null) => Err(ConfirmError::MissingUrl),
            Some(other) => Err(ConfirmError::InvalidUrl {
                found: normalize::kind_of(other),
            }),
        };
        match &result {
            Ok(()) => info!("SNS subscription confirmed"),
            Err(e) => error!(error = %e, "error confirming SNS subscription"),
        }
        result
    }

    /// Normalizes the envelope's `Message` and broadcasts it to every client.
    pub fn relay_notification(&self, envelope: &Envelope) -> NotificationOutcome {
        let payload = normalize::message_text(envelope.message.as_ref())
            .and_then(normalize::normalize);

        match payload {
            Ok(value) => {
                let report = self.registry.broadcast_all(&value);
                info!(
                    message_id = envelope.message_id.as_deref().unwrap_or("-"),
                    delivered = report.delivered,
                    failed = report.failed,
                    "broadcast notification"
                );
                NotificationOutcome::Broadcast(report)
            }
            Err(e) => {
                error!(
                    message_id = envelope.message_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "error handling SNS notification"
                );
                NotificationOutcome::Dropped(e)
            }
        }
    }
}

/// Router serving `POST` [`CALLBACK_PATH`] through `relay`.
pub fn routes(relay: Arc<Relay>) -> Router {
    let mut router = Router::new();
    router.post(CALLBACK_PATH, move |ctx: Context| {
        let relay = Arc::clone(&relay);
        async move {
            debug!(
                header_type = ctx.request().headers().get("x-amz-sns-message-type").unwrap_or("-"),
                bytes = ctx.body().len(),
                "SNS callback"
            );
            relay.handle_callback(ctx.body()).await.into_response()
        }
    });
    router
}

/// Registers the callback endpoint on the topic. Failure is logged and
/// returned; it never stops the relay from serving.
pub async fn subscribe_on_startup(
    subscriber: &dyn TopicSubscriber,
    request: &SubscribeRequest,
) -> Result<String, SubscribeError> {
    match subscriber.subscribe(request).await {
        Ok(arn) => {
            info!(subscription_arn = %arn, topic_arn = %request.topic_arn, "subscribed to SNS topic");
            Ok(arn)
        }
        Err(e) => {
            warn!(error = %e, topic_arn = %request.topic_arn, "error subscribing to SNS topic");
            Err(e)
        }
    }
}
