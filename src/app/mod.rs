//! Wiring: configuration in, a bound server with its collaborators out.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigError, RelayConfig};
use crate::realtime::{ConnectionRegistry, RealtimeEndpoint};
use crate::relay::{self, Relay};
use crate::router::Router;
use crate::server::{Server, ServerError};
use crate::sns::{
    ConfirmError, HttpConfirmer, SnsClient, SubscribeError, SubscribeRequest, TopicSubscriber,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("failed to build confirmation client: {0}")]
    Confirmer(#[from] ConfirmError),

    #[error("failed to build SNS client: {0}")]
    Subscriber(#[from] SubscribeError),
}

/// A bound relay, ready to [`run`](App::run).
pub struct App {
    server: Server,
    router: Arc<Router>,
    realtime: RealtimeEndpoint,
    subscription: Option<(Arc<dyn TopicSubscriber>, SubscribeRequest)>,
}

impl App {
    /// Builds every collaborator from `config` and binds the listener.
    pub async fn bind(config: &RelayConfig) -> Result<Self, AppError> {
        let addr = config.bind_addr()?;
        let timeout = config.outbound_timeout();

        let registry = Arc::new(ConnectionRegistry::new());
        let confirmer = Arc::new(HttpConfirmer::new(timeout)?);
        let relay = Arc::new(Relay::new(Arc::clone(&registry), confirmer));
        let router = Arc::new(relay::routes(relay));
        let realtime = RealtimeEndpoint::new(registry).queue_capacity(config.outbound_queue);

        let subscription = match (config.credentials(), config.subscribe_request()) {
            (Some(credentials), Some(request)) => {
                let client = match &config.sns_endpoint {
                    Some(endpoint) => SnsClient::with_endpoint(
                        credentials,
                        config.region.clone(),
                        endpoint,
                        timeout,
                    )?,
                    None => SnsClient::new(credentials, config.region.clone(), timeout)?,
                };
                let subscriber: Arc<dyn TopicSubscriber> = Arc::new(client);
                Some((subscriber, request))
            }
            (None, Some(_)) => {
                warn!("AWS credentials not configured, skipping SNS subscribe");
                None
            }
            (_, None) => {
                info!("topic_arn or endpoint not configured, skipping SNS subscribe");
                None
            }
        };

        let server = Server::bind(addr.to_string())
            .await?
            .with_shutdown_grace(config.shutdown_grace());

        Ok(Self {
            server,
            router,
            realtime,
            subscription,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.realtime.registry()
    }

    /// Serves until `shutdown` is cancelled.
    ///
    /// The startup `Subscribe` call runs in the background; its failure is
    /// logged and does not stop the server.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        if let Some((subscriber, request)) = self.subscription {
            tokio::spawn(async move {
                if relay::subscribe_on_startup(subscriber.as_ref(), &request)
                    .await
                    .is_err()
                {
                    info!("serving without an SNS subscription");
                }
            });
        }

        self.server
            .run(self.router, self.realtime, shutdown)
            .await?;
        Ok(())
    }
}
