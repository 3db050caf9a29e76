//! # sns-relay
//!
//! Relays Amazon SNS push notifications to live WebSocket clients.
//!
//! SNS posts to `POST /sns`. Subscription confirmations are completed by
//! fetching the `SubscribeURL`; notifications have their `Message`
//! normalized to JSON and broadcast to every client connected on `/`.
//! Both surfaces share one listener.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sns_relay::app::App;
//! use sns_relay::config::RelayConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::from_env()?;
//!     let app = App::bind(&config).await?;
//!     println!("Listening on http://{}", app.local_addr());
//!     app.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod context;
pub mod http;
pub mod realtime;
pub mod relay;
pub mod router;
pub mod server;
pub mod sns;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
