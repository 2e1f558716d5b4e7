//! Presence Relay
//!
//! Real-time presence and message relay for a chat backend. Browser clients
//! hold a WebSocket open; the relay authenticates each one with its session
//! token, tracks who is online and pushes events to the right connections.
//!
//! # Features
//!
//! - **Presence**: `presence-changed` snapshot to every connection whenever
//!   the set of online users changes
//! - **Multi-tab**: a user stays online until their last connection closes
//! - **Message push**: persisted messages reach every live connection of the
//!   recipient; offline recipients are skipped
//! - **Isolation**: a slow or broken client is evicted without stalling others
//!
//! # Modules
//!
//! - `types`: Core data structures (UserId, VerifiedIdentity, MessageEvent)
//! - `auth`: Identity verification (JWT, user directory, credential extraction)
//! - `relay`: Connection registry, presence relay, per-connection tasks
//! - `ingest`: Persistence contract and the delivery bridge
//! - `api`: Axum router, WebSocket handshake, status endpoints
//! - `config`: Environment configuration
//! - `logging`: Tracing setup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use presence_relay::api::{serve, state::AppState};
//! use presence_relay::auth::{InMemoryUserDirectory, JwtVerifier};
//! use presence_relay::ingest::InMemoryMessageStore;
//! use presence_relay::RelayConfig;
//!
//! #[tokio::main]
//! async fn main() -> presence_relay::ServerResult<()> {
//!     let config = RelayConfig::from_env()?;
//!     let users = Arc::new(InMemoryUserDirectory::with_users(config.users.clone()));
//!     let verifier = Arc::new(JwtVerifier::new(&config.jwt_secret, users)?);
//!     let store = Arc::new(InMemoryMessageStore::new());
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
//!     let state = Arc::new(AppState::new(config, verifier, store));
//!     serve(listener, state, async {}).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod relay;
pub mod types;

// Re-export commonly used items at crate root
pub use auth::{AuthError, IdentityVerifier, JwtVerifier};
pub use config::{ConfigError, RelayConfig};
pub use error::{RelayError, ServerResult, TransportError};
pub use ingest::{MessageIngest, MessageStore, PersistenceError};
pub use relay::{ConnectionRegistry, ConnectionSettings, DeliveryReport, PresenceRelay, ServerEvent};
pub use types::{MessageEvent, UserId, VerifiedIdentity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
