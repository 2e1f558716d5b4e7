//! Presence relay over WebSocket
//!
//! Tracks which users are online, broadcasts `presence-changed` snapshots
//! whenever that set changes and pushes persisted messages to the
//! recipient's live connections.
//!
//! ## Pieces
//! - [`ConnectionRegistry`]: user id -> live handles, one mutex
//! - [`PresenceRelay`]: registry owner, fan-out with per-handle isolation
//! - [`run_connection`]: one task per socket, driving [`Lifecycle`]

pub mod connection;
pub mod events;
pub mod handle;
pub mod presence;
pub mod registry;

pub use connection::{run_connection, ConnectionSettings, ConnectionState, Lifecycle};
pub use events::{ClientMessage, Envelope, ErrorPayload, ServerEvent};
pub use handle::{ActiveConnection, ConnectionHandle, ConnectionId};
pub use presence::{DeliveryReport, PresenceRelay, RelayStats};
pub use registry::{ConnectionRegistry, Connections, Removal};
