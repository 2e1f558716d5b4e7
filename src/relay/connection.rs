//! Per-connection task: lifecycle state machine and socket driver
//!
//! ```text
//! Connecting --verify ok--> Authenticated --registered--> Active --> Closed
//!      \--verify failed------------------------------------------/
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{Sink, SinkExt};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};

use super::events::{ClientMessage, Envelope, ServerEvent};
use super::handle::ConnectionId;
use super::presence::PresenceRelay;
use crate::error::{RelayError, TransportError};
use crate::types::{UserId, VerifiedIdentity};

/// Close codes sent to clients
pub mod close_code {
    /// Keep-alive failed
    pub const GOING_AWAY: u16 = 1001;
    /// Binary or otherwise unusable frame
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Evicted by the relay (slow consumer, failed push)
    pub const POLICY_VIOLATION: u16 = 1008;
}

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticated)
                | (Connecting, Closed)
                | (Authenticated, Active)
                | (Authenticated, Closed)
                | (Active, Closed)
        )
    }
}

/// Tracks one connection through its lifecycle
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    user_id: Option<UserId>,
    connection_id: Option<ConnectionId>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            user_id: None,
            connection_id: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// Connecting -> Authenticated
    pub fn authenticate(&mut self, user_id: UserId) -> Result<(), RelayError> {
        self.transition(ConnectionState::Authenticated)?;
        self.user_id = Some(user_id);
        Ok(())
    }

    /// Authenticated -> Active
    pub fn activate(&mut self, connection_id: ConnectionId) -> Result<(), RelayError> {
        self.transition(ConnectionState::Active)?;
        self.connection_id = Some(connection_id);
        Ok(())
    }

    /// Any live state -> Closed
    pub fn close(&mut self) -> Result<(), RelayError> {
        self.transition(ConnectionState::Closed)
    }

    fn transition(&mut self, next: ConnectionState) -> Result<(), RelayError> {
        if !self.state.can_transition_to(next) {
            return Err(RelayError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = ?self.state, to = ?next, "Connection state change");
        self.state = next;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep-alive and send tuning for connection tasks
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Upper bound for one socket send
    pub send_timeout: Duration,
    /// Interval between server pings
    pub ping_interval: Duration,
    /// How long to wait for a pong before closing
    pub pong_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

/// Why an active connection ended
#[derive(Debug)]
enum CloseReason {
    ClientClosed,
    Evicted,
    PongTimeout,
    ProtocolError(&'static str),
    Transport(TransportError),
}

impl CloseReason {
    fn close_frame(&self) -> Option<CloseFrame<'static>> {
        let (code, reason) = match self {
            CloseReason::Evicted => (close_code::POLICY_VIOLATION, "evicted"),
            CloseReason::PongTimeout => (close_code::GOING_AWAY, "pong timeout"),
            CloseReason::ProtocolError(reason) => (close_code::UNSUPPORTED_DATA, *reason),
            CloseReason::ClientClosed | CloseReason::Transport(_) => return None,
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

/// Drive an authenticated connection until it closes.
///
/// Registers with the relay, forwards queued events to the socket, answers
/// client frames and keeps the connection alive. Always unregisters on the
/// way out.
pub async fn run_connection(
    mut socket: WebSocket,
    relay: Arc<PresenceRelay>,
    identity: VerifiedIdentity,
    mut lifecycle: Lifecycle,
    settings: ConnectionSettings,
) {
    let mut conn = relay.connect(&identity);
    if let Err(e) = lifecycle.activate(conn.handle.id()) {
        tracing::error!(user_id = %identity.user_id, error = %e, "Lifecycle out of step");
    }

    let user_id = identity.user_id.clone();
    let connection_id = conn.handle.id();
    let eviction = conn.eviction_signal();

    let mut ping_timer = interval(settings.ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ping_timer.tick().await;
    let mut pong_deadline: Option<Instant> = None;

    let reason = loop {
        tokio::select! {
            // Events queued by the relay, in issue order
            Some(envelope) = conn.events.recv() => {
                if let Err(e) = send_envelope(&mut socket, &envelope, settings.send_timeout).await {
                    break CloseReason::Transport(e);
                }
            }

            _ = eviction.notified() => break CloseReason::Evicted,

            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_text_frame(&mut socket, &text, &user_id, settings.send_timeout).await {
                            break CloseReason::Transport(e);
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        break CloseReason::ProtocolError("binary frames are not supported");
                    }
                    // The socket queues the matching pong itself
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Pong(_))) => pong_deadline = None,
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(user_id = %user_id, reason = ?frame, "Client initiated close");
                        break CloseReason::ClientClosed;
                    }
                    Some(Err(e)) => break CloseReason::Transport(TransportError::Socket(e.to_string())),
                    None => break CloseReason::ClientClosed,
                }
            }

            _ = ping_timer.tick(), if pong_deadline.is_none() => {
                if let Err(e) = send_with_timeout(&mut socket, Message::Ping(Vec::new()), settings.send_timeout).await {
                    break CloseReason::Transport(e);
                }
                pong_deadline = Some(Instant::now() + settings.pong_timeout);
            }

            _ = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                break CloseReason::PongTimeout;
            }
        }
    };

    relay.disconnect(&conn.handle);
    if let Err(e) = lifecycle.close() {
        tracing::error!(user_id = %user_id, error = %e, "Lifecycle out of step");
    }

    match &reason {
        CloseReason::ClientClosed => {
            tracing::info!(user_id = %user_id, connection_id, "Connection closed by client")
        }
        CloseReason::Transport(e) => {
            tracing::info!(user_id = %user_id, connection_id, error = %e, "Connection lost")
        }
        other => tracing::warn!(user_id = %user_id, connection_id, reason = ?other, "Closing connection"),
    }

    if let Some(frame) = reason.close_frame() {
        if let Err(e) = send_with_timeout(&mut socket, Message::Close(Some(frame)), settings.send_timeout).await {
            tracing::debug!(user_id = %user_id, connection_id, error = %e, "Close frame not delivered");
        }
    }
}

async fn handle_text_frame(
    socket: &mut WebSocket,
    text: &str,
    user_id: &UserId,
    send_timeout: Duration,
) -> Result<(), TransportError> {
    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => ServerEvent::Pong,
        Ok(ClientMessage::SendMessage(payload)) => {
            // Delivery is driven by the REST ingest path after persistence
            tracing::debug!(user_id = %user_id, ?payload, "Ignoring send-message frame");
            return Ok(());
        }
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "Unparseable client frame");
            ServerEvent::error("bad_frame", e.to_string())
        }
    };

    // Direct replies are not part of the relay's sequence
    let envelope = Envelope {
        event: reply,
        sequence_id: 0,
        timestamp: chrono::Utc::now().timestamp(),
    };
    send_envelope(socket, &envelope, send_timeout).await
}

async fn send_envelope(
    socket: &mut WebSocket,
    envelope: &Envelope,
    send_timeout: Duration,
) -> Result<(), TransportError> {
    let json = serde_json::to_string(envelope).map_err(|e| TransportError::Socket(e.to_string()))?;
    send_with_timeout(socket, Message::Text(json), send_timeout).await
}

/// One bounded send; a stuck peer surfaces as `SendTimeout`
async fn send_with_timeout<S>(
    sink: &mut S,
    message: Message,
    send_timeout: Duration,
) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match timeout(send_timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::Socket(e.to_string())),
        Err(_) => Err(TransportError::SendTimeout),
    }
}
