//! `WebSocket` subscription endpoint.
//!
//! Dashboards connect to `GET /` (or `GET /ws/measurements`) and receive a
//! JSON-encoded [`Measurement`](centrale_types::Measurement) text frame for
//! the latest stored value, then one for every later publish. Messages from
//! the client are not part of the contract and are ignored, apart from
//! pings, which are answered.
//!
//! Each session walks the [`ConnectionState`] machine:
//!
//! ```text
//! Connecting --subscribe--> Open --client close / error / eviction / shutdown--> Closed
//! ```
//!
//! Reconnection is the client's job: a dropped dashboard opens a new
//! session and gets a fresh snapshot.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use centrale_types::{ConnectionState, SubscriberId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, trace, warn};

use crate::relay::RelayHandle;
use crate::state::AppState;

/// Why a subscriber session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from the client failed.
    TransportError,
    /// Writing to the client failed.
    SendFailed,
    /// The relay closed this subscriber's queue (shutdown or eviction).
    RelayClosed,
    /// The relay was not running when the session tried to register.
    RelayUnavailable,
}

/// Upgrade an HTTP request to a `WebSocket` subscription.
///
/// # Route
///
/// `GET /`, `GET /ws/measurements`
pub async fn ws_measurements(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let relay = state.relay.clone();
    let guard = state.sessions.enter();
    ws.on_upgrade(move |socket| async move {
        let _guard = guard;
        let (sink, stream) = socket.split();
        let end = run_session(sink, stream, relay).await;
        debug!(?end, "WebSocket session finished");
    })
}

/// Drive one subscriber session until it closes.
///
/// Generic over the transport so the state machine can run against any
/// message sink and stream; Axum's split `WebSocket` is one of them.
pub async fn run_session<W, R, E>(mut sink: W, mut stream: R, relay: RelayHandle) -> SessionEnd
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut session = Session::new();

    let Ok(mut subscription) = relay.subscribe().await else {
        warn!("Relay unavailable, refusing subscriber");
        let _ = sink.send(close_message("relay unavailable")).await;
        session.transition(ConnectionState::Closed);
        return SessionEnd::RelayUnavailable;
    };
    session.id = Some(subscription.id);
    session.transition(ConnectionState::Open);

    let end = loop {
        tokio::select! {
            frame = subscription.frames.recv(), if session.state.is_live() => {
                if let Some(frame) = frame {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        debug!(subscriber = %subscription.id, "WebSocket send failed: {e}");
                        break SessionEnd::SendFailed;
                    }
                } else {
                    session.transition(ConnectionState::Closing);
                    let _ = sink.send(close_message("relay closed the subscription")).await;
                    break SessionEnd::RelayClosed;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        session.transition(ConnectionState::Closing);
                        break SessionEnd::ClientClosed;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            debug!(subscriber = %subscription.id, "WebSocket pong failed: {e}");
                            break SessionEnd::SendFailed;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %subscription.id, "WebSocket error: {e}");
                        break SessionEnd::TransportError;
                    }
                    Some(Ok(_)) => {
                        // Client text/binary/pong frames carry no meaning.
                    }
                }
            }
        }
    };

    relay.unsubscribe(subscription.id).await;
    session.transition(ConnectionState::Closed);
    end
}

fn close_message(reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: Utf8Bytes::from_static(reason),
    }))
}

/// Per-connection lifecycle tracking.
struct Session {
    id: Option<SubscriberId>,
    state: ConnectionState,
}

impl Session {
    const fn new() -> Self {
        Self {
            id: None,
            state: ConnectionState::Connecting,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state.can_transition_to(next) {
            trace!(subscriber = ?self.id, from = %self.state, to = %next, "Session transition");
            self.state = next;
        }
    }
}
