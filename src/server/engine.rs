//! The seam between the connection core and the network engine.
//!
//! The engine owns sockets. It reports what happens to them as
//! [`EngineEvent`]s and accepts two commands back: send bytes, close. The
//! core never touches a socket directly, which lets the whole lifecycle be
//! driven by a fake engine in tests.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::http::response::{Response, StatusCode};
use crate::http::writer::{encode_response, EncodeError};

/// Engine-assigned connection identity. Never reused within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        SessionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications posted by the engine, processed in order by the event loop.
///
/// For every `Opened` the engine posts exactly one `Closed`, after which the
/// id is dead.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Opened { session: SessionId, peer: SocketAddr },
    Received { session: SessionId, data: Bytes },
    Closed { session: SessionId },
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("session {0} is closed")]
    Closed(SessionId),
    #[error("failed to encode response: {0}")]
    Encode(#[from] EncodeError),
}

/// Commands the core issues to the engine.
///
/// Both commands are non-blocking: `send` queues bytes and `close` requests
/// a shutdown that is confirmed later by [`EngineEvent::Closed`].
pub trait Engine: Send + Sync {
    fn send(&self, session: SessionId, data: Bytes) -> Result<(), SendError>;

    fn close(&self, session: SessionId);

    /// Snapshot of the sessions currently connected.
    fn sessions(&self) -> Vec<SessionId>;
}

/// Handle to one connection, given to request handlers.
///
/// Cheap to clone; holding one past the handler call is allowed and simply
/// lets code reply later (sends fail with [`SendError::Closed`] once the
/// connection is gone).
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    engine: Arc<dyn Engine>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

impl Session {
    pub fn new(id: SessionId, peer: SocketAddr, engine: Arc<dyn Engine>) -> Self {
        Self { id, peer, engine }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Encodes `response` and queues it on this connection.
    pub fn send_response(&self, response: &Response) -> Result<(), SendError> {
        let encoded = encode_response(response)?;
        self.engine.send(self.id, encoded)
    }

    /// Builds a response from `status` and `content` and sends it.
    ///
    /// `content` is moved into the response and dropped with it.
    pub fn send_simple_response(
        &self,
        status: impl Into<StatusCode>,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), SendError> {
        let response = Response::with_status(status, content);
        self.send_response(&response)
    }

    /// Asks the engine to close this connection once queued bytes are written.
    pub fn close(&self) {
        self.engine.close(self.id);
    }
}
