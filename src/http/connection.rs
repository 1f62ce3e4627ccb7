use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;

use crate::http::parser::Tokenizer;
use crate::http::request::Request;
use crate::server::engine::SessionId;

/// Where the assembler is within the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Between messages, nothing allocated.
    #[default]
    Idle,
    /// Message begun, request line in progress.
    InMessage,
    InHeaders,
    InBody,
}

/// The part of a connection's state mutated by tokenizer events.
#[derive(Debug, Default)]
pub struct Assembly {
    pub(crate) stage: Stage,
    /// Header field staging slot; `Some` once assigned, even if empty.
    pub(crate) pending_field: Option<BytesMut>,
    /// Header value staging slot; `Some` once assigned, even if empty.
    pub(crate) pending_value: Option<BytesMut>,
    pub(crate) request: Option<Request>,
}

/// What [`Assembly::discard`] threw away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Discarded {
    pub request: bool,
    pub field: bool,
    pub value: bool,
}

impl Discarded {
    pub fn is_empty(&self) -> bool {
        !(self.request || self.field || self.value)
    }
}

impl Assembly {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The request being assembled, if a message is in progress.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn has_pending_field(&self) -> bool {
        self.pending_field.is_some()
    }

    pub fn has_pending_value(&self) -> bool {
        self.pending_value.is_some()
    }

    /// Drops the in-progress request and both staging slots.
    pub fn discard(&mut self) -> Discarded {
        let discarded = Discarded {
            request: self.request.take().is_some(),
            field: self.pending_field.take().is_some(),
            value: self.pending_value.take().is_some(),
        };
        self.stage = Stage::Idle;
        discarded
    }
}

/// Per-connection record, pooled and recycled across connections.
pub struct ConnectionState {
    pub session: SessionId,
    pub peer: SocketAddr,
    pub last_activity: Instant,
    pub tokenizer: Tokenizer,
    pub assembly: Assembly,
    /// Set once a close has been requested; bytes still in flight are ignored.
    pub closing: bool,
}

impl ConnectionState {
    pub fn new(max_head_bytes: usize) -> Self {
        Self {
            session: SessionId::new(0),
            peer: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            last_activity: Instant::now(),
            tokenizer: Tokenizer::new(max_head_bytes),
            assembly: Assembly::default(),
            closing: false,
        }
    }

    /// Binds a (possibly recycled) state to a new connection.
    pub fn attach(&mut self, session: SessionId, peer: SocketAddr, now: Instant) {
        self.session = session;
        self.peer = peer;
        self.last_activity = now;
        self.tokenizer.reset();
        self.assembly.discard();
        self.closing = false;
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}
