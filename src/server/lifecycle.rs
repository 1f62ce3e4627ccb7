//! Connection lifecycle: the state owned by the event loop.
//!
//! [`Connections`] reacts to engine events. It allocates a pooled
//! [`ConnectionState`] per connection, feeds received bytes through the
//! tokenizer into the assembler, closes connections whose input cannot be
//! parsed, and releases state when the engine reports a close.
//!
//! It is synchronous and socket-free: [`run_event_loop`] wraps
//! it in a tokio task, tests drive it directly.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::Config;
use crate::http::assembler::Assembler;
use crate::http::connection::{ConnectionState, Discarded};
use crate::server::ServerError;
use crate::server::engine::{Engine, EngineEvent, Session, SessionId};
use crate::server::handler::RequestHandler;
use crate::server::pool::{Pool, SlotId};
use crate::server::reaper;

pub struct Connections {
    pub(super) engine: Arc<dyn Engine>,
    pool: Pool<ConnectionState>,
    index: HashMap<SessionId, SlotId>,
    handler: Box<dyn RequestHandler>,
    max_head_bytes: usize,
    max_body_bytes: usize,
    pub(super) idle_timeout: Duration,
}

impl Connections {
    pub fn new(
        engine: Arc<dyn Engine>,
        handler: Box<dyn RequestHandler>,
        config: &Config,
    ) -> Self {
        Self {
            engine,
            pool: Pool::new(config.server.max_connections),
            index: HashMap::new(),
            handler,
            max_head_bytes: config.limits.max_head_bytes,
            max_body_bytes: config.limits.max_body_bytes,
            idle_timeout: config.idle.idle_timeout(),
        }
    }

    /// Number of connections holding a state slot.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn pool(&self) -> &Pool<ConnectionState> {
        &self.pool
    }

    pub fn state(&self, session: SessionId) -> Option<&ConnectionState> {
        self.index
            .get(&session)
            .and_then(|slot| self.pool.get(*slot))
    }

    /// Dispatches one engine event. Failures are logged here and never
    /// escape: they concern a single connection only.
    pub fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Opened { session, peer } => {
                match self.on_new_connection(session, peer) {
                    Ok(()) => {}
                    Err(err @ ServerError::PoolExhausted(_)) => {
                        tracing::warn!(%peer, %session, error = %err, "rejecting connection");
                        self.engine.close(session);
                    }
                    // The live session keeps its state.
                    Err(err) => tracing::warn!(%peer, %session, error = %err, "ignoring open"),
                }
            }
            EngineEvent::Received { session, data } => {
                match self.on_bytes_received(session, &data) {
                    Ok(()) => {}
                    Err(ServerError::Handler(err)) => {
                        let error = format!("{err:#}");
                        tracing::warn!(%session, %error, "request handler failed");
                    }
                    // Parse failures are logged where they are detected.
                    Err(err) => tracing::debug!(%session, error = %err, "receive failed"),
                }
            }
            EngineEvent::Closed { session } => {
                self.on_connection_close(session);
                self.on_private_data_free(session);
            }
        }
    }

    /// Allocates and binds state for a new connection.
    pub fn on_new_connection(
        &mut self,
        session: SessionId,
        peer: SocketAddr,
    ) -> Result<(), ServerError> {
        tracing::trace!(%peer, %session, "new connection");
        if self.index.contains_key(&session) {
            return Err(ServerError::DuplicateSession(session));
        }

        let max_head_bytes = self.max_head_bytes;
        let slot = self
            .pool
            .alloc(|| ConnectionState::new(max_head_bytes))?;
        if let Some(state) = self.pool.get_mut(slot) {
            state.attach(session, peer, Instant::now());
        }
        self.index.insert(session, slot);
        Ok(())
    }

    pub fn on_connection_close(&mut self, session: SessionId) {
        match self.state(session) {
            Some(state) => tracing::trace!(peer = %state.peer, %session, "connection closed"),
            None => tracing::trace!(%session, "connection closed"),
        }
    }

    /// Feeds received bytes to the connection's tokenizer.
    ///
    /// On malformed input the connection is closed and
    /// [`ServerError::Parse`] returned. A failing handler yields
    /// [`ServerError::Handler`] but leaves the connection open, unless it
    /// panicked: then the connection is closed too.
    pub fn on_bytes_received(
        &mut self,
        session: SessionId,
        data: &[u8],
    ) -> Result<(), ServerError> {
        let slot = self.index.get(&session).copied();
        let Some(state) = slot.and_then(|slot| self.pool.get_mut(slot)) else {
            tracing::trace!(%session, "bytes for unknown session");
            return Ok(());
        };
        if state.closing {
            return Ok(());
        }
        state.touch(Instant::now());

        let peer = state.peer;
        let context = Session::new(session, peer, Arc::clone(&self.engine));
        let mut assembler = Assembler::new(
            &mut state.assembly,
            self.handler.as_mut(),
            &context,
            self.max_body_bytes,
        );
        let consumed = state.tokenizer.execute(&mut assembler, data);
        let outcome = assembler.finish();

        if outcome.panicked {
            let err = outcome
                .handler_error
                .unwrap_or_else(|| anyhow::anyhow!("request handler panicked"));
            tracing::error!(%peer, %session, error = %err, "request handler panicked, closing");
            self.close(session);
            return Err(ServerError::Handler(err));
        }

        if consumed != data.len() {
            let (name, description) = state
                .tokenizer
                .error()
                .map(|e| (e.name(), e.description()))
                .unwrap_or(("HPE_UNKNOWN", "parser stopped early".to_string()));
            tracing::error!(
                %peer,
                %session,
                consumed,
                received = data.len(),
                "http parse error: {description} ({name})"
            );
            self.close(session);
            return Err(ServerError::Parse {
                session,
                name,
                description,
            });
        }

        match outcome.handler_error {
            Some(err) => Err(ServerError::Handler(err)),
            None => Ok(()),
        }
    }

    /// Releases a connection's slot, discarding any partial request and
    /// staged header. Returns `None` when the session holds no slot.
    pub fn on_private_data_free(&mut self, session: SessionId) -> Option<Discarded> {
        let slot = self.index.remove(&session)?;
        let discarded = self.pool.get_mut(slot).map(|state| state.assembly.discard());
        self.pool.free(slot);

        if let Some(d) = discarded.filter(|d| !d.is_empty()) {
            tracing::debug!(
                %session,
                request = d.request,
                field = d.field,
                value = d.value,
                "discarded partial message"
            );
        }
        discarded
    }

    /// Requests a close. The slot is released when the engine confirms.
    pub fn close(&mut self, session: SessionId) {
        if let Some(slot) = self.index.get(&session) {
            if let Some(state) = self.pool.get_mut(*slot) {
                state.closing = true;
            }
        }
        self.engine.close(session);
    }

    /// Closes every connection and releases all slots immediately; used on
    /// shutdown when no further `Closed` events will be processed.
    ///
    /// Covers sessions the engine has accepted whose `Opened` is still
    /// queued, as well as those holding a slot.
    pub fn close_all(&mut self) -> usize {
        let mut sessions: Vec<SessionId> = self.index.keys().copied().collect();
        for session in self.engine.sessions() {
            if !self.index.contains_key(&session) {
                sessions.push(session);
            }
        }
        for session in &sessions {
            self.engine.close(*session);
            self.on_private_data_free(*session);
        }
        sessions.len()
    }
}

/// The single event loop: engine events, reaper ticks and shutdown, handled
/// one at a time. Returns the core and the event receiver so the server can
/// be started again.
pub async fn run_event_loop(
    mut core: Connections,
    mut events: mpsc::Receiver<EngineEvent>,
    reap_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> (Connections, mpsc::Receiver<EngineEvent>) {
    let mut ticker = reaper::ticker(reap_interval);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => core.handle(event),
                None => break,
            },
            _ = ticker.tick() => {
                let closed = core.reap_idle(Instant::now());
                if closed > 0 {
                    tracing::info!(closed, "idle sweep finished");
                }
            }
        }
    }

    let closed = core.close_all();
    tracing::debug!(closed, "event loop stopped");
    (core, events)
}
