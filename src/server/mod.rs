//! Server facade.
//!
//! [`HttpServer`] ties the pieces together: a [`TcpEngine`] posting
//! connection events, one event-loop task owning the [`Connections`] core,
//! and the idle reaper ticking inside that loop.
//!
//! ```text
//!   socket tasks ──EngineEvent──▶ event loop ──bytes──▶ tokenizer
//!        ▲                          │  ▲                   │ events
//!        │ send / close             │  └── reaper tick     ▼
//!        └──────────────────────────┴──────────────── assembler ──▶ handler
//! ```
//!
//! Lifecycle is `create → start → stop → release`; a stopped server may be
//! started again.

pub mod engine;
pub mod handler;
pub mod lifecycle;
pub mod listener;
pub mod pool;
pub mod reaper;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{Config, ConfigError};
use crate::http::response::{Response, StatusCode};

pub use engine::{Engine, EngineEvent, SendError, Session, SessionId};
pub use handler::{RequestHandler, handler_fn};
pub use lifecycle::Connections;
pub use listener::TcpEngine;
pub use pool::PoolExhausted;

/// Capacity of the engine → event loop channel.
const EVENT_QUEUE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection state {0}")]
    PoolExhausted(#[from] PoolExhausted),
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),
    #[error("http parse error on session {session}: {description} ({name})")]
    Parse {
        session: SessionId,
        name: &'static str,
        description: String,
    },
    #[error("request handler failed: {0:#}")]
    Handler(anyhow::Error),
    #[error("server is already running")]
    AlreadyRunning,
    #[error("server is not running")]
    NotRunning,
    #[error("server must be stopped before release")]
    StillRunning,
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

struct Running {
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
    event_loop: JoinHandle<(Connections, mpsc::Receiver<EngineEvent>)>,
}

pub struct HttpServer {
    config: Config,
    engine: TcpEngine,
    /// Present while stopped; moved into the event loop while running.
    core: Option<(Connections, mpsc::Receiver<EngineEvent>)>,
    running: Option<Running>,
    local_addr: Option<SocketAddr>,
}

impl HttpServer {
    /// Builds the server without binding anything.
    pub fn create<H>(config: Config, handler: H) -> Result<Self, ServerError>
    where
        H: RequestHandler + 'static,
    {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let engine = TcpEngine::new(events_tx);
        let core = Connections::new(
            Arc::new(engine.clone()) as Arc<dyn Engine>,
            Box::new(handler),
            &config,
        );

        Ok(Self {
            config,
            engine,
            core: Some((core, events_rx)),
            running: None,
            local_addr: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Binds the listener and starts the accept loop, the event loop and the
    /// idle reaper.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let (core, events) = self.core.take().ok_or(ServerError::StillRunning)?;

        let listener = match TcpListener::bind(&self.config.server.listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.core = Some((core, events));
                return Err(e.into());
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.core = Some((core, events));
                return Err(e.into());
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let acceptor = tokio::spawn(self.engine.clone().run(listener, shutdown_rx.clone()));
        let event_loop = tokio::spawn(lifecycle::run_event_loop(
            core,
            events,
            self.config.idle.reap_interval(),
            shutdown_rx,
        ));

        tracing::info!(
            address = %local_addr,
            max_connections = self.config.server.max_connections,
            idle_timeout_secs = self.config.idle.idle_timeout_secs,
            "server started"
        );
        self.local_addr = Some(local_addr);
        self.running = Some(Running {
            shutdown,
            acceptor,
            event_loop,
        });
        Ok(local_addr)
    }

    /// Stops accepting, closes every connection and halts the reaper.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let running = self.running.take().ok_or(ServerError::NotRunning)?;
        let _ = running.shutdown.send(true);

        running.acceptor.await?;
        let (mut core, events) = running.event_loop.await?;
        // The acceptor may have registered sockets after the loop exited.
        let remaining = core.close_all();
        if remaining > 0 {
            tracing::debug!(closed = remaining, "closed remaining connections");
        }
        self.core = Some((core, events));
        self.local_addr = None;

        tracing::info!("server stopped");
        Ok(())
    }

    /// Drops the engine, the connection pool and the handler. The server
    /// must be stopped first.
    pub fn release(mut self) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Err(ServerError::StillRunning);
        }
        self.core.take();
        Ok(())
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        // Dropped while running: let the tasks wind down on their own.
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
        }
    }
}

/// Encodes `response` and queues it on `session`.
pub fn send_response(session: &Session, response: &Response) -> Result<(), SendError> {
    session.send_response(response)
}

/// Sends a response built from `status` and `content`; `content` is moved in
/// and released with the response.
pub fn send_simple_response(
    session: &Session,
    status: impl Into<StatusCode>,
    content: impl Into<Vec<u8>>,
) -> Result<(), SendError> {
    session.send_simple_response(status, content)
}
