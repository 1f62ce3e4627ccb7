//! tokio implementation of the network engine.
//!
//! The accept loop registers each socket and spawns one task for it. The
//! task moves bytes in both directions: reads become
//! [`EngineEvent::Received`], queued [`Outbound`] commands become writes.
//! Nothing here parses HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::server::engine::{Engine, EngineEvent, SendError, SessionId};

const READ_BUFFER_SIZE: usize = 4096;

/// Commands queued to a socket task.
#[derive(Debug)]
enum Outbound {
    Data(Bytes),
    /// Flush what is queued before this, then shut the socket.
    Close,
}

struct SessionEntry {
    tx: mpsc::UnboundedSender<Outbound>,
}

struct Shared {
    sessions: DashMap<SessionId, SessionEntry>,
    next_id: AtomicU64,
    events: mpsc::Sender<EngineEvent>,
}

#[derive(Clone)]
pub struct TcpEngine {
    shared: Arc<Shared>,
}

impl TcpEngine {
    pub fn new(events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                sessions: DashMap::new(),
                next_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Accepts connections until `shutdown` flips.
    pub async fn run(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on {}", addr);
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        if !self.register(socket, peer).await {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("accept failed: {}", e),
                },
            }
        }
        tracing::info!("Listener stopped");
    }

    /// Returns `false` once the event loop is gone.
    async fn register(&self, socket: TcpStream, peer: SocketAddr) -> bool {
        let session = SessionId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.sessions.insert(session, SessionEntry { tx });

        // Opened goes out before the task can post anything for this session.
        if self
            .shared
            .events
            .send(EngineEvent::Opened { session, peer })
            .await
            .is_err()
        {
            self.shared.sessions.remove(&session);
            return false;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(drive(shared, session, socket, rx));
        true
    }
}

async fn drive(
    shared: Arc<Shared>,
    session: SessionId,
    mut socket: TcpStream,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        buf.reserve(READ_BUFFER_SIZE);
        tokio::select! {
            read = socket.read_buf(&mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    let data = buf.split().freeze();
                    let event = EngineEvent::Received { session, data };
                    if shared.events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(%session, "read failed: {}", e);
                    break;
                }
            },
            command = rx.recv() => match command {
                Some(Outbound::Data(bytes)) => {
                    if let Err(e) = socket.write_all(&bytes).await {
                        tracing::debug!(%session, "write failed: {}", e);
                        break;
                    }
                }
                Some(Outbound::Close) | None => break,
            },
        }
    }

    shared.sessions.remove(&session);
    let _ = socket.shutdown().await;
    let _ = shared.events.send(EngineEvent::Closed { session }).await;
}

impl Engine for TcpEngine {
    fn send(&self, session: SessionId, data: Bytes) -> Result<(), SendError> {
        let entry = self
            .shared
            .sessions
            .get(&session)
            .ok_or(SendError::Closed(session))?;
        entry
            .tx
            .send(Outbound::Data(data))
            .map_err(|_| SendError::Closed(session))
    }

    fn close(&self, session: SessionId) {
        if let Some(entry) = self.shared.sessions.get(&session) {
            let _ = entry.tx.send(Outbound::Close);
        }
    }

    fn sessions(&self) -> Vec<SessionId> {
        self.shared.sessions.iter().map(|entry| *entry.key()).collect()
    }
}
