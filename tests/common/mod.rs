#![allow(dead_code)]

use bytes::Bytes;
use http_svr::config::Config;
use http_svr::http::request::Request;
use http_svr::server::{
    Connections, Engine, EngineEvent, RequestHandler, SendError, SessionId, handler_fn,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Engine double: records sends and close requests, reports whatever
/// sessions the test has opened and not yet confirmed closed.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    open: Vec<(SessionId, SocketAddr)>,
    sent: Vec<(SessionId, Bytes)>,
    close_requests: Vec<SessionId>,
}

impl MockEngine {
    pub fn peer(id: u64) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], 40000 + id as u16))
    }

    /// Registers a session and delivers `Opened` to the core.
    pub fn connect(&self, core: &mut Connections, id: u64) -> SessionId {
        let session = SessionId::new(id);
        let peer = Self::peer(id);
        self.state.lock().unwrap().open.push((session, peer));
        core.handle(EngineEvent::Opened { session, peer });
        session
    }

    /// Registers a session whose `Opened` has not reached the core yet.
    pub fn accept_unannounced(&self, id: u64) -> SessionId {
        let session = SessionId::new(id);
        self.state
            .lock()
            .unwrap()
            .open
            .push((session, Self::peer(id)));
        session
    }

    pub fn receive(&self, core: &mut Connections, session: SessionId, data: &[u8]) {
        core.handle(EngineEvent::Received {
            session,
            data: Bytes::copy_from_slice(data),
        });
    }

    /// Drops the session and delivers `Closed`, as the engine does after a
    /// close request or a peer hang-up.
    pub fn disconnect(&self, core: &mut Connections, session: SessionId) {
        self.state
            .lock()
            .unwrap()
            .open
            .retain(|(id, _)| *id != session);
        core.handle(EngineEvent::Closed { session });
    }

    /// Confirms every outstanding close request.
    pub fn confirm_closes(&self, core: &mut Connections) {
        let requested: Vec<SessionId> = self.state.lock().unwrap().close_requests.clone();
        for session in requested {
            let still_open = self
                .state
                .lock()
                .unwrap()
                .open
                .iter()
                .any(|(id, _)| *id == session);
            if still_open {
                self.disconnect(core, session);
            }
        }
    }

    pub fn close_requests(&self) -> Vec<SessionId> {
        self.state.lock().unwrap().close_requests.clone()
    }

    pub fn sent_to(&self, session: SessionId) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(id, _)| *id == session)
            .flat_map(|(_, data)| data.to_vec())
            .collect()
    }
}

impl Engine for MockEngine {
    fn send(&self, session: SessionId, data: Bytes) -> Result<(), SendError> {
        let mut state = self.state.lock().unwrap();
        if !state.open.iter().any(|(id, _)| *id == session) {
            return Err(SendError::Closed(session));
        }
        state.sent.push((session, data));
        Ok(())
    }

    fn close(&self, session: SessionId) {
        self.state.lock().unwrap().close_requests.push(session);
    }

    fn sessions(&self) -> Vec<SessionId> {
        self.state
            .lock()
            .unwrap()
            .open
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }
}

pub type Seen = Arc<Mutex<Vec<Request>>>;

/// Handler that records every request it is given.
pub fn recorder() -> (impl RequestHandler + 'static, Seen) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let handler = handler_fn(move |_session, request| {
        sink.lock().unwrap().push(request.clone());
        Ok(())
    });
    (handler, seen)
}

pub fn core_with<H>(config: &Config, handler: H) -> (Connections, Arc<MockEngine>)
where
    H: RequestHandler + 'static,
{
    let engine = Arc::new(MockEngine::default());
    let core = Connections::new(
        Arc::clone(&engine) as Arc<dyn Engine>,
        Box::new(handler),
        config,
    );
    (core, engine)
}

/// Core with default config and a recording handler.
pub fn recording_core() -> (Connections, Arc<MockEngine>, Seen) {
    let (handler, seen) = recorder();
    let (core, engine) = core_with(&Config::default(), handler);
    (core, engine, seen)
}
