//! Turns tokenizer events into [`Request`]s.
//!
//! An [`Assembler`] lives for one `execute` call. It borrows the
//! connection's [`Assembly`], the application handler and the session, so
//! every event sees its full context without any back-pointer into the
//! server.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use bytes::BytesMut;

use crate::http::connection::{Assembly, Stage};
use crate::http::parser::{MessageHead, ParserCallbacks};
use crate::http::request::Request;
use crate::server::engine::Session;
use crate::server::handler::RequestHandler;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("message began while another request was in progress")]
    RequestInProgress,
    #[error("{0} event outside of a message")]
    NoRequest(&'static str),
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("request handler panicked")]
    HandlerPanicked,
}

/// What happened during one `execute` call.
#[derive(Debug, Default)]
pub struct AssembleOutcome {
    /// Requests handed to the handler.
    pub completed: usize,
    /// First handler failure, if any. Later requests were still dispatched
    /// unless the handler panicked.
    pub handler_error: Option<anyhow::Error>,
    /// The handler panicked; parsing stopped at that message.
    pub panicked: bool,
}

pub struct Assembler<'a> {
    assembly: &'a mut Assembly,
    handler: &'a mut dyn RequestHandler,
    session: &'a Session,
    max_body_bytes: usize,
    outcome: AssembleOutcome,
}

impl<'a> Assembler<'a> {
    pub fn new(
        assembly: &'a mut Assembly,
        handler: &'a mut dyn RequestHandler,
        session: &'a Session,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            assembly,
            handler,
            session,
            max_body_bytes,
            outcome: AssembleOutcome::default(),
        }
    }

    pub fn finish(self) -> AssembleOutcome {
        self.outcome
    }

    fn request_mut(&mut self, event: &'static str) -> Result<&mut Request, AssembleError> {
        self.assembly
            .request
            .as_mut()
            .ok_or(AssembleError::NoRequest(event))
    }

    /// Moves a complete field/value pair into the request's headers.
    fn merge_pending(&mut self) -> Result<(), AssembleError> {
        if self.assembly.pending_field.is_none() || self.assembly.pending_value.is_none() {
            return Ok(());
        }
        let (Some(field), Some(value)) = (
            self.assembly.pending_field.take(),
            self.assembly.pending_value.take(),
        ) else {
            return Ok(());
        };
        let field = String::from_utf8_lossy(&field).into_owned();
        let value = String::from_utf8_lossy(&value).into_owned();
        self.request_mut("on_header_value")?
            .headers
            .insert(field, value);
        Ok(())
    }

    fn drop_unpaired(&mut self) {
        let dropped = (
            self.assembly.pending_field.take(),
            self.assembly.pending_value.take(),
        );
        if dropped.0.is_some() || dropped.1.is_some() {
            tracing::debug!(
                session = %self.session.id(),
                field = dropped.0.is_some(),
                value = dropped.1.is_some(),
                "dropping unpaired header slot"
            );
        }
    }
}

impl ParserCallbacks for Assembler<'_> {
    type Error = AssembleError;

    fn on_message_begin(&mut self) -> Result<(), AssembleError> {
        if self.assembly.request.is_some() {
            return Err(AssembleError::RequestInProgress);
        }
        self.assembly.request = Some(Request::default());
        self.assembly.stage = Stage::InMessage;
        Ok(())
    }

    fn on_url(&mut self, at: &[u8]) -> Result<(), AssembleError> {
        // Appended, the URL may arrive in several pieces.
        let url = String::from_utf8_lossy(at);
        self.request_mut("on_url")?.url.push_str(&url);
        Ok(())
    }

    fn on_header_field(&mut self, at: &[u8]) -> Result<(), AssembleError> {
        self.request_mut("on_header_field")?;
        if self.assembly.pending_value.is_some() {
            // A value with no field left over from a split value; it can no
            // longer be paired.
            self.drop_unpaired();
        }
        self.assembly.stage = Stage::InHeaders;
        self.assembly
            .pending_field
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(at);
        Ok(())
    }

    fn on_header_value(&mut self, at: &[u8]) -> Result<(), AssembleError> {
        self.request_mut("on_header_value")?;
        self.assembly
            .pending_value
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(at);
        self.merge_pending()
    }

    fn on_headers_complete(&mut self, head: &MessageHead) -> Result<(), AssembleError> {
        self.drop_unpaired();
        let request = self.request_mut("on_headers_complete")?;
        request.method = Some(head.method);
        request.version = Some(head.version);
        self.assembly.stage = Stage::InBody;
        Ok(())
    }

    fn on_body(&mut self, at: &[u8]) -> Result<(), AssembleError> {
        let limit = self.max_body_bytes;
        let request = self.request_mut("on_body")?;
        if request.body.len() + at.len() > limit {
            return Err(AssembleError::BodyTooLarge { limit });
        }
        request.body.extend_from_slice(at);
        Ok(())
    }

    fn on_message_complete(&mut self) -> Result<(), AssembleError> {
        let request = self
            .assembly
            .request
            .take()
            .ok_or(AssembleError::NoRequest("on_message_complete"))?;
        self.assembly.discard();

        tracing::debug!(
            session = %self.session.id(),
            peer = %self.session.peer_addr(),
            method = ?request.method,
            url = %request.url,
            "dispatching request"
        );
        let handler = &mut *self.handler;
        let session = self.session;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.on_request(session, &request)
        }));
        self.outcome.completed += 1;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.outcome.handler_error.get_or_insert(err);
                Ok(())
            }
            Err(payload) => {
                let err = anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()));
                self.outcome.handler_error = Some(err);
                self.outcome.panicked = true;
                Err(AssembleError::HandlerPanicked)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string payload"
    }
}
