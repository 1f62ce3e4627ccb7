use crate::http::request::Request;
use crate::server::engine::Session;

/// The application callback, invoked once per completed request.
///
/// The request is only borrowed for the call. Handlers run on the event loop
/// and must not block; reply through `session`, now or later from a clone.
/// An error is logged by the server and does not close the connection.
pub trait RequestHandler: Send {
    fn on_request(&mut self, session: &Session, request: &Request) -> anyhow::Result<()>;
}

impl<F> RequestHandler for F
where
    F: FnMut(&Session, &Request) -> anyhow::Result<()> + Send,
{
    fn on_request(&mut self, session: &Session, request: &Request) -> anyhow::Result<()> {
        self(session, request)
    }
}

/// Pins a closure to the handler signature so its arguments need no
/// annotations.
///
/// ```
/// use http_svr::server::handler_fn;
///
/// let handler = handler_fn(|session, request| {
///     session.send_simple_response(200u16, request.url.clone())?;
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> F
where
    F: FnMut(&Session, &Request) -> anyhow::Result<()> + Send,
{
    f
}
