//! Streaming HTTP/1.x request tokenizer.
//!
//! [`Tokenizer`] is fed raw bytes as they arrive and reports what it sees
//! through a [`ParserCallbacks`] implementation: message begin, URL, header
//! field/value pairs, end of head, body chunks and message completion. It
//! keeps no request of its own; assembling one is the callbacks' job.
//!
//! The request head is buffered until its terminating blank line and then
//! validated with `httparse`. Bodies are framed by `Transfer-Encoding:
//! chunked` or `Content-Length` and streamed through without buffering.

use bytes::BytesMut;

use crate::http::request::{Method, Version};

/// Headers accepted per request head.
pub const MAX_HEADERS: usize = 64;

/// Default limit for a buffered request head.
pub const DEFAULT_MAX_HEAD_BYTES: usize = 80 * 1024;

/// Boxed error returned by a callback.
pub type CallbackSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid HTTP method")]
    InvalidMethod,
    #[error("invalid request target")]
    InvalidUrl,
    #[error("invalid character in header name")]
    InvalidHeaderToken,
    #[error("invalid character in header value")]
    InvalidHeaderValue,
    #[error("invalid request syntax")]
    InvalidToken,
    #[error("LF character expected")]
    InvalidNewLine,
    #[error("invalid HTTP version")]
    InvalidVersion,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("request head exceeds the size limit")]
    HeaderOverflow,
    #[error("invalid character in Content-Length header")]
    InvalidContentLength,
    #[error("conflicting Content-Length headers")]
    UnexpectedContentLength,
    #[error("unsupported transfer encoding")]
    InvalidTransferEncoding,
    #[error("invalid character in chunk size header")]
    InvalidChunkSize,
    #[error("chunk data not followed by CRLF")]
    InvalidChunkTerminator,
    #[error("the {event} callback failed: {source}")]
    Callback {
        event: &'static str,
        source: CallbackSource,
    },
}

impl ParseError {
    /// Short machine-readable code, in the style of the classic `HPE_*` names.
    pub fn name(&self) -> &'static str {
        match self {
            ParseError::InvalidMethod => "HPE_INVALID_METHOD",
            ParseError::InvalidUrl => "HPE_INVALID_URL",
            ParseError::InvalidHeaderToken => "HPE_INVALID_HEADER_TOKEN",
            ParseError::InvalidHeaderValue => "HPE_INVALID_HEADER_VALUE",
            ParseError::InvalidToken => "HPE_INVALID_CONSTANT",
            ParseError::InvalidNewLine => "HPE_LF_EXPECTED",
            ParseError::InvalidVersion => "HPE_INVALID_VERSION",
            ParseError::TooManyHeaders => "HPE_TOO_MANY_HEADERS",
            ParseError::HeaderOverflow => "HPE_HEADER_OVERFLOW",
            ParseError::InvalidContentLength => "HPE_INVALID_CONTENT_LENGTH",
            ParseError::UnexpectedContentLength => "HPE_UNEXPECTED_CONTENT_LENGTH",
            ParseError::InvalidTransferEncoding => "HPE_INVALID_TRANSFER_ENCODING",
            ParseError::InvalidChunkSize => "HPE_INVALID_CHUNK_SIZE",
            ParseError::InvalidChunkTerminator => "HPE_STRICT",
            ParseError::Callback { .. } => "HPE_CB_ERROR",
        }
    }

    /// Human-readable description, identical to the `Display` output.
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl From<httparse::Error> for ParseError {
    fn from(err: httparse::Error) -> Self {
        match err {
            httparse::Error::HeaderName => ParseError::InvalidHeaderToken,
            httparse::Error::HeaderValue => ParseError::InvalidHeaderValue,
            httparse::Error::NewLine => ParseError::InvalidNewLine,
            httparse::Error::Version => ParseError::InvalidVersion,
            httparse::Error::TooManyHeaders => ParseError::TooManyHeaders,
            // Status only occurs when parsing responses.
            httparse::Error::Token | httparse::Error::Status => ParseError::InvalidToken,
        }
    }
}

/// What the tokenizer knows once a request head is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHead {
    pub method: Method,
    pub version: Version,
    pub content_length: Option<u64>,
    pub chunked: bool,
}

/// Event table driven by [`Tokenizer::execute`].
///
/// Data callbacks may be invoked more than once per element when it arrives
/// in pieces, so implementations must append rather than replace. Returning
/// an error aborts the current `execute` call and leaves the tokenizer in a
/// failed state.
pub trait ParserCallbacks {
    type Error: std::error::Error + Send + Sync + 'static;

    fn on_message_begin(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_url(&mut self, _at: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_header_field(&mut self, _at: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_header_value(&mut self, _at: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_headers_complete(&mut self, _head: &MessageHead) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_body(&mut self, _at: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_message_complete(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between messages; CR/LF padding is skipped.
    Start,
    Head,
    Body { remaining: u64 },
    ChunkSize { size: u64, digits: u8, in_ext: bool },
    ChunkSizeLf { size: u64 },
    ChunkData { remaining: u64 },
    ChunkDataCr,
    ChunkDataLf,
    Trailer { line_len: usize },
    Failed,
}

pub struct Tokenizer {
    state: State,
    head: BytesMut,
    max_head_bytes: usize,
    error: Option<ParseError>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEAD_BYTES)
    }
}

impl Tokenizer {
    pub fn new(max_head_bytes: usize) -> Self {
        Self {
            state: State::Start,
            head: BytesMut::new(),
            max_head_bytes,
            error: None,
        }
    }

    /// Returns the tokenizer to its initial state, keeping its head buffer
    /// allocation.
    pub fn reset(&mut self) {
        self.state = State::Start;
        self.head.clear();
        self.error = None;
    }

    /// The error that stopped the tokenizer, if any.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// `true` when no message is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == State::Start
    }

    /// Feeds `data` and returns how many bytes were consumed.
    ///
    /// Anything short of `data.len()` means the input was rejected: the
    /// returned value is the offset of the offending byte and [`error`]
    /// describes the failure. A failed tokenizer consumes nothing until it
    /// is [`reset`].
    ///
    /// [`error`]: Tokenizer::error
    /// [`reset`]: Tokenizer::reset
    pub fn execute<C>(&mut self, cb: &mut C, data: &[u8]) -> usize
    where
        C: ParserCallbacks + ?Sized,
    {
        if self.state == State::Failed {
            return 0;
        }
        match self.run(cb, data) {
            Ok(()) => data.len(),
            Err((at, err)) => {
                self.state = State::Failed;
                self.error = Some(err);
                at
            }
        }
    }

    fn run<C>(&mut self, cb: &mut C, data: &[u8]) -> Result<(), (usize, ParseError)>
    where
        C: ParserCallbacks + ?Sized,
    {
        let mut pos = 0;
        while pos < data.len() {
            let b = data[pos];
            match self.state {
                // `execute` never runs a failed tokenizer.
                State::Failed => break,
                State::Start => {
                    if b == b'\r' || b == b'\n' {
                        pos += 1;
                        continue;
                    }
                    cb.on_message_begin()
                        .map_err(|e| (pos, callback("on_message_begin", e)))?;
                    self.head.clear();
                    self.state = State::Head;
                }
                State::Head => {
                    let mut end = None;
                    for (i, &byte) in data[pos..].iter().enumerate() {
                        self.head.extend_from_slice(&[byte]);
                        if self.head.len() > self.max_head_bytes {
                            return Err((pos + i, ParseError::HeaderOverflow));
                        }
                        if byte == b'\n' && head_terminated(&self.head) {
                            end = Some(pos + i);
                            break;
                        }
                    }
                    match end {
                        Some(at) => {
                            self.finish_head(cb).map_err(|e| (at, e))?;
                            pos = at + 1;
                        }
                        None => pos = data.len(),
                    }
                }
                State::Body { remaining } => {
                    let (n, remaining) = take(remaining, data.len() - pos);
                    cb.on_body(&data[pos..pos + n])
                        .map_err(|e| (pos, callback("on_body", e)))?;
                    pos += n;
                    if remaining == 0 {
                        self.complete(cb).map_err(|e| (pos - 1, e))?;
                    } else {
                        self.state = State::Body { remaining };
                    }
                }
                State::ChunkSize {
                    size,
                    digits,
                    in_ext,
                } => {
                    self.state = match b {
                        b'\r' if digits > 0 => State::ChunkSizeLf { size },
                        b'\n' if digits > 0 => self.chunk_started(size),
                        _ if in_ext => self.state,
                        b';' | b' ' | b'\t' if digits > 0 => State::ChunkSize {
                            size,
                            digits,
                            in_ext: true,
                        },
                        _ => {
                            let digit = (b as char)
                                .to_digit(16)
                                .ok_or((pos, ParseError::InvalidChunkSize))?;
                            if digits >= 15 {
                                return Err((pos, ParseError::InvalidChunkSize));
                            }
                            State::ChunkSize {
                                size: size * 16 + u64::from(digit),
                                digits: digits + 1,
                                in_ext,
                            }
                        }
                    };
                    pos += 1;
                }
                State::ChunkSizeLf { size } => {
                    if b != b'\n' {
                        return Err((pos, ParseError::InvalidChunkSize));
                    }
                    self.state = self.chunk_started(size);
                    pos += 1;
                }
                State::ChunkData { remaining } => {
                    let (n, remaining) = take(remaining, data.len() - pos);
                    cb.on_body(&data[pos..pos + n])
                        .map_err(|e| (pos, callback("on_body", e)))?;
                    pos += n;
                    self.state = if remaining == 0 {
                        State::ChunkDataCr
                    } else {
                        State::ChunkData { remaining }
                    };
                }
                State::ChunkDataCr | State::ChunkDataLf => {
                    self.state = match (self.state, b) {
                        (State::ChunkDataCr, b'\r') => State::ChunkDataLf,
                        (_, b'\n') => State::ChunkSize {
                            size: 0,
                            digits: 0,
                            in_ext: false,
                        },
                        _ => return Err((pos, ParseError::InvalidChunkTerminator)),
                    };
                    pos += 1;
                }
                State::Trailer { line_len } => {
                    match b {
                        b'\r' => {}
                        b'\n' if line_len == 0 => self.complete(cb).map_err(|e| (pos, e))?,
                        b'\n' => self.state = State::Trailer { line_len: 0 },
                        _ if line_len >= self.max_head_bytes => {
                            return Err((pos, ParseError::HeaderOverflow));
                        }
                        _ => {
                            self.state = State::Trailer {
                                line_len: line_len + 1,
                            }
                        }
                    }
                    pos += 1;
                }
            }
        }
        Ok(())
    }

    fn finish_head<C>(&mut self, cb: &mut C) -> Result<(), ParseError>
    where
        C: ParserCallbacks + ?Sized,
    {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&self.head)? {
            httparse::Status::Complete(_) => {}
            // The buffer ends with a blank line, so a partial parse means
            // the head itself is malformed.
            httparse::Status::Partial => return Err(ParseError::InvalidToken),
        }

        let method = req
            .method
            .and_then(Method::from_str)
            .ok_or(ParseError::InvalidMethod)?;
        let version = req
            .version
            .and_then(Version::from_minor)
            .ok_or(ParseError::InvalidVersion)?;
        let path = req.path.ok_or(ParseError::InvalidUrl)?;

        cb.on_url(path.as_bytes())
            .map_err(|e| callback("on_url", e))?;

        // RFC 7230 section 3.3.3: Transfer-Encoding overrides Content-Length,
        // and differing Content-Length values are unrecoverable.
        let mut content_length: Option<u64> = None;
        let mut transfer_encoding: Option<bool> = None;
        for header in req.headers.iter() {
            cb.on_header_field(header.name.as_bytes())
                .map_err(|e| callback("on_header_field", e))?;
            cb.on_header_value(header.value)
                .map_err(|e| callback("on_header_value", e))?;

            if header.name.eq_ignore_ascii_case("Content-Length") {
                let length = parse_content_length(header.value)?;
                match content_length {
                    Some(prev) if prev != length => {
                        return Err(ParseError::UnexpectedContentLength);
                    }
                    _ => content_length = Some(length),
                }
            } else if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
                transfer_encoding = Some(chunked_is_final(header.value));
            }
        }

        let chunked = match transfer_encoding {
            Some(true) => true,
            Some(false) => return Err(ParseError::InvalidTransferEncoding),
            None => false,
        };
        let head = MessageHead {
            method,
            version,
            content_length: if chunked { None } else { content_length },
            chunked,
        };
        cb.on_headers_complete(&head)
            .map_err(|e| callback("on_headers_complete", e))?;

        self.head.clear();
        match (head.chunked, head.content_length) {
            (true, _) => {
                self.state = State::ChunkSize {
                    size: 0,
                    digits: 0,
                    in_ext: false,
                };
                Ok(())
            }
            (false, Some(remaining)) if remaining > 0 => {
                self.state = State::Body { remaining };
                Ok(())
            }
            _ => self.complete(cb),
        }
    }

    fn chunk_started(&self, size: u64) -> State {
        if size == 0 {
            State::Trailer { line_len: 0 }
        } else {
            State::ChunkData { remaining: size }
        }
    }

    fn complete<C>(&mut self, cb: &mut C) -> Result<(), ParseError>
    where
        C: ParserCallbacks + ?Sized,
    {
        self.state = State::Start;
        cb.on_message_complete()
            .map_err(|e| callback("on_message_complete", e))
    }
}

fn callback<E>(event: &'static str, err: E) -> ParseError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ParseError::Callback {
        event,
        source: Box::new(err),
    }
}

/// Splits `available` bytes against a remaining body length.
fn take(remaining: u64, available: usize) -> (usize, u64) {
    let n = usize::try_from(remaining).map_or(available, |r| r.min(available));
    (n, remaining - n as u64)
}

fn head_terminated(head: &[u8]) -> bool {
    head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n")
}

fn parse_content_length(value: &[u8]) -> Result<u64, ParseError> {
    let value = std::str::from_utf8(value)
        .map_err(|_| ParseError::InvalidContentLength)?
        .trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    value.parse().map_err(|_| ParseError::InvalidContentLength)
}

fn chunked_is_final(value: &[u8]) -> bool {
    std::str::from_utf8(value)
        .ok()
        .and_then(|v| v.rsplit(',').next())
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
}
