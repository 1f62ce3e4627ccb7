use std::collections::HashMap;
use std::fmt;

/// A numeric HTTP status code.
///
/// Any `u16` can be stored; the encoder refuses codes outside `100..=999`
/// when the response is written. Common codes have named constants:
/// - `OK` (200): Request successful
/// - `CREATED` (201): Resource created successfully
/// - `NO_CONTENT` (204): Successful request with no content
/// - `BAD_REQUEST` (400): Malformed request
/// - `NOT_FOUND` (404): Resource not found
/// - `METHOD_NOT_ALLOWED` (405): HTTP method not supported
/// - `PAYLOAD_TOO_LARGE` (413): Body over the configured limit
/// - `INTERNAL_SERVER_ERROR` (500): Server error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    pub const fn new(code: u16) -> Self {
        StatusCode(code)
    }

    /// ```
    /// # use http_svr::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Whether the code fits in the three-digit status-line field.
    pub fn is_valid(&self) -> bool {
        (100..=999).contains(&self.0)
    }

    /// Reason phrase written after the code; `"Unknown"` when unlisted.
    ///
    /// ```
    /// # use http_svr::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::new(299).reason_phrase(), "Unknown");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            413 => "Payload Too Large",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "Unknown",
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// An outgoing message. Owns its body; encoding borrows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Fluent construction of a [`Response`].
///
/// ```
/// # use http_svr::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(b"{}".to_vec())
///     .build();
/// assert_eq!(response.headers["Content-Length"], "2");
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self {
            status: status.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Last write for a name wins.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the response body. The buffer is moved, not copied.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Fills in `Content-Length` from the body unless one was set.
    pub fn build(mut self) -> Response {
        self.headers
            .entry("Content-Length".to_string())
            .or_insert_with(|| self.body.len().to_string());

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a response from a status and an owned body.
    pub fn with_status(status: impl Into<StatusCode>, content: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(status).body(content.into()).build()
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn bad_request() -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, b"400 Bad Request".to_vec())
    }

    pub fn not_found() -> Self {
        Self::with_status(StatusCode::NOT_FOUND, b"404 Not Found".to_vec())
    }

    pub fn internal_error() -> Self {
        Self::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            b"500 Internal Server Error".to_vec(),
        )
    }

    /// The response body (the "content" handed to `send_simple_response`).
    pub fn content(&self) -> &[u8] {
        &self.body
    }
}
