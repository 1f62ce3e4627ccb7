use bytes::{BufMut, Bytes, BytesMut};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("status code {0} is not a three-digit code")]
    InvalidStatus(u16),
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),
    #[error("header {0:?} has a value containing CR or LF")]
    InvalidHeaderValue(String),
}

/// Serializes a response into wire bytes.
///
/// Status and body pass through untouched. A `Content-Length` matching the
/// body is written when the response does not carry one.
pub fn encode_response(resp: &Response) -> Result<Bytes, EncodeError> {
    let code = resp.status.as_u16();
    if !resp.status.is_valid() {
        return Err(EncodeError::InvalidStatus(code));
    }

    let header_len: usize = resp
        .headers
        .iter()
        .map(|(k, v)| k.len() + v.len() + 4)
        .sum();
    let mut buf = BytesMut::with_capacity(64 + header_len + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        code,
        resp.status.reason_phrase()
    );
    buf.put_slice(status_line.as_bytes());

    let mut has_length = false;
    for (k, v) in &resp.headers {
        if k.is_empty() || !k.bytes().all(is_token_byte) {
            return Err(EncodeError::InvalidHeaderName(k.clone()));
        }
        if v.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(EncodeError::InvalidHeaderValue(k.clone()));
        }
        has_length |= k.eq_ignore_ascii_case("Content-Length");

        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(b"\r\n");
    }
    if !has_length {
        buf.put_slice(format!("Content-Length: {}\r\n", resp.body.len()).as_bytes());
    }

    // Header/body separator
    buf.put_slice(b"\r\n");
    buf.put_slice(&resp.body);

    Ok(buf.freeze())
}

/// RFC 7230 `tchar`.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
