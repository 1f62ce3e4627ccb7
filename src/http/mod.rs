//! HTTP protocol handling.
//!
//! # Architecture
//!
//! - **`parser`**: streaming tokenizer, emits events as bytes arrive
//! - **`assembler`**: turns those events into a [`request::Request`] and
//!   calls the application handler on completion
//! - **`connection`**: per-connection state the assembler works on
//! - **`request`** / **`response`**: the message model
//! - **`writer`**: serializes a response to wire bytes
//!
//! # Assembly State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Idle     │ ← between messages
//!        └──────┬──────┘
//!               │ message begin: allocate Request
//!               ▼
//!        ┌──────────────────┐
//!        │    InMessage     │ ← URL bytes appended
//!        └──────┬───────────┘
//!               │ header field
//!               ▼
//!        ┌──────────────────┐
//!        │    InHeaders     │ ← field/value staged, merged in pairs
//!        └──────┬───────────┘
//!               │ headers complete
//!               ▼
//!        ┌──────────────────┐
//!        │     InBody       │ ← body bytes appended
//!        └──────┬───────────┘
//!               │ message complete: handler(session, &request), drop it
//!               └─ back to Idle (same connection, next message)
//! ```
//!
//! Closing a connection at any stage discards the partial request without
//! calling the handler.

pub mod assembler;
pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
