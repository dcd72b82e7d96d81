//! onenode-stream — streaming client for the OneNode agent service.
//!
//! Issues cancellable JSON requests and decodes streamed response bodies
//! into lines as the bytes arrive.
//!
//! # Architecture
//!
//! ```text
//! StreamClient::issue(StreamRequest)
//!   ├── CancelHandle        (returned before the request settles)
//!   └── Pending ──► ResponseOutcome
//!                     ├── Live(LiveResponse) ──► decode_lines(&mut body, on_line)
//!                     └── Signal(205)            (no body)
//!                   or StreamError              (transport, HTTP, cancel, timeout)
//! ```
//!
//! # Reading a body
//!
//! A [`ResponseBody`] is read through a [`BodyReader`], which mutably
//! borrows the body for as long as it lives. Only one reader can exist at a
//! time, and dropping it releases the body on every exit path, so a decode
//! that fails halfway leaves the remaining bytes readable.

pub mod api;
pub mod body;
pub mod cancel;
pub mod client;
pub mod decode;
mod error;

pub use api::BackendConfig;
pub use body::{BodyReader, ByteStream, ResponseBody};
pub use cancel::CancelHandle;
pub use client::{LiveResponse, Pending, ResponseOutcome, StreamClient, StreamRequest};
pub use decode::{decode_lines, LineDecoder};
pub use error::{StreamError, StreamResult};
