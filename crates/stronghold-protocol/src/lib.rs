//! Wire protocol for Stronghold.
//!
//! This crate defines the "language" the legacy client speaks:
//!
//! - **Types** ([`Value`], [`PlayerId`]): the scalars that travel on the
//!   wire and the identity every other layer keys on.
//! - **Codec** ([`encode`], [`decode`], [`FrameDecoder`]): the bit-exact
//!   binary frame format.
//! - **Messages** ([`Message`]): the keyed view handlers read from.
//! - **Errors** ([`ProtocolError`]): what can go wrong on the bytes.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets. The transport hands it
//! bytes; it hands back values.
//!
//! ```text
//! Transport (bytes) → Protocol (Vec<Value> → Message) → Router (handler)
//! ```
//!
//! # Feature Flags
//!
//! - `json` (default): JSON helpers for composite values
//!   ([`Value::json`], [`Message::get_map`]) via `serde_json`.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod message;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{decode, decode_frames, encode, FrameDecoder, DEFAULT_MAX_VALUE_LEN};
pub use error::ProtocolError;
pub use message::Message;
pub use types::{PlayerId, Value};
