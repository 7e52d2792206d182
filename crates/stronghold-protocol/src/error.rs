//! Error types for the protocol layer.
//!
//! Each crate in Stronghold defines its own error enum. A `ProtocolError`
//! always means the bytes (or the values headed for the bytes) were wrong,
//! never that the socket misbehaved.

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The byte stream cannot be a valid frame.
    ///
    /// Raised for pattern bytes whose low bits are out of range, string
    /// payloads that are not UTF-8, and frames whose leading count is not
    /// a non-negative integer. The connection loop treats this as fatal:
    /// there is no resynchronisation inside a binary stream.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A value has no wire representation.
    ///
    /// Composite values (objects, arrays, null) must be flattened to a
    /// JSON string before they reach the encoder.
    #[error("unsupported value type: {0}")]
    UnsupportedValueType(String),

    /// A length prefix exceeds the configured limit.
    #[error("value of {len} bytes exceeds limit of {limit} bytes")]
    Oversized { len: usize, limit: usize },
}
