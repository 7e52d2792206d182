//! The binary frame codec spoken by the legacy client.
//!
//! A frame is a count followed by that many values plus one:
//!
//! ```text
//! [count = n - 1] [value 0] [value 1] ... [value n - 1]
//! ```
//!
//! Every value starts with a pattern byte. The high bits select the type;
//! the low bits carry either a small inline value, a short length, or the
//! number of bytes that follow. Multi-byte numbers are big-endian with
//! leading zero bytes stripped.
//!
//! Encoding is a plain function ([`encode`]). Decoding is incremental
//! ([`FrameDecoder`]) because TCP reads split frames at arbitrary points.

use crate::{ProtocolError, Value};

/// Default cap on a single string or byte-array payload.
pub const DEFAULT_MAX_VALUE_LEN: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Pattern bytes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Pattern {
    StringShort = 0xC0,
    UIntShort = 0x80,
    ByteArrayShort = 0x40,
    ULong = 0x3C,
    ULongShort = 0x38,
    Long = 0x34,
    LongShort = 0x30,
    ByteArray = 0x10,
    String = 0x0C,
    UInt = 0x08,
    Int = 0x04,
    Double = 0x03,
    Float = 0x02,
    True = 0x01,
    False = 0x00,
}

impl Pattern {
    /// Most specific mask first; `False` (0x00) matches anything.
    const DETECTION_ORDER: [Pattern; 15] = [
        Pattern::StringShort,
        Pattern::UIntShort,
        Pattern::ByteArrayShort,
        Pattern::ULong,
        Pattern::ULongShort,
        Pattern::Long,
        Pattern::LongShort,
        Pattern::ByteArray,
        Pattern::String,
        Pattern::UInt,
        Pattern::Int,
        Pattern::Double,
        Pattern::Float,
        Pattern::True,
        Pattern::False,
    ];

    fn bits(self) -> u8 {
        self as u8
    }

    /// Largest value the low bits may hold for this pattern.
    fn max_low_bits(self) -> u8 {
        match self {
            Pattern::StringShort | Pattern::UIntShort | Pattern::ByteArrayShort => 63,
            Pattern::Double | Pattern::Float | Pattern::True | Pattern::False => 0,
            _ => 3,
        }
    }

    /// Splits a pattern byte into its pattern and low bits.
    fn detect(byte: u8) -> Result<(Pattern, u8), ProtocolError> {
        for pattern in Self::DETECTION_ORDER {
            let bits = pattern.bits();
            if byte & bits != bits {
                continue;
            }
            let low = byte & !bits;
            if low > pattern.max_low_bits() {
                return Err(ProtocolError::MalformedFrame(format!(
                    "invalid pattern byte {byte:#04x}"
                )));
            }
            return Ok((pattern, low));
        }
        Err(ProtocolError::MalformedFrame(format!(
            "unrecognised pattern byte {byte:#04x}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes an ordered list of values into one frame.
///
/// An empty list encodes to an empty buffer (there is no count to write).
///
/// # Errors
/// Returns [`ProtocolError::Oversized`] if a string or byte array is too
/// long for a four-byte length prefix.
///
/// ```rust
/// use stronghold_protocol::{decode, encode, Value};
///
/// let bytes = encode(&["tu".into(), Value::Double(1.5)]).unwrap();
/// assert_eq!(decode(&bytes).unwrap(), vec![Value::from("tu"), Value::Double(1.5)]);
/// ```
pub fn encode(values: &[Value]) -> Result<Vec<u8>, ProtocolError> {
    let Some(last) = values.len().checked_sub(1) else {
        return Ok(Vec::new());
    };
    let count = i32::try_from(last).map_err(|_| ProtocolError::Oversized {
        len: values.len(),
        limit: i32::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(16 * values.len());
    write_value(&mut out, &Value::Int(count))?;
    for value in values {
        write_value(&mut out, value)?;
    }
    Ok(out)
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), ProtocolError> {
    match value {
        Value::String(s) => {
            write_length(out, s.len(), Pattern::StringShort, Pattern::String)?;
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            write_length(out, b.len(), Pattern::ByteArrayShort, Pattern::ByteArray)?;
            out.extend_from_slice(b);
        }
        Value::Int(v) => match u8::try_from(*v) {
            Ok(small) if small <= 63 => out.push(Pattern::UIntShort.bits() | small),
            _ => write_stripped(out, &v.to_be_bytes(), Pattern::Int),
        },
        Value::UInt(v) => match u8::try_from(*v) {
            Ok(small) if small <= 63 => out.push(Pattern::UIntShort.bits() | small),
            _ => write_stripped(out, &v.to_be_bytes(), Pattern::UInt),
        },
        Value::Long(v) => write_long(out, &v.to_be_bytes(), Pattern::LongShort, Pattern::Long),
        Value::ULong(v) => {
            write_long(out, &v.to_be_bytes(), Pattern::ULongShort, Pattern::ULong)
        }
        Value::Float(v) => {
            out.push(Pattern::Float.bits());
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Double(v) => {
            out.push(Pattern::Double.bits());
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Bool(true) => out.push(Pattern::True.bits()),
        Value::Bool(false) => out.push(Pattern::False.bits()),
    }
    Ok(())
}

fn write_length(
    out: &mut Vec<u8>,
    len: usize,
    short: Pattern,
    full: Pattern,
) -> Result<(), ProtocolError> {
    if len <= 63 {
        out.push(short.bits() | len as u8);
        return Ok(());
    }
    let len = u32::try_from(len).map_err(|_| ProtocolError::Oversized {
        len,
        limit: u32::MAX as usize,
    })?;
    write_stripped(out, &len.to_be_bytes(), full);
    Ok(())
}

/// Writes `pattern | (used - 1)` followed by the significant bytes.
fn write_stripped(out: &mut Vec<u8>, be: &[u8], pattern: Pattern) {
    let used = significant(be);
    out.push(pattern.bits() | (used - 1) as u8);
    out.extend_from_slice(&be[be.len() - used..]);
}

/// 64-bit values pick the short pattern up to four bytes.
fn write_long(out: &mut Vec<u8>, be: &[u8; 8], short: Pattern, long: Pattern) {
    let used = significant(be);
    if used > 4 {
        out.push(long.bits() | (used - 5) as u8);
    } else {
        out.push(short.bits() | (used - 1) as u8);
    }
    out.extend_from_slice(&be[8 - used..]);
}

/// Number of bytes left after stripping leading zeros, at least one.
fn significant(be: &[u8]) -> usize {
    let zeros = be.iter().take_while(|&&b| b == 0).count();
    (be.len() - zeros).max(1)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a pattern byte.
    Pattern,
    /// Reading the length prefix of a string or byte array.
    Length { pattern: Pattern, needed: usize },
    /// Reading the payload of a value.
    Body { pattern: Pattern, needed: usize },
}

/// Incremental frame decoder.
///
/// Feed it whatever the socket returned; it hands back every frame that
/// became complete and keeps the remainder for the next call.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    scratch: Vec<u8>,
    /// Values still expected for the current frame, once its count is read.
    expected: Option<usize>,
    current: Vec<Value>,
    max_value_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VALUE_LEN)
    }
}

impl FrameDecoder {
    /// Creates a decoder that rejects string or byte payloads longer than
    /// `max_value_len`.
    pub fn new(max_value_len: usize) -> Self {
        Self {
            state: State::Pattern,
            scratch: Vec::new(),
            expected: None,
            current: Vec::new(),
            max_value_len,
        }
    }

    /// `true` while part of a frame has been read but not completed.
    pub fn has_partial(&self) -> bool {
        !matches!(self.state, State::Pattern) || self.expected.is_some()
    }

    /// Drops any partially read frame.
    pub fn reset(&mut self) {
        self.state = State::Pattern;
        self.scratch.clear();
        self.expected = None;
        self.current.clear();
    }

    /// Consumes `data` and returns every frame it completed, in order.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedFrame`] or
    /// [`ProtocolError::Oversized`]. After an error the decoder state is
    /// unspecified until [`reset`](Self::reset) is called.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<Vec<Vec<Value>>, ProtocolError> {
        let mut frames = Vec::new();

        while let Some((&byte, rest)) = data.split_first() {
            match self.state {
                State::Pattern => {
                    data = rest;
                    self.start_value(byte, &mut frames)?;
                }
                State::Length { pattern, needed } => {
                    data = rest;
                    self.scratch.push(byte);
                    if self.scratch.len() == needed {
                        let len = be_uint(&self.scratch) as usize;
                        self.scratch.clear();
                        self.begin_payload(pattern, len, &mut frames)?;
                    }
                }
                State::Body { pattern, needed } => {
                    let take = (needed - self.scratch.len()).min(data.len());
                    self.scratch.extend_from_slice(&data[..take]);
                    data = &data[take..];
                    if self.scratch.len() == needed {
                        let bytes = std::mem::take(&mut self.scratch);
                        self.state = State::Pattern;
                        let value = finish_value(pattern, bytes)?;
                        self.push_value(value, &mut frames)?;
                    }
                }
            }
        }

        Ok(frames)
    }

    fn start_value(
        &mut self,
        byte: u8,
        frames: &mut Vec<Vec<Value>>,
    ) -> Result<(), ProtocolError> {
        let (pattern, low) = Pattern::detect(byte)?;
        let low = usize::from(low);
        match pattern {
            Pattern::StringShort | Pattern::ByteArrayShort => {
                self.begin_payload(pattern, low, frames)?;
            }
            Pattern::String | Pattern::ByteArray => {
                self.state = State::Length { pattern, needed: low + 1 };
            }
            Pattern::UIntShort => self.push_value(Value::Int(low as i32), frames)?,
            Pattern::UInt | Pattern::Int | Pattern::ULongShort | Pattern::LongShort => {
                self.state = State::Body { pattern, needed: low + 1 };
            }
            Pattern::ULong | Pattern::Long => {
                self.state = State::Body { pattern, needed: low + 5 };
            }
            Pattern::Double => self.state = State::Body { pattern, needed: 8 },
            Pattern::Float => self.state = State::Body { pattern, needed: 4 },
            Pattern::True => self.push_value(Value::Bool(true), frames)?,
            Pattern::False => self.push_value(Value::Bool(false), frames)?,
        }
        Ok(())
    }

    /// Moves to reading `len` payload bytes, or emits the empty value.
    fn begin_payload(
        &mut self,
        pattern: Pattern,
        len: usize,
        frames: &mut Vec<Vec<Value>>,
    ) -> Result<(), ProtocolError> {
        if len > self.max_value_len {
            return Err(ProtocolError::Oversized { len, limit: self.max_value_len });
        }
        if len > 0 {
            self.state = State::Body { pattern, needed: len };
            return Ok(());
        }
        self.state = State::Pattern;
        let empty = match pattern {
            Pattern::StringShort | Pattern::String => Value::String(String::new()),
            _ => Value::Bytes(Vec::new()),
        };
        self.push_value(empty, frames)
    }

    fn push_value(
        &mut self,
        value: Value,
        frames: &mut Vec<Vec<Value>>,
    ) -> Result<(), ProtocolError> {
        let Some(expected) = self.expected else {
            let count = value
                .as_i64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    ProtocolError::MalformedFrame(format!(
                        "frame must start with a non-negative count, got {}",
                        value.type_name()
                    ))
                })?;
            self.expected = Some(count.saturating_add(1));
            return Ok(());
        };

        self.current.push(value);
        if self.current.len() == expected {
            frames.push(std::mem::take(&mut self.current));
            self.expected = None;
        }
        Ok(())
    }
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Left-pads a big-endian slice to `N` bytes.
fn padded<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf[N - bytes.len()..].copy_from_slice(bytes);
    buf
}

fn finish_value(pattern: Pattern, bytes: Vec<u8>) -> Result<Value, ProtocolError> {
    let value = match pattern {
        Pattern::StringShort | Pattern::String => {
            let s = String::from_utf8(bytes).map_err(|e| {
                ProtocolError::MalformedFrame(format!("string is not UTF-8: {e}"))
            })?;
            Value::String(s)
        }
        Pattern::ByteArrayShort | Pattern::ByteArray => Value::Bytes(bytes),
        Pattern::Int => Value::Int(i32::from_be_bytes(padded(&bytes))),
        Pattern::UInt => Value::UInt(u32::from_be_bytes(padded(&bytes))),
        Pattern::LongShort | Pattern::Long => Value::Long(i64::from_be_bytes(padded(&bytes))),
        Pattern::ULongShort | Pattern::ULong => {
            Value::ULong(u64::from_be_bytes(padded(&bytes)))
        }
        Pattern::Double => Value::Double(f64::from_be_bytes(padded(&bytes))),
        Pattern::Float => Value::Float(f32::from_be_bytes(padded(&bytes))),
        Pattern::UIntShort | Pattern::True | Pattern::False => {
            return Err(ProtocolError::MalformedFrame(format!(
                "pattern {:#04x} carries no payload",
                pattern.bits()
            )));
        }
    };
    Ok(value)
}

/// Decodes the first complete frame in `data`.
///
/// Empty or truncated input yields an empty list rather than an error;
/// only bytes that can never form a frame are reported.
pub fn decode(data: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    Ok(decode_frames(data)?.into_iter().next().unwrap_or_default())
}

/// Decodes every complete frame in `data`, ignoring a trailing partial one.
pub fn decode_frames(data: &[u8]) -> Result<Vec<Vec<Value>>, ProtocolError> {
    FrameDecoder::default().feed(data)
}

// =========================================================================
// Tests
// =========================================================================
