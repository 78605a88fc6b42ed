//! Binary framing for envelopes and subscription requests on a TCP stream.
//!
//! Envelope frame:
//! ```text
//! [to_len:4][to:N][from_len:4][from:N][ts_len:4][ts:N][payload_len:4][payload:N]
//! ```
//! Subscription frame (subscriber → bus):
//! ```text
//! [prefix_len:4][prefix:N]
//! ```
//! All lengths are big-endian `u32`.  An empty prefix subscribes to every
//! topic.

use thiserror::Error;

use crate::protocol::envelope::Envelope;

/// Size of the length prefix in front of every field.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest accepted field.  Anything bigger is treated as a corrupt stream.
pub const MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

/// Errors that can occur while encoding or decoding bus frames.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice does not yet hold a complete frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A length prefix exceeds [`MAX_FIELD_LEN`].
    #[error("field '{field}' declares {len} bytes, limit is {MAX_FIELD_LEN}")]
    FieldTooLarge { field: &'static str, len: usize },

    /// A text field (`to`, `from`, `timestamp`, subscription prefix) is not UTF-8.
    #[error("field '{0}' is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`Envelope`] as one frame.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLarge`] if any field exceeds
/// [`MAX_FIELD_LEN`].
///
/// # Examples
///
/// ```rust
/// use signal_bus::{decode_envelope, encode_envelope, Envelope};
///
/// let env = Envelope::new("ZMQ2SIP", "T-1_2", "1700000000000", b"{}".to_vec());
/// let bytes = encode_envelope(&env).unwrap();
/// let (decoded, consumed) = decode_envelope(&bytes).unwrap();
/// assert_eq!(decoded, env);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let fields: [(&'static str, &[u8]); 4] = [
        ("to", envelope.to.as_bytes()),
        ("from", envelope.from.as_bytes()),
        ("timestamp", envelope.timestamp.as_bytes()),
        ("payload", &envelope.payload),
    ];

    let total: usize = fields
        .iter()
        .map(|(_, data)| LENGTH_PREFIX_SIZE + data.len())
        .sum();
    let mut buf = Vec::with_capacity(total);
    for (name, data) in fields {
        write_field(&mut buf, name, data)?;
    }
    Ok(buf)
}

/// Decodes one [`Envelope`] from the beginning of `bytes`.
///
/// Returns the envelope and the number of bytes consumed so the caller can
/// drain its receive buffer.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] when the frame is not complete yet
///   (the caller should read more bytes and retry).
/// - [`ProtocolError::FieldTooLarge`] / [`ProtocolError::InvalidUtf8`] when
///   the stream is corrupt.
pub fn decode_envelope(bytes: &[u8]) -> Result<(Envelope, usize), ProtocolError> {
    let (to, offset) = read_field(bytes, 0, "to")?;
    let (from, offset) = read_field(bytes, offset, "from")?;
    let (timestamp, offset) = read_field(bytes, offset, "timestamp")?;
    let (payload, offset) = read_field(bytes, offset, "payload")?;

    let envelope = Envelope {
        to: utf8(to, "to")?,
        from: utf8(from, "from")?,
        timestamp: utf8(timestamp, "timestamp")?,
        payload: payload.to_vec(),
    };
    Ok((envelope, offset))
}

/// Encodes a subscription request for `prefix`.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLarge`] for absurdly long prefixes.
pub fn encode_subscription(prefix: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + prefix.len());
    write_field(&mut buf, "prefix", prefix.as_bytes())?;
    Ok(buf)
}

/// Decodes one subscription request from the beginning of `bytes`.
///
/// # Errors
///
/// Same conditions as [`decode_envelope`].
pub fn decode_subscription(bytes: &[u8]) -> Result<(String, usize), ProtocolError> {
    let (prefix, consumed) = read_field(bytes, 0, "prefix")?;
    Ok((utf8(prefix, "prefix")?, consumed))
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn write_field(buf: &mut Vec<u8>, name: &'static str, data: &[u8]) -> Result<(), ProtocolError> {
    if data.len() > MAX_FIELD_LEN {
        return Err(ProtocolError::FieldTooLarge {
            field: name,
            len: data.len(),
        });
    }
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

/// Reads the field starting at `offset`; returns it and the offset just past it.
fn read_field<'a>(
    bytes: &'a [u8],
    offset: usize,
    name: &'static str,
) -> Result<(&'a [u8], usize), ProtocolError> {
    let header_end = offset + LENGTH_PREFIX_SIZE;
    if bytes.len() < header_end {
        return Err(ProtocolError::InsufficientData {
            needed: header_end,
            available: bytes.len(),
        });
    }

    let len = u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]) as usize;
    if len > MAX_FIELD_LEN {
        return Err(ProtocolError::FieldTooLarge { field: name, len });
    }

    let end = header_end + len;
    if bytes.len() < end {
        return Err(ProtocolError::InsufficientData {
            needed: end,
            available: bytes.len(),
        });
    }
    Ok((&bytes[header_end..end], end))
}

fn utf8(data: &[u8], name: &'static str) -> Result<String, ProtocolError> {
    String::from_utf8(data.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(name))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
