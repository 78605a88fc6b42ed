//! Protocol module containing the bus envelope and its binary codec.

pub mod codec;
pub mod envelope;

pub use codec::{decode_envelope, encode_envelope, ProtocolError};
pub use envelope::Envelope;
