//! Framed TCP transport (spec §4.1) and the encryption handshake layered on
//! top of it (spec §4.2).

pub mod crypto;
pub mod framed;
pub mod handshake;

pub use crypto::{CryptoError, Engine, HmacAes, PlainAes};
pub use framed::{FramedConnection, FramedError};
pub use handshake::{EncryptedConnection, HandshakeError};
