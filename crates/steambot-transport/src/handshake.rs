//! The encryption handshake and encrypted transport (spec §4.2), ported
//! from `original_source/Sources/Connection/Encrypted.cpp`.

use std::net::SocketAddr;

use bytes::{Buf, Bytes};
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use steambot_core::{CancelToken, Cancelled};
use steambot_protocol::emsg;
use steambot_protocol::header::{self, HeaderError};
use steambot_protocol::universe::{Universe, UniverseError, UniverseType};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::crypto::{CryptoError, Engine, HmacAes, PlainAes, KEY_LEN};
use crate::framed::{FramedConnection, FramedError};

const ENCRYPTION_PROTOCOL_VERSION: u32 = 1;
const RESULT_OK: u32 = 1;
/// The original implementation hardcodes this field to 128 regardless of
/// the actual RSA blob length; kept verbatim rather than "fixed" since a
/// real CM server only ever reads the blob that follows, not this field.
const RESPONSE_KEY_SIZE: u32 = 128;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Framed(#[from] FramedError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Universe(#[from] UniverseError),
    #[error("rsa encryption failed: {0}")]
    Rsa(rsa::Error),
    #[error("universe public key is not a valid DER SubjectPublicKeyInfo: {0}")]
    KeyParse(String),
    #[error("channel encrypt request body is too short ({0} bytes)")]
    ShortRequestBody(usize),
    #[error("encryption handshake failed with result code {0}")]
    ResultNotOk(u32),
    #[error("hmac integrity check failed, packet was tampered with or mis-keyed")]
    HmacMismatch,
    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for HandshakeError {
    fn from(_: Cancelled) -> Self {
        HandshakeError::Cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncryptionState {
    None,
    Challenged,
    Encrypting,
}

struct EncryptRequestBody {
    #[allow(dead_code)]
    protocol_version: u32,
    universe: UniverseType,
    random_challenge: Option<Vec<u8>>,
}

fn parse_encrypt_request(mut body: &[u8]) -> Result<EncryptRequestBody, HandshakeError> {
    if body.len() < 8 {
        return Err(HandshakeError::ShortRequestBody(body.len()));
    }
    let protocol_version = body.get_u32_le();
    let universe = UniverseType::from_wire(body.get_u32_le());
    let random_challenge = if body.len() >= 16 { Some(body.to_vec()) } else { None };
    Ok(EncryptRequestBody {
        protocol_version,
        universe,
        random_challenge,
    })
}

fn encode_encrypt_response(encrypted_blob: &[u8], crc: u32) -> Bytes {
    use bytes::{BufMut, BytesMut};
    let mut body = BytesMut::with_capacity(8 + encrypted_blob.len() + 8);
    body.put_u32_le(ENCRYPTION_PROTOCOL_VERSION);
    body.put_u32_le(RESPONSE_KEY_SIZE);
    body.put_slice(encrypted_blob);
    body.put_u32_le(crc);
    body.put_u32_le(0);
    header::encode_simple(emsg::CHANNEL_ENCRYPT_RESPONSE, &body)
}

/// Wraps a [`FramedConnection`] and performs the encryption handshake
/// before exposing plaintext `read_packet`/`write_packet`.
pub struct EncryptedConnection {
    framed: FramedConnection,
    engine: Mutex<Option<Engine>>,
}

impl EncryptedConnection {
    pub fn new() -> Self {
        Self {
            framed: FramedConnection::new(),
            engine: Mutex::new(None),
        }
    }

    pub async fn connect(&self, endpoint: SocketAddr, cancel: &CancelToken) -> Result<(), HandshakeError> {
        self.framed.connect(endpoint, cancel).await?;
        self.establish_encryption(cancel).await
    }

    pub async fn disconnect(&self) {
        self.framed.disconnect().await;
        *self.engine.lock().await = None;
    }

    pub async fn local_endpoint(&self) -> Option<SocketAddr> {
        self.framed.local_endpoint().await
    }

    async fn establish_encryption(&self, cancel: &CancelToken) -> Result<(), HandshakeError> {
        let mut state = EncryptionState::None;
        while state != EncryptionState::Encrypting {
            let bytes = self.framed.read_packet(cancel).await?;
            let msg_type = header::peek_msg_type(&bytes)?;

            if state == EncryptionState::None && msg_type == emsg::CHANNEL_ENCRYPT_REQUEST {
                self.handle_encrypt_request(&bytes, cancel).await?;
                state = EncryptionState::Challenged;
            } else if state == EncryptionState::Challenged && msg_type == emsg::CHANNEL_ENCRYPT_RESULT {
                self.handle_encrypt_result(&bytes)?;
                state = EncryptionState::Encrypting;
            } else {
                tracing::info!(msg_type, ?state, "ignoring unexpected message before encryption is set up");
            }
        }
        Ok(())
    }

    async fn handle_encrypt_request(&self, bytes: &[u8], cancel: &CancelToken) -> Result<(), HandshakeError> {
        let body = header::decode_simple(bytes, emsg::CHANNEL_ENCRYPT_REQUEST)?;
        let request = parse_encrypt_request(&body)?;

        let mut session_key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut session_key);

        let mut plaintext = Vec::with_capacity(KEY_LEN + 16);
        plaintext.extend_from_slice(&session_key);
        if let Some(challenge) = &request.random_challenge {
            plaintext.extend_from_slice(challenge);
        }

        let universe = Universe::get(request.universe)?;
        let public_key = RsaPublicKey::from_public_key_der(&universe.public_key)
            .map_err(|err| HandshakeError::KeyParse(err.to_string()))?;
        let encrypted_blob = public_key
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &plaintext)
            .map_err(HandshakeError::Rsa)?;

        let crc = crc32fast::hash(&encrypted_blob);

        let engine = if request.random_challenge.is_some() {
            Engine::Hmac(HmacAes::new(session_key))
        } else {
            Engine::Plain(PlainAes::new(session_key))
        };
        *self.engine.lock().await = Some(engine);

        let response = encode_encrypt_response(&encrypted_blob, crc);
        self.framed.write_packet(&response, cancel).await?;
        Ok(())
    }

    fn handle_encrypt_result(&self, bytes: &[u8]) -> Result<(), HandshakeError> {
        let body = header::decode_simple(bytes, emsg::CHANNEL_ENCRYPT_RESULT)?;
        if body.len() < 4 {
            return Err(HandshakeError::ShortRequestBody(body.len()));
        }
        let result = u32::from_le_bytes(body[0..4].try_into().unwrap());
        if result != RESULT_OK {
            return Err(HandshakeError::ResultNotOk(result));
        }
        Ok(())
    }

    pub async fn read_packet(&self, cancel: &CancelToken) -> Result<Bytes, HandshakeError> {
        let ciphertext = self.framed.read_packet(cancel).await?;
        let guard = self.engine.lock().await;
        let engine = guard.as_ref().expect("read_packet called before encryption is established");
        let plaintext = engine
            .decrypt(&ciphertext)
            .map_err(crypto_error_to_handshake_error)?;
        Ok(Bytes::from(plaintext))
    }

    pub async fn write_packet(&self, payload: &[u8], cancel: &CancelToken) -> Result<(), HandshakeError> {
        let ciphertext = {
            let guard = self.engine.lock().await;
            let engine = guard.as_ref().expect("write_packet called before encryption is established");
            engine.encrypt(payload)
        };
        self.framed.write_packet(&ciphertext, cancel).await?;
        Ok(())
    }

    pub async fn cancel(&self) {
        self.framed.disconnect().await;
    }
}

impl Default for EncryptedConnection {
    fn default() -> Self {
        Self::new()
    }
}

fn crypto_error_to_handshake_error(err: CryptoError) -> HandshakeError {
    match err {
        CryptoError::HmacMismatch => HandshakeError::HmacMismatch,
        other => HandshakeError::Framed(FramedError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            other.to_string(),
        ))),
    }
}
