//! Length+magic framed TCP transport (spec §4.1): `u32 length (LE) | "VT01"
//! magic | length bytes payload`. Grounded on `crates/network/server/src/
//! protocol/codec.rs` for the length-prefix shape and on
//! `original_source/Headers/Connection/{TCP,Base}.hpp` for the
//! connect/disconnect/read_packet/write_packet contract.

use std::net::SocketAddr;

use bytes::Bytes;
use steambot_core::{CancelToken, Cancelled};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const MAGIC: &[u8; 4] = b"VT01";
const HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum FramedError {
    #[error("connection is not established")]
    NotConnected,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("bad frame magic {0:02x?}, expected \"VT01\"")]
    BadMagic([u8; 4]),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for FramedError {
    fn from(_: Cancelled) -> Self {
        FramedError::Cancelled
    }
}

/// A TCP connection framed as length-prefixed packets. Holds at most one
/// live `TcpStream`; callers are responsible for not issuing more than one
/// outstanding `read_packet`/`write_packet` at a time (the shared I/O task
/// in §4.13 is the only caller in practice).
#[derive(Default)]
pub struct FramedConnection {
    stream: Mutex<Option<TcpStream>>,
    local_endpoint: Mutex<Option<SocketAddr>>,
}

impl FramedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, endpoint: SocketAddr, cancel: &CancelToken) -> Result<(), FramedError> {
        let stream = cancel.race(TcpStream::connect(endpoint)).await??;
        let local = stream.local_addr()?;
        *self.stream.lock().await = Some(stream);
        *self.local_endpoint.lock().await = Some(local);
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.stream.lock().await.take();
        self.local_endpoint.lock().await.take();
    }

    pub async fn local_endpoint(&self) -> Option<SocketAddr> {
        *self.local_endpoint.lock().await
    }

    pub async fn read_packet(&self, cancel: &CancelToken) -> Result<Bytes, FramedError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(FramedError::NotConnected)?;

        let mut header = [0u8; HEADER_LEN];
        cancel.race(stream.read_exact(&mut header)).await??;

        let magic: [u8; 4] = header[4..8].try_into().expect("header is 8 bytes");
        if &magic != MAGIC {
            return Err(FramedError::BadMagic(magic));
        }
        let length = u32::from_le_bytes(header[0..4].try_into().expect("header is 8 bytes")) as usize;

        let mut payload = vec![0u8; length];
        cancel.race(stream.read_exact(&mut payload)).await??;
        Ok(Bytes::from(payload))
    }

    pub async fn write_packet(&self, payload: &[u8], cancel: &CancelToken) -> Result<(), FramedError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(FramedError::NotConnected)?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(MAGIC);
        frame.extend_from_slice(payload);

        cancel.race(stream.write_all(&frame)).await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn round_trips_a_packet_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut header = [0u8; HEADER_LEN];
            sock.read_exact(&mut header).await.unwrap();
            let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
            let mut payload = vec![0u8; len];
            sock.read_exact(&mut payload).await.unwrap();
            sock.write_all(&header).await.unwrap();
            sock.write_all(&payload).await.unwrap();
        });

        let cancel = CancelToken::new();
        let conn = FramedConnection::new();
        conn.connect(addr, &cancel).await.unwrap();
        conn.write_packet(b"hello steam", &cancel).await.unwrap();
        let echoed = conn.read_packet(&cancel).await.unwrap();
        assert_eq!(&echoed[..], b"hello steam");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_magic() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&5u32.to_le_bytes()).await.unwrap();
            sock.write_all(b"XXXX").await.unwrap();
            sock.write_all(b"hello").await.unwrap();
        });

        let cancel = CancelToken::new();
        let conn = FramedConnection::new();
        conn.connect(addr, &cancel).await.unwrap();
        let result = conn.read_packet(&cancel).await;
        assert!(matches!(result, Err(FramedError::BadMagic(_))));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_and_write_fail_before_connect() {
        let cancel = CancelToken::new();
        let conn = FramedConnection::new();
        assert!(matches!(
            conn.read_packet(&cancel).await,
            Err(FramedError::NotConnected)
        ));
        assert!(matches!(
            conn.write_packet(b"x", &cancel).await,
            Err(FramedError::NotConnected)
        ));
    }
}
