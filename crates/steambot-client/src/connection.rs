//! The connection supervisor (spec.md §3/§4.4): owns one encrypted
//! transport on the shared I/O thread and exposes packet read/write queues
//! plus a connection-state signal to the account task.
//!
//! Grounded on `original_source/Headers/Client/ClientInfo.hpp` for the
//! previous-endpoint fast path and on `steambot-transport::handshake` for
//! the actual wire work; the supervisor itself only sequences endpoint
//! selection and owns the in/out FIFOs the account task polls through a
//! [`Waiter`].

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use steambot_core::{CancelToken, Waiter, WaiterItem};
use steambot_directory::{random_endpoint, Directory};
use steambot_persistence::{DataFile, DataFileError, Outcome};
use steambot_transport::handshake::{EncryptedConnection, HandshakeError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::io_thread::IoThread;

/// spec.md §3 `Connection`: "State ∈ {Connecting, Connected, GotEOF,
/// Error}... status transitions monotonic within a single connection
/// attempt".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Connecting,
    Connected,
    GotEOF,
    Error,
}

const DIAL_ATTEMPTS: usize = 100;
const DIAL_RETRY_DELAY: Duration = Duration::from_millis(200);

/// A live (or still-connecting) connection, aggregated by a [`Waiter`] as a
/// `WaiterItem` woken on status change or inbound packet availability.
pub struct Connection {
    status: Mutex<Status>,
    status_changed: AtomicBool,
    inbound: Mutex<VecDeque<Bytes>>,
    outbound: Mutex<VecDeque<Bytes>>,
    outbound_doorbell: Arc<Notify>,
    local_endpoint: Mutex<Option<SocketAddr>>,
    remote_endpoint: Mutex<Option<SocketAddr>>,
    doorbell: Arc<Notify>,
    cancel: CancelToken,
}

impl Connection {
    fn new(waiter: &Waiter, cancel: CancelToken) -> Arc<Self> {
        let connection = Arc::new(Self {
            status: Mutex::new(Status::Connecting),
            status_changed: AtomicBool::new(true),
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            outbound_doorbell: Arc::new(Notify::new()),
            local_endpoint: Mutex::new(None),
            remote_endpoint: Mutex::new(None),
            doorbell: waiter.doorbell(),
            cancel,
        });
        let item: Arc<dyn WaiterItem> = connection.clone();
        waiter.register(&item);
        connection
    }

    /// Pops the next inbound packet in on-wire order, or `None` if the
    /// queue is currently empty (spec.md §3 invariant: "readPacket returns
    /// empty iff queue empty").
    pub fn read_packet(&self) -> Option<Bytes> {
        self.inbound.lock().unwrap().pop_front()
    }

    /// Enqueues a packet for the writer pump. Accepted unconditionally;
    /// spec.md §3: "writes are never dropped once accepted — they are
    /// either delivered or the connection enters a terminal state".
    pub fn write_packet(&self, payload: Bytes) {
        self.outbound.lock().unwrap().push_back(payload);
        // `notify_one`: the writer pump may be between its `pop_front`
        // check and parking on `notified()` (see `run_connection` below);
        // `notify_waiters` would drop a wakeup landing in that window.
        self.outbound_doorbell.notify_one();
    }

    /// Returns the current status and clears the status-changed flag.
    pub fn status(&self) -> Status {
        self.status_changed.store(false, Ordering::SeqCst);
        *self.status.lock().unwrap()
    }

    /// Returns the current status without clearing the changed flag.
    pub fn peek_status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    pub fn local_endpoint(&self) -> Option<SocketAddr> {
        *self.local_endpoint.lock().unwrap()
    }

    pub fn remote_endpoint(&self) -> Option<SocketAddr> {
        *self.remote_endpoint.lock().unwrap()
    }

    /// Persists the currently connected remote endpoint into the account
    /// file's `previousEndpoint` key (spec.md §4.4), skipping the write if
    /// it would be a no-op (spec.md §8: "two identical ... calls result in
    /// at most one disk write").
    pub fn store_last_endpoint(&self, data_file: &DataFile) -> Result<(), DataFileError> {
        let Some(endpoint) = self.remote_endpoint() else {
            return Ok(());
        };
        let value = endpoint.to_string();
        data_file.update(|root| {
            let current = steambot_persistence::json_path::get_item(root, &["previousEndpoint"])
                .and_then(Value::as_str);
            if current == Some(value.as_str()) {
                return Ok(Outcome::Discard(()));
            }
            *steambot_persistence::json_path::create_item(root, &["previousEndpoint"]) =
                Value::String(value.clone());
            Ok(Outcome::Persist(()))
        })
    }

    fn push_inbound(&self, packet: Bytes) {
        self.inbound.lock().unwrap().push_back(packet);
        self.wakeup();
    }

    fn set_status(&self, status: Status) {
        *self.status.lock().unwrap() = status;
        self.status_changed.store(true, Ordering::SeqCst);
        self.wakeup();
    }
}

impl WaiterItem for Connection {
    fn is_woken(&self) -> bool {
        self.status_changed.load(Ordering::SeqCst) || !self.inbound.lock().unwrap().is_empty()
    }

    fn wakeup(&self) {
        // `notify_one`, matching `steambot_core::Waiter`'s doorbell
        // contract: stores a permit across the `any_woken`-then-`notified`
        // window instead of silently dropping a wakeup that lands in it.
        self.doorbell.notify_one();
    }
}

/// Classifies a handshake-layer failure into the terminal status spec.md
/// §7 assigns it: an EOF from the remote is expected and triggers
/// reconnect; anything else is an unexpected I/O error.
fn status_for_error(err: &HandshakeError) -> Status {
    if let HandshakeError::Framed(steambot_transport::framed::FramedError::Io(io_err)) = err {
        if io_err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Status::GotEOF;
        }
    }
    Status::Error
}

/// Owns the directory resolver and cell id needed to dial a CM server, and
/// spawns the connection's read/write pumps on the shared I/O thread.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    io: IoThread,
    directory: Arc<Directory>,
    cell_id: u32,
}

impl ConnectionSupervisor {
    pub fn new(io: IoThread, directory: Arc<Directory>, cell_id: u32) -> Self {
        Self { io, directory, cell_id }
    }

    /// Starts connecting and returns the `Connection` immediately in state
    /// `Connecting` (spec.md §4.4). `previous_endpoint` is read by the
    /// caller from the account file's `previousEndpoint` key, if present.
    pub fn connect(
        &self,
        waiter: &Waiter,
        cancel: CancelToken,
        previous_endpoint: Option<SocketAddr>,
    ) -> Arc<Connection> {
        let connection = Connection::new(waiter, cancel.clone());
        let task_connection = connection.clone();
        let directory = self.directory.clone();
        let cell_id = self.cell_id;
        self.io.spawn(async move {
            run_connection(task_connection, directory, cell_id, previous_endpoint, cancel).await;
        });
        connection
    }
}

async fn run_connection(
    connection: Arc<Connection>,
    directory: Arc<Directory>,
    cell_id: u32,
    previous_endpoint: Option<SocketAddr>,
    cancel: CancelToken,
) {
    let transport = Arc::new(EncryptedConnection::new());

    let endpoint = match dial(&transport, &directory, cell_id, previous_endpoint, &cancel).await {
        Some(endpoint) => endpoint,
        None => {
            connection.set_status(Status::Error);
            return;
        }
    };

    *connection.remote_endpoint.lock().unwrap() = Some(endpoint);
    *connection.local_endpoint.lock().unwrap() = transport.local_endpoint().await;
    connection.set_status(Status::Connected);
    info!(target: "steambot::client", %endpoint, "connected to CM server");

    let reader = {
        let connection = connection.clone();
        let transport = transport.clone();
        let cancel = cancel.clone();
        async move {
            loop {
                match transport.read_packet(&cancel).await {
                    Ok(packet) => connection.push_inbound(packet),
                    Err(HandshakeError::Cancelled) => return,
                    Err(err) => {
                        warn!(target: "steambot::client", %err, "connection read failed");
                        connection.set_status(status_for_error(&err));
                        return;
                    }
                }
            }
        }
    };

    let writer = {
        let connection = connection.clone();
        let transport = transport.clone();
        let cancel = cancel.clone();
        async move {
            loop {
                let next = connection.outbound.lock().unwrap().pop_front();
                let Some(packet) = next else {
                    if cancel.race(connection.outbound_doorbell.notified()).await.is_err() {
                        return;
                    }
                    continue;
                };
                if connection.peek_status() != Status::Connected {
                    // Terminal state reached with writes still queued: spec.md
                    // §4.4 says these are "accepted but discarded".
                    continue;
                }
                if let Err(err) = transport.write_packet(&packet, &cancel).await {
                    if !matches!(err, HandshakeError::Cancelled) {
                        warn!(target: "steambot::client", %err, "connection write failed");
                        connection.set_status(status_for_error(&err));
                    }
                    return;
                }
            }
        }
    };

    tokio::select! {
        _ = reader => {}
        _ = writer => {}
    }
    transport.disconnect().await;
}

/// Tries `previous_endpoint` first (falling through to the directory on
/// EOF), then up to [`DIAL_ATTEMPTS`] random directory endpoints, sleeping
/// [`DIAL_RETRY_DELAY`] between failures (spec.md §4.4).
async fn dial(
    transport: &EncryptedConnection,
    directory: &Directory,
    cell_id: u32,
    previous_endpoint: Option<SocketAddr>,
    cancel: &CancelToken,
) -> Option<SocketAddr> {
    if let Some(endpoint) = previous_endpoint {
        match transport.connect(endpoint, cancel).await {
            Ok(()) => return Some(endpoint),
            Err(err) => {
                transport.disconnect().await;
                if status_for_error(&err) != Status::GotEOF {
                    warn!(target: "steambot::client", %endpoint, %err, "previous endpoint failed with a non-EOF error, treating as terminal");
                    return None;
                }
                debug!(target: "steambot::client", %endpoint, %err, "previous endpoint got EOF, falling back to directory");
            }
        }
    }

    for attempt in 0..DIAL_ATTEMPTS {
        if cancel.is_cancelled() {
            return None;
        }
        let list = match directory.get_cm_list(cell_id, cancel).await {
            Ok(list) => list,
            Err(err) => {
                warn!(target: "steambot::client", %err, "directory lookup failed");
                return None;
            }
        };
        let Some(endpoint) = random_endpoint(&list) else {
            continue;
        };
        match transport.connect(endpoint, cancel).await {
            Ok(()) => return Some(endpoint),
            Err(err) => {
                debug!(target: "steambot::client", attempt, %endpoint, %err, "dial attempt failed");
                transport.disconnect().await;
                if cancel.sleep(DIAL_RETRY_DELAY).await.is_err() {
                    return None;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_connection_starts_connecting_and_woken() {
        let waiter = Waiter::new(CancelToken::new());
        let connection = Connection::new(&waiter, CancelToken::new());
        assert_eq!(connection.peek_status(), Status::Connecting);
        assert!(connection.is_woken());
    }

    #[tokio::test]
    async fn status_clears_changed_flag_but_peek_does_not() {
        let waiter = Waiter::new(CancelToken::new());
        let connection = Connection::new(&waiter, CancelToken::new());
        assert_eq!(connection.status(), Status::Connecting);
        assert!(!connection.status_changed.load(Ordering::SeqCst));
        connection.set_status(Status::Connected);
        assert_eq!(connection.peek_status(), Status::Connected);
        assert!(connection.status_changed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn read_packet_returns_none_when_empty_and_some_after_push() {
        let waiter = Waiter::new(CancelToken::new());
        let connection = Connection::new(&waiter, CancelToken::new());
        assert!(connection.read_packet().is_none());
        connection.push_inbound(Bytes::from_static(b"hi"));
        assert_eq!(connection.read_packet(), Some(Bytes::from_static(b"hi")));
        assert!(connection.read_packet().is_none());
    }

    #[test]
    fn status_for_error_maps_unexpected_eof_and_only_unexpected_eof() {
        let eof = HandshakeError::Framed(steambot_transport::framed::FramedError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        )));
        assert_eq!(status_for_error(&eof), Status::GotEOF);

        let refused = HandshakeError::Framed(steambot_transport::framed::FramedError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert_eq!(status_for_error(&refused), Status::Error);

        assert_eq!(status_for_error(&HandshakeError::HmacMismatch), Status::Error);
    }

    #[tokio::test]
    async fn dial_treats_a_non_eof_previous_endpoint_failure_as_terminal() {
        // A closed local listener refuses the connection immediately with a
        // non-EOF error; `dial` must not fall through to the directory for
        // it (spec.md §4.4/§7 scope the fall-through to EOF specifically).
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let refused_endpoint = listener.local_addr().unwrap();
        drop(listener);

        let transport = EncryptedConnection::new();
        let directory = Directory::new();
        let cancel = CancelToken::new();

        let result = dial(&transport, &directory, 0, Some(refused_endpoint), &cancel).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn store_last_endpoint_is_a_single_write_for_repeated_identical_calls() {
        let dir = tempfile::tempdir().unwrap();
        let data_file =
            steambot_persistence::DataFile::get(dir.path(), "endpoint-test", steambot_persistence::DataFileFlavor::Account)
                .unwrap();

        let waiter = Waiter::new(CancelToken::new());
        let connection = Connection::new(&waiter, CancelToken::new());
        *connection.remote_endpoint.lock().unwrap() = Some("162.254.197.39:27017".parse().unwrap());

        connection.store_last_endpoint(&data_file).unwrap();
        let path = data_file.path().to_path_buf();
        let first_write = std::fs::metadata(&path).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        connection.store_last_endpoint(&data_file).unwrap();
        let second_write = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(first_write, second_write);
    }
}
