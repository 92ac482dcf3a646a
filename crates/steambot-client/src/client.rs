//! `Client`: the runtime instance bound to one [`ClientInfo`] (spec.md §3),
//! and its lifecycle (spec.md §4.12): `launch` spawns an OS thread running
//! a single-threaded cooperative scheduler, `quit` requests shutdown, and
//! `ClientSupervisor::wait_all` blocks until every launched client has torn
//! down.
//!
//! Grounded on `crates/network/client/src/runtime.rs`/`crates/network/
//! server/src/runtime.rs` for the one-OS-thread-per-owner shape (there a
//! shared multi-thread runtime; here one dedicated current-thread runtime
//! per account, per spec.md §9's design note (a): "OS threads per account
//! plus a single-threaded cooperative runtime for tasks within").

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use serde_json::Value;
use steambot_core::{CancelToken, Messageboard, Waiter, Whiteboard};
use steambot_persistence::{json_path, DataFile, Outcome};
use tokio::sync::Notify;

use crate::client_info::ClientInfo;
use crate::connection::{Connection, ConnectionSupervisor};
use crate::module::{Module, ModuleHost, ModuleRegistry};

/// spec.md §3: "quit mode ∈ {None, Restart, Quit}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitMode {
    None,
    Restart,
    Quit,
}

/// Counts cooperative tasks other than the client's main task, so `run`
/// can detect "all non-main tasks finished" (spec.md §4.6's "fiber-counter
/// hook").
#[derive(Default)]
struct FiberCounter {
    count: AtomicUsize,
    notify: Notify,
}

impl FiberCounter {
    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            // `notify_one`: stores a permit if `wait_for_zero` hasn't
            // reached `notified()` yet, closing the race between its count
            // check and parking (same defect class as `steambot_core::
            // Waiter`'s doorbell).
            self.notify.notify_one();
        }
    }

    async fn wait_for_zero(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.notify.notified().await;
        }
    }
}

/// One running instance of an account (spec.md §3). Owns the whiteboard,
/// messageboard, cancel token, data file handle, connection, and the
/// modules launched against it.
pub struct Client {
    client_info: Arc<ClientInfo>,
    whiteboard: Arc<Whiteboard>,
    messageboard: Arc<Messageboard>,
    cancel: CancelToken,
    waiter: Waiter,
    connection: Arc<Connection>,
    data_file: Arc<DataFile>,
    fiber_counter: FiberCounter,
    quit_mode: Mutex<QuitMode>,
    modules: OnceLock<ModuleHost>,
    login_started: Mutex<Option<Instant>>,
}

impl Client {
    fn new(client_info: Arc<ClientInfo>, connection_supervisor: &ConnectionSupervisor) -> Arc<Self> {
        let cancel = CancelToken::new();
        let waiter = Waiter::new(cancel.clone());
        let data_file = client_info.data_file().clone();

        let previous_endpoint = data_file.examine(|root| {
            json_path::get_item(root, &["previousEndpoint"])
                .and_then(Value::as_str)
                .and_then(|text| text.parse().ok())
        });
        let connection = connection_supervisor.connect(&waiter, cancel.clone(), previous_endpoint);

        Arc::new(Self {
            client_info,
            whiteboard: Whiteboard::new(),
            messageboard: Messageboard::new(),
            cancel,
            waiter,
            connection,
            data_file,
            fiber_counter: FiberCounter::default(),
            quit_mode: Mutex::new(QuitMode::None),
            modules: OnceLock::new(),
            login_started: Mutex::new(None),
        })
    }

    pub fn client_info(&self) -> &Arc<ClientInfo> {
        &self.client_info
    }

    pub fn account_name(&self) -> &str {
        self.client_info.account_name()
    }

    pub fn whiteboard(&self) -> &Arc<Whiteboard> {
        &self.whiteboard
    }

    pub fn messageboard(&self) -> &Arc<Messageboard> {
        &self.messageboard
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn data_file(&self) -> &Arc<DataFile> {
        &self.data_file
    }

    /// Looks up a running peer module by type (spec.md §4.9).
    pub fn get_module<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.modules.get()?.get::<T>()
    }

    /// Records that the login driver just reached `LogonComplete`, for
    /// `Last login.duration` bookkeeping at teardown.
    pub fn mark_login_started(&self) {
        *self.login_started.lock().unwrap() = Some(Instant::now());
    }

    /// Sets quit mode and cancels every suspension point derived from this
    /// client's cancel token (spec.md §4.6/§4.12).
    pub fn quit(&self, restart: bool) {
        *self.quit_mode.lock().unwrap() = if restart { QuitMode::Restart } else { QuitMode::Quit };
        self.cancel.cancel();
    }

    pub fn quit_mode(&self) -> QuitMode {
        *self.quit_mode.lock().unwrap()
    }

    /// Runs `init` then `run` for every module the registry produces, then
    /// blocks until only the main task remains (spec.md §4.12). Returns
    /// whether the client should be re-launched (`QuitMode::Restart`).
    async fn run(self: Arc<Self>, registry: &ModuleRegistry) -> bool {
        let host = registry.instantiate();
        for module in host.modules() {
            module.init(&self);
        }
        let modules: Vec<Arc<dyn Module>> = host.modules().collect();
        self.modules
            .set(host)
            .unwrap_or_else(|_| panic!("Client::run called twice on the same instance"));

        for module in modules {
            self.fiber_counter.increment();
            let client = self.clone();
            tokio::spawn(async move {
                module.run(client.clone()).await;
                client.fiber_counter.decrement();
            });
        }

        self.fiber_counter.wait_for_zero().await;
        self.record_last_login();
        matches!(self.quit_mode(), QuitMode::Restart)
    }

    /// Persists `Last login.when`/`Last login.duration` (spec.md §6),
    /// grounded on `original_source/Sources/Client/ClientInfo.cpp`.
    fn record_last_login(&self) {
        let Some(started) = self.login_started.lock().unwrap().take() else {
            return;
        };
        let duration_secs = started.elapsed().as_secs();
        let when = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let _ = self.data_file.update(|root| {
            *json_path::create_item(root, &["Last login", "when"]) = Value::from(when);
            *json_path::create_item(root, &["Last login", "duration"]) = Value::from(duration_secs);
            Ok(Outcome::Persist(()))
        });
    }
}

/// Process-level supervision over every launched client (spec.md §4.12):
/// `launch` spawns the account thread, `quit_all` cancels every running
/// client, `wait_all` blocks until they have all torn down.
#[derive(Default)]
pub struct ClientSupervisor {
    handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
    infos: Mutex<Vec<Arc<ClientInfo>>>,
}

impl ClientSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a dedicated OS thread for `client_info`, running a
    /// current-thread Tokio runtime that re-launches the client whenever it
    /// tears down in `Restart` mode (spec.md §4.12: "After teardown, if
    /// quit mode = Restart, re-launch the same ClientInfo").
    pub fn launch(
        &self,
        client_info: Arc<ClientInfo>,
        connection_supervisor: ConnectionSupervisor,
        modules: Arc<ModuleRegistry>,
    ) {
        let thread_info = client_info.clone();
        let handle = std::thread::Builder::new()
            .name(format!("steambot-{}", client_info.account_name()))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build per-account runtime");
                runtime.block_on(async move {
                    loop {
                        let client = Client::new(thread_info.clone(), &connection_supervisor);
                        thread_info.set_active(Some(client.clone()));
                        let restart = client.run(&modules).await;
                        thread_info.set_active(None);
                        if !restart {
                            break;
                        }
                    }
                });
            })
            .expect("failed to spawn account thread");

        self.handles.lock().unwrap().push(handle);
        self.infos.lock().unwrap().push(client_info);
    }

    /// Calls `quit(restart)` on every currently-active client.
    pub fn quit_all(&self, restart: bool) {
        for info in self.infos.lock().unwrap().iter() {
            if let Some(client) = info.client() {
                client.quit(restart);
            }
        }
    }

    /// Blocks until every launched client's thread has exited.
    pub fn wait_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fiber_counter_wait_for_zero_resolves_immediately_when_empty() {
        let counter = FiberCounter::default();
        counter.wait_for_zero().await;
    }

    #[tokio::test]
    async fn fiber_counter_waits_until_every_increment_is_matched() {
        let counter = Arc::new(FiberCounter::default());
        counter.increment();
        counter.increment();

        let waiter_counter = counter.clone();
        let waiting = tokio::spawn(async move {
            waiter_counter.wait_for_zero().await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!waiting.is_finished());

        counter.decrement();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!waiting.is_finished());

        counter.decrement();
        waiting.await.unwrap();
    }
}
