//! Wraps [`steambot_login::LoginDriver`] as a [`Module`] (spec.md §4.10):
//! waits for the connection, sends `CMsgClientLogon`, pumps
//! `CMsgClientLogonResponse`/`CMsgClientUpdateMachineAuth` off the
//! connection's inbound queue, and publishes `LoginStatus`/`SessionInfo`/
//! `HeartbeatInterval` on the whiteboard.
//!
//! Grounded on `original_source/Sources/Client/Login.cpp` for the overall
//! exchange; the actual state transitions live in `steambot-login` so they
//! stay unit-testable without a socket.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, OnceLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use prost::Message as _;
use serde_json::Value;
use steambot_core::{Whiteboard, WhiteboardWaiter};
use steambot_login::machine_id::MachineFingerprint;
use steambot_login::{machine_id, sentry, LoginConfig, LoginDriver, LoginStatus, LogonOutcome, LogonParams};
use steambot_persistence::{json_path, DataFile, Outcome};
use steambot_protocol::proto::{CMsgClientLogonResponse, CMsgClientUpdateMachineAuth};
use steambot_protocol::{emsg, header};
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::connection::{Connection, Status};
use crate::module::{BoxFuture, Module};

/// Whiteboard slot a UI/auth collaborator fills in once a SteamGuard code
/// has been obtained from the user (spec.md §4.10 step 4's "request a
/// SteamGuard code"). Empty string means "nothing to submit yet".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SteamGuardCode(pub String);

/// Process-global set of accounts flagged as needing a SteamGuard code on
/// their next logon attempt (spec.md §4.10: "the account is flagged,
/// process-global, as requiring SteamGuard").
mod steam_guard {
    use super::*;

    fn registry() -> &'static Mutex<HashSet<String>> {
        static REGISTRY: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
        REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
    }

    pub fn mark_needed(account_name: &str) {
        registry().lock().unwrap().insert(account_name.to_lowercase());
    }

    pub fn needs_code(account_name: &str) -> bool {
        registry().lock().unwrap().contains(&account_name.to_lowercase())
    }

    pub fn clear(account_name: &str) {
        registry().lock().unwrap().remove(&account_name.to_lowercase());
    }
}

enum GuardWait {
    Code(String),
    Disconnected,
    Cancelled,
}

enum PumpOutcome {
    Disconnected,
    Cancelled,
}

/// A per-client login module. Carries only the process-wide cell id at
/// construction time (so it can still sit in the [`crate::module::
/// ModuleRegistry`] as a factory, via `register(move || LoginModule::new
/// (cell_id))`); `init` reads `account_name`/`password`/`MachineFingerprint`
/// out of the client's own `DataFile` once instantiated.
pub struct LoginModule {
    cell_id: u32,
    driver: OnceLock<Mutex<LoginDriver>>,
    fingerprint: OnceLock<MachineFingerprint>,
    sentry: Mutex<Vec<u8>>,
}

impl LoginModule {
    /// `cell_id` is the same value passed to the `ConnectionSupervisor`
    /// (spec.md §6: the CLI's cell id drives both the directory lookup and
    /// the `CMsgClientLogon` the driver builds).
    pub fn new(cell_id: u32) -> Arc<Self> {
        Arc::new(Self {
            cell_id,
            driver: OnceLock::new(),
            fingerprint: OnceLock::new(),
            sentry: Mutex::new(Vec::new()),
        })
    }

    fn driver(&self) -> &Mutex<LoginDriver> {
        self.driver.get().expect("LoginModule::init runs before run")
    }

    fn fingerprint(&self) -> &MachineFingerprint {
        self.fingerprint.get().expect("LoginModule::init runs before run")
    }

    fn load_account_config(&self, client: &Client) {
        let data_file = client.data_file();
        let password = data_file.examine(|root| {
            json_path::get_item(root, &["password"])
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        });
        let driver = LoginDriver::new(LoginConfig {
            account_name: client.account_name().to_string(),
            password,
            cell_id: self.cell_id,
        });
        let _ = self.driver.set(Mutex::new(driver));

        let fingerprint = data_file.examine(|root| {
            let field = |key: &str| {
                json_path::get_item(root, &["MachineFingerprint", key])
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            MachineFingerprint {
                machine_guid: field("machineGuid"),
                mac_address: field("macAddress"),
                disk_id: field("diskId"),
            }
        });
        let _ = self.fingerprint.set(fingerprint);
    }

    fn load_sentry(&self, data_file: &DataFile) {
        let encoded = data_file.examine(|root| {
            json_path::get_item(root, &["SteamGuard", "sentryFile"])
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        if let Some(encoded) = encoded {
            if let Ok(bytes) = BASE64.decode(encoded) {
                *self.sentry.lock().unwrap() = bytes;
            }
        }
    }

    fn store_sentry(&self, data_file: &DataFile, blob: &[u8]) -> Result<(), steambot_persistence::DataFileError> {
        let encoded = BASE64.encode(blob);
        data_file.update(|root| {
            *json_path::create_item(root, &["SteamGuard", "sentryFile"]) = Value::String(encoded.clone());
            Ok(Outcome::Persist(()))
        })
    }

    async fn drive(&self, client: Arc<Client>) {
        let connection = client.connection().clone();
        let whiteboard = client.whiteboard().clone();
        let guard_waiter = whiteboard.create_waiter::<SteamGuardCode>(client.waiter());

        'session: loop {
            if !wait_for_connected(&client, &connection).await {
                return;
            }

            let account_name = client.account_name().to_string();
            let auth_code = if steam_guard::needs_code(&account_name) {
                match wait_for_guard_code(&client, &connection, &guard_waiter).await {
                    GuardWait::Code(code) => Some(code),
                    GuardWait::Disconnected => continue 'session,
                    GuardWait::Cancelled => return,
                }
            } else {
                None
            };

            let sentry_sha1 = {
                let blob = self.sentry.lock().unwrap();
                if blob.is_empty() {
                    None
                } else {
                    Some(sentry::sentry_hash(&blob))
                }
            };
            let local_ipv4 = match connection.local_endpoint() {
                Some(std::net::SocketAddr::V4(addr)) => *addr.ip(),
                _ => Ipv4Addr::UNSPECIFIED,
            };
            let machine_name = hostname::get()
                .ok()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let params = LogonParams {
                local_ipv4,
                sentry_sha1,
                auth_code,
                machine_id: machine_id::build_machine_id(self.fingerprint()),
                machine_name,
            };

            let (logon_header, body) = self.driver().lock().unwrap().build_logon(&params);
            connection.write_packet(header::encode_protobuf(emsg::CLIENT_LOGON, &logon_header, &body.encode_to_vec()));
            debug!(target: "steambot::client", account = %account_name, "sent CMsgClientLogon");

            match self.pump_logon_exchange(&client, &connection, &whiteboard).await {
                PumpOutcome::Disconnected => continue 'session,
                PumpOutcome::Cancelled => return,
            }
        }
    }

    /// Handles inbound packets while connected: the logon response, then
    /// (indefinitely, once logged in) any `CMsgClientUpdateMachineAuth`
    /// sentry exchanges, until the connection drops or the client quits.
    async fn pump_logon_exchange(
        &self,
        client: &Arc<Client>,
        connection: &Arc<Connection>,
        whiteboard: &Arc<Whiteboard>,
    ) -> PumpOutcome {
        loop {
            if connection.peek_status() != Status::Connected {
                self.driver().lock().unwrap().reset();
                whiteboard.set(LoginStatus::LoggedOut);
                return PumpOutcome::Disconnected;
            }

            while let Some(packet) = connection.read_packet() {
                let Ok((msg_type, msg_header, body)) = header::decode_protobuf(&packet) else {
                    continue;
                };
                if msg_type == emsg::CLIENT_LOGON_RESPONSE {
                    let Ok(response) = CMsgClientLogonResponse::decode(body) else {
                        continue;
                    };
                    match self.driver().lock().unwrap().handle_logon_response(&msg_header, &response) {
                        LogonOutcome::Success { session, heartbeat } => {
                            steam_guard::clear(client.account_name());
                            whiteboard.set(LoginStatus::LoggedIn);
                            whiteboard.set(session);
                            whiteboard.set(heartbeat);
                            client.mark_login_started();
                            info!(target: "steambot::client", account = client.account_name(), "logged on");
                        }
                        LogonOutcome::NeedsSteamGuard => {
                            steam_guard::mark_needed(client.account_name());
                            whiteboard.set(LoginStatus::LoggedOut);
                            warn!(target: "steambot::client", account = client.account_name(), "SteamGuard code required, restarting");
                            client.quit(true);
                            return PumpOutcome::Cancelled;
                        }
                        LogonOutcome::Fatal(eresult) => {
                            whiteboard.set(LoginStatus::LoggedOut);
                            error!(target: "steambot::client", account = client.account_name(), eresult, "logon failed fatally");
                            client.quit(false);
                            return PumpOutcome::Cancelled;
                        }
                    }
                } else if msg_type == emsg::CLIENT_UPDATE_MACHINE_AUTH {
                    let Ok(request) = CMsgClientUpdateMachineAuth::decode(body) else {
                        continue;
                    };
                    let (reply_header, reply) = {
                        let mut blob = self.sentry.lock().unwrap();
                        let (reply_header, reply) =
                            self.driver().lock().unwrap().handle_machine_auth(&mut blob, &msg_header, &request);
                        if let Err(err) = self.store_sentry(client.data_file(), &blob) {
                            warn!(target: "steambot::client", %err, "failed to persist sentry file");
                        }
                        (reply_header, reply)
                    };
                    connection.write_packet(header::encode_protobuf(
                        emsg::CLIENT_UPDATE_MACHINE_AUTH_RESPONSE,
                        &reply_header,
                        &reply.encode_to_vec(),
                    ));
                }
            }

            if client.waiter().wait().await.is_err() {
                return PumpOutcome::Cancelled;
            }
        }
    }
}

async fn wait_for_connected(client: &Arc<Client>, connection: &Arc<Connection>) -> bool {
    loop {
        if connection.peek_status() == Status::Connected {
            return true;
        }
        if client.waiter().wait().await.is_err() {
            return false;
        }
    }
}

async fn wait_for_guard_code(
    client: &Arc<Client>,
    connection: &Arc<Connection>,
    guard_waiter: &Arc<WhiteboardWaiter<SteamGuardCode>>,
) -> GuardWait {
    loop {
        if connection.peek_status() != Status::Connected {
            return GuardWait::Disconnected;
        }
        if let Some(code) = guard_waiter.get() {
            if !code.0.is_empty() {
                return GuardWait::Code(code.0);
            }
        }
        if client.waiter().wait().await.is_err() {
            return GuardWait::Cancelled;
        }
    }
}

impl Module for LoginModule {
    fn init(&self, client: &Arc<Client>) {
        client.whiteboard().set(LoginStatus::LoggedOut);
        self.load_account_config(client);
        self.load_sentry(client.data_file());
    }

    fn run(self: Arc<Self>, client: Arc<Client>) -> BoxFuture {
        Box::pin(async move { self.drive(client).await })
    }
}
