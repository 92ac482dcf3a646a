//! The login driver (spec.md §4.10): the state machine that takes a freshly
//! encrypted connection to a logged-in session, including the SteamGuard
//! and sentry-file handshakes. Grounded on `original_source/Sources/Client/
//! Login.cpp`.
//!
//! This crate only knows protocol shapes; it has no connection of its own.
//! The caller (`steambot-client`) feeds it decoded protobuf messages and
//! acts on the [`LogonOutcome`]/reply values it returns — this keeps the
//! state machine itself unit-testable without a real socket.

pub mod eresult;
pub mod machine_id;
pub mod os_type;
pub mod sentry;

use std::net::Ipv4Addr;
use std::time::Duration;

use steambot_protocol::proto::{
    CMsgClientLogon, CMsgClientLogonResponse, CMsgClientUpdateMachineAuth,
    CMsgClientUpdateMachineAuthResponse, CMsgProtoBufHeader,
};
use steambot_protocol::steamid::{instance, AccountType};
use steambot_protocol::universe::UniverseType;
use steambot_protocol::SteamId;

/// The original protocol's "no purpose" IP obfuscation constant (spec §9
/// Open Question b); preserved bit-for-bit.
const IP_OBFUSCATION_XOR: u32 = 0xBAAD_F00D;
const PROTOCOL_VERSION: u32 = 65580;
const CLIENT_PACKAGE_VERSION: u32 = 1771;
const CLIENT_LANGUAGE: &str = "english";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Start,
    SentClientLogon,
    LogonComplete,
    WaitForRestart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    LoggedOut,
    LoggedIn,
}

/// Published on the whiteboard once logon succeeds (spec §4.10 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub steam_id: SteamId,
    pub session_id: i32,
    pub cell_id: u32,
}

/// Published alongside [`SessionInfo`]; drives the heartbeat task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatInterval(pub Duration);

/// Account-level configuration the driver needs across its whole lifetime.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub account_name: String,
    pub password: String,
    pub cell_id: u32,
}

/// Everything [`LoginDriver::build_logon`] needs that isn't fixed
/// per-account configuration: the current sentry hash (if any), a pending
/// SteamGuard code, the machine-id blob, and host identity strings.
#[derive(Debug, Clone, Default)]
pub struct LogonParams {
    pub local_ipv4: Ipv4Addr,
    pub sentry_sha1: Option<[u8; 20]>,
    pub auth_code: Option<String>,
    pub machine_id: Vec<u8>,
    pub machine_name: String,
}

/// Result of feeding a `CMsgClientLogonResponse` to the driver.
#[derive(Debug, Clone)]
pub enum LogonOutcome {
    /// `AccountLogonDenied`/`InvalidLoginAuthCode`: the account needs a
    /// SteamGuard code on the next attempt; the client should restart.
    NeedsSteamGuard,
    /// `OK`: whiteboard state to publish and the new login status.
    Success {
        session: SessionInfo,
        heartbeat: HeartbeatInterval,
    },
    /// Any other `eresult`: spec.md §4.10 treats this as fatal.
    Fatal(i32),
}

/// The login state machine for one account (spec.md §4.10).
pub struct LoginDriver {
    config: LoginConfig,
    state: LoginState,
}

impl LoginDriver {
    pub fn new(config: LoginConfig) -> Self {
        Self {
            config,
            state: LoginState::Start,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Builds the protobuf header + `CMsgClientLogon` body for the initial
    /// logon attempt (spec §4.10 steps 2-3) and transitions to
    /// `SentClientLogon`.
    pub fn build_logon(&mut self, params: &LogonParams) -> (CMsgProtoBufHeader, CMsgClientLogon) {
        // The anonymous SteamID used before a real one is assigned by the
        // server: account id 0, desktop instance, individual type, public
        // universe (spec §4.10 step 2).
        let anon_steam_id = SteamId::new(0, instance::DESKTOP, AccountType::Individual, UniverseType::Public);

        let header = CMsgProtoBufHeader {
            steamid: Some(anon_steam_id.as_u64()),
            ..Default::default()
        };

        let obfuscated_ip = u32::from(params.local_ipv4) ^ IP_OBFUSCATION_XOR;

        let (sha_sentryfile, eresult_sentryfile) = match params.sentry_sha1 {
            Some(hash) => (Some(hash.to_vec()), Some(eresult::OK)),
            None => (None, Some(FILE_NOT_FOUND)),
        };

        let body = CMsgClientLogon {
            account_name: Some(self.config.account_name.clone()),
            password: Some(self.config.password.clone()),
            protocol_version: Some(PROTOCOL_VERSION),
            cell_id: Some(self.config.cell_id),
            client_os_type: Some(os_type::client_os_type() as u32),
            client_language: Some(CLIENT_LANGUAGE.to_string()),
            obfuscated_private_ip: Some(obfuscated_ip),
            client_package_version: Some(CLIENT_PACKAGE_VERSION),
            machine_id: Some(params.machine_id.clone()),
            auth_code: params.auth_code.clone(),
            machine_name: Some(params.machine_name.clone()),
            sha_sentryfile,
            eresult_sentryfile,
            ..Default::default()
        };

        self.state = LoginState::SentClientLogon;
        (header, body)
    }

    /// Handles `CMsgClientLogonResponse` (spec §4.10 step 4).
    pub fn handle_logon_response(
        &mut self,
        header: &CMsgProtoBufHeader,
        body: &CMsgClientLogonResponse,
    ) -> LogonOutcome {
        match body.eresult {
            Some(eresult::ACCOUNT_LOGON_DENIED) | Some(eresult::INVALID_LOGIN_AUTH_CODE) => {
                self.state = LoginState::WaitForRestart;
                LogonOutcome::NeedsSteamGuard
            }
            Some(eresult::OK) => {
                self.state = LoginState::LogonComplete;
                let session = SessionInfo {
                    steam_id: SteamId::from_u64(header.steamid.unwrap_or_default()),
                    session_id: header.client_sessionid.unwrap_or_default(),
                    cell_id: body.cell_id.unwrap_or_default(),
                };
                let heartbeat_secs = body.legacy_out_of_game_heartbeat_seconds.unwrap_or(30).max(1) as u64;
                LogonOutcome::Success {
                    session,
                    heartbeat: HeartbeatInterval(Duration::from_secs(heartbeat_secs)),
                }
            }
            other => LogonOutcome::Fatal(other.unwrap_or(-1)),
        }
    }

    /// Handles `CMsgClientUpdateMachineAuth` (spec §4.10 step 5): patches
    /// `sentry_blob` in place and builds the acknowledgement reply.
    pub fn handle_machine_auth(
        &self,
        sentry_blob: &mut Vec<u8>,
        request_header: &CMsgProtoBufHeader,
        request: &CMsgClientUpdateMachineAuth,
    ) -> (CMsgProtoBufHeader, CMsgClientUpdateMachineAuthResponse) {
        let offset = request.offset.unwrap_or(0) as usize;
        let patch = request.bytes.as_deref().unwrap_or(&[]);
        sentry::apply_patch(sentry_blob, offset, patch);
        let hash = sentry::sentry_hash(sentry_blob);

        let reply_header = CMsgProtoBufHeader {
            jobid_target: request_header.jobid_source,
            ..Default::default()
        };
        let reply = CMsgClientUpdateMachineAuthResponse {
            result: Some(eresult::OK),
            cubwrote: Some(patch.len() as u32),
            filename_str: request.filename.clone(),
            filesize: Some(sentry_blob.len() as u32),
            offset: Some(offset as u32),
            sha_file: Some(hash.to_vec()),
            otp_type: request.otp_type,
            otp_identifier: request.otp_identifier,
            ..Default::default()
        };
        (reply_header, reply)
    }

    /// A connection state change away from `Connected` resets the driver to
    /// `Start` (spec §4.10 "Failure semantics"); the caller republishes
    /// `LoginStatus::LoggedOut`.
    pub fn reset(&mut self) {
        self.state = LoginState::Start;
    }
}

/// `EResult::FileNotFound`, used when no sentry is on file yet.
const FILE_NOT_FOUND: i32 = 9;

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LoginConfig {
        LoginConfig {
            account_name: "bot1".to_string(),
            password: "hunter2".to_string(),
            cell_id: 0,
        }
    }

    #[test]
    fn build_logon_transitions_to_sent_client_logon() {
        let mut driver = LoginDriver::new(config());
        let params = LogonParams::default();
        let (header, body) = driver.build_logon(&params);
        assert_eq!(driver.state(), LoginState::SentClientLogon);
        assert_eq!(body.account_name.as_deref(), Some("bot1"));
        assert!(header.steamid.is_some());
    }

    #[test]
    fn build_logon_without_sentry_reports_file_not_found() {
        let mut driver = LoginDriver::new(config());
        let (_, body) = driver.build_logon(&LogonParams::default());
        assert_eq!(body.eresult_sentryfile, Some(FILE_NOT_FOUND));
        assert!(body.sha_sentryfile.is_none());
    }

    #[test]
    fn build_logon_with_sentry_reports_ok_and_includes_hash() {
        let mut driver = LoginDriver::new(config());
        let params = LogonParams {
            sentry_sha1: Some([7u8; 20]),
            ..Default::default()
        };
        let (_, body) = driver.build_logon(&params);
        assert_eq!(body.eresult_sentryfile, Some(eresult::OK));
        assert_eq!(body.sha_sentryfile.as_deref(), Some(&[7u8; 20][..]));
    }

    #[test]
    fn ip_obfuscation_matches_the_original_constant() {
        let mut driver = LoginDriver::new(config());
        let params = LogonParams {
            local_ipv4: Ipv4Addr::new(10, 0, 0, 1),
            ..Default::default()
        };
        let (_, body) = driver.build_logon(&params);
        let expected = u32::from(Ipv4Addr::new(10, 0, 0, 1)) ^ 0xBAAD_F00D;
        assert_eq!(body.obfuscated_private_ip, Some(expected));
    }

    #[test]
    fn logon_response_ok_publishes_session_and_completes() {
        let mut driver = LoginDriver::new(config());
        driver.build_logon(&LogonParams::default());

        let header = CMsgProtoBufHeader {
            steamid: Some(76561197960287930),
            client_sessionid: Some(5),
            ..Default::default()
        };
        let body = CMsgClientLogonResponse {
            eresult: Some(eresult::OK),
            cell_id: Some(7),
            legacy_out_of_game_heartbeat_seconds: Some(120),
            ..Default::default()
        };

        let outcome = driver.handle_logon_response(&header, &body);
        assert_eq!(driver.state(), LoginState::LogonComplete);
        match outcome {
            LogonOutcome::Success { session, heartbeat } => {
                assert_eq!(session.steam_id.as_u64(), 76561197960287930);
                assert_eq!(session.session_id, 5);
                assert_eq!(session.cell_id, 7);
                assert_eq!(heartbeat.0, Duration::from_secs(120));
            }
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[test]
    fn logon_response_denied_requests_steam_guard_and_waits_for_restart() {
        let mut driver = LoginDriver::new(config());
        driver.build_logon(&LogonParams::default());

        let header = CMsgProtoBufHeader::default();
        let body = CMsgClientLogonResponse {
            eresult: Some(eresult::ACCOUNT_LOGON_DENIED),
            ..Default::default()
        };

        let outcome = driver.handle_logon_response(&header, &body);
        assert_eq!(driver.state(), LoginState::WaitForRestart);
        assert!(matches!(outcome, LogonOutcome::NeedsSteamGuard));
    }

    #[test]
    fn logon_response_other_code_is_fatal() {
        let mut driver = LoginDriver::new(config());
        driver.build_logon(&LogonParams::default());

        let header = CMsgProtoBufHeader::default();
        let body = CMsgClientLogonResponse {
            eresult: Some(5),
            ..Default::default()
        };

        let outcome = driver.handle_logon_response(&header, &body);
        assert!(matches!(outcome, LogonOutcome::Fatal(5)));
    }

    #[test]
    fn machine_auth_patches_blob_and_copies_job_id() {
        let driver = LoginDriver::new(config());
        let mut sentry_blob = Vec::new();

        let request_header = CMsgProtoBufHeader {
            jobid_source: Some(4242),
            ..Default::default()
        };
        let request = CMsgClientUpdateMachineAuth {
            bytes: Some(vec![1, 2, 3, 4]),
            filename: Some("SENTRY".to_string()),
            offset: Some(0),
            ..Default::default()
        };

        let (reply_header, reply) = driver.handle_machine_auth(&mut sentry_blob, &request_header, &request);
        assert_eq!(sentry_blob, vec![1, 2, 3, 4]);
        assert_eq!(reply_header.jobid_target, Some(4242));
        assert_eq!(reply.result, Some(eresult::OK));
        assert_eq!(reply.sha_file, Some(sentry::sentry_hash(&sentry_blob).to_vec()));
    }

    #[test]
    fn reset_returns_to_start() {
        let mut driver = LoginDriver::new(config());
        driver.build_logon(&LogonParams::default());
        assert_ne!(driver.state(), LoginState::Start);
        driver.reset();
        assert_eq!(driver.state(), LoginState::Start);
    }
}
