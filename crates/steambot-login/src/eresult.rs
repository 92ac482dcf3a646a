//! The handful of `EResult` codes the login driver branches on (spec
//! §4.10/§7). These are Valve's public result codes (documented across
//! every third-party Steam client library), not something this crate
//! invents.

pub const OK: i32 = 1;
pub const ACCOUNT_LOGON_DENIED: i32 = 65;
pub const INVALID_LOGIN_AUTH_CODE: i32 = 66;
