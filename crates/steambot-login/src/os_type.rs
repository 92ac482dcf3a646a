//! `clientOSType` values for `CMsgClientLogon` (spec §4.10: "clientOSType
//! from host"). These are Valve's public `EOSType` enum values (widely
//! documented by SteamKit2 and other reimplementations), not anything
//! specific to this crate; we map only the handful of hosts this runtime
//! realistically runs on and fall back to "unknown" for everything else.

/// `EOSType::WinUnknown`.
const WIN_UNKNOWN: i32 = -1;
/// `EOSType::MacOSUnknown`.
const MAC_UNKNOWN: i32 = -102;
/// `EOSType::LinuxUnknown`.
const LINUX_UNKNOWN: i32 = -203;

/// Picks the `EOSType` value for the host this process is running on.
pub fn client_os_type() -> i32 {
    if cfg!(target_os = "windows") {
        WIN_UNKNOWN
    } else if cfg!(target_os = "macos") {
        MAC_UNKNOWN
    } else if cfg!(target_os = "linux") {
        LINUX_UNKNOWN
    } else {
        WIN_UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_a_negative_eos_type() {
        assert!(client_os_type() < 0);
    }
}
