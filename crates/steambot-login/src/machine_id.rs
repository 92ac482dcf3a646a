//! Builds the `machineId` KeyValue blob embedded in `CMsgClientLogon` (spec
//! §4.10 step 2): `{ BB3: sha1(hex(machineGuid)), FF2: sha1(hex(macAddr)),
//! 3B3: sha1(hex(diskId)) }`. Collecting the three underlying identifiers
//! is machine-fingerprinting, explicitly out of scope (spec.md §1); this
//! module only encodes whatever values the caller already collected.

use sha1::{Digest, Sha1};
use steambot_protocol::keyvalue::{binary, Node};

/// The three raw identifiers a fingerprinting collaborator is expected to
/// supply. Each is hex-encoded and SHA-1 hashed before being embedded.
#[derive(Debug, Clone, Default)]
pub struct MachineFingerprint {
    pub machine_guid: String,
    pub mac_address: String,
    pub disk_id: String,
}

fn hash_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(hex::encode(input.as_bytes()));
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Serializes `fingerprint` into the binary KeyValue blob Steam expects for
/// `CMsgClientLogon::machine_id`.
pub fn build_machine_id(fingerprint: &MachineFingerprint) -> Vec<u8> {
    let mut node = Node::new();
    node.set_string("BB3", hash_hex(&fingerprint.machine_guid));
    node.set_string("FF2", hash_hex(&fingerprint.mac_address));
    node.set_string("3B3", hash_hex(&fingerprint.disk_id));
    binary::serialize("MessageObject", &node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_non_empty_blob() {
        let fingerprint = MachineFingerprint {
            machine_guid: "11111111-2222-3333-4444-555555555555".to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
            disk_id: "disk-serial-0".to_string(),
        };
        let blob = build_machine_id(&fingerprint);
        assert!(!blob.is_empty());
    }

    #[test]
    fn is_deterministic_for_the_same_input() {
        let fingerprint = MachineFingerprint {
            machine_guid: "abc".to_string(),
            mac_address: "def".to_string(),
            disk_id: "ghi".to_string(),
        };
        assert_eq!(build_machine_id(&fingerprint), build_machine_id(&fingerprint));
    }

    #[test]
    fn differs_when_any_field_changes() {
        let mut fingerprint = MachineFingerprint {
            machine_guid: "abc".to_string(),
            mac_address: "def".to_string(),
            disk_id: "ghi".to_string(),
        };
        let original = build_machine_id(&fingerprint);
        fingerprint.disk_id = "other".to_string();
        assert_ne!(build_machine_id(&fingerprint), original);
    }
}
