//! Sentry blob bookkeeping (spec §4.10 step 5): `CMsgClientUpdateMachineAuth`
//! writes bytes at an offset into the persisted sentry blob, resizing as
//! needed; the reply carries the SHA-1 of the resulting blob.

use sha1::{Digest, Sha1};

/// Writes `patch` into `blob` starting at `offset`, growing `blob` with
/// zero bytes if necessary, per `original_source/Sources/Client/Login.cpp`'s
/// handling of `CMsgClientUpdateMachineAuth`.
pub fn apply_patch(blob: &mut Vec<u8>, offset: usize, patch: &[u8]) {
    let end = offset + patch.len();
    if blob.len() < end {
        blob.resize(end, 0);
    }
    blob[offset..end].copy_from_slice(patch);
}

/// SHA-1 of the full sentry blob, as presented both in the machine-auth
/// reply and in the next logon's `sha_sentryfile` field.
pub fn sentry_hash(blob: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(blob);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_extends_and_overwrites_in_place() {
        let mut blob = vec![1, 2, 3];
        apply_patch(&mut blob, 1, &[9, 9]);
        assert_eq!(blob, vec![1, 9, 9]);

        apply_patch(&mut blob, 5, &[7, 7]);
        assert_eq!(blob, vec![1, 9, 9, 0, 0, 7, 7]);
    }

    #[test]
    fn hash_changes_when_blob_changes() {
        let a = sentry_hash(b"one");
        let b = sentry_hash(b"two");
        assert_ne!(a, b);
    }
}
