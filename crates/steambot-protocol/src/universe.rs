//! Steam "universes" (spec §4.2/GLOSSARY), grounded on
//! `original_source/Headers/Universe.hpp`: "There seem to be different
//! 'instances' of Steam, called 'universes'". Each universe selects a
//! DER-encoded `SubjectPublicKeyInfo` RSA public key used to wrap the
//! session key during the encryption handshake.
//!
//! The actual key bytes are deployment data, not something this crate
//! fabricates: [`install`] lets the binary crate load them (e.g. from an
//! embedded asset or a config file) before the first connection attempt.
//! See DESIGN.md for why these aren't compiled-in constants.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum UniverseType {
    Invalid = 0,
    Public = 1,
    Beta = 2,
    Internal = 3,
    Dev = 4,
}

impl UniverseType {
    pub(crate) fn from_bits(bits: u64) -> Self {
        match bits {
            1 => Self::Public,
            2 => Self::Beta,
            3 => Self::Internal,
            4 => Self::Dev,
            _ => Self::Invalid,
        }
    }

    /// Decodes the `u32 universe` field of `ChannelEncryptRequest` (spec
    /// §4.2), same mapping as the `SteamId` universe bitfield.
    pub fn from_wire(value: u32) -> Self {
        Self::from_bits(value as u64)
    }

    fn slot(self) -> usize {
        self as u32 as usize
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    #[error("no public key configured for universe {0:?}")]
    NotConfigured(UniverseType),
    #[error("public key must be exactly 160 bytes, got {0}")]
    WrongKeyLength(usize),
}

#[derive(Debug, Clone)]
pub struct Universe {
    pub universe_type: UniverseType,
    pub public_key: Vec<u8>,
}

const SLOT_COUNT: usize = 5;
fn registry() -> &'static [OnceLock<Universe>; SLOT_COUNT] {
    static REGISTRY: [OnceLock<Universe>; SLOT_COUNT] = [
        OnceLock::new(),
        OnceLock::new(),
        OnceLock::new(),
        OnceLock::new(),
        OnceLock::new(),
    ];
    &REGISTRY
}

impl Universe {
    /// Registers the public key for a universe. Idempotent if called again
    /// with identical bytes; panics if called twice with different bytes for
    /// the same universe, since that would indicate a configuration bug, not
    /// a recoverable runtime condition.
    pub fn install(universe_type: UniverseType, public_key_der: Vec<u8>) -> Result<(), UniverseError> {
        if public_key_der.len() != 160 {
            return Err(UniverseError::WrongKeyLength(public_key_der.len()));
        }
        let slot = &registry()[universe_type.slot()];
        let universe = Universe {
            universe_type,
            public_key: public_key_der,
        };
        match slot.set(universe) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                let installed = slot.get().expect("slot just failed to set, so it's occupied");
                assert_eq!(
                    installed.public_key, rejected.public_key,
                    "universe {universe_type:?} registered twice with different keys"
                );
                Ok(())
            }
        }
    }

    pub fn get(universe_type: UniverseType) -> Result<&'static Universe, UniverseError> {
        registry()[universe_type.slot()]
            .get()
            .ok_or(UniverseError::NotConfigured(universe_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_keys() {
        let result = Universe::install(UniverseType::Beta, vec![0u8; 10]);
        assert!(matches!(result, Err(UniverseError::WrongKeyLength(10))));
    }

    #[test]
    fn get_without_install_reports_not_configured() {
        let result = Universe::get(UniverseType::Internal);
        assert!(matches!(result, Err(UniverseError::NotConfigured(_))));
    }

    #[test]
    fn install_then_get_round_trips() {
        let key = vec![7u8; 160];
        Universe::install(UniverseType::Dev, key.clone()).unwrap();
        let universe = Universe::get(UniverseType::Dev).unwrap();
        assert_eq!(universe.public_key, key);
    }
}
