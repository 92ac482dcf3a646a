//! `SteamID`: a 64-bit bitfield identifying accounts, groups, and game
//! servers on the Steam network (spec §3), grounded on
//! `original_source/Headers/SteamID.hpp` ("this 64-bit structure is used for
//! identifying various objects on the Steam network").
//!
//! Bit layout, low to high: accountId (32 bits) | accountInstance (20 bits) |
//! accountType (4 bits) | universe (8 bits).

use crate::universe::UniverseType;

const ACCOUNT_ID_SHIFT: u32 = 0;
const ACCOUNT_ID_BITS: u32 = 32;
const ACCOUNT_INSTANCE_SHIFT: u32 = 32;
const ACCOUNT_INSTANCE_BITS: u32 = 20;
const ACCOUNT_TYPE_SHIFT: u32 = 52;
const ACCOUNT_TYPE_BITS: u32 = 4;
const UNIVERSE_SHIFT: u32 = 56;
const UNIVERSE_BITS: u32 = 8;

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Well-known account instance values (SteamKit2's `EAccountInstanceFlags`
/// plus the ordinary desktop/console/web split).
pub mod instance {
    pub const ALL: u32 = 0;
    pub const DESKTOP: u32 = 1;
    pub const CONSOLE: u32 = 2;
    pub const WEB: u32 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccountType {
    Invalid = 0,
    Individual = 1,
    Multiseat = 2,
    GameServer = 3,
    AnonGameServer = 4,
    Pending = 5,
    ContentServer = 6,
    Clan = 7,
    Chat = 8,
    ConsoleUser = 9,
    AnonUser = 10,
}

impl AccountType {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Self::Invalid,
            1 => Self::Individual,
            2 => Self::Multiseat,
            3 => Self::GameServer,
            4 => Self::AnonGameServer,
            5 => Self::Pending,
            6 => Self::ContentServer,
            7 => Self::Clan,
            8 => Self::Chat,
            9 => Self::ConsoleUser,
            10 => Self::AnonUser,
            _ => Self::Invalid,
        }
    }
}

/// A Steam account/object identifier. Cheap to copy; stored as a plain
/// `u64` on the wire and in JSON (see `steambot-persistence`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SteamId(u64);

impl SteamId {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn new(
        account_id: u32,
        account_instance: u32,
        account_type: AccountType,
        universe: UniverseType,
    ) -> Self {
        let mut value = 0u64;
        value |= (account_id as u64 & mask(ACCOUNT_ID_BITS)) << ACCOUNT_ID_SHIFT;
        value |= (account_instance as u64 & mask(ACCOUNT_INSTANCE_BITS)) << ACCOUNT_INSTANCE_SHIFT;
        value |= ((account_type as u64) & mask(ACCOUNT_TYPE_BITS)) << ACCOUNT_TYPE_SHIFT;
        value |= ((universe as u64) & mask(UNIVERSE_BITS)) << UNIVERSE_SHIFT;
        Self(value)
    }

    pub fn account_id(self) -> u32 {
        ((self.0 >> ACCOUNT_ID_SHIFT) & mask(ACCOUNT_ID_BITS)) as u32
    }

    pub fn account_instance(self) -> u32 {
        ((self.0 >> ACCOUNT_INSTANCE_SHIFT) & mask(ACCOUNT_INSTANCE_BITS)) as u32
    }

    pub fn account_type(self) -> AccountType {
        AccountType::from_bits((self.0 >> ACCOUNT_TYPE_SHIFT) & mask(ACCOUNT_TYPE_BITS))
    }

    pub fn universe(self) -> UniverseType {
        UniverseType::from_bits((self.0 >> UNIVERSE_SHIFT) & mask(UNIVERSE_BITS))
    }
}

impl std::fmt::Display for SteamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_field() {
        let id = SteamId::new(12345, instance::DESKTOP, AccountType::Individual, UniverseType::Public);
        assert_eq!(id.account_id(), 12345);
        assert_eq!(id.account_instance(), instance::DESKTOP);
        assert_eq!(id.account_type(), AccountType::Individual);
        assert_eq!(id.universe(), UniverseType::Public);
    }

    #[test]
    fn fields_do_not_overlap() {
        let id = SteamId::new(u32::MAX, 0xF_FFFF, AccountType::Clan, UniverseType::Dev);
        assert_eq!(id.account_id(), u32::MAX);
        assert_eq!(id.account_instance(), 0xF_FFFF);
        assert_eq!(id.account_type(), AccountType::Clan);
        assert_eq!(id.universe(), UniverseType::Dev);
    }
}
