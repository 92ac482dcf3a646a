//! On-wire formats for talking to a Steam CM server: frame headers (spec
//! §3/§4.5), the KeyValue binary/text codec, `SteamID`/`Universe` bitfields,
//! and the small protobuf catalog needed to drive login.

pub mod emsg;
pub mod header;
pub mod keyvalue;
pub mod steamid;
pub mod universe;

pub mod proto {
    //! Generated protobuf types. Field numbers are reconstructed from the
    //! field names login (§4.10) and the protobuf header (§6) describe; no
    //! `.proto` source was available in the retrieved material to verify
    //! them against Valve's actual wire format.
    #![allow(clippy::all)]
    include!(concat!(env!("OUT_DIR"), "/steambot.rs"));
}

pub use header::{Header, HeaderError};
pub use steamid::{AccountType, SteamId};
pub use universe::{Universe, UniverseError, UniverseType};
