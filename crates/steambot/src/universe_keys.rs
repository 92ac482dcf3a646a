//! Loads the operator-supplied universe public keys (spec.md §4.2/§6) from
//! `UniverseKeys.json` in the working directory and installs them into
//! [`steambot_protocol::universe::Universe`] before any connection is
//! attempted.
//!
//! The keys are deployment data — see `steambot-protocol`'s `universe`
//! module doc comment for why this crate refuses to compile in defaults.

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use steambot_protocol::universe::{Universe, UniverseType};
use thiserror::Error;

const FILE_NAME: &str = "UniverseKeys.json";

#[derive(Debug, Error)]
pub enum UniverseKeysError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("UniverseKeys.json has an unknown universe name {0:?}")]
    UnknownUniverse(String),
    #[error("invalid base64 for universe {universe:?}: {source}")]
    Base64 {
        universe: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error(transparent)]
    Install(#[from] steambot_protocol::universe::UniverseError),
}

#[derive(Debug, Deserialize)]
struct KeysFile {
    #[serde(flatten)]
    keys: HashMap<String, String>,
}

fn parse_universe_name(name: &str) -> Option<UniverseType> {
    match name {
        "Public" => Some(UniverseType::Public),
        "Beta" => Some(UniverseType::Beta),
        "Internal" => Some(UniverseType::Internal),
        "Dev" => Some(UniverseType::Dev),
        _ => None,
    }
}

/// Reads `<data_dir>/UniverseKeys.json` (`{"Public": "<base64 DER>", ...}`)
/// and installs every entry. Returns `Ok(0)` without error if the file is
/// absent — a deployment may run the directory resolver and UI without ever
/// dialing a CM server.
pub fn load(data_dir: &Path) -> Result<usize, UniverseKeysError> {
    let path = data_dir.join(FILE_NAME);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => return Err(UniverseKeysError::Read { path, source }),
    };

    let file: KeysFile = serde_json::from_str(&text).map_err(|source| UniverseKeysError::Parse {
        path: path.clone(),
        source,
    })?;

    let mut installed = 0;
    for (name, encoded) in file.keys {
        let universe_type = parse_universe_name(&name).ok_or(UniverseKeysError::UnknownUniverse(name.clone()))?;
        let der = BASE64.decode(&encoded).map_err(|source| UniverseKeysError::Base64 {
            universe: name,
            source,
        })?;
        Universe::install(universe_type, der)?;
        installed += 1;
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(dir.path()).unwrap(), 0);
    }

    #[test]
    fn rejects_unknown_universe_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_NAME), r#"{"Nonsense": "AAAA"}"#).unwrap();
        assert!(matches!(load(dir.path()), Err(UniverseKeysError::UnknownUniverse(_))));
    }

    #[test]
    fn installs_well_formed_key() {
        let dir = tempfile::tempdir().unwrap();
        let der = BASE64.encode([7u8; 160]);
        std::fs::write(dir.path().join(FILE_NAME), format!(r#"{{"Internal": "{der}"}}"#)).unwrap();
        assert_eq!(load(dir.path()).unwrap(), 1);
        let universe = Universe::get(UniverseType::Internal).unwrap();
        assert_eq!(universe.public_key, vec![7u8; 160]);
    }
}
