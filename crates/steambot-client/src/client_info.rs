//! `ClientInfo`: the process-global handle for one account (spec.md §3).
//! Created by scanning the working directory for `Account-<name>.json`
//! files, or on demand; never destroyed while the process lives, matching
//! the account registry in `original_source/Sources/Client/ClientInfo.cpp`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use steambot_persistence::{DataFile, DataFileError, DataFileFlavor};

use crate::client::Client;

const ACCOUNT_PREFIX: &str = "Account-";
const ACCOUNT_SUFFIX: &str = ".json";

/// Process-global handle for one account. Outlives any `Client` launched
/// against it; `client()` is `None` whenever the account isn't currently
/// running (spec.md §3).
pub struct ClientInfo {
    account_name: String,
    data_file: Arc<DataFile>,
    active: AtomicBool,
    client: Mutex<Option<Arc<Client>>>,
}

impl ClientInfo {
    fn new(account_name: String, data_file: Arc<DataFile>) -> Arc<Self> {
        Arc::new(Self {
            account_name,
            data_file,
            active: AtomicBool::new(false),
            client: Mutex::new(None),
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn data_file(&self) -> &Arc<DataFile> {
        &self.data_file
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn client(&self) -> Option<Arc<Client>> {
        self.client.lock().unwrap().clone()
    }

    pub(crate) fn set_active(&self, client: Option<Arc<Client>>) {
        self.active.store(client.is_some(), Ordering::SeqCst);
        *self.client.lock().unwrap() = client;
    }
}

/// Process-wide registry of [`ClientInfo`]s, keyed case-insensitively by
/// account name (spec.md §3/§5: "A process-wide mutex guards the
/// ClientInfo registry").
pub struct ClientInfoRegistry {
    base_dir: std::path::PathBuf,
    entries: Mutex<HashMap<String, Arc<ClientInfo>>>,
}

impl ClientInfoRegistry {
    /// Scans `base_dir` for `Account-<name>.json` files and registers one
    /// `ClientInfo` per match (spec.md §3).
    pub fn scan(base_dir: &Path) -> Result<Self, DataFileError> {
        let registry = Self {
            base_dir: base_dir.to_path_buf(),
            entries: Mutex::new(HashMap::new()),
        };

        let read_dir = match std::fs::read_dir(base_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(registry),
            Err(err) => {
                return Err(DataFileError::Read {
                    path: base_dir.to_path_buf(),
                    source: err,
                })
            }
        };

        for entry in read_dir.flatten() {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(account_name) = parse_account_file_name(&file_name) {
                registry.get_or_create(&account_name)?;
            }
        }
        Ok(registry)
    }

    /// Looks up an existing `ClientInfo` by account name, case-insensitive.
    pub fn find(&self, account_name: &str) -> Option<Arc<ClientInfo>> {
        self.entries.lock().unwrap().get(&account_name.to_lowercase()).cloned()
    }

    /// Returns the `ClientInfo` for `account_name`, creating (and loading
    /// its `DataFile`) if it doesn't exist yet.
    pub fn get_or_create(&self, account_name: &str) -> Result<Arc<ClientInfo>, DataFileError> {
        let key = account_name.to_lowercase();
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(&key) {
            return Ok(existing.clone());
        }
        let data_file = DataFile::get(&self.base_dir, account_name, DataFileFlavor::Account)?;
        let info = ClientInfo::new(account_name.to_string(), data_file);
        entries.insert(key, info.clone());
        Ok(info)
    }

    pub fn all(&self) -> Vec<Arc<ClientInfo>> {
        self.entries.lock().unwrap().values().cloned().collect()
    }
}

fn parse_account_file_name(file_name: &str) -> Option<String> {
    file_name
        .strip_prefix(ACCOUNT_PREFIX)?
        .strip_suffix(ACCOUNT_SUFFIX)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_file_names() {
        assert_eq!(parse_account_file_name("Account-bot1.json"), Some("bot1".to_string()));
        assert_eq!(parse_account_file_name("AppInfo.json"), None);
        assert_eq!(parse_account_file_name("Account-bot1.txt"), None);
    }

    #[test]
    fn scan_discovers_account_files_and_find_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Account-Bot1.json"), "{}").unwrap();
        std::fs::write(dir.path().join("AppInfo.json"), "{}").unwrap();

        let registry = ClientInfoRegistry::scan(dir.path()).unwrap();
        assert_eq!(registry.all().len(), 1);
        assert!(registry.find("bot1").is_some());
        assert!(registry.find("BOT1").is_some());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClientInfoRegistry::scan(dir.path()).unwrap();
        let first = registry.get_or_create("newbot").unwrap();
        let second = registry.get_or_create("newbot").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn scan_of_missing_directory_is_empty_not_an_error() {
        let registry = ClientInfoRegistry::scan(Path::new("/nonexistent/path/for/steambot-tests")).unwrap();
        assert!(registry.all().is_empty());
    }
}
