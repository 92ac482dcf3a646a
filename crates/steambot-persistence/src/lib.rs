//! JSON persistence for the client runtime (spec.md §3/§4.11): the
//! `DataFile`/`CacheFile` abstractions, JSON path helpers, and the Settings
//! subsystem built on top of them.

pub mod cache_file;
pub mod datafile;
pub mod json_path;
pub mod settings;

pub use cache_file::CacheFile;
pub use datafile::{DataFile, DataFileError, DataFileFlavor, Outcome};
pub use settings::{SettingDescriptor, SettingKind, SettingValue, SettingsError, SettingsRegistry};
