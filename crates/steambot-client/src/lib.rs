//! The client runtime (spec.md §3/§4.4/§4.9/§4.10/§4.12/§4.13): the account
//! registry, the per-account `Client` and its lifecycle, the connection
//! supervisor, the module host, the shared I/O thread, and the login
//! module built on top of `steambot-login`.

pub mod client;
pub mod client_info;
pub mod connection;
pub mod io_thread;
pub mod login_module;
pub mod module;

pub use client::{Client, ClientSupervisor, QuitMode};
pub use client_info::{ClientInfo, ClientInfoRegistry};
pub use connection::{Connection, ConnectionSupervisor, Status as ConnectionStatus};
pub use io_thread::{IoThread, IoThreadError};
pub use login_module::{LoginModule, SteamGuardCode};
pub use module::{BoxFuture, Module, ModuleHost, ModuleRegistry};
