//! Process entry point (spec.md §6 "Process interface"): resolves and
//! enters the working directory, wires up the shared I/O thread, directory
//! resolver, connection supervisor, and login module, launches the selected
//! accounts, then waits for an orderly shutdown.

mod universe_keys;
mod working_dir;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use steambot_client::{ClientInfoRegistry, ClientSupervisor, ConnectionSupervisor, IoThread, LoginModule, ModuleRegistry};
use steambot_directory::Directory;
use tracing_subscriber::EnvFilter;

/// Headless multi-account Steam client runtime.
#[derive(Debug, Parser)]
#[command(name = "steambot", about = "Headless multi-account Steam client runtime")]
struct Args {
    /// Working directory to run out of. Defaults to
    /// `~/.Christians-Steam-Framework/` (`%LOCALAPPDATA%\Christian-Stieber\
    /// Steam-Framework\` on Windows).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Account to launch; repeatable. Defaults to every `Account-<name>.json`
    /// found in the data directory.
    #[arg(long = "account")]
    accounts: Vec<String>,

    /// Cell id to pass to the directory resolver and the CM logon.
    #[arg(long, default_value_t = 0)]
    cell_id: u32,

    /// `tracing-subscriber` `EnvFilter` directive, e.g. `steambot=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = match args.data_dir.clone() {
        Some(dir) => dir,
        None => working_dir::default_data_dir()?,
    };
    working_dir::enter(&data_dir)?;
    init_tracing(&args.log_level);

    match universe_keys::load(&data_dir) {
        Ok(count) => tracing::info!(target: "steambot", count, "installed universe public keys"),
        Err(err) => tracing::warn!(target: "steambot", %err, "no usable UniverseKeys.json; CM logons will fail until one is installed"),
    }

    let registry = ClientInfoRegistry::scan(&data_dir)?;
    let selected = if args.accounts.is_empty() {
        registry.all()
    } else {
        args.accounts
            .iter()
            .map(|name| registry.get_or_create(name))
            .collect::<Result<Vec<_>, _>>()?
    };
    if selected.is_empty() {
        tracing::warn!(target: "steambot", dir = %data_dir.display(), "no accounts found to launch");
    }

    let io = IoThread::new()?;
    let directory = Arc::new(Directory::new());
    let connection_supervisor = ConnectionSupervisor::new(io.clone(), directory, args.cell_id);
    let cell_id = args.cell_id;
    let modules = Arc::new(ModuleRegistry::new().register(move || LoginModule::new(cell_id)));
    let supervisor = Arc::new(ClientSupervisor::new());

    for client_info in selected {
        tracing::info!(target: "steambot", account = client_info.account_name(), "launching");
        supervisor.launch(client_info, connection_supervisor.clone(), modules.clone());
    }

    run_until_shutdown(supervisor).await;
    Ok(())
}

/// Waits for SIGINT/SIGTERM (Ctrl+C on Windows), then quits every client and
/// blocks until they've all torn down (spec.md §4.12/§4.13). A second signal
/// received while waiting for teardown forces an immediate exit, matching
/// spec.md §6's "second signal forces immediate exit".
async fn run_until_shutdown(supervisor: Arc<ClientSupervisor>) {
    wait_for_signal().await;
    tracing::info!(target: "steambot", "shutdown requested, quitting all clients");
    supervisor.quit_all(false);

    let teardown = {
        let supervisor = supervisor.clone();
        tokio::task::spawn_blocking(move || supervisor.wait_all())
    };

    tokio::select! {
        _ = teardown => {
            tracing::info!(target: "steambot", "all clients torn down, exiting");
        }
        _ = wait_for_signal() => {
            tracing::warn!(target: "steambot", "second shutdown signal received, forcing exit");
            std::process::exit(1);
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
