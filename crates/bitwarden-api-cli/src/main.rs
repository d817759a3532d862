//! `bwapi`: command-line front end for `bitwarden-api`.
//!
//! Either supervises a local `bw serve` (`bwapi serve`) or unlocks an already
//! running one and performs a single item operation against it.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::{ExitCode, ExitStatus};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bitwarden_api::{
    Client, ClientConfig, DEFAULT_BASE_URL, Item, ItemType, LEGACY_STARTUP_DELAY, Login, LoginUri,
    PasswordSource, Readiness, ServeConfig, ServeProcess,
};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";

// ── CLI structure ────────────────────────────────────────────────────

/// bwapi: manage Bitwarden vault items through a local `bw serve`.
#[derive(Parser)]
#[command(
    name = "bwapi",
    version,
    about = "bwapi — manage Bitwarden vault items through a local `bw serve`",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         BW_SERVE_URL  Server address (default: {DEFAULT_BASE_URL})\n  \
         BW_PASSWORD   Master password used to unlock the vault\n  \
         BWAPI_LOG     Log filter (default: warn)\n\n\
         {DIM}Examples:{RESET}\n  \
         bwapi serve\n  \
         bwapi list --search github\n  \
         bwapi create --name github --username octo --login-password hunter2\n  \
         bwapi delete 0b8a2c55-4f4b-4a6e-9a0e-b1a100000001"
    ),
)]
struct Cli {
    /// Base URL of the running `bw serve`.
    #[arg(long, env = "BW_SERVE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    addr: String,

    /// Master password used to unlock the vault.
    #[arg(long, env = "BW_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Per-request timeout in seconds (default: no timeout).
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run `bw serve` until Ctrl-C, then kill it.
    Serve {
        /// Executable providing the `serve` subcommand.
        #[arg(long, default_value = "bw")]
        program: String,
        /// Interface to bind.
        #[arg(long, default_value = "localhost")]
        hostname: String,
        /// Port to listen on.
        #[arg(long, default_value_t = 8087)]
        port: u16,
        /// Give up if the port is not accepting connections after this long.
        #[arg(long, default_value_t = 10)]
        startup_timeout_secs: u64,
        /// Sleep a fixed 2s instead of probing the port.
        #[arg(long)]
        fixed_wait: bool,
    },
    /// Show login and lock status of the CLI behind the server.
    Status,
    /// List items, optionally filtered by a search string.
    List {
        /// Search string passed to the server (empty lists everything).
        #[arg(long, short, default_value = "")]
        search: String,
        /// Print full items as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show a single item as JSON.
    Get {
        /// Item id.
        id: String,
    },
    /// Create a login item.
    Create {
        /// Item name.
        #[arg(long)]
        name: String,
        /// Login username.
        #[arg(long)]
        username: Option<String>,
        /// Login password.
        #[arg(long)]
        login_password: Option<String>,
        /// URI the login applies to (repeatable).
        #[arg(long)]
        uri: Vec<String>,
        /// Free-form notes.
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change fields of an existing item.
    Edit {
        /// Item id.
        id: String,
        /// New name.
        #[arg(long)]
        name: Option<String>,
        /// New login username.
        #[arg(long)]
        username: Option<String>,
        /// New login password.
        #[arg(long)]
        login_password: Option<String>,
        /// New notes.
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete an item.
    Delete {
        /// Item id.
        id: String,
    },
    /// Lock the vault.
    Lock,
}

// ── Pretty output helpers ────────────────────────────────────────────

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to format JSON")?;
    println!("{text}");
    Ok(())
}

fn print_item_line(item: &Item) {
    println!(
        "  {CYAN}├─{RESET} {BOLD}{}{RESET} {DIM}{} {}{RESET}",
        item.name,
        item.id,
        item.username().unwrap_or("-"),
    );
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BWAPI_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{BOLD}✗ Error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let session = SessionArgs {
        addr: cli.addr,
        password: cli.password,
        timeout_secs: cli.timeout_secs,
    };

    match cli.command {
        Commands::Serve {
            program,
            hostname,
            port,
            startup_timeout_secs,
            fixed_wait,
        } => {
            let readiness = if fixed_wait {
                Readiness::Fixed(LEGACY_STARTUP_DELAY)
            } else {
                Readiness::Probe {
                    timeout: Duration::from_secs(startup_timeout_secs),
                    interval: Duration::from_millis(100),
                }
            };
            cmd_serve(ServeConfig {
                program,
                program_args: Vec::new(),
                hostname,
                port,
                readiness,
            })
            .await
        }
        Commands::Status => cmd_status(&session.connect().await?).await,
        Commands::List { search, json } => {
            cmd_list(&session.connect().await?, &search, json).await
        }
        Commands::Get { id } => cmd_get(&session.connect().await?, &id).await,
        Commands::Create {
            name,
            username,
            login_password,
            uri,
            notes,
        } => {
            let item = Item {
                item_type: ItemType::Login,
                name,
                notes,
                login: Some(Login {
                    username,
                    password: login_password,
                    uris: uri
                        .into_iter()
                        .map(|uri| LoginUri {
                            uri,
                            ..LoginUri::default()
                        })
                        .collect(),
                    ..Login::default()
                }),
                ..Item::default()
            };
            cmd_create(&session.connect().await?, &item).await
        }
        Commands::Edit {
            id,
            name,
            username,
            login_password,
            notes,
        } => {
            let changes = ItemChanges {
                name,
                username,
                password: login_password,
                notes,
            };
            if changes.is_empty() {
                bail!(
                    "nothing to change, pass at least one of --name, --username, --login-password, --notes"
                );
            }
            cmd_edit(&session.connect().await?, &id, changes).await
        }
        Commands::Delete { id } => cmd_delete(&session.connect().await?, &id).await,
        Commands::Lock => cmd_lock(&session.connect().await?).await,
    }
}

/// Global flags needed to open a session.
struct SessionArgs {
    addr: String,
    password: Option<String>,
    timeout_secs: Option<u64>,
}

impl SessionArgs {
    async fn connect(self) -> Result<Client> {
        let config = ClientConfig {
            base_url: self.addr.clone(),
            password: self
                .password
                .map_or_else(PasswordSource::default, PasswordSource::Explicit),
            timeout: self.timeout_secs.map(Duration::from_secs),
        };
        Client::connect(config)
            .await
            .with_context(|| format!("cannot open a session on {}", self.addr))
    }
}

/// Fields `edit` may overwrite. `None` leaves the stored value alone.
struct ItemChanges {
    name: Option<String>,
    username: Option<String>,
    password: Option<String>,
    notes: Option<String>,
}

impl ItemChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.notes.is_none()
    }

    fn apply(self, item: &mut Item) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(username) = self.username {
            item.login_mut().username = Some(username);
        }
        if let Some(password) = self.password {
            item.login_mut().password = Some(password);
        }
        if self.notes.is_some() {
            item.notes = self.notes;
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────

async fn cmd_serve(config: ServeConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = ServeProcess::start(&config, shutdown_rx)
        .await
        .with_context(|| format!("failed to start {}", config.program))?;

    let pid = server
        .pid()
        .map_or_else(|| "unknown".to_owned(), |p| p.to_string());
    success(&format!("bw serve listening on {} (pid {pid})", server.base_url()));
    println!("  {DIM}Press Ctrl-C to stop.{RESET}");

    let requested = shutdown_tx.subscribe();
    tokio::spawn(shutdown_signal(shutdown_tx));

    let status = server.wait().await.context("lost track of bw serve")?;
    serve_outcome(status, *requested.borrow())?;
    success("bw serve stopped");
    Ok(())
}

/// A kill only counts as a clean stop when we asked for it.
fn serve_outcome(status: ExitStatus, shutdown_requested: bool) -> Result<()> {
    if status.success() || (shutdown_requested && status.code().is_none()) {
        return Ok(());
    }
    bail!("bw serve exited with {status}");
}

async fn cmd_status(client: &Client) -> Result<()> {
    let status = client.status().await?;
    println!("  {DIM}{:<12}{RESET} {}", "Status", status.status);
    println!(
        "  {DIM}{:<12}{RESET} {}",
        "Server",
        status.server_url.as_deref().unwrap_or("-")
    );
    println!(
        "  {DIM}{:<12}{RESET} {}",
        "User",
        status.user_email.as_deref().unwrap_or("-")
    );
    println!(
        "  {DIM}{:<12}{RESET} {}",
        "Last sync",
        status.last_sync.as_deref().unwrap_or("-")
    );
    Ok(())
}

async fn cmd_list(client: &Client, search: &str, json: bool) -> Result<()> {
    let items = client.list_items(search).await?;
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("  {DIM}(no items){RESET}");
    }
    for item in &items {
        print_item_line(item);
    }
    Ok(())
}

async fn cmd_get(client: &Client, id: &str) -> Result<()> {
    let item = client.get_item(id).await?;
    print_json(&item)
}

async fn cmd_create(client: &Client, item: &Item) -> Result<()> {
    match client.create_item(item).await? {
        Some(created) => success(&format!("created {} ({})", created.name, created.id)),
        None => success(&format!("created {}", item.name)),
    }
    Ok(())
}

async fn cmd_edit(client: &Client, id: &str, changes: ItemChanges) -> Result<()> {
    let mut item = client.get_item(id).await?;
    changes.apply(&mut item);
    client.update_item(&item).await?;
    success(&format!("updated {} ({id})", item.name));
    Ok(())
}

async fn cmd_delete(client: &Client, id: &str) -> Result<()> {
    let item = client.get_item(id).await?;
    client.delete_item(&item).await?;
    success(&format!("deleted {} ({id})", item.name));
    Ok(())
}

async fn cmd_lock(client: &Client) -> Result<()> {
    client.lock().await?;
    success("vault locked");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = fired_or_pending(tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = fired_or_pending(async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        sig.recv().await;
        Ok::<(), std::io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping bw serve");
    let _ = shutdown_tx.send(true);
}

/// Resolve when `signal` fires. A handler that cannot be installed never
/// fires.
async fn fired_or_pending(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!(error = %e, "cannot listen for signal");
        std::future::pending::<()>().await;
    }
}
