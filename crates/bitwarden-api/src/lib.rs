//! Client for the Bitwarden CLI's local REST API (`bw serve`).
//!
//! Two halves:
//!
//! - [`ServeProcess`] starts `bw serve` as a child process, waits until it
//!   accepts connections, and kills it when a shutdown signal fires.
//! - [`Client`] unlocks the vault and performs item CRUD over HTTP/JSON,
//!   checking the `{success, data}` envelope on every reply.
//!
//! # Example
//!
//! ```rust,no_run
//! use bitwarden_api::{Client, ClientConfig, Item, ServeConfig, ServeProcess};
//!
//! # async fn example() -> Result<(), bitwarden_api::Error> {
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let server = ServeProcess::start(&ServeConfig::default(), shutdown_rx).await?;
//!
//! let client = Client::connect(ClientConfig {
//!     base_url: server.base_url(),
//!     ..ClientConfig::default()
//! })
//! .await?;
//!
//! client.create_item(&Item::login("example", "hello", "world")).await?;
//! for item in client.list_items("example").await? {
//!     client.delete_item(&item).await?;
//! }
//!
//! let _ = shutdown_tx.send(true);
//! server.wait().await?;
//! # Ok(())
//! # }
//! ```

mod envelope;
mod error;
mod item;
mod items;
mod session;
mod supervisor;
#[cfg(test)]
mod testing;

pub use error::{Error, Operation};
pub use item::{Field, FieldType, Item, ItemType, Login, LoginUri, Reprompt, UriMatch};
pub use session::ServerStatus;
pub use supervisor::{LEGACY_STARTUP_DELAY, ProcessState, Readiness, ServeConfig, ServeProcess};

use std::fmt;
use std::time::Duration;

/// Address `bw serve` listens on when started with default settings.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8087";
/// Environment variable holding the master password by default.
pub const PASSWORD_ENV: &str = "BW_PASSWORD";

/// Where the master password used to unlock the vault comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordSource {
    /// Use this password.
    Explicit(String),
    /// Read the password from the named environment variable at connect time.
    Env(String),
}

impl Default for PasswordSource {
    fn default() -> Self {
        Self::Env(PASSWORD_ENV.to_owned())
    }
}

impl fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(_) => f.write_str("Explicit(<redacted>)"),
            Self::Env(var) => f.debug_tuple("Env").field(var).finish(),
        }
    }
}

/// Configuration for [`Client::connect`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the running `bw serve`. Default: `http://localhost:8087`.
    pub base_url: String,
    /// Master password source. Default: the `BW_PASSWORD` environment variable.
    pub password: PasswordSource,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            password: PasswordSource::default(),
            timeout: None,
        }
    }
}

/// An unlocked session against a running `bw serve`.
///
/// Cloning is cheap and clones share the underlying connection pool.
#[derive(Clone)]
pub struct Client {
    base_url: String,
    session_token: String,
    http: reqwest::Client,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("session_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}
