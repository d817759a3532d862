//! Error types for `bitwarden-api`.
//!
//! Every request-level variant names the [`Operation`] that failed so the
//! message alone tells which call went wrong. Passwords and session tokens are
//! never included in error text.

use std::fmt;
use std::net::SocketAddr;
use std::process::ExitStatus;
use std::time::Duration;

/// The vault API call an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Unlock,
    Lock,
    Status,
    Create,
    Get,
    Update,
    Delete,
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unlock => "unlock",
            Self::Lock => "lock",
            Self::Status => "status",
            Self::Create => "create",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// All errors that can occur when supervising `bw serve` or talking to it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server executable could not be spawned.
    #[error("failed to run '{program} serve': {source}")]
    Launch {
        /// Program that was executed.
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The server did not start listening within the readiness timeout.
    #[error("server did not accept connections on {addrs:?} within {waited:?}")]
    StartupTimeout {
        /// Addresses that were probed.
        addrs: Vec<SocketAddr>,
        /// How long the probe waited.
        waited: Duration,
    },

    /// The server process exited before it became ready.
    #[error("server exited during startup: {status}")]
    ExitedDuringStartup {
        /// Exit status of the child.
        status: ExitStatus,
    },

    /// Waiting on or signalling the child process failed.
    #[error("process supervision error: {0}")]
    Process(#[source] std::io::Error),

    /// Missing or invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Unlocking the vault failed or the server was unreachable.
    #[error("unable to authenticate to vault server: {reason}")]
    Auth {
        /// What went wrong.
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The HTTP request could not be sent or its body could not be read.
    #[error("{operation} request caused an error: {source}")]
    Transport {
        /// Failing operation.
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    /// The request body could not be encoded.
    #[error("failed to encode {operation} request body: {source}")]
    Serialize {
        /// Failing operation.
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    /// The response body was not a valid envelope for this operation.
    #[error("failed to decode {operation} response: {source}")]
    Decode {
        /// Failing operation.
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    /// The server answered with `success: false`.
    #[error("{operation} operation was unsuccessful (HTTP {status}): {message}")]
    OperationFailed {
        /// Failing operation.
        operation: Operation,
        /// HTTP status code of the reply.
        status: u16,
        /// Server-provided message, or a placeholder when absent.
        message: String,
    },

    /// Update and delete address items by id; the item had none.
    #[error("{operation} requires an item with a server-assigned id")]
    MissingId {
        /// Failing operation.
        operation: Operation,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
