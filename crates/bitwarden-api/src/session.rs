//! Unlocking the vault and session-level calls.

use reqwest::RequestBuilder;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, info};

use crate::envelope::{self, UnlockData};
use crate::error::{Error, Operation};
use crate::{Client, ClientConfig, DEFAULT_BASE_URL, PasswordSource};

/// What `GET /status` reports about the running CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Bitwarden server the CLI is logged in to, if any.
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// `unauthenticated`, `locked` or `unlocked`.
    #[serde(default)]
    pub status: String,
}

#[derive(Deserialize)]
struct StatusData {
    template: ServerStatus,
}

impl PasswordSource {
    fn resolve(&self) -> Result<String, Error> {
        let password = match self {
            Self::Explicit(password) => password.clone(),
            Self::Env(var) => std::env::var(var).unwrap_or_default(),
        };
        if password.is_empty() {
            return Err(Error::Config(match self {
                Self::Explicit(_) => "empty master password in client config".to_owned(),
                Self::Env(var) => format!("master password not set in {var}"),
            }));
        }
        Ok(password)
    }
}

impl Client {
    /// Unlock the vault and return a session bound to `config.base_url`.
    ///
    /// The password is resolved before anything touches the network.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if no password is available.
    /// - `Error::Auth` if the server is unreachable or refuses the password.
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        let password = config.password.resolve()?;

        let base_url = if config.base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            config.base_url.as_str()
        }
        .trim_end_matches('/')
        .to_owned();

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("bitwarden-api/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(Error::HttpClient)?;

        let body = serde_json::json!({ "password": password });
        let resp = http
            .post(format!("{base_url}/unlock"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Auth {
                reason: format!("unlock request to {base_url} failed"),
                source: Some(e),
            })?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| Error::Auth {
            reason: "failed to read unlock response".to_owned(),
            source: Some(e),
        })?;

        let data: UnlockData =
            envelope::decode_data(Operation::Unlock, status, &text).map_err(|e| Error::Auth {
                reason: e.to_string(),
                source: None,
            })?;
        let session_token = data
            .raw
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| Error::Auth {
                reason: "unlock response carried no session token".to_owned(),
                source: None,
            })?;

        info!(base_url = %base_url, "vault unlocked");

        Ok(Self {
            base_url,
            session_token,
            http,
        })
    }

    /// Base URL this session talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Session key returned by unlock.
    ///
    /// `bw serve` authorizes requests by its own unlocked state, so the key
    /// is not attached to requests. It is what other `bw` invocations expect
    /// in `BW_SESSION`.
    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Lock the vault. Item calls fail until the vault is unlocked again.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server reports failure.
    pub async fn lock(&self) -> Result<(), Error> {
        let req = self
            .http
            .post(self.url("/lock"))
            .header(CONTENT_TYPE, "application/json");
        let (status, body) = self.send(Operation::Lock, req).await?;
        envelope::decode::<serde_json::Value>(Operation::Lock, status, &body)?;
        info!("vault locked");
        Ok(())
    }

    /// Query the CLI's login and lock status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server reports failure.
    pub async fn status(&self) -> Result<ServerStatus, Error> {
        let req = self.http.get(self.url("/status"));
        let (status, body) = self.send(Operation::Status, req).await?;
        let data: StatusData = envelope::decode_data(Operation::Status, status, &body)?;
        Ok(data.template)
    }

    // --- Private ---

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and return the status code and raw body.
    pub(crate) async fn send(
        &self,
        operation: Operation,
        req: RequestBuilder,
    ) -> Result<(u16, String), Error> {
        let resp = req
            .send()
            .await
            .map_err(|source| Error::Transport { operation, source })?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|source| Error::Transport { operation, source })?;
        debug!(%operation, status, bytes = body.len(), "vault API responded");
        Ok((status, body))
    }
}
