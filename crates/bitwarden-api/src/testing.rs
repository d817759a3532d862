//! Shared fixtures for tests that talk to a mocked `bw serve`.

#![allow(clippy::unwrap_used)]

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{Client, ClientConfig, PasswordSource};

pub(crate) const PASSWORD: &str = "hunter2";
pub(crate) const SESSION_KEY: &str = "session-key-123";

pub(crate) fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: server.uri(),
        password: PasswordSource::Explicit(PASSWORD.to_owned()),
        timeout: None,
    }
}

pub(crate) async fn mount_unlock(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/unlock"))
        .and(body_json(serde_json::json!({ "password": PASSWORD })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": {
                "noColor": false,
                "object": "message",
                "title": "Your vault is now unlocked!",
                "raw": SESSION_KEY
            }
        })))
        .mount(server)
        .await;
}

/// Mount `/unlock` and return a connected client.
pub(crate) async fn unlocked_client(server: &MockServer) -> Client {
    mount_unlock(server).await;
    Client::connect(config(server)).await.unwrap()
}
