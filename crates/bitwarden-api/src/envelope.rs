//! The `{success, data}` wrapper present on every `bw serve` reply.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Operation};
use crate::item::Item;

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `GET /list/object/items`.
#[derive(Debug, Deserialize)]
pub(crate) struct ItemList {
    #[serde(default)]
    pub data: Vec<Item>,
}

/// Payload of `POST /unlock`.
#[derive(Debug, Deserialize)]
pub(crate) struct UnlockData {
    #[serde(default)]
    pub raw: Option<String>,
}

/// Decode a response body and enforce `success`.
///
/// The body is decoded before the status code is looked at: the server
/// reports failures as `success: false` with a message, usually alongside a
/// 4xx status.
pub(crate) fn decode<T: DeserializeOwned>(
    operation: Operation,
    status: u16,
    body: &str,
) -> Result<Envelope<T>, Error> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|source| Error::Decode { operation, source })?;

    if !envelope.success {
        return Err(Error::OperationFailed {
            operation,
            status,
            message: envelope
                .message
                .clone()
                .unwrap_or_else(|| "no message from server".to_owned()),
        });
    }

    Ok(envelope)
}

/// Like [`decode`], but the payload must be present.
pub(crate) fn decode_data<T: DeserializeOwned>(
    operation: Operation,
    status: u16,
    body: &str,
) -> Result<T, Error> {
    decode::<T>(operation, status, body)?
        .data
        .ok_or_else(|| Error::OperationFailed {
            operation,
            status,
            message: "response carried no data".to_owned(),
        })
}
