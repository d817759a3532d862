//! Item CRUD on an unlocked [`Client`].

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use crate::Client;
use crate::envelope::{self, ItemList};
use crate::error::{Error, Operation};
use crate::item::Item;

impl Client {
    /// Create `item` and return the server's canonical copy (with its id)
    /// when the reply carries one.
    ///
    /// A reply with `success: true` counts as created whatever its payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be encoded, the request fails, or
    /// the server reports failure.
    pub async fn create_item(&self, item: &Item) -> Result<Option<Item>, Error> {
        let body = encode(Operation::Create, item)?;
        let req = self
            .http
            .post(self.url("/object/item"))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let (status, body) = self.send(Operation::Create, req).await?;
        let reply = envelope::decode::<serde_json::Value>(Operation::Create, status, &body)?;
        let created = echoed_item(reply.data);
        info!(
            id = created.as_ref().map_or("", |i| i.id.as_str()),
            name = %item.name,
            "item created"
        );
        Ok(created)
    }

    /// Fetch a single item by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server reports failure
    /// (including an unknown id).
    pub async fn get_item(&self, id: &str) -> Result<Item, Error> {
        let req = self.http.get(self.url(&item_path(id)));
        let (status, body) = self.send(Operation::Get, req).await?;
        envelope::decode_data(Operation::Get, status, &body)
    }

    /// Replace the stored item with `item`, addressed by `item.id`, and return
    /// the server's copy when the reply carries one.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingId` if `item.id` is empty, otherwise an error
    /// if encoding or the request fails or the server reports failure.
    pub async fn update_item(&self, item: &Item) -> Result<Option<Item>, Error> {
        require_id(Operation::Update, item)?;
        let body = encode(Operation::Update, item)?;
        let req = self
            .http
            .put(self.url(&item_path(&item.id)))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let (status, body) = self.send(Operation::Update, req).await?;
        let reply = envelope::decode::<serde_json::Value>(Operation::Update, status, &body)?;
        info!(id = %item.id, "item updated");
        Ok(echoed_item(reply.data))
    }

    /// Delete the item identified by `item.id`.
    ///
    /// The item is sent along as the request body; the server only looks at
    /// the id in the path.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingId` if `item.id` is empty, otherwise an error
    /// if encoding or the request fails or the server reports failure.
    pub async fn delete_item(&self, item: &Item) -> Result<(), Error> {
        require_id(Operation::Delete, item)?;
        let body = encode(Operation::Delete, item)?;
        let req = self
            .http
            .delete(self.url(&item_path(&item.id)))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let (status, body) = self.send(Operation::Delete, req).await?;
        envelope::decode::<serde_json::Value>(Operation::Delete, status, &body)?;
        info!(id = %item.id, "item deleted");
        Ok(())
    }

    /// List items matching `search`. An empty search returns every item.
    ///
    /// The search string is handed to the server as-is; how it matches is
    /// up to `bw`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server reports failure.
    pub async fn list_items(&self, search: &str) -> Result<Vec<Item>, Error> {
        let req = self
            .http
            .get(self.url("/list/object/items"))
            .query(&[("search", search)]);
        let (status, body) = self.send(Operation::List, req).await?;
        let list: ItemList = envelope::decode_data(Operation::List, status, &body)?;
        debug!(search, count = list.data.len(), "items listed");
        Ok(list.data)
    }
}

fn item_path(id: &str) -> String {
    format!("/object/item/{}", urlencoding::encode(id))
}

fn require_id(operation: Operation, item: &Item) -> Result<(), Error> {
    if item.id.is_empty() {
        return Err(Error::MissingId { operation });
    }
    Ok(())
}

/// The item a create or update reply echoes back, if its payload is one.
fn echoed_item(data: Option<serde_json::Value>) -> Option<Item> {
    data.and_then(|value| serde_json::from_value::<Item>(value).ok())
        .filter(|item| !item.id.is_empty())
}

fn encode(operation: Operation, item: &Item) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(item).map_err(|source| Error::Serialize { operation, source })
}
