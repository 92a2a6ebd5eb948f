//! Remote item store access.
//!
//! [`RemoteItemStore`] is the CRUD seam the sync service talks to; it also
//! serves single-item reads for detail views.
//! [`HttpItemStore`] implements it against a JSON `/posts` REST resource.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use swizil_engine::{
    Completion, Item, ItemFields, ItemId, RemoteCall, RemoteOperation, RemoteOperationError,
    UserId,
};

/// CRUD operations against canonical items.
#[async_trait]
pub trait RemoteItemStore: Send + Sync {
    /// List every item.
    async fn fetch_all(&self) -> Result<Vec<Item>>;

    /// Read a single item by canonical identifier.
    async fn fetch_one(&self, id: &ItemId) -> Result<Item>;

    /// Create an item; the returned item carries its canonical identifier.
    async fn create(&self, fields: &ItemFields) -> Result<Item>;

    /// Overwrite an item.
    async fn update(&self, item: &Item) -> Result<Item>;

    /// Delete an item by canonical identifier.
    async fn delete(&self, id: &ItemId) -> Result<()>;
}

/// Issue one drain call and translate the outcome for the engine.
pub async fn perform(store: &dyn RemoteItemStore, call: &RemoteCall) -> Completion {
    let outcome = match call {
        RemoteCall::Create { fields, .. } => store
            .create(fields)
            .await
            .map(|item| Completion::Created { item }),
        RemoteCall::Update { item } => store
            .update(item)
            .await
            .map(|item| Completion::Updated { item }),
        RemoteCall::Delete { id } => store.delete(id).await.map(|()| Completion::Deleted),
    };

    outcome.unwrap_or_else(|err| call.failed(err.to_string()).into())
}

/// Fetch the full list and translate the outcome for the engine.
pub async fn fetch(store: &dyn RemoteItemStore) -> Completion {
    match store.fetch_all().await {
        Ok(items) => Completion::Fetched { items },
        Err(err) => RemoteOperationError::new(RemoteOperation::Fetch, err.to_string()).into(),
    }
}

/// Identifier as sent by the backend: usually numeric.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    fn into_item_id(self) -> Result<ItemId> {
        match self {
            WireId::Number(n) => Ok(ItemId::canonical(n.to_string())),
            WireId::Text(s) => Ok(ItemId::parse(&s)?),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItem {
    id: Option<WireId>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    user_id: UserId,
}

impl WireItem {
    /// Convert, falling back to `id` when the backend omits one.
    fn into_item(self, fallback: Option<&ItemId>) -> Result<Item> {
        let id = match (self.id, fallback) {
            (Some(id), _) => id.into_item_id()?,
            (None, Some(id)) => id.clone(),
            (None, None) => {
                return Err(ClientError::UnexpectedResponse(
                    "item without id".to_string(),
                ))
            }
        };
        Ok(Item::new(
            id,
            ItemFields::new(self.title, self.body, self.user_id),
        ))
    }
}

/// Outgoing item body. Canonical numeric ids are sent as numbers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<serde_json::Value>,
    title: &'a str,
    body: &'a str,
    user_id: UserId,
}

fn wire_id(id: &ItemId) -> serde_json::Value {
    let raw = id.to_string();
    match raw.parse::<i64>() {
        Ok(n) => serde_json::Value::from(n),
        Err(_) => serde_json::Value::from(raw),
    }
}

/// REST item store over HTTP.
#[derive(Debug, Clone)]
pub struct HttpItemStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpItemStore {
    /// Create a store rooted at `base_url`, e.g. `https://host` for `https://host/posts`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/posts", self.base_url)
    }

    fn item_url(&self, id: &ItemId) -> Result<String> {
        if id.is_temporary() {
            return Err(ClientError::UnexpectedResponse(format!(
                "temporary id {id} cannot address a remote item"
            )));
        }
        Ok(format!("{}/posts/{}", self.base_url, id))
    }
}

#[async_trait]
impl RemoteItemStore for HttpItemStore {
    async fn fetch_all(&self) -> Result<Vec<Item>> {
        let items: Vec<WireItem> = self
            .client
            .get(self.collection_url())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(count = items.len(), "fetched items");
        items.into_iter().map(|item| item.into_item(None)).collect()
    }

    async fn fetch_one(&self, id: &ItemId) -> Result<Item> {
        let item: WireItem = self
            .client
            .get(self.item_url(id)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        item.into_item(Some(id))
    }

    async fn create(&self, fields: &ItemFields) -> Result<Item> {
        let body = WireBody {
            id: None,
            title: &fields.title,
            body: &fields.body,
            user_id: fields.user_id,
        };
        let created: WireItem = self
            .client
            .post(self.collection_url())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let item = created.into_item(None)?;
        tracing::debug!(id = %item.id, "remote create succeeded");
        Ok(item)
    }

    async fn update(&self, item: &Item) -> Result<Item> {
        let body = WireBody {
            id: Some(wire_id(&item.id)),
            title: &item.title,
            body: &item.body,
            user_id: item.user_id,
        };
        let updated: WireItem = self
            .client
            .put(self.item_url(&item.id)?)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        updated.into_item(Some(&item.id))
    }

    async fn delete(&self, id: &ItemId) -> Result<()> {
        self.client
            .delete(self.item_url(id)?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
