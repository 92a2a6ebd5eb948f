//! Item types.

use crate::{ItemId, UserId};
use serde::{Deserialize, Serialize};

/// The editable fields of an item; the payload of a remote create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFields {
    pub title: String,
    pub body: String,
    pub user_id: UserId,
}

impl ItemFields {
    pub fn new(title: impl Into<String>, body: impl Into<String>, user_id: UserId) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            user_id,
        }
    }
}

/// An item as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Canonical or temporary identifier
    pub id: ItemId,
    pub title: String,
    pub body: String,
    /// Owner of the item
    pub user_id: UserId,
}

impl Item {
    /// Create an item from an identifier and its fields.
    pub fn new(id: ItemId, fields: ItemFields) -> Self {
        Self {
            id,
            title: fields.title,
            body: fields.body,
            user_id: fields.user_id,
        }
    }

    /// Copy of the item without its identifier.
    pub fn fields(&self) -> ItemFields {
        ItemFields {
            title: self.title.clone(),
            body: self.body.clone(),
            user_id: self.user_id,
        }
    }

    /// Overwrite the editable fields, keeping the identifier.
    pub fn set_fields(&mut self, fields: ItemFields) {
        self.title = fields.title;
        self.body = fields.body;
        self.user_id = fields.user_id;
    }

    /// Same item under a different identifier.
    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = id;
        self
    }
}
