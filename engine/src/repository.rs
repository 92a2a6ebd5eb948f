//! Item repository - the client's authoritative list of items.
//!
//! Order is insertion/fetch order and is what the UI renders. The repository
//! never holds two items with the same identifier.

use crate::{error::Result, Error, Item, ItemId};
use serde::{Deserialize, Serialize};

/// In-memory list of items as currently known to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemRepository {
    items: Vec<Item>,
}

impl ItemRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// All items in display order.
    pub fn list(&self) -> &[Item] {
        &self.items
    }

    /// Get an item by identifier.
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Check if an item with this identifier exists.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.position(id).is_some()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the repository holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the whole contents, e.g. after a fetch.
    ///
    /// Later duplicates of an identifier replace earlier ones in place.
    pub fn replace_all(&mut self, items: Vec<Item>) {
        self.items.clear();
        for item in items {
            self.insert_local(item);
        }
    }

    /// Append an item. An item with the same identifier is replaced in place.
    pub fn insert_local(&mut self, item: Item) {
        match self.position(&item.id) {
            Some(index) => self.items[index] = item,
            None => self.items.push(item),
        }
    }

    /// Replace the item with the same identifier in place.
    pub fn apply_local(&mut self, item: Item) -> Result<()> {
        let index = self
            .position(&item.id)
            .ok_or_else(|| Error::StaleReference(item.id.clone()))?;
        self.items[index] = item;
        Ok(())
    }

    /// Remove an item, returning it.
    pub fn remove_local(&mut self, id: &ItemId) -> Result<Item> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::StaleReference(id.clone()))?;
        Ok(self.items.remove(index))
    }

    /// Give the item keyed by `temp_id` the identifier `real_id`.
    ///
    /// Other fields and the item's position are preserved. If an item keyed by
    /// `real_id` is already present (a fetch raced the create), that entry is
    /// dropped so the rekeyed local copy is the only one left. Callers reject
    /// a canonical id handed out twice in one drain before getting here.
    pub fn rekey(&mut self, temp_id: &ItemId, real_id: &ItemId) -> Result<()> {
        let index = self
            .position(temp_id)
            .ok_or_else(|| Error::StaleReference(temp_id.clone()))?;
        self.items[index].id = real_id.clone();

        let duplicate = self
            .items
            .iter()
            .enumerate()
            .position(|(i, item)| i != index && &item.id == real_id);
        if let Some(dup) = duplicate {
            self.items.remove(dup);
        }
        Ok(())
    }

    fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }
}
