//! Bookmarked items.

use chrono::{DateTime, Utc};

use crate::types::{EnrichedItem, Favorite, FavoriteError};

/// Favorites in insertion order, unique by item id.
#[derive(Debug, Default, Clone)]
pub struct FavoriteBook {
    entries: Vec<Favorite>,
}

impl FavoriteBook {
    /// Build from persisted entries. Later duplicates of an id are dropped.
    pub fn from_entries(entries: Vec<Favorite>) -> Self {
        let mut book = Self::default();
        for entry in entries {
            if !book.contains(entry.item.id()) {
                book.entries.push(entry);
            }
        }
        book
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|f| f.item.id() == id)
    }

    pub fn add(&mut self, mut item: EnrichedItem, now: DateTime<Utc>) -> Result<Favorite, FavoriteError> {
        if self.contains(item.id()) {
            return Err(FavoriteError::AlreadyExists(item.id().to_string()));
        }
        item.is_favorite = true;
        let favorite = Favorite { item, saved_at: now };
        self.entries.push(favorite.clone());
        Ok(favorite)
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|f| f.item.id() != id);
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[Favorite] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
