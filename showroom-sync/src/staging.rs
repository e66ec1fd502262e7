//! Session-scoped staging area for images waiting to be published.
//!
//! A [`PendingImages`] is created per editing session (the daemon owns one)
//! and passed by reference to whatever needs it. Nothing is persisted: when
//! the session ends, unpublished images are gone.

use std::collections::HashMap;

use serde::Serialize;

use crate::SyncError;

/// One staged image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingImage {
    pub name: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl PendingImage {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[derive(Debug, Default)]
pub struct PendingImages {
    entries: HashMap<String, Vec<u8>>,
}

impl PendingImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `content` under `name`, replacing any previous entry.
    pub fn add(&mut self, name: &str, content: Vec<u8>) -> Result<(), SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::Validation("image name is empty".to_string()));
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(SyncError::Validation(format!(
                "image name '{name}' must be a plain file name"
            )));
        }
        if content.is_empty() {
            return Err(SyncError::Validation(format!("image '{name}' is empty")));
        }
        self.entries.insert(name.to_string(), content);
        Ok(())
    }

    /// All pending entries. Sorted by name so output is stable; callers must
    /// not rely on insertion order.
    pub fn list(&self) -> Vec<PendingImage> {
        let mut images: Vec<PendingImage> = self
            .entries
            .iter()
            .map(|(name, content)| PendingImage {
                name: name.clone(),
                content: content.clone(),
            })
            .collect();
        images.sort_by(|a, b| a.name.cmp(&b.name));
        images
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Drop one entry. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_list_has_single_entry() {
        let mut staging = PendingImages::new();
        staging.add("a.png", b"X".to_vec()).unwrap();

        let listed = staging.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a.png");
        assert_eq!(listed[0].content, b"X");
        assert!(staging.has_pending());
    }

    #[test]
    fn add_same_name_overwrites() {
        let mut staging = PendingImages::new();
        staging.add("a.png", b"first".to_vec()).unwrap();
        staging.add("a.png", b"second".to_vec()).unwrap();

        let listed = staging.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, b"second");
    }

    #[test]
    fn clear_empties_the_list() {
        let mut staging = PendingImages::new();
        staging.add("a.png", b"A".to_vec()).unwrap();
        staging.add("b.png", b"B".to_vec()).unwrap();
        staging.clear();
        assert!(staging.list().is_empty());
        assert!(!staging.has_pending());
    }

    #[test]
    fn remove_drops_one_entry() {
        let mut staging = PendingImages::new();
        staging.add("a.png", b"A".to_vec()).unwrap();
        staging.add("b.png", b"B".to_vec()).unwrap();

        assert!(staging.remove("a.png"));
        assert!(!staging.remove("a.png"));
        assert_eq!(staging.len(), 1);
        assert_eq!(staging.get("b.png"), Some(&b"B"[..]));
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let mut staging = PendingImages::new();
        assert!(staging.add("", b"A".to_vec()).is_err());
        assert!(staging.add("a.png", Vec::new()).is_err());
        assert!(staging.add("../a.png", b"A".to_vec()).is_err());
        assert!(staging.is_empty());
    }
}
