//! In-memory [`DocumentSource`] for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use sync_core::Record;

use crate::source::DocumentSource;

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Record>,
    unavailable: bool,
}

/// A single collection held in memory, read in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDocumentSource {
    collection: Mutex<Collection>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = Record>) -> Self {
        let source = Self::new();
        source.lock().documents.extend(documents);
        source
    }

    fn lock(&self) -> MutexGuard<'_, Collection> {
        self.collection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the document with the same `identity_field` value, or append.
    ///
    /// Documents without that field are always appended.
    pub fn put(&self, identity_field: &str, document: Record) {
        let mut collection = self.lock();
        let key = document.identity(identity_field);
        match collection
            .documents
            .iter_mut()
            .find(|existing| key.is_some() && existing.identity(identity_field) == key)
        {
            Some(existing) => *existing = document,
            None => collection.documents.push(document),
        }
    }

    /// Make reads fail.
    pub fn make_unavailable(&self) {
        self.lock().unavailable = true;
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let collection = self.lock();
        if collection.unavailable {
            return Err(anyhow!("server selection timeout"));
        }
        Ok(collection.documents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_replaces_by_identity() {
        let source = MemoryDocumentSource::new();
        source.put("Uid", Record::new().with("Uid", "u1").with("state", "Lagos"));
        source.put("Uid", Record::new().with("state", "Kano"));
        source.put("Uid", Record::new().with("Uid", "u1").with("state", "Abuja"));

        let documents = source.fetch_all().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].get("state").and_then(|v| v.as_str()), Some("Abuja"));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let source = MemoryDocumentSource::with_documents([Record::new().with("Uid", "u1")]);
        source.make_unavailable();
        assert!(source.fetch_all().await.is_err());
    }
}
