//! Collection store abstraction and its HTTP implementation.
//!
//! The pipeline keeps one collection per presentation. Implementations
//! only move documents and metadata around; what goes into a collection
//! is decided by the retrieval layer on top.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::errors::PipelineError;

pub mod client;

#[cfg(test)]
pub(crate) mod testing;

pub use client::HttpCollectionStore;

/// Abstract trait for document collection backends.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Check that the store service is up.
    async fn health(&self) -> Result<(), PipelineError>;

    /// Whether a collection with this name exists.
    async fn exists(&self, name: &str) -> Result<bool, PipelineError>;

    /// Create a collection with the given metadata.
    ///
    /// If a collection with this name already exists it is deleted
    /// first, so a successful create always yields an empty collection.
    async fn create_collection(&self, name: &str, metadata: Value) -> Result<(), PipelineError>;

    /// Drop a collection and everything in it.
    async fn delete_collection(&self, name: &str) -> Result<(), PipelineError>;

    /// Add documents with parallel metadata and id lists.
    ///
    /// Metadata values must be flat JSON scalars; the backing store
    /// rejects nested structures.
    async fn add_documents(
        &self,
        name: &str,
        documents: &[String],
        metadatas: &[Value],
        ids: &[String],
    ) -> Result<(), PipelineError>;

    /// Similarity query returning the raw result payload.
    async fn query(
        &self,
        name: &str,
        query_texts: &[String],
        n_results: u32,
        include: &[&str],
    ) -> Result<Value, PipelineError>;

    /// Fetch every record in the collection.
    async fn get_all(&self, name: &str, include: &[&str]) -> Result<Value, PipelineError>;
}
