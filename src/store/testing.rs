//! In-memory store double for retrieval and pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::errors::PipelineError;
use crate::store::CollectionStore;

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeCollection {
    pub metadata: Value,
    pub documents: Vec<String>,
    pub metadatas: Vec<Value>,
    pub ids: Vec<String>,
}

/// Records every call and keeps collections in memory.
#[derive(Default)]
pub(crate) struct FakeStore {
    pub collections: Mutex<HashMap<String, FakeCollection>>,
    pub ops: Mutex<Vec<String>>,
    pub fail_delete: bool,
    pub fail_health: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, name: &str, documents: Vec<String>, metadatas: Vec<Value>) {
        let ids = (0..documents.len()).map(|i| format!("id-{i}")).collect();
        self.collections.lock().unwrap().insert(
            name.to_string(),
            FakeCollection {
                metadata: json!({}),
                documents,
                metadatas,
                ids,
            },
        );
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn collection(&self, name: &str) -> Option<FakeCollection> {
        self.collections.lock().unwrap().get(name).cloned()
    }

    fn log(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl CollectionStore for FakeStore {
    async fn health(&self) -> Result<(), PipelineError> {
        self.log("health".to_string());
        if self.fail_health {
            return Err(PipelineError::store_unavailable("health check failed"));
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, PipelineError> {
        self.log(format!("exists {name}"));
        Ok(self.collections.lock().unwrap().contains_key(name))
    }

    async fn create_collection(&self, name: &str, metadata: Value) -> Result<(), PipelineError> {
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(name) {
            self.log(format!("delete {name}"));
        }
        self.log(format!("create {name}"));
        collections.insert(
            name.to_string(),
            FakeCollection {
                metadata,
                ..FakeCollection::default()
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), PipelineError> {
        self.log(format!("delete {name}"));
        if self.fail_delete {
            return Err(PipelineError::store_request("deletion rejected"));
        }
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn add_documents(
        &self,
        name: &str,
        documents: &[String],
        metadatas: &[Value],
        ids: &[String],
    ) -> Result<(), PipelineError> {
        self.log(format!("add {name} x{}", documents.len()));
        let mut collections = self.collections.lock().unwrap();
        let collection = collections.get_mut(name).ok_or_else(|| {
            PipelineError::store_request(format!("collection '{name}' not found"))
        })?;
        collection.documents.extend_from_slice(documents);
        collection.metadatas.extend_from_slice(metadatas);
        collection.ids.extend_from_slice(ids);
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        _query_texts: &[String],
        n_results: u32,
        _include: &[&str],
    ) -> Result<Value, PipelineError> {
        self.log(format!("query {name} n={n_results}"));
        let collections = self.collections.lock().unwrap();
        let collection = collections.get(name).ok_or_else(|| {
            PipelineError::store_request(format!("collection '{name}' not found"))
        })?;
        let take = n_results as usize;
        let documents: Vec<_> = collection.documents.iter().take(take).cloned().collect();
        let metadatas: Vec<_> = collection.metadatas.iter().take(take).cloned().collect();
        let ids: Vec<_> = collection.ids.iter().take(take).cloned().collect();
        Ok(json!({
            "ids": [ids],
            "documents": [documents],
            "metadatas": [metadatas],
            "embeddings": null,
        }))
    }

    async fn get_all(&self, name: &str, _include: &[&str]) -> Result<Value, PipelineError> {
        self.log(format!("get {name}"));
        let collections = self.collections.lock().unwrap();
        let collection = collections.get(name).ok_or_else(|| {
            PipelineError::store_request(format!("collection '{name}' not found"))
        })?;
        Ok(json!({
            "ids": collection.ids,
            "documents": collection.documents,
            "metadatas": collection.metadatas,
            "embeddings": null,
        }))
    }
}
