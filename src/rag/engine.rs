//! Retrieval engine: one disposable vector collection per presentation.
//!
//! Builds the collection from the chunk model (one document per slide,
//! chunk metadata flattened to scalar keys), pulls context back out by
//! slide number or at random, and fronts the generative backend for
//! prompt calls so downstream describers need a single handle.

use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::errors::PipelineError;
use crate::deck::model::{ChunkBody, Presentation, Slide};
use crate::llm::{normalize_for_upload, GenerativeBackend};
use crate::store::CollectionStore;

const INCLUDE_DOCUMENTS: &[&str] = &["documents", "metadatas"];
const INCLUDE_WITH_EMBEDDINGS: &[&str] = &["documents", "metadatas", "embeddings"];

/// Bounded random draws when sampling for an image-bearing slide.
const MAX_IMAGE_DRAWS: usize = 10;

/// One slide-level record pulled back out of the collection.
#[derive(Debug, Clone)]
pub struct SlideRecord {
    pub id: String,
    pub document: String,
    pub metadata: Value,
}

/// Retrieval engine over a collection store and a generative backend.
///
/// Constructed once per run and passed by reference; holds no state of
/// its own beyond the two client handles.
pub struct RagEngine<'a> {
    store: &'a dyn CollectionStore,
    backend: &'a dyn GenerativeBackend,
}

impl<'a> RagEngine<'a> {
    pub fn new(store: &'a dyn CollectionStore, backend: &'a dyn GenerativeBackend) -> Self {
        Self { store, backend }
    }

    /// Build a fresh collection from the presentation, one document per
    /// slide, and return its generated id.
    ///
    /// Fails with `EmptyKnowledgeBase` when no slide contributes any
    /// text at all.
    pub async fn create_collection(
        &self,
        presentation: &Presentation,
    ) -> Result<String, PipelineError> {
        let mut documents = Vec::new();
        let mut metadatas = Vec::new();
        let mut ids = Vec::new();

        for slide in &presentation.slides {
            documents.push(slide.document_text());
            metadatas.push(slide_metadata(slide));
            ids.push(Uuid::new_v4().to_string());
        }

        if documents.iter().all(|d| d.trim().is_empty()) {
            return Err(PipelineError::EmptyKnowledgeBase);
        }

        let collection_id = new_collection_id();
        self.store
            .create_collection(
                &collection_id,
                json!({
                    "description": "PowerPoint presentation collection",
                    "type": "presentation",
                }),
            )
            .await?;
        self.store
            .add_documents(&collection_id, &documents, &metadatas, &ids)
            .await?;
        info!(
            "built collection {} with {} slide documents",
            collection_id,
            documents.len()
        );
        Ok(collection_id)
    }

    /// Drop the collection, reporting success as a flag.
    ///
    /// Callers about to rebuild must treat `false` as fatal rather than
    /// create over a stale collection.
    pub async fn remove_collection(&self, collection_id: &str) -> bool {
        match self.store.delete_collection(collection_id).await {
            Ok(()) => {
                info!("removed collection {collection_id}");
                true
            }
            Err(e) => {
                warn!("failed to remove collection {collection_id}: {e}");
                false
            }
        }
    }

    /// Nearest-neighbor lookup, returning the raw result payload.
    pub async fn query_collection(
        &self,
        query_text: &str,
        collection_id: &str,
        n_results: u32,
    ) -> Result<Value, PipelineError> {
        self.store
            .query(
                collection_id,
                &[query_text.to_string()],
                n_results,
                INCLUDE_WITH_EMBEDDINGS,
            )
            .await
    }

    /// Pick one slide record uniformly at random.
    pub async fn get_random_slide_context(
        &self,
        collection_id: &str,
    ) -> Result<SlideRecord, PipelineError> {
        let data = self.store.get_all(collection_id, INCLUDE_DOCUMENTS).await?;
        let count = data["ids"].as_array().map(|a| a.len()).unwrap_or(0);
        if count == 0 {
            return Err(PipelineError::EmptyCollection(collection_id.to_string()));
        }
        let idx = rand::rng().random_range(0..count);
        Ok(record_at(&data, idx))
    }

    /// Best-effort sampler for a slide that carries at least one image
    /// item. Draws with replacement up to a fixed cap and returns `None`
    /// when nothing image-bearing turns up.
    pub async fn get_random_slide_with_image(
        &self,
        collection_id: &str,
    ) -> Result<Option<SlideRecord>, PipelineError> {
        let data = self.store.get_all(collection_id, INCLUDE_DOCUMENTS).await?;
        let count = data["documents"].as_array().map(|a| a.len()).unwrap_or(0);
        if count == 0 {
            debug!("no documents in collection {collection_id}");
            return Ok(None);
        }

        for _ in 0..MAX_IMAGE_DRAWS {
            let idx = rand::rng().random_range(0..count);
            if has_image_item(&data["metadatas"][idx]) {
                return Ok(Some(record_at(&data, idx)));
            }
        }
        debug!("no image-bearing slide drawn from {collection_id} after {MAX_IMAGE_DRAWS} tries");
        Ok(None)
    }

    /// Linear scan for the record whose slide-level number matches.
    pub async fn get_context_from_slide_number(
        &self,
        slide_number: u32,
        collection_id: &str,
    ) -> Result<SlideRecord, PipelineError> {
        let data = self.store.get_all(collection_id, INCLUDE_DOCUMENTS).await?;
        let empty = Vec::new();
        let metadatas = data["metadatas"].as_array().unwrap_or(&empty);
        for (idx, metadata) in metadatas.iter().enumerate() {
            if metadata["slide_number"].as_u64() == Some(u64::from(slide_number)) {
                return Ok(record_at(&data, idx));
            }
        }
        Err(PipelineError::SlideNotFound(slide_number))
    }

    /// Plain text completion through the backend's retry policy.
    pub async fn prompt(
        &self,
        text: &str,
        max_output_tokens: u32,
    ) -> Result<String, PipelineError> {
        self.backend.complete(text, max_output_tokens).await
    }

    /// Image-conditioned completion. The image is flattened to an opaque
    /// bitmap first; undecodable bytes go through with their declared
    /// format.
    pub async fn prompt_with_image(
        &self,
        prompt: &str,
        image_bytes: &[u8],
        extension: &str,
        max_output_tokens: u32,
    ) -> Result<String, PipelineError> {
        let payload = normalize_for_upload(image_bytes, extension);
        self.backend
            .complete_with_image(prompt, &payload, max_output_tokens)
            .await
    }
}

fn new_collection_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ppt_collection_{}", &hex[..8])
}

/// Flatten a slide's chunks into the scalar-only metadata record the
/// store accepts: `item_{n}_*` keys per chunk plus slide-level fields.
fn slide_metadata(slide: &Slide) -> Value {
    let mut metadata = Map::new();
    let mut item_num = 0usize;
    for chunk in slide.chunks.iter().filter(|c| !c.is_deleted()) {
        item_num += 1;
        metadata.insert(
            format!("item_{item_num}_type"),
            Value::from(chunk.type_label()),
        );
        metadata.insert(
            format!("item_{item_num}_slide_number"),
            Value::from(chunk.slide_number),
        );
        metadata.insert(
            format!("item_{item_num}_order_number"),
            Value::from(chunk.order_number),
        );
        if let ChunkBody::Image { bytes, extension } = &chunk.body {
            metadata.insert(
                format!("item_{item_num}_image_extension"),
                Value::from(extension.as_str()),
            );
            metadata.insert(format!("item_{item_num}_has_image"), Value::from(true));
            metadata.insert(
                format!("item_{item_num}_image_size"),
                Value::from(bytes.len()),
            );
        }
    }
    metadata.insert("slide_number".to_string(), Value::from(slide.slide_number));
    metadata.insert("slide_id".to_string(), Value::from(slide.id.to_string()));
    Value::Object(metadata)
}

fn record_at(data: &Value, idx: usize) -> SlideRecord {
    SlideRecord {
        id: data["ids"][idx].as_str().unwrap_or_default().to_string(),
        document: coerce_document(&data["documents"][idx]),
        metadata: data["metadatas"][idx].clone(),
    }
}

/// Transports sometimes hand documents back as arrays or non-string
/// values. Always reduce to a plain string.
fn coerce_document(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| p.to_string())
            })
            .collect(),
        other => other.to_string(),
    }
}

fn has_image_item(metadata: &Value) -> bool {
    metadata
        .as_object()
        .map(|m| m.iter().any(|(k, v)| k.ends_with("_type") && v == "image"))
        .unwrap_or(false)
}
