//! End-to-end processing of one presentation.
//!
//! A run parses the document, indexes it, fills in image descriptions,
//! then rebuilds both the collection and the document. The collection is
//! built twice on purpose: the first build indexes the deck as uploaded
//! so image prompts can borrow the surrounding slide text, the second
//! replaces it once descriptions exist so notes prompts and later
//! queries see the enriched documents. A delete that fails between the
//! two builds aborts the run rather than creating over a stale
//! collection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::errors::PipelineError;
use crate::deck::model::{ChunkBody, Presentation, SkippedShape};
use crate::deck::{parse_presentation, rebuild_presentation};
use crate::llm::GenerativeBackend;
use crate::rag::describer::{compose_alt_text, describe_image};
use crate::rag::engine::RagEngine;
use crate::store::CollectionStore;

/// Cooperative cancellation handle, checked between chunks and slides.
/// Clone it out of the pipeline to cancel from another task.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What one run did, for logs and callers.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub collection_id: String,
    pub slides: usize,
    pub described: usize,
    pub description_failures: usize,
    pub skipped_shapes: Vec<SkippedShape>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RunOutput {
    /// The rebuilt document, ready to write out.
    pub document: Vec<u8>,
    pub report: RunReport,
}

struct DescriptionStats {
    described: usize,
    failed: usize,
}

/// Drives one document through parse, describe, and rebuild.
pub struct Pipeline<'a> {
    store: &'a dyn CollectionStore,
    backend: &'a dyn GenerativeBackend,
    cancel: CancelFlag,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn CollectionStore, backend: &'a dyn GenerativeBackend) -> Self {
        Pipeline {
            store,
            backend,
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for cancelling this pipeline from another task.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Process `source` and return the rebuilt document with a report.
    ///
    /// Image descriptions degrade per chunk: a failed generation leaves
    /// a visible error string on the chunk and the run continues. Parse
    /// and store failures are fatal.
    pub async fn run(&self, source: &[u8], name: &str) -> Result<RunOutput, PipelineError> {
        let started_at = Utc::now();

        let parsed = parse_presentation(source, name)?;
        let mut presentation = parsed.presentation;
        for shape in &parsed.skipped {
            warn!(
                slide = shape.slide_number,
                shape = %shape.shape_name,
                kind = %shape.shape_kind,
                "shape skipped during extraction: {}",
                shape.reason
            );
        }
        info!(
            slides = presentation.slides.len(),
            chunks = presentation.chunk_count(),
            pending_images = presentation.pending_image_count(),
            "parsed {name}"
        );

        let engine = RagEngine::new(self.store, self.backend);

        // First build: the deck as uploaded, for image-prompt context.
        let initial_id = engine.create_collection(&presentation).await?;
        let stats = self
            .describe_pending_images(&engine, &mut presentation, &initial_id)
            .await?;

        // The initial collection is stale once descriptions exist. A
        // failed delete here must not be papered over with a fresh
        // create against the same store.
        if !engine.remove_collection(&initial_id).await {
            return Err(PipelineError::store_request(format!(
                "could not remove collection {initial_id} before rebuild"
            )));
        }
        let collection_id = engine.create_collection(&presentation).await?;

        let contexts = self
            .slide_contexts(&engine, &presentation, &collection_id)
            .await?;
        let document =
            rebuild_presentation(source, &presentation, self.backend, &contexts).await?;

        let report = RunReport {
            name: name.to_string(),
            collection_id,
            slides: presentation.slides.len(),
            described: stats.described,
            description_failures: stats.failed,
            skipped_shapes: parsed.skipped,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            collection = %report.collection_id,
            described = report.described,
            failures = report.description_failures,
            "run complete for {name}"
        );
        Ok(RunOutput { document, report })
    }

    /// Fill in a description for every image chunk still waiting for
    /// one. Deleted images and images that already carry content are
    /// left alone. Generation failures become inline error strings.
    async fn describe_pending_images(
        &self,
        engine: &RagEngine<'_>,
        presentation: &mut Presentation,
        collection_id: &str,
    ) -> Result<DescriptionStats, PipelineError> {
        let mut stats = DescriptionStats {
            described: 0,
            failed: 0,
        };

        for slide in &mut presentation.slides {
            let mut image_number = 0usize;
            for chunk in &mut slide.chunks {
                let (bytes, extension) = match &chunk.body {
                    ChunkBody::Image { bytes, extension } => (bytes, extension),
                    ChunkBody::Text => continue,
                };
                // Numbering counts every image on the slide so locator
                // suffixes stay positional even when some are skipped.
                image_number += 1;
                if !chunk.needs_description() {
                    continue;
                }
                self.cancel.check()?;

                match describe_image(engine, bytes, extension, chunk.slide_number, collection_id)
                    .await
                {
                    Ok(raw) => {
                        chunk.content =
                            compose_alt_text(&raw, chunk.slide_number, image_number, None);
                        debug!(
                            slide = chunk.slide_number,
                            image = image_number,
                            "image described"
                        );
                        stats.described += 1;
                    }
                    Err(e) => {
                        warn!(
                            slide = chunk.slide_number,
                            image = image_number,
                            error = %e,
                            "image description failed"
                        );
                        chunk.content = format!("Error describing image: {e}");
                        stats.failed += 1;
                    }
                }
            }
        }

        info!(
            described = stats.described,
            failed = stats.failed,
            "image description pass finished"
        );
        Ok(stats)
    }

    /// Pull each slide's indexed document back out for the notes
    /// prompts. Best-effort: a slide without a record gets no context.
    async fn slide_contexts(
        &self,
        engine: &RagEngine<'_>,
        presentation: &Presentation,
        collection_id: &str,
    ) -> Result<HashMap<u32, String>, PipelineError> {
        let mut contexts = HashMap::new();
        for slide in &presentation.slides {
            self.cancel.check()?;
            match engine
                .get_context_from_slide_number(slide.slide_number, collection_id)
                .await
            {
                Ok(record) if !record.document.trim().is_empty() => {
                    contexts.insert(slide.slide_number, record.document);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(slide = slide.slide_number, error = %e, "no retrieval context for notes");
                }
            }
        }
        Ok(contexts)
    }
}
