//! Typed chunk model for slide-deck content.
//!
//! A parsed deck becomes a `Presentation` of `Slide`s, each holding ordered
//! `Chunk`s: the speaker-notes text (order 0 when present), then shape text
//! and pictures in depth-first document order. Order numbers are stable for
//! the lifetime of the run; the rebuilder walks the original document with
//! the same accounting to put generated descriptions back in place.

use serde::Serialize;
use uuid::Uuid;

/// Marks an image chunk excluded from the collection and from alt text.
pub const DELETED_SENTINEL: &str = "__DELETED__";

/// One atomic piece of slide content with a stable position.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Uuid,
    /// 1-based, matches the owning slide.
    pub slide_number: u32,
    /// 0-based position within the slide, unique per slide.
    pub order_number: u32,
    /// Extracted text, or the generated/edited description for images.
    /// Empty means "no description yet" for an image chunk.
    pub content: String,
    pub body: ChunkBody,
}

/// Variant payload; matched exhaustively wherever behavior differs by kind.
#[derive(Debug, Clone)]
pub enum ChunkBody {
    Text,
    Image {
        /// Raw bitmap bytes, normalized to PNG/JPEG where decodable.
        bytes: Vec<u8>,
        /// Lowercase format tag without the dot, e.g. "png".
        extension: String,
    },
}

impl Chunk {
    pub fn text(slide_number: u32, order_number: u32, content: impl Into<String>) -> Self {
        Chunk {
            id: Uuid::new_v4(),
            slide_number,
            order_number,
            content: content.into(),
            body: ChunkBody::Text,
        }
    }

    pub fn image(
        slide_number: u32,
        order_number: u32,
        bytes: Vec<u8>,
        extension: impl Into<String>,
    ) -> Self {
        Chunk {
            id: Uuid::new_v4(),
            slide_number,
            order_number,
            content: String::new(),
            body: ChunkBody::Image {
                bytes,
                extension: extension.into(),
            },
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.body, ChunkBody::Image { .. })
    }

    /// The flat-metadata type tag for this chunk.
    pub fn type_label(&self) -> &'static str {
        match self.body {
            ChunkBody::Text => "text",
            ChunkBody::Image { .. } => "image",
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.content == DELETED_SENTINEL
    }

    /// True for image chunks still waiting for a description.
    pub fn needs_description(&self) -> bool {
        self.is_image() && self.content.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Slide {
    pub id: Uuid,
    /// 1-based, equals this slide's position in the presentation.
    pub slide_number: u32,
    pub chunks: Vec<Chunk>,
}

impl Slide {
    pub fn new(slide_number: u32) -> Self {
        Slide {
            id: Uuid::new_v4(),
            slide_number,
            chunks: Vec::new(),
        }
    }

    /// Space-joined contents of all non-deleted chunks, in order. This is
    /// the per-slide document indexed by the store. Image chunks that have
    /// not been described yet contribute an empty slot.
    pub fn document_text(&self) -> String {
        self.chunks
            .iter()
            .filter(|c| !c.is_deleted())
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn image_chunk_at(&self, order_number: u32) -> Option<&Chunk> {
        self.chunks
            .iter()
            .find(|c| c.is_image() && c.order_number == order_number)
    }

    /// Order numbers must grow strictly in extraction order.
    pub fn orders_strictly_increasing(&self) -> bool {
        self.chunks
            .windows(2)
            .all(|pair| pair[0].order_number < pair[1].order_number)
    }
}

#[derive(Debug, Clone)]
pub struct Presentation {
    pub id: Uuid,
    pub name: String,
    /// Positionally 1:1 with the source document's slides.
    pub slides: Vec<Slide>,
}

impl Presentation {
    pub fn new(name: impl Into<String>) -> Self {
        Presentation {
            id: Uuid::new_v4(),
            name: name.into(),
            slides: Vec::new(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.slides.iter().map(|s| s.chunks.len()).sum()
    }

    pub fn pending_image_count(&self) -> usize {
        self.slides
            .iter()
            .flat_map(|s| s.chunks.iter())
            .filter(|c| c.needs_description())
            .count()
    }
}

/// Diagnostic record for a shape the parser could not extract. Non-fatal:
/// the shape is skipped and extraction continues.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedShape {
    pub slide_number: u32,
    pub shape_name: String,
    pub shape_kind: String,
    pub reason: String,
}
