pub mod model;
pub mod notes;
pub mod package;
pub mod parser;
pub mod rebuild;
pub mod slidexml;

#[cfg(test)]
pub(crate) mod testdeck;

pub use model::{Chunk, ChunkBody, Presentation, SkippedShape, Slide, DELETED_SENTINEL};
pub use parser::{parse_presentation, ParsedDeck};
pub use rebuild::rebuild_presentation;
