//! Accessibility processing for slide decks.
//!
//! Parses a .pptx into ordered chunks, indexes each slide in a vector
//! collection, generates alt text for pictures and speaker notes for
//! slides through a generative backend, and writes the enriched deck
//! back out. [`pipeline::Pipeline`] is the turnkey entry point; the
//! layers underneath are usable on their own.

pub mod core;
pub mod deck;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod rag;
pub mod store;

pub use crate::core::errors::PipelineError;
pub use crate::pipeline::{CancelFlag, Pipeline, RunOutput, RunReport};
