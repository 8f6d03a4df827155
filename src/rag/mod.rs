//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `RagEngine`: builds and queries the per-presentation vector collection
//! - `describer`: turns image chunks into alt-text-sized descriptions

pub mod describer;
pub mod engine;

pub use describer::{compose_alt_text, describe_image};
pub use engine::{RagEngine, SlideRecord};
