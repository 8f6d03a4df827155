//! Synthesizes accessible speaker notes for a slide.
//!
//! The prompt asks for markdown study notes and forbids conversational
//! openers; models slip anyway, so a cleanup pass cuts known preambles.
//! Generation failures degrade to plain-text fallback notes rather than
//! failing the slide.

use tracing::warn;

use crate::deck::model::Slide;
use crate::llm::GenerativeBackend;

pub const NOTES_MAX_TOKENS: u32 = 400;

const PREAMBLE_PATTERNS: [&str; 11] = [
    "Okay, here are",
    "Here are",
    "Here's",
    "Let me",
    "Sure!",
    "Certainly!",
    "Okay, let's",
    "Let's",
    "Alright,",
    "Sure thing,",
    "Of course,",
];

/// Notes for one slide. Always returns text: empty slides get a stock
/// sentence, backend failures get fallback notes built from the chunks.
pub async fn synthesize_notes(
    backend: &dyn GenerativeBackend,
    slide: &Slide,
    context: Option<&str>,
) -> String {
    let texts: Vec<&str> = slide
        .chunks
        .iter()
        .filter(|c| !c.is_image())
        .map(|c| c.content.as_str())
        .collect();
    let combined = texts.join(" ").trim().to_string();
    let descriptions: Vec<&str> = slide
        .chunks
        .iter()
        .filter(|c| c.is_image() && !c.is_deleted() && !c.content.is_empty())
        .map(|c| c.content.as_str())
        .collect();

    if combined.is_empty() && descriptions.is_empty() {
        return format!(
            "Slide {}: This slide appears to be empty or contains no text or image content.",
            slide.slide_number
        );
    }

    let prompt = build_prompt(slide.slide_number, &combined, &descriptions, context);
    match backend.complete(&prompt, NOTES_MAX_TOKENS).await {
        Ok(notes) => strip_preamble(notes.trim()),
        Err(e) => {
            warn!(slide = slide.slide_number, error = %e, "notes generation failed, using fallback");
            fallback_notes(slide.slide_number, &combined, &descriptions)
        }
    }
}

fn build_prompt(
    slide_number: u32,
    combined_text: &str,
    descriptions: &[&str],
    context: Option<&str>,
) -> String {
    let content = if combined_text.is_empty() {
        "No text"
    } else {
        combined_text
    };
    let images = if descriptions.is_empty() {
        "No images".to_string()
    } else {
        descriptions
            .iter()
            .map(|d| format!("- {d}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut prompt = format!(
        "Generate accessible study notes for slide {slide_number}.\n\nContent: {content}\n\nImages: {images}\n"
    );
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\nContext from related slides: {context}\n"));
    }
    prompt.push_str(&format!(
        "\nRequirements:\n\
         - Start directly with markdown heading: ## Slide {slide_number}: [Title]\n\
         - NO conversational preambles (no \"Okay\", \"Here are\", \"Let me\", etc.)\n\
         - Use markdown formatting (##, *, bullet points)\n\
         - Clear, concise explanations of key concepts\n\
         - Include visual content descriptions\n\
         - Maintain academic tone"
    ));
    prompt
}

/// Cuts a conversational opener: content resumes after the first newline,
/// or after the first colon when the opener fits in the first 50
/// characters and there is no newline at all.
pub(crate) fn strip_preamble(notes: &str) -> String {
    let lower = notes.to_lowercase();
    for pattern in PREAMBLE_PATTERNS {
        if lower.starts_with(&pattern.to_lowercase()) {
            if let Some((_, rest)) = notes.split_once('\n') {
                return rest.trim().to_string();
            }
            let head: String = notes.chars().take(50).collect();
            if head.contains(':') {
                if let Some((_, rest)) = notes.split_once(':') {
                    return rest.trim().to_string();
                }
            }
            break;
        }
    }
    notes.to_string()
}

fn fallback_notes(slide_number: u32, combined_text: &str, descriptions: &[&str]) -> String {
    let text = if combined_text.is_empty() {
        "No text content"
    } else {
        combined_text
    };
    let images = if descriptions.is_empty() {
        "No images".to_string()
    } else {
        format!("Image Information: {}", descriptions.join("\n"))
    };
    format!(
        "Slide {slide_number} Notes:\n{text}\n\n{images}\n\nNote: AI-generated accessible notes were not available for this slide."
    )
    .trim()
    .to_string()
}
