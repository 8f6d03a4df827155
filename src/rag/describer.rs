//! Accessibility descriptions for image chunks.
//!
//! One image in, one short description out: a fixed prompt asks the
//! backend for an alt-text-sized answer, and `compose_alt_text` packages
//! whatever comes back into something safe to write into a `descr`
//! attribute. Truncation counts characters, not bytes, since the 125
//! limit comes from assistive-technology guidance, not storage.

use tracing::debug;

use crate::core::errors::PipelineError;
use crate::rag::engine::RagEngine;

/// Prompt sent with every image. Kept deliberately fixed so output
/// quality differences come from the image, not prompt drift.
const IMAGE_PROMPT: &str = "Analyze this image and provide a comprehensive description suitable for accessibility. \
Include: main subject, key elements, context, and purpose. \
Be descriptive but concise (under 125 characters for alt text). \
Focus on what someone who can't see the image would need to know.";

const DESCRIPTION_MAX_TOKENS: u32 = 150;

/// Alt text must stay under this many characters.
const ALT_TEXT_LIMIT: usize = 125;

/// Word-packing budget for the first truncation stage, leaving room for
/// the trailing ellipsis.
const TRUNCATION_BUDGET: usize = 120;

/// Ask the backend to describe one image for accessibility.
///
/// The fixed prompt is enriched with the slide's own indexed text when
/// the collection lookup succeeds; a failed lookup degrades to the
/// plain prompt. Returns the raw trimmed description; callers run it
/// through [`compose_alt_text`] before writing it anywhere
/// size-limited.
pub async fn describe_image(
    engine: &RagEngine<'_>,
    image_bytes: &[u8],
    extension: &str,
    slide_number: u32,
    collection_id: &str,
) -> Result<String, PipelineError> {
    debug!(
        slide = slide_number,
        "requesting description for {extension} image ({} bytes)",
        image_bytes.len()
    );
    let mut prompt = IMAGE_PROMPT.to_string();
    match engine
        .get_context_from_slide_number(slide_number, collection_id)
        .await
    {
        Ok(record) if !record.document.trim().is_empty() => {
            prompt.push_str("\n\nText from the slide this image appears on: ");
            prompt.push_str(record.document.trim());
        }
        Ok(_) => {}
        Err(e) => {
            debug!(slide = slide_number, error = %e, "no slide context for the image prompt");
        }
    }

    let answer = engine
        .prompt_with_image(&prompt, image_bytes, extension, DESCRIPTION_MAX_TOKENS)
        .await?;
    Ok(answer.trim().to_string())
}

/// Package a raw description into alt text.
///
/// Overlong descriptions are cut at a word boundary and given an
/// ellipsis. A locator ("Image 2 on slide 3") or a caller-supplied
/// context string is always appended, and the final result is clamped
/// to the alt text limit.
pub fn compose_alt_text(
    description: &str,
    slide_number: u32,
    image_number: usize,
    context: Option<&str>,
) -> String {
    let mut clean = description.trim().to_string();

    if clean.chars().count() > ALT_TEXT_LIMIT {
        let mut short = String::new();
        for word in clean.split_whitespace() {
            if short.chars().count() + 1 + word.chars().count() <= TRUNCATION_BUDGET {
                if !short.is_empty() {
                    short.push(' ');
                }
                short.push_str(word);
            } else {
                break;
            }
        }
        clean = format!("{short}...");
    }

    let mut alt_text = match context {
        Some(ctx) if !ctx.is_empty() => format!("{clean} - {ctx}"),
        _ => format!("{clean} - Image {image_number} on slide {slide_number}"),
    };

    if alt_text.chars().count() > ALT_TEXT_LIMIT {
        let clipped: String = alt_text.chars().take(ALT_TEXT_LIMIT - 3).collect();
        alt_text = format!("{clipped}...");
    }

    alt_text
}
