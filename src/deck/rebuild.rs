//! Writes descriptions and synthesized notes back into the document.
//!
//! Alt text is matched to pictures by recomputing each picture's order
//! number with the same accounting the parser used, then looking the
//! chunk up by that number. A picture whose chunk is missing, deleted,
//! or still undescribed keeps its original attributes. Notes are written
//! for every slide; a missing notes part is created from scratch.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::core::PipelineError;
use crate::deck::model::{Presentation, Slide};
use crate::deck::notes::synthesize_notes;
use crate::deck::package::{
    PptxPackage, NOTES_MASTER_REL_TYPE, NOTES_SLIDE_CONTENT_TYPE, NOTES_SLIDE_REL_TYPE,
    SLIDE_REL_TYPE,
};
use crate::deck::parser::{assign_orders, slide_notes_text};
use crate::deck::slidexml::{
    build_notes_slide_xml, extract_shape_items, replace_notes_text, write_alt_text, ShapeItem,
};
use crate::llm::GenerativeBackend;

/// Rebuilds `source` with alt text from the presentation model and fresh
/// notes for every slide. `contexts` holds optional per-slide retrieval
/// context for the notes prompts, keyed by slide number.
pub async fn rebuild_presentation(
    source: &[u8],
    presentation: &Presentation,
    backend: &dyn GenerativeBackend,
    contexts: &HashMap<u32, String>,
) -> Result<Vec<u8>, PipelineError> {
    let mut package = PptxPackage::open(source)?;
    let slide_paths = package.slide_paths()?;
    if slide_paths.len() != presentation.slides.len() {
        return Err(PipelineError::parse(format!(
            "document has {} slides but the model has {}",
            slide_paths.len(),
            presentation.slides.len()
        )));
    }

    for (index, slide_path) in slide_paths.iter().enumerate() {
        let slide_number = (index + 1) as u32;
        let slide = &presentation.slides[index];

        // Order accounting must see the document as the parser did, so
        // alt text goes in before the notes part can change anything.
        if let Err(e) = apply_alt_text(&mut package, slide_path, slide) {
            warn!(slide = slide_number, error = %e, "alt text not written for slide");
        }

        let notes = synthesize_notes(
            backend,
            slide,
            contexts.get(&slide_number).map(String::as_str),
        )
        .await;
        if let Err(e) = ensure_notes_slide(&mut package, slide_path, &notes) {
            warn!(slide = slide_number, error = %e, "notes not written for slide");
        }

        debug!(slide = slide_number, "slide rebuilt");
    }

    info!(slides = slide_paths.len(), "presentation rebuilt");
    package.save()
}

fn apply_alt_text(
    package: &mut PptxPackage,
    slide_path: &str,
    slide: &Slide,
) -> Result<(), PipelineError> {
    let base = if slide_notes_text(package, slide_path)?.is_empty() {
        0
    } else {
        1
    };
    let slide_xml = package.require_part(slide_path)?.to_vec();
    let items = extract_shape_items(&slide_xml)?;
    let (orders, _) = assign_orders(&items, base);

    let mut alts: HashMap<usize, String> = HashMap::new();
    let mut ordinal = 0usize;
    for (item, order) in items.iter().zip(&orders) {
        if let ShapeItem::Picture { .. } = item {
            if let Some(order) = order {
                if let Some(chunk) = slide.image_chunk_at(*order) {
                    if !chunk.is_deleted() {
                        let alt = chunk.content.trim();
                        if !alt.is_empty() {
                            alts.insert(ordinal, alt.to_string());
                        }
                    }
                }
            }
            ordinal += 1;
        }
    }

    if !alts.is_empty() {
        let rewritten = write_alt_text(&slide_xml, &alts)?;
        package.set_part(slide_path, rewritten);
    }
    Ok(())
}

/// Replaces the notes text, creating the whole notes part when the slide
/// has none. A notes part without a body placeholder is left untouched.
fn ensure_notes_slide(
    package: &mut PptxPackage,
    slide_path: &str,
    notes: &str,
) -> Result<(), PipelineError> {
    if let Some(notes_path) = package.notes_slide_path(slide_path)? {
        let xml = package.require_part(&notes_path)?.to_vec();
        match replace_notes_text(&xml, notes)? {
            Some(updated) => package.set_part(&notes_path, updated),
            None => warn!(part = %notes_path, "notes slide has no body placeholder"),
        }
        return Ok(());
    }

    let notes_path = free_notes_path(package);
    let notes_file = notes_path
        .rsplit_once('/')
        .map(|(_, file)| file.to_string())
        .unwrap_or_else(|| notes_path.clone());
    let slide_file = slide_path
        .rsplit_once('/')
        .map(|(_, file)| file.to_string())
        .unwrap_or_else(|| slide_path.to_string());

    package.set_part(&notes_path, build_notes_slide_xml(notes));
    package.add_content_type_override(&notes_path, NOTES_SLIDE_CONTENT_TYPE)?;
    package.add_relationship(
        slide_path,
        NOTES_SLIDE_REL_TYPE,
        &format!("../notesSlides/{notes_file}"),
    )?;
    package.add_relationship(
        &notes_path,
        SLIDE_REL_TYPE,
        &format!("../slides/{slide_file}"),
    )?;
    if let Some(master) = package.notes_master_path()? {
        let target = match master.strip_prefix("ppt/") {
            Some(rest) => format!("../{rest}"),
            None => format!("/{master}"),
        };
        package.add_relationship(&notes_path, NOTES_MASTER_REL_TYPE, &target)?;
    }
    Ok(())
}

fn free_notes_path(package: &PptxPackage) -> String {
    let mut k = 1;
    loop {
        let candidate = format!("ppt/notesSlides/notesSlide{k}.xml");
        if package.part(&candidate).is_none() {
            return candidate;
        }
        k += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::parser::parse_presentation;
    use crate::deck::slidexml::notes_text;
    use crate::deck::testdeck::{picture_xml, png_1x1, text_shape_xml, DeckFixture, SlideFixture};
    use crate::llm::testing::FakeBackend;

    async fn rebuild(
        source: &[u8],
        presentation: &Presentation,
        backend: &FakeBackend,
    ) -> PptxPackage {
        let contexts = HashMap::new();
        let bytes = rebuild_presentation(source, presentation, backend, &contexts)
            .await
            .unwrap();
        PptxPackage::open(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_alt_text_lands_on_matching_pictures() {
        let source = DeckFixture::new()
            .slide(
                SlideFixture::new()
                    .shape(text_shape_xml("Title 1", "Intro"))
                    .shape(picture_xml("First", "rId2"))
                    .shape(picture_xml("Second", "rId3"))
                    .media("rId2", "image1.png", png_1x1())
                    .media("rId3", "image2.png", png_1x1())
                    .notes("speaker cue"),
            )
            .build();
        let mut parsed = parse_presentation(&source, "demo").unwrap();
        // Orders: notes 0, title 1, pictures 2 and 3.
        for chunk in &mut parsed.presentation.slides[0].chunks {
            if chunk.is_image() {
                chunk.content = format!("Alt for order {}", chunk.order_number);
            }
        }

        let backend = FakeBackend::always("## Slide 1: Intro\n\nGenerated");
        let package = rebuild(&source, &parsed.presentation, &backend).await;

        let xml = String::from_utf8(
            package
                .require_part("ppt/slides/slide1.xml")
                .unwrap()
                .to_vec(),
        )
        .unwrap();
        assert!(xml.contains(r#"name="First" descr="Alt for order 2""#));
        assert!(xml.contains(r#"name="Second" descr="Alt for order 3""#));
    }

    #[tokio::test]
    async fn test_notes_replaced_with_generated_text() {
        let source = DeckFixture::new()
            .slide(
                SlideFixture::new()
                    .shape(text_shape_xml("Title 1", "Body"))
                    .notes("old cue"),
            )
            .build();
        let parsed = parse_presentation(&source, "demo").unwrap();
        let backend = FakeBackend::always("## Slide 1: Body\n\n- key point");
        let package = rebuild(&source, &parsed.presentation, &backend).await;

        let notes_path = package
            .notes_slide_path("ppt/slides/slide1.xml")
            .unwrap()
            .unwrap();
        let text = notes_text(package.require_part(&notes_path).unwrap()).unwrap();
        assert_eq!(text, "## Slide 1: Body\n\n- key point");
    }

    #[tokio::test]
    async fn test_notes_part_created_when_slide_has_none() {
        let source = DeckFixture::new()
            .slide(SlideFixture::new().shape(text_shape_xml("Title 1", "Body")))
            .build();
        let parsed = parse_presentation(&source, "demo").unwrap();
        let backend = FakeBackend::always("## Slide 1: Body");
        let package = rebuild(&source, &parsed.presentation, &backend).await;

        let notes_path = package
            .notes_slide_path("ppt/slides/slide1.xml")
            .unwrap()
            .expect("notes part should have been created");
        let text = notes_text(package.require_part(&notes_path).unwrap()).unwrap();
        assert_eq!(text, "## Slide 1: Body");

        // Content type override and master link come with the new part.
        let types = String::from_utf8(
            package.require_part("[Content_Types].xml").unwrap().to_vec(),
        )
        .unwrap();
        assert!(types.contains(&format!("/{notes_path}")));
        let rels = package.relationships(&notes_path).unwrap();
        assert!(rels.iter().any(|r| r.rel_type == NOTES_MASTER_REL_TYPE));
        assert!(rels.iter().any(|r| r.rel_type == SLIDE_REL_TYPE));
    }

    #[tokio::test]
    async fn test_deleted_and_pending_images_get_no_alt_text() {
        let source = DeckFixture::new()
            .slide(
                SlideFixture::new()
                    .shape(picture_xml("Gone", "rId2"))
                    .shape(picture_xml("Pending", "rId3"))
                    .media("rId2", "image1.png", png_1x1())
                    .media("rId3", "image2.png", png_1x1()),
            )
            .build();
        let mut parsed = parse_presentation(&source, "demo").unwrap();
        parsed.presentation.slides[0].chunks[0].content =
            crate::deck::model::DELETED_SENTINEL.to_string();
        // chunks[1] stays undescribed.

        let backend = FakeBackend::always("## Slide 1: X");
        let package = rebuild(&source, &parsed.presentation, &backend).await;
        let xml = String::from_utf8(
            package
                .require_part("ppt/slides/slide1.xml")
                .unwrap()
                .to_vec(),
        )
        .unwrap();
        assert!(!xml.contains("descr="));
    }

    #[tokio::test]
    async fn test_fallback_picture_does_not_take_alt_text() {
        // A fallback rendering inside mc:AlternateContent carries its own
        // p:pic. The parser yields no chunk for it, so the description at
        // order 0 belongs to the real picture after the block.
        let fallback = format!(
            r#"<mc:AlternateContent><mc:Choice Requires="v"/><mc:Fallback>{}</mc:Fallback></mc:AlternateContent>"#,
            picture_xml("Fallback pic", "rId8"),
        );
        let source = DeckFixture::new()
            .slide(
                SlideFixture::new()
                    .shape(fallback)
                    .shape(picture_xml("Real pic", "rId2"))
                    .media("rId2", "image1.png", png_1x1()),
            )
            .build();
        let mut parsed = parse_presentation(&source, "demo").unwrap();
        let chunks = &mut parsed.presentation.slides[0].chunks;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].order_number, 0);
        chunks[0].content = "A photo of the real picture".to_string();

        let backend = FakeBackend::always("## Slide 1: X");
        let package = rebuild(&source, &parsed.presentation, &backend).await;
        let xml = String::from_utf8(
            package
                .require_part("ppt/slides/slide1.xml")
                .unwrap()
                .to_vec(),
        )
        .unwrap();
        assert!(xml.contains(r#"name="Real pic" descr="A photo of the real picture""#));
        assert!(!xml.contains(r#"name="Fallback pic" descr"#));
    }

    #[tokio::test]
    async fn test_unresolvable_picture_keeps_later_alt_aligned() {
        // rId9 resolves to nothing, so the first picture has no chunk but
        // still holds order 0; the second picture's chunk sits at order 1.
        let source = DeckFixture::new()
            .slide(
                SlideFixture::new()
                    .shape(picture_xml("Broken", "rId9"))
                    .shape(picture_xml("Good", "rId2"))
                    .media("rId2", "image1.png", png_1x1()),
            )
            .build();
        let mut parsed = parse_presentation(&source, "demo").unwrap();
        assert_eq!(parsed.presentation.slides[0].chunks.len(), 1);
        parsed.presentation.slides[0].chunks[0].content = "The good one".to_string();

        let backend = FakeBackend::always("## Slide 1: X");
        let package = rebuild(&source, &parsed.presentation, &backend).await;
        let xml = String::from_utf8(
            package
                .require_part("ppt/slides/slide1.xml")
                .unwrap()
                .to_vec(),
        )
        .unwrap();
        assert!(xml.contains(r#"name="Good" descr="The good one""#));
        assert!(!xml.contains(r#"name="Broken" descr"#));
    }

    #[tokio::test]
    async fn test_every_slide_gets_notes_even_empty_ones() {
        let source = DeckFixture::new()
            .slide(SlideFixture::new().shape(text_shape_xml("T", "content")))
            .slide(SlideFixture::new())
            .build();
        let parsed = parse_presentation(&source, "demo").unwrap();
        let backend = FakeBackend::always("## Slide: generated");
        let package = rebuild(&source, &parsed.presentation, &backend).await;

        let second_notes = package
            .notes_slide_path("ppt/slides/slide2.xml")
            .unwrap()
            .expect("empty slide still gets a notes part");
        let text = notes_text(package.require_part(&second_notes).unwrap()).unwrap();
        assert_eq!(
            text,
            "Slide 2: This slide appears to be empty or contains no text or image content."
        );
        // The empty slide never reached the backend.
        assert_eq!(backend.call_count(), 1);
    }
}
