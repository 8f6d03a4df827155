//! Decomposes a .pptx document into ordered chunks.
//!
//! Order numbers are assigned once per slide: notes text takes 0 when
//! present, then every non-empty text shape and every picture consumes the
//! next number in walk order. A picture whose media cannot be resolved
//! still consumes its number, so positions stay valid for write-back.
//! Layout images are appended after the slide's own shapes.

use std::io::Cursor;

use image::ImageFormat;
use tracing::{debug, warn};

use crate::core::PipelineError;
use crate::deck::model::{Chunk, Presentation, SkippedShape, Slide};
use crate::deck::package::PptxPackage;
use crate::deck::slidexml::{extract_shape_items, notes_text, ShapeItem};

pub struct ParsedDeck {
    pub presentation: Presentation,
    pub skipped: Vec<SkippedShape>,
}

pub fn parse_presentation(bytes: &[u8], name: &str) -> Result<ParsedDeck, PipelineError> {
    let package = PptxPackage::open(bytes)?;
    let slide_paths = package.slide_paths()?;
    let mut presentation = Presentation::new(name);
    let mut skipped = Vec::new();

    for (index, slide_path) in slide_paths.iter().enumerate() {
        let slide_number = (index + 1) as u32;
        let mut slide = Slide::new(slide_number);

        let notes = slide_notes_text(&package, slide_path)?;
        let base = if notes.is_empty() { 0 } else { 1 };
        if base == 1 {
            slide.chunks.push(Chunk::text(slide_number, 0, notes));
        }

        let items = extract_shape_items(package.require_part(slide_path)?)?;
        let (orders, mut next_order) = assign_orders(&items, base);
        for (item, order) in items.iter().zip(&orders) {
            match item {
                ShapeItem::Text { text, .. } => {
                    if let Some(order) = order {
                        slide.chunks.push(Chunk::text(slide_number, *order, text.clone()));
                    }
                }
                ShapeItem::Picture { name, rel_id } => {
                    let order = order.unwrap_or_default();
                    match resolve_picture(&package, slide_path, rel_id.as_deref()) {
                        Ok((data, extension)) => {
                            slide
                                .chunks
                                .push(Chunk::image(slide_number, order, data, extension));
                        }
                        Err(reason) => {
                            warn!(
                                slide = slide_number,
                                shape = %name,
                                %reason,
                                "skipping picture with unresolvable media"
                            );
                            skipped.push(SkippedShape {
                                slide_number,
                                shape_name: name.clone(),
                                shape_kind: "picture".to_string(),
                                reason,
                            });
                        }
                    }
                }
                ShapeItem::Unsupported { kind, name } => {
                    debug!(slide = slide_number, shape = %name, kind, "shape kind not extracted");
                    skipped.push(SkippedShape {
                        slide_number,
                        shape_name: name.clone(),
                        shape_kind: kind.to_string(),
                        reason: "unsupported shape kind".to_string(),
                    });
                }
            }
        }

        // Pictures placed on the slide layout are part of what a viewer
        // sees; they get chunks too, numbered after the slide's own shapes.
        if let Some(layout_path) = package.layout_path(slide_path)? {
            if let Some(layout_xml) = package.part(&layout_path) {
                for item in extract_shape_items(layout_xml)? {
                    if let ShapeItem::Picture { name, rel_id } = item {
                        match resolve_picture(&package, &layout_path, rel_id.as_deref()) {
                            Ok((data, extension)) => {
                                slide.chunks.push(Chunk::image(
                                    slide_number,
                                    next_order,
                                    data,
                                    extension,
                                ));
                                next_order += 1;
                            }
                            Err(reason) => {
                                debug!(
                                    slide = slide_number,
                                    shape = %name,
                                    %reason,
                                    "layout picture not extracted"
                                );
                            }
                        }
                    }
                }
            }
        }

        debug!(
            slide = slide_number,
            chunks = slide.chunks.len(),
            "slide decomposed"
        );
        presentation.slides.push(slide);
    }

    Ok(ParsedDeck {
        presentation,
        skipped,
    })
}

/// Order numbers for each walk item, starting at `base`, plus the next
/// free number. `None` marks items that consume no position: empty text
/// shapes and unsupported kinds. Pictures always consume one.
pub(crate) fn assign_orders(items: &[ShapeItem], base: u32) -> (Vec<Option<u32>>, u32) {
    let mut next = base;
    let orders = items
        .iter()
        .map(|item| match item {
            ShapeItem::Text { text, .. } => {
                if text.is_empty() {
                    None
                } else {
                    let order = next;
                    next += 1;
                    Some(order)
                }
            }
            ShapeItem::Picture { .. } => {
                let order = next;
                next += 1;
                Some(order)
            }
            ShapeItem::Unsupported { .. } => None,
        })
        .collect();
    (orders, next)
}

/// Notes text for a slide, empty when it has no notes part.
pub(crate) fn slide_notes_text(
    package: &PptxPackage,
    slide_path: &str,
) -> Result<String, PipelineError> {
    match package.notes_slide_path(slide_path)? {
        Some(notes_path) => match package.part(&notes_path) {
            Some(xml) => notes_text(xml),
            None => Ok(String::new()),
        },
        None => Ok(String::new()),
    }
}

fn resolve_picture(
    package: &PptxPackage,
    part_path: &str,
    rel_id: Option<&str>,
) -> Result<(Vec<u8>, String), String> {
    let rel_id = rel_id.ok_or_else(|| "picture has no embedded media reference".to_string())?;
    let media_path = package
        .media_part(part_path, rel_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no media part behind {rel_id}"))?;
    let data = package
        .part(&media_path)
        .ok_or_else(|| format!("media part {media_path} missing from package"))?;
    let extension = media_path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    Ok(normalize_stored_image(data.to_vec(), &extension))
}

/// PNG and JPEG bytes are kept as-is; other decodable formats are
/// transcoded to PNG so downstream consumers see one of two formats.
/// Undecodable media (vector metafiles and the like) passes through.
fn normalize_stored_image(data: Vec<u8>, extension: &str) -> (Vec<u8>, String) {
    match extension {
        "png" => (data, "png".to_string()),
        "jpg" | "jpeg" => (data, "jpg".to_string()),
        other => match image::load_from_memory(&data) {
            Ok(decoded) => {
                let mut out = Cursor::new(Vec::new());
                match decoded.write_to(&mut out, ImageFormat::Png) {
                    Ok(()) => (out.into_inner(), "png".to_string()),
                    Err(e) => {
                        warn!(format = other, error = %e, "png transcode failed, keeping original bytes");
                        (data, other.to_string())
                    }
                }
            }
            Err(e) => {
                warn!(format = other, error = %e, "undecodable image kept in original format");
                (data, other.to_string())
            }
        },
    }
}
