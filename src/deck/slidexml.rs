//! Event-stream walker over slide shape trees.
//!
//! `extract_shape_items` is the single source of truth for shape order:
//! both the parser and the rebuilder drive it over the same part bytes, so
//! positional accounting cannot drift between a parse and the later
//! write-back. Group shapes are flattened depth-first; a group's children
//! appear where the group sits in the stream.

use std::collections::HashMap;
use std::io::Cursor;
use std::mem;

use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::core::PipelineError;
use crate::deck::package::{attribute_value, write_event};

/// One shape encountered while walking a slide, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeItem {
    /// A shape with a text body. `text` is the paragraph texts joined with
    /// newlines and may be empty.
    Text { name: String, text: String },
    /// Every picture, whether or not its media can be resolved.
    Picture { name: String, rel_id: Option<String> },
    /// A shape kind we do not extract from (tables, charts, embedded
    /// objects). Reported so callers can log what was left behind.
    Unsupported { kind: &'static str, name: String },
}

enum Frame {
    Shape {
        name: String,
        paragraphs: Vec<String>,
        current: String,
        in_tx_body: bool,
    },
    Picture {
        name: String,
        rel_id: Option<String>,
    },
    Group,
    /// Swallows its whole subtree; `depth` tracks nested opens.
    Unsupported {
        kind: &'static str,
        name: String,
        depth: u32,
    },
    /// Connectors carry no content; skipped without a trace.
    Ignored { depth: u32 },
}

/// Containers whose subtrees the walkers treat as opaque. Both the item
/// extractor and the alt-text writer must skip everything inside them,
/// so a `p:pic` nested in a fallback rendering or a chart never takes
/// part in positional accounting.
fn opaque_kind(name: &[u8]) -> Option<&'static str> {
    match name {
        b"p:graphicFrame" => Some("graphicFrame"),
        b"p:contentPart" => Some("contentPart"),
        b"mc:AlternateContent" => Some("AlternateContent"),
        _ => None,
    }
}

pub fn extract_shape_items(slide_xml: &[u8]) -> Result<Vec<ShapeItem>, PipelineError> {
    let mut reader = Reader::from_reader(slide_xml);
    let mut buf = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut items = Vec::new();
    let mut in_text_run = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PipelineError::parse(format!("bad slide xml: {e}")))?;
        match event {
            Event::Start(ref e) => {
                let mut swallowed = false;
                match frames.last_mut() {
                    Some(Frame::Unsupported { depth, name, .. }) => {
                        if name.is_empty() {
                            if let Some(n) = non_visual_name(e)? {
                                *name = n;
                            }
                        }
                        *depth += 1;
                        swallowed = true;
                    }
                    Some(Frame::Ignored { depth }) => {
                        *depth += 1;
                        swallowed = true;
                    }
                    _ => {}
                }
                if swallowed {
                    buf.clear();
                    continue;
                }
                match e.name().as_ref() {
                    b"p:sp" => frames.push(Frame::Shape {
                        name: String::new(),
                        paragraphs: Vec::new(),
                        current: String::new(),
                        in_tx_body: false,
                    }),
                    b"p:pic" => frames.push(Frame::Picture {
                        name: String::new(),
                        rel_id: None,
                    }),
                    b"p:grpSp" => frames.push(Frame::Group),
                    b"p:cxnSp" => frames.push(Frame::Ignored { depth: 0 }),
                    b"p:txBody" => {
                        if let Some(Frame::Shape { in_tx_body, .. }) = frames.last_mut() {
                            *in_tx_body = true;
                        }
                    }
                    b"a:t" => {
                        if let Some(Frame::Shape { in_tx_body: true, .. }) = frames.last() {
                            in_text_run = true;
                        }
                    }
                    b"p:cNvPr" => assign_name(&mut frames, e)?,
                    b"a:blip" => assign_rel_id(&mut frames, e)?,
                    name => {
                        if let Some(kind) = opaque_kind(name) {
                            frames.push(Frame::Unsupported {
                                kind,
                                name: String::new(),
                                depth: 0,
                            });
                        }
                    }
                }
            }
            Event::Empty(ref e) => {
                match frames.last_mut() {
                    Some(Frame::Unsupported { name, .. }) => {
                        if name.is_empty() {
                            if let Some(n) = non_visual_name(e)? {
                                *name = n;
                            }
                        }
                        buf.clear();
                        continue;
                    }
                    Some(Frame::Ignored { .. }) => {
                        buf.clear();
                        continue;
                    }
                    _ => {}
                }
                match e.name().as_ref() {
                    b"p:cNvPr" => assign_name(&mut frames, e)?,
                    b"a:blip" => assign_rel_id(&mut frames, e)?,
                    b"a:br" => {
                        if let Some(Frame::Shape {
                            in_tx_body: true,
                            current,
                            ..
                        }) = frames.last_mut()
                        {
                            current.push('\n');
                        }
                    }
                    b"a:p" => {
                        if let Some(Frame::Shape {
                            in_tx_body: true,
                            paragraphs,
                            ..
                        }) = frames.last_mut()
                        {
                            paragraphs.push(String::new());
                        }
                    }
                    b"p:contentPart" => items.push(ShapeItem::Unsupported {
                        kind: "contentPart",
                        name: String::new(),
                    }),
                    _ => {}
                }
            }
            Event::Text(ref t) => {
                if in_text_run {
                    if let Some(Frame::Shape { current, .. }) = frames.last_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| PipelineError::parse(format!("bad slide xml: {e}")))?;
                        current.push_str(&text);
                    }
                }
            }
            Event::End(ref e) => {
                let top_swallows = matches!(
                    frames.last(),
                    Some(Frame::Unsupported { .. }) | Some(Frame::Ignored { .. })
                );
                if top_swallows {
                    let closes_frame = match frames.last_mut() {
                        Some(Frame::Unsupported { depth, .. })
                        | Some(Frame::Ignored { depth }) => {
                            if *depth > 0 {
                                *depth -= 1;
                                false
                            } else {
                                true
                            }
                        }
                        _ => false,
                    };
                    if closes_frame {
                        if let Some(Frame::Unsupported { kind, name, .. }) = frames.pop() {
                            items.push(ShapeItem::Unsupported { kind, name });
                        }
                    }
                    buf.clear();
                    continue;
                }
                match e.name().as_ref() {
                    b"a:t" => in_text_run = false,
                    b"a:p" => {
                        if let Some(Frame::Shape {
                            in_tx_body: true,
                            paragraphs,
                            current,
                            ..
                        }) = frames.last_mut()
                        {
                            paragraphs.push(mem::take(current));
                        }
                    }
                    b"p:txBody" => {
                        if let Some(Frame::Shape { in_tx_body, .. }) = frames.last_mut() {
                            *in_tx_body = false;
                        }
                    }
                    b"p:sp" => {
                        if let Some(Frame::Shape {
                            name, paragraphs, ..
                        }) = frames.pop()
                        {
                            items.push(ShapeItem::Text {
                                name,
                                text: paragraphs.join("\n"),
                            });
                        }
                    }
                    b"p:pic" => {
                        if let Some(Frame::Picture { name, rel_id }) = frames.pop() {
                            items.push(ShapeItem::Picture { name, rel_id });
                        }
                    }
                    b"p:grpSp" => {
                        frames.pop();
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(items)
}

fn non_visual_name(e: &BytesStart<'_>) -> Result<Option<String>, PipelineError> {
    if e.name().as_ref() == b"p:cNvPr" {
        attribute_value(e, b"name")
    } else {
        Ok(None)
    }
}

fn assign_name(frames: &mut [Frame], e: &BytesStart<'_>) -> Result<(), PipelineError> {
    if let Some(value) = attribute_value(e, b"name")? {
        match frames.last_mut() {
            Some(Frame::Shape { name, .. }) | Some(Frame::Picture { name, .. }) => {
                if name.is_empty() {
                    *name = value;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn assign_rel_id(frames: &mut [Frame], e: &BytesStart<'_>) -> Result<(), PipelineError> {
    if let Some(Frame::Picture { rel_id, .. }) = frames.last_mut() {
        if rel_id.is_none() {
            *rel_id = attribute_value(e, b"r:embed")?;
        }
    }
    Ok(())
}

/// Rewrites the `descr` attribute of pictures selected by 0-based walk
/// ordinal. Ordinals count the same pictures `extract_shape_items`
/// yields: a `p:pic` inside an opaque container or a connector passes
/// through unnumbered and untouched. Pictures absent from the map keep
/// their existing attributes.
pub fn write_alt_text(
    slide_xml: &[u8],
    alt_by_ordinal: &HashMap<usize, String>,
) -> Result<Vec<u8>, PipelineError> {
    let mut reader = Reader::from_reader(slide_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut next_ordinal = 0usize;
    let mut current: Option<usize> = None;
    let mut rewritten = false;
    let mut skip_depth = 0u32;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PipelineError::parse(format!("bad slide xml: {e}")))?;
        match event {
            Event::Start(ref e) if skip_depth > 0 => {
                skip_depth += 1;
                write_event(&mut writer, Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) if skip_depth > 0 => {
                skip_depth -= 1;
                write_event(&mut writer, Event::End(e.to_owned()))?;
            }
            Event::Start(ref e)
                if opaque_kind(e.name().as_ref()).is_some()
                    || e.name().as_ref() == b"p:cxnSp" =>
            {
                skip_depth = 1;
                write_event(&mut writer, Event::Start(e.to_owned()))?;
            }
            Event::Start(ref e) if e.name().as_ref() == b"p:pic" => {
                current = Some(next_ordinal);
                next_ordinal += 1;
                rewritten = false;
                write_event(&mut writer, Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) if e.name().as_ref() == b"p:pic" => {
                current = None;
                write_event(&mut writer, Event::End(e.to_owned()))?;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if skip_depth == 0
                    && e.name().as_ref() == b"p:cNvPr"
                    && current.is_some()
                    && !rewritten =>
            {
                rewritten = true;
                let ordinal = current.unwrap_or_default();
                let element = match alt_by_ordinal.get(&ordinal) {
                    Some(alt) => with_descr(e, alt)?,
                    None => e.to_owned(),
                };
                let is_empty = matches!(event, Event::Empty(_));
                if is_empty {
                    write_event(&mut writer, Event::Empty(element))?;
                } else {
                    write_event(&mut writer, Event::Start(element))?;
                }
            }
            Event::Eof => break,
            other => write_event(&mut writer, other.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner().into_inner())
}

/// Copy of a start tag with `descr` replaced (or added) and every other
/// attribute preserved.
fn with_descr(e: &BytesStart<'_>, descr: &str) -> Result<BytesStart<'static>, PipelineError> {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut element = BytesStart::new(qname);
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| PipelineError::parse(format!("bad xml attribute: {err}")))?;
        if attr.key.as_ref() == b"descr" {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| PipelineError::parse(format!("bad xml attribute value: {err}")))?;
        element.push_attribute((key.as_str(), value.as_ref()));
    }
    element.push_attribute(("descr", descr));
    Ok(element)
}

/// Text of the notes body placeholder, paragraphs joined with newlines.
/// Empty when the part has no body placeholder or it holds no text.
pub fn notes_text(notes_xml: &[u8]) -> Result<String, PipelineError> {
    let mut reader = Reader::from_reader(notes_xml);
    let mut buf = Vec::new();
    let mut sp_depth = 0u32;
    let mut is_body = false;
    let mut in_tx_body = false;
    let mut in_text_run = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PipelineError::parse(format!("bad notes xml: {e}")))?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"p:sp" => sp_depth += 1,
                b"p:txBody" if is_body => in_tx_body = true,
                b"a:t" if in_tx_body => in_text_run = true,
                b"p:ph" if sp_depth > 0 && !is_body => {
                    if attribute_value(e, b"type")?.as_deref() == Some("body") {
                        is_body = true;
                    }
                }
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"p:ph" if sp_depth > 0 && !is_body => {
                    if attribute_value(e, b"type")?.as_deref() == Some("body") {
                        is_body = true;
                    }
                }
                b"a:br" if in_tx_body => current.push('\n'),
                b"a:p" if in_tx_body => paragraphs.push(String::new()),
                _ => {}
            },
            Event::Text(ref t) => {
                if in_text_run {
                    let text = t
                        .unescape()
                        .map_err(|e| PipelineError::parse(format!("bad notes xml: {e}")))?;
                    current.push_str(&text);
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"a:t" => in_text_run = false,
                b"a:p" if in_tx_body => paragraphs.push(mem::take(&mut current)),
                b"p:txBody" => in_tx_body = false,
                b"p:sp" => {
                    sp_depth = sp_depth.saturating_sub(1);
                    if is_body {
                        return Ok(paragraphs.join("\n"));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(String::new())
}

/// Swaps the paragraphs of the notes body placeholder for `text`, one
/// paragraph per line. Returns `None` when the part has no body
/// placeholder to write into.
pub fn replace_notes_text(
    notes_xml: &[u8],
    text: &str,
) -> Result<Option<Vec<u8>>, PipelineError> {
    let mut reader = Reader::from_reader(notes_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut sp_depth = 0u32;
    let mut is_body = false;
    let mut in_body_tx = false;
    let mut replaced = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PipelineError::parse(format!("bad notes xml: {e}")))?;
        match event {
            Event::Start(ref e) if in_body_tx && e.name().as_ref() == b"a:p" => {
                // Old paragraphs are dropped wholesale.
                let end = e.to_end().into_owned();
                let mut skip = Vec::new();
                reader
                    .read_to_end_into(end.name(), &mut skip)
                    .map_err(|err| PipelineError::parse(format!("bad notes xml: {err}")))?;
            }
            Event::Empty(ref e) if in_body_tx && e.name().as_ref() == b"a:p" => {}
            Event::Start(ref e) => {
                match e.name().as_ref() {
                    b"p:sp" => sp_depth += 1,
                    b"p:txBody" if is_body && !replaced => in_body_tx = true,
                    b"p:ph" if sp_depth > 0 && !is_body && !replaced => {
                        if attribute_value(e, b"type")?.as_deref() == Some("body") {
                            is_body = true;
                        }
                    }
                    _ => {}
                }
                write_event(&mut writer, Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) => {
                if e.name().as_ref() == b"p:ph"
                    && sp_depth > 0
                    && !is_body
                    && !replaced
                    && attribute_value(e, b"type")?.as_deref() == Some("body")
                {
                    is_body = true;
                }
                write_event(&mut writer, Event::Empty(e.to_owned()))?;
            }
            Event::End(ref e) => {
                match e.name().as_ref() {
                    b"p:txBody" if in_body_tx => {
                        write_notes_paragraphs(&mut writer, text)?;
                        in_body_tx = false;
                        is_body = false;
                        replaced = true;
                    }
                    b"p:sp" => {
                        sp_depth = sp_depth.saturating_sub(1);
                        is_body = false;
                    }
                    _ => {}
                }
                write_event(&mut writer, Event::End(e.to_owned()))?;
            }
            Event::Eof => break,
            other => write_event(&mut writer, other.into_owned())?,
        }
        buf.clear();
    }
    if replaced {
        Ok(Some(writer.into_inner().into_inner()))
    } else {
        Ok(None)
    }
}

fn write_notes_paragraphs(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    text: &str,
) -> Result<(), PipelineError> {
    for line in text.split('\n') {
        if line.is_empty() {
            write_event(writer, Event::Empty(BytesStart::new("a:p")))?;
            continue;
        }
        write_event(writer, Event::Start(BytesStart::new("a:p")))?;
        write_event(writer, Event::Start(BytesStart::new("a:r")))?;
        write_event(writer, Event::Start(BytesStart::new("a:t")))?;
        write_event(writer, Event::Text(BytesText::new(line)))?;
        write_event(writer, Event::End(BytesEnd::new("a:t")))?;
        write_event(writer, Event::End(BytesEnd::new("a:r")))?;
        write_event(writer, Event::End(BytesEnd::new("a:p")))?;
    }
    Ok(())
}

/// A complete notes-slide part holding `text` in its body placeholder.
pub fn build_notes_slide_xml(text: &str) -> Vec<u8> {
    let mut paragraphs = String::new();
    for line in text.split('\n') {
        if line.is_empty() {
            paragraphs.push_str("<a:p/>");
        } else {
            paragraphs.push_str("<a:p><a:r><a:t>");
            paragraphs.push_str(&escape(line));
            paragraphs.push_str("</a:t></a:r></a:p>");
        }
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<p:notes xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main""#,
            r#" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#,
            r#" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">"#,
            r#"<p:cSld><p:spTree>"#,
            r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
            r#"<p:grpSpPr/>"#,
            r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Notes Placeholder 1"/>"#,
            r#"<p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr>"#,
            r#"<p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr>"#,
            r#"<p:spPr/>"#,
            r#"<p:txBody><a:bodyPr/><a:lstStyle/>{paragraphs}</p:txBody>"#,
            r#"</p:sp></p:spTree></p:cSld>"#,
            r#"<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>"#,
            r#"</p:notes>"#
        ),
        paragraphs = paragraphs
    )
    .into_bytes()
}
