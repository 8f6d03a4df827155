//! Read/write access to the OPC container behind a .pptx file.
//!
//! The package is loaded fully into memory: parts keep their original
//! archive order so a rebuilt document diffs cleanly against its source.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::PipelineError;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const PRESENTATION_PART: &str = "ppt/presentation.xml";

pub const REL_TYPE_SLIDE_SUFFIX: &str = "/slide";
pub const REL_TYPE_NOTES_SUFFIX: &str = "/notesSlide";
pub const REL_TYPE_LAYOUT_SUFFIX: &str = "/slideLayout";
pub const REL_TYPE_NOTES_MASTER_SUFFIX: &str = "/notesMaster";

pub const NOTES_SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide";
pub const NOTES_MASTER_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesMaster";
pub const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
pub const NOTES_SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml";

const RELS_XMLNS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// One `<Relationship>` entry from a part's .rels file.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    /// TargetMode="External"; such targets are never package parts.
    pub external: bool,
}

/// In-memory .pptx package keyed by part name (no leading slash).
pub struct PptxPackage {
    parts: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl PptxPackage {
    pub fn open(bytes: &[u8]) -> Result<Self, PipelineError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| PipelineError::parse(format!("not a zip archive: {e}")))?;
        let mut parts = Vec::with_capacity(zip.len());
        let mut index = HashMap::new();
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| PipelineError::parse(format!("unreadable archive entry: {e}")))?;
            if entry.enclosed_name().is_none() {
                return Err(PipelineError::parse(format!(
                    "unsafe archive entry: {}",
                    entry.name()
                )));
            }
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| PipelineError::parse(format!("failed to read {name}: {e}")))?;
            index.insert(name.clone(), parts.len());
            parts.push((name, data));
        }
        if !index.contains_key(PRESENTATION_PART) {
            return Err(PipelineError::parse(
                "missing ppt/presentation.xml; not a PowerPoint document",
            ));
        }
        Ok(PptxPackage { parts, index })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.index.get(name).map(|&i| self.parts[i].1.as_slice())
    }

    pub fn require_part(&self, name: &str) -> Result<&[u8], PipelineError> {
        self.part(name)
            .ok_or_else(|| PipelineError::parse(format!("missing package part: {name}")))
    }

    /// Replaces an existing part or appends a new one at the end.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some(&i) = self.index.get(name) {
            self.parts[i].1 = data;
        } else {
            self.index.insert(name.to_string(), self.parts.len());
            self.parts.push((name.to_string(), data));
        }
    }

    /// Slide part names in presentation order, from `p:sldIdLst`.
    pub fn slide_paths(&self) -> Result<Vec<String>, PipelineError> {
        let xml = self.require_part(PRESENTATION_PART)?;
        let rels = self.relationships(PRESENTATION_PART)?;
        let by_id: HashMap<&str, &Relationship> =
            rels.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut paths = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                    if e.name().as_ref() == b"p:sldId" =>
                {
                    let Some(rid) = attribute_value(e, b"r:id")? else {
                        continue;
                    };
                    let rel = by_id.get(rid.as_str()).ok_or_else(|| {
                        PipelineError::parse(format!("slide references unknown relationship {rid}"))
                    })?;
                    paths.push(resolve_target(PRESENTATION_PART, &rel.target));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(PipelineError::parse(format!("bad presentation.xml: {e}")))
                }
            }
            buf.clear();
        }
        Ok(paths)
    }

    /// All relationships of a part; empty when the part has no .rels file.
    pub fn relationships(&self, part_name: &str) -> Result<Vec<Relationship>, PipelineError> {
        let Some(xml) = self.part(&rels_path_for(part_name)) else {
            return Ok(Vec::new());
        };
        parse_relationships(xml)
    }

    pub fn relationship_by_id(
        &self,
        part_name: &str,
        rel_id: &str,
    ) -> Result<Option<Relationship>, PipelineError> {
        Ok(self
            .relationships(part_name)?
            .into_iter()
            .find(|r| r.id == rel_id))
    }

    /// First relationship whose type ends with `suffix`, resolved to a
    /// package part name. External targets are ignored.
    pub fn related_part(
        &self,
        part_name: &str,
        suffix: &str,
    ) -> Result<Option<String>, PipelineError> {
        Ok(self
            .relationships(part_name)?
            .into_iter()
            .find(|r| !r.external && r.rel_type.ends_with(suffix))
            .map(|r| resolve_target(part_name, &r.target)))
    }

    pub fn notes_slide_path(&self, slide_path: &str) -> Result<Option<String>, PipelineError> {
        self.related_part(slide_path, REL_TYPE_NOTES_SUFFIX)
    }

    pub fn layout_path(&self, slide_path: &str) -> Result<Option<String>, PipelineError> {
        self.related_part(slide_path, REL_TYPE_LAYOUT_SUFFIX)
    }

    pub fn notes_master_path(&self) -> Result<Option<String>, PipelineError> {
        self.related_part(PRESENTATION_PART, REL_TYPE_NOTES_MASTER_SUFFIX)
    }

    /// Resolves an embedded-media relationship id to the media part name.
    pub fn media_part(
        &self,
        part_name: &str,
        rel_id: &str,
    ) -> Result<Option<String>, PipelineError> {
        Ok(self
            .relationship_by_id(part_name, rel_id)?
            .filter(|r| !r.external)
            .map(|r| resolve_target(part_name, &r.target)))
    }

    /// Appends a relationship to a part, creating the .rels file if needed.
    /// Returns the allocated id.
    pub fn add_relationship(
        &mut self,
        part_name: &str,
        rel_type: &str,
        target: &str,
    ) -> Result<String, PipelineError> {
        let mut rels = self.relationships(part_name)?;
        let next = rels
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("rId{next}");
        rels.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external: false,
        });
        let xml = write_relationships(&rels)?;
        self.set_part(&rels_path_for(part_name), xml);
        Ok(id)
    }

    /// Registers a content-type override for a part, once.
    pub fn add_content_type_override(
        &mut self,
        part_name: &str,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        let absolute = format!("/{part_name}");
        let xml = self.require_part(CONTENT_TYPES_PART)?;

        let mut reader = Reader::from_reader(xml);
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let mut buf = Vec::new();
        let mut present = false;
        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| PipelineError::parse(format!("bad [Content_Types].xml: {e}")))?;
            match event {
                Event::Empty(ref e) if e.name().as_ref() == b"Override" => {
                    if attribute_value(e, b"PartName")?.as_deref() == Some(absolute.as_str()) {
                        present = true;
                    }
                    write_event(&mut writer, Event::Empty(e.to_owned()))?;
                }
                Event::End(ref e) if e.name().as_ref() == b"Types" => {
                    if !present {
                        let mut element = BytesStart::new("Override");
                        element.push_attribute(("PartName", absolute.as_str()));
                        element.push_attribute(("ContentType", content_type));
                        write_event(&mut writer, Event::Empty(element))?;
                    }
                    write_event(&mut writer, Event::End(e.to_owned()))?;
                }
                Event::Eof => break,
                other => write_event(&mut writer, other.into_owned())?,
            }
            buf.clear();
        }
        self.set_part(CONTENT_TYPES_PART, writer.into_inner().into_inner());
        Ok(())
    }

    /// Serializes all parts back into a zip archive, preserving part order.
    pub fn save(&self) -> Result<Vec<u8>, PipelineError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)
                .map_err(|e| PipelineError::parse(format!("failed to write {name}: {e}")))?;
            zip.write_all(data)
                .map_err(|e| PipelineError::parse(format!("failed to write {name}: {e}")))?;
        }
        let cursor = zip
            .finish()
            .map_err(|e| PipelineError::parse(format!("failed to finish archive: {e}")))?;
        Ok(cursor.into_inner())
    }
}

/// `.rels` sidecar path for a part, e.g. `ppt/slides/slide1.xml` ->
/// `ppt/slides/_rels/slide1.xml.rels`.
pub fn rels_path_for(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolves a relationship target against the directory of `base_part`.
/// Targets starting with `/` are package-absolute.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_part.split('/').collect();
    segments.pop();
    for piece in target.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, PipelineError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let id = attribute_value(e, b"Id")?.unwrap_or_default();
                let rel_type = attribute_value(e, b"Type")?.unwrap_or_default();
                let target = attribute_value(e, b"Target")?.unwrap_or_default();
                let external =
                    attribute_value(e, b"TargetMode")?.as_deref() == Some("External");
                rels.push(Relationship {
                    id,
                    rel_type,
                    target,
                    external,
                });
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(PipelineError::parse(format!("bad relationships part: {e}"))),
        }
        buf.clear();
    }
    Ok(rels)
}

fn write_relationships(rels: &[Relationship]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut out = Vec::new();
    out.extend_from_slice(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);

    let mut root = BytesStart::new("Relationships");
    root.push_attribute(("xmlns", RELS_XMLNS));
    write_event(&mut writer, Event::Start(root))?;
    for rel in rels {
        let mut element = BytesStart::new("Relationship");
        element.push_attribute(("Id", rel.id.as_str()));
        element.push_attribute(("Type", rel.rel_type.as_str()));
        element.push_attribute(("Target", rel.target.as_str()));
        if rel.external {
            element.push_attribute(("TargetMode", "External"));
        }
        write_event(&mut writer, Event::Empty(element))?;
    }
    write_event(
        &mut writer,
        Event::End(quick_xml::events::BytesEnd::new("Relationships")),
    )?;
    out.extend_from_slice(&writer.into_inner().into_inner());
    Ok(out)
}

pub(crate) fn write_event(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    event: Event<'_>,
) -> Result<(), PipelineError> {
    writer
        .write_event(event)
        .map_err(|e| PipelineError::parse(format!("failed to write xml: {e}")))
}

pub(crate) fn attribute_value(
    element: &BytesStart<'_>,
    key: &[u8],
) -> Result<Option<String>, PipelineError> {
    for attr in element.attributes().with_checks(false) {
        let attr = attr.map_err(|e| PipelineError::parse(format!("bad xml attribute: {e}")))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| PipelineError::parse(format!("bad xml attribute value: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
