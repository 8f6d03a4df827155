//! In-memory .pptx fixtures for tests.

use std::io::{Cursor, Write};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::deck::package::{NOTES_MASTER_REL_TYPE, NOTES_SLIDE_REL_TYPE, SLIDE_REL_TYPE};
use crate::deck::slidexml::build_notes_slide_xml;

pub(crate) const TEST_NS: &str = concat!(
    r#" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main""#,
    r#" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#,
    r#" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#,
    r#" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006""#
);

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const LAYOUT_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";

pub(crate) fn text_shape_xml(name: &str, text: &str) -> String {
    let paragraphs = if text.is_empty() {
        "<a:p/>".to_string()
    } else {
        text.split('\n')
            .map(|line| format!("<a:p><a:r><a:t>{line}</a:t></a:r></a:p>"))
            .collect()
    };
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="{name}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/>{paragraphs}</p:txBody></p:sp>"#
    )
}

pub(crate) fn picture_xml(name: &str, rel_id: &str) -> String {
    format!(
        r#"<p:pic><p:nvPicPr><p:cNvPr id="4" name="{name}"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr/></p:pic>"#
    )
}

pub(crate) fn png_1x1() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([200, 40, 40])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub(crate) fn png_rgba_1x1() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 128])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub(crate) fn gif_1x1() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 120, 0])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Gif).unwrap();
    out.into_inner()
}

#[derive(Default)]
pub(crate) struct SlideFixture {
    shapes: Vec<String>,
    notes: Option<String>,
    media: Vec<(String, String, Vec<u8>)>,
    layout: Option<(String, String, String, Vec<u8>)>,
}

impl SlideFixture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shape(mut self, xml: String) -> Self {
        self.shapes.push(xml);
        self
    }

    pub(crate) fn notes(mut self, text: &str) -> Self {
        self.notes = Some(text.to_string());
        self
    }

    pub(crate) fn media(mut self, rel_id: &str, file_name: &str, bytes: Vec<u8>) -> Self {
        self.media
            .push((rel_id.to_string(), file_name.to_string(), bytes));
        self
    }

    /// Gives the slide a layout holding one shape with its own media.
    pub(crate) fn layout(
        mut self,
        shape_xml: String,
        rel_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Self {
        self.layout = Some((
            shape_xml,
            rel_id.to_string(),
            file_name.to_string(),
            bytes,
        ));
        self
    }
}

#[derive(Default)]
pub(crate) struct DeckFixture {
    slides: Vec<SlideFixture>,
}

impl DeckFixture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn slide(mut self, slide: SlideFixture) -> Self {
        self.slides.push(slide);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();

        let mut overrides = String::from(
            r#"<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>"#,
        );
        let mut presentation_rels = format!(
            r#"<Relationship Id="rId1" Type="{NOTES_MASTER_REL_TYPE}" Target="notesMasters/notesMaster1.xml"/>"#
        );
        let mut sld_ids = String::new();

        for (i, slide) in self.slides.iter().enumerate() {
            let n = i + 1;
            let rid = format!("rId{}", n + 1);
            sld_ids.push_str(&format!(r#"<p:sldId id="{}" r:id="{rid}"/>"#, 255 + n));
            presentation_rels.push_str(&format!(
                r#"<Relationship Id="{rid}" Type="{SLIDE_REL_TYPE}" Target="slides/slide{n}.xml"/>"#
            ));
            overrides.push_str(&format!(
                r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
            ));

            let body: String = slide.shapes.concat();
            files.push((
                format!("ppt/slides/slide{n}.xml"),
                format!(
                    r#"<?xml version="1.0"?><p:sld{TEST_NS}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{body}</p:spTree></p:cSld></p:sld>"#
                )
                .into_bytes(),
            ));

            let mut slide_rels = String::new();
            for (rel_id, file_name, bytes) in &slide.media {
                slide_rels.push_str(&format!(
                    r#"<Relationship Id="{rel_id}" Type="{IMAGE_REL_TYPE}" Target="../media/{file_name}"/>"#
                ));
                let media_path = format!("ppt/media/{file_name}");
                if !files.iter().any(|(p, _)| p == &media_path) {
                    files.push((media_path, bytes.clone()));
                }
            }
            if let Some((shape_xml, rel_id, file_name, bytes)) = &slide.layout {
                slide_rels.push_str(&format!(
                    r#"<Relationship Id="rId95" Type="{LAYOUT_REL_TYPE}" Target="../slideLayouts/slideLayout{n}.xml"/>"#
                ));
                files.push((
                    format!("ppt/slideLayouts/slideLayout{n}.xml"),
                    format!(
                        r#"<?xml version="1.0"?><p:sldLayout{TEST_NS}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shape_xml}</p:spTree></p:cSld></p:sldLayout>"#
                    )
                    .into_bytes(),
                ));
                files.push((
                    format!("ppt/slideLayouts/_rels/slideLayout{n}.xml.rels"),
                    rels_document(&format!(
                        r#"<Relationship Id="{rel_id}" Type="{IMAGE_REL_TYPE}" Target="../media/{file_name}"/>"#
                    )),
                ));
                let media_path = format!("ppt/media/{file_name}");
                if !files.iter().any(|(p, _)| p == &media_path) {
                    files.push((media_path, bytes.clone()));
                }
            }
            if let Some(notes) = &slide.notes {
                slide_rels.push_str(&format!(
                    r#"<Relationship Id="rId99" Type="{NOTES_SLIDE_REL_TYPE}" Target="../notesSlides/notesSlide{n}.xml"/>"#
                ));
                files.push((
                    format!("ppt/notesSlides/notesSlide{n}.xml"),
                    build_notes_slide_xml(notes),
                ));
                overrides.push_str(&format!(
                    r#"<Override PartName="/ppt/notesSlides/notesSlide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml"/>"#
                ));
            }
            if !slide_rels.is_empty() {
                files.push((
                    format!("ppt/slides/_rels/slide{n}.xml.rels"),
                    rels_document(&slide_rels),
                ));
            }
        }

        files.push((
            "ppt/notesMasters/notesMaster1.xml".to_string(),
            br#"<?xml version="1.0"?><p:notesMaster xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"/>"#.to_vec(),
        ));
        files.push((
            "ppt/presentation.xml".to_string(),
            format!(
                r#"<?xml version="1.0"?><p:presentation{TEST_NS}><p:sldIdLst>{sld_ids}</p:sldIdLst></p:presentation>"#
            )
            .into_bytes(),
        ));
        files.push((
            "ppt/_rels/presentation.xml.rels".to_string(),
            rels_document(&presentation_rels),
        ));
        files.push((
            "_rels/.rels".to_string(),
            rels_document(
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/>"#,
            ),
        ));
        files.push((
            "[Content_Types].xml".to_string(),
            format!(
                concat!(
                    r#"<?xml version="1.0"?>"#,
                    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                    r#"<Default Extension="png" ContentType="image/png"/>"#,
                    r#"<Default Extension="gif" ContentType="image/gif"/>"#,
                    r#"<Default Extension="jpg" ContentType="image/jpeg"/>"#,
                    "{overrides}",
                    r#"</Types>"#
                ),
                overrides = overrides
            )
            .into_bytes(),
        ));

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in &files {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}

fn rels_document(body: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{body}</Relationships>"#
    )
    .into_bytes()
}
