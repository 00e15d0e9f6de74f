//! Page writer on top of the lopdf object model
//!
//! Flows [`PageSection`] elements top to bottom on A4 pages. A grid row
//! that no longer fits the remaining frame height moves to a fresh page;
//! explicit breaks between stores come from [`PdfWriter::page_break`].

use crate::layout::{
    Cell, CellBox, GridBlock, Header, IMAGE_ERROR_TEXT, LayoutSettings, PageElement, PageSection,
};
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const A4_WIDTH: f32 = 595.276;
pub const A4_HEIGHT: f32 = 841.89;
/// Half an inch on every side
pub const MARGIN: f32 = 36.0;
const FRAME_WIDTH: f32 = A4_WIDTH - 2.0 * MARGIN;
const FRAME_TOP: f32 = A4_HEIGHT - MARGIN;

/// Embedded images are downsampled to this resolution at the largest cell size
const MAX_IMAGE_DPI: f32 = 200.0;

const FONT_REGULAR: &str = "F1";
const FONT_BOLD: &str = "F2";
const FONT_ITALIC: &str = "F3";

const LEADING_RATIO: f32 = 1.1;
const TITLE_SPACE_AFTER: f32 = 8.0;
const NOTE_SIZE: f32 = 10.0;
const DETAILS_GAP: &str = "    ";
const DETAILS_GRAY: f32 = 0.2;

#[derive(Debug, Clone)]
struct EmbeddedImage {
    name: String,
    id: ObjectId,
}

pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    settings: LayoutSettings,
    page_ids: Vec<ObjectId>,
    operations: Vec<Operation>,
    cursor: f32,
    has_content: bool,
    // Failed loads are cached as None so each path is decoded at most once
    images: HashMap<PathBuf, Option<EmbeddedImage>>,
    /// Largest placement any image can get; one XObject serves every cell
    image_envelope: CellBox,
}

impl PdfWriter {
    pub fn new(settings: LayoutSettings) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_envelope = CellBox {
            width: settings.overall_box.width.max(settings.product_box.width),
            height: settings.overall_box.height.max(settings.product_box.height),
        };
        Self {
            doc,
            pages_id,
            settings,
            page_ids: Vec::new(),
            operations: Vec::new(),
            cursor: FRAME_TOP,
            has_content: false,
            images: HashMap::new(),
            image_envelope,
        }
    }

    pub fn write_section(&mut self, section: &PageSection) -> Result<()> {
        debug!(store = %section.store_name, "writing section");
        for element in &section.elements {
            match element {
                PageElement::Header(header) => self.write_header(header)?,
                PageElement::Spacer(height) => {
                    self.cursor = (self.cursor - height).max(MARGIN);
                }
                PageElement::Grid(grid) => self.write_grid(grid)?,
            }
        }
        Ok(())
    }

    /// Start a new page unless the current one is still blank
    pub fn page_break(&mut self) -> Result<()> {
        if self.has_content {
            self.flush_page()?;
        }
        Ok(())
    }

    /// Assemble the catalog and write the file; returns the page count
    pub fn finish(mut self, title: &str, path: &Path) -> Result<usize> {
        if self.has_content || self.page_ids.is_empty() {
            self.flush_page()?;
        }

        let font_regular = self.add_font("Helvetica");
        let font_bold = self.add_font("Helvetica-Bold");
        let font_italic = self.add_font("Helvetica-Oblique");
        let mut xobjects = Dictionary::new();
        for image in self.images.values().flatten() {
            xobjects.set(image.name.as_bytes().to_vec(), image.id);
        }
        let resources_id = self.doc.add_object(dictionary! {
            "Font" => dictionary! {
                FONT_REGULAR => font_regular,
                FONT_BOLD => font_bold,
                FONT_ITALIC => font_italic,
            },
            "XObject" => xobjects,
        });

        let page_count = self.page_ids.len();
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::from(*id)).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
            "MediaBox" => vec![0.into(), 0.into(), A4_WIDTH.into(), A4_HEIGHT.into()],
            "Resources" => resources_id,
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal(encode_text(title)),
            "Producer" => Object::string_literal("quality-report"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        self.doc.compress();
        self.doc
            .save(path)
            .with_context(|| format!("failed to save {:?}", path))?;
        Ok(page_count)
    }

    fn add_font(&mut self, base_font: &str) -> ObjectId {
        self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
            "Encoding" => "WinAnsiEncoding",
        })
    }

    fn flush_page(&mut self) -> Result<()> {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let bytes = content.encode().context("failed to encode page content")?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, bytes));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
        });
        self.page_ids.push(page_id);
        self.cursor = FRAME_TOP;
        self.has_content = false;
        Ok(())
    }

    fn ensure_space(&mut self, height: f32) -> Result<()> {
        if self.has_content && self.cursor - height < MARGIN {
            self.flush_page()?;
        }
        Ok(())
    }

    fn write_header(&mut self, header: &Header) -> Result<()> {
        let title_size = self.settings.title_size;
        let details_size = self.settings.details_size;
        let title_height = title_size * LEADING_RATIO + TITLE_SPACE_AFTER;
        let details_height = details_size * LEADING_RATIO;
        self.ensure_space(title_height + details_height)?;

        let title_baseline = self.cursor - title_size;
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![FONT_BOLD.into(), title_size.into()]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
            Operation::new("Td", vec![MARGIN.into(), title_baseline.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_text(&header.title))]),
            Operation::new("ET", vec![]),
        ]);

        let details_baseline = self.cursor - title_height - details_size;
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "rg",
                vec![DETAILS_GRAY.into(), DETAILS_GRAY.into(), DETAILS_GRAY.into()],
            ),
            Operation::new("Td", vec![MARGIN.into(), details_baseline.into()]),
        ]);
        for (idx, (label, value)) in header.details.iter().enumerate() {
            let gap = if idx == 0 { "" } else { DETAILS_GAP };
            self.operations.extend([
                Operation::new("Tf", vec![FONT_BOLD.into(), details_size.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(encode_text(&format!("{gap}{label}: ")))],
                ),
                Operation::new("Tf", vec![FONT_REGULAR.into(), details_size.into()]),
                Operation::new("Tj", vec![Object::string_literal(encode_text(value))]),
            ]);
        }
        self.operations.push(Operation::new("ET", vec![]));

        self.cursor -= title_height + details_height;
        self.has_content = true;
        Ok(())
    }

    fn write_grid(&mut self, grid: &GridBlock) -> Result<()> {
        let left = MARGIN + (FRAME_WIDTH - grid.width()) / 2.0;
        for row in &grid.rows {
            self.ensure_space(grid.row_height)?;
            let top = self.cursor;
            for (column, cell) in row.iter().enumerate() {
                let cell_left = left + column as f32 * grid.column_width;
                match cell {
                    Cell::Image {
                        path,
                        width,
                        height,
                    } => {
                        let x = cell_left + (grid.column_width - width) / 2.0;
                        let y = top - grid.padding - height;
                        match self.embed_image(path) {
                            Some(name) => self.draw_image(&name, x, y, *width, *height),
                            None => self.draw_note(
                                IMAGE_ERROR_TEXT,
                                cell_left + grid.padding,
                                top - grid.padding - NOTE_SIZE,
                            ),
                        }
                    }
                    Cell::Text(text) => self.draw_note(
                        text,
                        cell_left + grid.padding,
                        top - grid.padding - NOTE_SIZE,
                    ),
                    Cell::Empty => {}
                }
            }
            self.cursor -= grid.row_height;
            self.has_content = true;
        }
        Ok(())
    }

    fn draw_image(&mut self, name: &str, x: f32, y: f32, width: f32, height: f32) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn draw_note(&mut self, text: &str, x: f32, baseline: f32) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![FONT_ITALIC.into(), NOTE_SIZE.into()]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
            Operation::new("Td", vec![x.into(), baseline.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_text(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    /// XObject name for `path`, embedding it on first use
    fn embed_image(&mut self, path: &Path) -> Option<String> {
        if let Some(cached) = self.images.get(path) {
            return cached.as_ref().map(|image| image.name.clone());
        }
        let CellBox { width, height } = self.image_envelope;
        let embedded = match encode_image(path, width, height) {
            Ok(stream) => {
                let id = self.doc.add_object(stream);
                let name = format!("Im{}", self.images.len() + 1);
                Some(EmbeddedImage { name, id })
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to embed image");
                None
            }
        };
        let name = embedded.as_ref().map(|image| image.name.clone());
        self.images.insert(path.to_path_buf(), embedded);
        name
    }
}

/// Decode, downsample and Flate-compress an image as a DeviceRGB XObject
fn encode_image(path: &Path, width: f32, height: f32) -> Result<Stream> {
    let decoded = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("failed to decode {:?}", path))?;

    let max_w = ((width / 72.0) * MAX_IMAGE_DPI).ceil().max(1.0) as u32;
    let max_h = ((height / 72.0) * MAX_IMAGE_DPI).ceil().max(1.0) as u32;
    let decoded = if decoded.width() > max_w || decoded.height() > max_h {
        decoded.resize(max_w, max_h, FilterType::Triangle)
    } else {
        decoded
    };
    let rgb = flatten_on_white(&decoded);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(rgb.as_raw())?;
    let compressed = encoder.finish()?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => rgb.width() as i64,
        "Height" => rgb.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    Ok(Stream::new(dict, compressed).with_compression(false))
}

/// Drop alpha by compositing over a white page
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// WinAnsi bytes for base-14 fonts; characters outside Latin-1 become `?`
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            code @ 0x20..=0x7e | code @ 0xa0..=0xff => code as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_encode_text_maps_latin1_and_replaces_the_rest() {
        assert_eq!(encode_text("Caf\u{e9} 5"), b"Caf\xe9 5".to_vec());
        assert_eq!(encode_text("\u{2013}\u{1f34e}"), b"??".to_vec());
    }

    #[test]
    fn test_flatten_on_white_blends_transparency() {
        let mut rgba = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let rgb = flatten_on_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_shared_image_keeps_resolution_for_the_larger_cell() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("big.png");
        RgbImage::from_pixel(2000, 1500, image::Rgb([90, 90, 90]))
            .save(&path)
            .expect("write image");

        let mut writer = PdfWriter::new(LayoutSettings::default());
        assert!(writer.embed_image(&path).is_some());
        let id = writer.images[&path].as_ref().expect("embedded").id;
        let width = writer
            .doc
            .get_object(id)
            .and_then(Object::as_stream)
            .and_then(|stream| stream.dict.get(b"Width"))
            .and_then(Object::as_i64)
            .expect("image width");
        // Product cells alone would allow at most 455 px
        assert!(width > 455, "width {width}");
        assert!(width <= 744, "width {width}");
    }

    #[test]
    fn test_empty_writer_still_produces_one_page() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("empty.pdf");
        let pages = PdfWriter::new(LayoutSettings::default())
            .finish("empty", &path)
            .expect("finish");
        assert_eq!(pages, 1);
        let loaded = Document::load(&path).expect("load");
        assert_eq!(loaded.get_pages().len(), 1);
    }
}
