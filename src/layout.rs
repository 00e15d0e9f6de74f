//! Page layout for one store section
//!
//! Produces a renderer-agnostic description of a store's page content:
//! header, spacer, overall row, spacer, product grid. All measures are PDF
//! points.

use crate::model::{LabeledImage, StoreRecord};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const POINTS_PER_INCH: f32 = 72.0;
pub const POINTS_PER_CM: f32 = POINTS_PER_INCH / 2.54;

pub const OVERALL_COLUMNS: usize = 2;
pub const PRODUCT_COLUMNS: usize = 3;

pub const MISSING_IMAGE_TEXT: &str = "[No Image Available]";
pub const IMAGE_ERROR_TEXT: &str = "[Image Error]";

/// Maximum bounding box for an image cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBox {
    pub width: f32,
    pub height: f32,
}

impl CellBox {
    pub fn from_cm(width_cm: f32, height_cm: f32) -> Self {
        Self {
            width: width_cm * POINTS_PER_CM,
            height: height_cm * POINTS_PER_CM,
        }
    }
}

/// Fixed layout constants, passed in rather than read from globals
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSettings {
    pub overall_box: CellBox,
    pub product_box: CellBox,
    /// Extra column width around each overall image
    pub overall_gutter: f32,
    /// Extra column width and row height around each product image
    pub product_gutter: f32,
    pub header_spacing: f32,
    pub block_spacing: f32,
    pub title_size: f32,
    pub details_size: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            overall_box: CellBox::from_cm(9.44, 7.07),
            product_box: CellBox::from_cm(5.77, 7.70),
            overall_gutter: 0.2 * POINTS_PER_INCH,
            product_gutter: 0.15 * POINTS_PER_INCH,
            header_spacing: 20.0,
            block_spacing: 25.0,
            title_size: 20.0,
            details_size: 10.0,
        }
    }
}

/// Scale `(width, height)` uniformly to fit inside `bounds`.
///
/// Returns `None` for degenerate sizes.
pub fn scale_to_fit(width: u32, height: u32, bounds: CellBox) -> Option<(f32, f32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let (w, h) = (width as f32, height as f32);
    let scale = (bounds.width / w).min(bounds.height / h);
    Some((w * scale, h * scale))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Image {
        path: PathBuf,
        width: f32,
        height: f32,
    },
    /// Italic text standing in for an image that could not be shown
    Text(String),
    Empty,
}

impl Cell {
    pub fn image_path(&self) -> Option<&Path> {
        match self {
            Cell::Image { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    Overall,
    Products,
}

/// A fixed-width table of cells; every row has `columns` cells
#[derive(Debug, Clone, PartialEq)]
pub struct GridBlock {
    pub kind: GridKind,
    pub columns: usize,
    pub column_width: f32,
    pub row_height: f32,
    /// Inset of cell content from the top and left of its cell
    pub padding: f32,
    pub rows: Vec<Vec<Cell>>,
}

impl GridBlock {
    pub fn width(&self) -> f32 {
        self.column_width * self.columns as f32
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    /// `(label, value)` pairs rendered on one line
    pub details: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageElement {
    Header(Header),
    Spacer(f32),
    Grid(GridBlock),
}

/// Everything rendered for one store, in order
#[derive(Debug, Clone, PartialEq)]
pub struct PageSection {
    pub store_name: String,
    pub elements: Vec<PageElement>,
}

impl PageSection {
    pub fn header(&self) -> Option<&Header> {
        self.elements.iter().find_map(|element| match element {
            PageElement::Header(header) => Some(header),
            _ => None,
        })
    }

    fn grid(&self, kind: GridKind) -> Option<&GridBlock> {
        self.elements.iter().find_map(|element| match element {
            PageElement::Grid(grid) if grid.kind == kind => Some(grid),
            _ => None,
        })
    }

    pub fn overall_row(&self) -> Option<&GridBlock> {
        self.grid(GridKind::Overall)
    }

    pub fn product_grid(&self) -> Option<&GridBlock> {
        self.grid(GridKind::Products)
    }
}

pub struct LayoutEngine {
    settings: LayoutSettings,
}

impl LayoutEngine {
    pub fn new(settings: LayoutSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    /// Lay out one store. `products` must already be in label order.
    pub fn layout_store(
        &self,
        record: &StoreRecord,
        overall: &[PathBuf],
        products: &[LabeledImage],
    ) -> PageSection {
        let meta = &record.metadata;
        let header = Header {
            title: format!("STORE: {}", meta.store_name),
            details: vec![
                ("Name".to_string(), meta.name.clone()),
                ("Phone".to_string(), meta.phone.clone()),
                ("Date".to_string(), meta.date.clone()),
            ],
        };

        let elements = vec![
            PageElement::Header(header),
            PageElement::Spacer(self.settings.header_spacing),
            PageElement::Grid(self.overall_row(overall)),
            PageElement::Spacer(self.settings.block_spacing),
            PageElement::Grid(self.product_grid(products)),
        ];

        PageSection {
            store_name: meta.store_name.clone(),
            elements,
        }
    }

    /// Always exactly two cells; surplus images are ignored
    fn overall_row(&self, overall: &[PathBuf]) -> GridBlock {
        let bounds = self.settings.overall_box;
        let row = (0..OVERALL_COLUMNS)
            .map(|idx| match overall.get(idx) {
                Some(path) => image_cell(path, bounds),
                None => Cell::Empty,
            })
            .collect();
        GridBlock {
            kind: GridKind::Overall,
            columns: OVERALL_COLUMNS,
            column_width: bounds.width + self.settings.overall_gutter,
            row_height: bounds.height + self.settings.overall_gutter,
            padding: self.settings.overall_gutter / 2.0,
            rows: vec![row],
        }
    }

    fn product_grid(&self, products: &[LabeledImage]) -> GridBlock {
        let bounds = self.settings.product_box;
        let rows = products
            .chunks(PRODUCT_COLUMNS)
            .map(|chunk| {
                let mut row: Vec<Cell> = chunk
                    .iter()
                    .map(|product| image_cell(&product.path, bounds))
                    .collect();
                row.resize(PRODUCT_COLUMNS, Cell::Empty);
                row
            })
            .collect();
        GridBlock {
            kind: GridKind::Products,
            columns: PRODUCT_COLUMNS,
            column_width: bounds.width + self.settings.product_gutter,
            row_height: bounds.height + self.settings.product_gutter,
            padding: self.settings.product_gutter / 2.0,
            rows,
        }
    }
}

/// Image cell scaled into `bounds`, or a text cell if it cannot be read
pub fn image_cell(path: &Path, bounds: CellBox) -> Cell {
    if !path.exists() {
        return Cell::Text(MISSING_IMAGE_TEXT.to_string());
    }
    let dimensions = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.into_dimensions());
    match dimensions {
        Ok((width, height)) => match scale_to_fit(width, height, bounds) {
            Some((width, height)) => Cell::Image {
                path: path.to_path_buf(),
                width,
                height,
            },
            None => Cell::Text(IMAGE_ERROR_TEXT.to_string()),
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read image for layout");
            Cell::Text(IMAGE_ERROR_TEXT.to_string())
        }
    }
}
