//! Printable setlist (A4 PDF)

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};
use setlist_common::db::models::SetlistDetail;
use setlist_common::{Error, Result};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const LAYER_NAME: &str = "Setlist";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    SetHeading,
    Song,
}

impl LineStyle {
    fn font_size(self) -> f32 {
        match self {
            LineStyle::Title => 22.0,
            LineStyle::SetHeading => 15.0,
            LineStyle::Song => 11.0,
        }
    }

    /// Vertical space the line takes, including the gap above it
    fn advance_mm(self) -> f32 {
        match self {
            LineStyle::Title => 14.0,
            LineStyle::SetHeading => 11.0,
            LineStyle::Song => 6.5,
        }
    }

    fn indent_mm(self) -> f32 {
        match self {
            LineStyle::Song => 6.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub style: LineStyle,
    pub text: String,
}

/// Text lines of the printout, top to bottom
pub fn layout_lines(detail: &SetlistDetail) -> Vec<Line> {
    let mut lines = vec![Line {
        style: LineStyle::Title,
        text: detail.setlist.name.clone(),
    }];

    for set in &detail.sets {
        lines.push(Line {
            style: LineStyle::SetHeading,
            text: format!("{} ({} songs)", set.set.name, set.songs.len()),
        });
        for (i, song) in set.songs.iter().enumerate() {
            let mut text = format!("{}. {} - {}", i + 1, song.title, song.original_artist);
            if let Some(key) = &song.key_signature {
                text.push_str(&format!("  [{}]", key));
            }
            if let Some(tempo) = song.tempo {
                text.push_str(&format!("  {} BPM", tempo));
            }
            lines.push(Line {
                style: LineStyle::Song,
                text,
            });
        }
    }

    lines
}

/// Split lines into pages, giving each its baseline in mm from the page bottom
pub fn paginate(lines: Vec<Line>) -> Vec<Vec<(Line, f32)>> {
    let mut pages = vec![Vec::new()];
    let mut y = PAGE_HEIGHT_MM - MARGIN_MM;

    for line in lines {
        let advance = line.style.advance_mm();
        if y - advance < MARGIN_MM {
            pages.push(Vec::new());
            y = PAGE_HEIGHT_MM - MARGIN_MM;
        }
        y -= advance;
        if let Some(page) = pages.last_mut() {
            page.push((line, y));
        }
    }

    pages
}

fn pdf_error(e: printpdf::Error) -> Error {
    Error::Internal(format!("PDF rendering failed: {}", e))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> Result<Self> {
        Ok(Self {
            regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?,
            bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?,
        })
    }

    fn for_style(&self, style: LineStyle) -> &IndirectFontRef {
        match style {
            LineStyle::Song => &self.regular,
            _ => &self.bold,
        }
    }
}

/// Render a setlist to PDF bytes
pub fn render_setlist_pdf(detail: &SetlistDetail) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        detail.setlist.name.as_str(),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        LAYER_NAME,
    );
    let fonts = Fonts::load(&doc)?;

    for (index, page_lines) in paginate(layout_lines(detail)).into_iter().enumerate() {
        let (page, layer) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME)
        };
        let layer = doc.get_page(page).get_layer(layer);

        for (line, y) in page_lines {
            layer.use_text(
                line.text.as_str(),
                line.style.font_size(),
                Mm(MARGIN_MM + line.style.indent_mm()),
                Mm(y),
                fonts.for_style(line.style),
            );
        }
    }

    doc.save_to_bytes().map_err(pdf_error)
}
