//! Plain-text inputs (`txt`, `csv`): fixed-pitch lines on fixed pages.
//!
//! The file is decoded leniently (invalid UTF-8 becomes U+FFFD, then `?`),
//! split on line breaks, and laid out top to bottom in built-in Courier. No
//! wrapping: a long line simply runs past the right edge. An empty file
//! still produces one blank page.

use crate::config::TextLayout;
use crate::error::{ConversionError, ConversionPhase};
use crate::pipeline::write_atomically;
use printpdf::{BuiltinFont, Mm, PdfDocument, Pt};
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

const TAB_WIDTH: usize = 4;

/// Convert the text file at `source` into a PDF at `dest`; returns the page count.
pub fn paginate(source: &Path, dest: &Path, layout: &TextLayout) -> Result<usize, ConversionError> {
    let raw = std::fs::read(source)
        .map_err(|e| ConversionError::io(ConversionPhase::TextRender, source, e))?;
    let text = String::from_utf8_lossy(&raw);
    let lines: Vec<String> = split_lines(&text).into_iter().map(printable_line).collect();

    let title = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());

    let (bytes, pages) = render_lines(&title, &lines, layout).map_err(|detail| {
        ConversionError::DecodeFailure {
            phase: ConversionPhase::TextRender,
            path: source.to_path_buf(),
            detail,
        }
    })?;
    debug!(
        "Laid out {} line(s) on {} page(s) for {}",
        lines.len(),
        pages,
        source.display()
    );
    write_atomically(dest, &bytes)?;
    Ok(pages)
}

/// Split on `\r\n`, lone `\r` and `\n`; a final line break does not start a new line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text
        .split("\r\n")
        .flat_map(|s| s.split(|c| c == '\r' || c == '\n'))
        .collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// Pages needed for `line_count` lines; at least one.
pub fn page_count(line_count: usize, layout: &TextLayout) -> usize {
    line_count.div_ceil(layout.lines_per_page()).max(1)
}

/// Make one line drawable with a built-in font.
///
/// Tabs expand to the next multiple of four columns; other control characters
/// are dropped; anything outside Latin-1 is replaced with `?`.
pub fn printable_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut column = 0usize;
    for c in line.chars() {
        match c {
            '\t' => {
                let pad = TAB_WIDTH - column % TAB_WIDTH;
                out.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
            c if c.is_control() => {}
            c if (' '..='~').contains(&c) || ('\u{A0}'..='\u{FF}').contains(&c) => {
                out.push(c);
                column += 1;
            }
            _ => {
                out.push('?');
                column += 1;
            }
        }
    }
    out
}

fn render_lines(
    title: &str,
    lines: &[String],
    layout: &TextLayout,
) -> Result<(Vec<u8>, usize), String> {
    let width: Mm = Pt(layout.page_width).into();
    let height: Mm = Pt(layout.page_height).into();
    let left: Mm = Pt(layout.left_margin).into();
    let per_page = layout.lines_per_page();

    let (doc, first_page, first_layer) = PdfDocument::new(title, width, height, "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Courier)
        .map_err(|e| format!("font error: {e}"))?;

    let mut pages = 1;
    let mut layer = doc.get_page(first_page).get_layer(first_layer);

    for (i, chunk) in lines.chunks(per_page).enumerate() {
        if i > 0 {
            let (page, page_layer) = doc.add_page(width, height, "Layer 1");
            layer = doc.get_page(page).get_layer(page_layer);
            pages += 1;
        }
        for (row, line) in chunk.iter().enumerate() {
            if line.trim_end().is_empty() {
                continue;
            }
            let y: Mm = Pt(layout.baseline(row)).into();
            layer.use_text(line.as_str(), layout.font_size, left, y, &font);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| format!("PDF save error: {e}"))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| format!("PDF buffer error: {e}"))?;
    Ok((bytes, pages))
}
