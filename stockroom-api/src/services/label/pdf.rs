//! Single-page PDF writer
//!
//! Emits a PDF 1.4 file with the two standard Helvetica faces, so no font
//! program is embedded.

use std::fmt::Write as _;

use super::layout::{text_width, Align, LabelLayout, Mark};

fn fmt_num(value: f32) -> String {
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Escape text for a PDF literal string in WinAnsiEncoding
///
/// Latin-1 letters become octal escapes; anything outside Latin-1 is `?`.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}

fn content_stream(layout: &LabelLayout) -> String {
    let mut ops = String::from("q\n0 g\n0 G\n");
    for mark in &layout.marks {
        match mark {
            Mark::Rect { x, y, w, h } => {
                let _ = writeln!(ops, "{} {} {} {} re f", fmt_num(*x), fmt_num(*y), fmt_num(*w), fmt_num(*h));
            }
            Mark::Rule { x1, x2, y, width } => {
                let _ = writeln!(
                    ops,
                    "{} w {} {} m {} {} l S",
                    fmt_num(*width),
                    fmt_num(*x1),
                    fmt_num(*y),
                    fmt_num(*x2),
                    fmt_num(*y)
                );
            }
            Mark::Text {
                x,
                y,
                size,
                bold,
                align,
                text,
            } => {
                let left = match align {
                    Align::Left => *x,
                    Align::Center => x - text_width(text, *size, *bold) / 2.0,
                };
                let font = if *bold { "F2" } else { "F1" };
                let _ = writeln!(
                    ops,
                    "BT /{} {} Tf {} {} Td ({}) Tj ET",
                    font,
                    fmt_num(*size),
                    fmt_num(left),
                    fmt_num(*y),
                    escape_text(text)
                );
            }
        }
    }
    ops.push_str("Q\n");
    ops
}

/// Serialize the layout as a one-page PDF
pub fn write_pdf(layout: &LabelLayout) -> Vec<u8> {
    let stream = content_stream(layout);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 5 0 R /F2 6 0 R >> >> /Contents 4 0 R >>",
            fmt_num(layout.width),
            fmt_num(layout.height)
        ),
        format!("<< /Length {} >>\nstream\n{}endstream", stream.len(), stream),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(xref, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::label::layout::{PAGE_HEIGHT, PAGE_WIDTH};

    fn sample() -> LabelLayout {
        LabelLayout {
            width: PAGE_WIDTH,
            height: PAGE_HEIGHT,
            marks: vec![
                Mark::Text {
                    x: 10.0,
                    y: 70.0,
                    size: 8.0,
                    bold: true,
                    align: Align::Left,
                    text: "Café (main)".to_string(),
                },
                Mark::Rect {
                    x: 30.0,
                    y: 13.0,
                    w: 1.2,
                    h: 22.0,
                },
            ],
        }
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(escape_text("Café"), "Caf\\351");
        assert_eq!(escape_text("€"), "?");
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(141.73), "141.73");
        assert_eq!(fmt_num(5.0), "5");
        assert_eq!(fmt_num(1.20), "1.2");
        assert_eq!(fmt_num(0.0), "0");
    }

    #[test]
    fn test_pdf_structure() {
        let pdf = write_pdf(&sample());
        let text = String::from_utf8_lossy(&pdf);
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("/MediaBox [0 0 141.73 85.04]"));
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("(Caf\\351 \\(main\\)) Tj"));
        assert!(text.contains("30 13 1.2 22 re f"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let pdf = write_pdf(&sample());
        let text = String::from_utf8_lossy(&pdf).to_string();
        let xref_at: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(pdf[xref_at..].starts_with(b"xref"));

        // Everything after the binary comment line is ASCII
        let tail = std::str::from_utf8(&pdf[xref_at..]).unwrap();
        let entries: Vec<usize> = tail
            .lines()
            .skip(3)
            .take(6)
            .map(|line| line[..10].parse().unwrap())
            .collect();
        for (i, offset) in entries.iter().enumerate() {
            let expected = format!("{} 0 obj", i + 1);
            assert!(pdf[*offset..].starts_with(expected.as_bytes()));
        }
    }
}
