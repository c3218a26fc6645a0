//! Label page layout
//!
//! One 50 x 30 mm page described as drawing marks in PDF user space
//! (points, origin bottom-left). The PDF writer and the PNG rasterizer both
//! consume the same marks.

use stockroom_common::ean::format_ean8;
use stockroom_common::Result;

use super::barcode::Ean8Pattern;
use super::LabelContent;

/// 50 mm in points
pub const PAGE_WIDTH: f32 = 141.73;

/// 30 mm in points
pub const PAGE_HEIGHT: f32 = 85.04;

const MARGIN: f32 = 5.0;
const HEADER_SIZE: f32 = 8.0;
const BODY_SIZE: f32 = 6.5;
const QUANTITY_SIZE: f32 = 7.0;
const DIGITS_SIZE: f32 = 6.0;
const MAX_DESCRIPTION_LINES: usize = 2;

const MODULE_WIDTH: f32 = 1.2;
const BAR_BOTTOM: f32 = 13.0;
const BAR_TOP: f32 = 35.0;
const GUARD_EXTENSION: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// One drawing instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    /// Text with its baseline at `y`; `x` is the left edge or the centre
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        align: Align,
        text: String,
    },
    /// Filled rectangle
    Rect { x: f32, y: f32, w: f32, h: f32 },
    /// Horizontal rule
    Rule { x1: f32, x2: f32, y: f32, width: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelLayout {
    pub width: f32,
    pub height: f32,
    pub marks: Vec<Mark>,
}

/// Approximate Helvetica advance width in 1/1000 em
pub fn helvetica_width(c: char, bold: bool) -> u32 {
    let regular = match c {
        'i' | 'j' | 'l' | '\'' | '|' => 222,
        ' ' | '.' | ',' | ':' | ';' | '!' | 'I' | 'f' | 't' | '/' => 278,
        'r' | '(' | ')' | '-' => 333,
        'm' | 'M' => 833,
        'w' => 722,
        'W' => 944,
        '%' => 889,
        '0'..='9' | 'a'..='z' => 556,
        'A'..='Z' => 667,
        _ => 611,
    };
    if bold {
        regular + regular / 20
    } else {
        regular
    }
}

/// Estimated text width in points
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let units: u32 = text.chars().map(|c| helvetica_width(c, bold)).sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap; the last kept line is ellipsized when text remains
pub fn wrap(text: &str, size: f32, max_width: f32, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(&candidate, size, false) <= max_width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    for line in lines.iter_mut() {
        *line = truncate_to_width(line, size, max_width, false);
    }
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            *last = truncate_to_width(&format!("{}...", last), size, max_width, true);
        }
    }
    lines
}

fn truncate_to_width(text: &str, size: f32, max_width: f32, force_ellipsis: bool) -> String {
    if !force_ellipsis && text_width(text, size, false) <= max_width {
        return text.to_string();
    }
    let base = text.trim_end_matches("...");
    let mut kept: String = base.to_string();
    while !kept.is_empty() && text_width(&format!("{}...", kept), size, false) > max_width {
        kept.pop();
    }
    format!("{}...", kept.trim_end())
}

/// Quantity without a trailing `.0`
pub fn format_quantity(quantity: f64) -> String {
    let rounded = (quantity * 1000.0).round() / 1000.0;
    format!("{}", rounded)
}

/// Lay out the label for `content`
pub fn compose(content: &LabelContent) -> Result<LabelLayout> {
    let pattern = Ean8Pattern::encode(&content.ean_8)?;
    let inner_width = PAGE_WIDTH - 2.0 * MARGIN;
    let centre = PAGE_WIDTH / 2.0;
    let mut marks = Vec::new();

    // Header
    let header_y = PAGE_HEIGHT - MARGIN - HEADER_SIZE;
    marks.push(Mark::Text {
        x: centre,
        y: header_y,
        size: HEADER_SIZE,
        bold: true,
        align: Align::Center,
        text: truncate_to_width(content.store_name.trim(), HEADER_SIZE, inner_width, false),
    });
    marks.push(Mark::Rule {
        x1: MARGIN,
        x2: PAGE_WIDTH - MARGIN,
        y: header_y - 3.0,
        width: 0.5,
    });

    // Item description
    let mut y = header_y - 3.0 - BODY_SIZE - 2.0;
    for line in wrap(&content.item_description, BODY_SIZE, inner_width, MAX_DESCRIPTION_LINES) {
        marks.push(Mark::Text {
            x: MARGIN,
            y,
            size: BODY_SIZE,
            bold: false,
            align: Align::Left,
            text: line,
        });
        y -= BODY_SIZE + 1.5;
    }

    // Packaging and quantity
    let quantity_line = format!(
        "{} - {} {}",
        content.packaging_description.trim(),
        format_quantity(content.quantity),
        content.unit.trim()
    );
    marks.push(Mark::Text {
        x: centre,
        y: BAR_TOP + 3.0,
        size: QUANTITY_SIZE,
        bold: true,
        align: Align::Center,
        text: truncate_to_width(&quantity_line, QUANTITY_SIZE, inner_width, false),
    });

    // Barcode
    let symbol_width = pattern.modules().len() as f32 * MODULE_WIDTH;
    let left = (PAGE_WIDTH - symbol_width) / 2.0;
    for (start, width, guard) in pattern.bars() {
        let bottom = if guard { BAR_BOTTOM - GUARD_EXTENSION } else { BAR_BOTTOM };
        marks.push(Mark::Rect {
            x: left + start as f32 * MODULE_WIDTH,
            y: bottom,
            w: width as f32 * MODULE_WIDTH,
            h: BAR_TOP - bottom,
        });
    }

    // Human-readable digits
    marks.push(Mark::Text {
        x: centre,
        y: BAR_BOTTOM - GUARD_EXTENSION - DIGITS_SIZE + 1.0,
        size: DIGITS_SIZE,
        bold: false,
        align: Align::Center,
        text: format_ean8(&content.ean_8),
    });

    Ok(LabelLayout {
        width: PAGE_WIDTH,
        height: PAGE_HEIGHT,
        marks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(description: &str) -> LabelContent {
        LabelContent {
            store_name: "Main Store".to_string(),
            item_description: description.to_string(),
            packaging_description: "Bag".to_string(),
            quantity: 5.0,
            unit: "kg".to_string(),
            ean_8: "96385074".to_string(),
        }
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(5.0), "5");
        assert_eq!(format_quantity(0.5), "0.5");
        assert_eq!(format_quantity(1.0 / 3.0), "0.333");
    }

    #[test]
    fn test_wrap_short_text_single_line() {
        assert_eq!(wrap("Rice", BODY_SIZE, 100.0, 2), vec!["Rice".to_string()]);
    }

    #[test]
    fn test_wrap_limits_lines() {
        let long = "Extra long grain parboiled rice premium quality selected grains from the valley";
        let lines = wrap(long, BODY_SIZE, 60.0, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("..."));
        for line in &lines {
            assert!(text_width(line, BODY_SIZE, false) <= 60.0, "{}", line);
        }
    }

    #[test]
    fn test_compose_contains_all_parts() {
        let layout = compose(&content("Rice")).unwrap();
        let texts: Vec<&str> = layout
            .marks
            .iter()
            .filter_map(|m| match m {
                Mark::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(texts.contains(&"Main Store"));
        assert!(texts.contains(&"Rice"));
        assert!(texts.contains(&"Bag - 5 kg"));
        assert!(texts.contains(&"9638 5074"));
        assert!(layout.marks.iter().any(|m| matches!(m, Mark::Rule { .. })));
    }

    #[test]
    fn test_barcode_inside_page() {
        let layout = compose(&content("Rice")).unwrap();
        for mark in &layout.marks {
            if let Mark::Rect { x, y, w, h } = mark {
                assert!(*x >= 0.0 && x + w <= PAGE_WIDTH);
                assert!(*y >= 0.0 && y + h <= PAGE_HEIGHT);
            }
        }
    }

    #[test]
    fn test_invalid_ean_rejected() {
        let mut c = content("Rice");
        c.ean_8 = "12345678".to_string();
        assert!(compose(&c).is_err());
    }
}
