//! Label preview rasterizer and PNG encoder
//!
//! Draws the same marks as the PDF into an 8-bit grayscale canvas. Text uses
//! the built-in bitmap glyphs. The PNG uses stored (uncompressed) deflate
//! blocks; previews are small enough that this does not matter.

use super::font::{glyph, ADVANCE, GLYPH_COLS, GLYPH_ROWS};
use super::layout::{Align, LabelLayout, Mark};

/// Preview pixels per PDF point
pub const PREVIEW_SCALE: f32 = 3.0;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
const MAX_STORED_BLOCK: usize = 65_535;
const BLACK: u8 = 0;
const WHITE: u8 = 255;

/// Grayscale canvas, row-major, top row first
#[derive(Debug, Clone)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![WHITE; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Paint `[x0, x1) x [y0, y1)` black, clipped to the canvas
    pub fn fill(&mut self, x0: i64, y0: i64, x1: i64, y1: i64) {
        let x0 = x0.clamp(0, i64::from(self.width)) as usize;
        let x1 = x1.clamp(0, i64::from(self.width)) as usize;
        let y0 = y0.clamp(0, i64::from(self.height)) as usize;
        let y1 = y1.clamp(0, i64::from(self.height)) as usize;
        let stride = self.width as usize;
        for y in y0..y1 {
            self.pixels[y * stride + x0..y * stride + x1.max(x0)].fill(BLACK);
        }
    }

    /// Encode as an 8-bit grayscale PNG
    pub fn encode_png(&self) -> Vec<u8> {
        let stride = self.width as usize;
        let mut scanlines = Vec::with_capacity((stride + 1) * self.height as usize);
        for row in self.pixels.chunks(stride.max(1)) {
            scanlines.push(0); // filter: none
            scanlines.extend_from_slice(row);
        }

        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&self.width.to_be_bytes());
        ihdr.extend_from_slice(&self.height.to_be_bytes());
        // bit depth 8, grayscale, deflate, adaptive filtering, no interlace
        ihdr.extend_from_slice(&[8, 0, 0, 0, 0]);

        let mut png = PNG_SIGNATURE.to_vec();
        write_chunk(&mut png, b"IHDR", &ihdr);
        write_chunk(&mut png, b"IDAT", &zlib_stored(&scanlines));
        write_chunk(&mut png, b"IEND", &[]);
        png
    }
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Adler-32 checksum of `data`
pub fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    let (mut a, mut b) = (1u32, 0u32);
    for chunk in data.chunks(5_552) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

/// Wrap `data` in a zlib stream of stored deflate blocks
fn zlib_stored(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_STORED_BLOCK * 5 + 11);
    out.extend_from_slice(&[0x78, 0x01]);

    let mut blocks = data.chunks(MAX_STORED_BLOCK).peekable();
    if blocks.peek().is_none() {
        out.extend_from_slice(&[0x01, 0x00, 0x00, 0xFF, 0xFF]);
    }
    while let Some(block) = blocks.next() {
        let last = blocks.peek().is_none();
        let len = block.len() as u16;
        out.push(u8::from(last));
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(block);
    }

    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

// ========================================
// Rasterization
// ========================================

fn px(value: f32, scale: f32) -> i64 {
    (value * scale).round() as i64
}

/// Page geometry shared by every mark
#[derive(Debug, Clone, Copy)]
struct Pen {
    page_height: f32,
    scale: f32,
}

fn draw_text(raster: &mut Raster, pen: Pen, (x, baseline): (f32, f32), size: f32, align: Align, text: &str) {
    let scale = pen.scale;
    // Cap height of Helvetica is about 0.72 em
    let unit = ((size * 0.72 * scale) / GLYPH_ROWS as f32).round().max(1.0) as i64;
    let width = (text.chars().count() * ADVANCE) as i64 * unit;

    let left = match align {
        Align::Left => px(x, scale),
        Align::Center => px(x, scale) - width / 2,
    };
    let bottom = px(pen.page_height - baseline, scale);
    let top = bottom - GLYPH_ROWS as i64 * unit;

    for (index, c) in text.chars().enumerate() {
        let origin = left + (index * ADVANCE) as i64 * unit;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (1 << (GLYPH_COLS - 1 - col)) != 0 {
                    let x0 = origin + col as i64 * unit;
                    let y0 = top + row as i64 * unit;
                    raster.fill(x0, y0, x0 + unit, y0 + unit);
                }
            }
        }
    }
}

/// Rasterize the layout at `scale` pixels per point
pub fn rasterize(layout: &LabelLayout, scale: f32) -> Raster {
    let width = (layout.width * scale).ceil() as u32;
    let height = (layout.height * scale).ceil() as u32;
    let mut raster = Raster::new(width, height);
    let pen = Pen {
        page_height: layout.height,
        scale,
    };

    for mark in &layout.marks {
        match mark {
            Mark::Rect { x, y, w, h } => {
                raster.fill(
                    px(*x, scale),
                    px(layout.height - (y + h), scale),
                    px(x + w, scale),
                    px(layout.height - y, scale),
                );
            }
            Mark::Rule { x1, x2, y, width } => {
                let thickness = px(*width, scale).max(1);
                let top = px(layout.height - y, scale) - thickness / 2;
                raster.fill(px(*x1, scale), top, px(*x2, scale), top + thickness);
            }
            Mark::Text {
                x,
                y,
                size,
                align,
                text,
                ..
            } => draw_text(&mut raster, pen, (*x, *y), *size, *align, text),
        }
    }
    raster
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adler32_known_value() {
        // Reference value for "Wikipedia"
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
        assert_eq!(adler32(b""), 1);
    }

    #[test]
    fn test_png_layout() {
        let mut raster = Raster::new(4, 3);
        raster.fill(1, 1, 3, 2);
        let png = raster.encode_png();

        assert_eq!(&png[..8], &PNG_SIGNATURE);
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 4);
        assert_eq!(u32::from_be_bytes([png[20], png[21], png[22], png[23]]), 3);
        assert_eq!(png[24], 8);
        assert_eq!(png[25], 0);
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }

    #[test]
    fn test_ihdr_crc() {
        let png = Raster::new(2, 2).encode_png();
        let crc = u32::from_be_bytes([png[29], png[30], png[31], png[32]]);
        assert_eq!(crc, crc32fast::hash(&png[12..29]));
    }

    #[test]
    fn test_zlib_stored_blocks() {
        let data = vec![7u8; MAX_STORED_BLOCK + 10];
        let z = zlib_stored(&data);
        assert_eq!(&z[..2], &[0x78, 0x01]);
        // first block is not final and full length
        assert_eq!(z[2], 0);
        assert_eq!(u16::from_le_bytes([z[3], z[4]]) as usize, MAX_STORED_BLOCK);
        // second block header follows the first block payload
        let second = 2 + 5 + MAX_STORED_BLOCK;
        assert_eq!(z[second], 1);
        assert_eq!(u16::from_le_bytes([z[second + 1], z[second + 2]]), 10);
        assert_eq!(z.len(), 2 + 5 + MAX_STORED_BLOCK + 5 + 10 + 4);
    }

    #[test]
    fn test_fill_is_clipped() {
        let mut raster = Raster::new(3, 3);
        raster.fill(-5, -5, 1, 1);
        raster.fill(2, 2, 10, 10);
        assert_eq!(raster.pixel(0, 0), BLACK);
        assert_eq!(raster.pixel(1, 1), WHITE);
        assert_eq!(raster.pixel(2, 2), BLACK);
    }

    #[test]
    fn test_rasterize_rect_flips_y() {
        let layout = LabelLayout {
            width: 10.0,
            height: 10.0,
            marks: vec![Mark::Rect {
                x: 0.0,
                y: 0.0,
                w: 2.0,
                h: 2.0,
            }],
        };
        let raster = rasterize(&layout, 1.0);
        // bottom-left in PDF space is the last rows in raster space
        assert_eq!(raster.pixel(0, 9), BLACK);
        assert_eq!(raster.pixel(0, 0), WHITE);
    }
}
