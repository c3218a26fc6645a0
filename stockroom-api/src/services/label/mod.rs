//! Packaging label rendering
//!
//! A label is a 50 x 30 mm page: store name header, rule, wrapped item
//! description, packaging and quantity, EAN-8 bars and the human-readable
//! code. It ships as a PDF plus a PNG preview of the same page.

pub mod barcode;
pub mod font;
pub mod layout;
pub mod pdf;
pub mod png;

use stockroom_common::Result;

/// Everything printed on one label
#[derive(Debug, Clone, PartialEq)]
pub struct LabelContent {
    pub store_name: String,
    pub item_description: String,
    pub packaging_description: String,
    pub quantity: f64,
    pub unit: String,
    pub ean_8: String,
}

/// Rendered label artifacts
#[derive(Debug, Clone)]
pub struct RenderedLabel {
    pub pdf: Vec<u8>,
    pub png: Vec<u8>,
}

/// Turns label content into printable artifacts
pub trait LabelRenderer: Send + Sync {
    fn render(&self, content: &LabelContent) -> Result<RenderedLabel>;
}

/// Default renderer: vector PDF plus a rasterized preview
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLabelRenderer;

impl LabelRenderer for PdfLabelRenderer {
    fn render(&self, content: &LabelContent) -> Result<RenderedLabel> {
        let layout = layout::compose(content)?;
        let pdf = pdf::write_pdf(&layout);
        let png = png::rasterize(&layout, png::PREVIEW_SCALE).encode_png();
        Ok(RenderedLabel { pdf, png })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_produces_both_artifacts() {
        let content = LabelContent {
            store_name: "Corner Shop".to_string(),
            item_description: "Long grain rice".to_string(),
            packaging_description: "Bag".to_string(),
            quantity: 5.0,
            unit: "kg".to_string(),
            ean_8: "96385074".to_string(),
        };
        let label = PdfLabelRenderer.render(&content).unwrap();

        assert!(label.pdf.starts_with(b"%PDF-1.4"));
        assert_eq!(&label.png[1..4], b"PNG");

        let raster = png::rasterize(&layout::compose(&content).unwrap(), png::PREVIEW_SCALE);
        assert_eq!(raster.width(), 426);
        assert_eq!(raster.height(), 256);
    }
}
