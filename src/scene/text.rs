use crate::common::Vec3;

use super::{Geometry, SceneNode};

pub const LABEL_FONT_FAMILY: &str = "Courier-Bold";
pub const LABEL_FONT_SIZE: f32 = 0.1;
pub const LABEL_EXTRUSION_DEPTH: f32 = 0.02;
pub const LABEL_CHAMFER_RADIUS: f32 = 0.02;
pub const LABEL_SCALE: f32 = 0.1;

// Monospace metrics, in ems. Glyph boxes span baseline to ascender.
const ADVANCE_EM: f32 = 0.6;
const ASCENT_EM: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlignment {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    pub size: f32,
}

impl Font {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}

/// Extruded single-line text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGeometry {
    pub string: String,
    pub extrusion_depth: f32,
    pub chamfer_radius: f32,
    pub alignment: TextAlignment,
    pub font: Font,
}

impl TextGeometry {
    pub fn new(string: impl Into<String>, extrusion_depth: f32) -> Self {
        Self {
            string: string.into(),
            extrusion_depth,
            chamfer_radius: 0.0,
            alignment: TextAlignment::Left,
            font: Font::new("Courier", 1.0),
        }
    }

    pub fn with_chamfer_radius(mut self, radius: f32) -> Self {
        self.chamfer_radius = radius;
        self
    }

    pub fn with_alignment(mut self, alignment: TextAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = font;
        self
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let glyphs = self.string.chars().count();
        if glyphs == 0 {
            return BoundingBox {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        }
        BoundingBox {
            min: Vec3::ZERO,
            max: Vec3::new(
                glyphs as f32 * ADVANCE_EM * self.font.size,
                ASCENT_EM * self.font.size,
                self.extrusion_depth,
            ),
        }
    }
}

/// Builds the floating label: an untransformed wrapper holding the scaled
/// text node, whose pivot puts its origin at the horizontal center of the
/// text on the baseline.
pub fn label_node(label: &str) -> SceneNode {
    let text = TextGeometry::new(label, LABEL_EXTRUSION_DEPTH)
        .with_chamfer_radius(LABEL_CHAMFER_RADIUS)
        .with_alignment(TextAlignment::Center)
        .with_font(Font::new(LABEL_FONT_FAMILY, LABEL_FONT_SIZE));

    let bounds = text.bounding_box();
    let pivot = Vec3::new(bounds.width() / 2.0, bounds.min.y, text.extrusion_depth);

    let text_node = SceneNode::new()
        .with_name("label-text")
        .with_geometry(Geometry::Text(text))
        .with_scale(Vec3::splat(LABEL_SCALE))
        .with_pivot(pivot);

    SceneNode::new().with_name("label").with_child(text_node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_node_carries_the_text_style() {
        let wrapper = label_node("sedan");
        assert_eq!(wrapper.position, Vec3::ZERO);
        assert_eq!(wrapper.children.len(), 1);

        let text_node = &wrapper.children[0];
        assert_eq!(text_node.scale, Vec3::splat(0.1));
        let Some(Geometry::Text(text)) = &text_node.geometry else {
            panic!("expected text geometry");
        };
        assert_eq!(text.string, "sedan");
        assert_eq!(text.extrusion_depth, 0.02);
        assert_eq!(text.chamfer_radius, 0.02);
        assert_eq!(text.alignment, TextAlignment::Center);
        assert_eq!(text.font, Font::new("Courier-Bold", 0.1));
    }

    #[test]
    fn pivot_centers_horizontally_on_the_baseline() {
        let wrapper = label_node("none");
        let text_node = &wrapper.children[0];
        // 4 glyphs * 0.6em * 0.1
        let width = 4.0 * 0.6 * 0.1;
        assert!((text_node.pivot.x - width / 2.0).abs() < 1e-6);
        assert_eq!(text_node.pivot.y, 0.0);
        assert_eq!(text_node.pivot.z, 0.02);
    }

    #[test]
    fn empty_text_has_an_empty_box() {
        let bounds = TextGeometry::new("", 0.02).bounding_box();
        assert_eq!(bounds.width(), 0.0);
        assert_eq!(bounds.height(), 0.0);
    }
}
