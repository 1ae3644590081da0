//! Keyboard geometry storage.
//!
//! Shapes, sections, rows, keys, doodads, overlays, properties, colors.
//! All coordinates are tenths of a millimetre.  Geometry is compiled and
//! stored for clients that want to draw a keyboard; nothing here is
//! consulted by the state engine.

use super::{KeyAlias, KeyName};
use crate::atom::Atom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x1: i16,
    pub y1: i16,
    pub x2: i16,
    pub y2: i16,
}

impl Bounds {
    fn extend(&mut self, x: i16, y: i16) {
        if x < self.x1 {
            self.x1 = x;
        }
        if x > self.x2 {
            self.x2 = x;
        }
        if y < self.y1 {
            self.y1 = y;
        }
        if y > self.y2 {
            self.y2 = y;
        }
    }

    fn empty_min_max() -> Self {
        Self {
            x1: i16::MAX,
            y1: i16::MAX,
            x2: i16::MIN,
            y2: i16::MIN,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Outline {
    pub points: Vec<Point>,
    pub corner_radius: i16,
}

#[derive(Debug, Clone, Default)]
pub struct Shape {
    pub name: Atom,
    pub outlines: Vec<Outline>,
    /// Indices into `outlines`.
    pub approx: Option<usize>,
    pub primary: Option<usize>,
    pub bounds: Bounds,
}

impl Shape {
    /// Bounds over all outline points; a degenerate outline contributes
    /// the origin.
    pub fn compute_bounds(&mut self) {
        if self.outlines.is_empty() {
            self.bounds = Bounds::default();
            return;
        }
        let mut bounds = Bounds::empty_min_max();
        for outline in &self.outlines {
            for pt in &outline.points {
                bounds.extend(pt.x, pt.y);
            }
            if outline.points.len() < 2 {
                bounds.extend(0, 0);
            }
        }
        self.bounds = bounds;
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeomKey {
    pub name: KeyName,
    pub gap: i16,
    pub shape_idx: u16,
    pub color_idx: u16,
}

#[derive(Debug, Clone, Default)]
pub struct Row {
    pub top: i16,
    pub left: i16,
    pub vertical: bool,
    pub keys: Vec<GeomKey>,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Default)]
pub struct OverlayRow {
    pub row_under: u16,
    /// `(over, under)` name pairs.
    pub keys: Vec<(KeyName, KeyName)>,
}

#[derive(Debug, Clone, Default)]
pub struct Overlay {
    pub name: Atom,
    pub rows: Vec<OverlayRow>,
}

#[derive(Debug, Clone)]
pub enum Doodad {
    Shape {
        name: Atom,
        priority: u8,
        top: i16,
        left: i16,
        angle: i16,
        color_idx: u16,
        shape_idx: u16,
    },
    Solid {
        name: Atom,
        priority: u8,
        top: i16,
        left: i16,
        angle: i16,
        color_idx: u16,
        shape_idx: u16,
    },
    Text {
        name: Atom,
        priority: u8,
        top: i16,
        left: i16,
        angle: i16,
        width: i16,
        height: i16,
        color_idx: u16,
        text: String,
        font: String,
    },
    Indicator {
        name: Atom,
        priority: u8,
        top: i16,
        left: i16,
        angle: i16,
        shape_idx: u16,
        on_color_idx: u16,
        off_color_idx: u16,
    },
    Logo {
        name: Atom,
        priority: u8,
        top: i16,
        left: i16,
        angle: i16,
        color_idx: u16,
        shape_idx: u16,
        logo_name: String,
    },
}

impl Doodad {
    pub fn name(&self) -> Atom {
        match self {
            Doodad::Shape { name, .. }
            | Doodad::Solid { name, .. }
            | Doodad::Text { name, .. }
            | Doodad::Indicator { name, .. }
            | Doodad::Logo { name, .. } => *name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub name: Atom,
    pub priority: u8,
    pub top: i16,
    pub left: i16,
    pub width: u16,
    pub height: u16,
    pub angle: i16,
    pub rows: Vec<Row>,
    pub doodads: Vec<Doodad>,
    pub overlays: Vec<Overlay>,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Default)]
pub struct Property {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct Color {
    pub pixel: u32,
    pub spec: String,
}

#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub name: Atom,
    pub width_mm: u16,
    pub height_mm: u16,
    pub label_font: Option<String>,
    pub label_color_idx: Option<u16>,
    pub base_color_idx: Option<u16>,
    pub properties: Vec<Property>,
    pub colors: Vec<Color>,
    pub shapes: Vec<Shape>,
    pub sections: Vec<Section>,
    pub doodads: Vec<Doodad>,
    pub key_aliases: Vec<KeyAlias>,
}

impl Geometry {
    pub fn shape_by_name(&self, name: Atom) -> Option<usize> {
        self.shapes.iter().position(|s| s.name == name)
    }

    /// Accumulate key extents along the row axis, honouring per-key gaps.
    pub fn compute_row_bounds(&self, row: &mut Row) {
        let mut bounds = Bounds::default();
        let mut pos: i16 = 0;
        let mut first = true;
        for key in &row.keys {
            let sbounds = match self.shapes.get(key.shape_idx as usize) {
                Some(shape) => shape.bounds,
                None => Bounds::default(),
            };
            if row.vertical {
                if first {
                    bounds.x1 = sbounds.x1;
                    bounds.x2 = sbounds.x2;
                    first = false;
                } else {
                    bounds.x1 = bounds.x1.min(sbounds.x1);
                    bounds.x2 = bounds.x2.max(sbounds.x2);
                }
                pos += key.gap;
                bounds.y2 = pos + sbounds.y2;
                pos += sbounds.y2;
            } else {
                if first {
                    bounds.y1 = sbounds.y1;
                    bounds.y2 = sbounds.y2;
                    first = false;
                } else {
                    bounds.y1 = bounds.y1.min(sbounds.y1);
                    bounds.y2 = bounds.y2.max(sbounds.y2);
                }
                pos += key.gap;
                bounds.x2 = pos + sbounds.x2;
                pos += sbounds.x2;
            }
        }
        row.bounds = bounds;
    }

    /// Union of row bounds translated by each row's origin.
    pub fn compute_section_bounds(&self, section: &mut Section) {
        let mut rows = std::mem::take(&mut section.rows);
        let mut bounds = Bounds::empty_min_max();
        if rows.is_empty() {
            bounds = Bounds::default();
        }
        for row in rows.iter_mut() {
            self.compute_row_bounds(row);
            bounds.extend(row.left + row.bounds.x1, row.top + row.bounds.y1);
            bounds.extend(row.left + row.bounds.x2, row.top + row.bounds.y2);
        }
        section.rows = rows;
        section.bounds = bounds;
        if section.width == 0 {
            section.width = bounds.x2.max(0) as u16;
        }
        if section.height == 0 {
            section.height = bounds.y2.max(0) as u16;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rect_shape(w: i16, h: i16) -> Shape {
        let mut shape = Shape {
            outlines: vec![Outline {
                points: vec![
                    Point { x: 0, y: 0 },
                    Point { x: w, y: h },
                ],
                corner_radius: 0,
            }],
            ..Shape::default()
        };
        shape.compute_bounds();
        shape
    }

    #[test]
    fn shape_bounds() {
        let shape = rect_shape(190, 190);
        assert_eq!(
            shape.bounds,
            Bounds {
                x1: 0,
                y1: 0,
                x2: 190,
                y2: 190
            }
        );
    }

    #[test]
    fn degenerate_shape_bounds_include_origin() {
        let mut shape = Shape {
            outlines: vec![Outline {
                points: vec![Point { x: 50, y: 50 }],
                corner_radius: 0,
            }],
            ..Shape::default()
        };
        shape.compute_bounds();
        assert_eq!(shape.bounds.x1, 0);
        assert_eq!(shape.bounds.y1, 0);
        assert_eq!(shape.bounds.x2, 50);
    }

    #[test]
    fn row_accumulates_gaps() {
        let mut geom = Geometry::default();
        geom.shapes.push(rect_shape(190, 190));
        let mut row = Row {
            keys: vec![
                GeomKey {
                    gap: 0,
                    shape_idx: 0,
                    ..GeomKey::default()
                },
                GeomKey {
                    gap: 10,
                    shape_idx: 0,
                    ..GeomKey::default()
                },
            ],
            ..Row::default()
        };
        geom.compute_row_bounds(&mut row);
        // 190 + 10 gap + 190
        assert_eq!(row.bounds.x2, 390);
        assert_eq!(row.bounds.y2, 190);
    }

    #[test]
    fn section_defaults_size_from_bounds() {
        let mut geom = Geometry::default();
        geom.shapes.push(rect_shape(190, 190));
        let mut section = Section {
            rows: vec![Row {
                top: 10,
                left: 20,
                keys: vec![GeomKey {
                    shape_idx: 0,
                    ..GeomKey::default()
                }],
                ..Row::default()
            }],
            ..Section::default()
        };
        geom.compute_section_bounds(&mut section);
        assert_eq!(section.width, 210);
        assert_eq!(section.height, 200);
    }
}
