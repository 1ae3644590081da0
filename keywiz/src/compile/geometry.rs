//! The geometry section compiler.
//!
//! Builds the keymap's geometry tables: shapes with their outlines,
//! sections of rows of keys, doodads, overlays, colors and aliases.
//! Bounding boxes are computed once per shape and per section; nothing
//! here is consulted by the state engine.

use super::alias::{self, AliasInfo};
use super::ast::{
    DoodadDef, DoodadKind, Expr, FileType, MergeMode, OverlayDef, RowItem, SectionDef,
    SectionItem, ShapeDef, ShapeItem, Stmt, Value, VarDef, XkbFile,
};
use super::expr;
use super::include::{handle_include, IncludeTarget};
use crate::atom::Atom;
use crate::context::Context;
use crate::keymap::geometry::{
    Color, Doodad, GeomKey, Geometry, Outline, Overlay, OverlayRow, Point, Property, Row,
    Section, Shape,
};
use crate::keymap::{KeyName, Keymap};

#[derive(Debug, Clone, Default)]
struct KeyDefaults {
    shape: Option<String>,
    color: Option<String>,
    gap: Option<i16>,
}

pub(crate) struct GeometryInfo {
    name: Option<String>,
    errors: usize,
    file_id: u32,
    geometry: Geometry,
    dflt_key: KeyDefaults,
    dflt_font: Option<String>,
    aliases: Vec<AliasInfo>,
}

impl GeometryInfo {
    pub fn new(file_id: u32, from: Option<&GeometryInfo>) -> Self {
        Self {
            name: None,
            errors: 0,
            file_id,
            geometry: Geometry::default(),
            dflt_key: from.map(|p| p.dflt_key.clone()).unwrap_or_default(),
            dflt_font: from.and_then(|p| p.dflt_font.clone()),
            aliases: Vec::new(),
        }
    }

    fn find_or_add_color(&mut self, spec: &str) -> u16 {
        if let Some(idx) = self.geometry.colors.iter().position(|c| c.spec == spec) {
            return idx as u16;
        }
        let idx = self.geometry.colors.len() as u16;
        self.geometry.colors.push(Color {
            pixel: idx as u32,
            spec: spec.to_string(),
        });
        idx
    }

    fn shape_index(&mut self, ctx: &mut Context, name: &str) -> Option<u16> {
        let atom = ctx.intern(name);
        match self.geometry.shape_by_name(atom) {
            Some(idx) => Some(idx as u16),
            None => {
                ctx.diag.error(format!("Shape \"{name}\" not found"));
                ctx.diag.action("Definition ignored".to_string());
                None
            }
        }
    }

    fn handle_shape_def(&mut self, ctx: &mut Context, def: &ShapeDef) -> bool {
        let name = ctx.intern(&def.name);
        let mut shape = Shape {
            name,
            ..Shape::default()
        };
        let mut corner_radius: i16 = 0;

        for item in &def.items {
            match item {
                ShapeItem::Var(var) => {
                    let Some((_, field, _)) = var.name.as_ref().and_then(|n| n.as_lhs()) else {
                        continue;
                    };
                    if field.eq_ignore_ascii_case("cornerradius")
                        || field.eq_ignore_ascii_case("corner")
                    {
                        if let Some(value) = &var.value {
                            if let Some(radius) = expr::resolve_float(ctx, value) {
                                corner_radius = radius as i16;
                            }
                        }
                    } else {
                        ctx.diag.error(format!(
                            "Unknown field {field} in shape \"{}\"; definition ignored",
                            def.name
                        ));
                    }
                }
                ShapeItem::Outline { tag, points } => {
                    let outline = Outline {
                        points: points.iter().map(|&(x, y)| Point { x, y }).collect(),
                        corner_radius,
                    };
                    let idx = shape.outlines.len();
                    match tag.as_deref() {
                        Some(tag) if tag.eq_ignore_ascii_case("approx")
                            || tag.eq_ignore_ascii_case("approximation") =>
                        {
                            shape.approx = Some(idx);
                        }
                        Some(tag) if tag.eq_ignore_ascii_case("primary") => {
                            shape.primary = Some(idx);
                        }
                        Some(other) => {
                            ctx.diag.warn(format!(
                                "Unknown outline tag \"{other}\" in shape \"{}\"",
                                def.name
                            ));
                        }
                        None => {}
                    }
                    shape.outlines.push(outline);
                }
            }
        }

        shape.compute_bounds();
        if let Some(idx) = self.geometry.shape_by_name(name) {
            if def.merge.clobbers() {
                self.geometry.shapes[idx] = shape;
            }
        } else {
            self.geometry.shapes.push(shape);
        }
        true
    }

    fn handle_geom_key(&mut self, ctx: &mut Context, def: &super::ast::GeomKeyDef) -> GeomKey {
        let mut key = GeomKey {
            gap: self.dflt_key.gap.unwrap_or(0),
            ..GeomKey::default()
        };
        if let Some(shape) = self.dflt_key.shape.clone() {
            if let Some(idx) = self.shape_index(ctx, &shape) {
                key.shape_idx = idx;
            }
        }
        if let Some(color) = self.dflt_key.color.clone() {
            key.color_idx = self.find_or_add_color(&color);
        }
        if let Some(name) = &def.name {
            key.name = KeyName::new(name);
            return key;
        }
        for item in &def.exprs {
            match item {
                Expr::Value(Value::KeyName(name)) => key.name = KeyName::new(name),
                Expr::Value(Value::String(shape)) => {
                    if let Some(idx) = self.shape_index(ctx, shape) {
                        key.shape_idx = idx;
                    }
                }
                Expr::Value(Value::Int(gap)) => key.gap = (gap * 10) as i16,
                Expr::Value(Value::Float(gap)) => key.gap = *gap as i16,
                Expr::Binary(super::ast::BinOp::Assign, lhs, rhs) => {
                    let Some((_, field, _)) = lhs.as_lhs() else {
                        continue;
                    };
                    if field.eq_ignore_ascii_case("shape") {
                        if let Some(shape) = expr::resolve_string(ctx, rhs) {
                            if let Some(idx) = self.shape_index(ctx, &shape) {
                                key.shape_idx = idx;
                            }
                        }
                    } else if field.eq_ignore_ascii_case("color") {
                        if let Some(color) = expr::resolve_string(ctx, rhs) {
                            key.color_idx = self.find_or_add_color(&color);
                        }
                    } else if field.eq_ignore_ascii_case("gap") {
                        if let Some(gap) = expr::resolve_float(ctx, rhs) {
                            key.gap = gap as i16;
                        }
                    } else {
                        ctx.diag
                            .error(format!("Unknown field {field} in a key in a row"));
                    }
                }
                other => {
                    ctx.diag.error(format!(
                        "Unexpected {} in a key in a row; ignored",
                        other.op_name()
                    ));
                }
            }
        }
        key
    }

    fn handle_section_def(&mut self, ctx: &mut Context, def: &SectionDef) -> bool {
        let mut section = Section {
            name: ctx.intern(&def.name),
            ..Section::default()
        };

        for item in &def.items {
            match item {
                SectionItem::Var(var) => {
                    let Some((_, field, _)) = var.name.as_ref().and_then(|n| n.as_lhs()) else {
                        continue;
                    };
                    let field = field.to_string();
                    let Some(value) = &var.value else { continue };
                    self.set_section_field(ctx, &mut section, &field, value);
                }
                SectionItem::Row(row_def) => {
                    let mut row = Row::default();
                    for row_item in &row_def.items {
                        match row_item {
                            RowItem::Var(var) => {
                                let Some((_, field, _)) =
                                    var.name.as_ref().and_then(|n| n.as_lhs())
                                else {
                                    continue;
                                };
                                let field = field.to_string();
                                let Some(value) = &var.value else { continue };
                                self.set_row_field(ctx, &mut row, &field, value);
                            }
                            RowItem::Keys(keys) => {
                                for key_def in keys {
                                    let key = self.handle_geom_key(ctx, key_def);
                                    row.keys.push(key);
                                }
                            }
                        }
                    }
                    section.rows.push(row);
                }
                SectionItem::Doodad(doodad) => {
                    if let Some(compiled) = self.compile_doodad(ctx, doodad) {
                        section.doodads.push(compiled);
                    }
                }
                SectionItem::Overlay(overlay) => {
                    section.overlays.push(self.compile_overlay(ctx, overlay));
                }
            }
        }

        self.geometry.compute_section_bounds(&mut section);
        if let Some(idx) = self
            .geometry
            .sections
            .iter()
            .position(|s| s.name == section.name)
        {
            if def.merge.clobbers() {
                self.geometry.sections[idx] = section;
            }
        } else {
            self.geometry.sections.push(section);
        }
        true
    }

    fn set_section_field(
        &mut self,
        ctx: &mut Context,
        section: &mut Section,
        field: &str,
        value: &Expr,
    ) {
        if field.eq_ignore_ascii_case("top") {
            if let Some(v) = expr::resolve_float(ctx, value) {
                section.top = v as i16;
            }
        } else if field.eq_ignore_ascii_case("left") {
            if let Some(v) = expr::resolve_float(ctx, value) {
                section.left = v as i16;
            }
        } else if field.eq_ignore_ascii_case("width") {
            if let Some(v) = expr::resolve_float(ctx, value) {
                section.width = v.max(0) as u16;
            }
        } else if field.eq_ignore_ascii_case("height") {
            if let Some(v) = expr::resolve_float(ctx, value) {
                section.height = v.max(0) as u16;
            }
        } else if field.eq_ignore_ascii_case("angle") {
            if let Some(v) = expr::resolve_float(ctx, value) {
                section.angle = v as i16;
            }
        } else if field.eq_ignore_ascii_case("priority") {
            if let Some(v) = expr::resolve_integer(ctx, value) {
                if (0..=255).contains(&v) {
                    section.priority = v as u8;
                } else {
                    ctx.diag
                        .error(format!("Section priority {v} out of range (0..255)"));
                }
            }
        } else {
            ctx.diag.error(format!(
                "Unknown field {field} in a section; assignment ignored"
            ));
        }
    }

    fn set_row_field(&mut self, ctx: &mut Context, row: &mut Row, field: &str, value: &Expr) {
        if field.eq_ignore_ascii_case("top") {
            if let Some(v) = expr::resolve_float(ctx, value) {
                row.top = v as i16;
            }
        } else if field.eq_ignore_ascii_case("left") {
            if let Some(v) = expr::resolve_float(ctx, value) {
                row.left = v as i16;
            }
        } else if field.eq_ignore_ascii_case("vertical") {
            if let Some(v) = expr::resolve_boolean(ctx, value) {
                row.vertical = v;
            }
        } else {
            ctx.diag
                .error(format!("Unknown field {field} in a row; assignment ignored"));
        }
    }

    fn compile_doodad(&mut self, ctx: &mut Context, def: &DoodadDef) -> Option<Doodad> {
        let name = ctx.intern(&def.name);
        let mut priority = 0u8;
        let mut top = 0i16;
        let mut left = 0i16;
        let mut angle = 0i16;
        let mut width = 0i16;
        let mut height = 0i16;
        let mut color: Option<String> = None;
        let mut on_color: Option<String> = None;
        let mut off_color: Option<String> = None;
        let mut shape: Option<String> = None;
        let mut text: Option<String> = None;
        let mut font = self.dflt_font.clone();
        let mut logo_name: Option<String> = None;

        for var in &def.body {
            let Some((_, field, _)) = var.name.as_ref().and_then(|n| n.as_lhs()) else {
                continue;
            };
            let Some(value) = &var.value else { continue };
            if field.eq_ignore_ascii_case("priority") {
                if let Some(v) = expr::resolve_integer(ctx, value) {
                    if (0..=255).contains(&v) {
                        priority = v as u8;
                    } else {
                        ctx.diag
                            .error(format!("Doodad priority {v} out of range (0..255)"));
                    }
                }
            } else if field.eq_ignore_ascii_case("top") {
                if let Some(v) = expr::resolve_float(ctx, value) {
                    top = v as i16;
                }
            } else if field.eq_ignore_ascii_case("left") {
                if let Some(v) = expr::resolve_float(ctx, value) {
                    left = v as i16;
                }
            } else if field.eq_ignore_ascii_case("angle") {
                if let Some(v) = expr::resolve_float(ctx, value) {
                    angle = v as i16;
                }
            } else if field.eq_ignore_ascii_case("width") {
                if let Some(v) = expr::resolve_float(ctx, value) {
                    width = v as i16;
                }
            } else if field.eq_ignore_ascii_case("height") {
                if let Some(v) = expr::resolve_float(ctx, value) {
                    height = v as i16;
                }
            } else if field.eq_ignore_ascii_case("color") {
                color = expr::resolve_string(ctx, value);
            } else if field.eq_ignore_ascii_case("oncolor") {
                on_color = expr::resolve_string(ctx, value);
            } else if field.eq_ignore_ascii_case("offcolor") {
                off_color = expr::resolve_string(ctx, value);
            } else if field.eq_ignore_ascii_case("shape") {
                shape = expr::resolve_string(ctx, value);
            } else if field.eq_ignore_ascii_case("text") {
                text = expr::resolve_string(ctx, value);
            } else if field.eq_ignore_ascii_case("font") {
                font = expr::resolve_string(ctx, value);
            } else if field.eq_ignore_ascii_case("name") {
                logo_name = expr::resolve_string(ctx, value);
            } else {
                ctx.diag.error(format!(
                    "Unknown field {field} in doodad \"{}\"; assignment ignored",
                    def.name
                ));
            }
        }

        let color_idx = color
            .as_deref()
            .map(|c| self.find_or_add_color(c))
            .unwrap_or(0);
        let shape_idx = match shape.as_deref() {
            Some(name) => self.shape_index(ctx, name)?,
            None => 0,
        };

        Some(match def.kind {
            DoodadKind::Outline => Doodad::Shape {
                name,
                priority,
                top,
                left,
                angle,
                color_idx,
                shape_idx,
            },
            DoodadKind::Solid => Doodad::Solid {
                name,
                priority,
                top,
                left,
                angle,
                color_idx,
                shape_idx,
            },
            DoodadKind::Text => Doodad::Text {
                name,
                priority,
                top,
                left,
                angle,
                width,
                height,
                color_idx,
                text: text.unwrap_or_default(),
                font: font.unwrap_or_default(),
            },
            DoodadKind::Indicator => Doodad::Indicator {
                name,
                priority,
                top,
                left,
                angle,
                shape_idx,
                on_color_idx: on_color
                    .as_deref()
                    .map(|c| self.find_or_add_color(c))
                    .unwrap_or(0),
                off_color_idx: off_color
                    .as_deref()
                    .map(|c| self.find_or_add_color(c))
                    .unwrap_or(0),
            },
            DoodadKind::Logo => Doodad::Logo {
                name,
                priority,
                top,
                left,
                angle,
                color_idx,
                shape_idx,
                logo_name: logo_name.unwrap_or_default(),
            },
        })
    }

    fn compile_overlay(&mut self, ctx: &mut Context, def: &OverlayDef) -> Overlay {
        let mut row = OverlayRow {
            row_under: 0,
            keys: Vec::new(),
        };
        for (over, under) in &def.keys {
            row.keys.push((KeyName::new(over), KeyName::new(under)));
        }
        Overlay {
            name: ctx.intern(&def.name),
            rows: vec![row],
        }
    }

    fn handle_geometry_var(&mut self, ctx: &mut Context, var: &VarDef) -> bool {
        let Some(name) = &var.name else { return false };
        let Some(value) = &var.value else { return false };
        let Some((element, field, _)) = name.as_lhs() else {
            return false;
        };
        match element {
            Some(element) if element.eq_ignore_ascii_case("key") => {
                if field.eq_ignore_ascii_case("shape") {
                    self.dflt_key.shape = expr::resolve_string(ctx, value);
                } else if field.eq_ignore_ascii_case("color") {
                    self.dflt_key.color = expr::resolve_string(ctx, value);
                } else if field.eq_ignore_ascii_case("gap") {
                    self.dflt_key.gap = expr::resolve_float(ctx, value).map(|v| v as i16);
                } else {
                    ctx.diag
                        .error(format!("Unknown default key field {field}; ignored"));
                    return false;
                }
                true
            }
            Some(element) if element.eq_ignore_ascii_case("text") => {
                if field.eq_ignore_ascii_case("font") {
                    self.dflt_font = expr::resolve_string(ctx, value);
                    true
                } else {
                    ctx.diag
                        .error(format!("Unknown default text field {field}; ignored"));
                    false
                }
            }
            Some(element) if element.eq_ignore_ascii_case("property") => {
                let Some(text) = expr::resolve_string(ctx, value) else {
                    return false;
                };
                self.geometry.properties.push(Property {
                    name: field.to_string(),
                    value: text,
                });
                true
            }
            Some(element) => {
                ctx.diag
                    .error(format!("Unknown element {element} in a geometry file"));
                false
            }
            None => {
                if field.eq_ignore_ascii_case("description") {
                    // Recorded as a property; the geometry name itself
                    // comes from the section header.
                    if let Some(text) = expr::resolve_string(ctx, value) {
                        self.geometry.properties.push(Property {
                            name: "description".to_string(),
                            value: text,
                        });
                    }
                    true
                } else if field.eq_ignore_ascii_case("width") {
                    if let Some(v) = expr::resolve_float(ctx, value) {
                        self.geometry.width_mm = (v / 10).max(0) as u16;
                    }
                    true
                } else if field.eq_ignore_ascii_case("height") {
                    if let Some(v) = expr::resolve_float(ctx, value) {
                        self.geometry.height_mm = (v / 10).max(0) as u16;
                    }
                    true
                } else if field.eq_ignore_ascii_case("font")
                    || field.eq_ignore_ascii_case("labelfont")
                {
                    self.geometry.label_font = expr::resolve_string(ctx, value);
                    true
                } else if field.eq_ignore_ascii_case("labelcolor") {
                    if let Some(color) = expr::resolve_string(ctx, value) {
                        let idx = self.find_or_add_color(&color);
                        self.geometry.label_color_idx = Some(idx);
                    }
                    true
                } else if field.eq_ignore_ascii_case("basecolor") {
                    if let Some(color) = expr::resolve_string(ctx, value) {
                        let idx = self.find_or_add_color(&color);
                        self.geometry.base_color_idx = Some(idx);
                    }
                    true
                } else {
                    ctx.diag.error(format!(
                        "Unknown field {field} in a geometry file; assignment ignored"
                    ));
                    false
                }
            }
        }
    }
}

impl IncludeTarget for GeometryInfo {
    const FILE_TYPE: FileType = FileType::Geometry;

    fn fresh(&self, _ctx: &mut Context, _keymap: &mut Keymap, file_id: u32) -> Self {
        GeometryInfo::new(file_id, Some(self))
    }

    fn errors(&self) -> usize {
        self.errors
    }

    fn bump_errors(&mut self, n: usize) {
        self.errors += n;
    }

    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn handle_file(&mut self, ctx: &mut Context, keymap: &mut Keymap, file: &XkbFile, merge: MergeMode) {
        self.name = Some(file.name.clone());
        for stmt in &file.defs {
            let ok = match stmt {
                Stmt::Include(inc) => handle_include(ctx, keymap, self, inc),
                Stmt::Shape(def) => self.handle_shape_def(ctx, def),
                Stmt::Section(def) => self.handle_section_def(ctx, def),
                Stmt::Doodad(def) => match self.compile_doodad(ctx, def) {
                    Some(doodad) => {
                        self.geometry.doodads.push(doodad);
                        true
                    }
                    None => false,
                },
                Stmt::IndicatorMap(def) => {
                    // In a geometry file an `indicator "Name" {...}` is
                    // an indicator doodad.
                    let doodad = DoodadDef {
                        merge: def.merge,
                        kind: DoodadKind::Indicator,
                        name: def.name.clone(),
                        body: def.body.clone(),
                    };
                    match self.compile_doodad(ctx, &doodad) {
                        Some(doodad) => {
                            self.geometry.doodads.push(doodad);
                            true
                        }
                        None => false,
                    }
                }
                Stmt::Overlay(def) => {
                    let overlay = self.compile_overlay(ctx, def);
                    self.geometry
                        .sections
                        .last_mut()
                        .map(|s| s.overlays.push(overlay))
                        .is_some()
                }
                Stmt::Var(def) => self.handle_geometry_var(ctx, def),
                Stmt::KeyAlias(def) => {
                    alias::handle_alias_def(
                        ctx,
                        &mut self.aliases,
                        def.merge.or(merge),
                        self.file_id,
                        KeyName::new(&def.alias),
                        KeyName::new(&def.real),
                    );
                    true
                }
                other => {
                    ctx.diag.error(format!(
                        "Geometry files may not include other declarations; \
                         ignoring definition of {}",
                        other.kind()
                    ));
                    false
                }
            };
            if !ok {
                self.errors += 1;
            }
            if self.errors > 10 {
                ctx.diag
                    .action(format!("Abandoning geometry file \"{}\"", file.top_name));
                break;
            }
        }
    }

    fn merge_from(&mut self, ctx: &mut Context, _keymap: &mut Keymap, from: Self, merge: MergeMode) {
        if from.errors > 0 {
            self.errors += from.errors;
            return;
        }
        if self.name.is_none() {
            self.name = from.name.clone();
        }
        // Whole-item merge: shapes and sections collide by name.
        for shape in from.geometry.shapes {
            match self.geometry.shape_by_name(shape.name) {
                Some(idx) if merge.clobbers() => self.geometry.shapes[idx] = shape,
                Some(_) => {}
                None => self.geometry.shapes.push(shape),
            }
        }
        for section in from.geometry.sections {
            match self
                .geometry
                .sections
                .iter()
                .position(|s| s.name == section.name)
            {
                Some(idx) if merge.clobbers() => self.geometry.sections[idx] = section,
                Some(_) => {}
                None => self.geometry.sections.push(section),
            }
        }
        for doodad in from.geometry.doodads {
            match self
                .geometry
                .doodads
                .iter()
                .position(|d| d.name() == doodad.name())
            {
                Some(idx) if merge.clobbers() => self.geometry.doodads[idx] = doodad,
                Some(_) => {}
                None => self.geometry.doodads.push(doodad),
            }
        }
        for color in from.geometry.colors {
            self.find_or_add_color(&color.spec);
        }
        for property in from.geometry.properties {
            self.geometry.properties.push(property);
        }
        if self.geometry.width_mm == 0 {
            self.geometry.width_mm = from.geometry.width_mm;
        }
        if self.geometry.height_mm == 0 {
            self.geometry.height_mm = from.geometry.height_mm;
        }
        alias::merge_aliases(ctx, &mut self.aliases, from.aliases, merge);
    }
}

/// Compile an `xkb_geometry` section into the keymap.
pub(crate) fn compile_geometry(
    ctx: &mut Context,
    keymap: &mut Keymap,
    file: &XkbFile,
    merge: MergeMode,
) -> bool {
    let mut info = GeometryInfo::new(file.id, None);
    info.handle_file(ctx, keymap, file, merge);

    if info.errors != 0 {
        return false;
    }

    let mut geometry = info.geometry;
    geometry.name = ctx.intern(&file.name);
    for alias_info in &info.aliases {
        geometry.key_aliases.push(crate::keymap::KeyAlias {
            alias: alias_info.alias,
            real: alias_info.real,
        });
    }
    alias::apply_aliases(ctx, keymap, info.aliases);

    keymap.geometry = Some(geometry);
    keymap.names.geometry = info.name;
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::parser::Parser;

    fn compile(source: &str) -> (Context, Keymap, bool) {
        let mut ctx = Context::new();
        let files = Parser::new(source, "test")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap();
        let mut keymap = Keymap::new(ctx.atoms.clone());
        keymap.resize_key_tables();
        let ok = compile_geometry(&mut ctx, &mut keymap, &files[0], MergeMode::Override);
        keymap.atoms = ctx.atoms.clone();
        (ctx, keymap, ok)
    }

    #[test]
    fn shapes_sections_and_sizes() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_geometry "pc104" {
                description = "Generic 104";
                width = 470;
                height = 180;
                shape "NORM" { cornerRadius = 1, { [0, 0], [18, 18] } };
                key.shape = "NORM";
                key.gap = 1;
                section "Alpha" {
                    top = 10;
                    left = 5;
                    row {
                        top = 1;
                        keys { <TLDE>, <AE01>, { <AE02>, 5 } };
                    };
                };
            };"#,
        );
        assert!(ok);
        let geometry = keymap.geometry().expect("geometry present");
        assert_eq!(geometry.width_mm, 470);
        assert_eq!(geometry.height_mm, 180);
        assert_eq!(geometry.shapes.len(), 1);
        assert_eq!(geometry.shapes[0].bounds.x2, 180);
        assert_eq!(geometry.sections.len(), 1);
        let section = &geometry.sections[0];
        assert_eq!(section.rows[0].keys.len(), 3);
        // default gap 1mm applies; the braced key overrides to 5mm
        assert_eq!(section.rows[0].keys[1].gap, 10);
        assert_eq!(section.rows[0].keys[2].gap, 50);
        assert!(section.width > 0);
    }

    #[test]
    fn text_doodad_and_label_font() {
        let (ctx, keymap, ok) = compile(
            r#"xkb_geometry "g" {
                text.font = "helvetica";
                text "Label" { top = 1; left = 2; text = "hi"; };
            };"#,
        );
        assert!(ok);
        let geometry = keymap.geometry().unwrap();
        assert_eq!(geometry.doodads.len(), 1);
        let Doodad::Text { text, font, name, .. } = &geometry.doodads[0] else {
            panic!("expected text doodad");
        };
        assert_eq!(text, "hi");
        assert_eq!(font, "helvetica");
        assert_eq!(ctx.atom_text(*name), "Label");
    }

    #[test]
    fn missing_shape_reference_is_dropped() {
        let (ctx, keymap, _ok) = compile(
            r#"xkb_geometry "g" {
                section "S" {
                    row { keys { { <AA>, shape="NOPE" } }; };
                };
            };"#,
        );
        assert!(ctx.error_count() > 0);
        // the section itself survives with the key on the default shape
        assert!(keymap.geometry().is_some());
    }

    #[test]
    fn overlay_recorded() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_geometry "g" {
                shape "NORM" { { [0,0], [18,18] } };
                section "S" {
                    row { keys { <AA> }; };
                    overlay "O1" { <K1> = <AA> };
                };
            };"#,
        );
        assert!(ok);
        let section = &keymap.geometry().unwrap().sections[0];
        assert_eq!(section.overlays.len(), 1);
        assert_eq!(section.overlays[0].rows[0].keys.len(), 1);
    }
}
