//! The key types section compiler.
//!
//! Parses `type "Name" { modifiers=...; map[...]=...; preserve[...]=...;
//! level_name[...]="..."; }` definitions, guarantees the four canonical
//! types, and installs the type table into the keymap.

use super::ast::{FileType, KeyTypeDef, MergeMode, Stmt, VarDef, XkbFile};
use super::expr;
use super::include::{handle_include, IncludeTarget};
use super::vmod::{self, VModInfo};
use crate::atom::Atom;
use crate::context::Context;
use crate::keymap::{
    KeyType, Keymap, MapEntry, ModMask, Mods, VModMask, ALPHABETIC_INDEX, KEYPAD_INDEX,
    ONE_LEVEL_INDEX, TWO_LEVEL_INDEX,
};

const STD_ONE_LEVEL: u8 = 1 << 0;
const STD_TWO_LEVEL: u8 = 1 << 1;
const STD_ALPHABETIC: u8 = 1 << 2;
const STD_KEYPAD: u8 = 1 << 3;

#[derive(Debug, Clone, Copy)]
struct PreserveInfo {
    index_mods: ModMask,
    index_vmods: VModMask,
    pre_mods: ModMask,
    pre_vmods: VModMask,
}

#[derive(Debug, Clone, Default)]
struct KeyTypeInfo {
    file_id: u32,
    merge: MergeMode,
    name: Atom,
    mask: ModMask,
    vmask: VModMask,
    mask_defined: bool,
    num_levels: u16,
    entries: Vec<MapEntry>,
    preserves: Vec<PreserveInfo>,
    level_names: Vec<Atom>,
}

impl Default for PreserveInfo {
    fn default() -> Self {
        Self {
            index_mods: ModMask::empty(),
            index_vmods: 0,
            pre_mods: ModMask::empty(),
            pre_vmods: 0,
        }
    }
}

pub(crate) struct KeyTypesInfo {
    name: Option<String>,
    errors: usize,
    file_id: u32,
    std_present: u8,
    types: Vec<KeyTypeInfo>,
    dflt: KeyTypeInfo,
    vmods: VModInfo,
}

impl KeyTypesInfo {
    pub fn new(keymap: &Keymap, file_id: u32, from: Option<&KeyTypesInfo>) -> Self {
        let dflt = match from {
            Some(parent) => parent.dflt.clone(),
            None => KeyTypeInfo {
                file_id,
                merge: MergeMode::Override,
                num_levels: 1,
                ..KeyTypeInfo::default()
            },
        };
        Self {
            name: None,
            errors: 0,
            file_id,
            std_present: 0,
            types: Vec::new(),
            dflt,
            vmods: VModInfo::new(keymap),
        }
    }

    fn type_text(&self, ctx: &Context, ty: &KeyTypeInfo) -> String {
        if ty.name.is_none() {
            "default".to_string()
        } else {
            ctx.atom_text(ty.name).to_string()
        }
    }

    fn report_bad_width(&mut self, ctx: &mut Context, name: &str, has: u16, needs: u16) -> bool {
        ctx.diag.error(format!(
            "Key type \"{name}\" has {has} levels, must have {needs}; \
             illegal type definition ignored"
        ));
        false
    }

    fn add_key_type(&mut self, ctx: &mut Context, mut new: KeyTypeInfo) -> bool {
        let name_text = ctx.atom_text(new.name).to_string();
        match name_text.as_str() {
            "ONE_LEVEL" => {
                if new.num_levels > 1 {
                    return self.report_bad_width(ctx, "ONE_LEVEL", new.num_levels, 1);
                }
                self.std_present |= STD_ONE_LEVEL;
            }
            "TWO_LEVEL" => {
                if new.num_levels > 2 {
                    return self.report_bad_width(ctx, "TWO_LEVEL", new.num_levels, 2);
                }
                new.num_levels = 2;
                self.std_present |= STD_TWO_LEVEL;
            }
            "ALPHABETIC" => {
                if new.num_levels > 2 {
                    return self.report_bad_width(ctx, "ALPHABETIC", new.num_levels, 2);
                }
                new.num_levels = 2;
                self.std_present |= STD_ALPHABETIC;
            }
            "KEYPAD" => {
                if new.num_levels > 2 {
                    return self.report_bad_width(ctx, "KEYPAD", new.num_levels, 2);
                }
                new.num_levels = 2;
                self.std_present |= STD_KEYPAD;
            }
            _ => {}
        }

        if let Some(pos) = self.types.iter().position(|old| old.name == new.name) {
            let old = &self.types[pos];
            let same_file = old.file_id == new.file_id;
            if matches!(new.merge, MergeMode::Replace | MergeMode::Override) {
                if (same_file && ctx.diag.warning_level() > 0) || ctx.diag.warning_level() > 9 {
                    ctx.diag.warn(format!(
                        "Multiple definitions of the {name_text} key type; \
                         earlier definition ignored"
                    ));
                }
                self.types[pos] = new;
            } else {
                if same_file {
                    ctx.diag.warn_lvl(
                        3,
                        format!(
                            "Multiple definitions of the {name_text} key type; \
                             later definition ignored"
                        ),
                    );
                }
            }
            return true;
        }

        self.types.push(new);
        true
    }

    fn find_matching_entry(
        entries: &[MapEntry],
        mods: ModMask,
        vmods: VModMask,
    ) -> Option<usize> {
        entries
            .iter()
            .position(|e| e.mods.real == mods && e.mods.vmods == vmods)
    }

    fn add_map_entry(
        &mut self,
        ctx: &mut Context,
        ty: &mut KeyTypeInfo,
        new: MapEntry,
        clobber: bool,
        report: bool,
    ) -> bool {
        if let Some(pos) = Self::find_matching_entry(&ty.entries, new.mods.real, new.mods.vmods) {
            let old_level = ty.entries[pos].level;
            if old_level != new.level {
                if report {
                    let (use_lvl, ignore_lvl) = if clobber {
                        (new.level + 1, old_level + 1)
                    } else {
                        (old_level + 1, new.level + 1)
                    };
                    ctx.diag.warn(format!(
                        "Multiple map entries for one combination in {}; \
                         using {use_lvl}, ignoring {ignore_lvl}",
                        self.type_text(ctx, ty)
                    ));
                }
                if clobber {
                    ty.entries[pos].level = new.level;
                }
            }
            return true;
        }
        if new.level >= ty.num_levels {
            ty.num_levels = new.level + 1;
        }
        ty.entries.push(new);
        true
    }

    fn add_preserve(
        &mut self,
        ctx: &mut Context,
        ty: &mut KeyTypeInfo,
        new: PreserveInfo,
        clobber: bool,
        report: bool,
    ) -> bool {
        for i in 0..ty.preserves.len() {
            let old = &ty.preserves[i];
            if old.index_mods != new.index_mods || old.index_vmods != new.index_vmods {
                continue;
            }
            if old.pre_mods == new.pre_mods && old.pre_vmods == new.pre_vmods {
                return true;
            }
            if report {
                ctx.diag.warn(format!(
                    "Multiple definitions for a preserve entry in {}",
                    self.type_text(ctx, ty)
                ));
            }
            if clobber {
                ty.preserves[i].pre_mods = new.pre_mods;
                ty.preserves[i].pre_vmods = new.pre_vmods;
            }
            return true;
        }
        ty.preserves.push(new);
        true
    }

    fn set_map_entry(
        &mut self,
        ctx: &mut Context,
        keymap: &Keymap,
        ty: &mut KeyTypeInfo,
        array_ndx: Option<&super::ast::Expr>,
        value: &super::ast::Expr,
    ) -> bool {
        let Some(index) = array_ndx else {
            ctx.diag.error(format!(
                "Missing subscript for map entry of {}",
                self.type_text(ctx, ty)
            ));
            return false;
        };
        let Some(mask) = expr::resolve_vmod_mask(ctx, keymap, index) else {
            ctx.diag.error(format!(
                "Map entry subscript of {} must be a modifier mask",
                self.type_text(ctx, ty)
            ));
            return false;
        };
        let (mut real, mut vmods) = expr::split_vmod_mask(mask);
        if !(real & !ty.mask).is_empty() || (vmods & !ty.vmask) != 0 {
            ctx.diag.warn_lvl(
                0,
                format!(
                    "Map entry for unused modifiers in {}; unused bits dropped",
                    self.type_text(ctx, ty)
                ),
            );
            real &= ty.mask;
            vmods &= ty.vmask;
        }
        let Some(level) = expr::resolve_level(ctx, value) else {
            ctx.diag.error(
                "Level specifications in a key type must be integer; \
                 ignoring malformed level specification"
                    .to_string(),
            );
            return false;
        };
        let entry = MapEntry {
            active: true,
            level: level - 1,
            mods: Mods::new(real, vmods),
        };
        self.add_map_entry(ctx, ty, entry, true, true)
    }

    fn set_preserve(
        &mut self,
        ctx: &mut Context,
        keymap: &Keymap,
        ty: &mut KeyTypeInfo,
        array_ndx: Option<&super::ast::Expr>,
        value: &super::ast::Expr,
    ) -> bool {
        let Some(index) = array_ndx else {
            ctx.diag.error(format!(
                "Missing subscript for preserve entry of {}",
                self.type_text(ctx, ty)
            ));
            return false;
        };
        let Some(mask) = expr::resolve_vmod_mask(ctx, keymap, index) else {
            ctx.diag.error(format!(
                "Preserve entry subscript of {} must be a modifier mask",
                self.type_text(ctx, ty)
            ));
            return false;
        };
        let (mut index_mods, mut index_vmods) = expr::split_vmod_mask(mask);
        if !(index_mods & !ty.mask).is_empty() || (index_vmods & !ty.vmask) != 0 {
            ctx.diag.warn_lvl(
                0,
                format!(
                    "Preserve for modifiers not used by the {} type; index trimmed",
                    self.type_text(ctx, ty)
                ),
            );
            index_mods &= ty.mask;
            index_vmods &= ty.vmask;
        }
        let Some(pre_mask) = expr::resolve_vmod_mask(ctx, keymap, value) else {
            ctx.diag.error(format!(
                "Preserve value in a key type is not a modifier mask; \
                 ignoring a preserve entry in type {}",
                self.type_text(ctx, ty)
            ));
            return false;
        };
        let (mut pre_mods, mut pre_vmods) = expr::split_vmod_mask(pre_mask);
        if !(pre_mods & !index_mods).is_empty() || (pre_vmods & !index_vmods) != 0 {
            ctx.diag.warn_lvl(
                0,
                format!(
                    "Illegal value for a preserve entry in type {}; \
                     converted to the index's modifiers",
                    self.type_text(ctx, ty)
                ),
            );
            pre_mods &= index_mods;
            pre_vmods &= index_vmods;
        }
        let preserve = PreserveInfo {
            index_mods,
            index_vmods,
            pre_mods,
            pre_vmods,
        };
        self.add_preserve(ctx, ty, preserve, true, true)
    }

    fn add_level_name(
        &mut self,
        ctx: &mut Context,
        ty: &mut KeyTypeInfo,
        level: usize,
        name: Atom,
        clobber: bool,
    ) -> bool {
        if ty.level_names.len() <= level {
            ty.level_names.resize(level + 1, Atom::NONE);
        }
        if ty.level_names[level] == name {
            return true;
        }
        if !ty.level_names[level].is_none() {
            ctx.diag.warn_lvl(
                0,
                format!(
                    "Multiple names for level {} of key type {}",
                    level + 1,
                    self.type_text(ctx, ty)
                ),
            );
            if !clobber {
                return true;
            }
        }
        ty.level_names[level] = name;
        true
    }

    fn set_level_name(
        &mut self,
        ctx: &mut Context,
        ty: &mut KeyTypeInfo,
        array_ndx: Option<&super::ast::Expr>,
        value: &super::ast::Expr,
    ) -> bool {
        let Some(index) = array_ndx else {
            ctx.diag.error(format!(
                "Missing subscript for level name of {}",
                self.type_text(ctx, ty)
            ));
            return false;
        };
        let Some(level) = expr::resolve_level(ctx, index) else {
            return false;
        };
        let Some(text) = expr::resolve_string(ctx, value) else {
            ctx.diag.error(format!(
                "Non-string name for level {} in key type {}; \
                 ignoring illegal level name definition",
                level,
                self.type_text(ctx, ty)
            ));
            return false;
        };
        let name = ctx.intern(&text);
        self.add_level_name(ctx, ty, (level - 1) as usize, name, true)
    }

    fn set_key_type_field(
        &mut self,
        ctx: &mut Context,
        keymap: &Keymap,
        ty: &mut KeyTypeInfo,
        field: &str,
        array_ndx: Option<&super::ast::Expr>,
        value: &super::ast::Expr,
    ) -> bool {
        if field.eq_ignore_ascii_case("modifiers") {
            if array_ndx.is_some() {
                ctx.diag.warn(
                    "The modifiers field of a key type is not an array; \
                     illegal array subscript ignored"
                        .to_string(),
                );
            }
            let Some(mask) = expr::resolve_vmod_mask(ctx, keymap, value) else {
                ctx.diag.error(
                    "Key type mask field must be a modifier mask; \
                     key type definition ignored"
                        .to_string(),
                );
                return false;
            };
            let (real, vmods) = expr::split_vmod_mask(mask);
            if ty.mask_defined {
                ctx.diag.warn(format!(
                    "Multiple modifier mask definitions for key type {}; \
                     using the first, ignoring the rest",
                    self.type_text(ctx, ty)
                ));
                return false;
            }
            ty.mask = real;
            ty.vmask = vmods;
            ty.mask_defined = true;
            true
        } else if field.eq_ignore_ascii_case("map") {
            self.set_map_entry(ctx, keymap, ty, array_ndx, value)
        } else if field.eq_ignore_ascii_case("preserve") {
            self.set_preserve(ctx, keymap, ty, array_ndx, value)
        } else if field.eq_ignore_ascii_case("levelname") || field.eq_ignore_ascii_case("level_name")
        {
            self.set_level_name(ctx, ty, array_ndx, value)
        } else {
            ctx.diag.error(format!(
                "Unknown field {field} in key type {}; definition ignored",
                self.type_text(ctx, ty)
            ));
            false
        }
    }

    fn handle_key_type_var(&mut self, ctx: &mut Context, keymap: &Keymap, stmt: &VarDef) -> bool {
        let Some(name) = &stmt.name else {
            return false;
        };
        let Some(value) = &stmt.value else {
            return false;
        };
        let Some((element, field, array_ndx)) = name.as_lhs() else {
            return false;
        };
        match element {
            Some(element) if element.eq_ignore_ascii_case("type") => {
                let mut dflt = std::mem::take(&mut self.dflt);
                let ok = self.set_key_type_field(ctx, keymap, &mut dflt, field, array_ndx, value);
                self.dflt = dflt;
                ok
            }
            Some(element) => {
                ctx.diag.error(format!(
                    "Default for unknown element {element}; value for field {field} ignored"
                ));
                false
            }
            None => {
                ctx.diag
                    .error(format!("Default defined for unknown field {field}; ignored"));
                false
            }
        }
    }

    fn handle_key_type_def(
        &mut self,
        ctx: &mut Context,
        keymap: &Keymap,
        def: &KeyTypeDef,
        merge: MergeMode,
    ) -> bool {
        let merge = def.merge.or(merge);
        let mut ty = KeyTypeInfo {
            file_id: self.file_id,
            merge,
            name: ctx.intern(&def.name),
            mask: self.dflt.mask,
            vmask: self.dflt.vmask,
            mask_defined: false,
            num_levels: 1,
            entries: Vec::new(),
            preserves: Vec::new(),
            level_names: Vec::new(),
        };

        for var in &def.body {
            let Some(name) = &var.name else { continue };
            let (is_default, field, array_ndx, value) = match (name.as_lhs(), &var.value) {
                (Some((element, field, array_ndx)), Some(value)) => (
                    element.is_some(),
                    field.to_string(),
                    array_ndx,
                    value,
                ),
                _ => continue,
            };
            let ok = if is_default {
                self.handle_key_type_var(ctx, keymap, var)
            } else {
                self.set_key_type_field(ctx, keymap, &mut ty, &field, array_ndx, value)
            };
            if !ok {
                self.errors += 1;
                return false;
            }
        }

        // Copy applicable defaults from the section's `type.*` settings.
        let dflt_entries = self.dflt.entries.clone();
        for entry in dflt_entries {
            if (entry.mods.real & ty.mask) == entry.mods.real
                && (entry.mods.vmods & ty.vmask) == entry.mods.vmods
            {
                self.add_map_entry(ctx, &mut ty, entry, false, false);
            }
        }
        let dflt_preserves = self.dflt.preserves.clone();
        for preserve in dflt_preserves {
            if (preserve.index_mods & ty.mask) == preserve.index_mods
                && (preserve.index_vmods & ty.vmask) == preserve.index_vmods
            {
                self.add_preserve(ctx, &mut ty, preserve, false, false);
            }
        }
        let dflt_level_names = self.dflt.level_names.clone();
        for (level, name) in dflt_level_names.into_iter().enumerate() {
            if (level as u16) < ty.num_levels && !name.is_none() {
                self.add_level_name(ctx, &mut ty, level, name, false);
            }
        }

        if !self.add_key_type(ctx, ty) {
            self.errors += 1;
            return false;
        }
        true
    }
}

impl IncludeTarget for KeyTypesInfo {
    const FILE_TYPE: FileType = FileType::Types;

    fn fresh(&self, _ctx: &mut Context, keymap: &mut Keymap, file_id: u32) -> Self {
        KeyTypesInfo::new(keymap, file_id, Some(self))
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
                Stmt::KeyType(def) => self.handle_key_type_def(ctx, keymap, def, merge),
                Stmt::Var(def) => self.handle_key_type_var(ctx, keymap, def),
                Stmt::VModList(defs) => {
                    let mut ok = true;
                    for def in defs {
                        let mut vmods = self.vmods;
                        ok &= vmod::handle_vmod_def(ctx, keymap, def, merge, &mut vmods);
                        self.vmods = vmods;
                    }
                    ok
                }
                other => {
                    ctx.diag.error(format!(
                        "Key type files may not include other declarations; \
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
                    .action(format!("Abandoning keytypes file \"{}\"", file.top_name));
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
        for mut ty in from.types {
            ty.merge = merge.or(ty.merge);
            if !self.add_key_type(ctx, ty) {
                self.errors += 1;
            }
        }
        self.std_present |= from.std_present;
    }
}

fn copy_info_to_type(info: &KeyTypeInfo) -> KeyType {
    let mut map = info.entries.clone();
    // Entries selecting level one exist only to carry a preserve; the
    // rest are the implicit default and are dropped.
    map.retain(|entry| {
        entry.level != 0
            || info.preserves.iter().any(|p| {
                p.index_mods == entry.mods.real && p.index_vmods == entry.mods.vmods
            })
    });
    for preserve in &info.preserves {
        if !map
            .iter()
            .any(|e| e.mods.real == preserve.index_mods && e.mods.vmods == preserve.index_vmods)
        {
            map.push(MapEntry {
                active: true,
                level: 0,
                mods: Mods::new(preserve.index_mods, preserve.index_vmods),
            });
        }
    }

    let preserve = if info.preserves.is_empty() {
        Vec::new()
    } else {
        map.iter()
            .map(|entry| {
                info.preserves
                    .iter()
                    .find(|p| {
                        p.index_mods == entry.mods.real && p.index_vmods == entry.mods.vmods
                    })
                    .map(|p| Mods::new(p.pre_mods, p.pre_vmods))
                    .unwrap_or_default()
            })
            .collect()
    };

    KeyType {
        name: info.name,
        mods: Mods::new(info.mask, info.vmask),
        num_levels: info.num_levels,
        map,
        preserve,
        level_names: info.level_names.clone(),
    }
}

fn canonical_type(ctx: &mut Context, index: usize, keypad_vmod: Option<u8>) -> KeyType {
    match index {
        ONE_LEVEL_INDEX => KeyType {
            name: ctx.intern("ONE_LEVEL"),
            mods: Mods::default(),
            num_levels: 1,
            map: Vec::new(),
            preserve: Vec::new(),
            level_names: Vec::new(),
        },
        TWO_LEVEL_INDEX => KeyType {
            name: ctx.intern("TWO_LEVEL"),
            mods: Mods::from_real(ModMask::SHIFT),
            num_levels: 2,
            map: vec![MapEntry {
                active: true,
                level: 1,
                mods: Mods::from_real(ModMask::SHIFT),
            }],
            preserve: Vec::new(),
            level_names: Vec::new(),
        },
        ALPHABETIC_INDEX => KeyType {
            name: ctx.intern("ALPHABETIC"),
            mods: Mods::from_real(ModMask::SHIFT | ModMask::LOCK),
            num_levels: 2,
            map: vec![
                MapEntry {
                    active: true,
                    level: 1,
                    mods: Mods::from_real(ModMask::SHIFT),
                },
                MapEntry {
                    active: true,
                    level: 1,
                    mods: Mods::from_real(ModMask::LOCK),
                },
            ],
            preserve: vec![Mods::default(), Mods::from_real(ModMask::LOCK)],
            level_names: Vec::new(),
        },
        KEYPAD_INDEX => {
            let vmask: VModMask = keypad_vmod.map(|v| 1 << v).unwrap_or(0);
            let mut map = vec![MapEntry {
                active: true,
                level: 1,
                mods: Mods::from_real(ModMask::SHIFT),
            }];
            if vmask != 0 {
                map.push(MapEntry {
                    active: true,
                    level: 1,
                    mods: Mods::new(ModMask::empty(), vmask),
                });
            }
            KeyType {
                name: ctx.intern("KEYPAD"),
                mods: Mods::new(ModMask::SHIFT, vmask),
                num_levels: 2,
                map,
                preserve: Vec::new(),
                level_names: Vec::new(),
            }
        }
        _ => unreachable!("not a canonical type index"),
    }
}

/// Compile an `xkb_types` section into the keymap, synthesizing any
/// missing canonical type.
pub(crate) fn compile_key_types(
    ctx: &mut Context,
    keymap: &mut Keymap,
    file: &XkbFile,
    merge: MergeMode,
) -> bool {
    let mut info = KeyTypesInfo::new(keymap, file.id, None);
    info.handle_file(ctx, keymap, file, merge);

    if info.errors != 0 {
        return false;
    }

    let keypad_vmod = vmod::find_keypad_vmod(keymap);
    let mut types: Vec<KeyType> = Vec::with_capacity(info.types.len() + 4);
    for index in [
        ONE_LEVEL_INDEX,
        TWO_LEVEL_INDEX,
        ALPHABETIC_INDEX,
        KEYPAD_INDEX,
    ] {
        types.push(canonical_type(ctx, index, keypad_vmod));
    }

    for def in &info.types {
        let compiled = copy_info_to_type(def);
        let name = ctx.atom_text(def.name).to_string();
        let slot = match name.as_str() {
            "ONE_LEVEL" => Some(ONE_LEVEL_INDEX),
            "TWO_LEVEL" => Some(TWO_LEVEL_INDEX),
            "ALPHABETIC" => Some(ALPHABETIC_INDEX),
            "KEYPAD" => Some(KEYPAD_INDEX),
            _ => None,
        };
        match slot {
            Some(slot) => types[slot] = compiled,
            None => types.push(compiled),
        }
    }

    keymap.types = types;
    keymap.names.types = info.name;
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
        let ok = compile_key_types(&mut ctx, &mut keymap, &files[0], MergeMode::Override);
        keymap.atoms = ctx.atoms.clone();
        (ctx, keymap, ok)
    }

    #[test]
    fn canonical_types_synthesized_when_absent() {
        let (ctx, keymap, ok) = compile(r#"xkb_types "empty" { };"#);
        assert!(ok);
        assert!(keymap.types().len() >= 4);
        assert_eq!(ctx.atom_text(keymap.types()[ONE_LEVEL_INDEX].name), "ONE_LEVEL");
        assert_eq!(keymap.types()[TWO_LEVEL_INDEX].num_levels, 2);
        assert_eq!(
            keymap.types()[ALPHABETIC_INDEX].mods.real,
            ModMask::SHIFT | ModMask::LOCK
        );
    }

    #[test]
    fn declared_type_is_compiled() {
        let (ctx, keymap, ok) = compile(
            r#"xkb_types "basic" {
                type "PC_CONTROL_LEVEL2" {
                    modifiers = Control;
                    map[Control] = Level2;
                    level_name[Level1] = "Base";
                    level_name[Level2] = "Control";
                };
            };"#,
        );
        assert!(ok);
        let idx = keymap
            .type_by_name(keymap.atoms.clone().intern("PC_CONTROL_LEVEL2"))
            .expect("type present");
        let ty = &keymap.types()[idx];
        assert_eq!(ty.num_levels, 2);
        assert_eq!(ty.map.len(), 1);
        assert_eq!(ty.map[0].mods.real, ModMask::CONTROL);
        assert_eq!(ty.map[0].level, 1);
        assert_eq!(ctx.atom_text(ty.level_names[1]), "Control");
    }

    #[test]
    fn map_entries_are_trimmed_to_the_type_mask() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_types "trim" {
                type "T" {
                    modifiers = Shift;
                    map[Shift+Control] = Level2;
                };
            };"#,
        );
        assert!(ok);
        let ty = keymap.types().last().unwrap();
        assert_eq!(ty.map[0].mods.real, ModMask::SHIFT);
    }

    #[test]
    fn preserve_requires_subset() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_types "p" {
                type "CAPS" {
                    modifiers = Shift + Lock;
                    map[Shift] = Level2;
                    map[Lock] = Level2;
                    preserve[Lock] = Lock;
                };
            };"#,
        );
        assert!(ok);
        let ty = keymap.types().last().unwrap();
        assert!(!ty.preserve.is_empty());
        for (entry, preserve) in ty.map.iter().zip(ty.preserve.iter()) {
            assert_eq!(preserve.real & !entry.mods.real, ModMask::empty());
            assert_eq!(entry.mods.real & !ty.mods.real, ModMask::empty());
        }
    }

    #[test]
    fn declared_canonical_replaces_builtin() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_types "basic" {
                type "TWO_LEVEL" {
                    modifiers = Shift;
                    map[Shift] = Level2;
                    level_name[Level1] = "Base";
                };
            };"#,
        );
        assert!(ok);
        let ty = &keymap.types()[TWO_LEVEL_INDEX];
        assert_eq!(ty.num_levels, 2);
        assert!(!ty.level_names.is_empty());
    }

    #[test]
    fn canonical_width_is_enforced() {
        let (ctx, _keymap, _ok) = compile(
            r#"xkb_types "bad" {
                type "ONE_LEVEL" {
                    modifiers = Shift;
                    map[Shift] = Level2;
                };
            };"#,
        );
        assert!(ctx.error_count() > 0);
    }

    #[test]
    fn keypad_uses_numlock_vmod() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_types "kp" {
                virtual_modifiers NumLock;
            };"#,
        );
        assert!(ok);
        let ty = &keymap.types()[KEYPAD_INDEX];
        assert_eq!(ty.mods.vmods, 1 << 0);
        assert_eq!(ty.map.len(), 2);
    }
}
