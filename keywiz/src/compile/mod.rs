//! The keyboard description compiler.
//!
//! Text goes in one end; a frozen [`Keymap`] comes out the other.  The
//! pipeline is: scanner → parser → AST → per-section compilers (each
//! possibly recursing through includes) → finalize.  Finalize resolves
//! virtual modifiers, applies symbol interpretations to keys that
//! lack explicit actions, recomputes every effective modifier mask,
//! and binds indicator maps to their slots.

pub mod ast;
pub(crate) mod action;
pub(crate) mod alias;
pub(crate) mod compat;
pub(crate) mod expr;
pub(crate) mod geometry;
pub(crate) mod include;
pub(crate) mod keycodes;
pub mod parser;
pub(crate) mod scanner;
pub(crate) mod symbols;
pub(crate) mod types;
pub(crate) mod vmod;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::keymap::actions::{Action, ActionFlags};
use crate::keymap::{ComponentNames, Explicit, Keymap, Mods, NUM_INDICATORS};
use crate::keysym::NO_SYMBOL;
use ast::{FileFlags, FileType, IncludeStmt, MergeMode, Stmt, XkbFile};
use parser::{parse_include_chain, Parser};

/// Compile a keymap from a source string holding an `xkb_keymap` block
/// (or several; `map_name` picks one).
pub fn compile_keymap_from_source(
    ctx: &mut Context,
    source: &str,
    map_name: Option<&str>,
) -> Result<Keymap> {
    let files = Parser::new(source, "(input)")?.parse_files(ctx)?;
    let file = include::choose_map(ctx, files, map_name, "(input)")?;
    if file.file_type != FileType::Keymap {
        ctx.diag
            .error(format!("File type {} not handled", file.file_type.name()));
        return Err(Error::WrongFileType {
            expected: FileType::Keymap.name(),
            found: file.file_type.name(),
        });
    }
    compile_keymap(ctx, &file)
}

/// Compile a keymap for a `{rules, model, layout, variant, options}`
/// tuple: the named rules file expands the tuple into component names,
/// which then load and compile from the search path.
pub fn compile_keymap_from_rules(
    ctx: &mut Context,
    rmlvo: &crate::rules::RuleNames,
) -> Result<Keymap> {
    let components = crate::rules::components_from_rules(ctx, rmlvo)?;
    compile_keymap_from_components(ctx, &components)
}

/// Compile a keymap from five component `file(map)` specifiers.  The
/// keycodes component is required; the others may be absent.
pub fn compile_keymap_from_components(
    ctx: &mut Context,
    components: &ComponentNames,
) -> Result<Keymap> {
    if components
        .keycodes
        .as_deref()
        .map(str::is_empty)
        .unwrap_or(true)
    {
        ctx.diag
            .error("Keycodes required to generate a keymap".to_string());
        return Err(Error::CompileFailed(1));
    }

    let mut defs = Vec::new();
    let specs = [
        (FileType::KeyNames, components.keycodes.as_deref()),
        (FileType::Types, components.types.as_deref()),
        (FileType::CompatMap, components.compat.as_deref()),
        (FileType::Symbols, components.symbols.as_deref()),
        (FileType::Geometry, components.geometry.as_deref()),
    ];
    for (file_type, spec) in specs {
        let Some(spec) = spec.filter(|s| !s.is_empty()) else {
            continue;
        };
        let Some(chain) = parse_include_chain(spec, MergeMode::Default) else {
            ctx.diag
                .error(format!("Illegal include statement \"{spec}\""));
            return Err(Error::CompileFailed(1));
        };
        defs.push(Stmt::File(XkbFile {
            file_type,
            top_name: spec.to_string(),
            name: String::new(),
            flags: FileFlags::empty(),
            id: ctx.alloc_file_id(),
            defs: vec![Stmt::Include(IncludeStmt {
                merge: MergeMode::Default,
                stmt: spec.to_string(),
                chain,
            })],
        }));
    }

    let container = XkbFile {
        file_type: FileType::Keymap,
        top_name: "(components)".to_string(),
        name: components.keymap.clone().unwrap_or_default(),
        flags: FileFlags::empty(),
        id: ctx.alloc_file_id(),
        defs,
    };
    compile_keymap(ctx, &container)
}

/// Compile an `xkb_keymap` container: one pass per section in fixed
/// order, then finalize.
pub(crate) fn compile_keymap(ctx: &mut Context, file: &XkbFile) -> Result<Keymap> {
    let mut sections: [Option<&XkbFile>; 5] = [None; 5];
    for stmt in &file.defs {
        let Stmt::File(section) = stmt else {
            ctx.diag.error(format!(
                "Interpretation files may not include other types; \
                 ignoring {}",
                stmt.kind()
            ));
            continue;
        };
        let slot = match section.file_type {
            FileType::KeyNames => 0,
            FileType::Types => 1,
            FileType::CompatMap => 2,
            FileType::Symbols => 3,
            FileType::Geometry => 4,
            other => {
                ctx.diag
                    .error(format!("Illegal {} section in a keymap", other.name()));
                continue;
            }
        };
        if sections[slot].is_some() {
            ctx.diag.warn(format!(
                "Multiple {} sections in a keymap; using the first",
                section.file_type.name()
            ));
            continue;
        }
        sections[slot] = Some(section);
    }

    let mut keymap = Keymap::new(ctx.atoms.clone());
    keymap.names.keymap = if file.name.is_empty() {
        None
    } else {
        Some(file.name.clone())
    };

    let empty_types;
    let types_file = match sections[1] {
        Some(file) => file,
        None => {
            // The canonical types must exist even without a section.
            empty_types = XkbFile {
                file_type: FileType::Types,
                top_name: file.top_name.clone(),
                name: String::new(),
                flags: FileFlags::empty(),
                id: ctx.alloc_file_id(),
                defs: Vec::new(),
            };
            &empty_types
        }
    };

    let Some(keycodes_file) = sections[0] else {
        ctx.diag
            .error("Keymap is missing an xkb_keycodes section".to_string());
        return Err(Error::CompileFailed(1));
    };

    let mut failed = 0usize;
    if !keycodes::compile_keycodes(ctx, &mut keymap, keycodes_file, MergeMode::Override) {
        failed += 1;
    }
    if failed == 0 && !types::compile_key_types(ctx, &mut keymap, types_file, MergeMode::Override) {
        failed += 1;
    }
    let mut unbound_leds = Vec::new();
    if failed == 0 {
        if let Some(compat_file) = sections[2] {
            if !compat::compile_compat_map(
                ctx,
                &mut keymap,
                compat_file,
                MergeMode::Override,
                &mut unbound_leds,
            ) {
                failed += 1;
            }
        }
    }
    if failed == 0 {
        if let Some(symbols_file) = sections[3] {
            if !symbols::compile_symbols(ctx, &mut keymap, symbols_file, MergeMode::Override) {
                failed += 1;
            }
        }
    }
    if failed == 0 {
        if let Some(geometry_file) = sections[4] {
            if !geometry::compile_geometry(ctx, &mut keymap, geometry_file, MergeMode::Override) {
                failed += 1;
            }
        }
    }
    if failed > 0 {
        ctx.diag.error("Failed to compile keymap".to_string());
        return Err(Error::CompileFailed(ctx.error_count().max(1)));
    }

    finalize_keymap(ctx, &mut keymap, unbound_leds);
    keymap.atoms = ctx.atoms.clone();
    Ok(keymap)
}

/// The post-section passes that turn the accumulated arenas into a
/// coherent keymap.
fn finalize_keymap(ctx: &mut Context, keymap: &mut Keymap, unbound_leds: Vec<compat::LedInfo>) {
    apply_interps(keymap);
    vmod::resolve_vmod_masks(keymap);
    vmod::update_effective_type_masks(keymap);
    resolve_action_mods(keymap);
    bind_unbound_leds(ctx, keymap, unbound_leds);
    if keymap.num_groups == 0 {
        keymap.num_groups = 1;
    }
    keymap.enabled_ctrls = action::DEFAULT_ENABLED_CONTROLS;
}

/// Synthesize actions, repeat flags and vmodmap bits for keys whose
/// symbols statement gave none, from the symbol interpretations.
fn apply_interps(keymap: &mut Keymap) {
    if keymap.interps.is_empty() {
        return;
    }

    for kc in keymap.min_key_code..=keymap.max_key_code {
        if keymap.explicit[kc as usize].contains(Explicit::INTERPRET) {
            continue;
        }
        let num_groups = keymap.key_num_groups(kc) as usize;
        let width = keymap.key_width(kc) as usize;
        if num_groups == 0 || width == 0 {
            continue;
        }
        let modmap_bits = keymap.modmap[kc as usize];

        let mut acts = vec![Action::None; num_groups * width];
        let mut have_actions = false;
        let mut repeat_hint: Option<bool> = None;
        let mut vmodmap_add: u16 = 0;

        for group in 0..num_groups {
            for level in 0..width {
                let sym = keymap.key_sym(kc, group, level);
                if sym == NO_SYMBOL && !(group == 0 && level == 0) {
                    continue;
                }
                let level_one = group == 0 && level == 0;
                let matched = keymap.interps.iter().find(|interp| {
                    if interp.sym != sym && interp.sym != NO_SYMBOL {
                        return false;
                    }
                    let mods = if !interp.level_one_only || level_one {
                        modmap_bits
                    } else {
                        crate::keymap::ModMask::empty()
                    };
                    interp.match_op.matches(interp.mods, mods)
                });
                let Some(interp) = matched else { continue };
                if !interp.action.is_none() && (level_one || !interp.level_one_only) {
                    acts[group * width + level] = interp.action.clone();
                    have_actions = true;
                }
                if level_one {
                    if interp.repeat {
                        repeat_hint = Some(true);
                    }
                    if let Some(vmod) = interp.virtual_mod {
                        vmodmap_add |= 1 << vmod;
                    }
                } else if !interp.level_one_only {
                    if let Some(vmod) = interp.virtual_mod {
                        vmodmap_add |= 1 << vmod;
                    }
                }
            }
        }

        if have_actions {
            let offset = keymap.acts.len() as u32;
            keymap.acts.extend(acts);
            keymap.key_sym_maps[kc as usize].acts_offset = Some(offset);
        }
        if !keymap.explicit[kc as usize].contains(Explicit::AUTO_REPEAT) {
            if let Some(repeat) = repeat_hint {
                keymap.repeats[kc as usize] = repeat;
            }
        }
        if !keymap.explicit[kc as usize].contains(Explicit::VMODMAP) {
            keymap.vmodmap[kc as usize] |= vmodmap_add;
        }
    }
}

/// Resolve the modifier actions' effective masks: `useModMapMods`
/// actions take the owning key's modmap, and virtual bits resolve
/// through the computed vmod masks.
fn resolve_action_mods(keymap: &mut Keymap) {
    for kc in keymap.min_key_code..=keymap.max_key_code {
        let Some(map) = keymap.key_sym_maps.get(kc as usize).copied() else {
            continue;
        };
        let Some(offset) = map.acts_offset else {
            continue;
        };
        let modmap_bits = keymap.modmap[kc as usize];
        let total = map.num_groups as usize * map.width as usize;
        let mut acts = std::mem::take(&mut keymap.acts);
        for action in acts.iter_mut().skip(offset as usize).take(total) {
            if let Action::SetMods(act) | Action::LatchMods(act) | Action::LockMods(act) = action
            {
                if act.flags.contains(ActionFlags::USE_MODMAP_MODS) {
                    act.mods = Mods::from_real(modmap_bits);
                }
                act.mods.mask = act.mods.real | keymap.vmods_to_real(act.mods.vmods);
            }
        }
        keymap.acts = acts;
    }
}

/// Bind indicator maps that named no index: first by name against the
/// indicator names from the keycodes section, then force the leftovers
/// into free slots (marked virtual).
fn bind_unbound_leds(ctx: &mut Context, keymap: &mut Keymap, unbound: Vec<compat::LedInfo>) {
    for led in unbound {
        let by_name = (0..NUM_INDICATORS).find(|&i| keymap.indicator_names[i] == led.name);
        let slot = by_name.or_else(|| {
            let free = (0..NUM_INDICATORS).find(|&i| keymap.indicator_names[i].is_none());
            if let Some(slot) = free {
                keymap.phys_indicators &= !(1 << slot);
            }
            free
        });
        match slot {
            Some(slot) => compat::bind_indicator_map(keymap, &led, slot),
            None => {
                ctx.diag.error("No unnamed indicators found".to_string());
                ctx.diag.action(format!(
                    "Virtual indicator map \"{}\" not bound",
                    ctx.atom_text(led.name)
                ));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keymap::ModMask;

    const SOURCE: &str = r#"
        xkb_keymap "test" {
            xkb_keycodes "evdev" {
                minimum = 8;
                maximum = 255;
                <AC01> = 38;
                <LFSH> = 50;
                <CAPS> = 66;
                <NMLK> = 77;
                indicator 1 = "Caps Lock";
                indicator 2 = "Num Lock";
            };
            xkb_types "basic" {
                virtual_modifiers NumLock;
            };
            xkb_compat "basic" {
                interpret Shift_L+AnyOf(all) {
                    action = SetMods(modifiers=Shift);
                };
                interpret Caps_Lock+AnyOfOrNone(all) {
                    action = LockMods(modifiers=Lock);
                };
                interpret Num_Lock+AnyOf(all) {
                    virtualModifier = NumLock;
                    action = LockMods(modifiers=NumLock);
                };
                indicator "Caps Lock" {
                    whichModState = locked;
                    modifiers = Lock;
                };
            };
            xkb_symbols "us" {
                key <AC01> { [ a, A ] };
                key <LFSH> { [ Shift_L ] };
                key <CAPS> { [ Caps_Lock ] };
                key <NMLK> { [ Num_Lock ] };
                modifier_map Shift { <LFSH> };
                modifier_map Lock { <CAPS> };
                modifier_map Mod2 { <NMLK> };
            };
        };
    "#;

    #[test]
    fn full_compile_produces_a_keymap() {
        let mut ctx = Context::new();
        let keymap = compile_keymap_from_source(&mut ctx, SOURCE, None).unwrap();
        assert_eq!(keymap.min_key_code(), 8);
        assert_eq!(keymap.key_sym(38, 0, 0), 0x61);
        assert!(keymap.key_has_actions(50));
        assert!(matches!(keymap.key_action(50, 0, 0), Action::SetMods(_)));
        assert!(matches!(keymap.key_action(66, 0, 0), Action::LockMods(_)));
    }

    #[test]
    fn virtual_modifier_resolution() {
        let mut ctx = Context::new();
        let keymap = compile_keymap_from_source(&mut ctx, SOURCE, None).unwrap();
        // NumLock's interp adds the vmodmap bit; <NMLK> carries Mod2.
        let numlock = keymap.vmod_index_for_name("NumLock").unwrap();
        assert_eq!(keymap.vmod_mask(numlock), ModMask::MOD2);
        // The KEYPAD type's effective mask includes Mod2 now.
        let keypad = &keymap.types()[crate::keymap::KEYPAD_INDEX];
        assert!(keypad.mods.mask.contains(ModMask::MOD2));
        // ...and the NumLock lock action resolves to Mod2.
        let Action::LockMods(act) = keymap.key_action(77, 0, 0) else {
            panic!("expected LockMods");
        };
        assert_eq!(act.mods.vmods, 1 << numlock);
    }

    #[test]
    fn keymap_invariants_hold() {
        let mut ctx = Context::new();
        let keymap = compile_keymap_from_source(&mut ctx, SOURCE, None).unwrap();
        for kc in keymap.min_key_code()..=keymap.max_key_code() {
            if keymap.key_name(kc).is_none() {
                continue;
            }
            if keymap.key_num_groups(kc) == 0 {
                continue;
            }
            let map = keymap.key_sym_map(kc).unwrap();
            let end = map.syms_offset as usize
                + map.num_groups as usize * map.width as usize;
            assert!(end <= keymap.syms.len(), "symbol offset past arena");
            for group in 0..map.num_groups as usize {
                let ty = keymap.key_type(kc, group);
                assert!(ty.num_levels >= 1);
                for (i, entry) in ty.map.iter().enumerate() {
                    assert!(
                        entry.mods.mask & !ty.mods.mask == ModMask::empty(),
                        "entry mask outside type mask"
                    );
                    if let Some(p) = ty.preserve.get(i) {
                        assert!(
                            p.mask & !entry.mods.mask == ModMask::empty()
                                || entry.mods.mask.is_empty(),
                            "preserve outside entry"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn missing_map_is_an_error() {
        let mut ctx = Context::new();
        assert!(compile_keymap_from_source(&mut ctx, SOURCE, Some("nope")).is_err());
    }

    #[test]
    fn bare_section_is_rejected() {
        let mut ctx = Context::new();
        let err = compile_keymap_from_source(&mut ctx, "xkb_symbols \"x\" { };", None)
            .unwrap_err();
        assert!(matches!(err, Error::WrongFileType { .. }));
    }

    #[test]
    fn indicator_bound_by_name() {
        let mut ctx = Context::new();
        let source = SOURCE.replace(
            "indicator \"Caps Lock\" {\n                    whichModState = locked;",
            "indicator \"Num Lock\" {\n                    whichModState = locked;",
        );
        let keymap = compile_keymap_from_source(&mut ctx, &source, None).unwrap();
        // "Num Lock" was named as indicator 2 by the keycodes section.
        let map = keymap.indicator_map(1).unwrap();
        assert!(!map.which_mods.is_empty());
    }
}
