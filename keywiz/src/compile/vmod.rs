//! Virtual modifier declarations and resolution.
//!
//! `virtual_modifiers` statements claim one of the eight named slots;
//! after all sections are compiled, each slot's real mask is the OR of
//! the modmap bits of every key carrying that slot's vmodmap bit,
//! seeded by any explicit `Name = mask` declaration.

use super::ast::{MergeMode, VModDef};
use super::expr;
use crate::context::Context;
use crate::keymap::{Keymap, ModMask, NUM_VMODS};

/// Tracks which vmod slots a section has seen, so later statements in
/// the same section can reference them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VModInfo {
    defined: u16,
    available: u16,
}

impl VModInfo {
    pub fn new(keymap: &Keymap) -> Self {
        let mut defined = 0u16;
        for (i, &name) in keymap.vmod_names.iter().enumerate() {
            if !name.is_none() {
                defined |= 1 << i;
            }
        }
        Self {
            defined,
            available: defined,
        }
    }
}

/// Handle one name out of a `virtual_modifiers` statement.
pub(crate) fn handle_vmod_def(
    ctx: &mut Context,
    keymap: &mut Keymap,
    stmt: &VModDef,
    merge: MergeMode,
    info: &mut VModInfo,
) -> bool {
    let merge = stmt.merge.or(merge);
    let name_atom = ctx.intern(&stmt.name);

    let mut next_free = None;
    for i in 0..NUM_VMODS {
        let bit = 1u16 << i;
        if info.defined & bit != 0 {
            if keymap.vmod_names[i] == name_atom {
                info.available |= bit;
                let Some(value) = &stmt.value else {
                    return true;
                };
                let Some(mask) = expr::resolve_mod_mask(ctx, value) else {
                    ctx.diag
                        .action(format!("Declaration of {} ignored", stmt.name));
                    return false;
                };
                if mask == keymap.vmod_masks[i] {
                    return true;
                }
                ctx.diag
                    .warn(format!("Virtual modifier {} multiply defined", stmt.name));
                if merge.clobbers() {
                    keymap.vmod_masks[i] = mask;
                }
                return true;
            }
        } else if next_free.is_none() {
            next_free = Some(i);
        }
    }

    let Some(slot) = next_free else {
        ctx.diag.error(format!(
            "Too many virtual modifiers defined (maximum {NUM_VMODS})"
        ));
        return false;
    };
    let bit = 1u16 << slot;
    info.defined |= bit;
    info.available |= bit;
    keymap.vmod_names[slot] = name_atom;
    if let Some(value) = &stmt.value {
        match expr::resolve_mod_mask(ctx, value) {
            Some(mask) => keymap.vmod_masks[slot] = mask,
            None => {
                ctx.diag
                    .action(format!("Declaration of {} ignored", stmt.name));
                return false;
            }
        }
    }
    true
}

/// The slot of the virtual modifier conventionally driving the keypad,
/// if one is named.
pub(crate) fn find_keypad_vmod(keymap: &Keymap) -> Option<u8> {
    keymap.vmod_index_for_name("NumLock")
}

/// Recompute every slot's real mask from the modmap and vmodmap (§ data
/// model): `real_mask(v) = OR of modmap[k] for keys k with bit v set`.
/// Explicitly declared masks are kept and extended.
pub(crate) fn resolve_vmod_masks(keymap: &mut Keymap) {
    let mut masks = keymap.vmod_masks;
    for kc in keymap.min_key_code..=keymap.max_key_code {
        let vmods = keymap.vmodmap[kc as usize];
        if vmods == 0 {
            continue;
        }
        let real = keymap.modmap[kc as usize];
        for (i, mask) in masks.iter_mut().enumerate() {
            if vmods & (1 << i) != 0 {
                *mask |= real;
            }
        }
    }
    keymap.vmod_masks = masks;
}

/// Resolve a type-level `Mods` against the computed vmod masks.
pub(crate) fn resolve_mods(keymap: &Keymap, mods: &mut crate::keymap::Mods) {
    mods.mask = mods.real | keymap.vmods_to_real(mods.vmods);
}

/// Recompute the effective masks of every key type and map entry, and
/// mark entries whose virtual modifiers resolve to nothing inactive.
pub(crate) fn update_effective_type_masks(keymap: &mut Keymap) {
    let mut types = std::mem::take(&mut keymap.types);
    for ty in types.iter_mut() {
        ty.mods.mask = ty.mods.real | keymap.vmods_to_real(ty.mods.vmods);
        for entry in ty.map.iter_mut() {
            let vmask = keymap.vmods_to_real(entry.mods.vmods);
            if entry.mods.vmods != 0 && vmask.is_empty() {
                entry.active = false;
                continue;
            }
            entry.active = true;
            entry.mods.mask = (entry.mods.real | vmask) & ty.mods.mask;
        }
        for preserve in ty.preserve.iter_mut() {
            preserve.mask = preserve.real | keymap.vmods_to_real(preserve.vmods);
        }
    }
    keymap.types = types;

    let mut groups = keymap.group_compat;
    for group in groups.iter_mut() {
        group.mask = group.real | keymap.vmods_to_real(group.vmods);
    }
    keymap.group_compat = groups;

    let mut maps = keymap.indicator_maps;
    for map in maps.iter_mut() {
        map.mods.mask = map.mods.real | keymap.vmods_to_real(map.mods.vmods);
    }
    keymap.indicator_maps = maps;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::atom::Atoms;

    fn keymap_with_range() -> Keymap {
        let mut keymap = Keymap::new(Atoms::new());
        keymap.min_key_code = 8;
        keymap.max_key_code = 20;
        keymap.resize_key_tables();
        keymap
    }

    #[test]
    fn masks_derive_from_modmap() {
        let mut keymap = keymap_with_range();
        let mut ctx = Context::new();
        keymap.vmod_names[0] = ctx.intern("NumLock");
        keymap.vmodmap[10] = 1 << 0;
        keymap.modmap[10] = ModMask::MOD2;
        resolve_vmod_masks(&mut keymap);
        assert_eq!(keymap.vmod_mask(0), ModMask::MOD2);
    }

    #[test]
    fn declared_mask_is_kept_and_extended() {
        let mut keymap = keymap_with_range();
        let mut ctx = Context::new();
        keymap.vmod_names[0] = ctx.intern("Alt");
        keymap.vmod_masks[0] = ModMask::MOD1;
        keymap.vmodmap[12] = 1 << 0;
        keymap.modmap[12] = ModMask::MOD5;
        resolve_vmod_masks(&mut keymap);
        assert_eq!(keymap.vmod_mask(0), ModMask::MOD1 | ModMask::MOD5);
    }

    #[test]
    fn capacity_is_eight() {
        let mut keymap = keymap_with_range();
        let mut ctx = Context::new();
        let mut info = VModInfo::new(&keymap);
        for i in 0..NUM_VMODS {
            let stmt = VModDef {
                merge: MergeMode::Default,
                name: format!("V{i}"),
                value: None,
            };
            assert!(handle_vmod_def(
                &mut ctx,
                &mut keymap,
                &stmt,
                MergeMode::Override,
                &mut info
            ));
        }
        let stmt = VModDef {
            merge: MergeMode::Default,
            name: "TooMany".to_string(),
            value: None,
        };
        assert!(!handle_vmod_def(
            &mut ctx,
            &mut keymap,
            &stmt,
            MergeMode::Override,
            &mut info
        ));
    }
}
