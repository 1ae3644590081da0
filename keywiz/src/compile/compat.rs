//! The compat section compiler.
//!
//! Collects symbol interpretations (`interpret sym+pred(mask) {...}`),
//! per-group compatibility masks (`group N = mask;`), and indicator
//! maps (`indicator "Name" {...}`).  Interpretations are copied into the
//! keymap ordered most-specific-first; indicator maps bind to their slot
//! by index here or by name at finalize time.

use super::action::{ActionDefaults, handle_action_def, CONTROL_NAMES};
use super::ast::{
    Expr, FileType, GroupCompatDef, IndicatorMapDef, InterpDef, MergeMode, Stmt, VarDef, XkbFile,
};
use super::expr::{self, LookupTable};
use super::include::{handle_include, IncludeTarget};
use super::vmod::{self, VModInfo};
use crate::atom::Atom;
use crate::context::Context;
use crate::keymap::indicators::{IndicatorFlags, StateParts};
use crate::keymap::{MatchOp, Keymap, ModMask, Mods, SymInterpret, NUM_GROUPS, NUM_INDICATORS};
use crate::keysym;

const SI_VIRTUAL_MOD: u8 = 1 << 0;
const SI_ACTION: u8 = 1 << 1;
const SI_AUTO_REPEAT: u8 = 1 << 2;
const SI_LOCKING_KEY: u8 = 1 << 3;
const SI_LEVEL_ONE_ONLY: u8 = 1 << 4;

const LED_INDEX: u8 = 1 << 0;
const LED_MODS: u8 = 1 << 1;
const LED_GROUPS: u8 = 1 << 2;
const LED_CTRLS: u8 = 1 << 3;
const LED_EXPLICIT: u8 = 1 << 4;
const LED_AUTOMATIC: u8 = 1 << 5;
const LED_DRIVES_KBD: u8 = 1 << 6;

/// Decide, field by field, whether a colliding new definition should
/// replace the old one, recording the collision for reporting.
fn use_new_field(
    field: u8,
    old_defined: u8,
    old_file: u32,
    new_defined: u8,
    new_file: u32,
    new_merge: MergeMode,
    warning_level: u16,
    collide: &mut u8,
) -> bool {
    if old_defined & field != 0 {
        if new_defined & field != 0 {
            if (old_file == new_file && warning_level > 0) || warning_level > 9 {
                *collide |= field;
            }
            return new_merge != MergeMode::Augment;
        }
        false
    } else {
        new_defined & field != 0
    }
}

#[derive(Debug, Clone)]
struct SymInterpInfo {
    file_id: u32,
    merge: MergeMode,
    defined: u8,
    interp: SymInterpret,
}

impl SymInterpInfo {
    fn new(file_id: u32) -> Self {
        Self {
            file_id,
            merge: MergeMode::Override,
            defined: 0,
            interp: SymInterpret::default(),
        }
    }
}

/// One indicator map under construction; `indicator` is 1-based and
/// `None` until the map binds to a slot.
#[derive(Debug, Clone)]
pub(crate) struct LedInfo {
    pub file_id: u32,
    pub merge: MergeMode,
    defined: u8,
    pub name: Atom,
    pub indicator: Option<u8>,
    pub flags: IndicatorFlags,
    pub which_mods: StateParts,
    pub mods: Mods,
    pub which_groups: StateParts,
    pub groups: u8,
    pub ctrls: u32,
}

impl LedInfo {
    fn new(ctx: &mut Context, file_id: u32) -> Self {
        Self {
            file_id,
            merge: MergeMode::Override,
            defined: 0,
            name: ctx.intern("default"),
            indicator: None,
            flags: IndicatorFlags::empty(),
            which_mods: StateParts::empty(),
            mods: Mods::default(),
            which_groups: StateParts::empty(),
            groups: 0,
            ctrls: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupCompatInfo {
    file_id: u32,
    merge: MergeMode,
    defined: bool,
    real_mods: ModMask,
    vmods: u16,
}

pub(crate) struct CompatInfo {
    name: Option<String>,
    errors: usize,
    file_id: u32,
    interps: Vec<SymInterpInfo>,
    dflt: SymInterpInfo,
    led_dflt: LedInfo,
    group_compat: [GroupCompatInfo; NUM_GROUPS],
    leds: Vec<LedInfo>,
    vmods: VModInfo,
    actions: ActionDefaults,
}

impl CompatInfo {
    pub fn new(ctx: &mut Context, keymap: &Keymap, file_id: u32, from: Option<&CompatInfo>) -> Self {
        match from {
            Some(parent) => Self {
                name: None,
                errors: 0,
                file_id,
                interps: Vec::new(),
                dflt: SymInterpInfo {
                    file_id,
                    ..parent.dflt.clone()
                },
                led_dflt: LedInfo {
                    file_id,
                    ..parent.led_dflt.clone()
                },
                group_compat: Default::default(),
                leds: Vec::new(),
                vmods: VModInfo::new(keymap),
                actions: parent.actions.clone(),
            },
            None => Self {
                name: None,
                errors: 0,
                file_id,
                interps: Vec::new(),
                dflt: SymInterpInfo::new(file_id),
                led_dflt: LedInfo::new(ctx, file_id),
                group_compat: Default::default(),
                leds: Vec::new(),
                vmods: VModInfo::new(keymap),
                actions: ActionDefaults::default(),
            },
        }
    }

    fn si_text(si: &SymInterpInfo) -> String {
        format!(
            "{}+{:?}",
            keysym::keysym_to_string(si.interp.sym),
            si.interp.match_op
        )
    }

    fn add_interp(&mut self, ctx: &mut Context, new: SymInterpInfo) -> bool {
        let pos = self.interps.iter().position(|old| {
            old.interp.sym == new.interp.sym
                && old.interp.mods == new.interp.mods
                && old.interp.match_op == new.interp.match_op
        });
        let Some(pos) = pos else {
            self.interps.push(new);
            return true;
        };

        if new.merge == MergeMode::Replace {
            let old = &self.interps[pos];
            if (old.file_id == new.file_id && ctx.diag.warning_level() > 0)
                || ctx.diag.warning_level() > 9
            {
                let text = Self::si_text(&new);
                ctx.diag
                    .warn(format!("Multiple definitions for \"{text}\""));
                ctx.diag
                    .action("Earlier interpretation ignored".to_string());
            }
            self.interps[pos] = new;
            return true;
        }

        let mut collide = 0u8;
        let warning_level = ctx.diag.warning_level();
        let old = &mut self.interps[pos];
        if use_new_field(
            SI_VIRTUAL_MOD,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.interp.virtual_mod = new.interp.virtual_mod;
            old.defined |= SI_VIRTUAL_MOD;
        }
        if use_new_field(
            SI_ACTION,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.interp.action = new.interp.action.clone();
            old.defined |= SI_ACTION;
        }
        if use_new_field(
            SI_AUTO_REPEAT,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.interp.repeat = new.interp.repeat;
            old.defined |= SI_AUTO_REPEAT;
        }
        if use_new_field(
            SI_LOCKING_KEY,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.interp.locking = new.interp.locking;
            old.defined |= SI_LOCKING_KEY;
        }
        if use_new_field(
            SI_LEVEL_ONE_ONLY,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.interp.level_one_only = new.interp.level_one_only;
            old.defined |= SI_LEVEL_ONE_ONLY;
        }

        if collide != 0 {
            let text = Self::si_text(&new);
            ctx.diag
                .warn(format!("Multiple interpretations of \"{text}\""));
            ctx.diag.action(format!(
                "Using {} definition for duplicate fields",
                if new.merge != MergeMode::Augment {
                    "last"
                } else {
                    "first"
                }
            ));
        }
        true
    }

    fn add_group_compat(&mut self, ctx: &mut Context, group: usize, new: GroupCompatInfo) -> bool {
        let gc = &mut self.group_compat[group];
        if gc.real_mods == new.real_mods && gc.vmods == new.vmods {
            return true;
        }
        if (gc.file_id == new.file_id && ctx.diag.warning_level() > 0)
            || ctx.diag.warning_level() > 9
        {
            ctx.diag
                .warn(format!("Compat map for group {} redefined", group + 1));
            ctx.diag.action(format!(
                "Using {} definition",
                if new.merge == MergeMode::Augment {
                    "old"
                } else {
                    "new"
                }
            ));
        }
        if new.merge != MergeMode::Augment {
            *gc = new;
        }
        true
    }

    fn add_indicator_map(&mut self, ctx: &mut Context, new: LedInfo) -> bool {
        let pos = self.leds.iter().position(|old| old.name == new.name);
        let Some(pos) = pos else {
            self.leds.push(new);
            return true;
        };

        {
            let old = &self.leds[pos];
            if old.mods == new.mods
                && old.groups == new.groups
                && old.ctrls == new.ctrls
                && old.which_mods == new.which_mods
                && old.which_groups == new.which_groups
            {
                self.leds[pos].defined |= new.defined;
                return true;
            }
        }

        if new.merge == MergeMode::Replace {
            let old = &self.leds[pos];
            if (old.file_id == new.file_id && ctx.diag.warning_level() > 0)
                || ctx.diag.warning_level() > 9
            {
                ctx.diag.warn(format!(
                    "Map for indicator {} redefined",
                    ctx.atom_text(new.name)
                ));
                ctx.diag.action("Earlier definition ignored".to_string());
            }
            self.leds[pos] = new;
            return true;
        }

        let mut collide = 0u8;
        let warning_level = ctx.diag.warning_level();
        let old = &mut self.leds[pos];
        if use_new_field(
            LED_INDEX,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.indicator = new.indicator;
            old.defined |= LED_INDEX;
        }
        if use_new_field(
            LED_MODS,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.which_mods = new.which_mods;
            old.mods = new.mods;
            old.defined |= LED_MODS;
        }
        if use_new_field(
            LED_GROUPS,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.which_groups = new.which_groups;
            old.groups = new.groups;
            old.defined |= LED_GROUPS;
        }
        if use_new_field(
            LED_CTRLS,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.ctrls = new.ctrls;
            old.defined |= LED_CTRLS;
        }
        if use_new_field(
            LED_EXPLICIT,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.flags.remove(IndicatorFlags::NO_EXPLICIT);
            old.flags |= new.flags & IndicatorFlags::NO_EXPLICIT;
            old.defined |= LED_EXPLICIT;
        }
        if use_new_field(
            LED_AUTOMATIC,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.flags.remove(IndicatorFlags::NO_AUTOMATIC);
            old.flags |= new.flags & IndicatorFlags::NO_AUTOMATIC;
            old.defined |= LED_AUTOMATIC;
        }
        if use_new_field(
            LED_DRIVES_KBD,
            old.defined,
            old.file_id,
            new.defined,
            new.file_id,
            new.merge,
            warning_level,
            &mut collide,
        ) {
            old.flags.remove(IndicatorFlags::LED_DRIVES_KBD);
            old.flags |= new.flags & IndicatorFlags::LED_DRIVES_KBD;
            old.defined |= LED_DRIVES_KBD;
        }

        if collide != 0 {
            ctx.diag.warn(format!(
                "Map for indicator {} redefined",
                ctx.atom_text(new.name)
            ));
            ctx.diag.action(format!(
                "Using {} definition for duplicate fields",
                if new.merge == MergeMode::Augment {
                    "first"
                } else {
                    "last"
                }
            ));
        }
        true
    }

    fn set_interp_field(
        &mut self,
        ctx: &mut Context,
        keymap: &mut Keymap,
        si: &mut SymInterpInfo,
        field: &str,
        array_ndx: Option<&Expr>,
        value: &Expr,
    ) -> bool {
        if array_ndx.is_some() {
            ctx.diag.error(format!(
                "The {field} field of a symbol interpretation is not an array"
            ));
            return false;
        }
        if field.eq_ignore_ascii_case("action") {
            let Some(action) = handle_action_def(ctx, keymap, value, &self.actions) else {
                return false;
            };
            si.interp.action = action;
            si.defined |= SI_ACTION;
            true
        } else if field.eq_ignore_ascii_case("virtualmodifier")
            || field.eq_ignore_ascii_case("virtualmod")
        {
            match expr::resolve_vmod_index(ctx, keymap, value) {
                Some(idx) => {
                    si.interp.virtual_mod = Some(idx);
                    si.defined |= SI_VIRTUAL_MOD;
                    true
                }
                None => {
                    ctx.diag.error(
                        "The virtualModifier field of a symbol interpretation must be a virtual modifier"
                            .to_string(),
                    );
                    false
                }
            }
        } else if field.eq_ignore_ascii_case("repeat") {
            match expr::resolve_boolean(ctx, value) {
                Some(repeat) => {
                    si.interp.repeat = repeat;
                    si.defined |= SI_AUTO_REPEAT;
                    true
                }
                None => false,
            }
        } else if field.eq_ignore_ascii_case("locking") {
            match expr::resolve_boolean(ctx, value) {
                Some(locking) => {
                    si.interp.locking = locking;
                    si.defined |= SI_LOCKING_KEY;
                    true
                }
                None => false,
            }
        } else if field.eq_ignore_ascii_case("usemodmap")
            || field.eq_ignore_ascii_case("usemodmapmods")
        {
            const USE_MOD_MAP_VALUES: &LookupTable = &[
                ("levelone", 1),
                ("level1", 1),
                ("anylevel", 0),
                ("any", 0),
            ];
            match expr::resolve_enum(ctx, value, USE_MOD_MAP_VALUES) {
                Some(v) => {
                    si.interp.level_one_only = v != 0;
                    si.defined |= SI_LEVEL_ONE_ONLY;
                    true
                }
                None => {
                    ctx.diag.error(
                        "The useModMapMods field of a symbol interpretation must be a level specification"
                            .to_string(),
                    );
                    false
                }
            }
        } else {
            ctx.diag.error(format!(
                "Unknown field {field} in a symbol interpretation; definition ignored"
            ));
            false
        }
    }

    fn set_indicator_map_field(
        &mut self,
        ctx: &mut Context,
        keymap: &Keymap,
        led: &mut LedInfo,
        field: &str,
        array_ndx: Option<&Expr>,
        value: &Expr,
    ) -> bool {
        if array_ndx.is_some() {
            ctx.diag.error(format!(
                "The {field} field of an indicator map is not an array"
            ));
            return false;
        }
        if field.eq_ignore_ascii_case("modifiers") || field.eq_ignore_ascii_case("mods") {
            let Some(mask) = expr::resolve_vmod_mask(ctx, keymap, value) else {
                ctx.diag.error(format!(
                    "The modifiers field of the {} indicator map must be a modifier mask",
                    ctx.atom_text(led.name)
                ));
                return false;
            };
            let (real, vmods) = expr::split_vmod_mask(mask);
            led.mods = Mods::new(real, vmods);
            led.defined |= LED_MODS;
            true
        } else if field.eq_ignore_ascii_case("groups") {
            const GROUP_MASK_NAMES: &LookupTable = &[
                ("group1", 1 << 0),
                ("group2", 1 << 1),
                ("group3", 1 << 2),
                ("group4", 1 << 3),
                ("all", 0x0f),
                ("none", 0),
            ];
            let Some(mask) = expr::resolve_mask(ctx, value, GROUP_MASK_NAMES) else {
                return false;
            };
            led.groups = mask as u8;
            led.defined |= LED_GROUPS;
            true
        } else if field.eq_ignore_ascii_case("controls") || field.eq_ignore_ascii_case("ctrls") {
            let Some(mask) = expr::resolve_mask(ctx, value, CONTROL_NAMES) else {
                return false;
            };
            led.ctrls = mask;
            led.defined |= LED_CTRLS;
            true
        } else if field.eq_ignore_ascii_case("allowexplicit") {
            let Some(allow) = expr::resolve_boolean(ctx, value) else {
                return false;
            };
            if allow {
                led.flags.remove(IndicatorFlags::NO_EXPLICIT);
            } else {
                led.flags.insert(IndicatorFlags::NO_EXPLICIT);
            }
            led.defined |= LED_EXPLICIT;
            true
        } else if field.eq_ignore_ascii_case("whichmodstate")
            || field.eq_ignore_ascii_case("whichmodifierstate")
        {
            let Some(mask) = expr::resolve_mask(ctx, value, STATE_PART_NAMES) else {
                return false;
            };
            led.which_mods = StateParts::from_bits_truncate(mask as u8);
            true
        } else if field.eq_ignore_ascii_case("whichgroupstate") {
            let Some(mask) = expr::resolve_mask(ctx, value, GROUP_STATE_PART_NAMES) else {
                return false;
            };
            led.which_groups = StateParts::from_bits_truncate(mask as u8);
            true
        } else if [
            "driveskbd",
            "driveskeyboard",
            "leddriveskbd",
            "leddriveskeyboard",
            "indicatordriveskbd",
            "indicatordriveskeyboard",
        ]
        .iter()
        .any(|name| field.eq_ignore_ascii_case(name))
        {
            let Some(drives) = expr::resolve_boolean(ctx, value) else {
                return false;
            };
            if drives {
                led.flags.insert(IndicatorFlags::LED_DRIVES_KBD);
            } else {
                led.flags.remove(IndicatorFlags::LED_DRIVES_KBD);
            }
            led.defined |= LED_DRIVES_KBD;
            true
        } else if field.eq_ignore_ascii_case("index") {
            let Some(ndx) = expr::resolve_integer(ctx, value) else {
                return false;
            };
            if !(1..=NUM_INDICATORS as i32).contains(&ndx) {
                ctx.diag.error(format!(
                    "Illegal indicator index {ndx} (range 1..{NUM_INDICATORS})"
                ));
                ctx.diag.action(format!(
                    "Index definition for {} indicator ignored",
                    ctx.atom_text(led.name)
                ));
                return false;
            }
            led.indicator = Some(ndx as u8);
            led.defined |= LED_INDEX;
            true
        } else {
            ctx.diag.error(format!(
                "Unknown field {field} in map for {} indicator; definition ignored",
                ctx.atom_text(led.name)
            ));
            false
        }
    }

    fn handle_interp_var(&mut self, ctx: &mut Context, keymap: &mut Keymap, stmt: &VarDef) -> bool {
        let Some(name) = &stmt.name else { return false };
        let Some(value) = &stmt.value else { return false };
        let Some((element, field, array_ndx)) = name.as_lhs() else {
            return false;
        };
        let field = field.to_string();
        match element {
            Some(element) if element.eq_ignore_ascii_case("interpret") => {
                let mut dflt = self.dflt.clone();
                let ok =
                    self.set_interp_field(ctx, keymap, &mut dflt, &field, array_ndx, value);
                self.dflt = dflt;
                ok
            }
            Some(element) if element.eq_ignore_ascii_case("indicator") => {
                let mut dflt = self.led_dflt.clone();
                let ok = self
                    .set_indicator_map_field(ctx, keymap, &mut dflt, &field, array_ndx, value);
                self.led_dflt = dflt;
                ok
            }
            Some(element) => self
                .actions
                .set_field(ctx, element, &field, array_ndx, value),
            None => {
                ctx.diag
                    .error(format!("Default defined for unknown field {field}; ignored"));
                false
            }
        }
    }

    fn handle_interp_def(
        &mut self,
        ctx: &mut Context,
        keymap: &mut Keymap,
        def: &InterpDef,
        merge: MergeMode,
    ) -> bool {
        let Some((pred, mods)) = resolve_state_and_predicate(ctx, def.match_expr.as_ref()) else {
            ctx.diag
                .error("Couldn't determine matching modifiers".to_string());
            ctx.diag
                .action("Symbol interpretation ignored".to_string());
            return false;
        };
        let merge = def.merge.or(merge);

        let mut si = self.dflt.clone();
        si.merge = merge;
        si.file_id = self.file_id;
        // `any` and `NoSymbol` head the symless interpretations.
        let Some(sym) = keysym::lookup_keysym(&def.sym) else {
            ctx.diag
                .warn(format!("Could not resolve keysym {}", def.sym));
            self.errors += 1;
            return false;
        };
        si.interp.sym = sym;
        si.interp.match_op = pred;
        si.interp.mods = mods;

        for var in &def.body {
            let Some(name) = &var.name else { continue };
            let Some(value) = &var.value else { continue };
            let ok = match name.as_lhs() {
                Some((Some(_), _, _)) => self.handle_interp_var(ctx, keymap, var),
                Some((None, field, array_ndx)) => {
                    let field = field.to_string();
                    self.set_interp_field(ctx, keymap, &mut si, &field, array_ndx, value)
                }
                None => false,
            };
            if !ok {
                self.errors += 1;
                return false;
            }
        }

        if !self.add_interp(ctx, si) {
            self.errors += 1;
            return false;
        }
        true
    }

    fn handle_group_compat_def(
        &mut self,
        ctx: &mut Context,
        keymap: &Keymap,
        def: &GroupCompatDef,
        merge: MergeMode,
    ) -> bool {
        let merge = def.merge.or(merge);
        if !(1..=NUM_GROUPS as u8).contains(&def.group) {
            ctx.diag.error(format!(
                "Keyboard group must be in the range 1..{NUM_GROUPS}"
            ));
            ctx.diag.action(format!(
                "Compatibility map for illegal group {} ignored",
                def.group
            ));
            return false;
        }
        let Some(mask) = expr::resolve_vmod_mask(ctx, keymap, &def.def) else {
            ctx.diag
                .error("Expected a modifier mask in group compatibility definition".to_string());
            ctx.diag.action(format!(
                "Ignoring illegal compatibility map for group {}",
                def.group
            ));
            return false;
        };
        let (real, vmods) = expr::split_vmod_mask(mask);
        let gc = GroupCompatInfo {
            file_id: self.file_id,
            merge,
            defined: true,
            real_mods: real,
            vmods,
        };
        self.add_group_compat(ctx, def.group as usize - 1, gc)
    }

    fn handle_indicator_map_def(
        &mut self,
        ctx: &mut Context,
        keymap: &Keymap,
        def: &IndicatorMapDef,
        merge: MergeMode,
    ) -> bool {
        let merge = def.merge.or(merge);
        let mut led = self.led_dflt.clone();
        led.merge = merge;
        led.name = ctx.intern(&def.name);
        led.file_id = self.file_id;

        let mut ok = true;
        for var in &def.body {
            let Some(name) = &var.name else { continue };
            let Some(value) = &var.value else { continue };
            match name.as_lhs() {
                Some((Some(element), field, _)) => {
                    ctx.diag.error(format!(
                        "Cannot set defaults for \"{element}\" element in indicator map"
                    ));
                    ctx.diag
                        .action(format!("Assignment to {element}.{field} ignored"));
                    ok = false;
                }
                Some((None, field, array_ndx)) => {
                    let field = field.to_string();
                    ok = self.set_indicator_map_field(ctx, keymap, &mut led, &field, array_ndx, value)
                        && ok;
                }
                None => ok = false,
            }
        }
        if ok {
            self.add_indicator_map(ctx, led)
        } else {
            false
        }
    }
}

pub(crate) const STATE_PART_NAMES: &LookupTable = &[
    ("base", StateParts::BASE.bits() as u32),
    ("latched", StateParts::LATCHED.bits() as u32),
    ("locked", StateParts::LOCKED.bits() as u32),
    ("effective", StateParts::EFFECTIVE.bits() as u32),
    ("compat", StateParts::COMPAT.bits() as u32),
    ("any", 0x1f),
    ("none", 0),
];

pub(crate) const GROUP_STATE_PART_NAMES: &LookupTable = &[
    ("base", StateParts::BASE.bits() as u32),
    ("latched", StateParts::LATCHED.bits() as u32),
    ("locked", StateParts::LOCKED.bits() as u32),
    ("effective", StateParts::EFFECTIVE.bits() as u32),
    ("any", 0x0f),
    ("none", 0),
];

/// An interpret head's predicate: bare sym means `AnyOfOrNone(all)`,
/// `pred(mask)` selects the operator, a bare mask means `Exactly`.
fn resolve_state_and_predicate(
    ctx: &mut Context,
    expr: Option<&Expr>,
) -> Option<(MatchOp, ModMask)> {
    let Some(expr) = expr else {
        return Some((MatchOp::AnyOfOrNone, ModMask::all()));
    };

    match expr {
        Expr::Action { name, args } => {
            let pred = if name.eq_ignore_ascii_case("noneof") {
                MatchOp::NoneOf
            } else if name.eq_ignore_ascii_case("anyofornone") {
                MatchOp::AnyOfOrNone
            } else if name.eq_ignore_ascii_case("anyof") {
                MatchOp::AnyOf
            } else if name.eq_ignore_ascii_case("allof") {
                MatchOp::AllOf
            } else if name.eq_ignore_ascii_case("exactly") {
                MatchOp::Exactly
            } else {
                ctx.diag
                    .error(format!("Illegal modifier predicate \"{name}\""));
                ctx.diag.action("Ignored".to_string());
                return None;
            };
            let mods = match args.first() {
                Some(arg) => expr::resolve_mod_mask(ctx, arg)?,
                None => ModMask::all(),
            };
            Some((pred, mods))
        }
        Expr::Ident(name) if name.eq_ignore_ascii_case("any") => {
            Some((MatchOp::AnyOf, ModMask::all()))
        }
        other => {
            let mods = expr::resolve_mod_mask(ctx, other)?;
            Some((MatchOp::Exactly, mods))
        }
    }
}

impl IncludeTarget for CompatInfo {
    const FILE_TYPE: FileType = FileType::CompatMap;

    fn fresh(&self, ctx: &mut Context, keymap: &mut Keymap, file_id: u32) -> Self {
        CompatInfo::new(ctx, keymap, file_id, Some(self))
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
        let merge = match merge {
            MergeMode::Default => MergeMode::Augment,
            other => other,
        };
        self.name = Some(file.name.clone());
        for stmt in &file.defs {
            let ok = match stmt {
                Stmt::Include(inc) => handle_include(ctx, keymap, self, inc),
                Stmt::Interp(def) => self.handle_interp_def(ctx, keymap, def, merge),
                Stmt::GroupCompat(def) => self.handle_group_compat_def(ctx, keymap, def, merge),
                Stmt::IndicatorMap(def) => self.handle_indicator_map_def(ctx, keymap, def, merge),
                Stmt::Var(def) => self.handle_interp_var(ctx, keymap, def),
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
                        "Compatibility maps may not include other declarations; \
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
                ctx.diag.action(format!(
                    "Abandoning compatibility map \"{}\"",
                    file.top_name
                ));
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
        for mut si in from.interps {
            si.merge = merge.or(si.merge);
            if !self.add_interp(ctx, si) {
                self.errors += 1;
            }
        }
        for (i, mut gc) in from.group_compat.into_iter().enumerate() {
            if !gc.defined {
                continue;
            }
            if merge != MergeMode::Default {
                gc.merge = merge;
            }
            if !self.add_group_compat(ctx, i, gc) {
                self.errors += 1;
            }
        }
        for mut led in from.leds {
            if merge != MergeMode::Default {
                led.merge = merge;
            }
            if !self.add_indicator_map(ctx, led) {
                self.errors += 1;
            }
        }
    }
}

/// Copy interpretations in specificity order: with-symbol entries first,
/// each predicate from most to least specific, then the symless ones.
fn copy_interps(info: &CompatInfo, keymap: &mut Keymap) {
    for need_symbol in [true, false] {
        for preds in [
            &[MatchOp::Exactly][..],
            &[MatchOp::AllOf, MatchOp::NoneOf][..],
            &[MatchOp::AnyOf][..],
            &[MatchOp::AnyOfOrNone][..],
        ] {
            for si in &info.interps {
                if !preds.contains(&si.interp.match_op) {
                    continue;
                }
                if need_symbol != (si.interp.sym != keysym::NO_SYMBOL) {
                    continue;
                }
                keymap.interps.push(si.interp.clone());
            }
        }
    }
}

/// Bind an accumulated indicator map into the keymap's slot table.
/// Virtual bits in the map's modifiers resolve against whatever vmod
/// masks are known at bind time; the finalize pass recomputes them once
/// every vmod is resolved.
pub(crate) fn bind_indicator_map(keymap: &mut Keymap, led: &LedInfo, slot: usize) {
    let mut mods = led.mods;
    mods.mask = mods.real | keymap.vmods_to_real(mods.vmods);
    let map = &mut keymap.indicator_maps[slot];
    map.flags = led.flags;
    map.which_groups = led.which_groups;
    map.groups = led.groups;
    map.which_mods = led.which_mods;
    map.mods = mods;
    map.ctrls = led.ctrls;
    keymap.indicator_names[slot] = led.name;
}

/// Compile an `xkb_compat` section.  Indicator maps with no index land
/// in `unbound` for name binding at finalize time.
pub(crate) fn compile_compat_map(
    ctx: &mut Context,
    keymap: &mut Keymap,
    file: &XkbFile,
    merge: MergeMode,
    unbound: &mut Vec<LedInfo>,
) -> bool {
    let mut info = CompatInfo::new(ctx, keymap, file.id, None);
    info.dflt.merge = merge;
    info.led_dflt.merge = merge;
    info.handle_file(ctx, keymap, file, merge);

    if info.errors != 0 {
        return false;
    }

    copy_interps(&info, keymap);

    for (i, gc) in info.group_compat.iter().enumerate() {
        if gc.defined {
            keymap.group_compat[i] = Mods::new(gc.real_mods, gc.vmods);
        }
    }

    for led in &info.leds {
        // Defaulting: groups with no which-part read the effective
        // group; mods likewise.
        let mut led = led.clone();
        if led.groups != 0 && led.which_groups.is_empty() {
            led.which_groups = StateParts::EFFECTIVE;
        }
        if led.which_mods.is_empty() && (!led.mods.real.is_empty() || led.mods.vmods != 0) {
            led.which_mods = StateParts::EFFECTIVE;
        }
        match led.indicator {
            Some(ndx) => bind_indicator_map(keymap, &led, ndx as usize - 1),
            None => unbound.push(led),
        }
    }

    keymap.names.compat = info.name;
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::parser::Parser;
    use crate::keymap::actions::Action;

    fn compile(source: &str) -> (Context, Keymap, Vec<LedInfo>, bool) {
        let mut ctx = Context::new();
        let files = Parser::new(source, "test")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap();
        let mut keymap = Keymap::new(ctx.atoms.clone());
        let mut unbound = Vec::new();
        let ok = compile_compat_map(
            &mut ctx,
            &mut keymap,
            &files[0],
            MergeMode::Augment,
            &mut unbound,
        );
        keymap.atoms = ctx.atoms.clone();
        (ctx, keymap, unbound, ok)
    }

    #[test]
    fn interp_fields() {
        let (_ctx, keymap, _unbound, ok) = compile(
            r#"xkb_compat "basic" {
                interpret.useModMapMods = level1;
                interpret Shift_L+AnyOf(Shift+Lock) {
                    action = SetMods(modifiers=Shift);
                };
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.interps().len(), 1);
        let si = &keymap.interps()[0];
        assert_eq!(si.sym, 0xffe1);
        assert_eq!(si.match_op, MatchOp::AnyOf);
        assert_eq!(si.mods, ModMask::SHIFT | ModMask::LOCK);
        assert!(si.level_one_only);
        assert!(matches!(si.action, Action::SetMods(_)));
    }

    #[test]
    fn interps_sorted_most_specific_first() {
        let (_ctx, keymap, _unbound, ok) = compile(
            r#"xkb_compat "order" {
                interpret Any+AnyOf(all) { repeat = true; };
                interpret Shift_L+Exactly(Shift) { repeat = false; };
            };"#,
        );
        assert!(ok);
        // the Exactly interp with a symbol must come first
        assert_eq!(keymap.interps()[0].match_op, MatchOp::Exactly);
        assert_eq!(keymap.interps()[0].sym, 0xffe1);
    }

    #[test]
    fn group_compat_masks() {
        let (_ctx, keymap, _unbound, ok) = compile(
            r#"xkb_compat "gc" {
                virtual_modifiers AltGr;
                group 2 = AltGr;
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.group_compat[1].vmods, 1 << 0);
    }

    #[test]
    fn indicator_map_with_index_binds() {
        let (_ctx, keymap, unbound, ok) = compile(
            r#"xkb_compat "leds" {
                indicator "Caps Lock" {
                    index = 2;
                    whichModState = locked;
                    modifiers = Lock;
                };
            };"#,
        );
        assert!(ok);
        assert!(unbound.is_empty());
        let map = keymap.indicator_map(1).unwrap();
        assert_eq!(map.which_mods, StateParts::LOCKED);
        assert_eq!(map.mods.real, ModMask::LOCK);
        assert_eq!(keymap.led_index_for_name("Caps Lock"), Some(1));
    }

    #[test]
    fn indicator_map_without_index_stays_unbound() {
        let (_ctx, _keymap, unbound, ok) = compile(
            r#"xkb_compat "leds" {
                indicator "Num Lock" { modifiers = Mod2; };
            };"#,
        );
        assert!(ok);
        assert_eq!(unbound.len(), 1);
        // which_mods defaults to effective when mods are given
        assert_eq!(unbound[0].which_mods, StateParts::EFFECTIVE);
    }

    #[test]
    fn predicate_defaults() {
        let (_ctx, keymap, _unbound, ok) = compile(
            r#"xkb_compat "preds" {
                interpret Caps_Lock {
                    action = LockMods(modifiers=Lock);
                };
            };"#,
        );
        assert!(ok);
        let si = &keymap.interps()[0];
        assert_eq!(si.match_op, MatchOp::AnyOfOrNone);
        assert_eq!(si.mods, ModMask::all());
    }
}
