//! The symbols section compiler.
//!
//! For each `key <NAME> { ... }` entry this accumulates per-group symbol
//! and action arrays, the key's type choices, repeat/behaviour flags and
//! virtual modifier bits, then copies the results into the keymap's
//! packed arenas.  Modmap statements accumulate separately and resolve
//! against key names or keysyms once symbols are in place.

use super::action::{handle_action_def, ActionDefaults};
use super::alias::{self, AliasInfo};
use super::ast::{
    Expr, FileType, MergeMode, ModMapDef, Stmt, SymbolsDef, Value, VarDef, XkbFile,
};
use super::expr;
use super::include::{handle_include, IncludeTarget};
use super::vmod::{self, VModInfo};
use crate::atom::Atom;
use crate::context::Context;
use crate::keymap::actions::Action;
use crate::keymap::{
    Behavior, Explicit, KeyName, Keymap, OutOfRange, TWO_LEVEL_INDEX, NUM_GROUPS,
};
use crate::keysym::{self, Keysym, NO_SYMBOL};

const KEY_REPEAT: u8 = 1 << 0;
const KEY_BEHAVIOR: u8 = 1 << 1;
const KEY_TYPE_DFLT: u8 = 1 << 2;
const KEY_GROUP_INFO: u8 = 1 << 3;
const KEY_VMODMAP: u8 = 1 << 4;

#[derive(Debug, Clone)]
struct KeyInfo {
    defined: u8,
    file_id: u32,
    merge: MergeMode,
    name: KeyName,
    out_of_range: OutOfRange,
    types_defined: u8,
    syms_defined: u8,
    acts_defined: u8,
    num_levels: [u16; NUM_GROUPS],
    syms: [Vec<Keysym>; NUM_GROUPS],
    acts: [Vec<Action>; NUM_GROUPS],
    types: [Atom; NUM_GROUPS],
    repeat: Option<bool>,
    behavior: Behavior,
    vmodmap: u16,
    dflt_type: Atom,
}

impl Default for KeyInfo {
    fn default() -> Self {
        Self {
            defined: 0,
            file_id: 0,
            merge: MergeMode::Override,
            name: KeyName::new("*"),
            out_of_range: OutOfRange::Wrap,
            types_defined: 0,
            syms_defined: 0,
            acts_defined: 0,
            num_levels: [0; NUM_GROUPS],
            syms: Default::default(),
            acts: Default::default(),
            types: [Atom::NONE; NUM_GROUPS],
            repeat: None,
            behavior: Behavior::Default,
            vmodmap: 0,
            dflt_type: Atom::NONE,
        }
    }
}

impl KeyInfo {
    fn resize_group(&mut self, group: usize, at_least: usize, force_actions: bool) {
        let width = (self.num_levels[group] as usize).max(at_least);
        if self.syms[group].len() < width {
            self.syms[group].resize(width, NO_SYMBOL);
        }
        if (force_actions && self.acts[group].len() < width)
            || (!self.acts[group].is_empty() && self.acts[group].len() < width)
        {
            self.acts[group].resize(width, Action::None);
        }
        self.num_levels[group] = width as u16;
    }
}

#[derive(Debug, Clone)]
enum ModMapTarget {
    Name(KeyName),
    Sym(Keysym),
}

#[derive(Debug, Clone)]
struct ModMapEntry {
    merge: MergeMode,
    modifier: u8,
    target: ModMapTarget,
}

pub(crate) struct SymbolsInfo {
    name: Option<String>,
    errors: usize,
    file_id: u32,
    explicit_group: u8,
    group_info: Option<OutOfRange>,
    keys: Vec<KeyInfo>,
    dflt: KeyInfo,
    group_names: [Atom; NUM_GROUPS],
    mod_map: Vec<ModMapEntry>,
    aliases: Vec<AliasInfo>,
    vmods: VModInfo,
    actions: ActionDefaults,
}

impl SymbolsInfo {
    pub fn new(keymap: &Keymap, file_id: u32, from: Option<&SymbolsInfo>) -> Self {
        let (dflt, explicit_group, actions) = match from {
            Some(parent) => (
                KeyInfo {
                    file_id,
                    ..parent.dflt.clone()
                },
                parent.explicit_group,
                parent.actions.clone(),
            ),
            None => (
                KeyInfo {
                    file_id,
                    ..KeyInfo::default()
                },
                0,
                ActionDefaults::default(),
            ),
        };
        Self {
            name: None,
            errors: 0,
            file_id,
            explicit_group,
            group_info: None,
            keys: Vec::new(),
            dflt,
            group_names: [Atom::NONE; NUM_GROUPS],
            mod_map: Vec::new(),
            aliases: Vec::new(),
            vmods: VModInfo::new(keymap),
            actions,
        }
    }

    /// Merge one group's symbols and actions level by level.
    fn merge_key_groups(&mut self, ctx: &mut Context, into: &mut KeyInfo, from: &mut KeyInfo, group: usize) {
        let clobber = from.merge != MergeMode::Augment;
        let report = ctx.diag.warning_level() > 9
            || (into.file_id == from.file_id && ctx.diag.warning_level() > 0);
        let width = into.num_levels[group].max(from.num_levels[group]) as usize;

        let mut syms = vec![NO_SYMBOL; width];
        let any_acts = !into.acts[group].is_empty() || !from.acts[group].is_empty();
        let mut acts = if any_acts {
            vec![Action::None; width]
        } else {
            Vec::new()
        };

        for level in 0..width {
            let from_sym = from.syms[group].get(level).copied().unwrap_or(NO_SYMBOL);
            let to_sym = into.syms[group].get(level).copied().unwrap_or(NO_SYMBOL);
            syms[level] = if from_sym == NO_SYMBOL || from_sym == to_sym {
                to_sym
            } else if to_sym == NO_SYMBOL {
                from_sym
            } else {
                let (using, ignoring) = if clobber {
                    (from_sym, to_sym)
                } else {
                    (to_sym, from_sym)
                };
                if report {
                    ctx.diag.warn(format!(
                        "Multiple symbols for level {}/group {} on key {}",
                        level + 1,
                        group + 1,
                        into.name
                    ));
                    ctx.diag.action(format!(
                        "Using {}, ignoring {}",
                        keysym::keysym_to_string(using),
                        keysym::keysym_to_string(ignoring)
                    ));
                }
                using
            };
            if any_acts {
                let from_act = from.acts[group].get(level).cloned().unwrap_or(Action::None);
                let to_act = into.acts[group].get(level).cloned().unwrap_or(Action::None);
                acts[level] = if from_act.is_none() {
                    to_act
                } else if to_act.is_none() || clobber {
                    from_act
                } else {
                    to_act
                };
            }
        }

        into.num_levels[group] = width as u16;
        into.syms[group] = syms;
        into.acts[group] = acts;
        from.syms[group] = Vec::new();
        from.acts[group] = Vec::new();
        from.num_levels[group] = 0;
        into.syms_defined |= 1 << group;
        from.syms_defined &= !(1 << group);
        into.acts_defined |= 1 << group;
        from.acts_defined &= !(1 << group);
    }

    fn merge_keys(&mut self, ctx: &mut Context, into_idx: usize, mut from: KeyInfo) {
        if from.merge == MergeMode::Replace {
            self.keys[into_idx] = from;
            return;
        }
        let mut into = std::mem::take(&mut self.keys[into_idx]);
        let report = ctx.diag.warning_level() > 9
            || (into.file_id == from.file_id && ctx.diag.warning_level() > 0);
        let mut collide = false;

        for group in 0..NUM_GROUPS {
            if from.num_levels[group] > 0 {
                if into.num_levels[group] == 0 {
                    into.num_levels[group] = from.num_levels[group];
                    into.syms[group] = std::mem::take(&mut from.syms[group]);
                    into.acts[group] = std::mem::take(&mut from.acts[group]);
                    into.syms_defined |= 1 << group;
                    from.num_levels[group] = 0;
                    from.syms_defined &= !(1 << group);
                } else {
                    if report {
                        collide = true;
                    }
                    self.merge_key_groups(ctx, &mut into, &mut from, group);
                }
            }
            if !from.types[group].is_none() {
                if !into.types[group].is_none()
                    && report
                    && into.types[group] != from.types[group]
                {
                    ctx.diag.warn(format!(
                        "Multiple definitions for group {} type of key {}",
                        group + 1,
                        into.name
                    ));
                }
                if from.merge != MergeMode::Augment || into.types[group].is_none() {
                    into.types[group] = from.types[group];
                    into.types_defined |= 1 << group;
                }
            }
        }

        let clobber = from.merge != MergeMode::Augment;
        if from.defined & KEY_BEHAVIOR != 0 && (clobber || into.defined & KEY_BEHAVIOR == 0) {
            into.behavior = from.behavior;
            into.defined |= KEY_BEHAVIOR;
        }
        if from.defined & KEY_VMODMAP != 0 && (clobber || into.defined & KEY_VMODMAP == 0) {
            into.vmodmap = from.vmodmap;
            into.defined |= KEY_VMODMAP;
        }
        if from.defined & KEY_REPEAT != 0 && (clobber || into.defined & KEY_REPEAT == 0) {
            into.repeat = from.repeat;
            into.defined |= KEY_REPEAT;
        }
        if from.defined & KEY_TYPE_DFLT != 0 && (clobber || into.defined & KEY_TYPE_DFLT == 0) {
            into.dflt_type = from.dflt_type;
            into.defined |= KEY_TYPE_DFLT;
        }
        if from.defined & KEY_GROUP_INFO != 0 && (clobber || into.defined & KEY_GROUP_INFO == 0) {
            into.out_of_range = from.out_of_range;
            into.defined |= KEY_GROUP_INFO;
        }

        if collide {
            ctx.diag
                .warn(format!("Symbol map for key {} redefined", into.name));
            ctx.diag.action(format!(
                "Using {} definition for conflicting fields",
                if from.merge == MergeMode::Augment {
                    "first"
                } else {
                    "last"
                }
            ));
        }
        self.keys[into_idx] = into;
    }

    fn add_key_symbols(&mut self, ctx: &mut Context, keymap: &Keymap, key: KeyInfo) {
        if let Some(idx) = self.keys.iter().position(|k| k.name == key.name) {
            self.merge_keys(ctx, idx, key);
            return;
        }
        if let Some(real) = keymap.resolve_alias(key.name) {
            if let Some(idx) = self.keys.iter().position(|k| k.name == real) {
                self.merge_keys(ctx, idx, key);
                return;
            }
        }
        self.keys.push(key);
    }

    fn add_mod_map_entry(&mut self, ctx: &mut Context, new: ModMapEntry) {
        let clobber = new.merge != MergeMode::Augment;
        for old in self.mod_map.iter_mut() {
            let same = match (&new.target, &old.target) {
                (ModMapTarget::Sym(a), ModMapTarget::Sym(b)) => a == b,
                (ModMapTarget::Name(a), ModMapTarget::Name(b)) => a == b,
                _ => false,
            };
            if !same {
                continue;
            }
            if old.modifier != new.modifier {
                let (using, ignoring) = if clobber {
                    (new.modifier, old.modifier)
                } else {
                    (old.modifier, new.modifier)
                };
                ctx.diag.error(format!(
                    "Modifier map entry assigned to multiple modifiers; \
                     using {}, ignoring {}",
                    crate::keymap::ModMask::REAL_MOD_NAMES[using as usize],
                    crate::keymap::ModMask::REAL_MOD_NAMES[ignoring as usize]
                ));
                old.modifier = using;
            }
            return;
        }
        self.mod_map.push(new);
    }

    fn get_group_index(
        &mut self,
        ctx: &mut Context,
        key: &KeyInfo,
        array_ndx: Option<&Expr>,
        what_acts: bool,
    ) -> Option<usize> {
        match array_ndx {
            None => {
                let defined = if what_acts {
                    key.acts_defined
                } else {
                    key.syms_defined
                };
                for group in 0..NUM_GROUPS {
                    if defined & (1 << group) == 0 {
                        return Some(group);
                    }
                }
                let what = if what_acts { "actions" } else { "symbols" };
                ctx.diag.error(format!(
                    "Too many groups of {what} for key {} (max {NUM_GROUPS})",
                    key.name
                ));
                ctx.diag
                    .action(format!("Ignoring {what} defined for extra groups"));
                None
            }
            Some(index) => {
                let group = expr::resolve_group(ctx, index)?;
                Some(group as usize - 1)
            }
        }
    }

    fn add_symbols_to_key(
        &mut self,
        ctx: &mut Context,
        key: &mut KeyInfo,
        array_ndx: Option<&Expr>,
        value: &Expr,
    ) -> bool {
        let Some(group) = self.get_group_index(ctx, key, array_ndx, false) else {
            return false;
        };
        let Expr::KeysymList(names) = value else {
            ctx.diag.error(format!(
                "Expected a list of symbols, found {}",
                value.op_name()
            ));
            ctx.diag.action(format!(
                "Ignoring symbols for group {} of {}",
                group + 1,
                key.name
            ));
            return false;
        };
        if !key.syms[group].is_empty() {
            ctx.diag.error(format!(
                "Symbols for key {}, group {} already defined",
                key.name,
                group + 1
            ));
            ctx.diag
                .action("Ignoring duplicate definition".to_string());
            return false;
        }
        key.resize_group(group, names.len(), false);
        key.syms_defined |= 1 << group;
        for (level, name) in names.iter().enumerate() {
            let sym = match keysym::lookup_keysym(name) {
                Some(sym) => sym,
                None => {
                    ctx.diag.warn(format!(
                        "Could not resolve keysym {name} for key {}, group {}, level {}",
                        key.name,
                        group + 1,
                        level + 1
                    ));
                    NO_SYMBOL
                }
            };
            key.syms[group][level] = sym;
        }
        // Trim trailing empty levels.
        while key.num_levels[group] > 0
            && key.syms[group][key.num_levels[group] as usize - 1] == NO_SYMBOL
        {
            key.num_levels[group] -= 1;
        }
        true
    }

    fn add_actions_to_key(
        &mut self,
        ctx: &mut Context,
        keymap: &mut Keymap,
        key: &mut KeyInfo,
        array_ndx: Option<&Expr>,
        value: &Expr,
    ) -> bool {
        let Some(group) = self.get_group_index(ctx, key, array_ndx, true) else {
            return false;
        };
        let Expr::ActionList(list) = value else {
            ctx.diag.error(format!(
                "Bad expression type for action list value; \
                 ignoring actions for group {} of {}",
                group + 1,
                key.name
            ));
            return false;
        };
        if !key.acts[group].is_empty() {
            ctx.diag.error(format!(
                "Actions for key {}, group {} already defined",
                key.name,
                group + 1
            ));
            return false;
        }
        key.resize_group(group, list.len(), true);
        key.acts_defined |= 1 << group;
        for (level, act_expr) in list.iter().enumerate() {
            match handle_action_def(ctx, keymap, act_expr, &self.actions) {
                Some(action) => key.acts[group][level] = action,
                None => {
                    ctx.diag
                        .error(format!("Illegal action definition for {}", key.name));
                    ctx.diag.action(format!(
                        "Action for group {}/level {} ignored",
                        group + 1,
                        level + 1
                    ));
                }
            }
        }
        true
    }

    fn set_symbols_field(
        &mut self,
        ctx: &mut Context,
        keymap: &mut Keymap,
        key: &mut KeyInfo,
        field: &str,
        array_ndx: Option<&Expr>,
        value: &Expr,
    ) -> bool {
        if field.eq_ignore_ascii_case("type") {
            let Some(text) = expr::resolve_string(ctx, value) else {
                ctx.diag
                    .warn("The type field of a key symbol map must be a string".to_string());
                ctx.diag
                    .action("Ignoring illegal type definition".to_string());
                return true;
            };
            let type_name = ctx.intern(&text);
            match array_ndx {
                None => {
                    key.dflt_type = type_name;
                    key.defined |= KEY_TYPE_DFLT;
                }
                Some(index) => {
                    let Some(group) = expr::resolve_group(ctx, index) else {
                        ctx.diag.error(format!(
                            "Illegal group index for type of key {}; \
                             definition with non-integer array index ignored",
                            key.name
                        ));
                        return false;
                    };
                    key.types[group as usize - 1] = type_name;
                    key.types_defined |= 1 << (group - 1);
                }
            }
            true
        } else if field.eq_ignore_ascii_case("symbols") {
            self.add_symbols_to_key(ctx, key, array_ndx, value)
        } else if field.eq_ignore_ascii_case("actions") {
            self.add_actions_to_key(ctx, keymap, key, array_ndx, value)
        } else if field.eq_ignore_ascii_case("vmods")
            || field.eq_ignore_ascii_case("virtualmods")
            || field.eq_ignore_ascii_case("virtualmodifiers")
        {
            match expr::resolve_vmod_mask(ctx, keymap, value) {
                Some(mask) => {
                    key.vmodmap = ((mask >> 8) & 0xffff) as u16;
                    key.defined |= KEY_VMODMAP;
                    true
                }
                None => {
                    ctx.diag.error(format!(
                        "Expected a virtual modifier mask, found {}",
                        value.op_name()
                    ));
                    ctx.diag.action(format!(
                        "Ignoring virtual modifiers definition for key {}",
                        key.name
                    ));
                    false
                }
            }
        } else if field.eq_ignore_ascii_case("locking")
            || field.eq_ignore_ascii_case("lock")
            || field.eq_ignore_ascii_case("locks")
        {
            const LOCKING_VALUES: &expr::LookupTable = &[
                ("true", 1),
                ("yes", 1),
                ("on", 1),
                ("false", 0),
                ("no", 0),
                ("off", 0),
                ("permanent", 2),
            ];
            match expr::resolve_enum(ctx, value, LOCKING_VALUES) {
                Some(v) => {
                    key.behavior = match v {
                        0 => Behavior::Default,
                        1 => Behavior::Lock { permanent: false },
                        _ => Behavior::Lock { permanent: true },
                    };
                    key.defined |= KEY_BEHAVIOR;
                    true
                }
                None => false,
            }
        } else if field.eq_ignore_ascii_case("radiogroup")
            || field.eq_ignore_ascii_case("permanentradiogroup")
            || field.eq_ignore_ascii_case("allownone")
        {
            ctx.diag.error("Radio groups not supported".to_string());
            ctx.diag.action(format!(
                "Ignoring radio group specification for key {}",
                key.name
            ));
            false
        } else if field.to_ascii_lowercase().starts_with("overlay")
            || field.to_ascii_lowercase().starts_with("permanentoverlay")
        {
            ctx.diag.error("Overlays not supported".to_string());
            ctx.diag.action(format!(
                "Ignoring overlay specification for key {}",
                key.name
            ));
            true
        } else if field.eq_ignore_ascii_case("repeating")
            || field.eq_ignore_ascii_case("repeats")
            || field.eq_ignore_ascii_case("repeat")
        {
            const REPEAT_VALUES: &expr::LookupTable = &[
                ("true", 1),
                ("yes", 1),
                ("on", 1),
                ("false", 0),
                ("no", 0),
                ("off", 0),
                ("default", 2),
            ];
            match expr::resolve_enum(ctx, value, REPEAT_VALUES) {
                Some(v) => {
                    key.repeat = match v {
                        0 => Some(false),
                        1 => Some(true),
                        _ => None,
                    };
                    key.defined |= KEY_REPEAT;
                    true
                }
                None => {
                    ctx.diag
                        .error(format!("Illegal repeat setting for {}", key.name));
                    ctx.diag
                        .action("Non-boolean repeat setting ignored".to_string());
                    false
                }
            }
        } else if field.eq_ignore_ascii_case("groupswrap")
            || field.eq_ignore_ascii_case("wrapgroups")
        {
            match expr::resolve_boolean(ctx, value) {
                Some(wrap) => {
                    key.out_of_range = if wrap {
                        OutOfRange::Wrap
                    } else {
                        OutOfRange::Clamp
                    };
                    key.defined |= KEY_GROUP_INFO;
                    true
                }
                None => {
                    ctx.diag
                        .error(format!("Illegal groupsWrap setting for {}", key.name));
                    false
                }
            }
        } else if field.eq_ignore_ascii_case("groupsclamp")
            || field.eq_ignore_ascii_case("clampgroups")
        {
            match expr::resolve_boolean(ctx, value) {
                Some(clamp) => {
                    key.out_of_range = if clamp {
                        OutOfRange::Clamp
                    } else {
                        OutOfRange::Wrap
                    };
                    key.defined |= KEY_GROUP_INFO;
                    true
                }
                None => {
                    ctx.diag
                        .error(format!("Illegal groupsClamp setting for {}", key.name));
                    false
                }
            }
        } else if field.eq_ignore_ascii_case("groupsredirect")
            || field.eq_ignore_ascii_case("redirectgroups")
        {
            match expr::resolve_group(ctx, value) {
                Some(group) => {
                    key.out_of_range = OutOfRange::Redirect(group - 1);
                    key.defined |= KEY_GROUP_INFO;
                    true
                }
                None => {
                    ctx.diag.error(format!(
                        "Illegal group index for redirect of key {}; \
                         definition with non-integer group ignored",
                        key.name
                    ));
                    false
                }
            }
        } else {
            ctx.diag
                .error(format!("Unknown field {field} in a symbol interpretation"));
            ctx.diag.action("Definition ignored".to_string());
            false
        }
    }

    fn set_group_name(
        &mut self,
        ctx: &mut Context,
        array_ndx: Option<&Expr>,
        value: &Expr,
    ) -> bool {
        let Some(index) = array_ndx else {
            ctx.diag
                .warn("You must specify an index when specifying a group name".to_string());
            ctx.diag
                .action("Group name definition without array subscript ignored".to_string());
            return false;
        };
        let Some(group) = expr::resolve_group(ctx, index) else {
            ctx.diag
                .error("Illegal index in group name definition".to_string());
            return false;
        };
        let Some(name) = expr::resolve_string(ctx, value) else {
            ctx.diag.error("Group name must be a string".to_string());
            ctx.diag
                .action(format!("Illegal name for group {group} ignored"));
            return false;
        };
        let slot = (group as usize - 1 + self.explicit_group as usize).min(NUM_GROUPS - 1);
        self.group_names[slot] = ctx.intern(&name);
        true
    }

    fn handle_symbols_var(&mut self, ctx: &mut Context, keymap: &mut Keymap, stmt: &VarDef) -> bool {
        let Some(name) = &stmt.name else { return false };
        let Some(value) = &stmt.value else { return false };
        let Some((element, field, array_ndx)) = name.as_lhs() else {
            return false;
        };
        let field = field.to_string();
        match element {
            Some(element) if element.eq_ignore_ascii_case("key") => {
                let mut dflt = std::mem::take(&mut self.dflt);
                let ok = self.set_symbols_field(ctx, keymap, &mut dflt, &field, array_ndx, value);
                self.dflt = dflt;
                ok
            }
            None if field.eq_ignore_ascii_case("name")
                || field.eq_ignore_ascii_case("groupname") =>
            {
                self.set_group_name(ctx, array_ndx, value)
            }
            None if field.eq_ignore_ascii_case("groupswrap")
                || field.eq_ignore_ascii_case("wrapgroups") =>
            {
                match expr::resolve_boolean(ctx, value) {
                    Some(wrap) => {
                        self.group_info = Some(if wrap {
                            OutOfRange::Wrap
                        } else {
                            OutOfRange::Clamp
                        });
                        true
                    }
                    None => {
                        ctx.diag
                            .error("Illegal setting for global groupsWrap".to_string());
                        false
                    }
                }
            }
            None if field.eq_ignore_ascii_case("groupsclamp")
                || field.eq_ignore_ascii_case("clampgroups") =>
            {
                match expr::resolve_boolean(ctx, value) {
                    Some(clamp) => {
                        self.group_info = Some(if clamp {
                            OutOfRange::Clamp
                        } else {
                            OutOfRange::Wrap
                        });
                        true
                    }
                    None => {
                        ctx.diag
                            .error("Illegal setting for global groupsClamp".to_string());
                        false
                    }
                }
            }
            None if field.eq_ignore_ascii_case("groupsredirect")
                || field.eq_ignore_ascii_case("redirectgroups") =>
            {
                match expr::resolve_group(ctx, value) {
                    Some(group) => {
                        self.group_info = Some(OutOfRange::Redirect(group - 1));
                        true
                    }
                    None => {
                        ctx.diag
                            .error("Illegal group index for global groupsRedirect".to_string());
                        false
                    }
                }
            }
            None if field.eq_ignore_ascii_case("allownone") => {
                ctx.diag.error("Radio groups not supported".to_string());
                ctx.diag
                    .action("Ignoring \"allow none\" specification".to_string());
                false
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

    fn set_explicit_group_on(&mut self, ctx: &mut Context, key: &mut KeyInfo) -> bool {
        if self.explicit_group == 0 {
            return true;
        }
        let group = self.explicit_group as usize;
        if (key.types_defined | key.syms_defined | key.acts_defined) & !1 != 0 {
            ctx.diag.warn(format!(
                "For the map {} an explicit group was specified, \
                 but key {} has more than one group defined",
                self.name.as_deref().unwrap_or("(unnamed)"),
                key.name
            ));
            ctx.diag
                .action("All groups except first one will be ignored".to_string());
            for i in 1..NUM_GROUPS {
                key.num_levels[i] = 0;
                key.syms[i] = Vec::new();
                key.acts[i] = Vec::new();
                key.types[i] = Atom::NONE;
            }
        }
        key.types_defined = 1 << group;
        key.syms_defined = 1 << group;
        key.acts_defined = 1 << group;
        key.num_levels[group] = key.num_levels[0];
        key.num_levels[0] = 0;
        key.syms[group] = std::mem::take(&mut key.syms[0]);
        key.acts[group] = std::mem::take(&mut key.acts[0]);
        key.types[group] = key.types[0];
        key.types[0] = Atom::NONE;
        true
    }

    fn handle_symbols_def(
        &mut self,
        ctx: &mut Context,
        keymap: &mut Keymap,
        stmt: &SymbolsDef,
        merge: MergeMode,
    ) -> bool {
        let mut key = self.dflt.clone();
        key.merge = stmt.merge.or(merge);
        key.name = KeyName::new(&stmt.key_name);

        for var in &stmt.body {
            let ok = match (&var.name, &var.value) {
                (None, Some(value)) => {
                    // Anonymous entries pick the field from the value
                    // kind: a keysym list or an action list.
                    match value {
                        Expr::ActionList(_) => {
                            self.add_actions_to_key(ctx, keymap, &mut key, None, value)
                        }
                        _ => self.add_symbols_to_key(ctx, &mut key, None, value),
                    }
                }
                (Some(name), Some(value)) => match name.as_lhs() {
                    Some((Some(_), _, _)) => self.handle_symbols_var(ctx, keymap, var),
                    Some((None, field, array_ndx)) => {
                        let field = field.to_string();
                        self.set_symbols_field(ctx, keymap, &mut key, &field, array_ndx, value)
                    }
                    None => false,
                },
                _ => false,
            };
            if !ok {
                self.errors += 1;
                return false;
            }
        }

        if !self.set_explicit_group_on(ctx, &mut key) {
            self.errors += 1;
            return false;
        }

        self.add_key_symbols(ctx, keymap, key);
        true
    }

    fn handle_mod_map_def(
        &mut self,
        ctx: &mut Context,
        def: &ModMapDef,
        merge: MergeMode,
    ) -> bool {
        let Some(modifier) = crate::keymap::ModMask::index_for_name(&def.modifier) else {
            ctx.diag
                .error("Illegal modifier map definition".to_string());
            ctx.diag.action(format!(
                "Ignoring map for non-modifier \"{}\"",
                def.modifier
            ));
            return false;
        };
        let merge = def.merge.or(merge);
        let mut ok = true;
        for key in &def.keys {
            let target = match key {
                Expr::Value(Value::KeyName(name)) => ModMapTarget::Name(KeyName::new(name)),
                other => match expr::resolve_keysym(ctx, other) {
                    Some(sym) => ModMapTarget::Sym(sym),
                    None => {
                        ctx.diag.error(
                            "Modmap entries may contain only key names or keysyms".to_string(),
                        );
                        ok = false;
                        continue;
                    }
                },
            };
            self.add_mod_map_entry(
                ctx,
                ModMapEntry {
                    merge,
                    modifier,
                    target,
                },
            );
        }
        ok
    }

    /// Fill gaps between defined groups from group one, and collapse
    /// keys whose groups are all identical back to one group.
    fn prepare_key_def(key: &mut KeyInfo) {
        let defined = key.syms_defined | key.acts_defined | key.types_defined;
        let last_group = (0..NUM_GROUPS)
            .rev()
            .find(|&i| defined & (1 << i) != 0)
            .unwrap_or(0);
        if last_group == 0 {
            return;
        }

        for group in 1..=last_group {
            if defined & (1 << group) != 0 {
                continue;
            }
            let width = key.num_levels[0];
            if key.types_defined & 1 != 0 {
                key.types[group] = key.types[0];
                key.types_defined |= 1 << group;
            }
            if key.acts_defined & 1 != 0 && !key.acts[0].is_empty() {
                key.acts[group] = key.acts[0].clone();
                key.acts_defined |= 1 << group;
            }
            if key.syms_defined & 1 != 0 && !key.syms[0].is_empty() {
                key.syms[group] = key.syms[0].clone();
                key.syms_defined |= 1 << group;
            }
            if defined & 1 != 0 {
                key.num_levels[group] = width;
            }
        }

        let identical = (1..=last_group).all(|group| {
            key.num_levels[group] == key.num_levels[0]
                && key.types[group] == key.types[0]
                && key.syms[group] == key.syms[0]
                && key.acts[group] == key.acts[0]
        });
        if identical {
            for group in 1..=last_group {
                key.num_levels[group] = 0;
                key.syms[group] = Vec::new();
                key.acts[group] = Vec::new();
                key.types[group] = Atom::NONE;
            }
            key.syms_defined &= 1;
            key.acts_defined &= 1;
            key.types_defined &= 1;
        }
    }

    /// Pick a type for a group with no explicit one, from the symbols.
    fn find_automatic_type(
        ctx: &mut Context,
        width: u16,
        syms: &[Keysym],
    ) -> (Atom, bool) {
        if width <= 1 {
            (ctx.intern("ONE_LEVEL"), true)
        } else if width == 2 {
            if syms.len() >= 2 && keysym::keysym_is_lower(syms[0]) && keysym::keysym_is_upper(syms[1])
            {
                (ctx.intern("ALPHABETIC"), false)
            } else if syms
                .iter()
                .take(2)
                .any(|&sym| keysym::keysym_is_keypad(sym))
            {
                (ctx.intern("KEYPAD"), true)
            } else {
                (ctx.intern("TWO_LEVEL"), true)
            }
        } else if width <= 4 {
            if syms.len() >= 2 && keysym::keysym_is_lower(syms[0]) && keysym::keysym_is_upper(syms[1])
            {
                if syms.len() >= 4
                    && keysym::keysym_is_lower(syms[2])
                    && keysym::keysym_is_upper(syms[3])
                {
                    (ctx.intern("FOUR_LEVEL_ALPHABETIC"), false)
                } else {
                    (ctx.intern("FOUR_LEVEL_SEMIALPHABETIC"), false)
                }
            } else if syms
                .iter()
                .take(2)
                .any(|&sym| keysym::keysym_is_keypad(sym))
            {
                (ctx.intern("FOUR_LEVEL_KEYPAD"), false)
            } else {
                (ctx.intern("FOUR_LEVEL"), false)
            }
        } else {
            (Atom::NONE, false)
        }
    }

    /// Copy one accumulated key into the keymap arenas.  Repeats for
    /// every keycode carrying the key's name (alternate forms).
    fn copy_symbols_def(&self, ctx: &mut Context, keymap: &mut Keymap, key: &KeyInfo) -> bool {
        let mut start_from = 0;
        let mut found_any = false;
        loop {
            let use_alias = start_from == 0;
            let Some(kc) = keymap.find_named_key(key.name, use_alias, start_from) else {
                if !found_any && start_from == 0 && ctx.diag.warning_level() >= 5 {
                    ctx.diag
                        .warn(format!("Key {} not found in keycodes", key.name));
                    ctx.diag.action("Symbols ignored".to_string());
                }
                return found_any;
            };
            found_any = true;
            self.copy_symbols_to_keycode(ctx, keymap, key, kc);
            start_from = kc + 1;
            if start_from > keymap.max_key_code {
                return true;
            }
        }
    }

    fn copy_symbols_to_keycode(
        &self,
        ctx: &mut Context,
        keymap: &mut Keymap,
        key: &KeyInfo,
        kc: u32,
    ) {
        let mut key = key.clone();
        let mut num_groups = 0usize;
        let mut width: u16 = 0;
        let mut have_actions = false;
        let mut types = [TWO_LEVEL_INDEX as u16; NUM_GROUPS];

        for group in 0..NUM_GROUPS {
            if (key.syms_defined | key.acts_defined | key.types_defined) & (1 << group) != 0 {
                num_groups = group + 1;
            }
            if !key.acts[group].iter().all(|a| a.is_none()) {
                have_actions = true;
            }
            let mut auto_type = false;
            if key.types[group].is_none() {
                if !key.dflt_type.is_none() {
                    key.types[group] = key.dflt_type;
                } else {
                    let (name, auto) = Self::find_automatic_type(
                        ctx,
                        key.num_levels[group],
                        &key.syms[group],
                    );
                    key.types[group] = name;
                    auto_type = auto;
                    if name.is_none() && ctx.diag.warning_level() >= 5 {
                        ctx.diag.warn(format!(
                            "No automatic type for {} symbols",
                            key.num_levels[group]
                        ));
                    }
                }
            }
            match keymap.type_by_name(key.types[group]) {
                Some(idx) => {
                    types[group] = idx as u16;
                    if !auto_type || key.num_levels[group] > 2 {
                        keymap.explicit[kc as usize] |=
                            Explicit::from_bits_truncate(1u8 << group);
                    }
                }
                None => {
                    if ctx.diag.warning_level() >= 3 {
                        ctx.diag.warn(format!(
                            "Type \"{}\" is not defined; \
                             using TWO_LEVEL for the {} key (keycode {kc})",
                            ctx.atom_text(key.types[group]),
                            key.name
                        ));
                    }
                    types[group] = TWO_LEVEL_INDEX as u16;
                }
            }
            let type_width = keymap.types[types[group] as usize].num_levels;
            if type_width < key.num_levels[group] {
                ctx.diag.warn_lvl(
                    0,
                    format!(
                        "Type \"{}\" has {} levels, but {} has {} symbols; \
                         ignoring extra symbols",
                        ctx.atom_text(key.types[group]),
                        type_width,
                        key.name,
                        key.num_levels[group]
                    ),
                );
                key.num_levels[group] = type_width;
            }
            width = width.max(key.num_levels[group]).max(type_width);
        }

        let total = width as usize * num_groups;
        let syms_offset = keymap.syms.len() as u32;
        keymap.syms.resize(keymap.syms.len() + total, NO_SYMBOL);
        let acts_offset = if have_actions {
            let offset = keymap.acts.len() as u32;
            keymap
                .acts
                .resize(keymap.acts.len() + total, Action::None);
            keymap.explicit[kc as usize] |= Explicit::INTERPRET;
            Some(offset)
        } else {
            None
        };

        for group in 0..num_groups {
            for level in 0..key.num_levels[group] as usize {
                let idx = group * width as usize + level;
                if let Some(&sym) = key.syms[group].get(level) {
                    keymap.syms[syms_offset as usize + idx] = sym;
                }
                if let (Some(acts_offset), Some(act)) = (acts_offset, key.acts[group].get(level)) {
                    keymap.acts[acts_offset as usize + idx] = act.clone();
                }
            }
        }

        let map = &mut keymap.key_sym_maps[kc as usize];
        map.width = width as u8;
        map.num_groups = num_groups as u8;
        if key.defined & KEY_GROUP_INFO != 0 {
            map.out_of_range = key.out_of_range;
        }
        map.syms_offset = syms_offset;
        map.acts_offset = acts_offset;
        for group in 0..num_groups {
            if key.num_levels[group] > 0 {
                map.type_indices[group] = types[group];
            }
        }

        if key.behavior != Behavior::Default {
            keymap.behaviors[kc as usize] = key.behavior;
            keymap.explicit[kc as usize] |= Explicit::BEHAVIOR;
        }
        if key.defined & KEY_VMODMAP != 0 {
            keymap.vmodmap[kc as usize] = key.vmodmap;
            keymap.explicit[kc as usize] |= Explicit::VMODMAP;
        }
        if let Some(repeat) = key.repeat {
            keymap.repeats[kc as usize] = repeat;
            keymap.explicit[kc as usize] |= Explicit::AUTO_REPEAT;
        }

        if num_groups as u8 > keymap.num_groups {
            keymap.num_groups = num_groups as u8;
        }
    }

    fn copy_mod_map_def(&self, ctx: &mut Context, keymap: &mut Keymap, entry: &ModMapEntry) -> bool {
        let kc = match &entry.target {
            ModMapTarget::Name(name) => match keymap.find_named_key(*name, true, 0) {
                Some(kc) => kc,
                None => {
                    if ctx.diag.warning_level() >= 5 {
                        ctx.diag
                            .warn(format!("Key {name} not found in keycodes"));
                        ctx.diag.action(format!(
                            "Modifier map entry for {} not updated",
                            crate::keymap::ModMask::REAL_MOD_NAMES[entry.modifier as usize]
                        ));
                    }
                    return false;
                }
            },
            ModMapTarget::Sym(sym) => match find_key_for_symbol(keymap, *sym) {
                Some(kc) => kc,
                None => {
                    if ctx.diag.warning_level() > 5 {
                        ctx.diag.warn(format!(
                            "Key \"{}\" not found in symbol map",
                            keysym::keysym_to_string(*sym)
                        ));
                        ctx.diag.action(format!(
                            "Modifier map entry for {} not updated",
                            crate::keymap::ModMask::REAL_MOD_NAMES[entry.modifier as usize]
                        ));
                    }
                    return false;
                }
            },
        };
        keymap.modmap[kc as usize] |=
            crate::keymap::ModMask::from_bits_truncate(1 << entry.modifier);
        true
    }
}

/// Scan the symbol arena level-major for the first key producing `sym`.
fn find_key_for_symbol(keymap: &Keymap, sym: Keysym) -> Option<u32> {
    let mut level = 0usize;
    loop {
        let mut got_one = false;
        for kc in keymap.min_key_code..=keymap.max_key_code {
            let num_groups = keymap.key_num_groups(kc) as usize;
            let width = keymap.key_width(kc) as usize;
            if level < num_groups * width {
                got_one = true;
                let (group, lvl) = (level / width.max(1), level % width.max(1));
                if keymap.key_sym(kc, group, lvl) == sym {
                    return Some(kc);
                }
            }
        }
        if !got_one {
            return None;
        }
        level += 1;
    }
}

impl IncludeTarget for SymbolsInfo {
    const FILE_TYPE: FileType = FileType::Symbols;

    fn fresh(&self, _ctx: &mut Context, keymap: &mut Keymap, file_id: u32) -> Self {
        SymbolsInfo::new(keymap, file_id, Some(self))
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

    fn set_explicit_group(&mut self, ctx: &mut Context, group: u8) {
        let _ = ctx;
        self.explicit_group = group - 1;
    }

    fn handle_file(&mut self, ctx: &mut Context, keymap: &mut Keymap, file: &XkbFile, merge: MergeMode) {
        self.name = Some(file.name.clone());
        for stmt in &file.defs {
            let ok = match stmt {
                Stmt::Include(inc) => handle_include(ctx, keymap, self, inc),
                Stmt::Symbols(def) => self.handle_symbols_def(ctx, keymap, def, merge),
                Stmt::Var(def) => self.handle_symbols_var(ctx, keymap, def),
                Stmt::VModList(defs) => {
                    let mut ok = true;
                    for def in defs {
                        let mut vmods = self.vmods;
                        ok &= vmod::handle_vmod_def(ctx, keymap, def, merge, &mut vmods);
                        self.vmods = vmods;
                    }
                    ok
                }
                Stmt::ModMap(def) => self.handle_mod_map_def(ctx, def, merge),
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
                        "Symbols files may not include other declarations; \
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
                    .action(format!("Abandoning symbols file \"{}\"", file.top_name));
                break;
            }
        }
    }

    fn merge_from(&mut self, ctx: &mut Context, keymap: &mut Keymap, from: Self, merge: MergeMode) {
        if from.errors > 0 {
            self.errors += from.errors;
            return;
        }
        if self.name.is_none() {
            self.name = from.name.clone();
        }
        for (i, name) in from.group_names.into_iter().enumerate() {
            if !name.is_none() && (merge != MergeMode::Augment || self.group_names[i].is_none()) {
                self.group_names[i] = name;
            }
        }
        if let Some(group_info) = from.group_info {
            if merge != MergeMode::Augment || self.group_info.is_none() {
                self.group_info = Some(group_info);
            }
        }
        for mut key in from.keys {
            if merge != MergeMode::Default {
                key.merge = merge;
            }
            self.add_key_symbols(ctx, keymap, key);
        }
        for mut entry in from.mod_map {
            if merge != MergeMode::Default {
                entry.merge = merge;
            }
            self.add_mod_map_entry(ctx, entry);
        }
        alias::merge_aliases(ctx, &mut self.aliases, from.aliases, merge);
    }
}

/// Compile an `xkb_symbols` section into the keymap.
pub(crate) fn compile_symbols(
    ctx: &mut Context,
    keymap: &mut Keymap,
    file: &XkbFile,
    merge: MergeMode,
) -> bool {
    let mut info = SymbolsInfo::new(keymap, file.id, None);
    info.dflt.merge = merge;
    info.handle_file(ctx, keymap, file, merge);

    if info.errors != 0 {
        return false;
    }

    alias::apply_aliases(ctx, keymap, std::mem::take(&mut info.aliases));

    for (i, name) in info.group_names.iter().enumerate() {
        if !name.is_none() {
            keymap.group_names[i] = *name;
        }
    }
    if let Some(group_info) = info.group_info {
        keymap.groups_wrap = group_info;
    }

    let mut keys = std::mem::take(&mut info.keys);
    for key in keys.iter_mut() {
        SymbolsInfo::prepare_key_def(key);
    }
    for key in &keys {
        info.copy_symbols_def(ctx, keymap, key);
    }
    info.keys = keys;

    for entry in &info.mod_map {
        info.copy_mod_map_def(ctx, keymap, entry);
    }

    keymap.names.symbols = info.name.clone();
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::parser::Parser;
    use crate::compile::{keycodes, types};
    use crate::keymap::actions::{Action, ActionFlags};
    use crate::keymap::ModMask;

    fn compile_full(keycodes_src: &str, types_src: &str, symbols_src: &str) -> (Context, Keymap, bool) {
        let mut ctx = Context::new();
        let source = format!("{keycodes_src}\n{types_src}\n{symbols_src}");
        let files = Parser::new(&source, "test")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap();
        let mut keymap = Keymap::new(ctx.atoms.clone());
        assert!(keycodes::compile_keycodes(
            &mut ctx,
            &mut keymap,
            &files[0],
            MergeMode::Override
        ));
        assert!(types::compile_key_types(
            &mut ctx,
            &mut keymap,
            &files[1],
            MergeMode::Override
        ));
        let ok = compile_symbols(&mut ctx, &mut keymap, &files[2], MergeMode::Override);
        keymap.atoms = ctx.atoms.clone();
        (ctx, keymap, ok)
    }

    const KEYCODES: &str = r#"xkb_keycodes "test" {
        <AC01> = 38;
        <AE01> = 10;
        <LFSH> = 50;
        <NMLK> = 77;
        alias <LSGT> = <AC01>;
    };"#;

    const TYPES: &str = r#"xkb_types "test" { virtual_modifiers NumLock; };"#;

    #[test]
    fn symbols_land_in_the_arena() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <AC01> { [ a, A ] };
                key <AE01> { [ 1, exclam ] };
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.key_sym(38, 0, 0), 0x61);
        assert_eq!(keymap.key_sym(38, 0, 1), 0x41);
        assert_eq!(keymap.key_sym(10, 0, 0), 0x31);
        assert_eq!(keymap.key_num_groups(38), 1);
        assert_eq!(keymap.num_groups(), 1);
    }

    #[test]
    fn alphabetic_type_is_inferred() {
        let (ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <AC01> { [ a, A ] };
                key <AE01> { [ 1, exclam ] };
            };"#,
        );
        assert!(ok);
        assert_eq!(ctx.atom_text(keymap.key_type(38, 0).name), "ALPHABETIC");
        assert_eq!(ctx.atom_text(keymap.key_type(10, 0).name), "TWO_LEVEL");
    }

    #[test]
    fn keypad_type_is_inferred() {
        let (ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "kp" {
                key <AE01> { [ KP_End, KP_1 ] };
            };"#,
        );
        assert!(ok);
        assert_eq!(ctx.atom_text(keymap.key_type(10, 0).name), "KEYPAD");
    }

    #[test]
    fn explicit_type_wins() {
        let (ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <AC01> { type = "ONE_LEVEL", [ a, A ] };
            };"#,
        );
        assert!(ok);
        // extra symbols beyond the type's width are truncated
        assert_eq!(ctx.atom_text(keymap.key_type(38, 0).name), "ONE_LEVEL");
        assert_eq!(keymap.key_sym(38, 0, 1), NO_SYMBOL);
    }

    #[test]
    fn actions_mark_explicit_interp() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <LFSH> {
                    [ Shift_L ],
                    actions[Group1] = [ SetMods(modifiers=Shift) ]
                };
            };"#,
        );
        assert!(ok);
        assert!(keymap.key_has_actions(50));
        let Action::SetMods(act) = keymap.key_action(50, 0, 0) else {
            panic!("expected SetMods");
        };
        assert_eq!(act.mods.real, ModMask::SHIFT);
        assert!(!act.flags.contains(ActionFlags::CLEAR_LOCKS));
        assert!(keymap.explicit[50].contains(Explicit::INTERPRET));
    }

    #[test]
    fn modmap_by_name_and_by_symbol() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <AC01> { [ a, A ] };
                key <LFSH> { [ Shift_L ] };
                modifier_map Shift { <LFSH> };
                modifier_map Control { a };
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.key_modmap(50), ModMask::SHIFT);
        assert_eq!(keymap.key_modmap(38), ModMask::CONTROL);
    }

    #[test]
    fn vmods_contribute_to_vmodmap() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <NMLK> { [ Num_Lock ], vmods = NumLock };
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.key_vmodmap(77), 1 << 0);
    }

    #[test]
    fn multiple_groups_widen_the_key() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "multi" {
                key <AC01> {
                    symbols[Group1] = [ a, A ],
                    symbols[Group2] = [ Cyrillic_a ]
                };
            };"#,
        );
        assert!(ok);
        // Cyrillic_a is unknown to the built-in table; it degrades to
        // NoSymbol but the group still exists.
        assert_eq!(keymap.key_num_groups(38), 2);
        assert_eq!(keymap.num_groups(), 2);
        assert_eq!(keymap.key_width(38), 2);
    }

    #[test]
    fn symbols_through_alias() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <LSGT> { [ less, greater ] };
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.key_sym(38, 0, 0), 0x3c);
    }

    #[test]
    fn group_names_recorded() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                name[Group1] = "English (US)";
                key <AC01> { [ a, A ] };
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.group_name(0).as_deref(), Some("English (US)"));
        assert_eq!(keymap.group_index_for_name("English (US)"), Some(0));
    }

    #[test]
    fn missing_key_reports_but_continues() {
        let (_ctx, keymap, ok) = compile_full(
            KEYCODES,
            TYPES,
            r#"xkb_symbols "us" {
                key <NOPE> { [ q ] };
                key <AC01> { [ a, A ] };
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.key_sym(38, 0, 0), 0x61);
    }
}
