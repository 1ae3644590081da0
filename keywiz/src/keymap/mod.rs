//! The compiled keymap.
//!
//! A [`Keymap`] owns every arena produced by compilation: the keycode
//! range and per-key tables, the key types, the packed symbol and action
//! arenas, the modifier maps, the symbol interpretations, the indicator
//! maps, and the (optional) geometry.  Once compilation freezes it, a
//! keymap is immutable and may be shared read-only between any number of
//! state engines.
//!
//! Per-key symbols live in a single packed arena: each key records an
//! `offset` and a `width`, and the symbol for `(group, level)` sits at
//! `offset + group * width + level`.  Actions are packed identically in a
//! parallel arena, present only for keys that have at least one
//! non-trivial action.

pub mod actions;
pub mod geometry;
pub mod indicators;

use crate::atom::{Atom, Atoms};
use crate::keysym::{Keysym, NO_SYMBOL};
use actions::Action;
use bitflags::bitflags;
use geometry::Geometry;
use indicators::IndicatorMap;
use std::borrow::Cow;

/// Integer identifying a physical key, stable within a keymap.
pub type Keycode = u32;

/// Keyboard groups (layers) per key.
pub const NUM_GROUPS: usize = 4;
/// Named virtual-modifier slots.
pub const NUM_VMODS: usize = 8;
/// Indicator (LED) slots.
pub const NUM_INDICATORS: usize = 32;
/// Highest shift level a key type may name.
pub const MAX_LEVELS: u16 = 8;
/// Lowest legal keycode.
pub const MIN_LEGAL_KEYCODE: Keycode = 8;
/// Highest legal keycode.
pub const MAX_LEGAL_KEYCODE: Keycode = 255;

bitflags! {
    /// The eight real modifier bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ModMask: u8 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

impl ModMask {
    pub const REAL_MOD_NAMES: [&'static str; 8] = [
        "Shift", "Lock", "Control", "Mod1", "Mod2", "Mod3", "Mod4", "Mod5",
    ];

    /// The modifier index (0..8) for a real modifier name, matched
    /// case-insensitively.
    pub fn index_for_name(name: &str) -> Option<u8> {
        Self::REAL_MOD_NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| i as u8)
    }
}

/// A mask over the virtual-modifier slots.
pub type VModMask = u16;

/// A modifier specification: the real bits, the virtual bits, and the
/// effective mask once the virtual bits have been resolved (§ virtual
/// modifier resolution).  Until resolution, `mask` mirrors `real`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mods {
    pub mask: ModMask,
    pub real: ModMask,
    pub vmods: VModMask,
}

impl Mods {
    pub fn from_real(real: ModMask) -> Self {
        Self {
            mask: real,
            real,
            vmods: 0,
        }
    }

    pub fn new(real: ModMask, vmods: VModMask) -> Self {
        Self {
            mask: real,
            real,
            vmods,
        }
    }
}

/// A four-byte tag identifying a physical key position, e.g. `AC01`.
/// Short names are NUL-padded; the 32-bit form is used for hashing and
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct KeyName([u8; 4]);

impl KeyName {
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; 4];
        for (slot, b) in bytes.iter_mut().zip(name.bytes()) {
            *slot = b;
        }
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn text(&self) -> String {
        self.0
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }
}

impl std::fmt::Display for KeyName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "<{}>", self.text())
    }
}

/// `alias → real` key name pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAlias {
    pub alias: KeyName,
    pub real: KeyName,
}

/// One `modifier-combination → level` association in a key type.
/// Entries whose virtual modifiers resolve to nothing are inactive and
/// never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEntry {
    pub active: bool,
    pub level: u16,
    pub mods: Mods,
}

/// A key type: how active modifiers select a shift level.
#[derive(Debug, Clone, Default)]
pub struct KeyType {
    pub name: Atom,
    pub mods: Mods,
    pub num_levels: u16,
    pub map: Vec<MapEntry>,
    /// Parallel to `map` when non-empty: modifiers to leave unconsumed
    /// when the matching entry is chosen.
    pub preserve: Vec<Mods>,
    pub level_names: Vec<Atom>,
}

impl KeyType {
    /// The level selected by `mods` (already masked by the caller), and
    /// the preserved modifiers of the matching entry.
    pub fn level_for(&self, mods: ModMask) -> (u16, ModMask) {
        for (i, entry) in self.map.iter().enumerate() {
            if entry.active && entry.mods.mask == mods {
                let preserved = self
                    .preserve
                    .get(i)
                    .map(|p| p.mask)
                    .unwrap_or(ModMask::empty());
                return (entry.level, preserved);
            }
        }
        (0, ModMask::empty())
    }
}

/// Indices of the four canonical types in the keymap type table.
pub const ONE_LEVEL_INDEX: usize = 0;
pub const TWO_LEVEL_INDEX: usize = 1;
pub const ALPHABETIC_INDEX: usize = 2;
pub const KEYPAD_INDEX: usize = 3;

/// What a key does when the effective group is outside its own range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfRange {
    #[default]
    Wrap,
    Clamp,
    Redirect(u8),
}

impl OutOfRange {
    /// Bring a possibly out-of-range group index into `0..num_groups`.
    pub fn resolve(self, group: i32, num_groups: u8) -> u32 {
        let n = i32::from(num_groups.max(1));
        if (0..n).contains(&group) {
            return group as u32;
        }
        match self {
            OutOfRange::Wrap => group.rem_euclid(n) as u32,
            OutOfRange::Clamp => {
                if group < 0 {
                    0
                } else {
                    (n - 1) as u32
                }
            }
            OutOfRange::Redirect(target) => {
                if i32::from(target) < n {
                    u32::from(target)
                } else {
                    0
                }
            }
        }
    }
}

/// Per-key symbol map: group count, out-of-range policy, per-group type
/// indices and the shared offset into the packed arenas.
#[derive(Debug, Clone, Copy)]
pub struct KeySymMap {
    pub type_indices: [u16; NUM_GROUPS],
    pub num_groups: u8,
    pub out_of_range: OutOfRange,
    pub width: u8,
    pub syms_offset: u32,
    pub acts_offset: Option<u32>,
}

impl Default for KeySymMap {
    fn default() -> Self {
        Self {
            type_indices: [ONE_LEVEL_INDEX as u16; NUM_GROUPS],
            num_groups: 0,
            out_of_range: OutOfRange::Wrap,
            width: 0,
            syms_offset: 0,
            acts_offset: None,
        }
    }
}

bitflags! {
    /// Which per-key components were given explicitly rather than
    /// synthesized from symbol interpretations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Explicit: u8 {
        const TYPE_1 = 1 << 0;
        const TYPE_2 = 1 << 1;
        const TYPE_3 = 1 << 2;
        const TYPE_4 = 1 << 3;
        const INTERPRET = 1 << 4;
        const AUTO_REPEAT = 1 << 5;
        const BEHAVIOR = 1 << 6;
        const VMODMAP = 1 << 7;
    }
}

/// Key behaviour (`locking`, radio groups...).  Parsed and stored, no
/// runtime effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Default,
    Lock {
        permanent: bool,
    },
}

/// How a symbol interpretation's modifier mask is matched against a
/// key's modmap bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    NoneOf,
    AnyOfOrNone,
    AnyOf,
    AllOf,
    Exactly,
}

impl MatchOp {
    pub fn matches(self, interp_mods: ModMask, key_mods: ModMask) -> bool {
        let both = interp_mods & key_mods;
        match self {
            MatchOp::NoneOf => both.is_empty(),
            MatchOp::AnyOfOrNone => key_mods.is_empty() || !both.is_empty(),
            MatchOp::AnyOf => !both.is_empty(),
            MatchOp::AllOf => both == interp_mods,
            MatchOp::Exactly => interp_mods == key_mods,
        }
    }
}

/// A symbol interpretation: supplies a default action (and optionally a
/// virtual modifier binding) for key levels whose symbols statement gave
/// none.
#[derive(Debug, Clone)]
pub struct SymInterpret {
    pub sym: Keysym,
    pub match_op: MatchOp,
    /// Only match against level one of group one.
    pub level_one_only: bool,
    pub mods: ModMask,
    pub virtual_mod: Option<u8>,
    pub action: Action,
    pub repeat: bool,
    pub locking: bool,
}

impl Default for SymInterpret {
    fn default() -> Self {
        Self {
            sym: NO_SYMBOL,
            match_op: MatchOp::AnyOfOrNone,
            level_one_only: false,
            mods: ModMask::empty(),
            virtual_mod: None,
            action: Action::None,
            repeat: false,
            locking: false,
        }
    }
}

/// Names of the components a keymap was assembled from.
#[derive(Debug, Clone, Default)]
pub struct ComponentNames {
    pub keymap: Option<String>,
    pub keycodes: Option<String>,
    pub types: Option<String>,
    pub compat: Option<String>,
    pub symbols: Option<String>,
    pub geometry: Option<String>,
}

/// The compiled keyboard description.
pub struct Keymap {
    pub(crate) atoms: Atoms,
    pub(crate) min_key_code: Keycode,
    pub(crate) max_key_code: Keycode,
    // All keycode-indexed tables are sized max_key_code + 1.
    pub(crate) key_names: Vec<KeyName>,
    pub(crate) aliases: Vec<KeyAlias>,
    pub(crate) types: Vec<KeyType>,
    pub(crate) syms: Vec<Keysym>,
    pub(crate) acts: Vec<Action>,
    pub(crate) key_sym_maps: Vec<KeySymMap>,
    pub(crate) behaviors: Vec<Behavior>,
    pub(crate) explicit: Vec<Explicit>,
    pub(crate) modmap: Vec<ModMask>,
    pub(crate) vmodmap: Vec<VModMask>,
    pub(crate) repeats: Vec<bool>,
    pub(crate) vmod_names: [Atom; NUM_VMODS],
    pub(crate) vmod_masks: [ModMask; NUM_VMODS],
    pub(crate) group_names: [Atom; NUM_GROUPS],
    pub(crate) group_compat: [Mods; NUM_GROUPS],
    pub(crate) interps: Vec<SymInterpret>,
    pub(crate) indicator_maps: [IndicatorMap; NUM_INDICATORS],
    pub(crate) indicator_names: [Atom; NUM_INDICATORS],
    pub(crate) phys_indicators: u32,
    pub(crate) num_groups: u8,
    pub(crate) groups_wrap: OutOfRange,
    pub(crate) enabled_ctrls: u32,
    pub(crate) geometry: Option<Geometry>,
    pub(crate) names: ComponentNames,
}

impl Keymap {
    pub(crate) fn new(atoms: Atoms) -> Self {
        Self {
            atoms,
            min_key_code: MIN_LEGAL_KEYCODE,
            max_key_code: MIN_LEGAL_KEYCODE,
            key_names: Vec::new(),
            aliases: Vec::new(),
            types: Vec::new(),
            syms: Vec::new(),
            acts: Vec::new(),
            key_sym_maps: Vec::new(),
            behaviors: Vec::new(),
            explicit: Vec::new(),
            modmap: Vec::new(),
            vmodmap: Vec::new(),
            repeats: Vec::new(),
            vmod_names: [Atom::NONE; NUM_VMODS],
            vmod_masks: [ModMask::empty(); NUM_VMODS],
            group_names: [Atom::NONE; NUM_GROUPS],
            group_compat: [Mods::default(); NUM_GROUPS],
            interps: Vec::new(),
            indicator_maps: [IndicatorMap::default(); NUM_INDICATORS],
            indicator_names: [Atom::NONE; NUM_INDICATORS],
            phys_indicators: !0u32,
            num_groups: 0,
            groups_wrap: OutOfRange::Wrap,
            enabled_ctrls: 0,
            geometry: None,
            names: ComponentNames::default(),
        }
    }

    /// Size every keycode-indexed table for the current range.
    pub(crate) fn resize_key_tables(&mut self) {
        let len = self.max_key_code as usize + 1;
        self.key_names.resize(len, KeyName::default());
        self.key_sym_maps.resize(len, KeySymMap::default());
        self.behaviors.resize(len, Behavior::default());
        self.explicit.resize(len, Explicit::empty());
        self.modmap.resize(len, ModMask::empty());
        self.vmodmap.resize(len, 0);
        self.repeats.resize(len, false);
    }

    pub fn min_key_code(&self) -> Keycode {
        self.min_key_code
    }

    pub fn max_key_code(&self) -> Keycode {
        self.max_key_code
    }

    pub fn keycode_in_range(&self, kc: Keycode) -> bool {
        kc >= self.min_key_code && kc <= self.max_key_code
    }

    /// Keyboard-wide group count (the maximum used by any key).
    pub fn num_groups(&self) -> u8 {
        self.num_groups
    }

    pub(crate) fn groups_wrap(&self) -> OutOfRange {
        self.groups_wrap
    }

    pub fn key_name(&self, kc: Keycode) -> Option<KeyName> {
        let name = *self.key_names.get(kc as usize)?;
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Resolve an alias to the real key name, if there is one.
    pub fn resolve_alias(&self, name: KeyName) -> Option<KeyName> {
        self.aliases
            .iter()
            .find(|a| a.alias == name)
            .map(|a| a.real)
    }

    /// Find the keycode bound to `name`, searching from `start_from` and
    /// optionally chasing aliases.
    pub fn find_named_key(
        &self,
        name: KeyName,
        use_aliases: bool,
        start_from: Keycode,
    ) -> Option<Keycode> {
        let start = start_from.max(self.min_key_code);
        for kc in start..=self.max_key_code {
            if self.key_names[kc as usize] == name {
                return Some(kc);
            }
        }
        if use_aliases {
            if let Some(real) = self.resolve_alias(name) {
                return self.find_named_key(real, false, 0);
            }
        }
        None
    }

    pub fn key_num_groups(&self, kc: Keycode) -> u8 {
        self.key_sym_maps
            .get(kc as usize)
            .map(|m| m.num_groups)
            .unwrap_or(0)
    }

    pub fn key_width(&self, kc: Keycode) -> u8 {
        self.key_sym_maps
            .get(kc as usize)
            .map(|m| m.width)
            .unwrap_or(0)
    }

    pub(crate) fn key_sym_map(&self, kc: Keycode) -> Option<&KeySymMap> {
        self.key_sym_maps.get(kc as usize)
    }

    /// The key type governing `(kc, group)`.
    pub fn key_type(&self, kc: Keycode, group: usize) -> &KeyType {
        let idx = self
            .key_sym_maps
            .get(kc as usize)
            .map(|m| m.type_indices[group & (NUM_GROUPS - 1)] as usize)
            .unwrap_or(ONE_LEVEL_INDEX);
        &self.types[idx]
    }

    pub fn key_num_levels(&self, kc: Keycode, group: usize) -> u16 {
        self.key_type(kc, group).num_levels
    }

    /// The keysym at `(kc, group, level)`, or [`NO_SYMBOL`].
    pub fn key_sym(&self, kc: Keycode, group: usize, level: usize) -> Keysym {
        let Some(map) = self.key_sym_maps.get(kc as usize) else {
            return NO_SYMBOL;
        };
        if group >= map.num_groups as usize || level >= map.width as usize {
            return NO_SYMBOL;
        }
        let idx = map.syms_offset as usize + group * map.width as usize + level;
        self.syms.get(idx).copied().unwrap_or(NO_SYMBOL)
    }

    pub fn key_has_actions(&self, kc: Keycode) -> bool {
        self.key_sym_maps
            .get(kc as usize)
            .map(|m| m.acts_offset.is_some())
            .unwrap_or(false)
    }

    /// The action at `(kc, group, level)`, or [`Action::None`].
    pub fn key_action(&self, kc: Keycode, group: usize, level: usize) -> Action {
        let Some(map) = self.key_sym_maps.get(kc as usize) else {
            return Action::None;
        };
        let Some(offset) = map.acts_offset else {
            return Action::None;
        };
        if group >= map.num_groups as usize || level >= map.width as usize {
            return Action::None;
        }
        let idx = offset as usize + group * map.width as usize + level;
        self.acts.get(idx).cloned().unwrap_or(Action::None)
    }

    pub fn key_repeats(&self, kc: Keycode) -> bool {
        self.repeats.get(kc as usize).copied().unwrap_or(false)
    }

    pub fn key_modmap(&self, kc: Keycode) -> ModMask {
        self.modmap
            .get(kc as usize)
            .copied()
            .unwrap_or(ModMask::empty())
    }

    pub fn key_vmodmap(&self, kc: Keycode) -> VModMask {
        self.vmodmap.get(kc as usize).copied().unwrap_or(0)
    }

    pub fn types(&self) -> &[KeyType] {
        &self.types
    }

    pub fn type_by_name(&self, name: Atom) -> Option<usize> {
        self.types.iter().position(|t| t.name == name)
    }

    /// Index of the virtual modifier with the given name.
    pub fn vmod_index_for_name(&self, name: &str) -> Option<u8> {
        for (i, &vname) in self.vmod_names.iter().enumerate() {
            if !vname.is_none() && self.atoms.text(vname) == name {
                return Some(i as u8);
            }
        }
        None
    }

    pub fn vmod_name(&self, idx: u8) -> Option<Cow<str>> {
        let atom = *self.vmod_names.get(idx as usize)?;
        if atom.is_none() {
            None
        } else {
            Some(self.atoms.text(atom))
        }
    }

    /// The resolved real-modifier mask of a virtual modifier slot.
    pub fn vmod_mask(&self, idx: u8) -> ModMask {
        self.vmod_masks
            .get(idx as usize)
            .copied()
            .unwrap_or(ModMask::empty())
    }

    /// Resolve a virtual-modifier mask to the real bits it stands for.
    pub fn vmods_to_real(&self, vmods: VModMask) -> ModMask {
        let mut mask = ModMask::empty();
        for (i, &m) in self.vmod_masks.iter().enumerate() {
            if vmods & (1 << i) != 0 {
                mask |= m;
            }
        }
        mask
    }

    pub fn group_name(&self, group: usize) -> Option<Cow<str>> {
        let atom = *self.group_names.get(group)?;
        if atom.is_none() {
            None
        } else {
            Some(self.atoms.text(atom))
        }
    }

    pub fn group_index_for_name(&self, name: &str) -> Option<u32> {
        for (i, &atom) in self.group_names.iter().enumerate() {
            if !atom.is_none() && self.atoms.text(atom) == name {
                return Some(i as u32);
            }
        }
        None
    }

    pub fn num_leds(&self) -> usize {
        NUM_INDICATORS
    }

    pub fn led_name(&self, idx: usize) -> Option<Cow<str>> {
        let atom = *self.indicator_names.get(idx)?;
        if atom.is_none() {
            None
        } else {
            Some(self.atoms.text(atom))
        }
    }

    pub fn led_index_for_name(&self, name: &str) -> Option<u32> {
        for (i, &atom) in self.indicator_names.iter().enumerate() {
            if !atom.is_none() && self.atoms.text(atom) == name {
                return Some(i as u32);
            }
        }
        None
    }

    pub fn indicator_map(&self, idx: usize) -> Option<&IndicatorMap> {
        self.indicator_maps.get(idx)
    }

    pub fn interps(&self) -> &[SymInterpret] {
        &self.interps
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn component_names(&self) -> &ComponentNames {
        &self.names
    }

    pub fn atom_text(&self, atom: Atom) -> Cow<str> {
        self.atoms.text(atom)
    }

    pub(crate) fn enabled_ctrls(&self) -> u32 {
        self.enabled_ctrls
    }
}

impl std::fmt::Debug for Keymap {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Keymap")
            .field("min_key_code", &self.min_key_code)
            .field("max_key_code", &self.max_key_code)
            .field("num_types", &self.types.len())
            .field("num_syms", &self.syms.len())
            .field("num_groups", &self.num_groups)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_name_padding() {
        let n = KeyName::new("AE");
        assert_eq!(n.text(), "AE");
        assert_eq!(n.to_string(), "<AE>");
        assert!(KeyName::new("").is_empty());
        assert_eq!(KeyName::new("SPCE"), KeyName::new("SPCE"));
    }

    #[test]
    fn out_of_range_policies() {
        assert_eq!(OutOfRange::Wrap.resolve(5, 3), 2);
        assert_eq!(OutOfRange::Wrap.resolve(-1, 3), 2);
        assert_eq!(OutOfRange::Clamp.resolve(7, 3), 2);
        assert_eq!(OutOfRange::Clamp.resolve(-2, 3), 0);
        assert_eq!(OutOfRange::Redirect(1).resolve(9, 3), 1);
        assert_eq!(OutOfRange::Redirect(7).resolve(9, 3), 0);
        assert_eq!(OutOfRange::Wrap.resolve(1, 3), 1);
    }

    #[test]
    fn match_op_semantics() {
        let k = ModMask::SHIFT | ModMask::CONTROL;
        assert!(MatchOp::AnyOf.matches(ModMask::SHIFT, k));
        assert!(!MatchOp::AnyOf.matches(ModMask::LOCK, k));
        assert!(MatchOp::AllOf.matches(ModMask::SHIFT, k));
        assert!(!MatchOp::AllOf.matches(ModMask::SHIFT | ModMask::LOCK, k));
        assert!(MatchOp::Exactly.matches(k, k));
        assert!(!MatchOp::Exactly.matches(ModMask::SHIFT, k));
        assert!(MatchOp::NoneOf.matches(ModMask::LOCK, k));
        assert!(MatchOp::AnyOfOrNone.matches(ModMask::LOCK, ModMask::empty()));
        assert!(!MatchOp::AnyOfOrNone.matches(ModMask::LOCK, k));
    }

    #[test]
    fn mod_index_names() {
        assert_eq!(ModMask::index_for_name("shift"), Some(0));
        assert_eq!(ModMask::index_for_name("Mod5"), Some(7));
        assert_eq!(ModMask::index_for_name("NumLock"), None);
    }
}
