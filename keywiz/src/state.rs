//! The runtime state engine.
//!
//! A [`State`] tracks, for one input device, the base/latched/locked
//! modifier and group components, the derived effective state, and the
//! LED bitmap, as driven by a stream of key press/release events
//! against a frozen keymap.
//!
//! In-flight set/latch/lock actions live in a small filter arena.  On
//! every event the active filters get first refusal; only events they
//! all pass through reach the key's own action, which may install a new
//! filter.  Cleared filter slots are reused.
//!
//! Queries reflect the state as of the most recent update.  Clients
//! following the usual convention resolve a key's symbols *before*
//! feeding its own press into the state, so a latch broken by a key
//! press still applies to that press.

use crate::keymap::actions::{Action, ActionFlags, GroupAction, BREAK_LATCH_TYPES};
use crate::keymap::{Keycode, Keymap, ModMask, NUM_INDICATORS};
use crate::keysym::{Keysym, NO_SYMBOL};
use bitflags::bitflags;
use std::cell::Cell;
use std::sync::Arc;

/// Key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

bitflags! {
    /// Which components of the state a query refers to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateComponent: u8 {
        const DEPRESSED = 1 << 0;
        const LATCHED = 1 << 1;
        const LOCKED = 1 << 2;
        const EFFECTIVE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    ModSet,
    ModLatch,
    ModLock,
    GroupSet,
    GroupLatch,
    GroupLock,
}

const NO_LATCH: u32 = 0;
const LATCH_KEY_DOWN: u32 = 1;
const LATCH_PENDING: u32 = 2;

#[derive(Debug, Clone)]
struct Filter {
    kind: Option<FilterKind>,
    keycode: Keycode,
    action: Action,
    /// Latch state for latch filters, previously-locked bits for lock
    /// filters.
    priv_: u32,
    /// The group delta a group filter applied, for undo.
    group_delta: i32,
    refcnt: u32,
}

impl Filter {
    fn empty() -> Self {
        Self {
            kind: None,
            keycode: 0,
            action: Action::None,
            priv_: 0,
            group_delta: 0,
            refcnt: 0,
        }
    }
}

/// Per-device keyboard state over a shared keymap.
pub struct State {
    keymap: Arc<Keymap>,
    base_mods: ModMask,
    latched_mods: ModMask,
    locked_mods: ModMask,
    mods: ModMask,
    base_group: i32,
    latched_group: i32,
    locked_group: i32,
    group: u32,
    leds: u32,
    filters: Vec<Filter>,
    /// Opt into reading `which_groups` (instead of `which_mods`) when
    /// evaluating group-driven indicators.
    corrected_group_which: bool,
    reported_bad_action: Cell<bool>,
}

impl State {
    pub fn new(keymap: Arc<Keymap>) -> Self {
        Self {
            keymap,
            base_mods: ModMask::empty(),
            latched_mods: ModMask::empty(),
            locked_mods: ModMask::empty(),
            mods: ModMask::empty(),
            base_group: 0,
            latched_group: 0,
            locked_group: 0,
            group: 0,
            leds: 0,
            filters: Vec::new(),
            corrected_group_which: false,
            reported_bad_action: Cell::new(false),
        }
    }

    pub fn keymap(&self) -> &Arc<Keymap> {
        &self.keymap
    }

    /// The indicator `which_groups` source selection historically reads
    /// the `which_mods` flag bits; pass `true` to read `which_groups`.
    pub fn set_corrected_group_which(&mut self, corrected: bool) {
        self.corrected_group_which = corrected;
    }

    // Lookup.

    /// The group a key would use right now, after its out-of-range
    /// policy.
    pub fn key_get_group(&self, kc: Keycode) -> u32 {
        let num_groups = self.keymap.key_num_groups(kc);
        if num_groups == 0 {
            return 0;
        }
        if self.group < u32::from(num_groups) {
            return self.group;
        }
        let map = match self.keymap.key_sym_map(kc) {
            Some(map) => map,
            None => return 0,
        };
        map.out_of_range.resolve(self.group as i32, num_groups)
    }

    /// The shift level the effective modifiers select on `(kc, group)`.
    pub fn key_get_level(&self, kc: Keycode, group: u32) -> u32 {
        let ty = self.keymap.key_type(kc, group as usize);
        let masked = self.mods & ty.mods.mask;
        let (level, _) = ty.level_for(masked);
        u32::from(level)
    }

    /// The keysym the key produces in the current state.
    pub fn key_get_one_sym(&self, kc: Keycode) -> Keysym {
        if !self.keymap.keycode_in_range(kc) {
            return NO_SYMBOL;
        }
        let group = self.key_get_group(kc);
        let level = self.key_get_level(kc, group);
        self.keymap.key_sym(kc, group as usize, level as usize)
    }

    /// The modifiers consumed by level selection on this key, minus any
    /// the matching entry preserves.
    pub fn key_consumed_mods(&self, kc: Keycode) -> ModMask {
        let group = self.key_get_group(kc);
        let ty = self.keymap.key_type(kc, group as usize);
        let masked = self.mods & ty.mods.mask;
        let (_, preserved) = ty.level_for(masked);
        ty.mods.mask & !preserved
    }

    fn key_get_action(&self, kc: Keycode) -> Action {
        if !self.keymap.key_has_actions(kc) || !self.keymap.keycode_in_range(kc) {
            return Action::None;
        }
        let group = self.key_get_group(kc);
        let level = self.key_get_level(kc, group);
        let action = self.keymap.key_action(kc, group as usize, level as usize);
        if matches!(action, Action::None)
            && self.keymap.key_sym(kc, group as usize, level as usize) == NO_SYMBOL
            && !self.reported_bad_action.get()
        {
            self.reported_bad_action.set(true);
            log::debug!("no action bound at keycode {kc} group {group} level {level}");
        }
        action
    }

    // Filters.

    fn filter_new(&mut self) -> usize {
        if let Some(idx) = self.filters.iter().position(|f| f.kind.is_none()) {
            self.filters[idx] = Filter::empty();
            self.filters[idx].refcnt = 1;
            return idx;
        }
        self.filters.push(Filter::empty());
        let idx = self.filters.len() - 1;
        self.filters[idx].refcnt = 1;
        idx
    }

    /// Returns true when the event should pass through to further
    /// processing.
    fn run_filter(&mut self, filter: &mut Filter, kc: Keycode, direction: KeyDirection) -> bool {
        match filter.kind {
            None => true,
            Some(FilterKind::ModSet) => self.filter_mod_set(filter, kc, direction),
            Some(FilterKind::ModLatch) => self.filter_mod_latch(filter, kc, direction),
            Some(FilterKind::ModLock) => self.filter_mod_lock(filter, kc, direction),
            Some(FilterKind::GroupSet) => self.filter_group_set(filter, kc, direction),
            Some(FilterKind::GroupLatch) => self.filter_group_latch(filter, kc, direction),
            Some(FilterKind::GroupLock) => self.filter_group_lock(filter, kc, direction),
        }
    }

    fn filter_mod_set(&mut self, filter: &mut Filter, kc: Keycode, direction: KeyDirection) -> bool {
        let Action::SetMods(act) = &mut filter.action else {
            filter.kind = None;
            return true;
        };
        if kc != filter.keycode {
            // Another key went down while ours was held: releasing ours
            // must no longer clear locks.
            if direction == KeyDirection::Down {
                act.flags.remove(ActionFlags::CLEAR_LOCKS);
            }
            return true;
        }
        if direction == KeyDirection::Down {
            filter.refcnt += 1;
            return false;
        }
        filter.refcnt -= 1;
        if filter.refcnt > 0 {
            return false;
        }
        self.base_mods &= !act.mods.mask;
        if act.flags.contains(ActionFlags::CLEAR_LOCKS) {
            self.locked_mods &= !act.mods.mask;
        }
        filter.kind = None;
        true
    }

    fn filter_mod_lock(&mut self, filter: &mut Filter, kc: Keycode, direction: KeyDirection) -> bool {
        if kc != filter.keycode {
            return true;
        }
        if direction == KeyDirection::Down {
            filter.refcnt += 1;
            return false;
        }
        filter.refcnt -= 1;
        if filter.refcnt > 0 {
            return false;
        }
        filter.kind = None;
        true
    }

    fn filter_mod_latch(
        &mut self,
        filter: &mut Filter,
        kc: Keycode,
        direction: KeyDirection,
    ) -> bool {
        let Action::LatchMods(act) = filter.action.clone() else {
            filter.kind = None;
            return true;
        };
        let mut latch = filter.priv_;

        if direction == KeyDirection::Down && latch == LATCH_PENDING {
            // A new key while our single latched press is pending:
            // a matching latch promotes (to a lock with latchToLock,
            // else to a plain set); a latch-breaking action clears it.
            let action = self.key_get_action(kc);
            match &action {
                Action::LatchMods(new_act)
                    if new_act.flags == act.flags && new_act.mods.mask == act.mods.mask =>
                {
                    if act.flags.contains(ActionFlags::LATCH_TO_LOCK) {
                        filter.action = Action::LockMods(*new_act);
                        filter.kind = Some(FilterKind::ModLock);
                        self.locked_mods |= new_act.mods.mask;
                    } else {
                        filter.action = Action::SetMods(*new_act);
                        filter.kind = Some(FilterKind::ModSet);
                        self.base_mods |= new_act.mods.mask;
                    }
                    filter.keycode = kc;
                    self.latched_mods &= !new_act.mods.mask;
                    return false;
                }
                other if BREAK_LATCH_TYPES & (1 << other.type_code()) != 0 => {
                    // The ordering here is deliberate: the breaking
                    // press clears the latch during its own update, so
                    // clients resolving symbols before updating see the
                    // latched modifiers applied to that press.
                    self.latched_mods &= !act.mods.mask;
                    filter.kind = None;
                    return true;
                }
                _ => {}
            }
        } else if direction == KeyDirection::Up && kc == filter.keycode {
            // Our key got released: latch, unless this press was a
            // clear-locks release of an already-locked modifier.
            if latch == NO_LATCH
                || (act.flags.contains(ActionFlags::CLEAR_LOCKS)
                    && self.locked_mods & act.mods.mask == act.mods.mask)
            {
                if latch == LATCH_PENDING {
                    self.latched_mods &= !act.mods.mask;
                } else {
                    self.base_mods &= !act.mods.mask;
                }
                self.locked_mods &= !act.mods.mask;
                filter.kind = None;
            } else {
                latch = LATCH_PENDING;
                self.base_mods &= !act.mods.mask;
                self.latched_mods |= act.mods.mask;
            }
        } else if direction == KeyDirection::Down && latch == LATCH_KEY_DOWN {
            // Another key while the latching key is still held: keep
            // the base modifier active but don't trip the latch.
            latch = NO_LATCH;
        }

        filter.priv_ = latch;
        true
    }

    fn filter_group_set(
        &mut self,
        filter: &mut Filter,
        kc: Keycode,
        direction: KeyDirection,
    ) -> bool {
        let Action::SetGroup(act) = &mut filter.action else {
            filter.kind = None;
            return true;
        };
        if kc != filter.keycode {
            if direction == KeyDirection::Down {
                act.flags.remove(ActionFlags::CLEAR_LOCKS);
            }
            return true;
        }
        if direction == KeyDirection::Down {
            filter.refcnt += 1;
            return false;
        }
        filter.refcnt -= 1;
        if filter.refcnt > 0 {
            return false;
        }
        self.base_group -= filter.group_delta;
        if act.flags.contains(ActionFlags::CLEAR_LOCKS) {
            self.locked_group = 0;
        }
        filter.kind = None;
        true
    }

    fn filter_group_lock(
        &mut self,
        filter: &mut Filter,
        kc: Keycode,
        direction: KeyDirection,
    ) -> bool {
        if kc != filter.keycode {
            return true;
        }
        if direction == KeyDirection::Down {
            filter.refcnt += 1;
            return false;
        }
        filter.refcnt -= 1;
        if filter.refcnt > 0 {
            return false;
        }
        filter.kind = None;
        true
    }

    fn filter_group_latch(
        &mut self,
        filter: &mut Filter,
        kc: Keycode,
        direction: KeyDirection,
    ) -> bool {
        let Action::LatchGroup(act) = filter.action.clone() else {
            filter.kind = None;
            return true;
        };
        let mut latch = filter.priv_;

        if direction == KeyDirection::Down && latch == LATCH_PENDING {
            let action = self.key_get_action(kc);
            match &action {
                Action::LatchGroup(new_act)
                    if new_act.flags == act.flags && new_act.group == act.group =>
                {
                    let delta = filter.group_delta;
                    if act.flags.contains(ActionFlags::LATCH_TO_LOCK) {
                        filter.action = Action::LockGroup(*new_act);
                        filter.kind = Some(FilterKind::GroupLock);
                        self.locked_group += delta;
                    } else {
                        filter.action = Action::SetGroup(*new_act);
                        filter.kind = Some(FilterKind::GroupSet);
                        self.base_group += delta;
                    }
                    filter.keycode = kc;
                    self.latched_group -= delta;
                    return false;
                }
                other if BREAK_LATCH_TYPES & (1 << other.type_code()) != 0 => {
                    self.latched_group -= filter.group_delta;
                    filter.kind = None;
                    return true;
                }
                _ => {}
            }
        } else if direction == KeyDirection::Up && kc == filter.keycode {
            if latch == NO_LATCH {
                self.base_group -= filter.group_delta;
                filter.kind = None;
            } else {
                latch = LATCH_PENDING;
                self.base_group -= filter.group_delta;
                self.latched_group += filter.group_delta;
            }
        } else if direction == KeyDirection::Down && latch == LATCH_KEY_DOWN {
            latch = NO_LATCH;
        }

        filter.priv_ = latch;
        true
    }

    // Filter installation on fresh presses.

    fn install_filter(&mut self, kc: Keycode, action: Action) {
        match action {
            Action::SetMods(act) => {
                let idx = self.filter_new();
                self.filters[idx].kind = Some(FilterKind::ModSet);
                self.filters[idx].keycode = kc;
                self.filters[idx].action = Action::SetMods(act);
                self.base_mods |= act.mods.mask;
            }
            Action::LatchMods(act) => {
                let idx = self.filter_new();
                self.filters[idx].kind = Some(FilterKind::ModLatch);
                self.filters[idx].keycode = kc;
                self.filters[idx].action = Action::LatchMods(act);
                self.filters[idx].priv_ = LATCH_KEY_DOWN;
                self.base_mods |= act.mods.mask;
            }
            Action::LockMods(act) => {
                let idx = self.filter_new();
                self.filters[idx].kind = Some(FilterKind::ModLock);
                self.filters[idx].keycode = kc;
                self.filters[idx].action = Action::LockMods(act);
                // Lock toggles on press; remember what was previously
                // locked so a re-lock is visible to debugging.
                self.filters[idx].priv_ = (self.locked_mods & act.mods.mask).bits() as u32;
                self.locked_mods ^= act.mods.mask;
            }
            Action::SetGroup(act) => {
                let idx = self.filter_new();
                let delta = self.group_action_delta(&act);
                self.filters[idx].kind = Some(FilterKind::GroupSet);
                self.filters[idx].keycode = kc;
                self.filters[idx].action = Action::SetGroup(act);
                self.filters[idx].group_delta = delta;
                self.base_group += delta;
            }
            Action::LatchGroup(act) => {
                let idx = self.filter_new();
                let delta = self.group_action_delta(&act);
                self.filters[idx].kind = Some(FilterKind::GroupLatch);
                self.filters[idx].keycode = kc;
                self.filters[idx].action = Action::LatchGroup(act);
                self.filters[idx].priv_ = LATCH_KEY_DOWN;
                self.filters[idx].group_delta = delta;
                self.base_group += delta;
            }
            Action::LockGroup(act) => {
                let idx = self.filter_new();
                self.filters[idx].kind = Some(FilterKind::GroupLock);
                self.filters[idx].keycode = kc;
                self.filters[idx].action = Action::LockGroup(act);
                if act.flags.contains(ActionFlags::GROUP_ABSOLUTE) {
                    self.locked_group = i32::from(act.group);
                } else {
                    self.locked_group += i32::from(act.group);
                }
            }
            // The remaining families are parsed but have no runtime
            // effect here.
            _ => {}
        }
    }

    /// The base-group delta a set/latch group action applies, relative
    /// to the current base group for absolute actions.
    fn group_action_delta(&self, act: &GroupAction) -> i32 {
        if act.flags.contains(ActionFlags::GROUP_ABSOLUTE) {
            i32::from(act.group) - self.base_group
        } else {
            i32::from(act.group)
        }
    }

    fn filter_apply_all(&mut self, kc: Keycode, direction: KeyDirection) {
        let mut send = true;
        for i in 0..self.filters.len() {
            if self.filters[i].kind.is_none() {
                continue;
            }
            let mut filter = std::mem::replace(&mut self.filters[i], Filter::empty());
            let pass = self.run_filter(&mut filter, kc, direction);
            self.filters[i] = filter;
            send &= pass;
        }

        if !send || direction == KeyDirection::Up {
            return;
        }
        let action = self.key_get_action(kc);
        self.install_filter(kc, action);
    }

    // Derived state.

    fn led_update_all(&mut self) {
        self.leds = 0;
        for led in 0..NUM_INDICATORS {
            let Some(map) = self.keymap.indicator_map(led).copied() else {
                continue;
            };
            if map.is_unset() {
                continue;
            }

            use crate::keymap::indicators::StateParts;
            if !map.which_mods.is_empty() {
                let mut mod_mask = ModMask::empty();
                if map.which_mods.contains(StateParts::BASE) {
                    mod_mask |= self.base_mods;
                }
                if map.which_mods.contains(StateParts::LATCHED) {
                    mod_mask |= self.latched_mods;
                }
                if map.which_mods.contains(StateParts::LOCKED) {
                    mod_mask |= self.locked_mods;
                }
                if map.which_mods.contains(StateParts::EFFECTIVE) {
                    mod_mask |= self.mods;
                }
                if !(map.mods.mask & mod_mask).is_empty() {
                    self.leds |= 1 << led;
                }
            } else if !map.which_groups.is_empty() {
                // The flag bits selecting the group source come from
                // `which_mods`, the behaviour deployed keymaps expect;
                // `corrected_group_which` opts into reading
                // `which_groups` instead.
                let which = if self.corrected_group_which {
                    map.which_groups
                } else {
                    map.which_mods
                };
                let mut group_mask = 0u8;
                if which.contains(StateParts::BASE) {
                    group_mask |= mask_for_group(self.base_group);
                }
                if which.contains(StateParts::LATCHED) {
                    group_mask |= mask_for_group(self.latched_group);
                }
                if which.contains(StateParts::LOCKED) {
                    group_mask |= mask_for_group(self.locked_group);
                }
                if which.contains(StateParts::EFFECTIVE) {
                    group_mask |= mask_for_group(self.group as i32);
                }
                if map.groups & group_mask != 0 {
                    self.leds |= 1 << led;
                }
            } else if map.ctrls != 0 {
                if map.ctrls & self.keymap.enabled_ctrls() != 0 {
                    self.leds |= 1 << led;
                }
            }
        }
    }

    fn update_derived(&mut self) {
        self.mods = self.base_mods | self.latched_mods | self.locked_mods;
        let raw = self.locked_group + self.base_group + self.latched_group;
        self.group = self
            .keymap
            .groups_wrap()
            .resolve(raw, self.keymap.num_groups());
        self.led_update_all();
    }

    // Public update entry points.

    /// Feed one key event through the filters and refresh the derived
    /// state.  State updates never fail.
    pub fn update_key(&mut self, kc: Keycode, direction: KeyDirection) {
        self.filter_apply_all(kc, direction);
        self.update_derived();
    }

    /// Overwrite the state from explicit component masks, as received
    /// from a master state elsewhere.  This round-trip is lossy; it is
    /// meant for mirroring, not for local event processing.
    #[allow(clippy::too_many_arguments)]
    pub fn update_mask(
        &mut self,
        base_mods: ModMask,
        latched_mods: ModMask,
        locked_mods: ModMask,
        base_group: i32,
        latched_group: i32,
        locked_group: i32,
    ) {
        self.base_mods = base_mods;
        self.latched_mods = latched_mods;
        self.locked_mods = locked_mods;
        self.base_group = base_group;
        self.latched_group = latched_group;
        self.locked_group = locked_group;
        self.update_derived();
    }

    /// Serialise the requested modifier components into one mask.
    pub fn serialise_mods(&self, which: StateComponent) -> ModMask {
        if which.contains(StateComponent::EFFECTIVE) {
            return self.mods;
        }
        let mut mask = ModMask::empty();
        if which.contains(StateComponent::DEPRESSED) {
            mask |= self.base_mods;
        }
        if which.contains(StateComponent::LATCHED) {
            mask |= self.latched_mods;
        }
        if which.contains(StateComponent::LOCKED) {
            mask |= self.locked_mods;
        }
        mask
    }

    /// Serialise the requested group components.
    pub fn serialise_group(&self, which: StateComponent) -> i32 {
        if which.contains(StateComponent::EFFECTIVE) {
            return self.group as i32;
        }
        let mut group = 0;
        if which.contains(StateComponent::DEPRESSED) {
            group += self.base_group;
        }
        if which.contains(StateComponent::LATCHED) {
            group += self.latched_group;
        }
        if which.contains(StateComponent::LOCKED) {
            group += self.locked_group;
        }
        group
    }

    /// Whether the real modifier with this index is active in any of
    /// the requested components.  `None` when the index is invalid.
    pub fn mod_index_is_active(&self, idx: u8, which: StateComponent) -> Option<bool> {
        if idx >= 8 {
            return None;
        }
        let bit = ModMask::from_bits_truncate(1 << idx);
        Some(!(self.serialise_mods(which) & bit).is_empty())
    }

    pub fn mod_name_is_active(&self, name: &str, which: StateComponent) -> Option<bool> {
        let idx = ModMask::index_for_name(name)?;
        self.mod_index_is_active(idx, which)
    }

    pub fn group_index_is_active(&self, idx: u32, which: StateComponent) -> Option<bool> {
        if idx >= u32::from(self.keymap.num_groups()) {
            return None;
        }
        if which.contains(StateComponent::EFFECTIVE) {
            return Some(self.group == idx);
        }
        let mut active = false;
        if which.contains(StateComponent::DEPRESSED) {
            active |= self.base_group == idx as i32;
        }
        if which.contains(StateComponent::LATCHED) {
            active |= self.latched_group == idx as i32;
        }
        if which.contains(StateComponent::LOCKED) {
            active |= self.locked_group == idx as i32;
        }
        Some(active)
    }

    pub fn group_name_is_active(&self, name: &str, which: StateComponent) -> Option<bool> {
        let idx = self.keymap.group_index_for_name(name)?;
        self.group_index_is_active(idx, which)
    }

    pub fn led_index_is_active(&self, idx: u32) -> Option<bool> {
        if idx >= NUM_INDICATORS as u32 {
            return None;
        }
        Some(self.leds & (1 << idx) != 0)
    }

    pub fn led_name_is_active(&self, name: &str) -> Option<bool> {
        let idx = self.keymap.led_index_for_name(name)?;
        self.led_index_is_active(idx)
    }

    pub fn leds(&self) -> u32 {
        self.leds
    }
}

fn mask_for_group(group: i32) -> u8 {
    if (0..8).contains(&group) {
        1 << group
    } else {
        0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keymap::actions::ModAction;
    use crate::keymap::Mods;

    /// A tiny keymap built by hand: a shift key, a letter, and a latch
    /// key, enough to drive the filter machinery without the compiler.
    fn test_keymap(latch_flags: ActionFlags) -> Arc<Keymap> {
        use crate::atom::Atoms;
        use crate::keymap::{KeySymMap, KeyType, MapEntry, TWO_LEVEL_INDEX};

        let mut atoms = Atoms::new();
        let mut keymap = Keymap::new(atoms.clone());
        keymap.min_key_code = 8;
        keymap.max_key_code = 20;
        keymap.num_groups = 1;
        keymap.resize_key_tables();

        keymap.types = vec![
            KeyType {
                name: atoms.intern("ONE_LEVEL"),
                mods: Mods::default(),
                num_levels: 1,
                map: Vec::new(),
                preserve: Vec::new(),
                level_names: Vec::new(),
            },
            KeyType {
                name: atoms.intern("TWO_LEVEL"),
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
        ];

        // keycode 10: letter 'a' on TWO_LEVEL
        keymap.key_sym_maps[10] = KeySymMap {
            type_indices: [TWO_LEVEL_INDEX as u16, 0, 0, 0],
            num_groups: 1,
            width: 2,
            syms_offset: 0,
            acts_offset: None,
            ..KeySymMap::default()
        };
        keymap.syms.extend([0x61, 0x41]);

        // keycode 11: shift via SetMods
        keymap.key_sym_maps[11] = KeySymMap {
            num_groups: 1,
            width: 1,
            syms_offset: 2,
            acts_offset: Some(0),
            ..KeySymMap::default()
        };
        keymap.syms.push(0xffe1);
        keymap.acts.push(Action::SetMods(ModAction {
            flags: ActionFlags::empty(),
            mods: Mods::from_real(ModMask::SHIFT),
        }));

        // keycode 12: latching shift
        keymap.key_sym_maps[12] = KeySymMap {
            num_groups: 1,
            width: 1,
            syms_offset: 3,
            acts_offset: Some(1),
            ..KeySymMap::default()
        };
        keymap.syms.push(0xffe1);
        keymap.acts.push(Action::LatchMods(ModAction {
            flags: latch_flags,
            mods: Mods::from_real(ModMask::SHIFT),
        }));

        keymap.atoms = atoms;
        Arc::new(keymap)
    }

    #[test]
    fn set_mods_down_up() {
        let mut state = State::new(test_keymap(ActionFlags::empty()));
        state.update_key(11, KeyDirection::Down);
        assert_eq!(state.serialise_mods(StateComponent::DEPRESSED), ModMask::SHIFT);
        assert_eq!(state.key_get_one_sym(10), 0x41);
        state.update_key(11, KeyDirection::Up);
        assert_eq!(state.serialise_mods(StateComponent::EFFECTIVE), ModMask::empty());
        assert_eq!(state.key_get_one_sym(10), 0x61);
    }

    #[test]
    fn nested_presses_refcount() {
        let mut state = State::new(test_keymap(ActionFlags::empty()));
        state.update_key(11, KeyDirection::Down);
        state.update_key(11, KeyDirection::Down);
        state.update_key(11, KeyDirection::Up);
        // still held once
        assert_eq!(state.serialise_mods(StateComponent::DEPRESSED), ModMask::SHIFT);
        state.update_key(11, KeyDirection::Up);
        assert_eq!(state.serialise_mods(StateComponent::DEPRESSED), ModMask::empty());
    }

    #[test]
    fn latch_then_letter_clears() {
        let mut state = State::new(test_keymap(ActionFlags::empty()));
        state.update_key(12, KeyDirection::Down);
        state.update_key(12, KeyDirection::Up);
        assert_eq!(state.serialise_mods(StateComponent::LATCHED), ModMask::SHIFT);
        // the letter press sees the latch (lookup before update)...
        assert_eq!(state.key_get_one_sym(10), 0x41);
        state.update_key(10, KeyDirection::Down);
        // ...and breaks it during its own update
        assert_eq!(state.serialise_mods(StateComponent::LATCHED), ModMask::empty());
        state.update_key(10, KeyDirection::Up);
        assert_eq!(state.key_get_one_sym(10), 0x61);
    }

    #[test]
    fn latch_promotes_to_lock_with_flag() {
        let mut state = State::new(test_keymap(ActionFlags::LATCH_TO_LOCK));
        state.update_key(12, KeyDirection::Down);
        state.update_key(12, KeyDirection::Up);
        assert_eq!(state.serialise_mods(StateComponent::LATCHED), ModMask::SHIFT);
        state.update_key(12, KeyDirection::Down);
        state.update_key(12, KeyDirection::Up);
        assert_eq!(state.serialise_mods(StateComponent::LOCKED), ModMask::SHIFT);
        assert_eq!(state.serialise_mods(StateComponent::LATCHED), ModMask::empty());
    }

    #[test]
    fn latch_without_flag_does_not_lock() {
        let mut state = State::new(test_keymap(ActionFlags::empty()));
        state.update_key(12, KeyDirection::Down);
        state.update_key(12, KeyDirection::Up);
        state.update_key(12, KeyDirection::Down);
        state.update_key(12, KeyDirection::Up);
        assert_eq!(state.serialise_mods(StateComponent::LOCKED), ModMask::empty());
    }

    #[test]
    fn held_latch_acts_as_plain_modifier() {
        let mut state = State::new(test_keymap(ActionFlags::empty()));
        state.update_key(12, KeyDirection::Down);
        assert_eq!(state.key_get_one_sym(10), 0x41);
        state.update_key(10, KeyDirection::Down);
        state.update_key(10, KeyDirection::Up);
        state.update_key(12, KeyDirection::Up);
        // no latch: another key was pressed while held
        assert_eq!(state.serialise_mods(StateComponent::LATCHED), ModMask::empty());
        assert_eq!(state.serialise_mods(StateComponent::EFFECTIVE), ModMask::empty());
    }

    #[test]
    fn update_mask_and_group_wrap() {
        let keymap = {
            let mut keymap = test_keymap(ActionFlags::empty());
            Arc::get_mut(&mut keymap).unwrap().num_groups = 3;
            keymap
        };
        let mut state = State::new(keymap);
        state.update_mask(
            ModMask::empty(),
            ModMask::empty(),
            ModMask::empty(),
            0,
            0,
            5,
        );
        assert_eq!(state.serialise_group(StateComponent::EFFECTIVE), 2);
        assert_eq!(state.group_index_is_active(2, StateComponent::EFFECTIVE), Some(true));
        assert_eq!(state.group_index_is_active(5, StateComponent::EFFECTIVE), None);
    }

    #[test]
    fn mod_queries() {
        let mut state = State::new(test_keymap(ActionFlags::empty()));
        state.update_key(11, KeyDirection::Down);
        assert_eq!(
            state.mod_name_is_active("Shift", StateComponent::DEPRESSED),
            Some(true)
        );
        assert_eq!(
            state.mod_name_is_active("Control", StateComponent::DEPRESSED),
            Some(false)
        );
        assert_eq!(state.mod_name_is_active("NoSuch", StateComponent::DEPRESSED), None);
        assert_eq!(state.mod_index_is_active(9, StateComponent::DEPRESSED), None);
    }
}
