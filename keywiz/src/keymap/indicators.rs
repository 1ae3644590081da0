//! Indicator (LED) maps.
//!
//! Each of the 32 indicator slots may carry a map deriving the LED state
//! from the modifier state, the group state, or the enabled controls.

use super::Mods;
use bitflags::bitflags;

bitflags! {
    /// Which components of the modifier (or group) state feed an
    /// indicator predicate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateParts: u8 {
        const BASE = 1 << 0;
        const LATCHED = 1 << 1;
        const LOCKED = 1 << 2;
        const EFFECTIVE = 1 << 3;
        const COMPAT = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IndicatorFlags: u8 {
        /// Clients may not change this indicator explicitly.
        const NO_EXPLICIT = 1 << 0;
        /// The keyboard state does not drive this indicator.
        const NO_AUTOMATIC = 1 << 1;
        /// Changing the indicator changes the keyboard state.
        const LED_DRIVES_KBD = 1 << 2;
    }
}

/// One indicator map.  At runtime the LED is on iff any enabled predicate
/// among mods/groups/ctrls matches the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndicatorMap {
    pub flags: IndicatorFlags,
    pub which_groups: StateParts,
    /// One-hot mask over groups 0..4.
    pub groups: u8,
    pub which_mods: StateParts,
    pub mods: Mods,
    /// Mask over the boolean controls.
    pub ctrls: u32,
}

impl IndicatorMap {
    pub fn is_unset(&self) -> bool {
        self.which_mods.is_empty() && self.which_groups.is_empty() && self.ctrls == 0
    }
}
