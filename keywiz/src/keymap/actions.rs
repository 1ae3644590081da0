//! Key actions.
//!
//! Every level of every key may carry an action alongside its keysym.
//! The modifier and group families (set/latch/lock) drive the state
//! engine; the remaining families are recognized and stored so that
//! descriptions using them still compile, but their runtime handlers are
//! no-ops.

use super::{KeyName, Mods};
use bitflags::bitflags;

bitflags! {
    /// Behaviour flags shared by the action families.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ActionFlags: u16 {
        /// Releasing this key clears any matching locks.
        const CLEAR_LOCKS = 1 << 0;
        /// A second latch of the same modifiers promotes to a lock.
        const LATCH_TO_LOCK = 1 << 1;
        /// Take the modifiers from the key's modmap instead of the
        /// action's own mask.
        const USE_MODMAP_MODS = 1 << 2;
        /// The group field is an absolute index, not a delta.
        const GROUP_ABSOLUTE = 1 << 3;
        /// Lock without unlocking / unlock without locking.
        const LOCK_NO_LOCK = 1 << 4;
        const LOCK_NO_UNLOCK = 1 << 5;
        /// Pointer motion is absolute.
        const ABSOLUTE_X = 1 << 6;
        const ABSOLUTE_Y = 1 << 7;
        const NO_ACCELERATION = 1 << 8;
        /// Switch-screen target is absolute / stays in the same server.
        const SWITCH_ABSOLUTE = 1 << 9;
        const SWITCH_APPLICATION = 1 << 10;
        /// Message reporting points.
        const MESSAGE_ON_PRESS = 1 << 11;
        const MESSAGE_ON_RELEASE = 1 << 12;
        const MESSAGE_GEN_KEY_EVENT = 1 << 13;
        /// Default-button value is absolute.
        const DFLT_BTN_ABSOLUTE = 1 << 14;
        /// ISO-lock default affects the group rather than the modifiers.
        const ISO_DFLT_IS_GROUP = 1 << 15;
    }
}

/// `SetMods` / `LatchMods` / `LockMods` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModAction {
    pub flags: ActionFlags,
    pub mods: Mods,
}

/// `SetGroup` / `LatchGroup` / `LockGroup` payload.  `group` is absolute
/// (0-based) when `GROUP_ABSOLUTE` is set, a signed delta otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupAction {
    pub flags: ActionFlags,
    pub group: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerAction {
    pub flags: ActionFlags,
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerButtonAction {
    pub flags: ActionFlags,
    pub button: u8,
    pub count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerDefaultAction {
    pub flags: ActionFlags,
    pub value: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsoLockAction {
    pub flags: ActionFlags,
    pub mods: Mods,
    pub group: i16,
    pub affect: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchScreenAction {
    pub flags: ActionFlags,
    pub screen: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlsAction {
    pub flags: ActionFlags,
    pub ctrls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageAction {
    pub flags: ActionFlags,
    pub message: [u8; 6],
}

/// Reserved: parsed for tolerance, scheduled for deletion upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedirectKeyAction {
    pub new_key: KeyName,
    pub mods_mask: Mods,
    pub mods: Mods,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceButtonAction {
    pub flags: ActionFlags,
    pub device: u16,
    pub button: u8,
    pub count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceValuatorAction {
    pub device: u16,
    pub v1_what: u8,
    pub v1_index: u16,
    pub v1_value: i16,
    pub v2_what: u8,
    pub v2_index: u16,
    pub v2_value: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrivateAction {
    pub action_type: u8,
    pub data: [u8; 7],
}

/// One action, tagged by family.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    None,
    SetMods(ModAction),
    LatchMods(ModAction),
    LockMods(ModAction),
    SetGroup(GroupAction),
    LatchGroup(GroupAction),
    LockGroup(GroupAction),
    MovePointer(PointerAction),
    PointerButton(PointerButtonAction),
    LockPointerButton(PointerButtonAction),
    SetPointerDefault(PointerDefaultAction),
    IsoLock(IsoLockAction),
    Terminate,
    SwitchScreen(SwitchScreenAction),
    SetControls(ControlsAction),
    LockControls(ControlsAction),
    Message(MessageAction),
    RedirectKey(RedirectKeyAction),
    DeviceButton(DeviceButtonAction),
    LockDeviceButton(DeviceButtonAction),
    DeviceValuator(DeviceValuatorAction),
    Private(PrivateAction),
}

impl Action {
    /// The wire-protocol type code of this action family.  The latch
    /// filter's break test is a bitmask over these codes.
    pub fn type_code(&self) -> u8 {
        match self {
            Action::None => 0,
            Action::SetMods(_) => 1,
            Action::LatchMods(_) => 2,
            Action::LockMods(_) => 3,
            Action::SetGroup(_) => 4,
            Action::LatchGroup(_) => 5,
            Action::LockGroup(_) => 6,
            Action::MovePointer(_) => 7,
            Action::PointerButton(_) => 8,
            Action::LockPointerButton(_) => 9,
            Action::SetPointerDefault(_) => 10,
            Action::IsoLock(_) => 11,
            Action::Terminate => 12,
            Action::SwitchScreen(_) => 13,
            Action::SetControls(_) => 14,
            Action::LockControls(_) => 15,
            Action::Message(_) => 16,
            Action::RedirectKey(_) => 17,
            Action::DeviceButton(_) => 18,
            Action::LockDeviceButton(_) => 19,
            Action::DeviceValuator(_) => 20,
            Action::Private(_) => 21,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Action::None => "NoAction",
            Action::SetMods(_) => "SetMods",
            Action::LatchMods(_) => "LatchMods",
            Action::LockMods(_) => "LockMods",
            Action::SetGroup(_) => "SetGroup",
            Action::LatchGroup(_) => "LatchGroup",
            Action::LockGroup(_) => "LockGroup",
            Action::MovePointer(_) => "MovePtr",
            Action::PointerButton(_) => "PtrBtn",
            Action::LockPointerButton(_) => "LockPtrBtn",
            Action::SetPointerDefault(_) => "SetPtrDflt",
            Action::IsoLock(_) => "ISOLock",
            Action::Terminate => "Terminate",
            Action::SwitchScreen(_) => "SwitchScreen",
            Action::SetControls(_) => "SetControls",
            Action::LockControls(_) => "LockControls",
            Action::Message(_) => "ActionMessage",
            Action::RedirectKey(_) => "RedirectKey",
            Action::DeviceButton(_) => "DeviceBtn",
            Action::LockDeviceButton(_) => "LockDeviceBtn",
            Action::DeviceValuator(_) => "DeviceValuator",
            Action::Private(_) => "Private",
        }
    }
}

/// Bitmask over action type codes whose arrival breaks a pending latch.
/// Mirrors the classic protocol constant: everything except the modifier
/// and group set/latch/lock families and the pointer-motion action.
pub const BREAK_LATCH_TYPES: u32 = (1 << 0)      // NoAction
    | (1 << 8)                                   // PtrBtn
    | (1 << 9)                                   // LockPtrBtn
    | (1 << 12)                                  // Terminate
    | (1 << 13)                                  // SwitchScreen
    | (1 << 14)                                  // SetControls
    | (1 << 15)                                  // LockControls
    | (1 << 16)                                  // ActionMessage
    | (1 << 17)                                  // RedirectKey
    | (1 << 18)                                  // DeviceBtn
    | (1 << 19); // LockDeviceBtn

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn break_latch_membership() {
        assert_ne!(BREAK_LATCH_TYPES & (1 << Action::None.type_code()), 0);
        assert_ne!(BREAK_LATCH_TYPES & (1 << Action::Terminate.type_code()), 0);
        assert_eq!(
            BREAK_LATCH_TYPES & (1 << Action::SetMods(ModAction::default()).type_code()),
            0
        );
        assert_eq!(
            BREAK_LATCH_TYPES & (1 << Action::LockGroup(GroupAction::default()).type_code()),
            0
        );
    }
}
