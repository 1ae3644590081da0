//! Compiles action declarations (`SetMods(modifiers=Shift, clearLocks)`)
//! into [`Action`] values.
//!
//! Sections may also set action factory defaults with statements like
//! `setMods.clearLocks = True;`; those accumulate in [`ActionDefaults`]
//! and seed every subsequently constructed action of that family.

use super::ast::{BinOp, Expr, UnOp, Value};
use super::expr::{self, LookupTable};
use crate::context::Context;
use crate::keymap::actions::*;
use crate::keymap::{KeyName, Keymap, Mods};

/// Boolean keyboard controls, for `SetControls`/`LockControls` and
/// indicator `controls` predicates.
pub const CONTROL_NAMES: &LookupTable = &[
    ("repeatkeys", 1 << 0),
    ("repeat", 1 << 0),
    ("autorepeat", 1 << 0),
    ("slowkeys", 1 << 1),
    ("bouncekeys", 1 << 2),
    ("stickykeys", 1 << 3),
    ("mousekeys", 1 << 4),
    ("mousekeysaccel", 1 << 5),
    ("accessxkeys", 1 << 6),
    ("accessxtimeout", 1 << 7),
    ("accessxfeedback", 1 << 8),
    ("audiblebell", 1 << 9),
    ("ignoregrouplock", 1 << 12),
    ("all", 0x13ff),
    ("overlay1", 0),
    ("overlay2", 0),
    ("none", 0),
];

/// Controls enabled by default on a fresh keymap.
pub const DEFAULT_ENABLED_CONTROLS: u32 = (1 << 0) | (1 << 9);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ClearLocks,
    LatchToLock,
    GenKeyEvent,
    Report,
    Default,
    Affect,
    Increment,
    Modifiers,
    Group,
    X,
    Y,
    Accel,
    Button,
    Value,
    Controls,
    Type,
    Count,
    Screen,
    Same,
    Data,
    Device,
    Keycode,
    ModsToClear,
}

const FIELD_NAMES: &[(&str, Field)] = &[
    ("clearlocks", Field::ClearLocks),
    ("latchtolock", Field::LatchToLock),
    ("genkeyevent", Field::GenKeyEvent),
    ("generatekeyevent", Field::GenKeyEvent),
    ("report", Field::Report),
    ("default", Field::Default),
    ("affect", Field::Affect),
    ("increment", Field::Increment),
    ("modifiers", Field::Modifiers),
    ("mods", Field::Modifiers),
    ("group", Field::Group),
    ("x", Field::X),
    ("y", Field::Y),
    ("accel", Field::Accel),
    ("accelerate", Field::Accel),
    ("repeat", Field::Accel),
    ("button", Field::Button),
    ("value", Field::Value),
    ("controls", Field::Controls),
    ("ctrls", Field::Controls),
    ("type", Field::Type),
    ("count", Field::Count),
    ("screen", Field::Screen),
    ("same", Field::Same),
    ("sameserver", Field::Same),
    ("data", Field::Data),
    ("device", Field::Device),
    ("dev", Field::Device),
    ("key", Field::Keycode),
    ("keycode", Field::Keycode),
    ("kc", Field::Keycode),
    ("clearmods", Field::ModsToClear),
    ("clearmodifiers", Field::ModsToClear),
];

fn field_for_name(name: &str) -> Option<Field> {
    FIELD_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, f)| f)
}

fn action_for_name(name: &str) -> Option<Action> {
    let template = match name.to_ascii_lowercase().as_str() {
        "noaction" => Action::None,
        "setmods" => Action::SetMods(ModAction::default()),
        "latchmods" => Action::LatchMods(ModAction::default()),
        "lockmods" => Action::LockMods(ModAction::default()),
        "setgroup" => Action::SetGroup(GroupAction::default()),
        "latchgroup" => Action::LatchGroup(GroupAction::default()),
        "lockgroup" => Action::LockGroup(GroupAction::default()),
        "moveptr" | "movepointer" => Action::MovePointer(PointerAction::default()),
        "ptrbtn" | "pointerbutton" => Action::PointerButton(PointerButtonAction::default()),
        "lockptrbtn" | "lockpointerbutton" | "lockptrbutton" | "lockpointerbtn" => {
            Action::LockPointerButton(PointerButtonAction::default())
        }
        "setptrdflt" | "setpointerdefault" => {
            Action::SetPointerDefault(PointerDefaultAction::default())
        }
        "isolock" => Action::IsoLock(IsoLockAction::default()),
        "terminate" | "terminateserver" => Action::Terminate,
        "switchscreen" => Action::SwitchScreen(SwitchScreenAction::default()),
        "setcontrols" => Action::SetControls(ControlsAction::default()),
        "lockcontrols" => Action::LockControls(ControlsAction::default()),
        "actionmessage" | "messageaction" | "message" => Action::Message(MessageAction::default()),
        "redirect" | "redirectkey" => Action::RedirectKey(RedirectKeyAction::default()),
        "devbtn" | "devicebtn" | "devbutton" | "devicebutton" => {
            Action::DeviceButton(DeviceButtonAction::default())
        }
        "lockdevbtn" | "lockdevicebtn" | "lockdevbutton" | "lockdevicebutton" => {
            Action::LockDeviceButton(DeviceButtonAction::default())
        }
        "devval" | "deviceval" | "devvaluator" | "devicevaluator" => {
            Action::DeviceValuator(DeviceValuatorAction::default())
        }
        "private" => Action::Private(PrivateAction::default()),
        _ => return None,
    };
    Some(template)
}

/// One recorded `actionName.field = value` default.
#[derive(Clone)]
struct ActionDefault {
    action: String,
    field: Field,
    array_ndx: Option<Expr>,
    value: Expr,
}

/// Factory defaults accumulated from `element.field = value` statements
/// whose element names an action family.
#[derive(Clone, Default)]
pub struct ActionDefaults {
    defaults: Vec<ActionDefault>,
}

impl ActionDefaults {
    /// Record a default if `element` names an action family; returns
    /// false (with diagnostics) otherwise.
    pub fn set_field(
        &mut self,
        ctx: &mut Context,
        element: &str,
        field: &str,
        array_ndx: Option<&Expr>,
        value: &Expr,
    ) -> bool {
        if action_for_name(element).is_none() {
            ctx.diag
                .error(format!("Unknown element {element} encountered"));
            ctx.diag
                .action(format!("Default for field {field} ignored"));
            return false;
        }
        let Some(field) = field_for_name(field) else {
            ctx.diag.error(format!("Unknown field {field} encountered"));
            ctx.diag.action("Default ignored".to_string());
            return false;
        };
        self.defaults.push(ActionDefault {
            action: element.to_ascii_lowercase(),
            field,
            array_ndx: array_ndx.cloned(),
            value: value.clone(),
        });
        true
    }
}

/// Compile one action declaration.
pub fn handle_action_def(
    ctx: &mut Context,
    keymap: &Keymap,
    expr: &Expr,
    defaults: &ActionDefaults,
) -> Option<Action> {
    let Expr::Action { name, args } = expr else {
        ctx.diag.error(format!(
            "Expected an action definition, found {}",
            expr.op_name()
        ));
        return None;
    };
    let Some(mut action) = action_for_name(name) else {
        ctx.diag.error(format!("Unknown action {name}"));
        return None;
    };

    let lowered = name.to_ascii_lowercase();
    for dflt in defaults
        .defaults
        .iter()
        .filter(|d| d.action == lowered)
        .cloned()
        .collect::<Vec<_>>()
    {
        set_action_field(
            ctx,
            keymap,
            &mut action,
            dflt.field,
            dflt.array_ndx.as_ref(),
            &dflt.value,
        );
    }

    for arg in args {
        let (field_expr, value): (&Expr, Expr) = match arg {
            Expr::Binary(BinOp::Assign, lhs, rhs) => (lhs, (**rhs).clone()),
            Expr::Unary(UnOp::Not | UnOp::Invert, inner) => {
                (inner, Expr::Value(Value::Bool(false)))
            }
            other => (other, Expr::Value(Value::Bool(true))),
        };
        let Some((element, field, array_ndx)) = field_expr.as_lhs() else {
            ctx.diag.error(format!(
                "Unexpected {} in action argument",
                field_expr.op_name()
            ));
            continue;
        };
        if element.is_some() {
            ctx.diag
                .error("Cannot change defaults in an action definition".to_string());
            ctx.diag
                .action(format!("Ignoring attempt to change {}.{}", element.unwrap_or(""), field));
            continue;
        }
        let Some(field) = field_for_name(field) else {
            ctx.diag.error(format!("Unknown field name {field}"));
            continue;
        };
        if !set_action_field(ctx, keymap, &mut action, field, array_ndx, &value) {
            ctx.diag
                .action(format!("Action {} definition ignored", action.type_name()));
            return None;
        }
    }

    Some(action)
}

fn report_illegal(ctx: &mut Context, action: &Action, field: Field) -> bool {
    ctx.diag.error(format!(
        "Field {field:?} is not defined for an action of type {}",
        action.type_name()
    ));
    false
}

fn report_mismatch(ctx: &mut Context, action: &Action, field: Field, wanted: &str) -> bool {
    ctx.diag.error(format!(
        "Value of {field:?} field must be of type {wanted} in {}",
        action.type_name()
    ));
    false
}

/// The `modifiers=` field: either the literal `useModMapMods`, or a
/// modifier mask over real and virtual names.
fn check_modifier_field(
    ctx: &mut Context,
    keymap: &Keymap,
    value: &Expr,
    flags: &mut ActionFlags,
) -> Option<Mods> {
    if let Expr::Ident(name) = value {
        if name.eq_ignore_ascii_case("usemodmapmods") || name.eq_ignore_ascii_case("modmapmods") {
            flags.insert(ActionFlags::USE_MODMAP_MODS);
            return Some(Mods::default());
        }
    }
    let mask = expr::resolve_vmod_mask(ctx, keymap, value)?;
    flags.remove(ActionFlags::USE_MODMAP_MODS);
    let (real, vmods) = expr::split_vmod_mask(mask);
    Some(Mods::new(real, vmods))
}

/// The `group=` field: `+n`/`-n` are relative, a bare value is absolute
/// (1-based in the source, 0-based in the action).
fn check_group_field(ctx: &mut Context, value: &Expr, flags: &mut ActionFlags) -> Option<i16> {
    match value {
        Expr::Unary(UnOp::Negate, inner) => {
            flags.remove(ActionFlags::GROUP_ABSOLUTE);
            let group = expr::resolve_group(ctx, inner)?;
            Some(-(i16::from(group)))
        }
        Expr::Unary(UnOp::UnaryPlus, inner) => {
            flags.remove(ActionFlags::GROUP_ABSOLUTE);
            let group = expr::resolve_group(ctx, inner)?;
            Some(i16::from(group))
        }
        _ => {
            flags.insert(ActionFlags::GROUP_ABSOLUTE);
            let group = expr::resolve_group(ctx, value)?;
            Some(i16::from(group) - 1)
        }
    }
}

fn check_flag(
    ctx: &mut Context,
    action: &Action,
    field: Field,
    value: &Expr,
    flags: &mut ActionFlags,
    flag: ActionFlags,
) -> bool {
    match expr::resolve_boolean(ctx, value) {
        Some(true) => {
            flags.insert(flag);
            true
        }
        Some(false) => {
            flags.remove(flag);
            true
        }
        None => report_mismatch(ctx, action, field, "boolean"),
    }
}

const LOCK_WHICH: &LookupTable = &[
    ("both", 0),
    ("lock", ActionFlags::LOCK_NO_UNLOCK.bits() as u32),
    (
        "neither",
        (ActionFlags::LOCK_NO_LOCK.bits() | ActionFlags::LOCK_NO_UNLOCK.bits()) as u32,
    ),
    ("unlock", ActionFlags::LOCK_NO_LOCK.bits() as u32),
];

const ISO_AFFECT_NAMES: &LookupTable = &[
    ("mods", 1 << 0),
    ("modifiers", 1 << 0),
    ("group", 1 << 1),
    ("groups", 1 << 1),
    ("ptr", 1 << 2),
    ("pointer", 1 << 2),
    ("ctrls", 1 << 3),
    ("controls", 1 << 3),
    ("all", 0xf),
    ("none", 0),
];

const PTR_DFLT_NAMES: &LookupTable = &[
    ("dfltbtn", 1),
    ("defaultbutton", 1),
    ("button", 1),
];

const MESSAGE_EVENT_NAMES: &LookupTable = &[
    ("press", ActionFlags::MESSAGE_ON_PRESS.bits() as u32),
    ("keypress", ActionFlags::MESSAGE_ON_PRESS.bits() as u32),
    ("release", ActionFlags::MESSAGE_ON_RELEASE.bits() as u32),
    ("keyrelease", ActionFlags::MESSAGE_ON_RELEASE.bits() as u32),
    (
        "all",
        (ActionFlags::MESSAGE_ON_PRESS.bits() | ActionFlags::MESSAGE_ON_RELEASE.bits()) as u32,
    ),
    ("none", 0),
];

fn set_action_field(
    ctx: &mut Context,
    keymap: &Keymap,
    action: &mut Action,
    field: Field,
    array_ndx: Option<&Expr>,
    value: &Expr,
) -> bool {
    // Only the message data field is an array.
    if array_ndx.is_some() && field != Field::Data {
        ctx.diag.error(format!(
            "The {field:?} field in the {} action is not an array",
            action.type_name()
        ));
        return false;
    }

    match action {
        Action::None => report_illegal(ctx, &Action::None, field),

        Action::SetMods(act) | Action::LatchMods(act) => match field {
            Field::ClearLocks => {
                let mut flags = act.flags;
                let ok = check_flag(
                    ctx,
                    &Action::SetMods(*act),
                    field,
                    value,
                    &mut flags,
                    ActionFlags::CLEAR_LOCKS,
                );
                act.flags = flags;
                ok
            }
            Field::LatchToLock => {
                let mut flags = act.flags;
                let ok = check_flag(
                    ctx,
                    &Action::SetMods(*act),
                    field,
                    value,
                    &mut flags,
                    ActionFlags::LATCH_TO_LOCK,
                );
                act.flags = flags;
                ok
            }
            Field::Modifiers => {
                let mut flags = act.flags;
                match check_modifier_field(ctx, keymap, value, &mut flags) {
                    Some(mods) => {
                        act.flags = flags;
                        act.mods = mods;
                        true
                    }
                    None => false,
                }
            }
            _ => report_illegal(ctx, &Action::SetMods(*act), field),
        },

        Action::LockMods(act) => match field {
            Field::Modifiers => {
                let mut flags = act.flags;
                match check_modifier_field(ctx, keymap, value, &mut flags) {
                    Some(mods) => {
                        act.flags = flags;
                        act.mods = mods;
                        true
                    }
                    None => false,
                }
            }
            Field::Affect => match expr::resolve_enum(ctx, value, LOCK_WHICH) {
                Some(which) => {
                    act.flags
                        .remove(ActionFlags::LOCK_NO_LOCK | ActionFlags::LOCK_NO_UNLOCK);
                    act.flags |= ActionFlags::from_bits_truncate(which as u16);
                    true
                }
                None => report_mismatch(ctx, &Action::LockMods(*act), field, "lock or unlock"),
            },
            _ => report_illegal(ctx, &Action::LockMods(*act), field),
        },

        Action::SetGroup(act) | Action::LatchGroup(act) => match field {
            Field::ClearLocks => {
                let mut flags = act.flags;
                let ok = check_flag(
                    ctx,
                    &Action::SetGroup(*act),
                    field,
                    value,
                    &mut flags,
                    ActionFlags::CLEAR_LOCKS,
                );
                act.flags = flags;
                ok
            }
            Field::LatchToLock => {
                let mut flags = act.flags;
                let ok = check_flag(
                    ctx,
                    &Action::SetGroup(*act),
                    field,
                    value,
                    &mut flags,
                    ActionFlags::LATCH_TO_LOCK,
                );
                act.flags = flags;
                ok
            }
            Field::Group => {
                let mut flags = act.flags;
                match check_group_field(ctx, value, &mut flags) {
                    Some(group) => {
                        act.flags = flags;
                        act.group = group;
                        true
                    }
                    None => false,
                }
            }
            _ => report_illegal(ctx, &Action::SetGroup(*act), field),
        },

        Action::LockGroup(act) => match field {
            Field::Group => {
                let mut flags = act.flags;
                match check_group_field(ctx, value, &mut flags) {
                    Some(group) => {
                        act.flags = flags;
                        act.group = group;
                        true
                    }
                    None => false,
                }
            }
            _ => report_illegal(ctx, &Action::LockGroup(*act), field),
        },

        Action::MovePointer(act) => match field {
            Field::X | Field::Y => {
                let absolute = !matches!(value, Expr::Unary(UnOp::Negate | UnOp::UnaryPlus, _));
                let Some(v) = expr::resolve_integer(ctx, value) else {
                    return report_mismatch(ctx, &Action::MovePointer(*act), field, "integer");
                };
                if field == Field::X {
                    if absolute {
                        act.flags.insert(ActionFlags::ABSOLUTE_X);
                    }
                    act.x = v as i16;
                } else {
                    if absolute {
                        act.flags.insert(ActionFlags::ABSOLUTE_Y);
                    }
                    act.y = v as i16;
                }
                true
            }
            Field::Accel => {
                let mut flags = act.flags;
                // accel=no sets NO_ACCELERATION
                let ok = match expr::resolve_boolean(ctx, value) {
                    Some(true) => {
                        flags.remove(ActionFlags::NO_ACCELERATION);
                        true
                    }
                    Some(false) => {
                        flags.insert(ActionFlags::NO_ACCELERATION);
                        true
                    }
                    None => report_mismatch(ctx, &Action::MovePointer(*act), field, "boolean"),
                };
                act.flags = flags;
                ok
            }
            _ => report_illegal(ctx, &Action::MovePointer(*act), field),
        },

        Action::PointerButton(act) | Action::LockPointerButton(act) => match field {
            Field::Button => match expr::resolve_button(ctx, value) {
                Some(v) if (0..=5).contains(&v) => {
                    act.button = v as u8;
                    true
                }
                Some(v) => {
                    ctx.diag
                        .error(format!("Button must specify default or be in the range 1..5; illegal button value {v} ignored"));
                    false
                }
                None => report_mismatch(
                    ctx,
                    &Action::PointerButton(*act),
                    field,
                    "integer (range 1..5)",
                ),
            },
            Field::Affect => match expr::resolve_enum(ctx, value, LOCK_WHICH) {
                Some(which) => {
                    act.flags
                        .remove(ActionFlags::LOCK_NO_LOCK | ActionFlags::LOCK_NO_UNLOCK);
                    act.flags |= ActionFlags::from_bits_truncate(which as u16);
                    true
                }
                None => false,
            },
            Field::Count => match expr::resolve_integer(ctx, value) {
                Some(v) if (0..=255).contains(&v) => {
                    act.count = v as u8;
                    true
                }
                _ => {
                    ctx.diag
                        .error("The count field must have a value in the range 0..255".to_string());
                    false
                }
            },
            _ => report_illegal(ctx, &Action::PointerButton(*act), field),
        },

        Action::SetPointerDefault(act) => match field {
            Field::Affect => match expr::resolve_enum(ctx, value, PTR_DFLT_NAMES) {
                Some(_) => true,
                None => report_mismatch(
                    ctx,
                    &Action::SetPointerDefault(*act),
                    field,
                    "pointer component",
                ),
            },
            Field::Button | Field::Value => {
                let (absolute, inner) = match value {
                    Expr::Unary(UnOp::Negate, inner) => (false, &**inner),
                    Expr::Unary(UnOp::UnaryPlus, inner) => (false, &**inner),
                    other => (true, other),
                };
                if absolute {
                    act.flags.insert(ActionFlags::DFLT_BTN_ABSOLUTE);
                } else {
                    act.flags.remove(ActionFlags::DFLT_BTN_ABSOLUTE);
                }
                match expr::resolve_button(ctx, inner) {
                    Some(v) if (1..=5).contains(&v) => {
                        act.value = if matches!(value, Expr::Unary(UnOp::Negate, _)) {
                            -(v as i8)
                        } else {
                            v as i8
                        };
                        true
                    }
                    Some(0) => {
                        ctx.diag
                            .error("Cannot set default pointer button to \"default\"".to_string());
                        false
                    }
                    _ => {
                        ctx.diag
                            .error("New default button value must be in the range 1..5".to_string());
                        false
                    }
                }
            }
            _ => report_illegal(ctx, &Action::SetPointerDefault(*act), field),
        },

        Action::IsoLock(act) => match field {
            Field::Modifiers => {
                let mut flags = act.flags;
                match check_modifier_field(ctx, keymap, value, &mut flags) {
                    Some(mods) => {
                        flags.remove(ActionFlags::ISO_DFLT_IS_GROUP);
                        act.flags = flags;
                        act.mods = mods;
                        true
                    }
                    None => false,
                }
            }
            Field::Group => {
                let mut flags = act.flags;
                match check_group_field(ctx, value, &mut flags) {
                    Some(group) => {
                        flags.insert(ActionFlags::ISO_DFLT_IS_GROUP);
                        act.flags = flags;
                        act.group = group;
                        true
                    }
                    None => false,
                }
            }
            Field::Affect => match expr::resolve_mask(ctx, value, ISO_AFFECT_NAMES) {
                Some(v) => {
                    act.affect = (!v & 0xf) as u8;
                    true
                }
                None => report_mismatch(ctx, &Action::IsoLock(*act), field, "keyboard component"),
            },
            _ => report_illegal(ctx, &Action::IsoLock(*act), field),
        },

        Action::Terminate => report_illegal(ctx, &Action::Terminate, field),

        Action::SwitchScreen(act) => match field {
            Field::Screen => {
                let (absolute, inner) = match value {
                    Expr::Unary(UnOp::Negate, inner) => (false, &**inner),
                    Expr::Unary(UnOp::UnaryPlus, inner) => (false, &**inner),
                    other => (true, other),
                };
                if absolute {
                    act.flags.insert(ActionFlags::SWITCH_ABSOLUTE);
                } else {
                    act.flags.remove(ActionFlags::SWITCH_ABSOLUTE);
                }
                match expr::resolve_integer(ctx, inner) {
                    Some(v) if (0..=255).contains(&v) => {
                        act.screen = if matches!(value, Expr::Unary(UnOp::Negate, _)) {
                            -(v as i8)
                        } else {
                            v as i8
                        };
                        true
                    }
                    _ => {
                        ctx.diag
                            .error("Screen index must be in the range 1..255".to_string());
                        false
                    }
                }
            }
            Field::Same => {
                let mut flags = act.flags;
                let ok = match expr::resolve_boolean(ctx, value) {
                    Some(true) => {
                        flags.remove(ActionFlags::SWITCH_APPLICATION);
                        true
                    }
                    Some(false) => {
                        flags.insert(ActionFlags::SWITCH_APPLICATION);
                        true
                    }
                    None => report_mismatch(ctx, &Action::SwitchScreen(*act), field, "boolean"),
                };
                act.flags = flags;
                ok
            }
            _ => report_illegal(ctx, &Action::SwitchScreen(*act), field),
        },

        Action::SetControls(act) | Action::LockControls(act) => match field {
            Field::Controls => match expr::resolve_mask(ctx, value, CONTROL_NAMES) {
                Some(v) => {
                    act.ctrls = v;
                    true
                }
                None => report_mismatch(ctx, &Action::SetControls(*act), field, "controls mask"),
            },
            _ => report_illegal(ctx, &Action::SetControls(*act), field),
        },

        Action::Message(act) => match field {
            Field::Report => match expr::resolve_mask(ctx, value, MESSAGE_EVENT_NAMES) {
                Some(v) => {
                    act.flags
                        .remove(ActionFlags::MESSAGE_ON_PRESS | ActionFlags::MESSAGE_ON_RELEASE);
                    act.flags |= ActionFlags::from_bits_truncate(v as u16);
                    true
                }
                None => report_mismatch(ctx, &Action::Message(*act), field, "key event mask"),
            },
            Field::GenKeyEvent => {
                let mut flags = act.flags;
                let ok = check_flag(
                    ctx,
                    &Action::Message(*act),
                    field,
                    value,
                    &mut flags,
                    ActionFlags::MESSAGE_GEN_KEY_EVENT,
                );
                act.flags = flags;
                ok
            }
            Field::Data => match array_ndx {
                None => match expr::resolve_string(ctx, value) {
                    Some(s) => {
                        let bytes = s.as_bytes();
                        if bytes.len() > 6 {
                            ctx.diag
                                .warn("An action message can hold only 6 bytes".to_string());
                            ctx.diag
                                .action(format!("Extra {} bytes ignored", bytes.len() - 6));
                        }
                        for (slot, b) in act.message.iter_mut().zip(bytes.iter()) {
                            *slot = *b;
                        }
                        true
                    }
                    None => report_mismatch(ctx, &Action::Message(*act), field, "string"),
                },
                Some(ndx) => {
                    let Some(ndx) = expr::resolve_integer(ctx, ndx) else {
                        ctx.diag
                            .error("Array subscript must be integer".to_string());
                        return false;
                    };
                    if !(0..=5).contains(&ndx) {
                        ctx.diag
                            .error("An action message is at most 6 bytes long".to_string());
                        return false;
                    }
                    match expr::resolve_integer(ctx, value) {
                        Some(v) if (0..=255).contains(&v) => {
                            act.message[ndx as usize] = v as u8;
                            true
                        }
                        _ => {
                            ctx.diag
                                .error("Message data must be in the range 0..255".to_string());
                            false
                        }
                    }
                }
            },
            _ => report_illegal(ctx, &Action::Message(*act), field),
        },

        Action::RedirectKey(act) => match field {
            Field::Keycode => match expr::resolve_key_name(ctx, value) {
                Some(name) => {
                    act.new_key = KeyName::new(&name);
                    true
                }
                None => report_mismatch(ctx, &Action::RedirectKey(*act), field, "key name"),
            },
            Field::Modifiers | Field::ModsToClear => {
                let mut flags = ActionFlags::empty();
                match check_modifier_field(ctx, keymap, value, &mut flags) {
                    Some(mods) => {
                        act.mods_mask.real |= mods.real;
                        act.mods_mask.mask = act.mods_mask.real;
                        act.mods_mask.vmods |= mods.vmods;
                        if field == Field::Modifiers {
                            act.mods.real |= mods.real;
                            act.mods.vmods |= mods.vmods;
                        } else {
                            act.mods.real &= !mods.real;
                            act.mods.vmods &= !mods.vmods;
                        }
                        act.mods.mask = act.mods.real;
                        true
                    }
                    None => true,
                }
            }
            _ => report_illegal(ctx, &Action::RedirectKey(*act), field),
        },

        Action::DeviceButton(act) | Action::LockDeviceButton(act) => match field {
            Field::Button => match expr::resolve_integer(ctx, value) {
                Some(v) if (0..=255).contains(&v) => {
                    act.button = v as u8;
                    true
                }
                _ => {
                    ctx.diag
                        .error("Button must be in the range 0..255".to_string());
                    false
                }
            },
            Field::Device => match expr::resolve_integer(ctx, value) {
                Some(v) if v >= 0 => {
                    act.device = v as u16;
                    true
                }
                _ => {
                    ctx.diag.error("Device must be non-negative".to_string());
                    false
                }
            },
            Field::Count => match expr::resolve_integer(ctx, value) {
                Some(v) if (0..=255).contains(&v) => {
                    act.count = v as u8;
                    true
                }
                _ => {
                    ctx.diag
                        .error("The count field must have a value in the range 0..255".to_string());
                    false
                }
            },
            Field::Affect => match expr::resolve_enum(ctx, value, LOCK_WHICH) {
                Some(which) => {
                    act.flags
                        .remove(ActionFlags::LOCK_NO_LOCK | ActionFlags::LOCK_NO_UNLOCK);
                    act.flags |= ActionFlags::from_bits_truncate(which as u16);
                    true
                }
                None => false,
            },
            _ => report_illegal(ctx, &Action::DeviceButton(*act), field),
        },

        Action::DeviceValuator(act) => {
            // Parsed for tolerance only.
            let _ = act;
            true
        }

        Action::Private(act) => match field {
            Field::Type => match expr::resolve_integer(ctx, value) {
                Some(v) if (0..=255).contains(&v) => {
                    act.action_type = v as u8;
                    true
                }
                _ => {
                    ctx.diag
                        .error("Private action type must be in the range 0..255".to_string());
                    false
                }
            },
            Field::Data => match expr::resolve_string(ctx, value) {
                Some(s) => {
                    for (slot, b) in act.data.iter_mut().zip(s.as_bytes().iter()) {
                        *slot = *b;
                    }
                    true
                }
                None => report_mismatch(ctx, &Action::Private(*act), field, "string"),
            },
            _ => report_illegal(ctx, &Action::Private(*act), field),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::parser::Parser;
    use crate::keymap::ModMask;

    fn action_expr(text: &str) -> Expr {
        let mut parser = Parser::new(text, "test").unwrap();
        parser.parse_expr().unwrap()
    }

    fn compile(text: &str) -> Option<Action> {
        let mut ctx = Context::new();
        let keymap = Keymap::new(crate::atom::Atoms::new());
        handle_action_def(&mut ctx, &keymap, &action_expr(text), &ActionDefaults::default())
    }

    #[test]
    fn set_mods() {
        let action = compile("SetMods(modifiers=Shift+Control, clearLocks)").unwrap();
        let Action::SetMods(act) = action else {
            panic!("wrong family");
        };
        assert_eq!(act.mods.real, ModMask::SHIFT | ModMask::CONTROL);
        assert!(act.flags.contains(ActionFlags::CLEAR_LOCKS));
    }

    #[test]
    fn latch_mods_with_flags() {
        let action = compile("LatchMods(modifiers=Shift, latchToLock, !clearLocks)").unwrap();
        let Action::LatchMods(act) = action else {
            panic!("wrong family");
        };
        assert!(act.flags.contains(ActionFlags::LATCH_TO_LOCK));
        assert!(!act.flags.contains(ActionFlags::CLEAR_LOCKS));
    }

    #[test]
    fn use_modmap_mods() {
        let action = compile("LockMods(modifiers=modMapMods)").unwrap();
        let Action::LockMods(act) = action else {
            panic!("wrong family");
        };
        assert!(act.flags.contains(ActionFlags::USE_MODMAP_MODS));
    }

    #[test]
    fn group_relative_and_absolute() {
        let Action::SetGroup(act) = compile("SetGroup(group=2)").unwrap() else {
            panic!();
        };
        assert!(act.flags.contains(ActionFlags::GROUP_ABSOLUTE));
        assert_eq!(act.group, 1);

        let Action::SetGroup(act) = compile("SetGroup(group=+1)").unwrap() else {
            panic!();
        };
        assert!(!act.flags.contains(ActionFlags::GROUP_ABSOLUTE));
        assert_eq!(act.group, 1);

        let Action::LockGroup(act) = compile("LockGroup(group=-1)").unwrap() else {
            panic!();
        };
        assert_eq!(act.group, -1);
    }

    #[test]
    fn controls_mask() {
        let Action::LockControls(act) = compile("LockControls(controls=SlowKeys+StickyKeys)")
            .unwrap()
        else {
            panic!();
        };
        assert_eq!(act.ctrls, (1 << 1) | (1 << 3));
    }

    #[test]
    fn unknown_action_fails() {
        assert!(compile("FlyToTheMoon(x=1)").is_none());
    }

    #[test]
    fn illegal_field_fails() {
        assert!(compile("SetMods(screen=1)").is_none());
    }

    #[test]
    fn defaults_seed_new_actions() {
        let mut ctx = Context::new();
        let keymap = Keymap::new(crate::atom::Atoms::new());
        let mut defaults = ActionDefaults::default();
        let value = Expr::Value(Value::Bool(true));
        assert!(defaults.set_field(&mut ctx, "setMods", "clearLocks", None, &value));
        let action = handle_action_def(
            &mut ctx,
            &keymap,
            &action_expr("SetMods(modifiers=Shift)"),
            &defaults,
        )
        .unwrap();
        let Action::SetMods(act) = action else {
            panic!();
        };
        assert!(act.flags.contains(ActionFlags::CLEAR_LOCKS));
    }
}
