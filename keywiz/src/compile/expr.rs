//! Typed expression resolvers.
//!
//! Each resolver coerces an expression tree to one target type and
//! reports a diagnostic (returning `None`) when the operator or value
//! type cannot be coerced.  The coercion matrix is deliberately narrow:
//! masks take `+` as union and `-` as set difference and reject `*` and
//! `/`; strings support `+` concatenation only; key names take no
//! operators at all.

use super::ast::{BinOp, Expr, UnOp, Value};
use crate::context::Context;
use crate::keymap::{Keymap, ModMask, NUM_GROUPS, NUM_VMODS};
use crate::keysym::{self, Keysym};

/// `(name, value)` lookup table for enumerated identifiers.
pub type LookupTable = [(&'static str, u32)];

pub fn lookup(table: &LookupTable, name: &str) -> Option<u32> {
    table
        .iter()
        .find(|(entry, _)| entry.eq_ignore_ascii_case(name))
        .map(|&(_, value)| value)
}

pub const MOD_MASK_NAMES: &LookupTable = &[
    ("shift", 0x01),
    ("lock", 0x02),
    ("control", 0x04),
    ("mod1", 0x08),
    ("mod2", 0x10),
    ("mod3", 0x20),
    ("mod4", 0x40),
    ("mod5", 0x80),
    ("none", 0x00),
    ("all", 0xff),
];

pub const GROUP_NAMES: &LookupTable = &[
    ("group1", 1),
    ("group2", 2),
    ("group3", 3),
    ("group4", 4),
    ("group5", 5),
    ("group6", 6),
    ("group7", 7),
    ("group8", 8),
];

pub const LEVEL_NAMES: &LookupTable = &[
    ("level1", 1),
    ("level2", 2),
    ("level3", 3),
    ("level4", 4),
    ("level5", 5),
    ("level6", 6),
    ("level7", 7),
    ("level8", 8),
];

pub const BUTTON_NAMES: &LookupTable = &[
    ("button1", 1),
    ("button2", 2),
    ("button3", 3),
    ("button4", 4),
    ("button5", 5),
    ("default", 0),
];

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Bool(_) => "boolean",
        Value::String(_) => "string",
        Value::KeyName(_) => "keyname",
    }
}

pub fn resolve_boolean(ctx: &mut Context, expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Value(Value::Bool(b)) => Some(*b),
        Expr::Value(other) => {
            ctx.diag.error(format!(
                "Found constant of type {} where boolean was expected",
                value_type_name(other)
            ));
            None
        }
        Expr::Ident(name) => {
            if ["true", "yes", "on"].iter().any(|s| name.eq_ignore_ascii_case(s)) {
                Some(true)
            } else if ["false", "no", "off"].iter().any(|s| name.eq_ignore_ascii_case(s)) {
                Some(false)
            } else {
                ctx.diag
                    .error(format!("Identifier \"{name}\" of type boolean is unknown"));
                None
            }
        }
        Expr::Unary(UnOp::Not | UnOp::Invert, inner) => resolve_boolean(ctx, inner).map(|b| !b),
        other => {
            ctx.diag.error(format!(
                "{} of boolean values not permitted",
                capitalized(other.op_name())
            ));
            None
        }
    }
}

fn resolve_integer_lookup(
    ctx: &mut Context,
    expr: &Expr,
    table: Option<&LookupTable>,
) -> Option<i32> {
    match expr {
        Expr::Value(Value::Int(v)) => Some(*v),
        Expr::Value(Value::String(s)) => match s.chars().count() {
            0 => Some(0),
            1 => Some(s.chars().next().map(|c| c as i32).unwrap_or(0)),
            _ => {
                ctx.diag
                    .error("Found constant of type string where an int was expected".to_string());
                None
            }
        },
        Expr::Value(other) => {
            ctx.diag.error(format!(
                "Found constant of type {} where an int was expected",
                value_type_name(other)
            ));
            None
        }
        Expr::Ident(name) => match table.and_then(|t| lookup(t, name)) {
            Some(v) => Some(v as i32),
            None => {
                ctx.diag
                    .error(format!("Identifier \"{name}\" of type int is unknown"));
                None
            }
        },
        Expr::FieldRef { element, field } => {
            ctx.diag
                .error(format!("Default \"{element}.{field}\" of type int is unknown"));
            None
        }
        Expr::Binary(op @ (BinOp::Add | BinOp::Subtract | BinOp::Multiply | BinOp::Divide), l, r) => {
            let left = resolve_integer_lookup(ctx, l, table)?;
            let right = resolve_integer_lookup(ctx, r, table)?;
            match op {
                BinOp::Add => Some(left.wrapping_add(right)),
                BinOp::Subtract => Some(left.wrapping_sub(right)),
                BinOp::Multiply => Some(left.wrapping_mul(right)),
                BinOp::Divide => {
                    if right == 0 {
                        ctx.diag.error("Division by zero".to_string());
                        None
                    } else {
                        Some(left / right)
                    }
                }
                BinOp::Assign => unreachable!(),
            }
        }
        Expr::Unary(UnOp::Negate, inner) => resolve_integer_lookup(ctx, inner, table).map(|v| -v),
        Expr::Unary(UnOp::Invert, inner) => resolve_integer_lookup(ctx, inner, table).map(|v| !v),
        Expr::Unary(UnOp::UnaryPlus, inner) => resolve_integer_lookup(ctx, inner, table),
        Expr::Unary(UnOp::Not, _) => {
            ctx.diag
                .error("The ! operator cannot be applied to an integer".to_string());
            None
        }
        other => {
            ctx.diag.error(format!(
                "Unexpected {} where an int was expected",
                other.op_name()
            ));
            None
        }
    }
}

pub fn resolve_integer(ctx: &mut Context, expr: &Expr) -> Option<i32> {
    resolve_integer_lookup(ctx, expr, None)
}

/// Floats are stored ×10 (one decimal of millimetre precision).
pub fn resolve_float(ctx: &mut Context, expr: &Expr) -> Option<i32> {
    match expr {
        Expr::Value(Value::Float(v)) => Some(*v),
        Expr::Value(Value::Int(v)) => Some(v * 10),
        Expr::Value(Value::String(s)) if s.chars().count() == 1 => {
            Some(s.chars().next().map(|c| c as i32 * 10).unwrap_or(0))
        }
        Expr::Value(other) => {
            ctx.diag.error(format!(
                "Found constant of type {}, expected a number",
                value_type_name(other)
            ));
            None
        }
        Expr::Binary(op @ (BinOp::Add | BinOp::Subtract | BinOp::Multiply | BinOp::Divide), l, r) => {
            let left = resolve_float(ctx, l)?;
            let right = resolve_float(ctx, r)?;
            match op {
                BinOp::Add => Some(left + right),
                BinOp::Subtract => Some(left - right),
                BinOp::Multiply => Some(left * right),
                BinOp::Divide => {
                    if right == 0 {
                        ctx.diag.error("Division by zero".to_string());
                        None
                    } else {
                        Some(left / right)
                    }
                }
                BinOp::Assign => unreachable!(),
            }
        }
        Expr::Unary(UnOp::Negate, inner) => resolve_float(ctx, inner).map(|v| -v),
        Expr::Unary(UnOp::Invert, inner) => resolve_float(ctx, inner).map(|v| !v),
        Expr::Unary(UnOp::UnaryPlus, inner) => resolve_float(ctx, inner),
        Expr::Unary(UnOp::Not, _) => {
            ctx.diag
                .error("The ! operator cannot be applied to a number".to_string());
            None
        }
        other => {
            ctx.diag.error(format!(
                "Unexpected {} where a number was expected",
                other.op_name()
            ));
            None
        }
    }
}

pub fn resolve_keycode(ctx: &mut Context, expr: &Expr) -> Option<u32> {
    let v = resolve_integer(ctx, expr)?;
    if v < 0 {
        ctx.diag.error(format!("Illegal negative keycode {v}"));
        return None;
    }
    Some(v as u32)
}

pub fn resolve_string(ctx: &mut Context, expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(Value::String(s)) => Some(s.clone()),
        Expr::Value(other) => {
            ctx.diag.error(format!(
                "Found constant of type {}, expected a string",
                value_type_name(other)
            ));
            None
        }
        Expr::Ident(name) => {
            ctx.diag
                .error(format!("Identifier \"{name}\" of type string not found"));
            None
        }
        Expr::FieldRef { element, field } => {
            ctx.diag.error(format!(
                "Default \"{element}.{field}\" of type string not found"
            ));
            None
        }
        Expr::Binary(BinOp::Add, l, r) => {
            let mut left = resolve_string(ctx, l)?;
            let right = resolve_string(ctx, r)?;
            left.push_str(&right);
            Some(left)
        }
        other => {
            ctx.diag.error(format!(
                "{} of string values not permitted",
                capitalized(other.op_name())
            ));
            None
        }
    }
}

pub fn resolve_key_name(ctx: &mut Context, expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(Value::KeyName(s)) => Some(s.clone()),
        Expr::Value(other) => {
            ctx.diag.error(format!(
                "Found constant of type {}, expected a key name",
                value_type_name(other)
            ));
            None
        }
        other => {
            ctx.diag.error(format!(
                "{} of key name values not permitted",
                capitalized(other.op_name())
            ));
            None
        }
    }
}

/// Resolve a group index, 1-based, in range `1..=4`.
pub fn resolve_group(ctx: &mut Context, expr: &Expr) -> Option<u8> {
    let v = resolve_integer_lookup(ctx, expr, Some(GROUP_NAMES))?;
    if v < 1 || v > NUM_GROUPS as i32 {
        ctx.diag.error(format!(
            "Group index {v} is out of range (1..{})",
            NUM_GROUPS
        ));
        return None;
    }
    Some(v as u8)
}

/// Resolve a shift level, 1-based, in range `1..=8`.
pub fn resolve_level(ctx: &mut Context, expr: &Expr) -> Option<u16> {
    let v = resolve_integer_lookup(ctx, expr, Some(LEVEL_NAMES))?;
    if v < 1 || v > i32::from(crate::keymap::MAX_LEVELS) {
        ctx.diag.error(format!(
            "Shift level {v} is out of range (1..{})",
            crate::keymap::MAX_LEVELS
        ));
        return None;
    }
    Some(v as u16)
}

pub fn resolve_button(ctx: &mut Context, expr: &Expr) -> Option<i32> {
    resolve_integer_lookup(ctx, expr, Some(BUTTON_NAMES))
}

/// Resolve to an enumerated value; only a bare identifier is accepted.
pub fn resolve_enum(ctx: &mut Context, expr: &Expr, table: &LookupTable) -> Option<u32> {
    let Expr::Ident(name) = expr else {
        ctx.diag.error(format!(
            "Found a {} where an enumerated value was expected",
            expr.op_name()
        ));
        return None;
    };
    match lookup(table, name) {
        Some(v) => Some(v),
        None => {
            let expected: Vec<&str> = table.iter().map(|&(n, _)| n).collect();
            ctx.diag.error(format!(
                "Illegal identifier {name} (expected one of: {})",
                expected.join(", ")
            ));
            None
        }
    }
}

fn resolve_mask_with<F>(ctx: &mut Context, expr: &Expr, lookup_ident: &F) -> Option<u32>
where
    F: Fn(&mut Context, &str) -> Option<u32>,
{
    match expr {
        Expr::Value(Value::Int(v)) => Some(*v as u32),
        Expr::Value(other) => {
            ctx.diag.error(format!(
                "Found constant of type {} where a mask was expected",
                value_type_name(other)
            ));
            None
        }
        Expr::Ident(name) => match lookup_ident(ctx, name) {
            Some(v) => Some(v),
            None => {
                ctx.diag
                    .error(format!("Identifier \"{name}\" of type int is unknown"));
                None
            }
        },
        Expr::FieldRef { element, field } => {
            ctx.diag
                .error(format!("Default \"{element}.{field}\" of type int is unknown"));
            None
        }
        Expr::ArrayRef { .. } | Expr::Action { .. } => {
            ctx.diag.error(format!(
                "Unexpected {} in mask expression",
                expr.op_name()
            ));
            ctx.diag.action("Expression ignored".to_string());
            None
        }
        Expr::Binary(BinOp::Add, l, r) => {
            Some(resolve_mask_with(ctx, l, lookup_ident)? | resolve_mask_with(ctx, r, lookup_ident)?)
        }
        Expr::Binary(BinOp::Subtract, l, r) => {
            Some(resolve_mask_with(ctx, l, lookup_ident)? & !resolve_mask_with(ctx, r, lookup_ident)?)
        }
        Expr::Binary(BinOp::Multiply | BinOp::Divide, ..) => {
            ctx.diag.error(format!(
                "Cannot {} masks",
                if matches!(expr, Expr::Binary(BinOp::Divide, ..)) {
                    "divide"
                } else {
                    "multiply"
                }
            ));
            ctx.diag.action("Illegal operation ignored".to_string());
            None
        }
        Expr::Unary(UnOp::Invert, inner) => {
            resolve_mask_with(ctx, inner, lookup_ident).map(|v| !v)
        }
        Expr::Unary(op, _) => {
            ctx.diag.error(format!(
                "The {} operator cannot be used with a mask",
                match op {
                    UnOp::Negate => "-",
                    UnOp::Not => "!",
                    UnOp::UnaryPlus => "+",
                    UnOp::Invert => "~",
                }
            ));
            None
        }
        other => {
            ctx.diag.error(format!(
                "Unexpected {} where a mask was expected",
                other.op_name()
            ));
            None
        }
    }
}

pub fn resolve_mask(ctx: &mut Context, expr: &Expr, table: &LookupTable) -> Option<u32> {
    resolve_mask_with(ctx, expr, &|_, name| lookup(table, name))
}

/// Resolve a real-modifier mask.
pub fn resolve_mod_mask(ctx: &mut Context, expr: &Expr) -> Option<ModMask> {
    resolve_mask(ctx, expr, MOD_MASK_NAMES).map(|v| ModMask::from_bits_truncate(v as u8))
}

/// Resolve a mask that may name both real and virtual modifiers.  The
/// result packs real bits low and virtual bits from bit 8 up.
pub fn resolve_vmod_mask(ctx: &mut Context, keymap: &Keymap, expr: &Expr) -> Option<u32> {
    // Snapshot vmod names up front to keep the closure borrow-free.
    let mut vmod_names: Vec<(String, u32)> = Vec::new();
    for (i, &atom) in keymap.vmod_names.iter().enumerate() {
        if !atom.is_none() {
            vmod_names.push((keymap.atoms.text(atom).to_string(), 1u32 << (8 + i)));
        }
    }
    resolve_mask_with(ctx, expr, &move |_ctx: &mut Context, name: &str| {
        if let Some(v) = lookup(MOD_MASK_NAMES, name) {
            return Some(v);
        }
        vmod_names
            .iter()
            .find(|(vname, _)| vname == name)
            .map(|&(_, bit)| bit)
    })
}

/// Split a combined mask into `(real, virtual)` parts.
pub fn split_vmod_mask(mask: u32) -> (ModMask, u16) {
    (
        ModMask::from_bits_truncate((mask & 0xff) as u8),
        ((mask >> 8) & 0xffff) as u16,
    )
}

/// Resolve the index (not mask) of a real or virtual modifier; used by
/// `interpret.virtualModifier` and friends.  Virtual indices are offset
/// past the reals.
pub fn resolve_vmod_index(ctx: &mut Context, keymap: &Keymap, expr: &Expr) -> Option<u8> {
    if let Expr::Ident(name) = expr {
        if let Some(idx) = keymap.vmod_index_for_name(name) {
            return Some(idx);
        }
    }
    let v = resolve_integer(ctx, expr)?;
    if (0..NUM_VMODS as i32).contains(&v) {
        Some(v as u8)
    } else {
        ctx.diag.error(format!(
            "Illegal virtual modifier {v} (must be 0..{} inclusive)",
            NUM_VMODS - 1
        ));
        None
    }
}

pub fn resolve_keysym(ctx: &mut Context, expr: &Expr) -> Option<Keysym> {
    if let Expr::Ident(name) = expr {
        let sym = keysym::string_to_keysym(name);
        if sym != keysym::NO_SYMBOL {
            return Some(sym);
        }
    }
    let v = resolve_integer(ctx, expr)?;
    if (0..10).contains(&v) {
        Some(v as u32 + u32::from(b'0'))
    } else {
        Some(v as u32)
    }
}

fn capitalized(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::parser::Parser;

    fn expr(text: &str) -> Expr {
        let mut parser = Parser::new(text, "test").unwrap();
        parser.parse_expr().unwrap()
    }

    fn keymap() -> Keymap {
        let mut ctx = Context::new();
        let mut keymap = Keymap::new(ctx.atoms.clone());
        keymap.vmod_names[0] = ctx.intern("NumLock");
        keymap.vmod_names[1] = ctx.intern("AltGr");
        keymap.atoms = ctx.atoms.clone();
        keymap
    }

    #[test]
    fn booleans() {
        let mut ctx = Context::new();
        assert_eq!(resolve_boolean(&mut ctx, &expr("true")), Some(true));
        assert_eq!(resolve_boolean(&mut ctx, &expr("Off")), Some(false));
        assert_eq!(resolve_boolean(&mut ctx, &expr("!yes")), Some(false));
        assert_eq!(resolve_boolean(&mut ctx, &expr("5")), None);
    }

    #[test]
    fn integers() {
        let mut ctx = Context::new();
        assert_eq!(resolve_integer(&mut ctx, &expr("2 + 3 * 4")), Some(14));
        assert_eq!(resolve_integer(&mut ctx, &expr("-(6 / 2)")), Some(-3));
        assert_eq!(resolve_integer(&mut ctx, &expr("'a'")), Some(0x61));
        assert_eq!(resolve_integer(&mut ctx, &expr("\"xy\"")), None);
    }

    #[test]
    fn floats_are_times_ten() {
        let mut ctx = Context::new();
        assert_eq!(resolve_float(&mut ctx, &expr("1.5")), Some(15));
        assert_eq!(resolve_float(&mut ctx, &expr("2")), Some(20));
        assert_eq!(resolve_float(&mut ctx, &expr("1.5 + 2")), Some(35));
    }

    #[test]
    fn strings() {
        let mut ctx = Context::new();
        assert_eq!(
            resolve_string(&mut ctx, &expr("\"foo\" + \"bar\"")),
            Some("foobar".to_string())
        );
        assert_eq!(resolve_string(&mut ctx, &expr("\"a\" - \"b\"")), None);
    }

    #[test]
    fn mod_masks() {
        let mut ctx = Context::new();
        assert_eq!(
            resolve_mod_mask(&mut ctx, &expr("Shift + Control")),
            Some(ModMask::SHIFT | ModMask::CONTROL)
        );
        assert_eq!(
            resolve_mod_mask(&mut ctx, &expr("all - Lock")),
            Some(ModMask::all() & !ModMask::LOCK)
        );
        assert_eq!(resolve_mod_mask(&mut ctx, &expr("none")), Some(ModMask::empty()));
        // multiply and divide are rejected for masks
        assert_eq!(resolve_mod_mask(&mut ctx, &expr("Shift * Lock")), None);
        assert_eq!(resolve_mod_mask(&mut ctx, &expr("Shift / Lock")), None);
    }

    #[test]
    fn vmod_masks() {
        let mut ctx = Context::new();
        let keymap = keymap();
        assert_eq!(
            resolve_vmod_mask(&mut ctx, &keymap, &expr("Shift + NumLock")),
            Some(0x01 | (1 << 8))
        );
        assert_eq!(
            resolve_vmod_mask(&mut ctx, &keymap, &expr("AltGr")),
            Some(1 << 9)
        );
        assert_eq!(resolve_vmod_mask(&mut ctx, &keymap, &expr("Slash")), None);
        let (real, vmods) = split_vmod_mask(0x01 | (1 << 8));
        assert_eq!(real, ModMask::SHIFT);
        assert_eq!(vmods, 1);
    }

    #[test]
    fn groups_and_levels() {
        let mut ctx = Context::new();
        assert_eq!(resolve_group(&mut ctx, &expr("Group2")), Some(2));
        assert_eq!(resolve_group(&mut ctx, &expr("7")), None);
        assert_eq!(resolve_level(&mut ctx, &expr("Level8")), Some(8));
        assert_eq!(resolve_level(&mut ctx, &expr("0")), None);
    }

    #[test]
    fn keysyms() {
        let mut ctx = Context::new();
        assert_eq!(resolve_keysym(&mut ctx, &expr("Return")), Some(0xff0d));
        assert_eq!(resolve_keysym(&mut ctx, &expr("9")), Some(0x39));
        assert_eq!(resolve_keysym(&mut ctx, &expr("0x1008ff13")), Some(0x1008_ff13));
    }
}
