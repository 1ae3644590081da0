//! Keysym name handling.
//!
//! A keysym is a 32-bit symbolic code denoting a character or function
//! (`a`, `Return`, `XF86AudioRaiseVolume`).  This module converts between
//! the symbolic names and the codes: a built-in name table covers the
//! common set, `U<hex>` names the Unicode plane directly, and `0x<hex>`
//! spells any raw value.  Lookups are case-sensitive.

use crate::keysym_data::KEYSYM_NAMES;
use std::collections::HashMap;

/// 32-bit symbolic key code.
pub type Keysym = u32;

/// The absent keysym.
pub const NO_SYMBOL: Keysym = 0;

/// The explicit "no effect" keysym.
pub const VOID_SYMBOL: Keysym = 0x00ff_ffff;

const UNICODE_OFFSET: Keysym = 0x0100_0000;

lazy_static::lazy_static! {
    static ref NAME_TO_KEYSYM: HashMap<&'static str, Keysym> =
        KEYSYM_NAMES.iter().map(|&(name, code)| (name, code)).collect();

    // First occurrence wins so legacy aliases format to the canonical name.
    static ref KEYSYM_TO_NAME: HashMap<Keysym, &'static str> = {
        let mut map = HashMap::new();
        for &(name, code) in KEYSYM_NAMES {
            map.entry(code).or_insert(name);
        }
        map
    };
}

/// Convert a keysym name to its code.  Accepts table names, `U<hex>`
/// Unicode forms, raw `0x<hex>` values, and retries `XF86_`-prefixed
/// names without the underscore.  Unknown names map to [`NO_SYMBOL`].
pub fn string_to_keysym(s: &str) -> Keysym {
    if let Some(&ks) = NAME_TO_KEYSYM.get(s) {
        return ks;
    }

    if let Some(hex) = s.strip_prefix('U') {
        let Ok(val) = u32::from_str_radix(hex, 16) else {
            return NO_SYMBOL;
        };
        // Control ranges have no direct Unicode keysym.
        if val < 0x20 || (val > 0x7e && val < 0xa0) {
            return NO_SYMBOL;
        }
        if val < 0x100 {
            return val;
        }
        if val > 0x10_ffff {
            return NO_SYMBOL;
        }
        return val | UNICODE_OFFSET;
    }

    if let Some(hex) = s.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).unwrap_or(NO_SYMBOL);
    }

    // The headers and the legacy keysym database disagree on whether some
    // XF86 names carry a separating underscore.  Last-ditch retry without.
    if let Some(rest) = s.strip_prefix("XF86_") {
        return string_to_keysym(&format!("XF86{rest}"));
    }

    NO_SYMBOL
}

/// Format a keysym as text.  Known codes emit their canonical name,
/// Unicode-plane codes emit `U<hex>`, everything else emits `0x%08x`.
pub fn keysym_to_string(ks: Keysym) -> String {
    if ks == NO_SYMBOL {
        return "NoSymbol".to_string();
    }
    if let Some(&name) = KEYSYM_TO_NAME.get(&ks) {
        return name.to_string();
    }
    if (0x0100_0100..=0x0110_ffff).contains(&ks) {
        return format!("U{:x}", ks & 0x00ff_ffff);
    }
    format!("0x{ks:08x}")
}

/// Resolve a keysym name appearing in a symbols list, where a couple of
/// special spellings are accepted: `any`/`NoSymbol` mean the absent
/// keysym and `none`/`VoidSymbol` mean the void one.
pub fn lookup_keysym(s: &str) -> Option<Keysym> {
    if s.eq_ignore_ascii_case("any") || s.eq_ignore_ascii_case("nosymbol") {
        return Some(NO_SYMBOL);
    }
    if s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("voidsymbol") {
        return Some(VOID_SYMBOL);
    }
    match string_to_keysym(s) {
        NO_SYMBOL => None,
        ks => Some(ks),
    }
}

/// The character a keysym denotes, if it denotes one.
pub fn keysym_to_char(ks: Keysym) -> Option<char> {
    if (0x20..=0x7e).contains(&ks) || (0xa0..=0xff).contains(&ks) {
        return char::from_u32(ks);
    }
    if (UNICODE_OFFSET..=UNICODE_OFFSET + 0x10_ffff).contains(&ks) {
        return char::from_u32(ks - UNICODE_OFFSET);
    }
    None
}

/// The keysym for a character.
pub fn char_to_keysym(c: char) -> Keysym {
    let cp = c as u32;
    if (0x20..=0x7e).contains(&cp) || (0xa0..=0xff).contains(&cp) {
        cp
    } else {
        cp | UNICODE_OFFSET
    }
}

pub(crate) fn keysym_is_lower(ks: Keysym) -> bool {
    match keysym_to_char(ks) {
        Some(c) => c.is_lowercase(),
        None => false,
    }
}

pub(crate) fn keysym_is_upper(ks: Keysym) -> bool {
    match keysym_to_char(ks) {
        Some(c) => c.is_uppercase(),
        None => false,
    }
}

pub(crate) fn keysym_is_keypad(ks: Keysym) -> bool {
    (0xff80..=0xffbd).contains(&ks)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_lookups() {
        assert_eq!(string_to_keysym("a"), 0x61);
        assert_eq!(string_to_keysym("A"), 0x41);
        assert_eq!(string_to_keysym("Return"), 0xff0d);
        assert_eq!(string_to_keysym("XF86AudioRaiseVolume"), 0x1008_ff13);
        // case sensitive
        assert_eq!(string_to_keysym("return"), NO_SYMBOL);
    }

    #[test]
    fn xf86_underscore_retry() {
        assert_eq!(string_to_keysym("XF86_AudioMute"), 0x1008_ff12);
    }

    #[test]
    fn unicode_forms() {
        assert_eq!(string_to_keysym("U20ac"), 0x0100_20ac);
        assert_eq!(string_to_keysym("U41"), 0x41);
        // control ranges rejected
        assert_eq!(string_to_keysym("U1b"), NO_SYMBOL);
        assert_eq!(string_to_keysym("U80"), NO_SYMBOL);
        assert_eq!(string_to_keysym("U110000"), NO_SYMBOL);
        // trailing garbage rejected
        assert_eq!(string_to_keysym("U20acx"), NO_SYMBOL);
    }

    #[test]
    fn hex_forms() {
        assert_eq!(string_to_keysym("0x1008ff13"), 0x1008_ff13);
        assert_eq!(keysym_to_string(0xabcd_1234), "0xabcd1234");
    }

    #[test]
    fn formatting() {
        assert_eq!(keysym_to_string(NO_SYMBOL), "NoSymbol");
        assert_eq!(keysym_to_string(0x61), "a");
        assert_eq!(keysym_to_string(0xff55), "Prior");
        assert_eq!(keysym_to_string(0x0100_20ac), "U20ac");
    }

    #[test]
    fn round_trip_table() {
        for &(_, code) in crate::keysym_data::KEYSYM_NAMES {
            assert_eq!(string_to_keysym(&keysym_to_string(code)), code);
        }
        assert_eq!(string_to_keysym(&keysym_to_string(NO_SYMBOL)), NO_SYMBOL);
    }

    #[test]
    fn round_trip_unicode() {
        for cp in (0x20u32..=0x7e).chain(0xa0..=0x2fff).chain([0x1_0000, 0x10_ffff]) {
            let Some(c) = char::from_u32(cp) else { continue };
            let ks = char_to_keysym(c);
            assert_eq!(string_to_keysym(&keysym_to_string(ks)), ks, "cp {cp:#x}");
        }
    }

    #[test]
    fn char_mapping() {
        assert_eq!(keysym_to_char(0x61), Some('a'));
        assert_eq!(keysym_to_char(0x0100_20ac), Some('€'));
        assert_eq!(keysym_to_char(0xff0d), None);
        assert_eq!(char_to_keysym('é'), 0xe9);
    }

    #[test]
    fn case_classes() {
        assert!(keysym_is_lower(0x61));
        assert!(keysym_is_upper(0x41));
        assert!(!keysym_is_lower(0xff0d));
        assert!(keysym_is_keypad(0xffb0));
        assert!(!keysym_is_keypad(0x61));
    }
}
