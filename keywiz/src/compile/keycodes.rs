//! The keycodes section compiler.
//!
//! Ingests `<NAME> = code;`, `alias <A> = <B>;`, `minimum`/`maximum`
//! bounds and `indicator N = "Name";` statements, resolves collisions
//! per merge mode, and installs the keycode range, key names, aliases
//! and indicator names into the keymap.

use super::alias::{self, AliasInfo};
use super::ast::{FileType, IndicatorNameDef, KeycodeDef, MergeMode, Stmt, VarDef, XkbFile};
use super::expr;
use super::include::{handle_include, IncludeTarget};
use crate::atom::Atom;
use crate::context::Context;
use crate::keymap::{KeyName, Keymap, MAX_LEGAL_KEYCODE, MIN_LEGAL_KEYCODE, NUM_INDICATORS};

#[derive(Debug, Clone)]
struct IndicatorNameInfo {
    ndx: i32,
    name: Atom,
    virt: bool,
    file_id: u32,
    merge: MergeMode,
}

pub(crate) struct KeycodesInfo {
    name: Option<String>,
    errors: usize,
    file_id: u32,
    computed_min: u32,
    computed_max: u32,
    explicit_min: u32,
    explicit_max: u32,
    names: Vec<KeyName>,
    files: Vec<u32>,
    has_alt_forms: Vec<bool>,
    leds: Vec<IndicatorNameInfo>,
    aliases: Vec<AliasInfo>,
}

impl KeycodesInfo {
    pub fn new(file_id: u32) -> Self {
        Self {
            name: None,
            errors: 0,
            file_id,
            computed_min: u32::MAX,
            computed_max: 0,
            explicit_min: 0,
            explicit_max: 0,
            names: Vec::new(),
            files: Vec::new(),
            has_alt_forms: Vec::new(),
            leds: Vec::new(),
            aliases: Vec::new(),
        }
    }

    fn ensure_size(&mut self, kc: u32) {
        let len = kc as usize + 1;
        if self.names.len() < len {
            self.names.resize(len, KeyName::default());
            self.files.resize(len, 0);
            self.has_alt_forms.resize(len, false);
        }
    }

    fn find_key_by_name(&self, name: KeyName) -> Option<u32> {
        if self.computed_min > self.computed_max {
            return None;
        }
        (self.computed_min..=self.computed_max).find(|&kc| self.names[kc as usize] == name)
    }

    /// Store `name` at `kc`, resolving both kinds of collision: two
    /// names for one code, and one name on two codes.
    fn add_key_name(
        &mut self,
        ctx: &mut Context,
        kc: u32,
        name: KeyName,
        merge: MergeMode,
        file_id: u32,
        report_collisions: bool,
    ) -> bool {
        self.ensure_size(kc);
        if kc < self.computed_min {
            self.computed_min = kc;
        }
        if kc > self.computed_max {
            self.computed_max = kc;
        }

        let report = report_collisions
            && (ctx.diag.warning_level() > 7
                || (ctx.diag.warning_level() > 0 && file_id == self.files[kc as usize]));

        let old_name = self.names[kc as usize];
        if !old_name.is_empty() {
            if old_name == name {
                if self.has_alt_forms[kc as usize] || merge == MergeMode::AltForm {
                    self.has_alt_forms[kc as usize] = true;
                } else if report {
                    ctx.diag
                        .warn("Multiple identical key name definitions".to_string());
                    ctx.diag.action(format!(
                        "Later occurences of \"{name} = {kc}\" ignored"
                    ));
                }
                return true;
            }
            if merge == MergeMode::Augment {
                if report {
                    ctx.diag.warn(format!("Multiple names for keycode {kc}"));
                    ctx.diag
                        .action(format!("Using {old_name}, ignoring {name}"));
                }
                return true;
            }
            if report {
                ctx.diag.warn(format!("Multiple names for keycode {kc}"));
                ctx.diag
                    .action(format!("Using {name}, ignoring {old_name}"));
            }
            self.names[kc as usize] = KeyName::default();
            self.files[kc as usize] = 0;
        }

        if let Some(old_kc) = self.find_key_by_name(name) {
            if old_kc != kc {
                match merge {
                    MergeMode::Override => {
                        self.names[old_kc as usize] = KeyName::default();
                        self.files[old_kc as usize] = 0;
                        self.has_alt_forms[old_kc as usize] = true;
                        if report {
                            ctx.diag
                                .warn(format!("Key name {name} assigned to multiple keys"));
                            ctx.diag.action(format!("Using {kc}, ignoring {old_kc}"));
                        }
                    }
                    MergeMode::AltForm => {
                        self.has_alt_forms[old_kc as usize] = true;
                    }
                    _ => {
                        if report && ctx.diag.warning_level() > 3 {
                            ctx.diag
                                .warn(format!("Key name {name} assigned to multiple keys"));
                            ctx.diag.action(format!("Using {old_kc}, ignoring {kc}"));
                            ctx.diag.action(
                                "Use 'alternate' keyword to assign the same name to multiple keys"
                                    .to_string(),
                            );
                        }
                        return true;
                    }
                }
            }
        }

        self.names[kc as usize] = name;
        self.files[kc as usize] = file_id;
        self.has_alt_forms[kc as usize] = merge == MergeMode::AltForm;
        true
    }

    fn add_indicator_name(&mut self, ctx: &mut Context, new: IndicatorNameInfo) -> bool {
        let replace = matches!(new.merge, MergeMode::Replace | MergeMode::Override);

        if let Some(pos) = self.leds.iter().position(|old| old.name == new.name) {
            let report = (self.leds[pos].file_id == new.file_id && ctx.diag.warning_level() > 0)
                || ctx.diag.warning_level() > 9;
            let old_ndx = self.leds[pos].ndx;
            if report {
                ctx.diag.warn(format!(
                    "Multiple indicators named {}",
                    ctx.atom_text(new.name)
                ));
                if old_ndx == new.ndx {
                    ctx.diag.action("Identical definitions ignored".to_string());
                } else if replace {
                    ctx.diag
                        .action(format!("Ignoring {old_ndx}, using {}", new.ndx));
                } else {
                    ctx.diag
                        .action(format!("Using {old_ndx}, ignoring {}", new.ndx));
                }
            }
            if old_ndx == new.ndx {
                if replace {
                    self.leds[pos].virt = new.virt;
                }
                return true;
            }
            if replace {
                self.leds.remove(pos);
            } else {
                return true;
            }
        }

        if let Some(old) = self.leds.iter_mut().find(|old| old.ndx == new.ndx) {
            let report = (old.file_id == new.file_id && ctx.diag.warning_level() > 0)
                || ctx.diag.warning_level() > 9;
            if report {
                ctx.diag
                    .warn(format!("Multiple names for indicator {}", new.ndx));
                if old.name == new.name && old.virt == new.virt {
                    ctx.diag.action("Identical definitions ignored".to_string());
                }
            }
            if replace {
                old.name = new.name;
                old.virt = new.virt;
            }
            return true;
        }

        self.leds.push(new);
        true
    }

    fn handle_keycode_def(&mut self, ctx: &mut Context, stmt: &KeycodeDef, merge: MergeMode) -> bool {
        let kc = stmt.value;
        let min = if self.explicit_min != 0 {
            self.explicit_min
        } else {
            MIN_LEGAL_KEYCODE
        };
        let max = if self.explicit_max != 0 {
            self.explicit_max
        } else {
            MAX_LEGAL_KEYCODE
        };
        if kc < min || kc > max {
            ctx.diag
                .error(format!("Illegal keycode {kc} for name <{}>", stmt.name));
            ctx.diag
                .action(format!("Must be in the range {min}-{max} inclusive"));
            return false;
        }
        let merge = match stmt.merge {
            MergeMode::Default => merge,
            MergeMode::Replace => MergeMode::Override,
            other => other,
        };
        self.add_key_name(
            ctx,
            kc,
            KeyName::new(&stmt.name),
            merge,
            self.file_id,
            true,
        )
    }

    fn handle_key_name_var(&mut self, ctx: &mut Context, stmt: &VarDef) -> bool {
        let Some(name) = &stmt.name else {
            return false;
        };
        let Some((element, field, array_ndx)) = name.as_lhs() else {
            ctx.diag
                .error(format!("Unexpected {} on the left of an assignment", name.op_name()));
            return false;
        };
        if let Some(element) = element {
            ctx.diag
                .error(format!("Unknown element {element} encountered"));
            ctx.diag
                .action(format!("Default for field {field} ignored"));
            return false;
        }
        let is_min = field.eq_ignore_ascii_case("minimum");
        let is_max = field.eq_ignore_ascii_case("maximum");
        if !is_min && !is_max {
            ctx.diag.error("Unknown field encountered".to_string());
            ctx.diag
                .action(format!("Assignment to field {field} ignored"));
            return false;
        }
        if array_ndx.is_some() {
            ctx.diag.error(format!("The {field} setting is not an array"));
            ctx.diag
                .action("Illegal array reference ignored".to_string());
            return false;
        }
        let Some(value) = &stmt.value else {
            return false;
        };
        let Some(kc) = expr::resolve_keycode(ctx, value) else {
            ctx.diag
                .action(format!("Assignment to field {field} ignored"));
            return false;
        };
        if kc < MIN_LEGAL_KEYCODE || kc > MAX_LEGAL_KEYCODE {
            ctx.diag.error(format!(
                "Illegal keycode {kc} (must be in the range {MIN_LEGAL_KEYCODE}-{MAX_LEGAL_KEYCODE} inclusive)"
            ));
            ctx.diag
                .action(format!("Value of \"{field}\" not changed"));
            return false;
        }
        let has_keys = self.computed_min <= self.computed_max;
        if is_min {
            if self.explicit_max > 0 && self.explicit_max < kc {
                ctx.diag.error(format!(
                    "Minimum key code ({kc}) must be <= maximum key code ({})",
                    self.explicit_max
                ));
                ctx.diag
                    .action("Minimum key code value not changed".to_string());
                return false;
            }
            if has_keys && self.computed_min < kc {
                ctx.diag.error(format!(
                    "Minimum key code ({kc}) must be <= lowest defined key ({})",
                    self.computed_min
                ));
                ctx.diag
                    .action("Minimum key code value not changed".to_string());
                return false;
            }
            self.explicit_min = kc;
        } else {
            if self.explicit_min > 0 && self.explicit_min > kc {
                ctx.diag.error(format!(
                    "Maximum code ({kc}) must be >= minimum key code ({})",
                    self.explicit_min
                ));
                ctx.diag
                    .action("Maximum code value not changed".to_string());
                return false;
            }
            if has_keys && self.computed_max > kc {
                ctx.diag.error(format!(
                    "Maximum code ({kc}) must be >= highest defined key ({})",
                    self.computed_max
                ));
                ctx.diag
                    .action("Maximum code value not changed".to_string());
                return false;
            }
            self.explicit_max = kc;
        }
        true
    }

    fn handle_indicator_name_def(
        &mut self,
        ctx: &mut Context,
        def: &IndicatorNameDef,
        merge: MergeMode,
    ) -> bool {
        if def.ndx < 1 || def.ndx > NUM_INDICATORS as i32 {
            self.errors += 1;
            ctx.diag.error(format!(
                "Name specified for illegal indicator index {}",
                def.ndx
            ));
            ctx.diag.action("Ignored".to_string());
            return false;
        }
        let Some(text) = expr::resolve_string(ctx, &def.name) else {
            self.errors += 1;
            ctx.diag.error(format!(
                "The name field of indicator {} must be a string",
                def.ndx
            ));
            return false;
        };
        let name = ctx.intern(&text);
        let info = IndicatorNameInfo {
            ndx: def.ndx,
            name,
            virt: def.virt,
            file_id: self.file_id,
            merge: def.merge.or(merge),
        };
        self.add_indicator_name(ctx, info)
    }
}

impl IncludeTarget for KeycodesInfo {
    const FILE_TYPE: FileType = FileType::KeyNames;

    fn fresh(&self, _ctx: &mut Context, _keymap: &mut Keymap, file_id: u32) -> Self {
        KeycodesInfo::new(file_id)
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
        self.name = Some(file.name.clone());
        for stmt in &file.defs {
            let ok = match stmt {
                Stmt::Include(inc) => handle_include(ctx, keymap, self, inc),
                Stmt::Keycode(def) => self.handle_keycode_def(ctx, def, merge),
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
                Stmt::Var(def) => self.handle_key_name_var(ctx, def),
                Stmt::IndicatorName(def) => self.handle_indicator_name_def(ctx, def, merge),
                other => {
                    ctx.diag
                        .error("Keycode files may define key and indicator names only".to_string());
                    ctx.diag
                        .action(format!("Ignoring definition of {}", other.kind()));
                    false
                }
            };
            if !ok {
                self.errors += 1;
            }
            if self.errors > 10 {
                ctx.diag
                    .action(format!("Abandoning keycodes file \"{}\"", file.top_name));
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
        if from.computed_min <= from.computed_max {
            for kc in from.computed_min..=from.computed_max {
                let name = from.names[kc as usize];
                if name.is_empty() {
                    continue;
                }
                let this_merge = if from.has_alt_forms[kc as usize] {
                    MergeMode::AltForm
                } else {
                    merge
                };
                if !self.add_key_name(ctx, kc, name, this_merge, from.file_id, false) {
                    self.errors += 1;
                }
            }
        }
        for mut led in from.leds {
            if merge != MergeMode::Default {
                led.merge = merge;
            }
            if !self.add_indicator_name(ctx, led) {
                self.errors += 1;
            }
        }
        alias::merge_aliases(ctx, &mut self.aliases, from.aliases, merge);
        if from.explicit_min != 0
            && (self.explicit_min == 0 || self.explicit_min > from.explicit_min)
        {
            self.explicit_min = from.explicit_min;
        }
        if from.explicit_max > 0
            && (self.explicit_max == 0 || self.explicit_max < from.explicit_max)
        {
            self.explicit_max = from.explicit_max;
        }
    }
}

/// Compile an `xkb_keycodes` section into the keymap.
pub(crate) fn compile_keycodes(
    ctx: &mut Context,
    keymap: &mut Keymap,
    file: &XkbFile,
    merge: MergeMode,
) -> bool {
    let mut info = KeycodesInfo::new(file.id);
    info.handle_file(ctx, keymap, file, merge);

    if info.errors != 0 {
        return false;
    }

    keymap.min_key_code = if info.explicit_min > 0 {
        info.explicit_min
    } else if info.computed_min <= info.computed_max {
        info.computed_min
    } else {
        MIN_LEGAL_KEYCODE
    };
    keymap.max_key_code = if info.explicit_max > 0 {
        info.explicit_max
    } else if info.computed_min <= info.computed_max {
        info.computed_max
    } else {
        MIN_LEGAL_KEYCODE
    };
    keymap.resize_key_tables();

    if info.computed_min <= info.computed_max {
        // An include may carry codes outside an explicitly declared
        // range; those names are dropped with the range.
        let max = info.computed_max.min(keymap.max_key_code);
        for kc in info.computed_min..=max {
            keymap.key_names[kc as usize] = info.names[kc as usize];
        }
    }

    for led in &info.leds {
        let slot = (led.ndx - 1) as usize;
        keymap.indicator_names[slot] = led.name;
        let bit = 1u32 << slot;
        if led.virt {
            keymap.phys_indicators &= !bit;
        } else {
            keymap.phys_indicators |= bit;
        }
    }

    alias::apply_aliases(ctx, keymap, info.aliases);
    keymap.names.keycodes = info.name;
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::parser::Parser;

    fn compile(source: &str) -> (Context, Keymap, bool) {
        let mut ctx = Context::new();
        let files = Parser::new(source, "test")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap();
        let mut keymap = Keymap::new(ctx.atoms.clone());
        let ok = compile_keycodes(&mut ctx, &mut keymap, &files[0], MergeMode::Override);
        keymap.atoms = ctx.atoms.clone();
        (ctx, keymap, ok)
    }

    #[test]
    fn assigns_names_and_range() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_keycodes "test" {
                minimum = 8;
                maximum = 120;
                <ESC> = 9;
                <AE01> = 10;
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.min_key_code(), 8);
        assert_eq!(keymap.max_key_code(), 120);
        assert_eq!(keymap.key_name(9), Some(KeyName::new("ESC")));
        assert_eq!(keymap.find_named_key(KeyName::new("AE01"), false, 0), Some(10));
        assert_eq!(keymap.key_name(11), None);
    }

    #[test]
    fn derives_range_when_not_declared() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_keycodes "test" {
                <AA> = 20;
                <AB> = 30;
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.min_key_code(), 20);
        assert_eq!(keymap.max_key_code(), 30);
    }

    #[test]
    fn rejects_out_of_range_keycode() {
        let (ctx, _keymap, _ok) = compile(
            r#"xkb_keycodes "test" {
                minimum = 8;
                maximum = 255;
                <BAD> = 300;
            };"#,
        );
        assert!(ctx.error_count() > 0);
    }

    #[test]
    fn alias_resolution() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_keycodes "test" {
                <LALT> = 64;
                alias <ALT> = <LALT>;
                alias <GONE> = <NOPE>;
            };"#,
        );
        assert!(ok);
        assert_eq!(
            keymap.find_named_key(KeyName::new("ALT"), true, 0),
            Some(64)
        );
        // alias to a missing key is dropped
        assert_eq!(keymap.resolve_alias(KeyName::new("GONE")), None);
    }

    #[test]
    fn indicator_names() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_keycodes "test" {
                <AA> = 10;
                indicator 1 = "Caps Lock";
                virtual indicator 4 = "Compose";
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.led_index_for_name("Caps Lock"), Some(0));
        assert_eq!(keymap.led_index_for_name("Compose"), Some(3));
        assert_eq!(keymap.phys_indicators & (1 << 3), 0);
        assert_ne!(keymap.phys_indicators & (1 << 0), 0);
    }

    #[test]
    fn collision_same_code_override_wins() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_keycodes "test" {
                <AA> = 10;
                override <BB> = 10;
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.key_name(10), Some(KeyName::new("BB")));
    }

    #[test]
    fn collision_same_code_augment_keeps_first() {
        let (_ctx, keymap, ok) = compile(
            r#"xkb_keycodes "test" {
                <AA> = 10;
                augment <BB> = 10;
            };"#,
        );
        assert!(ok);
        assert_eq!(keymap.key_name(10), Some(KeyName::new("AA")));
    }
}
