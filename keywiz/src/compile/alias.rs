//! Key alias accumulation, shared by the keycodes and geometry
//! compilers (symbols files may also carry alias statements).

use super::ast::MergeMode;
use crate::context::Context;
use crate::keymap::{KeyAlias, KeyName, Keymap};

#[derive(Debug, Clone)]
pub struct AliasInfo {
    pub alias: KeyName,
    pub real: KeyName,
    pub file_id: u32,
    pub merge: MergeMode,
}

/// Record one alias definition, resolving collisions against earlier
/// definitions of the same alias name.
pub fn handle_alias_def(
    ctx: &mut Context,
    aliases: &mut Vec<AliasInfo>,
    merge: MergeMode,
    file_id: u32,
    alias: KeyName,
    real: KeyName,
) {
    for old in aliases.iter_mut() {
        if old.alias == alias {
            let new = AliasInfo {
                alias,
                real,
                file_id,
                merge,
            };
            handle_collision(ctx, old, &new);
            return;
        }
    }
    aliases.push(AliasInfo {
        alias,
        real,
        file_id,
        merge,
    });
}

fn handle_collision(ctx: &mut Context, old: &mut AliasInfo, new: &AliasInfo) {
    let report =
        (old.file_id == new.file_id && ctx.diag.warning_level() > 0) || ctx.diag.warning_level() > 9;
    if old.real == new.real {
        if report {
            ctx.diag.warn(format!(
                "Alias of {} for {} declared more than once",
                new.alias, new.real
            ));
            ctx.diag.action("First definition ignored".to_string());
        }
    } else {
        let (use_name, ignore_name) = if new.merge == MergeMode::Augment {
            (old.real, new.real)
        } else {
            (new.real, old.real)
        };
        if report {
            ctx.diag
                .warn(format!("Multiple definitions for alias {}", old.alias));
            ctx.diag
                .action(format!("Using {use_name}, ignoring {ignore_name}"));
        }
        old.real = use_name;
    }
    old.file_id = new.file_id;
    old.merge = new.merge;
}

/// Merge an included file's aliases into the includer's.
pub fn merge_aliases(
    ctx: &mut Context,
    into: &mut Vec<AliasInfo>,
    from: Vec<AliasInfo>,
    merge: MergeMode,
) {
    if into.is_empty() {
        *into = from;
        for alias in into.iter_mut() {
            if merge != MergeMode::Default {
                alias.merge = merge;
            }
        }
        return;
    }
    for alias in from {
        let this_merge = merge.or(alias.merge);
        handle_alias_def(ctx, into, this_merge, alias.file_id, alias.alias, alias.real);
    }
}

/// Resolve accumulated aliases against the keymap's key names and store
/// the survivors.  Aliases to missing keys and aliases shadowing a real
/// key name are dropped.
pub fn apply_aliases(ctx: &mut Context, keymap: &mut Keymap, aliases: Vec<AliasInfo>) {
    for info in aliases {
        if keymap.find_named_key(info.real, false, 0).is_none() {
            ctx.diag.warn_lvl(
                4,
                format!(
                    "Attempt to alias {} to non-existent key {}",
                    info.alias, info.real
                ),
            );
            continue;
        }
        if keymap.find_named_key(info.alias, false, 0).is_some() {
            ctx.diag.warn_lvl(
                4,
                format!(
                    "Attempt to create alias with the name of a real key; alias \"{} = {}\" ignored",
                    info.alias, info.real
                ),
            );
            continue;
        }
        if let Some(existing) = keymap.aliases.iter_mut().find(|a| a.alias == info.alias) {
            if existing.real != info.real && info.merge.clobbers() {
                existing.real = info.real;
            }
            continue;
        }
        keymap.aliases.push(KeyAlias {
            alias: info.alias,
            real: info.real,
        });
    }
}
