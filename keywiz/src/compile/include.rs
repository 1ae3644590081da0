//! Include resolution.
//!
//! Include statements name a `file(map)` pair; the file is located by
//! appending the section kind's conventional subdirectory to each root
//! on the search path, the named map is selected from it (or the
//! flagged-default / only map when no name is given), and the resulting
//! unit is merged into the including section under the statement's merge
//! mode.
//!
//! The five section compilers walk include chains identically; the walk
//! lives here once, generic over the per-section accumulator.

use super::ast::{FileType, IncludeFragment, IncludeStmt, MergeMode, XkbFile};
use super::parser::Parser;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::keymap::Keymap;
use std::path::PathBuf;

/// Locate `name` for a section kind somewhere on the search path.
pub fn find_file_in_path(ctx: &Context, name: &str, file_type: FileType) -> Option<PathBuf> {
    if name.contains("..") {
        return None;
    }
    for root in ctx.include_paths() {
        let path = root.join(file_type.subdirectory()).join(name);
        if path.is_file() {
            return Some(path);
        }
    }
    None
}

/// Open, parse, and select the requested map from an included file.
pub fn process_include_file(
    ctx: &mut Context,
    frag: &IncludeFragment,
    file_type: FileType,
) -> Result<XkbFile> {
    let Some(path) = find_file_in_path(ctx, &frag.file, file_type) else {
        ctx.diag.error(format!(
            "Can't find file \"{}\" for {} include",
            frag.file,
            file_type.subdirectory()
        ));
        return Err(Error::IncludeNotFound {
            kind: file_type.subdirectory(),
            name: frag.file.clone(),
        });
    };

    let source = std::fs::read_to_string(&path)?;
    let saved = ctx.set_current_file(Some(frag.file.clone()));
    let parsed = Parser::new(&source, &frag.file).and_then(|mut p| p.parse_files(ctx));
    ctx.set_current_file(saved);
    let files = match parsed {
        Ok(files) => files,
        Err(err) => {
            ctx.diag.error(format!(
                "Error interpreting include file \"{}\": {err}",
                frag.file
            ));
            return Err(err);
        }
    };

    let map = choose_map(ctx, files, frag.map.as_deref(), &frag.file)?;
    if map.file_type != file_type {
        ctx.diag.error(format!(
            "Include file wrong type (expected {}, got {})",
            file_type.name(),
            map.file_type.name()
        ));
        ctx.diag
            .action(format!("Include file \"{}\" ignored", frag.file));
        return Err(Error::WrongFileType {
            expected: file_type.name(),
            found: map.file_type.name(),
        });
    }
    Ok(map)
}

/// Pick a map out of a parsed file: by name if one was given, otherwise
/// the flagged default, otherwise the first (with a warning when the
/// file holds several).
pub fn choose_map(
    ctx: &mut Context,
    mut files: Vec<XkbFile>,
    map: Option<&str>,
    file_name: &str,
) -> Result<XkbFile> {
    use super::ast::FileFlags;

    if let Some(map) = map {
        match files.iter().position(|f| f.name == map) {
            Some(idx) => Ok(files.swap_remove(idx)),
            None => {
                ctx.diag.error(format!(
                    "No map named \"{map}\" in the include file \"{file_name}\""
                ));
                Err(Error::NoSuchMap(map.to_string()))
            }
        }
    } else {
        if files.len() > 1 {
            if let Some(idx) = files
                .iter()
                .position(|f| f.flags.contains(FileFlags::DEFAULT_MAP))
            {
                return Ok(files.swap_remove(idx));
            }
            ctx.diag.warn(format!(
                "No map in include statement, but \"{file_name}\" contains several"
            ));
            ctx.diag.action(format!(
                "Using first defined map, \"{}\"",
                files[0].name
            ));
        }
        Ok(files.remove(0))
    }
}

/// A per-section accumulator that can participate in include chains.
pub(crate) trait IncludeTarget: Sized {
    const FILE_TYPE: FileType;

    /// A fresh accumulator seeded with this one's defaults.
    fn fresh(&self, ctx: &mut Context, keymap: &mut Keymap, file_id: u32) -> Self;
    fn errors(&self) -> usize;
    fn bump_errors(&mut self, n: usize);
    fn set_name(&mut self, name: String);
    /// Symbols only: a `:N` suffix binds the unit to group N (1-based).
    fn set_explicit_group(&mut self, _ctx: &mut Context, _group: u8) {}
    fn handle_file(&mut self, ctx: &mut Context, keymap: &mut Keymap, file: &XkbFile, merge: MergeMode);
    fn merge_from(&mut self, ctx: &mut Context, keymap: &mut Keymap, from: Self, merge: MergeMode);
}

/// Walk one include statement's chain, accumulating each fragment's
/// compiled unit and finally merging the result into `info`.
///
/// A fragment with empty file and map targets the current section's own
/// accumulated state: it is folded into the chain at its position and
/// the section continues from the merged result.
pub(crate) fn handle_include<T: IncludeTarget>(
    ctx: &mut Context,
    keymap: &mut Keymap,
    info: &mut T,
    stmt: &IncludeStmt,
) -> bool {
    let mut have_self = false;
    let mut included: Option<T> = None;
    let mut first_merge = MergeMode::Default;

    for frag in &stmt.chain {
        if frag.is_self_reference() {
            have_self = true;
            let fresh = info.fresh(ctx, keymap, 0);
            let taken = std::mem::replace(info, fresh);
            match included.as_mut() {
                None => {
                    first_merge = frag.merge;
                    included = Some(taken);
                }
                Some(inc) => inc.merge_from(ctx, keymap, taken, frag.merge),
            }
        } else {
            let file = match process_include_file(ctx, frag, T::FILE_TYPE) {
                Ok(file) => file,
                Err(_) => {
                    info.bump_errors(10);
                    return false;
                }
            };
            let mut next = info.fresh(ctx, keymap, file.id);
            if let Some(group) = frag.group {
                next.set_explicit_group(ctx, group);
            }
            let saved = ctx.set_current_file(Some(fragment_name(frag)));
            next.handle_file(ctx, keymap, &file, MergeMode::Override);
            ctx.set_current_file(saved);
            match included.as_mut() {
                None => {
                    first_merge = frag.merge;
                    included = Some(next);
                }
                Some(inc) => inc.merge_from(ctx, keymap, next, frag.merge),
            }
        }
    }

    let Some(mut included) = included else {
        return false;
    };
    included.set_name(stmt.stmt.clone());

    if have_self {
        *info = included;
    } else {
        info.merge_from(ctx, keymap, included, first_merge);
    }
    info.errors() == 0
}

fn fragment_name(frag: &IncludeFragment) -> String {
    match &frag.map {
        Some(map) => format!("{}({})", frag.file, map),
        None => frag.file.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn search_path_appends_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let symbols = dir.path().join("symbols");
        std::fs::create_dir(&symbols).unwrap();
        let mut f = std::fs::File::create(symbols.join("us")).unwrap();
        writeln!(f, "xkb_symbols \"basic\" {{ }};").unwrap();

        let mut ctx = Context::new();
        ctx.append_include_path(dir.path());
        assert!(find_file_in_path(&ctx, "us", FileType::Symbols).is_some());
        assert!(find_file_in_path(&ctx, "us", FileType::Types).is_none());
        assert!(find_file_in_path(&ctx, "../symbols/us", FileType::Symbols).is_none());
    }

    #[test]
    fn chooses_default_map() {
        let mut ctx = Context::new();
        let source = r#"
            xkb_symbols "one" { };
            default xkb_symbols "two" { };
        "#;
        let files = Parser::new(source, "us")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap();
        let chosen = choose_map(&mut ctx, files, None, "us").unwrap();
        assert_eq!(chosen.name, "two");
    }

    #[test]
    fn chooses_named_map() {
        let mut ctx = Context::new();
        let source = r#"
            xkb_symbols "one" { };
            xkb_symbols "two" { };
        "#;
        let files = Parser::new(source, "us")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap();
        let chosen = choose_map(&mut ctx, files, Some("one"), "us").unwrap();
        assert_eq!(chosen.name, "one");

        let files = Parser::new(source, "us")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap();
        assert!(choose_map(&mut ctx, files, Some("three"), "us").is_err());
    }
}
