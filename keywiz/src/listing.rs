//! Component listing: walk the search path and enumerate the
//! `file(map)` pairs matching a set of per-section glob patterns.

use crate::compile::ast::FileType;
use crate::compile::parser::Parser;
use crate::context::Context;
use crate::error::Result;
use crate::keymap::ComponentNames;

/// One listed component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentName {
    /// The section's header flags (default/partial/hidden...).
    pub flags: u16,
    /// `file(map)` form.
    pub name: String,
}

/// The results of a listing, one vector per section kind.
#[derive(Debug, Clone, Default)]
pub struct ComponentList {
    pub keymaps: Vec<ComponentName>,
    pub keycodes: Vec<ComponentName>,
    pub types: Vec<ComponentName>,
    pub compat: Vec<ComponentName>,
    pub symbols: Vec<ComponentName>,
    pub geometry: Vec<ComponentName>,
}

impl ComponentList {
    pub fn len(&self) -> usize {
        self.keymaps.len()
            + self.keycodes.len()
            + self.types.len()
            + self.compat.len()
            + self.symbols.len()
            + self.geometry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shell-style match supporting `*` and `?`.
fn glob_match(pattern: &str, value: &str) -> bool {
    fn matches(pattern: &[u8], value: &[u8]) -> bool {
        match (pattern.first(), value.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                matches(&pattern[1..], value)
                    || (!value.is_empty() && matches(pattern, &value[1..]))
            }
            (Some(b'?'), Some(_)) => matches(&pattern[1..], &value[1..]),
            (Some(&p), Some(&v)) if p == v => matches(&pattern[1..], &value[1..]),
            _ => false,
        }
    }
    matches(pattern.as_bytes(), value.as_bytes())
}

/// Split a `file(map)` pattern into its parts; either may be absent.
fn split_pattern(pattern: &str) -> (String, Option<String>) {
    match pattern.find('(') {
        Some(pos) => {
            let file = pattern[..pos].to_string();
            let map = pattern[pos + 1..].trim_end_matches(')').to_string();
            (file, Some(map))
        }
        None => (pattern.to_string(), None),
    }
}

fn list_section(
    ctx: &mut Context,
    pattern: &str,
    file_type: FileType,
    out: &mut Vec<ComponentName>,
    remaining: &mut usize,
) {
    let (file_pattern, map_pattern) = split_pattern(pattern);
    let file_pattern = if file_pattern.is_empty() {
        "*".to_string()
    } else {
        file_pattern
    };
    let map_pattern = map_pattern.unwrap_or_else(|| "*".to_string());

    let roots: Vec<std::path::PathBuf> = ctx.include_paths().to_vec();
    for root in roots {
        let dir = root.join(file_type.subdirectory());
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| glob_match(&file_pattern, name))
            .collect();
        names.sort();
        for file_name in names {
            if *remaining == 0 {
                return;
            }
            let path = dir.join(&file_name);
            let Ok(source) = std::fs::read_to_string(&path) else {
                continue;
            };
            let parsed = Parser::new(&source, &file_name).and_then(|mut p| p.parse_files(ctx));
            let Ok(files) = parsed else {
                log::debug!("skipping unparseable file {}", path.display());
                continue;
            };
            for file in files {
                if file.file_type != file_type {
                    continue;
                }
                if !glob_match(&map_pattern, &file.name) {
                    continue;
                }
                if *remaining == 0 {
                    return;
                }
                *remaining -= 1;
                out.push(ComponentName {
                    flags: file.flags.bits(),
                    name: format!("{}({})", file_name, file.name),
                });
            }
        }
    }
}

/// Walk the search path and return every `file(map)` pair matching the
/// given patterns, up to `max` results in total.  A `None` pattern
/// skips that section kind.
pub fn list_components(
    ctx: &mut Context,
    patterns: &ComponentNames,
    max: usize,
) -> Result<ComponentList> {
    let mut list = ComponentList::default();
    let mut remaining = max;
    let specs = [
        (FileType::Keymap, &patterns.keymap),
        (FileType::KeyNames, &patterns.keycodes),
        (FileType::Types, &patterns.types),
        (FileType::CompatMap, &patterns.compat),
        (FileType::Symbols, &patterns.symbols),
        (FileType::Geometry, &patterns.geometry),
    ];
    for (file_type, pattern) in specs {
        let Some(pattern) = pattern else { continue };
        let out = match file_type {
            FileType::Keymap => &mut list.keymaps,
            FileType::KeyNames => &mut list.keycodes,
            FileType::Types => &mut list.types,
            FileType::CompatMap => &mut list.compat,
            FileType::Symbols => &mut list.symbols,
            FileType::Geometry => &mut list.geometry,
            _ => continue,
        };
        list_section(ctx, pattern, file_type, out, &mut remaining);
    }
    Ok(list)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::ast::FileFlags;
    use std::io::Write;

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("us", "us"));
        assert!(glob_match("u?", "us"));
        assert!(glob_match("p*5", "pc105"));
        assert!(!glob_match("us", "de"));
        assert!(!glob_match("u?", "u"));
    }

    #[test]
    fn lists_matching_maps() {
        let dir = tempfile::tempdir().unwrap();
        let symbols = dir.path().join("symbols");
        std::fs::create_dir(&symbols).unwrap();
        let mut f = std::fs::File::create(symbols.join("us")).unwrap();
        writeln!(
            f,
            "default xkb_symbols \"basic\" {{ }};\nxkb_symbols \"intl\" {{ }};"
        )
        .unwrap();
        let mut f = std::fs::File::create(symbols.join("de")).unwrap();
        writeln!(f, "xkb_symbols \"basic\" {{ }};").unwrap();

        let mut ctx = Context::new();
        ctx.append_include_path(dir.path());
        let patterns = ComponentNames {
            symbols: Some("us(*)".to_string()),
            ..ComponentNames::default()
        };
        let list = list_components(&mut ctx, &patterns, 100).unwrap();
        assert_eq!(list.symbols.len(), 2);
        assert_eq!(list.symbols[0].name, "us(basic)");
        assert_ne!(list.symbols[0].flags & FileFlags::DEFAULT_MAP.bits(), 0);
        assert_eq!(list.symbols[1].name, "us(intl)");

        let patterns = ComponentNames {
            symbols: Some("*".to_string()),
            ..ComponentNames::default()
        };
        let list = list_components(&mut ctx, &patterns, 100).unwrap();
        assert_eq!(list.symbols.len(), 3);
    }

    #[test]
    fn respects_max() {
        let dir = tempfile::tempdir().unwrap();
        let symbols = dir.path().join("symbols");
        std::fs::create_dir(&symbols).unwrap();
        for name in ["a", "b", "c"] {
            let mut f = std::fs::File::create(symbols.join(name)).unwrap();
            writeln!(f, "xkb_symbols \"basic\" {{ }};").unwrap();
        }
        let mut ctx = Context::new();
        ctx.append_include_path(dir.path());
        let patterns = ComponentNames {
            symbols: Some("*".to_string()),
            ..ComponentNames::default()
        };
        let list = list_components(&mut ctx, &patterns, 2).unwrap();
        assert_eq!(list.symbols.len(), 2);
    }
}
