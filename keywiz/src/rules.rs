//! Rules-file expansion: `{rules, model, layout, variant, options}` in,
//! five component names out.
//!
//! The format is line oriented.  A `!` line names the fields the
//! following data lines match and the component they produce, e.g.
//! `! model layout = symbols`; a `! $name = a b c` line defines a group
//! usable as an alternation in later patterns.  Data lines pair a tuple
//! of patterns (`*` matches anything, `$group` matches membership) with
//! a component fragment; `%m`/`%l`/`%v` in the fragment substitute the
//! matched fields, `%(v)` parenthesizes when non-empty, and a fragment
//! beginning with `+` or `|` appends to the component instead of
//! setting it.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::keymap::ComponentNames;
use std::collections::HashMap;

/// The rules/model/layout/variant/options tuple.
#[derive(Debug, Clone, Default)]
pub struct RuleNames {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Model,
    Layout,
    Variant,
    Option,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Component {
    Keycodes,
    Types,
    Compat,
    Symbols,
    Geometry,
    Keymap,
}

impl Component {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "keycodes" => Some(Component::Keycodes),
            "types" => Some(Component::Types),
            "compat" => Some(Component::Compat),
            "symbols" => Some(Component::Symbols),
            "geometry" => Some(Component::Geometry),
            "keymap" => Some(Component::Keymap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    patterns: Vec<String>,
    value: String,
}

#[derive(Debug, Clone)]
struct RuleSet {
    fields: Vec<Field>,
    component: Component,
    rules: Vec<Rule>,
}

/// A parsed rules file.
#[derive(Debug, Clone, Default)]
pub struct Rules {
    sets: Vec<RuleSet>,
    groups: HashMap<String, Vec<String>>,
}

impl Rules {
    pub fn parse(source: &str) -> Result<Rules> {
        let mut rules = Rules::default();
        let mut current: Option<RuleSet> = None;

        for raw_line in source.lines() {
            let line = match raw_line.find("//") {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('!') {
                let header = header.trim();
                // Group definition: ! $name = a b c
                if let Some(rest) = header.strip_prefix('$') {
                    let Some((name, members)) = rest.split_once('=') else {
                        continue;
                    };
                    rules.groups.insert(
                        format!("${}", name.trim()),
                        members.split_whitespace().map(str::to_string).collect(),
                    );
                    continue;
                }
                // Field tuple: ! model layout = symbols
                let Some((lhs, rhs)) = header.split_once('=') else {
                    continue;
                };
                let mut fields = Vec::new();
                let mut bad = false;
                for word in lhs.split_whitespace() {
                    // Indexed fields (layout[2]) are matched on the
                    // whole value; the index is not interpreted.
                    let base = word.split('[').next().unwrap_or(word);
                    let field = match base.to_ascii_lowercase().as_str() {
                        "model" => Field::Model,
                        "layout" => Field::Layout,
                        "variant" => Field::Variant,
                        "option" => Field::Option,
                        _ => {
                            bad = true;
                            break;
                        }
                    };
                    fields.push(field);
                }
                let component = rhs
                    .split_whitespace()
                    .next()
                    .and_then(Component::from_name);
                if let Some(set) = current.take() {
                    rules.sets.push(set);
                }
                match (bad, component) {
                    (false, Some(component)) if !fields.is_empty() => {
                        current = Some(RuleSet {
                            fields,
                            component,
                            rules: Vec::new(),
                        });
                    }
                    _ => current = None,
                }
                continue;
            }

            let Some(set) = current.as_mut() else {
                continue;
            };
            let mut words: Vec<&str> = line.split_whitespace().collect();
            let Some(eq_pos) = words.iter().position(|&w| w == "=") else {
                continue;
            };
            let value: String = words.split_off(eq_pos + 1).join(" ");
            words.pop(); // the '='
            if words.len() != set.fields.len() {
                continue;
            }
            set.rules.push(Rule {
                patterns: words.into_iter().map(str::to_string).collect(),
                value,
            });
        }
        if let Some(set) = current.take() {
            rules.sets.push(set);
        }
        Ok(rules)
    }

    fn field_value<'a>(&self, names: &'a RuleNames, field: Field, option: &'a str) -> &'a str {
        match field {
            Field::Model => &names.model,
            Field::Layout => &names.layout,
            Field::Variant => &names.variant,
            Field::Option => option,
        }
    }

    fn pattern_matches(&self, pattern: &str, value: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(members) = self.groups.get(pattern) {
            return members.iter().any(|m| m == value);
        }
        pattern == value
    }

    fn substitute(&self, template: &str, names: &RuleNames) -> String {
        let mut out = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            // %m %l %v, parenthesized %(v), and prefixed %+l / %|l /
            // %_l forms.
            let mut prefix = None;
            let mut parens = false;
            let mut next = chars.next();
            if let Some(p @ ('+' | '|' | '_')) = next {
                prefix = Some(if p == '_' { ' ' } else { p });
                next = chars.next();
            }
            if next == Some('(') {
                parens = true;
                next = chars.next();
            }
            let value = match next {
                Some('m') => names.model.as_str(),
                Some('l') => names.layout.as_str(),
                Some('v') => names.variant.as_str(),
                _ => "",
            };
            if parens && chars.peek() == Some(&')') {
                chars.next();
            }
            if value.is_empty() {
                continue;
            }
            if let Some(prefix) = prefix {
                out.push(prefix);
            }
            if parens {
                out.push('(');
                out.push_str(value);
                out.push(')');
            } else {
                out.push_str(value);
            }
        }
        out
    }

    /// Expand the tuple into the five component names.
    pub fn components(&self, names: &RuleNames) -> ComponentNames {
        let mut result: HashMap<Component, String> = HashMap::new();
        let options: Vec<&str> = names
            .options
            .split([',', ' '])
            .filter(|s| !s.is_empty())
            .collect();

        for set in &self.sets {
            let has_option_field = set.fields.contains(&Field::Option);
            let candidates: Vec<&str> = if has_option_field {
                options.clone()
            } else {
                vec![""]
            };
            for option in candidates {
                for rule in &set.rules {
                    let matches = set
                        .fields
                        .iter()
                        .zip(rule.patterns.iter())
                        .all(|(&field, pattern)| {
                            self.pattern_matches(pattern, self.field_value(names, field, option))
                        });
                    if !matches {
                        continue;
                    }
                    let mut expanded = self.substitute(&rule.value, names);
                    // %o — the matched option, occasionally used.
                    if !option.is_empty() {
                        expanded = expanded.replace("%o", option);
                    }
                    let slot = result.entry(set.component).or_default();
                    if expanded.starts_with('+') || expanded.starts_with('|') {
                        slot.push_str(&expanded);
                    } else if slot.is_empty() {
                        *slot = expanded;
                    }
                    break;
                }
            }
        }

        ComponentNames {
            keymap: result.remove(&Component::Keymap),
            keycodes: result.remove(&Component::Keycodes),
            types: result.remove(&Component::Types),
            compat: result.remove(&Component::Compat),
            symbols: result.remove(&Component::Symbols),
            geometry: result.remove(&Component::Geometry),
        }
    }
}

/// Load the named rules file from the search path and expand the tuple.
pub fn components_from_rules(ctx: &mut Context, names: &RuleNames) -> Result<ComponentNames> {
    if names.rules.is_empty() || names.layout.is_empty() {
        ctx.diag
            .error("Rules and layout required to generate a keymap".to_string());
        return Err(Error::NoComponents(names.rules.clone()));
    }
    let Some(path) = crate::compile::include::find_file_in_path(
        ctx,
        &names.rules,
        crate::compile::ast::FileType::Rules,
    ) else {
        ctx.diag.error(format!(
            "Could not find \"{}\" rules on the include path",
            names.rules
        ));
        return Err(Error::IncludeNotFound {
            kind: "rules",
            name: names.rules.clone(),
        });
    };
    let source = std::fs::read_to_string(path)?;
    let rules = Rules::parse(&source)?;
    let components = rules.components(names);
    if components
        .keycodes
        .as_deref()
        .map(str::is_empty)
        .unwrap_or(true)
    {
        ctx.diag.error(format!(
            "No components returned from rules \"{}\"",
            names.rules
        ));
        return Err(Error::NoComponents(names.rules.clone()));
    }
    Ok(components)
}

/// Canonicalise component names against an `old` set: a leading `+`
/// prepends the old value, a leading `|` prepends with override, and a
/// `%` expands to the old value.
pub fn canonicalise_component_names(names: &mut ComponentNames, old: &ComponentNames) {
    fn canonicalise(field: &mut Option<String>, old: Option<&str>) {
        let Some(value) = field.as_mut() else { return };
        let old = old.unwrap_or("");
        if value.starts_with('+') || value.starts_with('|') {
            *value = format!("{old}{value}");
        }
        if value.contains('%') {
            *value = value.replace('%', old);
        }
    }
    canonicalise(&mut names.keymap, old.keymap.as_deref());
    canonicalise(&mut names.keycodes, old.keycodes.as_deref());
    canonicalise(&mut names.types, old.types.as_deref());
    canonicalise(&mut names.compat, old.compat.as_deref());
    canonicalise(&mut names.symbols, old.symbols.as_deref());
    canonicalise(&mut names.geometry, old.geometry.as_deref());
}

#[cfg(test)]
mod test {
    use super::*;

    const RULES: &str = r#"
        // test rules
        ! $pcmodels = pc101 pc102 pc104 pc105

        ! model = keycodes
          $pcmodels = evdev
          * = evdev

        ! model = geometry
          pc104 = pc(pc104)
          * = pc(pc105)

        ! model layout = symbols
          * us = pc+us
          * * = pc+%l%(v)

        ! model = types
          * = complete

        ! model = compat
          * = complete

        ! option = symbols
          grp:alts_toggle = +group(alts_toggle)
          ctrl:nocaps = +ctrl(nocaps)
    "#;

    fn names(model: &str, layout: &str, variant: &str, options: &str) -> RuleNames {
        RuleNames {
            rules: "test".to_string(),
            model: model.to_string(),
            layout: layout.to_string(),
            variant: variant.to_string(),
            options: options.to_string(),
        }
    }

    #[test]
    fn basic_expansion() {
        let rules = Rules::parse(RULES).unwrap();
        let components = rules.components(&names("pc105", "us", "", ""));
        assert_eq!(components.keycodes.as_deref(), Some("evdev"));
        assert_eq!(components.symbols.as_deref(), Some("pc+us"));
        assert_eq!(components.types.as_deref(), Some("complete"));
        assert_eq!(components.geometry.as_deref(), Some("pc(pc105)"));
    }

    #[test]
    fn percent_substitution() {
        let rules = Rules::parse(RULES).unwrap();
        let components = rules.components(&names("pc105", "de", "neo", ""));
        assert_eq!(components.symbols.as_deref(), Some("pc+de(neo)"));
        // empty variant leaves the parens off
        let components = rules.components(&names("pc105", "de", "", ""));
        assert_eq!(components.symbols.as_deref(), Some("pc+de"));
    }

    #[test]
    fn group_alternation() {
        let rules = Rules::parse(RULES).unwrap();
        let components = rules.components(&names("pc101", "us", "", ""));
        assert_eq!(components.keycodes.as_deref(), Some("evdev"));
        let components = rules.components(&names("pc104", "us", "", ""));
        assert_eq!(components.geometry.as_deref(), Some("pc(pc104)"));
    }

    #[test]
    fn options_append() {
        let rules = Rules::parse(RULES).unwrap();
        let components = rules.components(&names(
            "pc105",
            "us",
            "",
            "grp:alts_toggle,ctrl:nocaps",
        ));
        assert_eq!(
            components.symbols.as_deref(),
            Some("pc+us+group(alts_toggle)+ctrl(nocaps)")
        );
    }

    #[test]
    fn canonicalisation() {
        let mut names = ComponentNames {
            keycodes: Some("+bar".to_string()),
            types: Some("|quux".to_string()),
            symbols: Some("foo+%|baz".to_string()),
            ..ComponentNames::default()
        };
        let old = ComponentNames {
            keycodes: Some("foo".to_string()),
            types: Some("baz".to_string()),
            symbols: Some("bar".to_string()),
            ..ComponentNames::default()
        };
        canonicalise_component_names(&mut names, &old);
        assert_eq!(names.keycodes.as_deref(), Some("foo+bar"));
        assert_eq!(names.types.as_deref(), Some("baz|quux"));
        assert_eq!(names.symbols.as_deref(), Some("foo+bar|baz"));
    }
}
