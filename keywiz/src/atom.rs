//! String interning.
//!
//! Every name that participates in equality comparison (type names, level
//! names, indicator names, virtual modifier names, group names) is stored
//! as an [`Atom`] rather than a string, so comparisons are integer
//! comparisons and the text is stored once.
//!
//! By default the table is private to a compilation context.  An embedding
//! application that already has an interning service (an X server, say)
//! can supply its own [`AtomHooks`] so that the ids appearing in the
//! compiled keymap are its ids.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// An interned string id.  `Atom::NONE` is the distinguished empty atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Atom(pub(crate) u32);

impl Atom {
    pub const NONE: Atom = Atom(0);

    pub fn is_none(self) -> bool {
        self == Atom::NONE
    }
}

/// External interning service.  `intern` must be idempotent and must
/// never return 0 for a non-empty string; `lookup` must return the string
/// previously interned.  Implementations must be thread-safe if keymaps
/// are compiled from multiple threads.
pub trait AtomHooks: Send + Sync {
    fn intern(&self, s: &str) -> u32;
    fn lookup(&self, atom: u32) -> Option<String>;
}

#[derive(Clone)]
enum Table {
    Builtin {
        text: Vec<String>,
        index: HashMap<String, u32>,
    },
    External(Arc<dyn AtomHooks>),
}

/// The interning table held by a compilation context and snapshotted into
/// each compiled keymap.
#[derive(Clone)]
pub struct Atoms {
    table: Table,
}

impl std::fmt::Debug for Atoms {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.table {
            Table::Builtin { text, .. } => {
                write!(f, "Atoms(builtin, {} entries)", text.len())
            }
            Table::External(_) => write!(f, "Atoms(external)"),
        }
    }
}

impl Default for Atoms {
    fn default() -> Self {
        Self::new()
    }
}

impl Atoms {
    pub fn new() -> Self {
        Self {
            table: Table::Builtin {
                // Slot 0 is NONE and always resolves to "".
                text: vec![String::new()],
                index: HashMap::new(),
            },
        }
    }

    pub fn with_hooks(hooks: Arc<dyn AtomHooks>) -> Self {
        Self {
            table: Table::External(hooks),
        }
    }

    /// Intern a string.  The empty string interns to `Atom::NONE`.
    pub fn intern(&mut self, s: &str) -> Atom {
        if s.is_empty() {
            return Atom::NONE;
        }
        match &mut self.table {
            Table::Builtin { text, index } => {
                if let Some(&id) = index.get(s) {
                    return Atom(id);
                }
                let id = text.len() as u32;
                text.push(s.to_string());
                index.insert(s.to_string(), id);
                Atom(id)
            }
            Table::External(hooks) => Atom(hooks.intern(s)),
        }
    }

    /// Resolve an atom back to its text.  `Atom::NONE` resolves to `""`,
    /// as does an id the table has never seen.
    pub fn text(&self, atom: Atom) -> Cow<str> {
        if atom.is_none() {
            return Cow::Borrowed("");
        }
        match &self.table {
            Table::Builtin { text, .. } => match text.get(atom.0 as usize) {
                Some(s) => Cow::Borrowed(s.as_str()),
                None => Cow::Borrowed(""),
            },
            Table::External(hooks) => match hooks.lookup(atom.0) {
                Some(s) => Cow::Owned(s),
                None => Cow::Borrowed(""),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut atoms = Atoms::new();
        let a = atoms.intern("Shift");
        let b = atoms.intern("Shift");
        assert_eq!(a, b);
        assert_eq!(atoms.text(a), "Shift");
    }

    #[test]
    fn empty_is_none() {
        let mut atoms = Atoms::new();
        assert_eq!(atoms.intern(""), Atom::NONE);
        assert_eq!(atoms.text(Atom::NONE), "");
    }

    #[test]
    fn distinct_strings_distinct_atoms() {
        let mut atoms = Atoms::new();
        assert_ne!(atoms.intern("a"), atoms.intern("b"));
    }

    struct Upper;
    impl AtomHooks for Upper {
        fn intern(&self, s: &str) -> u32 {
            s.bytes().map(|b| b as u32).sum::<u32>() | 0x8000_0000
        }
        fn lookup(&self, atom: u32) -> Option<String> {
            Some(format!("#{atom:x}"))
        }
    }

    #[test]
    fn external_hooks_are_used() {
        let mut atoms = Atoms::with_hooks(Arc::new(Upper));
        let a = atoms.intern("x");
        assert_ne!(a, Atom::NONE);
        assert!(atoms.text(a).starts_with('#'));
    }
}
