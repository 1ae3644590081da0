//! # Keyboard Wizardry
//!
//! This is a rust crate that compiles textual keyboard descriptions —
//! the hierarchical, includable xkb-style source language declaring
//! keycode names, key types, symbol interpretations, per-key symbol and
//! action tables, virtual modifiers, indicator maps, and an optional
//! physical geometry — into an in-memory keymap, and then tracks live
//! keyboard state against it.
//!
//! Included functionality:
//!
//! * A compiler front end: lexer, recursive-descent parser, include
//!   resolution over a configurable search path, multi-section merging
//!   with augment/override/replace semantics, and symbolic resolution
//!   of modifiers, keysyms, keycodes and key aliases.
//! * The compiled [`keymap::Keymap`]: keycodes, key types with map
//!   entries and preserve rules, packed per-key multi-group symbol and
//!   action arenas, virtual-to-real modifier resolution, indicator
//!   maps, and geometry storage.
//! * A [`state::State`] engine: set/latch/lock filters for modifiers
//!   and groups, derived effective state, LED evaluation, and
//!   key → symbol/action lookup that consumes that state.
//! * A rules front end expanding `{rules, model, layout, variant,
//!   options}` tuples into component names, and a listing facility
//!   enumerating the components available on the search path.
//!
//! Compilation happens inside an explicit [`context::Context`] holding
//! the atom table, the include path and the diagnostic sink; compiled
//! keymaps are immutable and may be shared by any number of states.
//!
//! ```no_run
//! use keywiz::{compile_keymap_from_source, Context};
//! use keywiz::state::{KeyDirection, State};
//! use std::sync::Arc;
//!
//! let mut ctx = Context::new();
//! let keymap = compile_keymap_from_source(&mut ctx, SOURCE, None)?;
//! let mut state = State::new(Arc::new(keymap));
//! let sym = state.key_get_one_sym(38);
//! state.update_key(38, KeyDirection::Down);
//! # const SOURCE: &str = "";
//! # Ok::<(), keywiz::Error>(())
//! ```

pub mod atom;
pub mod compile;
pub mod context;
pub mod error;
pub mod keymap;
pub mod keysym;
mod keysym_data;
pub mod listing;
pub mod rules;
pub mod state;

#[cfg(test)]
mod test;

pub use compile::{
    compile_keymap_from_components, compile_keymap_from_rules, compile_keymap_from_source,
};
pub use context::{Context, Diagnostic, DiagnosticSink, Level};
pub use error::{Error, Result};
pub use keysym::{keysym_to_string, string_to_keysym, Keysym, NO_SYMBOL};
pub use listing::list_components;
pub use rules::canonicalise_component_names;
