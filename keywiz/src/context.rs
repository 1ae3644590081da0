//! The compilation context.
//!
//! Compilers of this kind traditionally keep the atom table, the
//! warning level and the current file/line in process globals.  Here all
//! of that lives in an explicit [`Context`] threaded through compilation:
//! tests get fresh contexts (and therefore fresh atom tables), and two
//! contexts never interfere.
//!
//! The context owns the diagnostic sink.  Diagnostics are structured
//! `(level, file, line, message)` records; the default sink forwards them
//! to the `log` crate, and an embedding application can install its own
//! sink to capture the stream.

use crate::atom::{Atom, AtomHooks, Atoms};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Severity of a diagnostic record.
///
/// `Action` is the conventional second line of a report: it describes the
/// recovery taken ("Using first definition", "Ignoring", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Action,
    Warning,
    Error,
}

/// One diagnostic record.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: {}", file, line, self.message),
            (Some(file), None) => write!(f, "{}: {}", file, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Receives every diagnostic produced during a compilation session.
pub trait DiagnosticSink {
    fn report(&mut self, diag: &Diagnostic);
}

/// The default sink: forwards to the `log` facade.
#[derive(Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diag: &Diagnostic) {
        match diag.level {
            Level::Error => log::error!("{}", diag),
            Level::Warning => log::warn!("{}", diag),
            Level::Action => log::info!("{}", diag),
            Level::Info => log::debug!("{}", diag),
        }
    }
}

/// A sink that buffers everything; handy for tests and for callers that
/// want to present the stream themselves.
#[derive(Default)]
pub struct CollectingSink {
    pub records: Vec<Diagnostic>,
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diag: &Diagnostic) {
        self.records.push(diag.clone());
    }
}

pub(crate) struct Diagnostics {
    sink: Box<dyn DiagnosticSink>,
    warning_level: u16,
    errors: usize,
    current_file: Option<String>,
}

impl Diagnostics {
    fn new() -> Self {
        Self {
            sink: Box::new(LogSink),
            warning_level: 0,
            errors: 0,
            current_file: None,
        }
    }

    fn emit(&mut self, level: Level, line: Option<u32>, message: String) {
        if level == Level::Error {
            self.errors += 1;
        }
        let diag = Diagnostic {
            level,
            file: self.current_file.clone(),
            line,
            message,
        };
        self.sink.report(&diag);
    }

    pub fn error(&mut self, message: String) {
        self.emit(Level::Error, None, message);
    }

    pub fn warn(&mut self, message: String) {
        self.emit(Level::Warning, None, message);
    }

    pub fn action(&mut self, message: String) {
        self.emit(Level::Action, None, message);
    }

    pub fn info(&mut self, message: String) {
        self.emit(Level::Info, None, message);
    }

    /// Report a warning only when the session is verbose enough.
    pub fn warn_lvl(&mut self, min: u16, message: String) {
        if self.warning_level > min {
            self.warn(message);
        }
    }

    pub fn warning_level(&self) -> u16 {
        self.warning_level
    }
}

/// A compilation session: atom table, include search path, diagnostics.
///
/// A context is single-threaded and non-reentrant; create one per
/// compilation (they are cheap) rather than sharing one across threads.
pub struct Context {
    pub(crate) atoms: Atoms,
    pub(crate) diag: Diagnostics,
    include_paths: Vec<PathBuf>,
    next_file_id: u32,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            atoms: Atoms::new(),
            diag: Diagnostics::new(),
            include_paths: Vec::new(),
            next_file_id: 1,
        }
    }

    /// Use an external atom service instead of the built-in table.
    pub fn with_atom_hooks(hooks: Arc<dyn AtomHooks>) -> Self {
        let mut ctx = Self::new();
        ctx.atoms = Atoms::with_hooks(hooks);
        ctx
    }

    /// Append a directory root to the include search path.  The resolver
    /// appends the per-section subdirectory (`keycodes`, `symbols`, ...)
    /// automatically.
    pub fn append_include_path<P: AsRef<Path>>(&mut self, path: P) {
        self.include_paths.push(path.as_ref().to_path_buf());
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Install a custom diagnostic sink.
    pub fn set_diagnostic_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.diag.sink = sink;
    }

    /// Raise or lower the collision-reporting verbosity (0 = quiet).
    pub fn set_warning_level(&mut self, level: u16) {
        self.diag.warning_level = level;
    }

    /// Number of error-level diagnostics reported so far.
    pub fn error_count(&self) -> usize {
        self.diag.errors
    }

    pub fn intern(&mut self, s: &str) -> Atom {
        self.atoms.intern(s)
    }

    pub fn atom_text(&self, atom: Atom) -> Cow<str> {
        self.atoms.text(atom)
    }

    pub(crate) fn alloc_file_id(&mut self) -> u32 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }

    pub(crate) fn set_current_file(&mut self, name: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.diag.current_file, name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct SharedSink(Rc<RefCell<Vec<Diagnostic>>>);
    impl DiagnosticSink for SharedSink {
        fn report(&mut self, diag: &Diagnostic) {
            self.0.borrow_mut().push(diag.clone());
        }
    }

    #[test]
    fn error_count_tracks_errors() {
        let mut ctx = Context::new();
        ctx.diag.warn("not an error".into());
        ctx.diag.error("boom".into());
        ctx.diag.action("Ignoring".into());
        assert_eq!(ctx.error_count(), 1);
    }

    #[test]
    fn custom_sink_sees_records() {
        let records = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = Context::new();
        ctx.set_diagnostic_sink(Box::new(SharedSink(Rc::clone(&records))));
        ctx.set_current_file(Some("pc(pc105)".into()));
        ctx.diag.error("bad".into());
        let records = records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file.as_deref(), Some("pc(pc105)"));
        assert_eq!(records[0].to_string(), "pc(pc105): bad");
    }

    #[test]
    fn warn_lvl_respects_verbosity() {
        let records = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = Context::new();
        ctx.set_diagnostic_sink(Box::new(SharedSink(Rc::clone(&records))));
        ctx.diag.warn_lvl(9, "quiet".into());
        assert!(records.borrow().is_empty());
        ctx.set_warning_level(10);
        ctx.diag.warn_lvl(9, "loud".into());
        assert_eq!(records.borrow().len(), 1);
    }
}
