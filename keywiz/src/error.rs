//! Error types.
use thiserror::Error;

/// Convenient return type for functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Generic I/O error.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// A file or map named in an include statement could not be located
    /// anywhere on the search path.
    #[error("no {kind} named \"{name}\" found on the include path")]
    IncludeNotFound { kind: &'static str, name: String },

    /// The source text could not be tokenized or did not match the grammar.
    #[error("{file}:{line}: parse error: {message}")]
    Parse {
        file: String,
        line: u32,
        message: String,
    },

    /// The requested map does not exist in the parsed file.
    #[error("no map named \"{0}\" in input file")]
    NoSuchMap(String),

    /// The named file parsed, but is not of the expected section kind.
    #[error("file is a {found} file, expected {expected}")]
    WrongFileType {
        expected: &'static str,
        found: &'static str,
    },

    /// Compilation produced diagnostics at error level; no keymap is
    /// returned.  The diagnostic stream has the details.
    #[error("keymap compilation failed with {0} error(s)")]
    CompileFailed(usize),

    /// The rules file could not produce component names for the given
    /// rules/model/layout tuple.
    #[error("no components returned from rules \"{0}\"")]
    NoComponents(String),

    /// State reached that should be impossible.
    #[error("impossible!?: {0}")]
    ImpossibleState(&'static str),
}
