//! The parsed representation of a keyboard description.
//!
//! A source file holds one or more named sections; each section is a list
//! of typed statements whose order is preserved (merging respects source
//! order).  The parser builds this tree; the section compilers consume
//! it.

use bitflags::bitflags;

/// How a new definition combines with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Use the statement's own mode.
    #[default]
    Default,
    /// Existing fields win on collision.
    Augment,
    /// New fields win on collision.
    Override,
    /// The new item wholesale replaces a matching one.
    Replace,
    /// Valid only on keycode definitions: the name is an additional
    /// alternate form for the key.
    AltForm,
}

impl MergeMode {
    /// Resolve `Default` against an outer mode.
    pub fn or(self, outer: MergeMode) -> MergeMode {
        match self {
            MergeMode::Default => outer,
            other => other,
        }
    }

    /// True when a colliding new definition should clobber the old one.
    pub fn clobbers(self) -> bool {
        !matches!(self, MergeMode::Augment)
    }
}

/// Section kinds, with the conventional file-type codes used in includes
/// and listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Types,
    CompatMap,
    Symbols,
    Indicators,
    KeyNames,
    Geometry,
    VirtualMods,
    Keymap,
    Rules,
}

impl FileType {
    pub fn code(self) -> u8 {
        match self {
            FileType::Types => 0,
            FileType::CompatMap => 1,
            FileType::Symbols => 2,
            FileType::Indicators => 3,
            FileType::KeyNames => 4,
            FileType::Geometry => 5,
            FileType::VirtualMods => 6,
            FileType::Keymap => 22,
            FileType::Rules => 24,
        }
    }

    /// The search-path subdirectory for this kind of file.
    pub fn subdirectory(self) -> &'static str {
        match self {
            FileType::Types => "types",
            FileType::CompatMap => "compat",
            FileType::Symbols => "symbols",
            FileType::Indicators | FileType::KeyNames => "keycodes",
            FileType::Geometry => "geometry",
            FileType::VirtualMods => "types",
            FileType::Keymap => "keymap",
            FileType::Rules => "rules",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileType::Types => "xkb_types",
            FileType::CompatMap => "xkb_compatibility_map",
            FileType::Symbols => "xkb_symbols",
            FileType::Indicators => "xkb_indicators",
            FileType::KeyNames => "xkb_keycodes",
            FileType::Geometry => "xkb_geometry",
            FileType::VirtualMods => "xkb_virtual_mods",
            FileType::Keymap => "xkb_keymap",
            FileType::Rules => "rules",
        }
    }
}

bitflags! {
    /// Flags preceding a section header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: u16 {
        const DEFAULT_MAP = 1 << 0;
        const PARTIAL = 1 << 1;
        const HIDDEN = 1 << 2;
        const ALPHANUMERIC_KEYS = 1 << 3;
        const MODIFIER_KEYS = 1 << 4;
        const KEYPAD_KEYS = 1 << 5;
        const FUNCTION_KEYS = 1 << 6;
        const ALTERNATE_GROUP = 1 << 7;
    }
}

/// A parsed section (or an `xkb_keymap` container of sections).
#[derive(Debug, Clone)]
pub struct XkbFile {
    pub file_type: FileType,
    /// Name of the enclosing file, for diagnostics.
    pub top_name: String,
    /// The section's own quoted name.
    pub name: String,
    pub flags: FileFlags,
    pub id: u32,
    pub defs: Vec<Stmt>,
}

/// One fragment of an include chain: `file(map):group`.
#[derive(Debug, Clone, Default)]
pub struct IncludeFragment {
    pub merge: MergeMode,
    pub file: String,
    pub map: Option<String>,
    /// Explicit group binding from a `:N` suffix, 1-based.
    pub group: Option<u8>,
}

impl IncludeFragment {
    /// An empty file and map targets the current file's own
    /// still-being-compiled state.
    pub fn is_self_reference(&self) -> bool {
        self.file.is_empty() && self.map.is_none()
    }
}

/// A full include statement: a chain of fragments plus the original
/// source text (used as the merged unit's name).
#[derive(Debug, Clone)]
pub struct IncludeStmt {
    pub merge: MergeMode,
    pub stmt: String,
    pub chain: Vec<IncludeFragment>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Include(IncludeStmt),
    Var(VarDef),
    /// One `virtual_modifiers` statement may declare several names.
    VModList(Vec<VModDef>),
    Keycode(KeycodeDef),
    KeyAlias(KeyAliasDef),
    KeyType(KeyTypeDef),
    Interp(InterpDef),
    GroupCompat(GroupCompatDef),
    ModMap(ModMapDef),
    Symbols(SymbolsDef),
    IndicatorName(IndicatorNameDef),
    IndicatorMap(IndicatorMapDef),
    Shape(ShapeDef),
    Section(SectionDef),
    Doodad(DoodadDef),
    Overlay(OverlayDef),
    /// A nested section inside an `xkb_keymap` container.
    File(XkbFile),
}

impl Stmt {
    pub fn kind(&self) -> &'static str {
        match self {
            Stmt::Include(_) => "include",
            Stmt::Var(_) => "variable",
            Stmt::VModList(_) => "virtual modifier",
            Stmt::Keycode(_) => "key name",
            Stmt::KeyAlias(_) => "key alias",
            Stmt::KeyType(_) => "key type",
            Stmt::Interp(_) => "symbol interpretation",
            Stmt::GroupCompat(_) => "group compatibility",
            Stmt::ModMap(_) => "modifier map",
            Stmt::Symbols(_) => "symbols",
            Stmt::IndicatorName(_) => "indicator name",
            Stmt::IndicatorMap(_) => "indicator map",
            Stmt::Shape(_) => "shape",
            Stmt::Section(_) => "section",
            Stmt::Doodad(_) => "doodad",
            Stmt::Overlay(_) => "overlay",
            Stmt::File(_) => "map",
        }
    }
}

/// `element.field[index] = value;`, or a bare (possibly negated)
/// boolean, or an anonymous `[...]` entry in a key's body.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub merge: MergeMode,
    /// `None` for anonymous list entries in key bodies.
    pub name: Option<Expr>,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct VModDef {
    pub merge: MergeMode,
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct KeycodeDef {
    pub merge: MergeMode,
    pub name: String,
    pub value: u32,
}

#[derive(Debug, Clone)]
pub struct KeyAliasDef {
    pub merge: MergeMode,
    pub alias: String,
    pub real: String,
}

#[derive(Debug, Clone)]
pub struct KeyTypeDef {
    pub merge: MergeMode,
    pub name: String,
    pub body: Vec<VarDef>,
}

#[derive(Debug, Clone)]
pub struct InterpDef {
    pub merge: MergeMode,
    pub sym: String,
    pub match_expr: Option<Expr>,
    pub body: Vec<VarDef>,
}

#[derive(Debug, Clone)]
pub struct GroupCompatDef {
    pub merge: MergeMode,
    pub group: u8,
    pub def: Expr,
}

#[derive(Debug, Clone)]
pub struct ModMapDef {
    pub merge: MergeMode,
    pub modifier: String,
    pub keys: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct SymbolsDef {
    pub merge: MergeMode,
    pub key_name: String,
    pub body: Vec<VarDef>,
}

#[derive(Debug, Clone)]
pub struct IndicatorNameDef {
    pub merge: MergeMode,
    pub ndx: i32,
    pub name: Expr,
    pub virt: bool,
}

#[derive(Debug, Clone)]
pub struct IndicatorMapDef {
    pub merge: MergeMode,
    pub name: String,
    pub body: Vec<VarDef>,
}

#[derive(Debug, Clone)]
pub enum ShapeItem {
    Var(VarDef),
    Outline {
        /// `approx`, `primary`, or unnamed.
        tag: Option<String>,
        /// Coordinates ×10 (tenths of a millimetre).
        points: Vec<(i16, i16)>,
    },
}

#[derive(Debug, Clone)]
pub struct ShapeDef {
    pub merge: MergeMode,
    pub name: String,
    pub items: Vec<ShapeItem>,
}

#[derive(Debug, Clone)]
pub struct GeomKeyDef {
    /// A bare `<NAME>` entry.
    pub name: Option<String>,
    /// A braced entry's expressions (key name, shape, gap, color...).
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum RowItem {
    Var(VarDef),
    Keys(Vec<GeomKeyDef>),
}

#[derive(Debug, Clone)]
pub struct RowDef {
    pub items: Vec<RowItem>,
}

#[derive(Debug, Clone)]
pub enum SectionItem {
    Var(VarDef),
    Row(RowDef),
    Doodad(DoodadDef),
    Overlay(OverlayDef),
}

#[derive(Debug, Clone)]
pub struct SectionDef {
    pub merge: MergeMode,
    pub name: String,
    pub items: Vec<SectionItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoodadKind {
    Outline,
    Solid,
    Text,
    Indicator,
    Logo,
}

#[derive(Debug, Clone)]
pub struct DoodadDef {
    pub merge: MergeMode,
    pub kind: DoodadKind,
    pub name: String,
    pub body: Vec<VarDef>,
}

#[derive(Debug, Clone)]
pub struct OverlayDef {
    pub merge: MergeMode,
    pub name: String,
    /// `(over, under)` key name pairs.
    pub keys: Vec<(String, String)>,
}

/// Operators of the expression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Negate,
    UnaryPlus,
    Not,
    Invert,
}

/// A literal value with its source type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    /// Stored ×10: `1.5` is 15.
    Float(i32),
    Bool(bool),
    String(String),
    KeyName(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Value(Value),
    Ident(String),
    FieldRef {
        element: String,
        field: String,
    },
    ArrayRef {
        element: Option<String>,
        field: String,
        index: Box<Expr>,
    },
    /// `Name(arg, arg...)` — an action declaration or a match predicate.
    /// Arguments are expressions; `field = value` arguments parse as
    /// `Binary(Assign, ...)`.
    Action {
        name: String,
        args: Vec<Expr>,
    },
    ActionList(Vec<Expr>),
    KeysymList(Vec<String>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
}

impl Expr {
    pub fn op_name(&self) -> &'static str {
        match self {
            Expr::Value(_) => "literal",
            Expr::Ident(_) => "identifier",
            Expr::FieldRef { .. } => "field reference",
            Expr::ArrayRef { .. } => "array reference",
            Expr::Action { .. } => "action declaration",
            Expr::ActionList(_) => "list of actions",
            Expr::KeysymList(_) => "list of keysyms",
            Expr::Binary(BinOp::Add, ..) => "addition",
            Expr::Binary(BinOp::Subtract, ..) => "subtraction",
            Expr::Binary(BinOp::Multiply, ..) => "multiplication",
            Expr::Binary(BinOp::Divide, ..) => "division",
            Expr::Binary(BinOp::Assign, ..) => "assignment",
            Expr::Unary(UnOp::Not, _) => "logical not",
            Expr::Unary(UnOp::Negate, _) => "arithmetic negation",
            Expr::Unary(UnOp::Invert, _) => "bitwise inversion",
            Expr::Unary(UnOp::UnaryPlus, _) => "plus sign",
        }
    }

    /// Split an assignment left-hand side into element, field and index.
    pub fn as_lhs(&self) -> Option<(Option<&str>, &str, Option<&Expr>)> {
        match self {
            Expr::Ident(name) => Some((None, name, None)),
            Expr::FieldRef { element, field } => Some((Some(element), field, None)),
            Expr::ArrayRef {
                element,
                field,
                index,
            } => Some((element.as_deref(), field, Some(index))),
            _ => None,
        }
    }
}
