//! Recursive-descent parser for the keyboard description language.
//!
//! A source file is a sequence of named sections; `xkb_keymap` sections
//! aggregate one nested section per kind.  Reserved words are matched
//! case-insensitively.

use super::ast::*;
use super::scanner::{Scanner, Token};
use crate::context::Context;
use crate::error::{Error, Result};

pub struct Parser<'a> {
    scanner: Scanner<'a>,
    tok: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, file_name: &str) -> Result<Self> {
        let mut scanner = Scanner::new(source, file_name);
        let tok = scanner.next_token()?;
        Ok(Self { scanner, tok })
    }

    fn bump(&mut self) -> Result<Token> {
        let next = self.scanner.next_token()?;
        Ok(std::mem::replace(&mut self.tok, next))
    }

    fn error(&self, message: String) -> Error {
        Error::Parse {
            file: self.scanner.file().to_string(),
            line: self.scanner.line(),
            message,
        }
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        if self.tok == want {
            self.bump()?;
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                want.describe(),
                self.tok.describe()
            )))
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.tok, Token::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.bump()? {
            Token::Ident(s) => Ok(s),
            other => Err(self.error(format!("expected identifier, found {}", other.describe()))),
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.bump()? {
            Token::String(s) => Ok(s),
            other => Err(self.error(format!("expected string, found {}", other.describe()))),
        }
    }

    fn expect_key_name(&mut self) -> Result<String> {
        match self.bump()? {
            Token::KeyName(s) => Ok(s),
            other => Err(self.error(format!("expected key name, found {}", other.describe()))),
        }
    }

    /// Parse every section in the source.
    pub fn parse_files(&mut self, ctx: &mut Context) -> Result<Vec<XkbFile>> {
        let mut files = Vec::new();
        while self.tok != Token::Eof {
            files.push(self.parse_one_file(ctx)?);
        }
        if files.is_empty() {
            return Err(self.error("no sections in file".to_string()));
        }
        Ok(files)
    }

    fn parse_flags(&mut self) -> Result<FileFlags> {
        let mut flags = FileFlags::empty();
        loop {
            let flag = if self.is_keyword("default") {
                FileFlags::DEFAULT_MAP
            } else if self.is_keyword("partial") {
                FileFlags::PARTIAL
            } else if self.is_keyword("hidden") {
                FileFlags::HIDDEN
            } else if self.is_keyword("alphanumeric_keys") {
                FileFlags::ALPHANUMERIC_KEYS
            } else if self.is_keyword("modifier_keys") {
                FileFlags::MODIFIER_KEYS
            } else if self.is_keyword("keypad_keys") {
                FileFlags::KEYPAD_KEYS
            } else if self.is_keyword("function_keys") {
                FileFlags::FUNCTION_KEYS
            } else if self.is_keyword("alternate_group") {
                FileFlags::ALTERNATE_GROUP
            } else {
                return Ok(flags);
            };
            flags |= flag;
            self.bump()?;
        }
    }

    fn section_kind(&self) -> Option<FileType> {
        let Token::Ident(word) = &self.tok else {
            return None;
        };
        let word = word.to_ascii_lowercase();
        match word.as_str() {
            "xkb_keymap" | "xkb_semantics" | "xkb_layout" => Some(FileType::Keymap),
            "xkb_keycodes" => Some(FileType::KeyNames),
            "xkb_types" => Some(FileType::Types),
            "xkb_compat" | "xkb_compat_map" | "xkb_compatibility" | "xkb_compatibility_map" => {
                Some(FileType::CompatMap)
            }
            "xkb_symbols" => Some(FileType::Symbols),
            "xkb_geometry" => Some(FileType::Geometry),
            _ => None,
        }
    }

    fn parse_one_file(&mut self, ctx: &mut Context) -> Result<XkbFile> {
        let flags = self.parse_flags()?;
        let Some(file_type) = self.section_kind() else {
            return Err(self.error(format!("expected a section kind, found {}", self.tok.describe())));
        };
        self.bump()?;
        let name = match &self.tok {
            Token::String(_) => self.expect_string()?,
            _ => String::new(),
        };
        self.expect(Token::LBrace)?;

        let defs = if file_type == FileType::Keymap {
            let mut defs = Vec::new();
            while self.tok != Token::RBrace {
                let inner = self.parse_one_file(ctx)?;
                if inner.file_type == FileType::Keymap {
                    return Err(self.error("keymap sections may not nest".to_string()));
                }
                defs.push(Stmt::File(inner));
            }
            defs
        } else {
            self.parse_decl_list(file_type)?
        };

        self.expect(Token::RBrace)?;
        self.expect(Token::Semi)?;

        Ok(XkbFile {
            file_type,
            top_name: self.scanner.file().to_string(),
            name,
            flags,
            id: ctx.alloc_file_id(),
            defs,
        })
    }

    fn parse_merge_prefix(&mut self) -> Result<MergeMode> {
        if self.is_keyword("augment") {
            self.bump()?;
            Ok(MergeMode::Augment)
        } else if self.is_keyword("override") {
            self.bump()?;
            Ok(MergeMode::Override)
        } else if self.is_keyword("replace") {
            self.bump()?;
            Ok(MergeMode::Replace)
        } else if self.is_keyword("alternate") {
            self.bump()?;
            Ok(MergeMode::AltForm)
        } else {
            Ok(MergeMode::Default)
        }
    }

    fn parse_decl_list(&mut self, file_type: FileType) -> Result<Vec<Stmt>> {
        let mut defs = Vec::new();
        while self.tok != Token::RBrace && self.tok != Token::Eof {
            defs.push(self.parse_decl(file_type)?);
        }
        Ok(defs)
    }

    fn parse_decl(&mut self, file_type: FileType) -> Result<Stmt> {
        let merge = self.parse_merge_prefix()?;

        if merge == MergeMode::AltForm {
            // 'alternate' may only precede a keycode definition.
            if let Token::KeyName(_) = self.tok {
                return self.parse_keycode_def(merge);
            }
            return Err(self.error("illegal use of 'alternate' merge mode".to_string()));
        }

        if self.is_keyword("include") {
            self.bump()?;
            let text = self.expect_string()?;
            self.expect(Token::Semi)?;
            let chain = parse_include_chain(&text, merge)
                .ok_or_else(|| self.error(format!("illegal include statement \"{text}\"")))?;
            return Ok(Stmt::Include(IncludeStmt {
                merge,
                stmt: text,
                chain,
            }));
        }

        if let Token::KeyName(_) = self.tok {
            return self.parse_keycode_def(merge);
        }

        if self.is_keyword("alias") {
            self.bump()?;
            let alias = self.expect_key_name()?;
            self.expect(Token::Equals)?;
            let real = self.expect_key_name()?;
            self.expect(Token::Semi)?;
            return Ok(Stmt::KeyAlias(KeyAliasDef { merge, alias, real }));
        }

        if self.is_keyword("virtual_modifiers") || self.is_keyword("virtualmodifiers") {
            // A single statement may declare several virtual modifiers;
            // only the last one in the list is returned as a statement
            // carrying the whole list.
            return self.parse_vmod_decl(merge);
        }

        if self.is_keyword("type") {
            self.bump()?;
            let name = self.expect_string()?;
            let body = self.parse_var_decl_block()?;
            self.expect(Token::Semi)?;
            return Ok(Stmt::KeyType(KeyTypeDef { merge, name, body }));
        }

        if self.is_keyword("interpret") {
            return self.parse_interp_decl(merge);
        }

        if self.is_keyword("group") {
            self.bump()?;
            let group = match self.bump()? {
                Token::Int(v) => v,
                other => {
                    return Err(
                        self.error(format!("expected group number, found {}", other.describe()))
                    )
                }
            };
            if !(1..=255).contains(&group) {
                return Err(self.error(format!("group index {group} out of range")));
            }
            self.expect(Token::Equals)?;
            let def = self.parse_expr()?;
            self.expect(Token::Semi)?;
            return Ok(Stmt::GroupCompat(GroupCompatDef {
                merge,
                group: group as u8,
                def,
            }));
        }

        if self.is_keyword("modifier_map") || self.is_keyword("mod_map") || self.is_keyword("modmap")
        {
            self.bump()?;
            let modifier = self.expect_ident()?;
            self.expect(Token::LBrace)?;
            let mut keys = Vec::new();
            while self.tok != Token::RBrace {
                match self.bump()? {
                    Token::KeyName(name) => keys.push(Expr::Value(Value::KeyName(name))),
                    Token::Ident(name) => keys.push(Expr::Ident(name)),
                    Token::String(s) => keys.push(Expr::Value(Value::String(s))),
                    other => {
                        return Err(self.error(format!(
                            "modifier map entries must be key names or keysyms, found {}",
                            other.describe()
                        )))
                    }
                }
                if self.tok == Token::Comma {
                    self.bump()?;
                }
            }
            self.expect(Token::RBrace)?;
            self.expect(Token::Semi)?;
            return Ok(Stmt::ModMap(ModMapDef {
                merge,
                modifier,
                keys,
            }));
        }

        let virt = if self.is_keyword("virtual") {
            self.bump()?;
            if !self.is_keyword("indicator") {
                return Err(self.error("expected 'indicator' after 'virtual'".to_string()));
            }
            true
        } else {
            false
        };

        if self.is_keyword("indicator") {
            self.bump()?;
            match &self.tok {
                Token::Int(_) => {
                    let Token::Int(ndx) = self.bump()? else {
                        unreachable!()
                    };
                    self.expect(Token::Equals)?;
                    let name = self.parse_expr()?;
                    self.expect(Token::Semi)?;
                    return Ok(Stmt::IndicatorName(IndicatorNameDef {
                        merge,
                        ndx,
                        name,
                        virt,
                    }));
                }
                Token::String(_) => {
                    let name = self.expect_string()?;
                    let body = self.parse_var_decl_block()?;
                    self.expect(Token::Semi)?;
                    return Ok(Stmt::IndicatorMap(IndicatorMapDef { merge, name, body }));
                }
                other => {
                    return Err(self.error(format!(
                        "expected indicator index or name, found {}",
                        other.describe()
                    )))
                }
            }
        }

        if self.is_keyword("key") {
            self.bump()?;
            let key_name = self.expect_key_name()?;
            self.expect(Token::LBrace)?;
            let body = self.parse_symbols_body()?;
            self.expect(Token::RBrace)?;
            self.expect(Token::Semi)?;
            return Ok(Stmt::Symbols(SymbolsDef {
                merge,
                key_name,
                body,
            }));
        }

        if file_type == FileType::Geometry {
            if self.is_keyword("shape") {
                return self.parse_shape_decl(merge);
            }
            if self.is_keyword("section") {
                return self.parse_section_decl(merge);
            }
            if self.is_keyword("overlay") {
                return self.parse_overlay_decl(merge).map(Stmt::Overlay);
            }
            if let Some(kind) = self.doodad_kind() {
                return self.parse_doodad_decl(merge, kind);
            }
        }

        // Fall through: a plain variable assignment or boolean.
        let var = self.parse_var_decl(merge)?;
        Ok(Stmt::Var(var))
    }

    fn parse_keycode_def(&mut self, merge: MergeMode) -> Result<Stmt> {
        let name = self.expect_key_name()?;
        self.expect(Token::Equals)?;
        let value = match self.bump()? {
            Token::Int(v) if v >= 0 => v as u32,
            other => {
                return Err(self.error(format!("expected keycode, found {}", other.describe())))
            }
        };
        self.expect(Token::Semi)?;
        Ok(Stmt::Keycode(KeycodeDef { merge, name, value }))
    }

    fn parse_vmod_decl(&mut self, merge: MergeMode) -> Result<Stmt> {
        self.bump()?;
        let mut defs = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let value = if self.tok == Token::Equals {
                self.bump()?;
                Some(self.parse_expr()?)
            } else {
                None
            };
            defs.push(VModDef { merge, name, value });
            if self.tok == Token::Comma {
                self.bump()?;
                continue;
            }
            break;
        }
        self.expect(Token::Semi)?;
        Ok(Stmt::VModList(defs))
    }

    fn parse_interp_decl(&mut self, merge: MergeMode) -> Result<Stmt> {
        self.bump()?;
        // The matched sym: an identifier, a digit keysym, or 'any'.
        let sym = match self.bump()? {
            Token::Ident(s) => s,
            Token::Int(v) => v.to_string(),
            Token::String(s) => s,
            other => {
                return Err(self.error(format!("expected keysym, found {}", other.describe())))
            }
        };
        let match_expr = if self.tok == Token::Plus {
            self.bump()?;
            Some(self.parse_expr()?)
        } else {
            None
        };
        let body = self.parse_var_decl_block()?;
        self.expect(Token::Semi)?;
        Ok(Stmt::Interp(InterpDef {
            merge,
            sym,
            match_expr,
            body,
        }))
    }

    /// `{ VarDecl* }` with each declaration terminated by `;`.
    fn parse_var_decl_block(&mut self) -> Result<Vec<VarDef>> {
        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while self.tok != Token::RBrace {
            body.push(self.parse_var_decl(MergeMode::Default)?);
        }
        self.expect(Token::RBrace)?;
        Ok(body)
    }

    fn parse_var_decl(&mut self, merge: MergeMode) -> Result<VarDef> {
        if self.tok == Token::Bang || self.tok == Token::Tilde {
            self.bump()?;
            let name = self.parse_lhs()?;
            self.expect(Token::Semi)?;
            return Ok(VarDef {
                merge,
                name: Some(name),
                value: Some(Expr::Value(Value::Bool(false))),
            });
        }
        let name = self.parse_lhs()?;
        if self.tok == Token::Equals {
            self.bump()?;
            let value = self.parse_expr()?;
            self.expect(Token::Semi)?;
            Ok(VarDef {
                merge,
                name: Some(name),
                value: Some(value),
            })
        } else {
            self.expect(Token::Semi)?;
            Ok(VarDef {
                merge,
                name: Some(name),
                value: Some(Expr::Value(Value::Bool(true))),
            })
        }
    }

    /// `element.field[index]` in any partial combination.
    fn parse_lhs(&mut self) -> Result<Expr> {
        let first = self.expect_ident()?;
        if self.tok == Token::Dot {
            self.bump()?;
            let field = self.expect_ident()?;
            if self.tok == Token::LBracket {
                self.bump()?;
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                return Ok(Expr::ArrayRef {
                    element: Some(first),
                    field,
                    index: Box::new(index),
                });
            }
            return Ok(Expr::FieldRef {
                element: first,
                field,
            });
        }
        if self.tok == Token::LBracket {
            self.bump()?;
            let index = self.parse_expr()?;
            self.expect(Token::RBracket)?;
            return Ok(Expr::ArrayRef {
                element: None,
                field: first,
                index: Box::new(index),
            });
        }
        Ok(Expr::Ident(first))
    }

    /// Key bodies are comma-separated; anonymous `[...]` entries are
    /// symbol or action lists for the next free group.
    fn parse_symbols_body(&mut self) -> Result<Vec<VarDef>> {
        let mut body = Vec::new();
        if self.tok == Token::RBrace {
            return Ok(body);
        }
        loop {
            body.push(self.parse_symbols_item()?);
            if self.tok == Token::Comma {
                self.bump()?;
                continue;
            }
            return Ok(body);
        }
    }

    fn parse_symbols_item(&mut self) -> Result<VarDef> {
        if self.tok == Token::LBracket {
            let value = self.parse_bracketed_list()?;
            return Ok(VarDef {
                merge: MergeMode::Default,
                name: None,
                value: Some(value),
            });
        }
        if self.tok == Token::Bang || self.tok == Token::Tilde {
            self.bump()?;
            let name = self.parse_lhs()?;
            return Ok(VarDef {
                merge: MergeMode::Default,
                name: Some(name),
                value: Some(Expr::Value(Value::Bool(false))),
            });
        }
        let name = self.parse_lhs()?;
        if self.tok == Token::Equals {
            self.bump()?;
            let value = if self.tok == Token::LBracket {
                self.parse_bracketed_list()?
            } else {
                self.parse_expr()?
            };
            Ok(VarDef {
                merge: MergeMode::Default,
                name: Some(name),
                value: Some(value),
            })
        } else {
            Ok(VarDef {
                merge: MergeMode::Default,
                name: Some(name),
                value: Some(Expr::Value(Value::Bool(true))),
            })
        }
    }

    /// `[ ... ]` — keysym list or action list, told apart by the first
    /// element.
    fn parse_bracketed_list(&mut self) -> Result<Expr> {
        self.expect(Token::LBracket)?;
        if self.tok == Token::RBracket {
            self.bump()?;
            return Ok(Expr::KeysymList(Vec::new()));
        }

        // Actions look like Name(...), keysyms are bare names/numbers.
        let mut keysyms = Vec::new();
        let mut actions = Vec::new();
        let mut is_actions = false;
        let mut first = true;
        loop {
            match self.bump()? {
                Token::Ident(name) if self.tok == Token::LParen => {
                    if !first && !is_actions {
                        return Err(
                            self.error("cannot mix keysyms and actions in a list".to_string())
                        );
                    }
                    is_actions = true;
                    actions.push(self.parse_action_call(name)?);
                }
                Token::Ident(name) => {
                    if is_actions {
                        return Err(
                            self.error("cannot mix keysyms and actions in a list".to_string())
                        );
                    }
                    keysyms.push(name);
                }
                Token::Int(v) => {
                    if is_actions {
                        return Err(
                            self.error("cannot mix keysyms and actions in a list".to_string())
                        );
                    }
                    keysyms.push(v.to_string());
                }
                Token::String(s) => {
                    if is_actions {
                        return Err(
                            self.error("cannot mix keysyms and actions in a list".to_string())
                        );
                    }
                    keysyms.push(s);
                }
                other => {
                    return Err(self.error(format!(
                        "expected keysym or action, found {}",
                        other.describe()
                    )))
                }
            }
            first = false;
            match self.tok {
                Token::Comma => {
                    self.bump()?;
                }
                Token::RBracket => {
                    self.bump()?;
                    return Ok(if is_actions {
                        Expr::ActionList(actions)
                    } else {
                        Expr::KeysymList(keysyms)
                    });
                }
                _ => {
                    return Err(self.error(format!(
                        "expected ',' or ']', found {}",
                        self.tok.describe()
                    )))
                }
            }
        }
    }

    fn parse_action_call(&mut self, name: String) -> Result<Expr> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while self.tok != Token::RParen {
            let arg = self.parse_action_arg()?;
            args.push(arg);
            if self.tok == Token::Comma {
                self.bump()?;
            }
        }
        self.expect(Token::RParen)?;
        Ok(Expr::Action { name, args })
    }

    fn parse_action_arg(&mut self) -> Result<Expr> {
        if self.tok == Token::Bang || self.tok == Token::Tilde {
            let op = if self.tok == Token::Bang {
                UnOp::Not
            } else {
                UnOp::Invert
            };
            self.bump()?;
            let inner = self.parse_expr()?;
            return Ok(Expr::Unary(op, Box::new(inner)));
        }
        let lhs = self.parse_expr()?;
        if self.tok == Token::Equals {
            self.bump()?;
            let rhs = self.parse_expr()?;
            return Ok(Expr::Binary(BinOp::Assign, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    // Expressions: + and - over * and / over unary over primary.
    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul_expr()?;
        loop {
            let op = match self.tok {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Subtract,
                _ => return Ok(lhs),
            };
            self.bump()?;
            let rhs = self.parse_mul_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_mul_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let op = match self.tok {
                Token::Star => BinOp::Multiply,
                Token::Slash => BinOp::Divide,
                _ => return Ok(lhs),
            };
            self.bump()?;
            let rhs = self.parse_unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        let op = match self.tok {
            Token::Minus => Some(UnOp::Negate),
            Token::Plus => Some(UnOp::UnaryPlus),
            Token::Bang => Some(UnOp::Not),
            Token::Tilde => Some(UnOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.bump()?;
            let inner = self.parse_unary_expr()?;
            return Ok(Expr::Unary(op, Box::new(inner)));
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        match self.bump()? {
            Token::Int(v) => Ok(Expr::Value(Value::Int(v))),
            Token::Float(v) => Ok(Expr::Value(Value::Float(v))),
            Token::String(s) => Ok(Expr::Value(Value::String(s))),
            Token::KeyName(s) => Ok(Expr::Value(Value::KeyName(s))),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.tok == Token::LParen {
                    return self.parse_action_call(name);
                }
                if self.tok == Token::Dot {
                    self.bump()?;
                    let field = self.expect_ident()?;
                    if self.tok == Token::LBracket {
                        self.bump()?;
                        let index = self.parse_expr()?;
                        self.expect(Token::RBracket)?;
                        return Ok(Expr::ArrayRef {
                            element: Some(name),
                            field,
                            index: Box::new(index),
                        });
                    }
                    return Ok(Expr::FieldRef {
                        element: name,
                        field,
                    });
                }
                if self.tok == Token::LBracket {
                    self.bump()?;
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    return Ok(Expr::ArrayRef {
                        element: None,
                        field: name,
                        index: Box::new(index),
                    });
                }
                Ok(Expr::Ident(name))
            }
            other => Err(self.error(format!("unexpected {} in expression", other.describe()))),
        }
    }

    // Geometry productions.

    fn doodad_kind(&self) -> Option<DoodadKind> {
        if self.is_keyword("text") {
            Some(DoodadKind::Text)
        } else if self.is_keyword("outline") {
            Some(DoodadKind::Outline)
        } else if self.is_keyword("solid") {
            Some(DoodadKind::Solid)
        } else if self.is_keyword("logo") {
            Some(DoodadKind::Logo)
        } else {
            None
        }
    }

    fn parse_shape_decl(&mut self, merge: MergeMode) -> Result<Stmt> {
        self.bump()?;
        let name = self.expect_string()?;
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();
        loop {
            if self.tok == Token::LBrace {
                items.push(ShapeItem::Outline {
                    tag: None,
                    points: self.parse_outline_points()?,
                });
            } else {
                let lhs = self.parse_lhs()?;
                if self.tok == Token::Equals {
                    self.bump()?;
                    if self.tok == Token::LBrace {
                        let tag = match &lhs {
                            Expr::Ident(name) => Some(name.clone()),
                            _ => None,
                        };
                        items.push(ShapeItem::Outline {
                            tag,
                            points: self.parse_outline_points()?,
                        });
                    } else {
                        let value = self.parse_expr()?;
                        items.push(ShapeItem::Var(VarDef {
                            merge: MergeMode::Default,
                            name: Some(lhs),
                            value: Some(value),
                        }));
                    }
                } else {
                    items.push(ShapeItem::Var(VarDef {
                        merge: MergeMode::Default,
                        name: Some(lhs),
                        value: Some(Expr::Value(Value::Bool(true))),
                    }));
                }
            }
            if self.tok == Token::Comma {
                self.bump()?;
                continue;
            }
            break;
        }
        self.expect(Token::RBrace)?;
        self.expect(Token::Semi)?;
        Ok(Stmt::Shape(ShapeDef { merge, name, items }))
    }

    fn parse_outline_points(&mut self) -> Result<Vec<(i16, i16)>> {
        self.expect(Token::LBrace)?;
        let mut points = Vec::new();
        while self.tok != Token::RBrace {
            self.expect(Token::LBracket)?;
            let x = self.parse_coord()?;
            self.expect(Token::Comma)?;
            let y = self.parse_coord()?;
            self.expect(Token::RBracket)?;
            points.push((x, y));
            if self.tok == Token::Comma {
                self.bump()?;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(points)
    }

    /// Millimetres in the source; tenths of a millimetre in the tree.
    fn parse_coord(&mut self) -> Result<i16> {
        let negate = if self.tok == Token::Minus {
            self.bump()?;
            true
        } else {
            false
        };
        let value = match self.bump()? {
            Token::Int(v) => v * 10,
            Token::Float(v) => v,
            other => {
                return Err(self.error(format!("expected coordinate, found {}", other.describe())))
            }
        };
        let value = if negate { -value } else { value };
        Ok(value as i16)
    }

    fn parse_section_decl(&mut self, merge: MergeMode) -> Result<Stmt> {
        self.bump()?;
        let name = self.expect_string()?;
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();
        while self.tok != Token::RBrace {
            if self.is_keyword("row") {
                self.bump()?;
                self.expect(Token::LBrace)?;
                let mut row_items = Vec::new();
                while self.tok != Token::RBrace {
                    if self.is_keyword("keys") {
                        self.bump()?;
                        row_items.push(RowItem::Keys(self.parse_geom_keys()?));
                        self.expect(Token::Semi)?;
                    } else {
                        row_items.push(RowItem::Var(self.parse_var_decl(MergeMode::Default)?));
                    }
                }
                self.expect(Token::RBrace)?;
                self.expect(Token::Semi)?;
                items.push(SectionItem::Row(RowDef { items: row_items }));
            } else if self.is_keyword("overlay") {
                let overlay = self.parse_overlay_decl(MergeMode::Default)?;
                items.push(SectionItem::Overlay(overlay));
            } else if self.is_keyword("indicator") {
                self.bump()?;
                let name = self.expect_string()?;
                let body = self.parse_var_decl_block()?;
                self.expect(Token::Semi)?;
                items.push(SectionItem::Doodad(DoodadDef {
                    merge: MergeMode::Default,
                    kind: DoodadKind::Indicator,
                    name,
                    body,
                }));
            } else if let Some(kind) = self.doodad_kind() {
                let Stmt::Doodad(doodad) = self.parse_doodad_decl(MergeMode::Default, kind)? else {
                    unreachable!()
                };
                items.push(SectionItem::Doodad(doodad));
            } else {
                items.push(SectionItem::Var(self.parse_var_decl(MergeMode::Default)?));
            }
        }
        self.expect(Token::RBrace)?;
        self.expect(Token::Semi)?;
        Ok(Stmt::Section(SectionDef { merge, name, items }))
    }

    fn parse_geom_keys(&mut self) -> Result<Vec<GeomKeyDef>> {
        self.expect(Token::LBrace)?;
        let mut keys = Vec::new();
        while self.tok != Token::RBrace {
            if let Token::KeyName(_) = self.tok {
                let name = self.expect_key_name()?;
                keys.push(GeomKeyDef {
                    name: Some(name),
                    exprs: Vec::new(),
                });
            } else if self.tok == Token::LBrace {
                self.bump()?;
                let mut exprs = Vec::new();
                while self.tok != Token::RBrace {
                    exprs.push(self.parse_action_arg()?);
                    if self.tok == Token::Comma {
                        self.bump()?;
                    }
                }
                self.expect(Token::RBrace)?;
                keys.push(GeomKeyDef { name: None, exprs });
            } else {
                return Err(self.error(format!(
                    "expected key name or braced key, found {}",
                    self.tok.describe()
                )));
            }
            if self.tok == Token::Comma {
                self.bump()?;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(keys)
    }

    fn parse_doodad_decl(&mut self, merge: MergeMode, kind: DoodadKind) -> Result<Stmt> {
        self.bump()?;
        let name = self.expect_string()?;
        let body = self.parse_var_decl_block()?;
        self.expect(Token::Semi)?;
        Ok(Stmt::Doodad(DoodadDef {
            merge,
            kind,
            name,
            body,
        }))
    }

    fn parse_overlay_decl(&mut self, merge: MergeMode) -> Result<OverlayDef> {
        self.bump()?;
        let name = match self.bump()? {
            Token::String(s) => s,
            Token::Ident(s) => s,
            other => {
                return Err(
                    self.error(format!("expected overlay name, found {}", other.describe()))
                )
            }
        };
        self.expect(Token::LBrace)?;
        let mut keys = Vec::new();
        while self.tok != Token::RBrace {
            let over = self.expect_key_name()?;
            self.expect(Token::Equals)?;
            let under = self.expect_key_name()?;
            keys.push((over, under));
            if self.tok == Token::Comma {
                self.bump()?;
            }
        }
        self.expect(Token::RBrace)?;
        self.expect(Token::Semi)?;
        Ok(OverlayDef { merge, name, keys })
    }
}

/// Split an include string into its `file(map):group` fragments.  Within
/// one string, the separator before each fragment decides how it merges
/// into the accumulated unit: `+` augments, `|` overrides.  The first
/// fragment takes the statement's own merge mode.  Returns `None` on a
/// malformed string or on more than one self-reference.
pub fn parse_include_chain(text: &str, stmt_merge: MergeMode) -> Option<Vec<IncludeFragment>> {
    let mut chain = Vec::new();
    let mut merge = stmt_merge;
    let mut have_self = false;
    let mut rest = text;

    loop {
        let split = rest.find(['+', '|']);
        let (piece, next) = match split {
            Some(pos) => {
                let (piece, tail) = rest.split_at(pos);
                (piece, Some(tail))
            }
            None => (rest, None),
        };

        let fragment = parse_include_fragment(piece, merge)?;
        if fragment.is_self_reference() {
            if have_self {
                return None;
            }
            have_self = true;
        }
        chain.push(fragment);

        match next {
            None => break,
            Some(tail) => {
                let mut tail_chars = tail.chars();
                merge = match tail_chars.next() {
                    Some('+') => MergeMode::Augment,
                    Some('|') => MergeMode::Override,
                    _ => return None,
                };
                rest = tail_chars.as_str();
            }
        }
    }

    if chain.is_empty() {
        None
    } else {
        Some(chain)
    }
}

fn parse_include_fragment(piece: &str, merge: MergeMode) -> Option<IncludeFragment> {
    let piece = piece.trim();
    let (body, group) = match piece.rsplit_once(':') {
        Some((body, group_text)) => {
            let group: u8 = group_text.parse().ok()?;
            if !(1..=crate::keymap::NUM_GROUPS as u8).contains(&group) {
                return None;
            }
            (body, Some(group))
        }
        None => (piece, None),
    };

    let (file, map) = match body.find('(') {
        Some(pos) => {
            let (file, rest) = body.split_at(pos);
            let rest = rest.strip_prefix('(')?;
            let map = rest.strip_suffix(')')?;
            if map.contains('(') {
                return None;
            }
            (
                file.to_string(),
                if map.is_empty() {
                    None
                } else {
                    Some(map.to_string())
                },
            )
        }
        None => (body.to_string(), None),
    };

    Some(IncludeFragment {
        merge,
        file,
        map,
        group,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(source: &str) -> Vec<XkbFile> {
        let mut ctx = Context::new();
        Parser::new(source, "test")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap()
    }

    #[test]
    fn minimal_keycodes_section() {
        let files = parse(
            r#"xkb_keycodes "evdev" {
                minimum = 8;
                maximum = 255;
                <ESC> = 9;
                alias <MENU> = <COMP>;
                indicator 1 = "Caps Lock";
            };"#,
        );
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, FileType::KeyNames);
        assert_eq!(files[0].name, "evdev");
        assert_eq!(files[0].defs.len(), 5);
        assert!(matches!(&files[0].defs[2], Stmt::Keycode(def) if def.name == "ESC" && def.value == 9));
        assert!(matches!(&files[0].defs[4], Stmt::IndicatorName(def) if def.ndx == 1));
    }

    #[test]
    fn keymap_container() {
        let files = parse(
            r#"xkb_keymap "test" {
                xkb_keycodes { <AA> = 10; };
                xkb_symbols { key <AA> { [ a, A ] }; };
            };"#,
        );
        assert_eq!(files[0].file_type, FileType::Keymap);
        assert_eq!(files[0].defs.len(), 2);
        let Stmt::File(symbols) = &files[0].defs[1] else {
            panic!("expected nested file");
        };
        assert_eq!(symbols.file_type, FileType::Symbols);
    }

    #[test]
    fn key_with_groups_and_actions() {
        let files = parse(
            r#"xkb_symbols "us" {
                key <LFSH> {
                    type = "TWO_LEVEL",
                    symbols[Group1] = [ Shift_L ],
                    actions[Group1] = [ SetMods(modifiers=Shift, clearLocks) ],
                    repeat = false
                };
            };"#,
        );
        let Stmt::Symbols(def) = &files[0].defs[0] else {
            panic!("expected symbols def");
        };
        assert_eq!(def.key_name, "LFSH");
        assert_eq!(def.body.len(), 4);
        let actions = def
            .body
            .iter()
            .find_map(|var| match (&var.name, &var.value) {
                (Some(Expr::ArrayRef { field, .. }), Some(Expr::ActionList(list)))
                    if field == "actions" =>
                {
                    Some(list)
                }
                _ => None,
            })
            .expect("actions entry");
        assert_eq!(actions.len(), 1);
        let Expr::Action { name, args } = &actions[0] else {
            panic!("expected action");
        };
        assert_eq!(name, "SetMods");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn type_with_maps() {
        let files = parse(
            r#"xkb_types "basic" {
                virtual_modifiers NumLock, Alt;
                type "ALPHABETIC" {
                    modifiers = Shift + Lock;
                    map[Shift] = Level2;
                    preserve[Lock] = Lock;
                    level_name[Level1] = "Base";
                    level_name[Level2] = "Caps";
                };
            };"#,
        );
        assert!(matches!(&files[0].defs[0], Stmt::VModList(defs) if defs.len() == 2));
        let Stmt::KeyType(def) = &files[0].defs[1] else {
            panic!("expected type def");
        };
        assert_eq!(def.name, "ALPHABETIC");
        assert_eq!(def.body.len(), 5);
    }

    #[test]
    fn interp_with_predicate() {
        let files = parse(
            r#"xkb_compat "basic" {
                interpret Shift_L+AnyOf(Shift+Lock) {
                    action = SetMods(modifiers=Shift);
                };
                indicator "Caps Lock" { modifiers = Lock; };
                group 2 = AltGr;
            };"#,
        );
        assert_eq!(files[0].defs.len(), 3);
        let Stmt::Interp(interp) = &files[0].defs[0] else {
            panic!("expected interp");
        };
        assert_eq!(interp.sym, "Shift_L");
        assert!(interp.match_expr.is_some());
    }

    #[test]
    fn include_chain_modes() {
        let chain = parse_include_chain("us(basic)+de:2|fr", MergeMode::Default).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].file, "us");
        assert_eq!(chain[0].map.as_deref(), Some("basic"));
        assert_eq!(chain[0].merge, MergeMode::Default);
        assert_eq!(chain[1].file, "de");
        assert_eq!(chain[1].group, Some(2));
        assert_eq!(chain[1].merge, MergeMode::Augment);
        assert_eq!(chain[2].file, "fr");
        assert_eq!(chain[2].merge, MergeMode::Override);
    }

    #[test]
    fn include_statement_in_section() {
        let files = parse(r#"xkb_symbols "pc105" { include "pc+us|inet(evdev)"; };"#);
        let Stmt::Include(inc) = &files[0].defs[0] else {
            panic!("expected include");
        };
        assert_eq!(inc.chain.len(), 3);
        assert_eq!(inc.chain[2].map.as_deref(), Some("evdev"));
    }

    #[test]
    fn geometry_section() {
        let files = parse(
            r#"xkb_geometry "pc" {
                description = "Generic 105";
                width = 470;
                height = 180;
                shape "NORM" { cornerRadius = 1, { [0, 0], [18, 18] } };
                section "Alpha" {
                    top = 10;
                    row {
                        top = 1;
                        keys { <TLDE>, { <AE01>, 19 } };
                    };
                };
                text "Label" { text = "hi"; };
            };"#,
        );
        let defs = &files[0].defs;
        assert!(matches!(&defs[3], Stmt::Shape(shape) if shape.name == "NORM"));
        let Stmt::Section(section) = &defs[4] else {
            panic!("expected section");
        };
        assert_eq!(section.name, "Alpha");
        assert!(matches!(&defs[5], Stmt::Doodad(d) if d.kind == DoodadKind::Text));
    }

    #[test]
    fn bad_syntax_reports_line() {
        let mut ctx = Context::new();
        let err = Parser::new("xkb_keycodes \"x\" {\n  <ESC> 9;\n};", "broken")
            .unwrap()
            .parse_files(&mut ctx)
            .unwrap_err();
        match err {
            Error::Parse { file, line, .. } => {
                assert_eq!(file, "broken");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn merge_prefixes() {
        let files = parse(
            r#"xkb_keycodes "x" {
                override <A> = 10;
                alternate <B> = 10;
            };"#,
        );
        assert!(matches!(&files[0].defs[0], Stmt::Keycode(def) if def.merge == MergeMode::Override));
        assert!(matches!(&files[0].defs[1], Stmt::Keycode(def) if def.merge == MergeMode::AltForm));
    }
}
