//! Recursive-descent parser for the supported C subset.
//!
//! Consumes the token stream produced by [`crate::lexer`] and builds a
//! [`Unit`]. Expressions are parsed by precedence climbing. The parser keeps
//! a running set of typedef names (seeded with the built-in `FILE` and
//! `size_t`) so declarations that start with a typedef name are recognized
//! without a separate pass.
//!
//! Constructs that are valid C but outside the subset (casts, indirect calls,
//! static locals, tagged typedef definitions) are rejected with
//! [`ParseError::Unsupported`] rather than misparsed.

use std::collections::HashSet;

use umbra_utils::errors::ParseError;

use crate::ast::{
    AssignOp, BinaryOp, CType, Decl, EnumDef, EnumVariant, Expr, Field, ForInit, Function, Init,
    Param, Stmt, StructDef, SwitchCase, Typedef, TypedefKind, UnaryOp, Unit, VarDecl,
};
use crate::lexer::lex;
use crate::token::{Loc, Token, TokenKind};

/// Typedef names every unit starts with, mirroring the built-in symbol set.
const BUILTIN_TYPEDEFS: &[&str] = &["FILE", "size_t"];

/// Parses one translation unit.
///
/// # Arguments
/// * `source` - the full text of the unit
/// * `file` - file name used in diagnostics
///
/// # Returns
/// The parsed [`Unit`], or the first [`ParseError`] encountered.
pub fn parse_unit(source: &str, file: &str) -> Result<Unit, ParseError> {
    let tokens = lex(source, file)?;
    let mut parser = Parser::new(tokens, file);
    let unit = parser.parse_unit()?;
    tracing::debug!(
        file,
        includes = unit.includes.len(),
        decls = unit.decls.len(),
        "parsed translation unit"
    );
    Ok(unit)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    typedefs: HashSet<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>, file: &str) -> Self {
        Parser {
            tokens,
            pos: 0,
            file: file.to_string(),
            typedefs: BUILTIN_TYPEDEFS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn loc(&self) -> Loc {
        self.tokens[self.pos.min(self.tokens.len() - 1)].loc
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token if it equals `kind`.
    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.peek() == kind {
            Ok(self.bump())
        } else {
            Err(self.err_expected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Loc), ParseError> {
        if !matches!(self.peek(), TokenKind::Ident(_)) {
            return Err(self.err_expected(what));
        }
        let token = self.bump();
        match token.kind {
            TokenKind::Ident(name) => Ok((name, token.loc)),
            _ => Err(self.err_expected(what)),
        }
    }

    fn err_expected(&self, expected: &str) -> ParseError {
        let loc = self.loc();
        ParseError::Syntax {
            file: self.file.clone(),
            line: loc.line,
            col: loc.col,
            expected: expected.to_string(),
            found: self.peek().to_string(),
        }
    }

    fn unsupported(&self, loc: Loc, construct: impl Into<String>) -> ParseError {
        ParseError::Unsupported {
            file: self.file.clone(),
            line: loc.line,
            col: loc.col,
            construct: construct.into(),
        }
    }

    /// Whether the token at `offset` can begin a type name.
    fn is_type_token_at(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            TokenKind::KwVoid
            | TokenKind::KwInt
            | TokenKind::KwChar
            | TokenKind::KwUnsigned
            | TokenKind::KwConst
            | TokenKind::KwStruct
            | TokenKind::KwEnum => true,
            TokenKind::Ident(name) => self.typedefs.contains(name),
            _ => false,
        }
    }

    /// Whether the upcoming tokens begin a declaration rather than an
    /// expression statement. A typedef name only counts when followed by a
    /// declarator, so `rect = ...;` still parses as an assignment even if
    /// `rect` collides with a typedef elsewhere.
    fn is_decl_start(&self) -> bool {
        match self.peek() {
            TokenKind::KwVoid
            | TokenKind::KwInt
            | TokenKind::KwChar
            | TokenKind::KwUnsigned
            | TokenKind::KwConst
            | TokenKind::KwStatic
            | TokenKind::KwStruct
            | TokenKind::KwEnum => true,
            TokenKind::Ident(name) => {
                self.typedefs.contains(name)
                    && matches!(self.peek_at(1), TokenKind::Ident(_) | TokenKind::Star)
            }
            _ => false,
        }
    }

    // ---- declarations ----

    fn parse_unit(&mut self) -> Result<Unit, ParseError> {
        let mut includes = Vec::new();
        let mut decls = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::HashInclude(_) => {
                    if let TokenKind::HashInclude(target) = self.bump().kind {
                        includes.push(target);
                    }
                }
                TokenKind::KwTypedef => decls.push(self.parse_typedef()?),
                TokenKind::KwStruct
                    if matches!(self.peek_at(1), TokenKind::Ident(_))
                        && self.peek_at(2) == &TokenKind::LBrace =>
                {
                    decls.push(self.parse_struct_def()?);
                }
                TokenKind::KwEnum
                    if self.peek_at(1) == &TokenKind::LBrace
                        || (matches!(self.peek_at(1), TokenKind::Ident(_))
                            && self.peek_at(2) == &TokenKind::LBrace) =>
                {
                    decls.push(self.parse_enum_def()?);
                }
                _ => self.parse_top_decl(&mut decls)?,
            }
        }
        Ok(Unit {
            file: self.file.clone(),
            includes,
            decls,
        })
    }

    fn parse_typedef(&mut self) -> Result<Decl, ParseError> {
        let kw_loc = self.loc();
        self.bump();
        if self.peek() == &TokenKind::KwStruct && self.peek_at(1) == &TokenKind::LBrace {
            self.bump();
            self.bump();
            let fields = self.parse_fields()?;
            let (name, loc) = self.expect_ident("a typedef name")?;
            self.expect(&TokenKind::Semi, "`;`")?;
            self.typedefs.insert(name.clone());
            return Ok(Decl::Typedef(Typedef {
                name,
                underlying: TypedefKind::InlineStruct(fields),
                loc,
            }));
        }
        if self.peek() == &TokenKind::KwStruct
            && matches!(self.peek_at(1), TokenKind::Ident(_))
            && self.peek_at(2) == &TokenKind::LBrace
        {
            return Err(self.unsupported(kw_loc, "typedef of a tagged struct definition"));
        }
        let base = self.parse_type_spec()?;
        let mut ty = base;
        while self.eat(&TokenKind::Star) {
            ty = CType::Pointer(Box::new(ty));
        }
        let (name, loc) = self.expect_ident("a typedef name")?;
        if self.peek() == &TokenKind::LBracket {
            return Err(self.unsupported(loc, "array typedef"));
        }
        self.expect(&TokenKind::Semi, "`;`")?;
        self.typedefs.insert(name.clone());
        Ok(Decl::Typedef(Typedef {
            name,
            underlying: TypedefKind::Plain(ty),
            loc,
        }))
    }

    fn parse_struct_def(&mut self) -> Result<Decl, ParseError> {
        self.bump();
        let (tag, loc) = self.expect_ident("a struct tag")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let fields = self.parse_fields()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Struct(StructDef { tag, fields, loc }))
    }

    /// Parses struct fields up to and including the closing brace.
    fn parse_fields(&mut self) -> Result<Vec<Field>, ParseError> {
        let mut fields = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            let base = self.parse_type_spec()?;
            loop {
                let (name, ty, loc) = self.parse_declarator(base.clone())?;
                fields.push(Field { name, ty, loc });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::Semi, "`;`")?;
        }
        Ok(fields)
    }

    fn parse_enum_def(&mut self) -> Result<Decl, ParseError> {
        let loc = self.loc();
        self.bump();
        let tag = if matches!(self.peek(), TokenKind::Ident(_)) {
            Some(self.expect_ident("an enum tag")?.0)
        } else {
            None
        };
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut variants = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            let (name, vloc) = self.expect_ident("an enum constant")?;
            let value = if self.eat(&TokenKind::Eq) {
                Some(self.parse_ternary()?)
            } else {
                None
            };
            variants.push(EnumVariant {
                name,
                value,
                loc: vloc,
            });
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "`}`")?;
                break;
            }
        }
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Enum(EnumDef { tag, variants, loc }))
    }

    /// Parses a function definition, prototype, or global variable line.
    fn parse_top_decl(&mut self, decls: &mut Vec<Decl>) -> Result<(), ParseError> {
        let is_static = self.eat(&TokenKind::KwStatic);
        let base = self.parse_type_spec()?;
        let mut ty = base.clone();
        while self.eat(&TokenKind::Star) {
            ty = CType::Pointer(Box::new(ty));
        }
        let (name, loc) = self.expect_ident("a declarator name")?;

        if self.eat(&TokenKind::LParen) {
            let (params, variadic) = self.parse_params()?;
            let body = match self.peek() {
                TokenKind::Semi => {
                    self.bump();
                    None
                }
                TokenKind::LBrace => {
                    self.bump();
                    Some(self.parse_block_items()?)
                }
                _ => return Err(self.err_expected("`;` or a function body")),
            };
            decls.push(Decl::Function(Function {
                name,
                ret: ty,
                params,
                variadic,
                body,
                is_static,
                loc,
            }));
            return Ok(());
        }

        let ty = self.parse_array_suffix(ty)?;
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_init()?)
        } else {
            None
        };
        decls.push(Decl::Global(VarDecl {
            name,
            ty,
            init,
            is_static,
            loc,
        }));
        while self.eat(&TokenKind::Comma) {
            let (name, ty, loc) = self.parse_declarator(base.clone())?;
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_init()?)
            } else {
                None
            };
            decls.push(Decl::Global(VarDecl {
                name,
                ty,
                init,
                is_static,
                loc,
            }));
        }
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(())
    }

    /// Parses a parameter list after the opening paren, consuming `)`.
    fn parse_params(&mut self) -> Result<(Vec<Param>, bool), ParseError> {
        if self.eat(&TokenKind::RParen) {
            return Ok((Vec::new(), false));
        }
        if self.peek() == &TokenKind::KwVoid && self.peek_at(1) == &TokenKind::RParen {
            self.bump();
            self.bump();
            return Ok((Vec::new(), false));
        }
        let mut params = Vec::new();
        let mut variadic = false;
        loop {
            if self.eat(&TokenKind::Ellipsis) {
                variadic = true;
                self.expect(&TokenKind::RParen, "`)`")?;
                break;
            }
            let base = self.parse_type_spec()?;
            let mut ty = base;
            while self.eat(&TokenKind::Star) {
                ty = CType::Pointer(Box::new(ty));
            }
            let (name, loc) = if matches!(self.peek(), TokenKind::Ident(_)) {
                let (n, l) = self.expect_ident("a parameter name")?;
                (Some(n), l)
            } else {
                (None, self.loc())
            };
            let ty = self.parse_array_suffix(ty)?;
            params.push(Param { name, ty, loc });
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "`)`")?;
                break;
            }
        }
        Ok((params, variadic))
    }

    /// Parses `[static] const? base`, wrapping a leading `const` around the
    /// base type.
    fn parse_type_spec(&mut self) -> Result<CType, ParseError> {
        let is_const = self.eat(&TokenKind::KwConst);
        let loc = self.loc();
        let base = match self.peek().clone() {
            TokenKind::KwVoid => {
                self.bump();
                CType::Void
            }
            TokenKind::KwInt => {
                self.bump();
                CType::Int
            }
            TokenKind::KwChar => {
                self.bump();
                CType::Char
            }
            TokenKind::KwUnsigned => {
                self.bump();
                if self.eat(&TokenKind::KwChar) {
                    CType::UChar
                } else {
                    return Err(
                        self.unsupported(loc, "`unsigned` with a base type other than `char`")
                    );
                }
            }
            TokenKind::KwStruct => {
                self.bump();
                let (tag, _) = self.expect_ident("a struct tag")?;
                CType::Struct(tag)
            }
            TokenKind::KwEnum => {
                self.bump();
                let (tag, _) = self.expect_ident("an enum tag")?;
                CType::Enum(tag)
            }
            TokenKind::Ident(name) if self.typedefs.contains(&name) => {
                self.bump();
                CType::Named(name)
            }
            _ => return Err(self.err_expected("a type name")),
        };
        Ok(if is_const {
            CType::Const(Box::new(base))
        } else {
            base
        })
    }

    /// Parses `'*'* name ('[' len? ']')*` on top of `base`.
    fn parse_declarator(&mut self, base: CType) -> Result<(String, CType, Loc), ParseError> {
        let mut ty = base;
        while self.eat(&TokenKind::Star) {
            if self.peek() == &TokenKind::KwConst {
                return Err(self.unsupported(self.loc(), "`const` pointer declarator"));
            }
            ty = CType::Pointer(Box::new(ty));
        }
        let (name, loc) = self.expect_ident("a declarator name")?;
        let ty = self.parse_array_suffix(ty)?;
        Ok((name, ty, loc))
    }

    /// Parses zero or more array suffixes. `int m[2][3]` nests so the outer
    /// array has length 2 and each element is `int[3]`.
    fn parse_array_suffix(&mut self, mut ty: CType) -> Result<CType, ParseError> {
        let mut dims = Vec::new();
        while self.eat(&TokenKind::LBracket) {
            if self.eat(&TokenKind::RBracket) {
                dims.push(None);
                continue;
            }
            let loc = self.loc();
            match self.peek().clone() {
                TokenKind::Int(v) if v >= 0 => {
                    self.bump();
                    self.expect(&TokenKind::RBracket, "`]`")?;
                    dims.push(Some(v as usize));
                }
                _ => return Err(self.unsupported(loc, "non-literal array length")),
            }
        }
        for dim in dims.into_iter().rev() {
            ty = CType::Array(Box::new(ty), dim);
        }
        Ok(ty)
    }

    /// Parses one line of local declarations into `out`, one [`Stmt::Local`]
    /// per declarator.
    fn parse_local_decls(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        if self.peek() == &TokenKind::KwStatic {
            return Err(self.unsupported(self.loc(), "static local variable"));
        }
        let decls = self.parse_var_decl_list()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        out.extend(decls.into_iter().map(|decl| Stmt::Local { decl }));
        Ok(())
    }

    /// Parses `type declarator (= init)? (, declarator (= init)?)*` without
    /// consuming the terminator. Shared by local declarations and `for` init
    /// clauses.
    fn parse_var_decl_list(&mut self) -> Result<Vec<VarDecl>, ParseError> {
        let base = self.parse_type_spec()?;
        let mut decls = Vec::new();
        loop {
            let (name, ty, loc) = self.parse_declarator(base.clone())?;
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_init()?)
            } else {
                None
            };
            decls.push(VarDecl {
                name,
                ty,
                init,
                is_static: false,
                loc,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_init(&mut self) -> Result<Init, ParseError> {
        if !self.eat(&TokenKind::LBrace) {
            return Ok(Init::Expr(self.parse_assign()?));
        }
        let mut items = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Init::List(items));
        }
        loop {
            items.push(self.parse_init()?);
            if self.eat(&TokenKind::Comma) {
                if self.eat(&TokenKind::RBrace) {
                    break;
                }
            } else {
                self.expect(&TokenKind::RBrace, "`}`")?;
                break;
            }
        }
        Ok(Init::List(items))
    }

    // ---- statements ----

    /// Parses block items up to and including the closing brace.
    fn parse_block_items(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.peek() == &TokenKind::Eof {
                return Err(self.err_expected("`}`"));
            }
            if self.is_decl_start() {
                self.parse_local_decls(&mut stmts)?;
            } else {
                stmts.push(self.parse_stmt()?);
            }
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.loc();
        match self.peek() {
            TokenKind::LBrace => {
                self.bump();
                let stmts = self.parse_block_items()?;
                Ok(Stmt::Block { stmts, loc })
            }
            TokenKind::KwIf => {
                self.bump();
                self.expect(&TokenKind::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.eat(&TokenKind::KwElse) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    loc,
                })
            }
            TokenKind::KwWhile => {
                self.bump();
                self.expect(&TokenKind::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body, loc })
            }
            TokenKind::KwDo => {
                self.bump();
                let body = Box::new(self.parse_stmt()?);
                self.expect(&TokenKind::KwWhile, "`while`")?;
                self.expect(&TokenKind::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::DoWhile { body, cond, loc })
            }
            TokenKind::KwFor => {
                self.bump();
                self.expect(&TokenKind::LParen, "`(`")?;
                let init = if self.eat(&TokenKind::Semi) {
                    None
                } else if self.is_decl_start() {
                    let decls = self.parse_var_decl_list()?;
                    self.expect(&TokenKind::Semi, "`;`")?;
                    Some(ForInit::Decls(decls))
                } else {
                    let expr = self.parse_expr()?;
                    self.expect(&TokenKind::Semi, "`;`")?;
                    Some(ForInit::Expr(expr))
                };
                let cond = if self.peek() == &TokenKind::Semi {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semi, "`;`")?;
                let step = if self.peek() == &TokenKind::RParen {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::RParen, "`)`")?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                    loc,
                })
            }
            TokenKind::KwSwitch => self.parse_switch(loc),
            TokenKind::KwBreak => {
                self.bump();
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Break { loc })
            }
            TokenKind::KwContinue => {
                self.bump();
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Continue { loc })
            }
            TokenKind::KwReturn => {
                self.bump();
                let value = if self.peek() == &TokenKind::Semi {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Return { value, loc })
            }
            TokenKind::Semi => {
                self.bump();
                Ok(Stmt::Empty { loc })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Expr { expr, loc })
            }
        }
    }

    fn parse_switch(&mut self, loc: Loc) -> Result<Stmt, ParseError> {
        self.bump();
        self.expect(&TokenKind::LParen, "`(`")?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut cases: Vec<SwitchCase> = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            match self.peek() {
                TokenKind::KwCase => {
                    let cloc = self.loc();
                    self.bump();
                    let label = self.parse_ternary()?;
                    self.expect(&TokenKind::Colon, "`:`")?;
                    cases.push(SwitchCase {
                        label: Some(label),
                        stmts: Vec::new(),
                        loc: cloc,
                    });
                }
                TokenKind::KwDefault => {
                    let cloc = self.loc();
                    self.bump();
                    self.expect(&TokenKind::Colon, "`:`")?;
                    cases.push(SwitchCase {
                        label: None,
                        stmts: Vec::new(),
                        loc: cloc,
                    });
                }
                TokenKind::Eof => return Err(self.err_expected("`}`")),
                _ => {
                    let Some(arm) = cases.last_mut() else {
                        return Err(self.err_expected("`case` or `default`"));
                    };
                    if self.is_decl_start() {
                        self.parse_local_decls(&mut arm.stmts)?;
                    } else {
                        arm.stmts.push(self.parse_stmt()?);
                    }
                }
            }
        }
        Ok(Stmt::Switch { value, cases, loc })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_ternary()?;
        let op = match self.peek() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            TokenKind::PercentEq => AssignOp::Rem,
            _ => return Ok(lhs),
        };
        if !is_lvalue_shaped(&lhs) {
            return Err(self.err_expected("an assignable expression before the assignment"));
        }
        let loc = self.loc();
        self.bump();
        let value = self.parse_assign()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(lhs),
            value: Box::new(value),
            loc,
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(1)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let loc = cond.loc();
        let then_expr = self.parse_expr()?;
        self.expect(&TokenKind::Colon, "`:`")?;
        let else_expr = self.parse_ternary()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            loc,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, prec)) = binary_op_of(self.peek()) {
            if prec < min_prec {
                break;
            }
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::KwSizeof => {
                self.bump();
                if self.peek() == &TokenKind::LParen && self.is_type_token_at(1) {
                    self.bump();
                    let ty = self.parse_type_name()?;
                    self.expect(&TokenKind::RParen, "`)`")?;
                    return Ok(Expr::SizeofType { ty, loc });
                }
                let expr = self.parse_unary()?;
                return Ok(Expr::SizeofExpr {
                    expr: Box::new(expr),
                    loc,
                });
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.bump();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                    loc,
                })
            }
            None => self.parse_postfix(),
        }
    }

    /// Parses `const? base '*'*` for `sizeof(type)`.
    fn parse_type_name(&mut self) -> Result<CType, ParseError> {
        let base = self.parse_type_spec()?;
        let mut ty = base;
        while self.eat(&TokenKind::Star) {
            ty = CType::Pointer(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let loc = self.loc();
            match self.peek() {
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "`]`")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                        loc,
                    };
                }
                TokenKind::LParen => {
                    let Expr::Ident { name, loc: iloc } = expr else {
                        return Err(self.unsupported(loc, "call through an expression"));
                    };
                    self.bump();
                    let mut args = Vec::new();
                    if !self.eat(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_assign()?);
                            if !self.eat(&TokenKind::Comma) {
                                self.expect(&TokenKind::RParen, "`)`")?;
                                break;
                            }
                        }
                    }
                    expr = Expr::Call {
                        callee: name,
                        args,
                        loc: iloc,
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let (field, _) = self.expect_ident("a field name")?;
                    expr = Expr::Member {
                        base: Box::new(expr),
                        field,
                        arrow: false,
                        loc,
                    };
                }
                TokenKind::Arrow => {
                    self.bump();
                    let (field, _) = self.expect_ident("a field name")?;
                    expr = Expr::Member {
                        base: Box::new(expr),
                        field,
                        arrow: true,
                        loc,
                    };
                }
                TokenKind::PlusPlus => {
                    self.bump();
                    expr = Expr::Unary {
                        op: UnaryOp::PostInc,
                        expr: Box::new(expr),
                        loc,
                    };
                }
                TokenKind::MinusMinus => {
                    self.bump();
                    expr = Expr::Unary {
                        op: UnaryOp::PostDec,
                        expr: Box::new(expr),
                        loc,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        match self.peek().clone() {
            TokenKind::Int(value) => {
                self.bump();
                Ok(Expr::IntLit { value, loc })
            }
            TokenKind::Char(value) => {
                self.bump();
                Ok(Expr::CharLit { value, loc })
            }
            TokenKind::Str(bytes) => {
                self.bump();
                let mut all = bytes;
                // Adjacent string literals concatenate.
                while matches!(self.peek(), TokenKind::Str(_)) {
                    if let TokenKind::Str(more) = self.bump().kind {
                        all.extend(more);
                    }
                }
                Ok(Expr::StrLit { bytes: all, loc })
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expr::Ident { name, loc })
            }
            TokenKind::LParen => {
                if self.is_type_token_at(1) {
                    return Err(self.unsupported(loc, "cast expression"));
                }
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            _ => Err(self.err_expected("an expression")),
        }
    }
}

/// Operator and precedence for binary operator tokens; higher binds tighter.
fn binary_op_of(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::PipePipe => (BinaryOp::LogOr, 1),
        TokenKind::AmpAmp => (BinaryOp::LogAnd, 2),
        TokenKind::Pipe => (BinaryOp::BitOr, 3),
        TokenKind::Caret => (BinaryOp::BitXor, 4),
        TokenKind::Amp => (BinaryOp::BitAnd, 5),
        TokenKind::EqEq => (BinaryOp::Eq, 6),
        TokenKind::Ne => (BinaryOp::Ne, 6),
        TokenKind::Lt => (BinaryOp::Lt, 7),
        TokenKind::Le => (BinaryOp::Le, 7),
        TokenKind::Gt => (BinaryOp::Gt, 7),
        TokenKind::Ge => (BinaryOp::Ge, 7),
        TokenKind::Shl => (BinaryOp::Shl, 8),
        TokenKind::Shr => (BinaryOp::Shr, 8),
        TokenKind::Plus => (BinaryOp::Add, 9),
        TokenKind::Minus => (BinaryOp::Sub, 9),
        TokenKind::Star => (BinaryOp::Mul, 10),
        TokenKind::Slash => (BinaryOp::Div, 10),
        TokenKind::Percent => (BinaryOp::Rem, 10),
        _ => return None,
    };
    Some(entry)
}

/// Whether an expression has a shape that can stand on the left of `=`.
fn is_lvalue_shaped(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Ident { .. }
            | Expr::Index { .. }
            | Expr::Member { .. }
            | Expr::Unary {
                op: UnaryOp::Deref,
                ..
            }
    )
}
