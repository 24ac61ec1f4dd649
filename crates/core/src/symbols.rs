//! Symbol resolution over a parsed translation unit.
//!
//! Resolution runs in two phases. The first records every file-scope name
//! (functions, globals, enum constants, typedefs, struct layouts) in
//! declaration order, so functions may call functions declared later in the
//! file. The second walks each function body with a scope stack and checks
//! that every identifier resolves and every named type exists.
//!
//! The table is seeded with the built-in declarations the corpus relies on
//! from `<stdio.h>` and `<string.h>`. Those headers are never read; the
//! fixed set below stands in for them. A unit may redeclare a built-in with
//! its own definition, which then shadows the seed entry.

use std::collections::HashSet;

use indexmap::IndexMap;
use umbra_utils::errors::ResolveError;

use crate::ast::{
    CType, Decl, Expr, Field, ForInit, Function, Init, Stmt, TypedefKind, Unit, VarDecl,
};
use crate::token::Loc;

/// Signature of a declared function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    /// Return type.
    pub ret: CType,
    /// Parameter types in order.
    pub params: Vec<CType>,
    /// Whether the parameter list ends in `...`.
    pub variadic: bool,
    /// Whether a body has been seen for this name.
    pub defined: bool,
}

/// One entry in the ordinary identifier namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    /// A function, defined or prototyped.
    Function(FunctionSig),
    /// A file-scope variable.
    Global {
        /// Declared type.
        ty: CType,
    },
    /// An enum constant with its folded value.
    EnumConst {
        /// The constant's value.
        value: i64,
    },
    /// A typedef name.
    Typedef {
        /// The aliased type.
        ty: CType,
    },
}

/// File-scope symbol table for one translation unit.
///
/// Iteration order of the underlying maps follows insertion order, so walking
/// the table reproduces declaration order.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    file: String,
    symbols: IndexMap<String, Symbol>,
    structs: IndexMap<String, Vec<Field>>,
    enum_tags: HashSet<String>,
    builtins: HashSet<String>,
}

impl SymbolTable {
    fn new(file: &str) -> Self {
        let mut table = SymbolTable {
            file: file.to_string(),
            symbols: IndexMap::new(),
            structs: IndexMap::new(),
            enum_tags: HashSet::new(),
            builtins: HashSet::new(),
        };
        table.seed_builtins();
        table
    }

    /// Looks up a file-scope symbol.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Value of `name` if it is an enum constant.
    pub fn enum_value(&self, name: &str) -> Option<i64> {
        match self.symbols.get(name) {
            Some(Symbol::EnumConst { value }) => Some(*value),
            _ => None,
        }
    }

    /// Field layout of `ty` if it resolves to a struct, through typedefs and
    /// `const` qualifiers.
    pub fn fields_of(&self, ty: &CType) -> Option<&[Field]> {
        match ty.unqualified() {
            CType::Struct(tag) => self.structs.get(tag).map(Vec::as_slice),
            CType::Named(name) => match self.symbols.get(name) {
                Some(Symbol::Typedef { ty }) => self.fields_of(ty),
                _ => None,
            },
            _ => None,
        }
    }

    /// Every name in the ordinary namespace, builtins included.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    fn seed_builtins(&mut self) {
        let char_ptr = CType::Pointer(Box::new(CType::Char));
        let const_char_ptr = CType::Pointer(Box::new(CType::Const(Box::new(CType::Char))));
        let file_ptr = CType::Pointer(Box::new(CType::Named("FILE".into())));

        let functions: &[(&str, CType, Vec<CType>, bool)] = &[
            ("printf", CType::Int, vec![const_char_ptr.clone()], true),
            (
                "fprintf",
                CType::Int,
                vec![file_ptr.clone(), const_char_ptr.clone()],
                true,
            ),
            (
                "sprintf",
                CType::Int,
                vec![char_ptr.clone(), const_char_ptr.clone()],
                true,
            ),
            (
                "snprintf",
                CType::Int,
                vec![char_ptr.clone(), CType::Int, const_char_ptr.clone()],
                true,
            ),
            ("scanf", CType::Int, vec![const_char_ptr.clone()], true),
            ("puts", CType::Int, vec![const_char_ptr.clone()], false),
            ("putchar", CType::Int, vec![CType::Int], false),
            ("getchar", CType::Int, vec![], false),
            (
                "strcmp",
                CType::Int,
                vec![const_char_ptr.clone(), const_char_ptr.clone()],
                false,
            ),
            (
                "strncmp",
                CType::Int,
                vec![const_char_ptr.clone(), const_char_ptr.clone(), CType::Int],
                false,
            ),
            (
                "strcpy",
                char_ptr.clone(),
                vec![char_ptr.clone(), const_char_ptr.clone()],
                false,
            ),
            (
                "strcat",
                char_ptr.clone(),
                vec![char_ptr.clone(), const_char_ptr.clone()],
                false,
            ),
            ("strlen", CType::Int, vec![const_char_ptr.clone()], false),
        ];
        for (name, ret, params, variadic) in functions {
            self.symbols.insert(
                (*name).to_string(),
                Symbol::Function(FunctionSig {
                    ret: ret.clone(),
                    params: params.clone(),
                    variadic: *variadic,
                    defined: false,
                }),
            );
            self.builtins.insert((*name).to_string());
        }

        for name in ["stdin", "stdout", "stderr"] {
            self.symbols.insert(
                name.to_string(),
                Symbol::Global {
                    ty: file_ptr.clone(),
                },
            );
            self.builtins.insert(name.to_string());
        }
        self.symbols
            .insert("EOF".to_string(), Symbol::EnumConst { value: -1 });
        self.builtins.insert("EOF".to_string());
        self.symbols
            .insert("FILE".to_string(), Symbol::Typedef { ty: CType::Void });
        self.builtins.insert("FILE".to_string());
        self.symbols
            .insert("size_t".to_string(), Symbol::Typedef { ty: CType::Int });
        self.builtins.insert("size_t".to_string());
    }

    fn duplicate(&self, name: &str, loc: Loc) -> ResolveError {
        ResolveError::DuplicateDefinition {
            file: self.file.clone(),
            line: loc.line,
            col: loc.col,
            name: name.to_string(),
        }
    }

    /// Inserts `symbol` under `name`, allowing exactly one shadowing of a
    /// seeded built-in.
    fn insert(&mut self, name: &str, symbol: Symbol, loc: Loc) -> Result<(), ResolveError> {
        if self.symbols.contains_key(name) && !self.builtins.remove(name) {
            return Err(self.duplicate(name, loc));
        }
        self.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    fn check_type(&self, ty: &CType, loc: Loc) -> Result<(), ResolveError> {
        match ty {
            CType::Void | CType::Int | CType::Char | CType::UChar => Ok(()),
            CType::Named(name) => match self.symbols.get(name) {
                Some(Symbol::Typedef { .. }) => Ok(()),
                _ => Err(ResolveError::UnknownType {
                    file: self.file.clone(),
                    line: loc.line,
                    col: loc.col,
                    name: name.clone(),
                }),
            },
            CType::Struct(tag) => {
                if self.structs.contains_key(tag) {
                    Ok(())
                } else {
                    Err(ResolveError::UnknownType {
                        file: self.file.clone(),
                        line: loc.line,
                        col: loc.col,
                        name: format!("struct {tag}"),
                    })
                }
            }
            CType::Enum(tag) => {
                if self.enum_tags.contains(tag) {
                    Ok(())
                } else {
                    Err(ResolveError::UnknownType {
                        file: self.file.clone(),
                        line: loc.line,
                        col: loc.col,
                        name: format!("enum {tag}"),
                    })
                }
            }
            CType::Pointer(inner) | CType::Const(inner) => self.check_type(inner, loc),
            CType::Array(inner, _) => self.check_type(inner, loc),
        }
    }
}

/// Builds the symbol table for `unit` and checks every function body.
///
/// # Returns
/// The completed table, or the first [`ResolveError`] in declaration order.
pub fn resolve(unit: &Unit) -> Result<SymbolTable, ResolveError> {
    let mut table = SymbolTable::new(&unit.file);

    for decl in &unit.decls {
        match decl {
            Decl::Struct(def) => {
                if table.structs.contains_key(&def.tag) {
                    return Err(table.duplicate(&def.tag, def.loc));
                }
                for field in &def.fields {
                    table.check_type(&field.ty, field.loc)?;
                }
                table.structs.insert(def.tag.clone(), def.fields.clone());
            }
            Decl::Enum(def) => {
                if let Some(tag) = &def.tag {
                    if !table.enum_tags.insert(tag.clone()) {
                        return Err(table.duplicate(tag, def.loc));
                    }
                }
                let mut next = 0i64;
                for variant in &def.variants {
                    if let Some(expr) = &variant.value {
                        next = fold_enum_value(&table, expr).ok_or_else(|| {
                            ResolveError::NonConstantEnum {
                                file: table.file.clone(),
                                line: variant.loc.line,
                                col: variant.loc.col,
                                name: variant.name.clone(),
                            }
                        })?;
                    }
                    table.insert(
                        &variant.name,
                        Symbol::EnumConst { value: next },
                        variant.loc,
                    )?;
                    next += 1;
                }
            }
            Decl::Typedef(def) => {
                let ty = match &def.underlying {
                    TypedefKind::Plain(ty) => {
                        table.check_type(ty, def.loc)?;
                        ty.clone()
                    }
                    TypedefKind::InlineStruct(fields) => {
                        for field in fields {
                            table.check_type(&field.ty, field.loc)?;
                        }
                        // The anonymous struct is registered under the
                        // typedef name so member lookups can find its layout.
                        if table.structs.contains_key(&def.name) {
                            return Err(table.duplicate(&def.name, def.loc));
                        }
                        table.structs.insert(def.name.clone(), fields.clone());
                        CType::Struct(def.name.clone())
                    }
                };
                table.insert(&def.name, Symbol::Typedef { ty }, def.loc)?;
            }
            Decl::Global(var) => {
                table.check_type(&var.ty, var.loc)?;
                table.insert(&var.name, Symbol::Global { ty: var.ty.clone() }, var.loc)?;
            }
            Decl::Function(func) => {
                table.check_type(&func.ret, func.loc)?;
                for param in &func.params {
                    table.check_type(&param.ty, param.loc)?;
                }
                let mut sig = FunctionSig {
                    ret: func.ret.clone(),
                    params: func.params.iter().map(|p| p.ty.clone()).collect(),
                    variadic: func.variadic,
                    defined: func.body.is_some(),
                };
                match table.symbols.get(&func.name) {
                    Some(Symbol::Function(existing)) if !table.builtins.contains(&func.name) => {
                        if existing.defined && sig.defined {
                            return Err(table.duplicate(&func.name, func.loc));
                        }
                        // A prototype after the definition keeps the
                        // definition on record.
                        sig.defined = sig.defined || existing.defined;
                    }
                    Some(_) if !table.builtins.contains(&func.name) => {
                        return Err(table.duplicate(&func.name, func.loc));
                    }
                    _ => {}
                }
                table.builtins.remove(&func.name);
                table
                    .symbols
                    .insert(func.name.clone(), Symbol::Function(sig));
            }
        }
    }

    for decl in &unit.decls {
        match decl {
            Decl::Function(func) if func.body.is_some() => check_body(&table, func)?,
            Decl::Global(var) => {
                if let Some(init) = &var.init {
                    check_init(&table, &mut Vec::new(), init)?;
                }
            }
            _ => {}
        }
    }

    tracing::debug!(
        file = %unit.file,
        symbols = table.symbols.len(),
        structs = table.structs.len(),
        "resolved translation unit"
    );
    Ok(table)
}

/// Folds an enum constant's explicit value. Only literals, earlier enum
/// constants, and unary `-`/`+` on those are constant enough.
fn fold_enum_value(table: &SymbolTable, expr: &Expr) -> Option<i64> {
    match expr {
        Expr::IntLit { value, .. } => Some(*value),
        Expr::CharLit { value, .. } => Some(i64::from(*value)),
        Expr::Ident { name, .. } => table.enum_value(name),
        Expr::Unary { op, expr, .. } => {
            let inner = fold_enum_value(table, expr)?;
            match op {
                crate::ast::UnaryOp::Neg => Some(-inner),
                crate::ast::UnaryOp::Plus => Some(inner),
                _ => None,
            }
        }
        _ => None,
    }
}

fn check_body(table: &SymbolTable, func: &Function) -> Result<(), ResolveError> {
    let mut scopes: Vec<HashSet<String>> = Vec::new();
    let mut params: HashSet<String> = HashSet::new();
    for param in &func.params {
        table.check_type(&param.ty, param.loc)?;
        if let Some(name) = &param.name {
            if !params.insert(name.clone()) {
                return Err(ResolveError::DuplicateDefinition {
                    file: table.file.clone(),
                    line: param.loc.line,
                    col: param.loc.col,
                    name: name.clone(),
                });
            }
        }
    }
    scopes.push(params);
    if let Some(body) = &func.body {
        scopes.push(HashSet::new());
        for stmt in body {
            check_stmt(table, &mut scopes, stmt)?;
        }
        scopes.pop();
    }
    Ok(())
}

fn check_stmt(
    table: &SymbolTable,
    scopes: &mut Vec<HashSet<String>>,
    stmt: &Stmt,
) -> Result<(), ResolveError> {
    match stmt {
        Stmt::Block { stmts, .. } => {
            scopes.push(HashSet::new());
            for inner in stmts {
                check_stmt(table, scopes, inner)?;
            }
            scopes.pop();
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            check_expr(table, scopes, cond)?;
            check_stmt(table, scopes, then_branch)?;
            if let Some(else_branch) = else_branch {
                check_stmt(table, scopes, else_branch)?;
            }
        }
        Stmt::While { cond, body, .. } => {
            check_expr(table, scopes, cond)?;
            check_stmt(table, scopes, body)?;
        }
        Stmt::DoWhile { body, cond, .. } => {
            check_stmt(table, scopes, body)?;
            check_expr(table, scopes, cond)?;
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            scopes.push(HashSet::new());
            match init {
                Some(ForInit::Decls(decls)) => {
                    for decl in decls {
                        declare_local(table, scopes, decl)?;
                    }
                }
                Some(ForInit::Expr(expr)) => check_expr(table, scopes, expr)?,
                None => {}
            }
            if let Some(cond) = cond {
                check_expr(table, scopes, cond)?;
            }
            if let Some(step) = step {
                check_expr(table, scopes, step)?;
            }
            check_stmt(table, scopes, body)?;
            scopes.pop();
        }
        Stmt::Switch { value, cases, .. } => {
            check_expr(table, scopes, value)?;
            scopes.push(HashSet::new());
            for case in cases {
                if let Some(label) = &case.label {
                    check_expr(table, scopes, label)?;
                }
                for inner in &case.stmts {
                    check_stmt(table, scopes, inner)?;
                }
            }
            scopes.pop();
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                check_expr(table, scopes, value)?;
            }
        }
        Stmt::Expr { expr, .. } => check_expr(table, scopes, expr)?,
        Stmt::Local { decl } => declare_local(table, scopes, decl)?,
        Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty { .. } => {}
    }
    Ok(())
}

fn declare_local(
    table: &SymbolTable,
    scopes: &mut Vec<HashSet<String>>,
    decl: &VarDecl,
) -> Result<(), ResolveError> {
    table.check_type(&decl.ty, decl.loc)?;
    if let Some(init) = &decl.init {
        check_init(table, scopes, init)?;
    }
    let current = scopes.last_mut().expect("scope stack is never empty");
    if !current.insert(decl.name.clone()) {
        return Err(ResolveError::DuplicateDefinition {
            file: table.file.clone(),
            line: decl.loc.line,
            col: decl.loc.col,
            name: decl.name.clone(),
        });
    }
    Ok(())
}

fn check_init(
    table: &SymbolTable,
    scopes: &mut Vec<HashSet<String>>,
    init: &Init,
) -> Result<(), ResolveError> {
    match init {
        Init::Expr(expr) => check_expr(table, scopes, expr),
        Init::List(items) => {
            for item in items {
                check_init(table, scopes, item)?;
            }
            Ok(())
        }
    }
}

fn check_expr(
    table: &SymbolTable,
    scopes: &mut Vec<HashSet<String>>,
    expr: &Expr,
) -> Result<(), ResolveError> {
    match expr {
        Expr::IntLit { .. } | Expr::CharLit { .. } | Expr::StrLit { .. } => Ok(()),
        Expr::Ident { name, loc } => {
            let in_scope = scopes.iter().any(|scope| scope.contains(name));
            if in_scope || table.symbols.contains_key(name) {
                Ok(())
            } else {
                Err(ResolveError::UndeclaredIdentifier {
                    file: table.file.clone(),
                    line: loc.line,
                    col: loc.col,
                    name: name.clone(),
                })
            }
        }
        Expr::Unary { expr, .. } => check_expr(table, scopes, expr),
        Expr::Binary { lhs, rhs, .. } => {
            check_expr(table, scopes, lhs)?;
            check_expr(table, scopes, rhs)
        }
        Expr::Assign { target, value, .. } => {
            check_expr(table, scopes, target)?;
            check_expr(table, scopes, value)
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            check_expr(table, scopes, cond)?;
            check_expr(table, scopes, then_expr)?;
            check_expr(table, scopes, else_expr)
        }
        Expr::Call { callee, args, loc } => {
            // Existence only; the subset has no type checker, so calling a
            // non-function is left to the C compiler that consumes our output.
            let known = scopes.iter().any(|scope| scope.contains(callee))
                || table.symbols.contains_key(callee);
            if !known {
                return Err(ResolveError::UndeclaredIdentifier {
                    file: table.file.clone(),
                    line: loc.line,
                    col: loc.col,
                    name: callee.clone(),
                });
            }
            for arg in args {
                check_expr(table, scopes, arg)?;
            }
            Ok(())
        }
        Expr::Index { base, index, .. } => {
            check_expr(table, scopes, base)?;
            check_expr(table, scopes, index)
        }
        Expr::Member { base, .. } => check_expr(table, scopes, base),
        Expr::SizeofExpr { expr, .. } => check_expr(table, scopes, expr),
        Expr::SizeofType { ty, loc } => table.check_type(ty, *loc),
    }
}
