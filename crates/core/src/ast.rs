//! Abstract syntax tree for the supported C subset.
//!
//! Every node carries the [`Loc`] of the token that introduced it so later
//! stages can report source positions without re-lexing. String and character
//! literal payloads are raw decoded bytes; the emitter re-escapes them.

use crate::token::Loc;

/// A parsed translation unit: the `#include` lines in source order followed
/// by every file-scope declaration in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// File name the unit was parsed from, used in diagnostics.
    pub file: String,
    /// Raw include targets with delimiters, e.g. `<stdio.h>` or `"local.h"`.
    pub includes: Vec<String>,
    /// File-scope declarations in source order.
    pub decls: Vec<Decl>,
}

/// One file-scope declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    /// Function definition or prototype.
    Function(Function),
    /// `struct Tag { ... };`
    Struct(StructDef),
    /// `enum Tag { ... };`
    Enum(EnumDef),
    /// `typedef ... Name;`
    Typedef(Typedef),
    /// File-scope variable, possibly initialized.
    Global(VarDecl),
}

/// A function definition or prototype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Return type.
    pub ret: CType,
    /// Parameters in source order.
    pub params: Vec<Param>,
    /// Whether the parameter list ends in `...`.
    pub variadic: bool,
    /// Body statements, or `None` for a prototype.
    pub body: Option<Vec<Stmt>>,
    /// Whether the declaration carried `static`.
    pub is_static: bool,
    /// Location of the function name.
    pub loc: Loc,
}

/// One function parameter. The name is optional in prototypes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name if present.
    pub name: Option<String>,
    /// Parameter type.
    pub ty: CType,
    /// Location of the parameter.
    pub loc: Loc,
}

/// A `struct` definition with its fields in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    /// Struct tag.
    pub tag: String,
    /// Fields in source order.
    pub fields: Vec<Field>,
    /// Location of the tag.
    pub loc: Loc,
}

/// One struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: CType,
    /// Location of the field name.
    pub loc: Loc,
}

/// An `enum` definition. Unvalued constants continue from the previous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    /// Enum tag, absent for anonymous enums.
    pub tag: Option<String>,
    /// Constants in source order with their optional explicit values.
    pub variants: Vec<EnumVariant>,
    /// Location of the `enum` keyword.
    pub loc: Loc,
}

/// One enum constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    /// Constant name.
    pub name: String,
    /// Explicit value expression, if written.
    pub value: Option<Expr>,
    /// Location of the constant name.
    pub loc: Loc,
}

/// A `typedef` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typedef {
    /// The new type name.
    pub name: String,
    /// What the name abbreviates.
    pub underlying: TypedefKind,
    /// Location of the new name.
    pub loc: Loc,
}

/// The right-hand side of a typedef.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedefKind {
    /// `typedef int Name;` and similar.
    Plain(CType),
    /// `typedef struct { ... } Name;` with an anonymous struct body.
    InlineStruct(Vec<Field>),
}

/// A variable declaration, file-scope or local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    /// Variable name.
    pub name: String,
    /// Declared type, with array and pointer structure resolved.
    pub ty: CType,
    /// Initializer, if written.
    pub init: Option<Init>,
    /// Whether the declaration carried `static`.
    pub is_static: bool,
    /// Location of the variable name.
    pub loc: Loc,
}

/// A variable initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Init {
    /// Scalar initializer or string literal initializing a char array.
    Expr(Expr),
    /// Brace-enclosed initializer list, possibly nested.
    List(Vec<Init>),
}

/// Types expressible in the subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    /// `void`
    Void,
    /// `int`
    Int,
    /// `char`
    Char,
    /// `unsigned char`
    UChar,
    /// A typedef name.
    Named(String),
    /// `struct Tag`
    Struct(String),
    /// `enum Tag`
    Enum(String),
    /// Pointer to the inner type.
    Pointer(Box<CType>),
    /// Array of the inner type; the length is absent when inferred or
    /// unspecified, as in `char s[]` parameters.
    Array(Box<CType>, Option<usize>),
    /// `const`-qualified inner type.
    Const(Box<CType>),
}

impl CType {
    /// Strips `const` qualifiers off the outermost type.
    pub fn unqualified(&self) -> &CType {
        match self {
            CType::Const(inner) => inner.unqualified(),
            other => other,
        }
    }

    /// Returns true for `char` and `unsigned char` under any qualification.
    pub fn is_char_like(&self) -> bool {
        matches!(self.unqualified(), CType::Char | CType::UChar)
    }
}

/// One statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `{ ... }`
    Block { stmts: Vec<Stmt>, loc: Loc },
    /// `if (cond) then [else other]`
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        loc: Loc,
    },
    /// `while (cond) body`
    While { cond: Expr, body: Box<Stmt>, loc: Loc },
    /// `do body while (cond);`
    DoWhile { body: Box<Stmt>, cond: Expr, loc: Loc },
    /// `for (init; cond; step) body`, any clause optional
    For {
        init: Option<ForInit>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
        loc: Loc,
    },
    /// `switch (value) { ... }` with cases kept in source order
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        loc: Loc,
    },
    /// `break;`
    Break { loc: Loc },
    /// `continue;`
    Continue { loc: Loc },
    /// `return;` or `return expr;`
    Return { value: Option<Expr>, loc: Loc },
    /// Expression statement.
    Expr { expr: Expr, loc: Loc },
    /// Local variable declaration. Comma-separated declarator lists are
    /// split into one `Local` per declarator by the parser.
    Local { decl: VarDecl },
    /// A bare `;`.
    Empty { loc: Loc },
}

impl Stmt {
    /// Location of the statement for diagnostics.
    pub fn loc(&self) -> Loc {
        match self {
            Stmt::Block { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::While { loc, .. }
            | Stmt::DoWhile { loc, .. }
            | Stmt::For { loc, .. }
            | Stmt::Switch { loc, .. }
            | Stmt::Break { loc }
            | Stmt::Continue { loc }
            | Stmt::Return { loc, .. }
            | Stmt::Expr { loc, .. }
            | Stmt::Empty { loc } => *loc,
            Stmt::Local { decl } => decl.loc,
        }
    }
}

/// The first clause of a `for` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForInit {
    /// `for (int i = 0, j = n; ...)`
    Decls(Vec<VarDecl>),
    /// `for (i = 0; ...)`
    Expr(Expr),
}

/// One `case` or `default` arm of a switch, in source order. An arm with an
/// empty statement list falls through to the arm that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    /// The label expression, or `None` for `default`.
    pub label: Option<Expr>,
    /// Statements under this label, up to the next label or the closing brace.
    pub stmts: Vec<Stmt>,
    /// Location of the `case` or `default` keyword.
    pub loc: Loc,
}

/// One expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    IntLit { value: i64, loc: Loc },
    /// Character literal, decoded to its byte value.
    CharLit { value: u8, loc: Loc },
    /// String literal, decoded, without the trailing NUL.
    StrLit { bytes: Vec<u8>, loc: Loc },
    /// Identifier reference.
    Ident { name: String, loc: Loc },
    /// Prefix or postfix unary operation.
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        loc: Loc,
    },
    /// Binary operation. `&&` and `||` short-circuit.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        loc: Loc,
    },
    /// Plain or compound assignment.
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
        loc: Loc,
    },
    /// `cond ? then_expr : else_expr`
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        loc: Loc,
    },
    /// Direct call of a named function.
    Call {
        callee: String,
        args: Vec<Expr>,
        loc: Loc,
    },
    /// `base[index]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        loc: Loc,
    },
    /// `base.field` or `base->field`.
    Member {
        base: Box<Expr>,
        field: String,
        arrow: bool,
        loc: Loc,
    },
    /// `sizeof expr`
    SizeofExpr { expr: Box<Expr>, loc: Loc },
    /// `sizeof(type)`
    SizeofType { ty: CType, loc: Loc },
}

impl Expr {
    /// Location of the expression for diagnostics.
    pub fn loc(&self) -> Loc {
        match self {
            Expr::IntLit { loc, .. }
            | Expr::CharLit { loc, .. }
            | Expr::StrLit { loc, .. }
            | Expr::Ident { loc, .. }
            | Expr::Unary { loc, .. }
            | Expr::Binary { loc, .. }
            | Expr::Assign { loc, .. }
            | Expr::Ternary { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Index { loc, .. }
            | Expr::Member { loc, .. }
            | Expr::SizeofExpr { loc, .. }
            | Expr::SizeofType { loc, .. } => *loc,
        }
    }

    /// Convenience constructor for integer literals at a synthetic location.
    pub fn int(value: i64) -> Expr {
        Expr::IntLit {
            value,
            loc: Loc::default(),
        }
    }

    /// Convenience constructor for identifier references at a synthetic
    /// location.
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident {
            name: name.into(),
            loc: Loc::default(),
        }
    }
}

/// Unary operators. `PostInc` and `PostDec` evaluate to the old value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `++x`
    PreInc,
    /// `--x`
    PreDec,
    /// `x++`
    PostInc,
    /// `x--`
    PostDec,
    /// `&x`
    AddrOf,
    /// `*x`
    Deref,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`, truncating toward zero
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`, short-circuiting
    LogAnd,
    /// `||`, short-circuiting
    LogOr,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Rem,
}
