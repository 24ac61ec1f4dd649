//! C source emission.
//!
//! The printer inverts the parser for the supported subset: emitted text
//! feeds back through [`crate::parser::parse_unit`] with the same meaning,
//! so transformed units can be re-checked with the front end that produced
//! them. Parentheses are inserted from operator precedence rather than
//! carried in the tree, and non-printable bytes in literals are escaped as
//! three-digit octal so a digit that follows can never extend the escape.

use crate::ast::{
    AssignOp, BinaryOp, CType, Decl, EnumDef, Expr, ForInit, Function, Init, Param, Stmt,
    StructDef, Typedef, TypedefKind, UnaryOp, Unit, VarDecl,
};

const PREC_ASSIGN: u8 = 2;
const PREC_TERNARY: u8 = 3;
const PREC_UNARY: u8 = 15;
const PREC_POSTFIX: u8 = 16;

/// Renders a whole translation unit as compilable C.
pub fn emit_unit(unit: &Unit) -> String {
    let mut emitter = Emitter::new();
    emitter.unit(unit);
    emitter.out
}

/// Renders one expression without enclosing parentheses.
pub fn expr_to_string(expr: &Expr) -> String {
    let mut emitter = Emitter::new();
    emitter.expr(expr, 0);
    emitter.out
}

/// Renders one statement at column zero, without the trailing newline.
pub fn stmt_to_string(stmt: &Stmt) -> String {
    let mut emitter = Emitter::new();
    emitter.stmt(stmt);
    emitter.out.trim_end().to_string()
}

struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    fn new() -> Self {
        Emitter {
            out: String::new(),
            indent: 0,
        }
    }

    fn pad(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn line(&mut self, text: &str) {
        self.pad();
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn unit(&mut self, unit: &Unit) {
        for include in &unit.includes {
            self.line(&format!("#include {include}"));
        }
        let mut first = unit.includes.is_empty();
        for decl in &unit.decls {
            if !first {
                self.out.push('\n');
            }
            first = false;
            match decl {
                Decl::Function(func) => self.function(func),
                Decl::Struct(def) => self.struct_def(def),
                Decl::Enum(def) => self.enum_def(def),
                Decl::Typedef(def) => self.typedef(def),
                Decl::Global(decl) => {
                    self.pad();
                    self.var_decl(decl);
                    self.out.push_str(";\n");
                }
            }
        }
    }

    fn function(&mut self, func: &Function) {
        let params = param_list(&func.params, func.variadic);
        let signature = declare(&func.ret, &format!("{}({})", func.name, params));
        let prefix = if func.is_static { "static " } else { "" };
        match &func.body {
            None => self.line(&format!("{prefix}{signature};")),
            Some(stmts) => {
                self.line(&format!("{prefix}{signature} {{"));
                self.indent += 1;
                for stmt in stmts {
                    self.stmt(stmt);
                }
                self.indent -= 1;
                self.line("}");
            }
        }
    }

    fn struct_def(&mut self, def: &StructDef) {
        self.line(&format!("struct {} {{", def.tag));
        self.indent += 1;
        for field in &def.fields {
            let decl = declare(&field.ty, &field.name);
            self.line(&format!("{decl};"));
        }
        self.indent -= 1;
        self.line("};");
    }

    fn enum_def(&mut self, def: &EnumDef) {
        match &def.tag {
            Some(tag) => self.line(&format!("enum {tag} {{")),
            None => self.line("enum {"),
        }
        self.indent += 1;
        let last = def.variants.len().saturating_sub(1);
        for (index, variant) in def.variants.iter().enumerate() {
            self.pad();
            self.out.push_str(&variant.name);
            if let Some(value) = &variant.value {
                self.out.push_str(" = ");
                self.expr(value, PREC_TERNARY);
            }
            if index != last {
                self.out.push(',');
            }
            self.out.push('\n');
        }
        self.indent -= 1;
        self.line("};");
    }

    fn typedef(&mut self, def: &Typedef) {
        match &def.underlying {
            TypedefKind::Plain(ty) => {
                let decl = declare(ty, &def.name);
                self.line(&format!("typedef {decl};"));
            }
            TypedefKind::InlineStruct(fields) => {
                self.line("typedef struct {");
                self.indent += 1;
                for field in fields {
                    let decl = declare(&field.ty, &field.name);
                    self.line(&format!("{decl};"));
                }
                self.indent -= 1;
                self.line(&format!("}} {};", def.name));
            }
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        if decl.is_static {
            self.out.push_str("static ");
        }
        self.out.push_str(&declare(&decl.ty, &decl.name));
        if let Some(init) = &decl.init {
            self.out.push_str(" = ");
            self.init(init);
        }
    }

    fn init(&mut self, init: &Init) {
        match init {
            Init::Expr(expr) => self.expr(expr, PREC_ASSIGN),
            Init::List(items) => {
                self.out.push_str("{ ");
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        self.out.push_str(", ");
                    }
                    self.init(item);
                }
                self.out.push_str(" }");
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Empty { .. } => self.line(";"),
            Stmt::Expr { expr, .. } => {
                self.pad();
                self.expr(expr, 0);
                self.out.push_str(";\n");
            }
            Stmt::Local { decl } => {
                self.pad();
                self.var_decl(decl);
                self.out.push_str(";\n");
            }
            Stmt::Block { stmts, .. } => {
                self.line("{");
                self.indent += 1;
                for stmt in stmts {
                    self.stmt(stmt);
                }
                self.indent -= 1;
                self.line("}");
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.if_stmt(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body, .. } => {
                self.pad();
                self.out.push_str("while (");
                self.expr(cond, 0);
                self.out.push_str(") {\n");
                self.nested(body);
                self.line("}");
            }
            Stmt::DoWhile { body, cond, .. } => {
                self.line("do {");
                self.nested(body);
                self.pad();
                self.out.push_str("} while (");
                self.expr(cond, 0);
                self.out.push_str(");\n");
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                self.pad();
                self.out.push_str("for (");
                match init {
                    Some(ForInit::Decls(decls)) => self.var_decl_group(decls),
                    Some(ForInit::Expr(expr)) => self.expr(expr, 0),
                    None => {}
                }
                self.out.push(';');
                if let Some(cond) = cond {
                    self.out.push(' ');
                    self.expr(cond, 0);
                }
                self.out.push(';');
                if let Some(step) = step {
                    self.out.push(' ');
                    self.expr(step, 0);
                }
                self.out.push_str(") {\n");
                self.nested(body);
                self.line("}");
            }
            Stmt::Switch { value, cases, .. } => {
                self.pad();
                self.out.push_str("switch (");
                self.expr(value, 0);
                self.out.push_str(") {\n");
                self.indent += 1;
                for case in cases {
                    // Arms are always braced so declarations stay legal
                    // directly after the label. Fallthrough is unaffected.
                    match &case.label {
                        Some(label) => {
                            self.pad();
                            self.out.push_str("case ");
                            self.expr(label, PREC_TERNARY);
                            self.out.push_str(": {\n");
                        }
                        None => self.line("default: {"),
                    }
                    self.indent += 1;
                    for stmt in &case.stmts {
                        self.stmt(stmt);
                    }
                    self.indent -= 1;
                    self.line("}");
                }
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Break { .. } => self.line("break;"),
            Stmt::Continue { .. } => self.line("continue;"),
            Stmt::Return { value, .. } => match value {
                None => self.line("return;"),
                Some(expr) => {
                    self.pad();
                    self.out.push_str("return ");
                    self.expr(expr, 0);
                    self.out.push_str(";\n");
                }
            },
        }
    }

    /// Emits a loop or branch body one level deeper, flattening an explicit
    /// block so the header's braces are not doubled.
    fn nested(&mut self, body: &Stmt) {
        self.indent += 1;
        match body {
            Stmt::Block { stmts, .. } => {
                for stmt in stmts {
                    self.stmt(stmt);
                }
            }
            other => self.stmt(other),
        }
        self.indent -= 1;
    }

    fn if_stmt(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) {
        self.pad();
        self.out.push_str("if (");
        self.expr(cond, 0);
        self.out.push_str(") {\n");
        self.nested(then_branch);
        let mut tail = else_branch;
        loop {
            match tail {
                None => {
                    self.line("}");
                    return;
                }
                Some(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    ..
                }) => {
                    self.pad();
                    self.out.push_str("} else if (");
                    self.expr(cond, 0);
                    self.out.push_str(") {\n");
                    self.nested(then_branch);
                    tail = else_branch.as_deref();
                }
                Some(other) => {
                    self.line("} else {");
                    self.nested(other);
                    self.line("}");
                    return;
                }
            }
        }
    }

    /// Emits `for`-header declarations sharing one base specifier, e.g.
    /// `int i = 0, *p = q`.
    fn var_decl_group(&mut self, decls: &[VarDecl]) {
        let Some(first) = decls.first() else {
            return;
        };
        let (base, _) = declarator_parts(&first.ty, "");
        self.out.push_str(&base);
        self.out.push(' ');
        for (index, decl) in decls.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            let (_, declarator) = declarator_parts(&decl.ty, &decl.name);
            self.out.push_str(&declarator);
            if let Some(init) = &decl.init {
                self.out.push_str(" = ");
                self.init(init);
            }
        }
    }

    /// Writes `expr`, parenthesizing when its precedence falls below `min`.
    fn expr(&mut self, expr: &Expr, min: u8) {
        let prec = expr_prec(expr);
        let parens = prec < min;
        if parens {
            self.out.push('(');
        }
        match expr {
            Expr::IntLit { value, .. } => self.out.push_str(&value.to_string()),
            Expr::CharLit { value, .. } => {
                self.out.push('\'');
                push_escaped(&mut self.out, *value, b'\'');
                self.out.push('\'');
            }
            Expr::StrLit { bytes, .. } => {
                self.out.push('"');
                for byte in bytes {
                    push_escaped(&mut self.out, *byte, b'"');
                }
                self.out.push('"');
            }
            Expr::Ident { name, .. } => self.out.push_str(name),
            Expr::Unary { op, expr, .. } => self.unary(*op, expr),
            Expr::Binary { op, lhs, rhs, .. } => {
                let prec = bin_prec(*op);
                self.expr(lhs, prec);
                self.out.push(' ');
                self.out.push_str(bin_token(*op));
                self.out.push(' ');
                self.expr(rhs, prec + 1);
            }
            Expr::Assign {
                op, target, value, ..
            } => {
                self.expr(target, PREC_UNARY);
                self.out.push(' ');
                self.out.push_str(assign_token(*op));
                self.out.push(' ');
                self.expr(value, PREC_ASSIGN);
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                self.expr(cond, PREC_TERNARY + 1);
                self.out.push_str(" ? ");
                self.expr(then_expr, PREC_ASSIGN);
                self.out.push_str(" : ");
                self.expr(else_expr, PREC_TERNARY);
            }
            Expr::Call { callee, args, .. } => {
                self.out.push_str(callee);
                self.out.push('(');
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(arg, PREC_ASSIGN);
                }
                self.out.push(')');
            }
            Expr::Index { base, index, .. } => {
                self.expr(base, PREC_POSTFIX);
                self.out.push('[');
                self.expr(index, 0);
                self.out.push(']');
            }
            Expr::Member {
                base, field, arrow, ..
            } => {
                self.expr(base, PREC_POSTFIX);
                self.out.push_str(if *arrow { "->" } else { "." });
                self.out.push_str(field);
            }
            Expr::SizeofExpr { expr, .. } => {
                self.out.push_str("sizeof(");
                self.expr(expr, 0);
                self.out.push(')');
            }
            Expr::SizeofType { ty, .. } => {
                self.out.push_str("sizeof(");
                self.out.push_str(&declare(ty, ""));
                self.out.push(')');
            }
        }
        if parens {
            self.out.push(')');
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) {
        match op {
            UnaryOp::PostInc => {
                self.expr(operand, PREC_POSTFIX);
                self.out.push_str("++");
            }
            UnaryOp::PostDec => {
                self.expr(operand, PREC_POSTFIX);
                self.out.push_str("--");
            }
            _ => {
                let token = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                    UnaryOp::PreInc => "++",
                    UnaryOp::PreDec => "--",
                    UnaryOp::AddrOf => "&",
                    UnaryOp::Deref => "*",
                    UnaryOp::PostInc | UnaryOp::PostDec => unreachable!(),
                };
                self.out.push_str(token);
                // `- -x` and `& &x` would fuse into other tokens unspaced.
                if token.ends_with(leading_char(operand)) {
                    self.out.push(' ');
                }
                self.expr(operand, PREC_UNARY);
            }
        }
    }
}

/// The character the operand's rendering starts with, when that character
/// could fuse with a prefix operator token.
fn leading_char(expr: &Expr) -> char {
    match expr {
        Expr::IntLit { value, .. } if *value < 0 => '-',
        Expr::Unary { op, .. } => match op {
            UnaryOp::Neg | UnaryOp::PreDec => '-',
            UnaryOp::Plus | UnaryOp::PreInc => '+',
            UnaryOp::AddrOf => '&',
            _ => '\0',
        },
        _ => '\0',
    }
}

fn push_escaped(out: &mut String, byte: u8, quote: u8) {
    match byte {
        b'\n' => out.push_str("\\n"),
        b'\t' => out.push_str("\\t"),
        b'\r' => out.push_str("\\r"),
        b'\\' => out.push_str("\\\\"),
        b if b == quote => {
            out.push('\\');
            out.push(quote as char);
        }
        0x20..=0x7e => out.push(byte as char),
        other => out.push_str(&format!("\\{other:03o}")),
    }
}

fn expr_prec(expr: &Expr) -> u8 {
    match expr {
        Expr::IntLit { value, .. } if *value < 0 => PREC_UNARY,
        Expr::IntLit { .. } | Expr::CharLit { .. } | Expr::StrLit { .. } | Expr::Ident { .. } => {
            17
        }
        Expr::Call { .. } | Expr::Index { .. } | Expr::Member { .. } => PREC_POSTFIX,
        Expr::Unary { op, .. } => match op {
            UnaryOp::PostInc | UnaryOp::PostDec => PREC_POSTFIX,
            _ => PREC_UNARY,
        },
        Expr::SizeofExpr { .. } | Expr::SizeofType { .. } => PREC_UNARY,
        Expr::Binary { op, .. } => bin_prec(*op),
        Expr::Ternary { .. } => PREC_TERNARY,
        Expr::Assign { .. } => PREC_ASSIGN,
    }
}

fn bin_prec(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 13,
        BinaryOp::Add | BinaryOp::Sub => 12,
        BinaryOp::Shl | BinaryOp::Shr => 11,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 10,
        BinaryOp::Eq | BinaryOp::Ne => 9,
        BinaryOp::BitAnd => 8,
        BinaryOp::BitXor => 7,
        BinaryOp::BitOr => 6,
        BinaryOp::LogAnd => 5,
        BinaryOp::LogOr => 4,
    }
}

fn bin_token(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::LogAnd => "&&",
        BinaryOp::LogOr => "||",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
    }
}

fn assign_token(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Rem => "%=",
    }
}

/// Spells a declaration of `name` with type `ty`, e.g. `const char *s[4]`.
/// An empty name yields the abstract form used inside `sizeof`.
pub fn declare(ty: &CType, name: &str) -> String {
    let (base, declarator) = declarator_parts(ty, name);
    if declarator.is_empty() {
        base
    } else {
        format!("{base} {declarator}")
    }
}

/// Splits a type into its base specifier and the declarator wrapped around
/// `name`, so grouped declarations can share the specifier.
fn declarator_parts(ty: &CType, name: &str) -> (String, String) {
    match ty {
        CType::Const(inner) => {
            let (base, declarator) = declarator_parts(inner, name);
            (format!("const {base}"), declarator)
        }
        CType::Pointer(inner) => {
            let decorated = format!("*{name}");
            let decorated = if matches!(inner.unqualified(), CType::Array(..)) {
                format!("({decorated})")
            } else {
                decorated
            };
            declarator_parts(inner, &decorated)
        }
        CType::Array(elem, len) => {
            let decorated = match len {
                Some(n) => format!("{name}[{n}]"),
                None => format!("{name}[]"),
            };
            declarator_parts(elem, &decorated)
        }
        CType::Void => ("void".to_string(), name.to_string()),
        CType::Int => ("int".to_string(), name.to_string()),
        CType::Char => ("char".to_string(), name.to_string()),
        CType::UChar => ("unsigned char".to_string(), name.to_string()),
        CType::Named(n) => (n.clone(), name.to_string()),
        CType::Struct(tag) => (format!("struct {tag}"), name.to_string()),
        CType::Enum(tag) => (format!("enum {tag}"), name.to_string()),
    }
}

fn param_list(params: &[Param], variadic: bool) -> String {
    let mut parts: Vec<String> = params
        .iter()
        .map(|p| declare(&p.ty, p.name.as_deref().unwrap_or("")))
        .collect();
    if variadic {
        parts.push("...".to_string());
    }
    parts.join(", ")
}
