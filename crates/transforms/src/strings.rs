//! String literal encryption.
//!
//! Every string literal in a function body is XOR-encrypted against a
//! literal-sized key stream drawn from the per-function RNG. The ciphertext
//! and key land in file-scope `static const unsigned char` arrays, the
//! literal itself is replaced by a stack buffer, and a call to the shared
//! reveal helper fills that buffer right before the statement that used the
//! literal. Revealing is a plain XOR, so running it twice over the same
//! buffer is harmless.
//!
//! Literals initializing arrays are left in place: a `char s[] = "..."` copy
//! has no pointer to redirect, and rewriting it would change the object's
//! storage. Pointer initializers and every other expression position are
//! rewritten.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use umbra_core::ast::{
    CType, Expr, ForInit, Function, Init, Param, Stmt, SwitchCase, UnaryOp, VarDecl,
};
use umbra_core::token::Loc;
use umbra_utils::errors::TransformError;

use crate::{FunctionBundle, Transform};

/// Name of the helper that XORs a ciphertext into a stack buffer.
pub const REVEAL_HELPER: &str = "__umbra_reveal";

pub struct EncryptStrings;

impl Transform for EncryptStrings {
    fn name(&self) -> &'static str {
        "EncryptStrings"
    }

    fn apply(
        &self,
        bundle: &mut FunctionBundle,
        rng: &mut StdRng,
    ) -> Result<bool, TransformError> {
        let Some(body) = bundle.func.body.take() else {
            return Ok(false);
        };
        let func = bundle.func.name.clone();
        let mut encryptor = Encryptor {
            func: &func,
            rng,
            statics: &mut bundle.statics,
            count: 0,
        };
        let body = encryptor.rewrite_block(body);
        let encrypted = encryptor.count;
        bundle.func.body = Some(body);
        if encrypted == 0 {
            return Ok(false);
        }
        bundle.needs_reveal = true;
        debug!(function = %func, literals = encrypted, "encrypted string literals");
        Ok(true)
    }
}

struct Encryptor<'a> {
    func: &'a str,
    rng: &'a mut StdRng,
    statics: &'a mut Vec<VarDecl>,
    count: usize,
}

impl Encryptor<'_> {
    /// Rewrites a statement list, splicing each statement's reveal prelude
    /// directly in front of it.
    fn rewrite_block(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let mut prelude = Vec::new();
            let stmt = self.rewrite_stmt(stmt, &mut prelude);
            out.extend(prelude);
            out.push(stmt);
        }
        out
    }

    /// A braced sub-body splices its own preludes; a bare statement hands
    /// them up to the enclosing list.
    fn rewrite_nested(&mut self, stmt: Stmt, prelude: &mut Vec<Stmt>) -> Stmt {
        match stmt {
            Stmt::Block { stmts, loc } => Stmt::Block {
                stmts: self.rewrite_block(stmts),
                loc,
            },
            other => self.rewrite_stmt(other, prelude),
        }
    }

    fn rewrite_stmt(&mut self, stmt: Stmt, prelude: &mut Vec<Stmt>) -> Stmt {
        match stmt {
            Stmt::Expr { expr, loc } => Stmt::Expr {
                expr: self.rewrite_expr(expr, prelude),
                loc,
            },
            Stmt::Return { value, loc } => Stmt::Return {
                value: value.map(|expr| self.rewrite_expr(expr, prelude)),
                loc,
            },
            Stmt::Local { decl } => Stmt::Local {
                decl: self.rewrite_decl(decl, prelude),
            },
            Stmt::Block { stmts, loc } => Stmt::Block {
                stmts: self.rewrite_block(stmts),
                loc,
            },
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                loc,
            } => {
                let cond = self.rewrite_expr(cond, prelude);
                let then_branch = Box::new(self.rewrite_nested(*then_branch, prelude));
                let else_branch =
                    else_branch.map(|stmt| Box::new(self.rewrite_nested(*stmt, prelude)));
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    loc,
                }
            }
            // Loop conditions and steps run every iteration, but the buffer
            // contents never change, so one reveal ahead of the loop covers
            // them all.
            Stmt::While { cond, body, loc } => {
                let cond = self.rewrite_expr(cond, prelude);
                let body = Box::new(self.rewrite_nested(*body, prelude));
                Stmt::While { cond, body, loc }
            }
            Stmt::DoWhile { body, cond, loc } => {
                let body = Box::new(self.rewrite_nested(*body, prelude));
                let cond = self.rewrite_expr(cond, prelude);
                Stmt::DoWhile { body, cond, loc }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                loc,
            } => {
                let init = init.map(|init| match init {
                    ForInit::Decls(decls) => ForInit::Decls(
                        decls
                            .into_iter()
                            .map(|decl| self.rewrite_decl(decl, prelude))
                            .collect(),
                    ),
                    ForInit::Expr(expr) => ForInit::Expr(self.rewrite_expr(expr, prelude)),
                });
                let cond = cond.map(|expr| self.rewrite_expr(expr, prelude));
                let step = step.map(|expr| self.rewrite_expr(expr, prelude));
                let body = Box::new(self.rewrite_nested(*body, prelude));
                Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                    loc,
                }
            }
            Stmt::Switch { value, cases, loc } => Stmt::Switch {
                value: self.rewrite_expr(value, prelude),
                cases: cases
                    .into_iter()
                    .map(|case| SwitchCase {
                        label: case.label,
                        stmts: self.rewrite_block(case.stmts),
                        loc: case.loc,
                    })
                    .collect(),
                loc,
            },
            other @ (Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty { .. }) => other,
        }
    }

    fn rewrite_decl(&mut self, mut decl: VarDecl, prelude: &mut Vec<Stmt>) -> VarDecl {
        decl.init = match decl.init {
            Some(Init::Expr(expr))
                if !matches!(decl.ty.unqualified(), CType::Array(..)) =>
            {
                Some(Init::Expr(self.rewrite_expr(expr, prelude)))
            }
            // Array and brace initializers keep their literals.
            other => other,
        };
        decl
    }

    fn rewrite_expr(&mut self, expr: Expr, prelude: &mut Vec<Stmt>) -> Expr {
        match expr {
            Expr::StrLit { bytes, loc } => self.encrypt(&bytes, loc, prelude),
            Expr::Unary { op, expr, loc } => Expr::Unary {
                op,
                expr: Box::new(self.rewrite_expr(*expr, prelude)),
                loc,
            },
            Expr::Binary { op, lhs, rhs, loc } => Expr::Binary {
                op,
                lhs: Box::new(self.rewrite_expr(*lhs, prelude)),
                rhs: Box::new(self.rewrite_expr(*rhs, prelude)),
                loc,
            },
            Expr::Assign {
                op,
                target,
                value,
                loc,
            } => Expr::Assign {
                op,
                target: Box::new(self.rewrite_expr(*target, prelude)),
                value: Box::new(self.rewrite_expr(*value, prelude)),
                loc,
            },
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                loc,
            } => Expr::Ternary {
                cond: Box::new(self.rewrite_expr(*cond, prelude)),
                then_expr: Box::new(self.rewrite_expr(*then_expr, prelude)),
                else_expr: Box::new(self.rewrite_expr(*else_expr, prelude)),
                loc,
            },
            Expr::Call { callee, args, loc } => Expr::Call {
                callee,
                args: args
                    .into_iter()
                    .map(|arg| self.rewrite_expr(arg, prelude))
                    .collect(),
                loc,
            },
            Expr::Index { base, index, loc } => Expr::Index {
                base: Box::new(self.rewrite_expr(*base, prelude)),
                index: Box::new(self.rewrite_expr(*index, prelude)),
                loc,
            },
            Expr::Member {
                base,
                field,
                arrow,
                loc,
            } => Expr::Member {
                base: Box::new(self.rewrite_expr(*base, prelude)),
                field,
                arrow,
                loc,
            },
            Expr::SizeofExpr { expr, loc } => Expr::SizeofExpr {
                expr: Box::new(self.rewrite_expr(*expr, prelude)),
                loc,
            },
            other @ (Expr::IntLit { .. }
            | Expr::CharLit { .. }
            | Expr::Ident { .. }
            | Expr::SizeofType { .. }) => other,
        }
    }

    /// Replaces one literal: mints the ciphertext and key statics, declares
    /// the stack buffer, queues the reveal call, and returns the buffer
    /// reference standing in for the literal.
    fn encrypt(&mut self, bytes: &[u8], loc: Loc, prelude: &mut Vec<Stmt>) -> Expr {
        let n = self.count;
        self.count += 1;
        // Length includes the terminating NUL so the buffer is usable
        // anywhere the literal was.
        let len = bytes.len() + 1;
        let data_name = format!("__umbra_str_{}_{n}", self.func);
        let key_name = format!("__umbra_key_{}_{n}", self.func);
        let buf_name = format!("__umbra_buf_{}_{n}", self.func);

        let mut data = Vec::with_capacity(len);
        let mut key = Vec::with_capacity(len);
        for i in 0..len {
            let k: u8 = self.rng.random();
            let plain = bytes.get(i).copied().unwrap_or(0);
            key.push(k);
            data.push(plain ^ k);
        }
        self.statics.push(byte_array(&data_name, &data));
        self.statics.push(byte_array(&key_name, &key));

        prelude.push(Stmt::Local {
            decl: VarDecl {
                name: buf_name.clone(),
                ty: CType::Array(Box::new(CType::Char), Some(len)),
                init: None,
                is_static: false,
                loc,
            },
        });
        prelude.push(Stmt::Expr {
            expr: Expr::Call {
                callee: REVEAL_HELPER.to_string(),
                args: vec![
                    Expr::ident(&data_name),
                    Expr::ident(&key_name),
                    Expr::int(len as i64),
                    Expr::ident(&buf_name),
                ],
                loc,
            },
            loc,
        });
        Expr::Ident {
            name: buf_name,
            loc,
        }
    }
}

/// `static const unsigned char <name>[<len>] = { ... };`
fn byte_array(name: &str, bytes: &[u8]) -> VarDecl {
    VarDecl {
        name: name.to_string(),
        ty: CType::Array(
            Box::new(CType::Const(Box::new(CType::UChar))),
            Some(bytes.len()),
        ),
        init: Some(Init::List(
            bytes
                .iter()
                .map(|b| Init::Expr(Expr::int(i64::from(*b))))
                .collect(),
        )),
        is_static: true,
        loc: Loc::default(),
    }
}

/// Forward declaration of the reveal helper, emitted ahead of the first use.
pub fn reveal_prototype() -> Function {
    Function {
        name: REVEAL_HELPER.to_string(),
        ret: CType::Void,
        params: reveal_params(),
        variadic: false,
        body: None,
        is_static: true,
        loc: Loc::default(),
    }
}

/// The reveal helper itself:
///
/// ```c
/// static void __umbra_reveal(const unsigned char *data,
///                            const unsigned char *key, int n, char *out) {
///     int i = 0;
///     while (i < n) {
///         out[i] = data[i] ^ key[i];
///         i++;
///     }
/// }
/// ```
pub fn reveal_definition() -> Function {
    let loc = Loc::default();
    let at = |name: &str| {
        Expr::Index {
            base: Box::new(Expr::ident(name)),
            index: Box::new(Expr::ident("i")),
            loc,
        }
    };
    let xor = Expr::Binary {
        op: umbra_core::ast::BinaryOp::BitXor,
        lhs: Box::new(at("data")),
        rhs: Box::new(at("key")),
        loc,
    };
    let store = Stmt::Expr {
        expr: Expr::Assign {
            op: umbra_core::ast::AssignOp::Assign,
            target: Box::new(at("out")),
            value: Box::new(xor),
            loc,
        },
        loc,
    };
    let bump = Stmt::Expr {
        expr: Expr::Unary {
            op: UnaryOp::PostInc,
            expr: Box::new(Expr::ident("i")),
            loc,
        },
        loc,
    };
    let body = vec![
        Stmt::Local {
            decl: VarDecl {
                name: "i".to_string(),
                ty: CType::Int,
                init: Some(Init::Expr(Expr::int(0))),
                is_static: false,
                loc,
            },
        },
        Stmt::While {
            cond: Expr::Binary {
                op: umbra_core::ast::BinaryOp::Lt,
                lhs: Box::new(Expr::ident("i")),
                rhs: Box::new(Expr::ident("n")),
                loc,
            },
            body: Box::new(Stmt::Block {
                stmts: vec![store, bump],
                loc,
            }),
            loc,
        },
    ];
    Function {
        body: Some(body),
        ..reveal_prototype()
    }
}

fn reveal_params() -> Vec<Param> {
    let loc = Loc::default();
    let const_uchar_ptr =
        || CType::Pointer(Box::new(CType::Const(Box::new(CType::UChar))));
    vec![
        Param {
            name: Some("data".to_string()),
            ty: const_uchar_ptr(),
            loc,
        },
        Param {
            name: Some("key".to_string()),
            ty: const_uchar_ptr(),
            loc,
        },
        Param {
            name: Some("n".to_string()),
            ty: CType::Int,
            loc,
        },
        Param {
            name: Some("out".to_string()),
            ty: CType::Pointer(Box::new(CType::Char)),
            loc,
        },
    ]
}
