//! A small C evaluator for behavior-equivalence checks.
//!
//! Equivalence tests run a corpus program twice, as written and after
//! obfuscation, and compare return values and captured stdout byte for byte.
//! The evaluator only has to agree with itself across those two runs, not
//! with a hardened C toolchain, so the machine model is deliberately plain:
//! every scalar is one 64-bit cell, pointers are cell indices, chars are
//! masked to a byte on store, and `sizeof` reports conventional widths. The
//! I/O builtins append to an in-memory stdout and read from a scripted stdin
//! instead of touching real streams.

use std::collections::HashMap;

use umbra_core::ast::{
    AssignOp, BinaryOp, CType, Decl, Expr, ForInit, Function, Init, Stmt, UnaryOp, Unit, VarDecl,
};
use umbra_core::parser::parse_unit;
use umbra_core::symbols::{resolve, Symbol, SymbolTable};

/// Evaluation fuel. Running out means a transform broke loop termination.
const STEP_LIMIT: u64 = 4_000_000;

/// Cells below this index are never handed out, so address zero stays
/// distinct from every real object and null-pointer tests behave.
const FIRST_CELL: usize = 16;

/// What a program run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Value returned from the entry function.
    pub ret: i64,
    /// Bytes written through the output builtins, in order.
    pub stdout: String,
}

/// Parses `source` and runs `main` with `stdin` as scripted input.
///
/// Panics on any parse, resolve, or evaluation failure; equivalence tests
/// want those as loud test failures, not values to thread through.
pub fn run(source: &str, stdin: &str) -> Outcome {
    try_run(source, stdin).unwrap_or_else(|err| panic!("evaluation failed: {err}"))
}

/// Fallible form of [`run`].
pub fn try_run(source: &str, stdin: &str) -> Result<Outcome, String> {
    let unit = parse_unit(source, "eval.c").map_err(|err| err.to_string())?;
    let symbols = resolve(&unit).map_err(|err| err.to_string())?;
    let mut interp = Interp::new(&unit, &symbols, stdin)?;
    let ret = interp.call_function("main", &[])?;
    Ok(Outcome {
        ret,
        stdout: interp.stdout,
    })
}

/// Parses `source` and calls `func` with integer arguments, returning its
/// result. Anything the call prints is discarded.
pub fn call(source: &str, func: &str, args: &[i64]) -> i64 {
    let unit = parse_unit(source, "eval.c").unwrap_or_else(|err| panic!("parse failed: {err}"));
    let symbols = resolve(&unit).unwrap_or_else(|err| panic!("resolve failed: {err}"));
    let mut interp = Interp::new(&unit, &symbols, "").unwrap_or_else(|err| panic!("{err}"));
    interp
        .call_function(func, args)
        .unwrap_or_else(|err| panic!("evaluation failed: {err}"))
}

/// A storage location: a starting cell plus the declared type that governs
/// loads, stores, and pointer arithmetic through it.
#[derive(Debug, Clone)]
struct Place {
    addr: usize,
    ty: CType,
}

/// Lexical scope stack for one function activation.
#[derive(Debug, Default)]
struct Frame {
    scopes: Vec<HashMap<String, Place>>,
}

impl Frame {
    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str, place: Place) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), place);
    }

    fn lookup(&self, name: &str) -> Option<Place> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
    }
}

/// How a statement finished.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(i64),
}

struct Interp<'a> {
    symbols: &'a SymbolTable,
    functions: HashMap<&'a str, &'a Function>,
    globals: HashMap<String, Place>,
    memory: Vec<i64>,
    stdin: Vec<u8>,
    stdin_pos: usize,
    stdout: String,
    steps: u64,
}

impl<'a> Interp<'a> {
    fn new(unit: &'a Unit, symbols: &'a SymbolTable, stdin: &str) -> Result<Self, String> {
        let mut interp = Interp {
            symbols,
            functions: HashMap::new(),
            globals: HashMap::new(),
            memory: vec![0; FIRST_CELL],
            stdin: stdin.as_bytes().to_vec(),
            stdin_pos: 0,
            stdout: String::new(),
            steps: 0,
        };
        // The seeded stream globals need storage so taking them by value or
        // passing them to fprintf works; each holds its own address.
        for name in ["stdin", "stdout", "stderr"] {
            let addr = interp.alloc(1);
            interp.memory[addr] = addr as i64;
            interp.globals.insert(
                name.to_string(),
                Place {
                    addr,
                    ty: CType::Pointer(Box::new(CType::Void)),
                },
            );
        }
        let mut frame = Frame::default();
        frame.push();
        for decl in &unit.decls {
            match decl {
                Decl::Function(func) if func.body.is_some() => {
                    interp.functions.insert(func.name.as_str(), func);
                }
                Decl::Global(var) => {
                    let place = interp.alloc_var(var);
                    if let Some(init) = &var.init {
                        interp.init_place(&place, init, &mut frame)?;
                    }
                    interp.globals.insert(var.name.clone(), place);
                }
                _ => {}
            }
        }
        Ok(interp)
    }

    fn call_function(&mut self, name: &str, args: &[i64]) -> Result<i64, String> {
        self.tick()?;
        let Some(func) = self.functions.get(name).copied() else {
            return self.builtin(name, args);
        };
        if args.len() < func.params.len() || (args.len() > func.params.len() && !func.variadic) {
            return Err(format!(
                "`{name}` takes {} arguments, got {}",
                func.params.len(),
                args.len()
            ));
        }
        let mut frame = Frame::default();
        frame.push();
        for (param, &value) in func.params.iter().zip(args) {
            let Some(pname) = &param.name else { continue };
            let ty = match self.canonical(&param.ty) {
                // Array parameters decay to pointers.
                CType::Array(elem, _) => CType::Pointer(elem),
                _ => param.ty.clone(),
            };
            if self.is_struct(&ty) {
                let width = self.cells(&ty);
                let addr = self.alloc(width);
                self.copy_cells(addr, value, width)?;
                frame.bind(pname, Place { addr, ty });
            } else {
                let addr = self.alloc(1);
                self.store(addr as i64, &ty, value)?;
                frame.bind(pname, Place { addr, ty });
            }
        }
        let body = func
            .body
            .as_ref()
            .ok_or_else(|| format!("`{name}` is declared but never defined"))?;
        match self.exec_block(body, &mut frame)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(0),
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], frame: &mut Frame) -> Result<Flow, String> {
        frame.push();
        let mut flow = Flow::Normal;
        for stmt in stmts {
            flow = self.exec_stmt(stmt, frame)?;
            if !matches!(flow, Flow::Normal) {
                break;
            }
        }
        frame.pop();
        Ok(flow)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, String> {
        self.tick()?;
        match stmt {
            Stmt::Block { stmts, .. } => self.exec_block(stmts, frame),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(cond, frame)? != 0 {
                    self.exec_stmt(then_branch, frame)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, frame)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body, .. } => {
                while self.eval(cond, frame)? != 0 {
                    self.tick()?;
                    match self.exec_stmt(body, frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, cond, .. } => {
                loop {
                    self.tick()?;
                    match self.exec_stmt(body, frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    if self.eval(cond, frame)? == 0 {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                frame.push();
                match init {
                    Some(ForInit::Decls(decls)) => {
                        for decl in decls {
                            self.declare_local(decl, frame)?;
                        }
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.eval(expr, frame)?;
                    }
                    None => {}
                }
                let mut flow = Flow::Normal;
                loop {
                    self.tick()?;
                    let keep_going = match cond {
                        Some(cond) => self.eval(cond, frame)? != 0,
                        None => true,
                    };
                    if !keep_going {
                        break;
                    }
                    match self.exec_stmt(body, frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => {
                            flow = ret;
                            break;
                        }
                    }
                    if let Some(step) = step {
                        self.eval(step, frame)?;
                    }
                }
                frame.pop();
                Ok(flow)
            }
            Stmt::Switch { value, cases, .. } => {
                let selector = self.eval(value, frame)?;
                let mut start = None;
                for (index, case) in cases.iter().enumerate() {
                    if let Some(label) = &case.label {
                        if self.eval(label, frame)? == selector {
                            start = Some(index);
                            break;
                        }
                    }
                }
                if start.is_none() {
                    start = cases.iter().position(|case| case.label.is_none());
                }
                let Some(start) = start else {
                    return Ok(Flow::Normal);
                };
                frame.push();
                let mut flow = Flow::Normal;
                'arms: for case in &cases[start..] {
                    for stmt in &case.stmts {
                        match self.exec_stmt(stmt, frame)? {
                            Flow::Normal => {}
                            Flow::Break => break 'arms,
                            other => {
                                flow = other;
                                break 'arms;
                            }
                        }
                    }
                }
                frame.pop();
                Ok(flow)
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Return { value, .. } => {
                let result = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => 0,
                };
                Ok(Flow::Return(result))
            }
            Stmt::Expr { expr, .. } => {
                self.eval(expr, frame)?;
                Ok(Flow::Normal)
            }
            Stmt::Local { decl } => {
                self.declare_local(decl, frame)?;
                Ok(Flow::Normal)
            }
            Stmt::Empty { .. } => Ok(Flow::Normal),
        }
    }

    fn declare_local(&mut self, decl: &VarDecl, frame: &mut Frame) -> Result<(), String> {
        let place = self.alloc_var(decl);
        if let Some(init) = &decl.init {
            self.init_place(&place, init, frame)?;
        }
        frame.bind(&decl.name, place);
        Ok(())
    }

    fn init_place(&mut self, place: &Place, init: &Init, frame: &mut Frame) -> Result<(), String> {
        let ty = self.canonical(&place.ty);
        match (&ty, init) {
            (CType::Array(elem, len), Init::Expr(Expr::StrLit { bytes, .. }))
                if elem.is_char_like() =>
            {
                let count = len.unwrap_or(bytes.len() + 1);
                for i in 0..count {
                    let byte = bytes.get(i).copied().unwrap_or(0);
                    self.store((place.addr + i) as i64, elem, i64::from(byte))?;
                }
                Ok(())
            }
            (CType::Array(elem, _), Init::List(items)) => {
                let width = self.cells(elem).max(1);
                for (i, item) in items.iter().enumerate() {
                    let slot = Place {
                        addr: place.addr + i * width,
                        ty: (**elem).clone(),
                    };
                    self.init_place(&slot, item, frame)?;
                }
                Ok(())
            }
            (_, Init::List(items)) if self.is_struct(&ty) => {
                let symbols = self.symbols;
                let fields = symbols
                    .fields_of(&ty)
                    .ok_or_else(|| "initializer list on a non-struct value".to_string())?;
                let mut offset = 0;
                for (field, item) in fields.iter().zip(items) {
                    let slot = Place {
                        addr: place.addr + offset,
                        ty: field.ty.clone(),
                    };
                    self.init_place(&slot, item, frame)?;
                    offset += self.cells(&field.ty);
                }
                Ok(())
            }
            (_, Init::List(items)) => match items.first() {
                Some(item) => self.init_place(place, item, frame),
                None => Ok(()),
            },
            (_, Init::Expr(expr)) => {
                let value = self.eval(expr, frame)?;
                if self.is_struct(&ty) {
                    let width = self.cells(&ty);
                    self.copy_cells(place.addr, value, width)
                } else {
                    self.store(place.addr as i64, &place.ty, value)?;
                    Ok(())
                }
            }
        }
    }

    fn eval(&mut self, expr: &Expr, frame: &mut Frame) -> Result<i64, String> {
        match expr {
            Expr::IntLit { value, .. } => Ok(*value),
            Expr::CharLit { value, .. } => Ok(i64::from(*value)),
            Expr::StrLit { bytes, .. } => Ok(self.alloc_string(bytes) as i64),
            Expr::Ident { name, .. } => {
                if let Some(place) = frame.lookup(name) {
                    return self.place_value(&place);
                }
                if let Some(place) = self.globals.get(name).cloned() {
                    return self.place_value(&place);
                }
                if let Some(value) = self.symbols.enum_value(name) {
                    return Ok(value);
                }
                Err(format!("unknown identifier `{name}`"))
            }
            Expr::Unary {
                op: UnaryOp::PreInc,
                expr: inner,
                ..
            } => self.step_lvalue(inner, frame, 1, false),
            Expr::Unary {
                op: UnaryOp::PreDec,
                expr: inner,
                ..
            } => self.step_lvalue(inner, frame, -1, false),
            Expr::Unary {
                op: UnaryOp::PostInc,
                expr: inner,
                ..
            } => self.step_lvalue(inner, frame, 1, true),
            Expr::Unary {
                op: UnaryOp::PostDec,
                expr: inner,
                ..
            } => self.step_lvalue(inner, frame, -1, true),
            Expr::Unary {
                op: UnaryOp::AddrOf,
                expr: inner,
                ..
            } => Ok(self.eval_place(inner, frame)?.addr as i64),
            Expr::Unary {
                op: UnaryOp::Deref, ..
            } => {
                let place = self.eval_place(expr, frame)?;
                self.place_value(&place)
            }
            Expr::Unary {
                op, expr: inner, ..
            } => {
                let value = self.eval(inner, frame)?;
                Ok(match op {
                    UnaryOp::Neg => value.wrapping_neg(),
                    UnaryOp::Plus => value,
                    UnaryOp::Not => i64::from(value == 0),
                    UnaryOp::BitNot => !value,
                    _ => unreachable!("lvalue operators are handled above"),
                })
            }
            Expr::Binary { op, lhs, rhs, .. } => self.eval_binary(*op, lhs, rhs, frame),
            Expr::Assign {
                op, target, value, ..
            } => self.eval_assign(*op, target, value, frame),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                if self.eval(cond, frame)? != 0 {
                    self.eval(then_expr, frame)
                } else {
                    self.eval(else_expr, frame)
                }
            }
            Expr::Call { callee, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, frame)?);
                }
                self.call_function(callee, &values)
            }
            Expr::Index { .. } | Expr::Member { .. } => {
                let place = self.eval_place(expr, frame)?;
                self.place_value(&place)
            }
            Expr::SizeofExpr { expr: inner, .. } => {
                let ty = self.type_of(inner, frame)?;
                Ok(self.byte_size(&ty))
            }
            Expr::SizeofType { ty, .. } => Ok(self.byte_size(ty)),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        frame: &mut Frame,
    ) -> Result<i64, String> {
        // Logical operators must not evaluate the right side eagerly.
        match op {
            BinaryOp::LogAnd => {
                if self.eval(lhs, frame)? == 0 {
                    return Ok(0);
                }
                return Ok(i64::from(self.eval(rhs, frame)? != 0));
            }
            BinaryOp::LogOr => {
                if self.eval(lhs, frame)? != 0 {
                    return Ok(1);
                }
                return Ok(i64::from(self.eval(rhs, frame)? != 0));
            }
            _ => {}
        }
        let left = self.eval(lhs, frame)?;
        let right = self.eval(rhs, frame)?;
        Ok(match op {
            BinaryOp::Add => {
                let lhs_elem = self.pointee(&self.type_of(lhs, frame)?);
                let rhs_elem = self.pointee(&self.type_of(rhs, frame)?);
                match (lhs_elem, rhs_elem) {
                    (Some(elem), None) => {
                        left.wrapping_add(right.wrapping_mul(self.cells(&elem).max(1) as i64))
                    }
                    (None, Some(elem)) => {
                        right.wrapping_add(left.wrapping_mul(self.cells(&elem).max(1) as i64))
                    }
                    _ => left.wrapping_add(right),
                }
            }
            BinaryOp::Sub => {
                let lhs_elem = self.pointee(&self.type_of(lhs, frame)?);
                let rhs_elem = self.pointee(&self.type_of(rhs, frame)?);
                match (lhs_elem, rhs_elem) {
                    (Some(elem), None) => {
                        left.wrapping_sub(right.wrapping_mul(self.cells(&elem).max(1) as i64))
                    }
                    (Some(elem), Some(_)) => {
                        left.wrapping_sub(right) / self.cells(&elem).max(1) as i64
                    }
                    _ => left.wrapping_sub(right),
                }
            }
            BinaryOp::Mul => left.wrapping_mul(right),
            BinaryOp::Div => {
                if right == 0 {
                    return Err("division by zero".into());
                }
                left.wrapping_div(right)
            }
            BinaryOp::Rem => {
                if right == 0 {
                    return Err("remainder by zero".into());
                }
                left.wrapping_rem(right)
            }
            BinaryOp::Eq => i64::from(left == right),
            BinaryOp::Ne => i64::from(left != right),
            BinaryOp::Lt => i64::from(left < right),
            BinaryOp::Le => i64::from(left <= right),
            BinaryOp::Gt => i64::from(left > right),
            BinaryOp::Ge => i64::from(left >= right),
            BinaryOp::BitAnd => left & right,
            BinaryOp::BitOr => left | right,
            BinaryOp::BitXor => left ^ right,
            BinaryOp::Shl => left.wrapping_shl(right as u32),
            BinaryOp::Shr => left.wrapping_shr(right as u32),
            BinaryOp::LogAnd | BinaryOp::LogOr => unreachable!("short-circuited above"),
        })
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        frame: &mut Frame,
    ) -> Result<i64, String> {
        let place = self.eval_place(target, frame)?;
        let rhs = self.eval(value, frame)?;
        if matches!(op, AssignOp::Assign) && self.is_struct(&place.ty) {
            let width = self.cells(&place.ty);
            self.copy_cells(place.addr, rhs, width)?;
            return Ok(place.addr as i64);
        }
        let result = match op {
            AssignOp::Assign => rhs,
            AssignOp::Add => self
                .load(place.addr as i64)?
                .wrapping_add(rhs.wrapping_mul(self.stride(&place.ty))),
            AssignOp::Sub => self
                .load(place.addr as i64)?
                .wrapping_sub(rhs.wrapping_mul(self.stride(&place.ty))),
            AssignOp::Mul => self.load(place.addr as i64)?.wrapping_mul(rhs),
            AssignOp::Div => {
                if rhs == 0 {
                    return Err("division by zero".into());
                }
                self.load(place.addr as i64)?.wrapping_div(rhs)
            }
            AssignOp::Rem => {
                if rhs == 0 {
                    return Err("remainder by zero".into());
                }
                self.load(place.addr as i64)?.wrapping_rem(rhs)
            }
        };
        self.store(place.addr as i64, &place.ty, result)
    }

    /// Shared implementation of the four `++`/`--` forms.
    fn step_lvalue(
        &mut self,
        inner: &Expr,
        frame: &mut Frame,
        delta: i64,
        postfix: bool,
    ) -> Result<i64, String> {
        let place = self.eval_place(inner, frame)?;
        let old = self.load(place.addr as i64)?;
        let stepped = old.wrapping_add(delta.wrapping_mul(self.stride(&place.ty)));
        let new = self.store(place.addr as i64, &place.ty, stepped)?;
        Ok(if postfix { old } else { new })
    }

    /// Resolves an lvalue expression to its storage location. Side effects in
    /// subexpressions run exactly once.
    fn eval_place(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Place, String> {
        match expr {
            Expr::Ident { name, .. } => frame
                .lookup(name)
                .or_else(|| self.globals.get(name).cloned())
                .ok_or_else(|| format!("`{name}` is not assignable")),
            Expr::Unary {
                op: UnaryOp::Deref,
                expr: inner,
                ..
            } => {
                let addr = self.eval(inner, frame)?;
                let ty = self
                    .pointee(&self.type_of(inner, frame)?)
                    .ok_or_else(|| "dereference of a non-pointer value".to_string())?;
                Ok(Place {
                    addr: checked_addr(addr)?,
                    ty,
                })
            }
            Expr::Index { base, index, .. } => {
                let start = self.eval(base, frame)?;
                let offset = self.eval(index, frame)?;
                let elem = self
                    .pointee(&self.type_of(base, frame)?)
                    .ok_or_else(|| "indexing a non-pointer value".to_string())?;
                let addr = start.wrapping_add(offset.wrapping_mul(self.cells(&elem).max(1) as i64));
                Ok(Place {
                    addr: checked_addr(addr)?,
                    ty: elem,
                })
            }
            Expr::Member {
                base, field, arrow, ..
            } => {
                let (base_addr, base_ty) = if *arrow {
                    let addr = self.eval(base, frame)?;
                    let ty = self
                        .pointee(&self.type_of(base, frame)?)
                        .ok_or_else(|| "`->` on a non-pointer value".to_string())?;
                    (checked_addr(addr)?, ty)
                } else {
                    let place = self.eval_place(base, frame)?;
                    (place.addr, place.ty)
                };
                self.field_place(base_addr, &base_ty, field)
            }
            other => Err(format!(
                "expression at {}:{} is not assignable",
                other.loc().line,
                other.loc().col
            )),
        }
    }

    /// Reads a place as an rvalue; arrays and structs decay to their address.
    fn place_value(&self, place: &Place) -> Result<i64, String> {
        let ty = self.canonical(&place.ty);
        if matches!(ty, CType::Array(..)) || self.symbols.fields_of(&ty).is_some() {
            return Ok(place.addr as i64);
        }
        self.load(place.addr as i64)
    }

    fn field_place(&self, base_addr: usize, base_ty: &CType, field: &str) -> Result<Place, String> {
        let fields = self
            .symbols
            .fields_of(base_ty)
            .ok_or_else(|| format!("`.{field}` applied to a non-struct value"))?;
        let mut offset = 0;
        for candidate in fields {
            if candidate.name == field {
                return Ok(Place {
                    addr: base_addr + offset,
                    ty: candidate.ty.clone(),
                });
            }
            offset += self.cells(&candidate.ty);
        }
        Err(format!("no field named `{field}`"))
    }

    /// Static type of an expression, enough to drive pointer arithmetic and
    /// `sizeof`. Never evaluates anything.
    fn type_of(&self, expr: &Expr, frame: &Frame) -> Result<CType, String> {
        Ok(match expr {
            Expr::IntLit { .. }
            | Expr::CharLit { .. }
            | Expr::SizeofExpr { .. }
            | Expr::SizeofType { .. } => CType::Int,
            Expr::StrLit { bytes, .. } => {
                CType::Array(Box::new(CType::Char), Some(bytes.len() + 1))
            }
            Expr::Ident { name, .. } => {
                if let Some(place) = frame.lookup(name) {
                    place.ty
                } else if let Some(place) = self.globals.get(name) {
                    place.ty.clone()
                } else if self.symbols.enum_value(name).is_some() {
                    CType::Int
                } else {
                    return Err(format!("unknown identifier `{name}`"));
                }
            }
            Expr::Unary {
                op, expr: inner, ..
            } => match op {
                UnaryOp::AddrOf => CType::Pointer(Box::new(self.type_of(inner, frame)?)),
                UnaryOp::Deref => self
                    .pointee(&self.type_of(inner, frame)?)
                    .ok_or_else(|| "dereference of a non-pointer value".to_string())?,
                UnaryOp::Not => CType::Int,
                _ => self.type_of(inner, frame)?,
            },
            Expr::Binary { op, lhs, rhs, .. } => match op {
                BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::LogAnd
                | BinaryOp::LogOr => CType::Int,
                BinaryOp::Add | BinaryOp::Sub => {
                    let lhs_ty = self.type_of(lhs, frame)?;
                    if self.pointee(&lhs_ty).is_some() {
                        let rhs_ty = self.type_of(rhs, frame)?;
                        if *op == BinaryOp::Sub && self.pointee(&rhs_ty).is_some() {
                            CType::Int
                        } else {
                            lhs_ty
                        }
                    } else {
                        let rhs_ty = self.type_of(rhs, frame)?;
                        if self.pointee(&rhs_ty).is_some() {
                            rhs_ty
                        } else {
                            CType::Int
                        }
                    }
                }
                _ => CType::Int,
            },
            Expr::Assign { target, .. } => self.type_of(target, frame)?,
            Expr::Ternary { then_expr, .. } => self.type_of(then_expr, frame)?,
            Expr::Call { callee, .. } => match self.symbols.lookup(callee) {
                Some(Symbol::Function(sig)) => sig.ret.clone(),
                _ => CType::Int,
            },
            Expr::Index { base, .. } => self
                .pointee(&self.type_of(base, frame)?)
                .ok_or_else(|| "indexing a non-pointer value".to_string())?,
            Expr::Member {
                base, field, arrow, ..
            } => {
                let base_ty = if *arrow {
                    self.pointee(&self.type_of(base, frame)?)
                        .ok_or_else(|| "`->` on a non-pointer value".to_string())?
                } else {
                    self.type_of(base, frame)?
                };
                let symbols = self.symbols;
                let fields = symbols
                    .fields_of(&base_ty)
                    .ok_or_else(|| format!("`.{field}` applied to a non-struct value"))?;
                fields
                    .iter()
                    .find(|candidate| candidate.name == *field)
                    .map(|candidate| candidate.ty.clone())
                    .ok_or_else(|| format!("no field named `{field}`"))?
            }
        })
    }

    /// Resolves typedef names down to the underlying type and strips `const`.
    fn canonical(&self, ty: &CType) -> CType {
        match ty.unqualified() {
            CType::Named(name) => match self.symbols.lookup(name) {
                Some(Symbol::Typedef { ty }) => self.canonical(ty),
                _ => CType::Int,
            },
            other => other.clone(),
        }
    }

    /// Element type reached through a pointer or array value of `ty`.
    fn pointee(&self, ty: &CType) -> Option<CType> {
        match self.canonical(ty) {
            CType::Pointer(inner) => Some(*inner),
            CType::Array(elem, _) => Some(*elem),
            _ => None,
        }
    }

    /// Cells a value of `ty` occupies. Every scalar is one cell.
    fn cells(&self, ty: &CType) -> usize {
        match self.canonical(ty) {
            CType::Array(elem, len) => self.cells(&elem).max(1) * len.unwrap_or(1),
            other => {
                if let Some(fields) = self.symbols.fields_of(&other) {
                    fields
                        .iter()
                        .map(|field| self.cells(&field.ty))
                        .sum::<usize>()
                        .max(1)
                } else {
                    1
                }
            }
        }
    }

    /// Cells one `++` moves a value of `ty`: the element width for pointers,
    /// one for everything else.
    fn stride(&self, ty: &CType) -> i64 {
        match self.pointee(ty) {
            Some(elem) => self.cells(&elem).max(1) as i64,
            None => 1,
        }
    }

    /// Byte width `sizeof` reports: chars one byte, ints four, pointers
    /// eight, a struct the unpadded sum of its fields.
    fn byte_size(&self, ty: &CType) -> i64 {
        match self.canonical(ty) {
            CType::Void | CType::Char | CType::UChar => 1,
            CType::Int | CType::Enum(_) => 4,
            CType::Pointer(_) => 8,
            CType::Array(elem, len) => self.byte_size(&elem) * len.unwrap_or(1) as i64,
            other => {
                if let Some(fields) = self.symbols.fields_of(&other) {
                    fields.iter().map(|field| self.byte_size(&field.ty)).sum()
                } else {
                    4
                }
            }
        }
    }

    fn is_struct(&self, ty: &CType) -> bool {
        self.symbols.fields_of(ty).is_some()
    }

    fn alloc(&mut self, cells: usize) -> usize {
        let addr = self.memory.len();
        self.memory.resize(addr + cells, 0);
        addr
    }

    fn alloc_var(&mut self, decl: &VarDecl) -> Place {
        let ty = sized(&decl.ty, decl.init.as_ref());
        let width = self.cells(&ty).max(1);
        Place {
            addr: self.alloc(width),
            ty,
        }
    }

    fn alloc_string(&mut self, bytes: &[u8]) -> usize {
        let addr = self.alloc(bytes.len() + 1);
        for (i, byte) in bytes.iter().enumerate() {
            self.memory[addr + i] = i64::from(*byte);
        }
        addr
    }

    fn load(&self, addr: i64) -> Result<i64, String> {
        let index = checked_addr(addr)?;
        if index >= self.memory.len() {
            return Err(format!("load through bad address {addr}"));
        }
        Ok(self.memory[index])
    }

    fn store(&mut self, addr: i64, ty: &CType, value: i64) -> Result<i64, String> {
        let index = checked_addr(addr)?;
        if index >= self.memory.len() {
            return Err(format!("store through bad address {addr}"));
        }
        let stored = if self.canonical(ty).is_char_like() {
            value & 0xff
        } else {
            value
        };
        self.memory[index] = stored;
        Ok(stored)
    }

    fn copy_cells(&mut self, dst: usize, src: i64, count: usize) -> Result<(), String> {
        for i in 0..count {
            let value = self.load(src.wrapping_add(i as i64))?;
            let index = dst + i;
            if index < FIRST_CELL || index >= self.memory.len() {
                return Err(format!("store through bad address {index}"));
            }
            self.memory[index] = value;
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), String> {
        self.steps += 1;
        if self.steps > STEP_LIMIT {
            return Err("step limit exceeded".into());
        }
        Ok(())
    }

    fn builtin(&mut self, name: &str, args: &[i64]) -> Result<i64, String> {
        match name {
            "printf" => {
                let fmt = self.read_cstring(arg(args, 0)?)?;
                let text = self.format(&fmt, &args[1..])?;
                self.push_str(&text);
                Ok(text.len() as i64)
            }
            "fprintf" => {
                // Streams are not separated; diagnostics land in the same
                // capture buffer as stdout.
                let fmt = self.read_cstring(arg(args, 1)?)?;
                let text = self.format(&fmt, &args[2..])?;
                self.push_str(&text);
                Ok(text.len() as i64)
            }
            "sprintf" => {
                let fmt = self.read_cstring(arg(args, 1)?)?;
                let text = self.format(&fmt, &args[2..])?;
                self.write_cstring(arg(args, 0)?, text.as_bytes())?;
                Ok(text.len() as i64)
            }
            "snprintf" => {
                let limit = arg(args, 1)?;
                let fmt = self.read_cstring(arg(args, 2)?)?;
                let text = self.format(&fmt, &args[3..])?;
                if limit > 0 {
                    let keep = text.len().min(limit as usize - 1);
                    self.write_cstring(arg(args, 0)?, &text.as_bytes()[..keep])?;
                }
                Ok(text.len() as i64)
            }
            "scanf" => self.scanf(args),
            "puts" => {
                let bytes = self.read_cstring(arg(args, 0)?)?;
                self.push_bytes(&bytes);
                self.stdout.push('\n');
                Ok(0)
            }
            "putchar" => {
                let value = arg(args, 0)?;
                self.stdout.push((value as u8) as char);
                Ok(value)
            }
            "getchar" => Ok(match self.read_byte() {
                Some(byte) => i64::from(byte),
                None => -1,
            }),
            "strcmp" => {
                let a = self.read_cstring(arg(args, 0)?)?;
                let b = self.read_cstring(arg(args, 1)?)?;
                Ok(order(&a, &b))
            }
            "strncmp" => {
                let limit = arg(args, 2)?.max(0) as usize;
                let a = self.read_cstring(arg(args, 0)?)?;
                let b = self.read_cstring(arg(args, 1)?)?;
                Ok(order(
                    &a[..a.len().min(limit)],
                    &b[..b.len().min(limit)],
                ))
            }
            "strcpy" => {
                let dst = arg(args, 0)?;
                let src = self.read_cstring(arg(args, 1)?)?;
                self.write_cstring(dst, &src)?;
                Ok(dst)
            }
            "strcat" => {
                let dst = arg(args, 0)?;
                let mut joined = self.read_cstring(dst)?;
                joined.extend(self.read_cstring(arg(args, 1)?)?);
                self.write_cstring(dst, &joined)?;
                Ok(dst)
            }
            "strlen" => Ok(self.read_cstring(arg(args, 0)?)?.len() as i64),
            other => Err(format!("call to undefined function `{other}`")),
        }
    }

    /// Renders a printf-style format. Width, precision, and length flags are
    /// accepted and ignored; both sides of an equivalence check go through
    /// this same renderer, so fidelity to a real libc is not required.
    fn format(&mut self, fmt: &[u8], args: &[i64]) -> Result<String, String> {
        let mut out = String::new();
        let mut next = 0;
        let mut i = 0;
        while i < fmt.len() {
            if fmt[i] != b'%' {
                out.push(fmt[i] as char);
                i += 1;
                continue;
            }
            i += 1;
            if fmt.get(i) == Some(&b'%') {
                out.push('%');
                i += 1;
                continue;
            }
            while matches!(
                fmt.get(i),
                Some(&b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b' ' | b'#' | b'.' | b'0')
            ) {
                i += 1;
            }
            while matches!(fmt.get(i), Some(&(b'l' | b'h' | b'z'))) {
                i += 1;
            }
            let conv = *fmt.get(i).ok_or("dangling `%` in format string")?;
            i += 1;
            let value = arg(args, next)?;
            next += 1;
            match conv {
                b'd' | b'i' => out.push_str(&value.to_string()),
                b'u' => out.push_str(&(value as u64).to_string()),
                b'x' => out.push_str(&format!("{value:x}")),
                b'c' => out.push((value as u8) as char),
                b's' => {
                    let bytes = self.read_cstring(value)?;
                    out.extend(bytes.iter().map(|&b| b as char));
                }
                other => return Err(format!("unsupported conversion `%{}`", other as char)),
            }
        }
        Ok(out)
    }

    fn scanf(&mut self, args: &[i64]) -> Result<i64, String> {
        let fmt = self.read_cstring(arg(args, 0)?)?;
        let mut next = 1;
        let mut assigned = 0i64;
        let mut i = 0;
        while i < fmt.len() {
            let directive = fmt[i];
            if directive.is_ascii_whitespace() {
                self.skip_ws();
                i += 1;
                continue;
            }
            if directive != b'%' {
                match self.peek_byte() {
                    Some(byte) if byte == directive => {
                        self.stdin_pos += 1;
                        i += 1;
                    }
                    _ => break,
                }
                continue;
            }
            i += 1;
            let mut width = 0usize;
            while i < fmt.len() && fmt[i].is_ascii_digit() {
                width = width * 10 + usize::from(fmt[i] - b'0');
                i += 1;
            }
            let conv = *fmt.get(i).ok_or("dangling `%` in scanf format")?;
            i += 1;
            match conv {
                b'd' => {
                    self.skip_ws();
                    let Some(value) = self.read_int() else { break };
                    self.store(arg(args, next)?, &CType::Int, value)?;
                    next += 1;
                    assigned += 1;
                }
                b'c' => {
                    let Some(byte) = self.read_byte() else { break };
                    self.store(arg(args, next)?, &CType::Char, i64::from(byte))?;
                    next += 1;
                    assigned += 1;
                }
                b's' => {
                    self.skip_ws();
                    let limit = if width == 0 { usize::MAX } else { width };
                    let mut bytes = Vec::new();
                    while bytes.len() < limit {
                        match self.peek_byte() {
                            Some(byte) if !byte.is_ascii_whitespace() => {
                                bytes.push(byte);
                                self.stdin_pos += 1;
                            }
                            _ => break,
                        }
                    }
                    if bytes.is_empty() {
                        break;
                    }
                    self.write_cstring(arg(args, next)?, &bytes)?;
                    next += 1;
                    assigned += 1;
                }
                other => {
                    return Err(format!("unsupported scanf conversion `%{}`", other as char))
                }
            }
        }
        // Input failure before the first conversion reports end of file.
        if assigned == 0 && self.stdin_pos >= self.stdin.len() {
            return Ok(-1);
        }
        Ok(assigned)
    }

    fn read_cstring(&self, ptr: i64) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::new();
        let mut addr = ptr;
        loop {
            let byte = (self.load(addr)? & 0xff) as u8;
            if byte == 0 {
                return Ok(bytes);
            }
            bytes.push(byte);
            addr += 1;
        }
    }

    fn write_cstring(&mut self, ptr: i64, bytes: &[u8]) -> Result<(), String> {
        for (i, byte) in bytes.iter().enumerate() {
            self.store(ptr + i as i64, &CType::Char, i64::from(*byte))?;
        }
        self.store(ptr + bytes.len() as i64, &CType::Char, 0)?;
        Ok(())
    }

    fn push_str(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    /// Appends raw bytes one-to-one, matching how `format` renders `%s`.
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.stdout.extend(bytes.iter().map(|&b| b as char));
    }

    fn peek_byte(&self) -> Option<u8> {
        self.stdin.get(self.stdin_pos).copied()
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = self.peek_byte()?;
        self.stdin_pos += 1;
        Some(byte)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_whitespace()) {
            self.stdin_pos += 1;
        }
    }

    fn read_int(&mut self) -> Option<i64> {
        let mut pos = self.stdin_pos;
        let mut sign = 1i64;
        match self.stdin.get(pos) {
            Some(b'-') => {
                sign = -1;
                pos += 1;
            }
            Some(b'+') => pos += 1,
            _ => {}
        }
        let digits = pos;
        let mut value = 0i64;
        while let Some(byte) = self.stdin.get(pos) {
            if !byte.is_ascii_digit() {
                break;
            }
            value = value.wrapping_mul(10).wrapping_add(i64::from(byte - b'0'));
            pos += 1;
        }
        if pos == digits {
            return None;
        }
        self.stdin_pos = pos;
        Some(sign * value)
    }
}

/// Completes an inferred array length from the initializer, the way the
/// declaration reads after C's own inference.
fn sized(ty: &CType, init: Option<&Init>) -> CType {
    match (ty, init) {
        (CType::Array(elem, None), Some(Init::Expr(Expr::StrLit { bytes, .. }))) => {
            CType::Array(elem.clone(), Some(bytes.len() + 1))
        }
        (CType::Array(elem, None), Some(Init::List(items))) => {
            CType::Array(elem.clone(), Some(items.len()))
        }
        _ => ty.clone(),
    }
}

fn checked_addr(addr: i64) -> Result<usize, String> {
    match usize::try_from(addr) {
        Ok(index) if index >= FIRST_CELL => Ok(index),
        _ => Err(format!("access through bad address {addr}")),
    }
}

fn arg(args: &[i64], index: usize) -> Result<i64, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("missing call argument {index}"))
}

/// Lexicographic byte comparison with the sign convention of `strcmp`.
fn order(a: &[u8], b: &[u8]) -> i64 {
    let shared = a.len().min(b.len());
    for i in 0..shared {
        if a[i] != b[i] {
            return i64::from(a[i]) - i64::from(b[i]);
        }
    }
    a.len() as i64 - b.len() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_and_branches() {
        let source =
            "int main(void) { int x = 7; if (x > 3) { x = x * 2; } else { x = 0; } return x - 4; }";
        assert_eq!(run(source, "").ret, 10);
    }

    #[test]
    fn loops_accumulate() {
        let source =
            "int main(void) { int s = 0; int i; for (i = 1; i <= 4; i++) { s += i; } return s; }";
        assert_eq!(run(source, "").ret, 10);
    }

    #[test]
    fn do_while_runs_the_body_first() {
        let source = "int main(void) { int n = 0; do { n++; } while (n < 0); return n; }";
        assert_eq!(run(source, "").ret, 1);
    }

    #[test]
    fn switch_falls_through_without_break() {
        let source = r#"
            int pick(int x) {
                int r = 0;
                switch (x) {
                case 1: r += 1;
                case 2: r += 2; break;
                case 3: r += 3; break;
                default: r = 99;
                }
                return r;
            }
            int main(void) { return pick(1) * 100 + pick(2) * 10 + pick(9); }
        "#;
        assert_eq!(run(source, "").ret, 419);
    }

    #[test]
    fn recursion_terminates() {
        let source = "int fact(int n) { if (n <= 1) { return 1; } return n * fact(n - 1); } \
                      int main(void) { return fact(5); }";
        assert_eq!(run(source, "").ret, 120);
    }

    #[test]
    fn printf_renders_ints_chars_and_strings() {
        let source = r#"
            int main(void) {
                printf("n=%d c=%c s=%s %d%%\n", 42, 'A', "ok", -7);
                return 0;
            }
        "#;
        assert_eq!(run(source, "").stdout, "n=42 c=A s=ok -7%\n");
    }

    #[test]
    fn pointers_and_arrays_share_storage() {
        let source = r#"
            int main(void) {
                int a[3];
                int *p = a;
                a[0] = 5;
                *(p + 2) = 9;
                p[1] = a[0] + 1;
                return a[0] + a[1] + a[2];
            }
        "#;
        assert_eq!(run(source, "").ret, 20);
    }

    #[test]
    fn structs_nest_and_copy() {
        let source = r#"
            struct Point { int x; int y; };
            struct Rect { struct Point min; struct Point max; };
            int main(void) {
                struct Rect r;
                struct Point p;
                r.min.x = 1;
                r.min.y = 2;
                r.max.x = 4;
                r.max.y = 6;
                p = r.max;
                return (r.max.x - r.min.x) * (p.y - r.min.y);
            }
        "#;
        assert_eq!(run(source, "").ret, 12);
    }

    #[test]
    fn strcmp_orders_and_strcpy_copies() {
        let source = r#"
            int main(void) {
                char buf[16];
                strcpy(buf, "abc");
                strcat(buf, "de");
                if (strcmp(buf, "abcde") != 0) { return 1; }
                if (strcmp("abc", "abd") >= 0) { return 2; }
                if (strncmp("abcde", "abcxx", 3) != 0) { return 3; }
                return strlen(buf);
            }
        "#;
        assert_eq!(run(source, "").ret, 5);
    }

    #[test]
    fn scanf_reads_ints_until_eof() {
        let source = r#"
            int main(void) {
                int n;
                int sum = 0;
                while (scanf("%d", &n) == 1) {
                    sum += n;
                }
                return sum;
            }
        "#;
        assert_eq!(run(source, "3 4 10").ret, 17);
    }

    #[test]
    fn getchar_hits_eof_as_minus_one() {
        let source = r#"
            int main(void) {
                int count = 0;
                int c;
                while ((c = getchar()) != EOF) {
                    if (c == 'a') { count++; }
                }
                return count;
            }
        "#;
        assert_eq!(run(source, "banana").ret, 3);
    }

    #[test]
    fn sizeof_follows_the_declared_model() {
        let source = r#"
            struct Pair { int a; char b; };
            int main(void) {
                int xs[10];
                xs[0] = 0;
                return sizeof(int) + sizeof(char) + sizeof(struct Pair) + sizeof xs;
            }
        "#;
        assert_eq!(run(source, "").ret, 4 + 1 + 5 + 40);
    }

    #[test]
    fn enum_constants_fold() {
        let source = r#"
            enum Mode { IDLE, RUN = 5, DONE };
            int main(void) { return IDLE + RUN + DONE; }
        "#;
        assert_eq!(run(source, "").ret, 11);
    }

    #[test]
    fn globals_initialize_in_declaration_order() {
        let source = r#"
            int base = 40;
            int scaled;
            int main(void) {
                scaled = base + 2;
                return scaled;
            }
        "#;
        assert_eq!(run(source, "").ret, 42);
    }

    #[test]
    fn ternary_and_logical_operators_short_circuit() {
        let source = r#"
            int bump(int *p) { *p = *p + 1; return 1; }
            int main(void) {
                int calls = 0;
                int a = 0 && bump(&calls);
                int b = 1 || bump(&calls);
                int c = calls == 0 ? 10 : 20;
                return a + b + c;
            }
        "#;
        assert_eq!(run(source, "").ret, 11);
    }

    #[test]
    fn infinite_loops_run_out_of_fuel() {
        let err = try_run("int main(void) { while (1) { } return 0; }", "").unwrap_err();
        assert!(err.contains("step limit"), "unexpected error: {err}");
    }

    #[test]
    fn call_invokes_a_single_function() {
        let source = "int add(int a, int b) { return a + b; } int main(void) { return 0; }";
        assert_eq!(call(source, "add", &[2, 40]), 42);
    }
}
