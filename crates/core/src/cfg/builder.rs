//! Lowers a function body to its control-flow graph.
//!
//! Lowering happens in two phases. The first walks the statement tree into an
//! arena of proto-blocks addressed by plain indices, maintaining break and
//! continue target stacks and a scope stack of local renames. The second
//! phase walks the arena from the first block and materializes only the
//! reachable blocks into the petgraph graph, so the finished
//! [`FunctionCfg`] never contains dead nodes.
//!
//! Every local declaration is alpha-renamed to a fresh name, hoisted into
//! [`FunctionCfg::locals`], and replaced by ordinary assignments at the point
//! of declaration. Brace and string initializers expand element-wise, with
//! unlisted elements zero-filled the way a C initializer would.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::graph::DiGraph;
use umbra_utils::errors::CfgError;

use crate::ast::{
    BinaryOp, CType, Expr, ForInit, Function, Init, Stmt, UnaryOp, VarDecl,
};
use crate::cfg::{BasicBlock, Block, EdgeKind, FunctionCfg, NamePool, Terminator};
use crate::symbols::SymbolTable;
use crate::token::Loc;

/// Builds the control-flow graph for one function.
///
/// A prototype (no body) lowers to a single implicit-return block, which
/// callers treat as not worth transforming.
///
/// # Arguments
/// * `func` - the function to lower
/// * `symbols` - resolved file-scope table, used for enum constants and
///   struct layouts
/// * `file` - file name used in diagnostics
///
/// # Returns
/// The graph, or a [`CfgError`] for orphan `break`/`continue`, non-constant
/// or duplicate case labels, or a repeated `default`.
pub fn build_cfg(
    func: &Function,
    symbols: &SymbolTable,
    file: &str,
) -> Result<FunctionCfg, CfgError> {
    let mut names = NamePool::new();
    for name in symbols.names() {
        names.reserve(name);
    }
    for param in &func.params {
        if let Some(name) = &param.name {
            names.reserve(name);
        }
    }
    let empty = Vec::new();
    let body = func.body.as_ref().unwrap_or(&empty);
    reserve_stmt_names(body, &mut names);

    let mut lowering = Lowering {
        file,
        symbols,
        blocks: Vec::new(),
        names,
        locals: Vec::new(),
        scopes: vec![HashMap::new()],
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
    };

    let first = lowering.new_block();
    let end = lowering.lower_stmts(body, Some(first))?;
    if let Some(open) = end {
        // Falling off the end of the body is an implicit `return;`.
        lowering.seal(open, ProtoTerm::Return(None));
    }

    let cfg = lowering.materialize(func, first);
    tracing::debug!(
        function = %func.name,
        blocks = cfg.body_count(),
        locals = cfg.locals.len(),
        "built control-flow graph"
    );
    Ok(cfg)
}

/// Block under construction, addressed by its index in the arena.
#[derive(Debug)]
struct ProtoBlock {
    stmts: Vec<Stmt>,
    term: Option<ProtoTerm>,
}

#[derive(Debug)]
enum ProtoTerm {
    Jump(usize),
    Branch {
        cond: Expr,
        then_blk: usize,
        else_blk: usize,
    },
    Switch {
        value: Expr,
        cases: Vec<(i64, usize)>,
        default: usize,
    },
    Return(Option<Expr>),
}

struct Lowering<'a> {
    file: &'a str,
    symbols: &'a SymbolTable,
    blocks: Vec<ProtoBlock>,
    names: NamePool,
    locals: Vec<VarDecl>,
    /// Innermost-last stack of original-name to hoisted-name maps.
    scopes: Vec<HashMap<String, String>>,
    break_targets: Vec<usize>,
    continue_targets: Vec<usize>,
}

impl Lowering<'_> {
    fn new_block(&mut self) -> usize {
        self.blocks.push(ProtoBlock {
            stmts: Vec::new(),
            term: None,
        });
        self.blocks.len() - 1
    }

    fn seal(&mut self, block: usize, term: ProtoTerm) {
        debug_assert!(self.blocks[block].term.is_none(), "block sealed twice");
        self.blocks[block].term = Some(term);
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn control_error(&self, kind: &'static str, loc: Loc) -> CfgError {
        CfgError::InvalidControlFlow {
            file: self.file.to_string(),
            line: loc.line,
            col: loc.col,
            kind,
        }
    }

    /// Lowers a statement list into `cur`. Returns the open block after the
    /// last statement, or `None` when control cannot fall out of the list.
    /// Statements after a terminating statement are unreachable and dropped.
    fn lower_stmts(&mut self, stmts: &[Stmt], mut cur: Option<usize>) -> Result<Option<usize>, CfgError> {
        for (index, stmt) in stmts.iter().enumerate() {
            let Some(open) = cur else {
                tracing::debug!(
                    file = self.file,
                    line = stmt.loc().line,
                    dropped = stmts.len() - index,
                    "dropping unreachable statements"
                );
                return Ok(None);
            };
            cur = self.lower_stmt(stmt, open)?;
        }
        Ok(cur)
    }

    fn lower_stmt(&mut self, stmt: &Stmt, cur: usize) -> Result<Option<usize>, CfgError> {
        match stmt {
            Stmt::Empty { .. } => Ok(Some(cur)),
            Stmt::Expr { expr, loc } => {
                let expr = self.rewrite_expr(expr);
                self.blocks[cur].stmts.push(Stmt::Expr { expr, loc: *loc });
                Ok(Some(cur))
            }
            Stmt::Local { decl } => {
                self.lower_local(decl, cur)?;
                Ok(Some(cur))
            }
            Stmt::Block { stmts, .. } => {
                self.push_scope();
                let end = self.lower_stmts(stmts, Some(cur))?;
                self.pop_scope();
                Ok(end)
            }
            Stmt::Return { value, .. } => {
                let value = value.as_ref().map(|v| self.rewrite_expr(v));
                self.seal(cur, ProtoTerm::Return(value));
                Ok(None)
            }
            Stmt::Break { loc } => {
                let Some(&target) = self.break_targets.last() else {
                    return Err(self.control_error("break", *loc));
                };
                self.seal(cur, ProtoTerm::Jump(target));
                Ok(None)
            }
            Stmt::Continue { loc } => {
                let Some(&target) = self.continue_targets.last() else {
                    return Err(self.control_error("continue", *loc));
                };
                self.seal(cur, ProtoTerm::Jump(target));
                Ok(None)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.lower_if(cond, then_branch, else_branch.as_deref(), cur),
            Stmt::While { cond, body, .. } => self.lower_while(cond, body, cur),
            Stmt::DoWhile { body, cond, .. } => self.lower_do_while(body, cond, cur),
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => self.lower_for(init.as_ref(), cond.as_ref(), step.as_ref(), body, cur),
            Stmt::Switch { value, cases, .. } => self.lower_switch(value, cases, cur),
        }
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        cur: usize,
    ) -> Result<Option<usize>, CfgError> {
        let cond = self.rewrite_expr(cond);
        match else_branch {
            None => {
                let then_blk = self.new_block();
                let join = self.new_block();
                self.seal(
                    cur,
                    ProtoTerm::Branch {
                        cond,
                        then_blk,
                        else_blk: join,
                    },
                );
                let then_end = self.lower_stmt(then_branch, then_blk)?;
                if let Some(end) = then_end {
                    self.seal(end, ProtoTerm::Jump(join));
                }
                Ok(Some(join))
            }
            Some(else_stmt) => {
                let then_blk = self.new_block();
                let else_blk = self.new_block();
                self.seal(
                    cur,
                    ProtoTerm::Branch {
                        cond,
                        then_blk,
                        else_blk,
                    },
                );
                let then_end = self.lower_stmt(then_branch, then_blk)?;
                let else_end = self.lower_stmt(else_stmt, else_blk)?;
                if then_end.is_none() && else_end.is_none() {
                    // Both arms leave; whatever follows the `if` is dead.
                    return Ok(None);
                }
                let join = self.new_block();
                if let Some(end) = then_end {
                    self.seal(end, ProtoTerm::Jump(join));
                }
                if let Some(end) = else_end {
                    self.seal(end, ProtoTerm::Jump(join));
                }
                Ok(Some(join))
            }
        }
    }

    fn lower_while(
        &mut self,
        cond: &Expr,
        body: &Stmt,
        cur: usize,
    ) -> Result<Option<usize>, CfgError> {
        let header = self.new_block();
        self.seal(cur, ProtoTerm::Jump(header));
        let body_blk = self.new_block();
        let join = self.new_block();
        let cond = self.rewrite_expr(cond);
        self.seal(
            header,
            ProtoTerm::Branch {
                cond,
                then_blk: body_blk,
                else_blk: join,
            },
        );
        self.break_targets.push(join);
        self.continue_targets.push(header);
        let body_end = self.lower_stmt(body, body_blk)?;
        self.continue_targets.pop();
        self.break_targets.pop();
        if let Some(end) = body_end {
            self.seal(end, ProtoTerm::Jump(header));
        }
        Ok(Some(join))
    }

    fn lower_do_while(
        &mut self,
        body: &Stmt,
        cond: &Expr,
        cur: usize,
    ) -> Result<Option<usize>, CfgError> {
        let body_blk = self.new_block();
        self.seal(cur, ProtoTerm::Jump(body_blk));
        let cond_blk = self.new_block();
        let join = self.new_block();
        self.break_targets.push(join);
        self.continue_targets.push(cond_blk);
        let body_end = self.lower_stmt(body, body_blk)?;
        self.continue_targets.pop();
        self.break_targets.pop();
        if let Some(end) = body_end {
            self.seal(end, ProtoTerm::Jump(cond_blk));
        }
        let cond = self.rewrite_expr(cond);
        self.seal(
            cond_blk,
            ProtoTerm::Branch {
                cond,
                then_blk: body_blk,
                else_blk: join,
            },
        );
        Ok(Some(join))
    }

    fn lower_for(
        &mut self,
        init: Option<&ForInit>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        cur: usize,
    ) -> Result<Option<usize>, CfgError> {
        self.push_scope();
        match init {
            Some(ForInit::Decls(decls)) => {
                for decl in decls {
                    self.lower_local(decl, cur)?;
                }
            }
            Some(ForInit::Expr(expr)) => {
                let expr = self.rewrite_expr(expr);
                let loc = expr.loc();
                self.blocks[cur].stmts.push(Stmt::Expr { expr, loc });
            }
            None => {}
        }
        let header = self.new_block();
        self.seal(cur, ProtoTerm::Jump(header));
        let body_blk = self.new_block();
        let join = self.new_block();
        let cond = match cond {
            Some(cond) => self.rewrite_expr(cond),
            // `for (;;)` loops until something inside breaks or returns.
            None => Expr::int(1),
        };
        self.seal(
            header,
            ProtoTerm::Branch {
                cond,
                then_blk: body_blk,
                else_blk: join,
            },
        );
        // `continue` re-runs the step before the next test.
        let continue_target = match step {
            Some(step) => {
                let step_blk = self.new_block();
                let expr = self.rewrite_expr(step);
                let loc = expr.loc();
                self.blocks[step_blk].stmts.push(Stmt::Expr { expr, loc });
                self.seal(step_blk, ProtoTerm::Jump(header));
                step_blk
            }
            None => header,
        };
        self.break_targets.push(join);
        self.continue_targets.push(continue_target);
        let body_end = self.lower_stmt(body, body_blk)?;
        self.continue_targets.pop();
        self.break_targets.pop();
        if let Some(end) = body_end {
            self.seal(end, ProtoTerm::Jump(continue_target));
        }
        self.pop_scope();
        Ok(Some(join))
    }

    fn lower_switch(
        &mut self,
        value: &Expr,
        cases: &[crate::ast::SwitchCase],
        cur: usize,
    ) -> Result<Option<usize>, CfgError> {
        let value = self.rewrite_expr(value);
        let join = self.new_block();
        let arm_blocks: Vec<usize> = cases.iter().map(|_| self.new_block()).collect();

        let mut case_targets = Vec::new();
        let mut seen = HashSet::new();
        let mut default_blk = None;
        for (case, &arm) in cases.iter().zip(&arm_blocks) {
            match &case.label {
                Some(label) => {
                    let folded = fold_const(label, self.symbols).ok_or_else(|| {
                        CfgError::NonConstantCase {
                            file: self.file.to_string(),
                            line: case.loc.line,
                            col: case.loc.col,
                        }
                    })?;
                    if !seen.insert(folded) {
                        return Err(CfgError::DuplicateCase {
                            file: self.file.to_string(),
                            line: case.loc.line,
                            col: case.loc.col,
                            value: folded,
                        });
                    }
                    case_targets.push((folded, arm));
                }
                None => {
                    if default_blk.is_some() {
                        return Err(CfgError::DuplicateDefault {
                            file: self.file.to_string(),
                            line: case.loc.line,
                            col: case.loc.col,
                        });
                    }
                    default_blk = Some(arm);
                }
            }
        }
        self.seal(
            cur,
            ProtoTerm::Switch {
                value,
                cases: case_targets,
                default: default_blk.unwrap_or(join),
            },
        );

        // A switch is a break target but never a continue target.
        self.break_targets.push(join);
        self.push_scope();
        for (index, (case, &arm)) in cases.iter().zip(&arm_blocks).enumerate() {
            let next = arm_blocks.get(index + 1).copied().unwrap_or(join);
            let end = self.lower_stmts(&case.stmts, Some(arm))?;
            if let Some(open) = end {
                // Source-order fallthrough into the next arm.
                self.seal(open, ProtoTerm::Jump(next));
            }
        }
        self.pop_scope();
        self.break_targets.pop();
        Ok(Some(join))
    }

    /// Hoists one local declaration and lowers its initializer to stores.
    fn lower_local(&mut self, decl: &VarDecl, cur: usize) -> Result<(), CfgError> {
        let fresh = self.names.fresh(&decl.name);
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(decl.name.clone(), fresh.clone());
        self.locals.push(VarDecl {
            name: fresh.clone(),
            ty: strip_stored_const(&sized_from_init(&decl.ty, decl.init.as_ref())),
            init: None,
            is_static: false,
            loc: decl.loc,
        });
        if let Some(init) = &decl.init {
            let target = Expr::Ident {
                name: fresh,
                loc: decl.loc,
            };
            let mut stores = Vec::new();
            self.lower_init(&target, &decl.ty, init, decl.loc, &mut stores);
            self.blocks[cur].stmts.extend(stores);
        }
        Ok(())
    }

    /// Expands an initializer into assignment statements against `target`.
    /// Follows C initializer semantics: string literals fill char arrays
    /// byte-wise with a trailing NUL, brace lists map positionally, and
    /// unlisted elements or fields are zero-filled.
    fn lower_init(&mut self, target: &Expr, ty: &CType, init: &Init, loc: Loc, out: &mut Vec<Stmt>) {
        match (ty.unqualified(), init) {
            (CType::Array(elem, len), Init::Expr(Expr::StrLit { bytes, .. }))
                if elem.is_char_like() =>
            {
                let n = len.unwrap_or(bytes.len() + 1);
                for i in 0..n {
                    let byte = bytes.get(i).copied().unwrap_or(0);
                    out.push(store(
                        index(target.clone(), i, loc),
                        Expr::CharLit { value: byte, loc },
                        loc,
                    ));
                }
            }
            (CType::Array(elem, len), Init::List(items)) => {
                let n = len.unwrap_or(items.len());
                for i in 0..n {
                    let element = index(target.clone(), i, loc);
                    match items.get(i) {
                        Some(item) => self.lower_init(&element, elem, item, loc, out),
                        None => self.zero_fill(&element, elem, loc, out),
                    }
                }
            }
            (_, Init::List(items)) if self.symbols.fields_of(ty).is_some() => {
                let fields = self
                    .symbols
                    .fields_of(ty)
                    .map(|f| f.to_vec())
                    .unwrap_or_default();
                for (i, field) in fields.iter().enumerate() {
                    let member = member(target.clone(), &field.name, loc);
                    match items.get(i) {
                        Some(item) => self.lower_init(&member, &field.ty, item, loc, out),
                        None => self.zero_fill(&member, &field.ty, loc, out),
                    }
                }
            }
            (_, Init::Expr(expr)) => {
                out.push(store(target.clone(), self.rewrite_expr(expr), loc));
            }
            (_, Init::List(items)) => {
                // Braces around a scalar; extra items are dropped the way a
                // C compiler drops excess initializers.
                match items.first() {
                    Some(item) => self.lower_init(target, ty, item, loc, out),
                    None => self.zero_fill(target, ty, loc, out),
                }
            }
        }
    }

    fn zero_fill(&mut self, target: &Expr, ty: &CType, loc: Loc, out: &mut Vec<Stmt>) {
        match ty.unqualified() {
            CType::Array(elem, len) => {
                for i in 0..len.unwrap_or(0) {
                    let element = index(target.clone(), i, loc);
                    self.zero_fill(&element, elem, loc, out);
                }
            }
            other => {
                if let Some(fields) = self.symbols.fields_of(other).map(|f| f.to_vec()) {
                    for field in fields {
                        let member = member(target.clone(), &field.name, loc);
                        self.zero_fill(&member, &field.ty, loc, out);
                    }
                } else {
                    out.push(store(target.clone(), Expr::IntLit { value: 0, loc }, loc));
                }
            }
        }
    }

    fn lookup_rename(&self, name: &str) -> Option<&String> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Rewrites identifier references through the rename stack.
    fn rewrite_expr(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Ident { name, loc } => match self.lookup_rename(name) {
                Some(renamed) => Expr::Ident {
                    name: renamed.clone(),
                    loc: *loc,
                },
                None => expr.clone(),
            },
            Expr::IntLit { .. } | Expr::CharLit { .. } | Expr::StrLit { .. } => expr.clone(),
            Expr::Unary { op, expr, loc } => Expr::Unary {
                op: *op,
                expr: Box::new(self.rewrite_expr(expr)),
                loc: *loc,
            },
            Expr::Binary { op, lhs, rhs, loc } => Expr::Binary {
                op: *op,
                lhs: Box::new(self.rewrite_expr(lhs)),
                rhs: Box::new(self.rewrite_expr(rhs)),
                loc: *loc,
            },
            Expr::Assign {
                op,
                target,
                value,
                loc,
            } => Expr::Assign {
                op: *op,
                target: Box::new(self.rewrite_expr(target)),
                value: Box::new(self.rewrite_expr(value)),
                loc: *loc,
            },
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                loc,
            } => Expr::Ternary {
                cond: Box::new(self.rewrite_expr(cond)),
                then_expr: Box::new(self.rewrite_expr(then_expr)),
                else_expr: Box::new(self.rewrite_expr(else_expr)),
                loc: *loc,
            },
            Expr::Call { callee, args, loc } => Expr::Call {
                callee: callee.clone(),
                args: args.iter().map(|a| self.rewrite_expr(a)).collect(),
                loc: *loc,
            },
            Expr::Index { base, index, loc } => Expr::Index {
                base: Box::new(self.rewrite_expr(base)),
                index: Box::new(self.rewrite_expr(index)),
                loc: *loc,
            },
            Expr::Member {
                base,
                field,
                arrow,
                loc,
            } => Expr::Member {
                base: Box::new(self.rewrite_expr(base)),
                field: field.clone(),
                arrow: *arrow,
                loc: *loc,
            },
            Expr::SizeofExpr { expr, loc } => Expr::SizeofExpr {
                expr: Box::new(self.rewrite_expr(expr)),
                loc: *loc,
            },
            Expr::SizeofType { .. } => expr.clone(),
        }
    }

    /// Materializes reachable proto-blocks into the petgraph graph.
    fn materialize(mut self, func: &Function, first: usize) -> FunctionCfg {
        let mut graph = DiGraph::new();
        let entry = graph.add_node(Block::Entry);
        let exit = graph.add_node(Block::Exit);

        // Breadth-first over terminator targets for a stable node order.
        let mut order = Vec::new();
        let mut map = HashMap::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(first);
        while let Some(id) = queue.pop_front() {
            if map.contains_key(&id) {
                continue;
            }
            let node = graph.add_node(Block::Entry); // placeholder weight
            map.insert(id, node);
            order.push(id);
            match self.blocks[id].term.as_ref() {
                Some(ProtoTerm::Jump(t)) => queue.push_back(*t),
                Some(ProtoTerm::Branch {
                    then_blk, else_blk, ..
                }) => {
                    queue.push_back(*then_blk);
                    queue.push_back(*else_blk);
                }
                Some(ProtoTerm::Switch { cases, default, .. }) => {
                    for (_, target) in cases {
                        queue.push_back(*target);
                    }
                    queue.push_back(*default);
                }
                Some(ProtoTerm::Return(_)) => {}
                None => debug_assert!(false, "reachable block left unsealed"),
            }
        }

        let dropped = self.blocks.len() - order.len();
        if dropped > 0 {
            tracing::debug!(
                function = %func.name,
                dropped,
                "pruned unreachable blocks"
            );
        }

        for id in order {
            let proto = &mut self.blocks[id];
            let stmts = std::mem::take(&mut proto.stmts);
            let node = map[&id];
            let term = match proto.term.take() {
                Some(ProtoTerm::Jump(t)) => {
                    let target = map[&t];
                    graph.add_edge(node, target, EdgeKind::Flow);
                    Terminator::Jump(target)
                }
                Some(ProtoTerm::Branch {
                    cond,
                    then_blk,
                    else_blk,
                }) => {
                    let then_blk = map[&then_blk];
                    let else_blk = map[&else_blk];
                    graph.add_edge(node, then_blk, EdgeKind::BranchTrue);
                    graph.add_edge(node, else_blk, EdgeKind::BranchFalse);
                    Terminator::Branch {
                        cond,
                        then_blk,
                        else_blk,
                    }
                }
                Some(ProtoTerm::Switch {
                    value,
                    cases,
                    default,
                }) => {
                    let mut mapped = IndexMap::new();
                    for (folded, target) in cases {
                        let target = map[&target];
                        graph.add_edge(node, target, EdgeKind::Case(folded));
                        mapped.insert(folded, target);
                    }
                    let default = map[&default];
                    graph.add_edge(node, default, EdgeKind::Default);
                    Terminator::Switch {
                        value,
                        cases: mapped,
                        default,
                    }
                }
                Some(ProtoTerm::Return(value)) => {
                    graph.add_edge(node, exit, EdgeKind::Return);
                    Terminator::Return(value)
                }
                None => Terminator::Return(None),
            };
            graph[node] = Block::Body(BasicBlock { stmts, term });
        }

        graph.add_edge(entry, map[&first], EdgeKind::Flow);

        FunctionCfg {
            name: func.name.clone(),
            ret: func.ret.clone(),
            graph,
            entry,
            exit,
            locals: self.locals,
            names: self.names,
        }
    }
}

fn store(target: Expr, value: Expr, loc: Loc) -> Stmt {
    Stmt::Expr {
        expr: Expr::Assign {
            op: crate::ast::AssignOp::Assign,
            target: Box::new(target),
            value: Box::new(value),
            loc,
        },
        loc,
    }
}

fn index(base: Expr, i: usize, loc: Loc) -> Expr {
    Expr::Index {
        base: Box::new(base),
        index: Box::new(Expr::IntLit {
            value: i as i64,
            loc,
        }),
        loc,
    }
}

fn member(base: Expr, field: &str, loc: Loc) -> Expr {
    Expr::Member {
        base: Box::new(base),
        field: field.to_string(),
        arrow: false,
        loc,
    }
}

/// Drops `const` where it would make the hoisted declaration unassignable:
/// on the scalar itself and on array elements, but never behind a pointer.
fn strip_stored_const(ty: &CType) -> CType {
    match ty {
        CType::Const(inner) => strip_stored_const(inner),
        CType::Array(elem, len) => CType::Array(Box::new(strip_stored_const(elem)), *len),
        other => other.clone(),
    }
}

/// Gives an unsized array its length from the initializer, since the hoisted
/// declaration no longer carries one.
fn sized_from_init(ty: &CType, init: Option<&Init>) -> CType {
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

/// Folds an integer constant expression: literals, enum constants, unary
/// `-`/`+`/`~`, and arithmetic over constants.
fn fold_const(expr: &Expr, symbols: &SymbolTable) -> Option<i64> {
    match expr {
        Expr::IntLit { value, .. } => Some(*value),
        Expr::CharLit { value, .. } => Some(i64::from(*value)),
        Expr::Ident { name, .. } => symbols.enum_value(name),
        Expr::Unary { op, expr, .. } => {
            let inner = fold_const(expr, symbols)?;
            match op {
                UnaryOp::Neg => Some(inner.wrapping_neg()),
                UnaryOp::Plus => Some(inner),
                UnaryOp::BitNot => Some(!inner),
                _ => None,
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let lhs = fold_const(lhs, symbols)?;
            let rhs = fold_const(rhs, symbols)?;
            match op {
                BinaryOp::Add => Some(lhs.wrapping_add(rhs)),
                BinaryOp::Sub => Some(lhs.wrapping_sub(rhs)),
                BinaryOp::Mul => Some(lhs.wrapping_mul(rhs)),
                BinaryOp::Div if rhs != 0 => Some(lhs.wrapping_div(rhs)),
                BinaryOp::Rem if rhs != 0 => Some(lhs.wrapping_rem(rhs)),
                BinaryOp::Shl => Some(lhs.wrapping_shl(rhs as u32)),
                BinaryOp::Shr => Some(lhs.wrapping_shr(rhs as u32)),
                BinaryOp::BitAnd => Some(lhs & rhs),
                BinaryOp::BitOr => Some(lhs | rhs),
                BinaryOp::BitXor => Some(lhs ^ rhs),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Reserves every identifier a statement list mentions so fresh names never
/// collide with anything the function can see.
fn reserve_stmt_names(stmts: &[Stmt], names: &mut NamePool) {
    for stmt in stmts {
        match stmt {
            Stmt::Block { stmts, .. } => reserve_stmt_names(stmts, names),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                reserve_expr_names(cond, names);
                reserve_stmt_names(std::slice::from_ref(then_branch), names);
                if let Some(else_branch) = else_branch {
                    reserve_stmt_names(std::slice::from_ref(else_branch), names);
                }
            }
            Stmt::While { cond, body, .. } | Stmt::DoWhile { body, cond, .. } => {
                reserve_expr_names(cond, names);
                reserve_stmt_names(std::slice::from_ref(body), names);
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                match init {
                    Some(ForInit::Decls(decls)) => {
                        for decl in decls {
                            names.reserve(&decl.name);
                            if let Some(init) = &decl.init {
                                reserve_init_names(init, names);
                            }
                        }
                    }
                    Some(ForInit::Expr(expr)) => reserve_expr_names(expr, names),
                    None => {}
                }
                if let Some(cond) = cond {
                    reserve_expr_names(cond, names);
                }
                if let Some(step) = step {
                    reserve_expr_names(step, names);
                }
                reserve_stmt_names(std::slice::from_ref(body), names);
            }
            Stmt::Switch { value, cases, .. } => {
                reserve_expr_names(value, names);
                for case in cases {
                    if let Some(label) = &case.label {
                        reserve_expr_names(label, names);
                    }
                    reserve_stmt_names(&case.stmts, names);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    reserve_expr_names(value, names);
                }
            }
            Stmt::Expr { expr, .. } => reserve_expr_names(expr, names),
            Stmt::Local { decl } => {
                names.reserve(&decl.name);
                if let Some(init) = &decl.init {
                    reserve_init_names(init, names);
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty { .. } => {}
        }
    }
}

fn reserve_init_names(init: &Init, names: &mut NamePool) {
    match init {
        Init::Expr(expr) => reserve_expr_names(expr, names),
        Init::List(items) => {
            for item in items {
                reserve_init_names(item, names);
            }
        }
    }
}

fn reserve_expr_names(expr: &Expr, names: &mut NamePool) {
    match expr {
        Expr::Ident { name, .. } => names.reserve(name),
        Expr::IntLit { .. } | Expr::CharLit { .. } | Expr::StrLit { .. } => {}
        Expr::Unary { expr, .. } | Expr::SizeofExpr { expr, .. } => {
            reserve_expr_names(expr, names);
        }
        Expr::Binary { lhs, rhs, .. } => {
            reserve_expr_names(lhs, names);
            reserve_expr_names(rhs, names);
        }
        Expr::Assign { target, value, .. } => {
            reserve_expr_names(target, names);
            reserve_expr_names(value, names);
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            reserve_expr_names(cond, names);
            reserve_expr_names(then_expr, names);
            reserve_expr_names(else_expr, names);
        }
        Expr::Call { callee, args, .. } => {
            names.reserve(callee);
            for arg in args {
                reserve_expr_names(arg, names);
            }
        }
        Expr::Index { base, index, .. } => {
            reserve_expr_names(base, names);
            reserve_expr_names(index, names);
        }
        Expr::Member { base, .. } => reserve_expr_names(base, names),
        Expr::SizeofType { .. } => {}
    }
}
