//! Control-flow flattening.
//!
//! Rebuilds a function body as a state-machine dispatcher: every basic block
//! becomes one `case` arm of a `switch` driven inside a `while` loop, and
//! the graph's edges become assignments to the state variable. Block-to-state
//! numbering is drawn from the per-function RNG and the arms are emitted in
//! state order, so the printed arm order carries no trace of the original
//! statement order.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use umbra_core::ast::{
    AssignOp, BinaryOp, CType, Expr, Init, Stmt, SwitchCase, VarDecl,
};
use umbra_core::cfg::{Block, FunctionCfg, Terminator};
use umbra_core::token::Loc;
use umbra_utils::errors::TransformError;

use crate::{FunctionBundle, Transform};

/// State value that stops the dispatcher loop.
const EXIT_STATE: i64 = -1;

pub struct FlattenControlFlow;

impl Transform for FlattenControlFlow {
    fn name(&self) -> &'static str {
        "FlattenControlFlow"
    }

    fn apply(
        &self,
        bundle: &mut FunctionBundle,
        rng: &mut StdRng,
    ) -> Result<bool, TransformError> {
        if bundle.cfg.body_count() <= 1 {
            debug!(
                function = %bundle.cfg.name,
                "fewer than two body blocks, nothing to flatten"
            );
            return Ok(false);
        }
        let body = dispatch_body(&mut bundle.cfg, rng)?;
        bundle.func.body = Some(body);
        bundle.flattened = true;
        debug!(
            function = %bundle.cfg.name,
            blocks = bundle.cfg.body_count(),
            "flattened into dispatcher loop"
        );
        Ok(true)
    }
}

/// Builds the replacement body: hoisted locals, the return accumulator, the
/// state variable, the dispatcher loop, and the final return.
fn dispatch_body(cfg: &mut FunctionCfg, rng: &mut StdRng) -> Result<Vec<Stmt>, TransformError> {
    let nodes: Vec<NodeIndex> = cfg
        .graph
        .node_indices()
        .filter(|&n| matches!(cfg.graph[n], Block::Body(_)))
        .collect();

    let mut states: Vec<i64> = (0..nodes.len() as i64).collect();
    states.shuffle(rng);
    let state_of: HashMap<NodeIndex, i64> =
        nodes.iter().copied().zip(states.iter().copied()).collect();

    let entry = cfg
        .first_body()
        .ok_or_else(|| TransformError::Invariant("function has no entry block".into()))?;
    let entry_state = state_id(&state_of, entry)?;

    let state_var = cfg.names.fresh("state");
    let ret_var = match cfg.ret.unqualified() {
        CType::Void => None,
        _ => Some(cfg.names.fresh("ret")),
    };

    let mut arms: Vec<(i64, SwitchCase)> = Vec::with_capacity(nodes.len());
    for &node in &nodes {
        let Block::Body(block) = &cfg.graph[node] else {
            continue;
        };
        let state = state_id(&state_of, node)?;
        let mut stmts = block.stmts.clone();
        match &block.term {
            Terminator::Jump(target) => {
                stmts.push(assign(
                    &state_var,
                    Expr::int(state_id(&state_of, *target)?),
                ));
            }
            Terminator::Branch {
                cond,
                then_blk,
                else_blk,
            } => {
                // One ternary keeps the two successors in a single statement.
                let next = Expr::Ternary {
                    cond: Box::new(cond.clone()),
                    then_expr: Box::new(Expr::int(state_id(&state_of, *then_blk)?)),
                    else_expr: Box::new(Expr::int(state_id(&state_of, *else_blk)?)),
                    loc: Loc::default(),
                };
                stmts.push(assign(&state_var, next));
            }
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                let mut inner = Vec::with_capacity(cases.len() + 1);
                for (case_value, target) in cases {
                    inner.push(SwitchCase {
                        label: Some(Expr::int(*case_value)),
                        stmts: vec![
                            assign(&state_var, Expr::int(state_id(&state_of, *target)?)),
                            Stmt::Break {
                                loc: Loc::default(),
                            },
                        ],
                        loc: Loc::default(),
                    });
                }
                inner.push(SwitchCase {
                    label: None,
                    stmts: vec![
                        assign(&state_var, Expr::int(state_id(&state_of, *default)?)),
                        Stmt::Break {
                            loc: Loc::default(),
                        },
                    ],
                    loc: Loc::default(),
                });
                stmts.push(Stmt::Switch {
                    value: value.clone(),
                    cases: inner,
                    loc: Loc::default(),
                });
            }
            Terminator::Return(value) => {
                match (&ret_var, value) {
                    (Some(ret), Some(expr)) => {
                        stmts.push(assign(ret, expr.clone()));
                    }
                    (None, Some(expr)) => {
                        // Void function returning an expression: keep the
                        // evaluation for its side effects.
                        stmts.push(Stmt::Expr {
                            expr: expr.clone(),
                            loc: Loc::default(),
                        });
                    }
                    (_, None) => {}
                }
                stmts.push(assign(&state_var, Expr::int(EXIT_STATE)));
            }
        }
        stmts.push(Stmt::Break {
            loc: Loc::default(),
        });
        arms.push((
            state,
            SwitchCase {
                label: Some(Expr::int(state)),
                stmts,
                loc: Loc::default(),
            },
        ));
    }
    arms.sort_by_key(|(state, _)| *state);

    let mut body = Vec::with_capacity(cfg.locals.len() + 4);
    for decl in &cfg.locals {
        body.push(Stmt::Local { decl: decl.clone() });
    }
    if let Some(ret) = &ret_var {
        let ret_ty = cfg.ret.unqualified().clone();
        let init = match ret_ty {
            CType::Int | CType::Char | CType::UChar | CType::Enum(_) | CType::Pointer(_) => {
                Some(Init::Expr(Expr::int(0)))
            }
            _ => None,
        };
        body.push(Stmt::Local {
            decl: VarDecl {
                name: ret.clone(),
                ty: ret_ty,
                init,
                is_static: false,
                loc: Loc::default(),
            },
        });
    }
    body.push(Stmt::Local {
        decl: VarDecl {
            name: state_var.clone(),
            ty: CType::Int,
            init: Some(Init::Expr(Expr::int(entry_state))),
            is_static: false,
            loc: Loc::default(),
        },
    });

    let dispatcher = Stmt::Switch {
        value: Expr::ident(&state_var),
        cases: arms.into_iter().map(|(_, case)| case).collect(),
        loc: Loc::default(),
    };
    body.push(Stmt::While {
        cond: Expr::Binary {
            op: BinaryOp::Ne,
            lhs: Box::new(Expr::ident(&state_var)),
            rhs: Box::new(Expr::int(EXIT_STATE)),
            loc: Loc::default(),
        },
        body: Box::new(Stmt::Block {
            stmts: vec![dispatcher],
            loc: Loc::default(),
        }),
        loc: Loc::default(),
    });
    if let Some(ret) = ret_var {
        body.push(Stmt::Return {
            value: Some(Expr::ident(ret)),
            loc: Loc::default(),
        });
    }
    Ok(body)
}

fn state_id(map: &HashMap<NodeIndex, i64>, node: NodeIndex) -> Result<i64, TransformError> {
    map.get(&node)
        .copied()
        .ok_or_else(|| TransformError::Invariant("dispatcher target outside the function".into()))
}

/// `name = value;`
fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Expr {
        expr: Expr::Assign {
            op: AssignOp::Assign,
            target: Box::new(Expr::ident(name)),
            value: Box::new(value),
            loc: Loc::default(),
        },
        loc: Loc::default(),
    }
}
