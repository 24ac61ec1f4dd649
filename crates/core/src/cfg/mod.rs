//! Per-function control-flow graphs.
//!
//! Each function body lowers to a [`FunctionCfg`]: a petgraph directed graph
//! whose nodes are [`Block`]s and whose edges mirror the block terminators.
//! Synthetic `Entry` and `Exit` nodes bracket the body so transforms never
//! special-case the first or last block. Local declarations do not survive
//! lowering as statements; they are alpha-renamed, hoisted into
//! [`FunctionCfg::locals`], and their initializers become plain assignments
//! inside body blocks.

pub mod builder;

pub use builder::build_cfg;

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::ast::{CType, Expr, Stmt, VarDecl};

/// A node in a function's control-flow graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Synthetic entry node with one `Flow` edge to the first body block.
    Entry,
    /// Synthetic exit node; every `Return` terminator edges here.
    Exit,
    /// A run of straight-line statements ended by exactly one terminator.
    Body(BasicBlock),
}

/// Payload of a [`Block::Body`] node.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Straight-line statements; never `Local`, `Break`, or `Continue`.
    pub stmts: Vec<Stmt>,
    /// How control leaves the block.
    pub term: Terminator,
}

/// How control leaves a body block. Targets are node ids in the owning graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Unconditional transfer.
    Jump(NodeIndex),
    /// Two-way branch on a condition evaluated once in this block.
    Branch {
        /// Branch condition, including any side effects.
        cond: Expr,
        /// Target when the condition is nonzero.
        then_blk: NodeIndex,
        /// Target when the condition is zero.
        else_blk: NodeIndex,
    },
    /// Multi-way dispatch on a scrutinee evaluated once in this block.
    Switch {
        /// Scrutinee expression.
        value: Expr,
        /// Folded case values to targets, in source case order.
        cases: IndexMap<i64, NodeIndex>,
        /// Target when no case matches; the join block if the source switch
        /// had no `default`.
        default: NodeIndex,
    },
    /// Function return; always edges to the exit node.
    Return(Option<Expr>),
}

/// Edge labels mirroring the terminator that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Unconditional flow, including switch-case fallthrough.
    Flow,
    /// Branch taken.
    BranchTrue,
    /// Branch not taken.
    BranchFalse,
    /// Switch dispatch for one folded case value.
    Case(i64),
    /// Switch dispatch when no case matches.
    Default,
    /// Return edge into the exit node.
    Return,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Flow => write!(f, "flow"),
            EdgeKind::BranchTrue => write!(f, "true"),
            EdgeKind::BranchFalse => write!(f, "false"),
            EdgeKind::Case(value) => write!(f, "case {value}"),
            EdgeKind::Default => write!(f, "default"),
            EdgeKind::Return => write!(f, "return"),
        }
    }
}

/// Control-flow graph of one function body.
#[derive(Debug, Clone)]
pub struct FunctionCfg {
    /// Function name, for diagnostics and graph dumps.
    pub name: String,
    /// Return type of the function.
    pub ret: CType,
    /// The graph. Body blocks are only ever reachable from `entry`.
    pub graph: DiGraph<Block, EdgeKind>,
    /// The synthetic entry node.
    pub entry: NodeIndex,
    /// The synthetic exit node.
    pub exit: NodeIndex,
    /// Hoisted, alpha-renamed local declarations, initializers stripped.
    pub locals: Vec<VarDecl>,
    /// Name pool that already accounts for every identifier the function or
    /// the unit mentions; transforms mint helper variables from it.
    pub names: NamePool,
}

impl FunctionCfg {
    /// Number of body blocks, excluding the synthetic entry and exit.
    pub fn body_count(&self) -> usize {
        self.graph
            .node_indices()
            .filter(|&n| matches!(self.graph[n], Block::Body(_)))
            .count()
    }

    /// The body block the entry node flows into, if the body is non-empty.
    pub fn first_body(&self) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(self.entry, Direction::Outgoing)
            .next()
    }
}

/// Mints identifiers that collide with nothing already in scope.
#[derive(Debug, Clone, Default)]
pub struct NamePool {
    taken: HashSet<String>,
    counter: usize,
}

impl NamePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as taken.
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    /// Returns a fresh `base_N` name and marks it taken.
    pub fn fresh(&mut self, base: &str) -> String {
        loop {
            let candidate = format!("{base}_{}", self.counter);
            self.counter += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
