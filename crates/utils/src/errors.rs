//! Error taxonomy shared across the Umbra pipeline.
//!
//! Every stage reports failure through its own enum so callers can match on
//! the stage that failed, and [`ObfuscateError`] folds them into the single
//! error surfaced by the driver and the CLI. Source-located variants carry
//! `file:line:col` so diagnostics point at the offending construct in the
//! input translation unit.

use thiserror::Error;

/// Errors produced while lexing or parsing a translation unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The token stream did not match the grammar.
    #[error("{file}:{line}:{col}: syntax error: expected {expected}, found {found}")]
    Syntax {
        file: String,
        line: usize,
        col: usize,
        expected: String,
        found: String,
    },

    /// The construct is valid C but outside the supported subset.
    #[error("{file}:{line}:{col}: unsupported construct: {construct}")]
    Unsupported {
        file: String,
        line: usize,
        col: usize,
        construct: String,
    },

    /// The lexer hit a character sequence that forms no token.
    #[error("{file}:{line}:{col}: invalid token: {msg}")]
    InvalidToken {
        file: String,
        line: usize,
        col: usize,
        msg: String,
    },
}

/// Errors produced by symbol resolution over a parsed translation unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// An identifier was used before any visible declaration.
    #[error("{file}:{line}:{col}: use of undeclared identifier `{name}`")]
    UndeclaredIdentifier {
        file: String,
        line: usize,
        col: usize,
        name: String,
    },

    /// The same name was defined twice in one scope.
    #[error("{file}:{line}:{col}: duplicate definition of `{name}`")]
    DuplicateDefinition {
        file: String,
        line: usize,
        col: usize,
        name: String,
    },

    /// A declaration referred to a struct, enum, or typedef that does not exist.
    #[error("{file}:{line}:{col}: unknown type name `{name}`")]
    UnknownType {
        file: String,
        line: usize,
        col: usize,
        name: String,
    },

    /// An enum constant's explicit value did not fold to an integer constant.
    #[error("{file}:{line}:{col}: enum constant `{name}` is not an integer constant expression")]
    NonConstantEnum {
        file: String,
        line: usize,
        col: usize,
        name: String,
    },
}

/// Errors produced while lowering a function body to a control-flow graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CfgError {
    /// A `break` or `continue` appeared outside any enclosing loop or switch.
    #[error("{file}:{line}:{col}: `{kind}` outside of a loop or switch")]
    InvalidControlFlow {
        file: String,
        line: usize,
        col: usize,
        kind: &'static str,
    },

    /// A case label did not fold to an integer constant.
    #[error("{file}:{line}:{col}: case label is not an integer constant expression")]
    NonConstantCase { file: String, line: usize, col: usize },

    /// Two case labels in one switch folded to the same value.
    #[error("{file}:{line}:{col}: duplicate case value `{value}`")]
    DuplicateCase {
        file: String,
        line: usize,
        col: usize,
        value: i64,
    },

    /// More than one `default` label in one switch.
    #[error("{file}:{line}:{col}: multiple `default` labels in one switch")]
    DuplicateDefault { file: String, line: usize, col: usize },
}

/// Errors produced by an obfuscating transform.
#[derive(Error, Debug)]
pub enum TransformError {
    /// Lowering to the control-flow graph failed.
    #[error(transparent)]
    Cfg(#[from] CfgError),

    /// A structural invariant the transform relies on did not hold.
    #[error("transform invariant violated: {0}")]
    Invariant(String),
}

/// Errors produced while parsing a user-supplied seed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    /// The seed string was neither decimal nor `0x`-prefixed hex.
    #[error("invalid seed `{0}`: expected a decimal or 0x-prefixed hex u64")]
    InvalidSeed(String),
}

/// Top-level error for a full obfuscation run.
#[derive(Error, Debug)]
pub enum ObfuscateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("file error: {0}")]
    File(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A pass name on the command line matched no registered transform.
    #[error("unknown pass `{0}`")]
    InvalidPass(String),

    #[error(transparent)]
    Seed(#[from] SeedError),
}

impl ObfuscateError {
    /// Returns true when the failure came from the input program rather than
    /// the environment, so batch drivers can distinguish bad corpus files
    /// from I/O trouble.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ObfuscateError::Parse(_) | ObfuscateError::Resolve(_) | ObfuscateError::Transform(_)
        )
    }
}
