pub mod flatten;
pub mod obfuscator;
pub mod strings;

use rand::rngs::StdRng;
use umbra_core::ast::{Function, VarDecl};
use umbra_core::cfg::FunctionCfg;
use umbra_utils::errors::TransformError;

/// Trait for source obfuscation transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to one function, returning whether changes were made.
    fn apply(
        &self,
        bundle: &mut FunctionBundle,
        rng: &mut StdRng,
    ) -> Result<bool, TransformError>;
}

/// Per-function working set handed through the transform chain.
///
/// Transforms rewrite `func` in place. `cfg` is the control-flow graph of
/// the original body and is not rebuilt between transforms, so passes that
/// restructure the body run before passes that only rewrite expressions.
/// File-scope declarations a transform mints are collected in `statics` and
/// stitched directly in front of the function when the unit is reassembled.
#[derive(Debug)]
pub struct FunctionBundle {
    /// File name, used in diagnostics and logs.
    pub file: String,
    /// Zero-based index of this definition among the unit's definitions.
    pub index: usize,
    /// The function being rewritten.
    pub func: Function,
    /// Control-flow graph built from the original body.
    pub cfg: FunctionCfg,
    /// File-scope declarations to emit directly before the function.
    pub statics: Vec<VarDecl>,
    /// Set once the body has been rebuilt as a dispatcher loop.
    pub flattened: bool,
    /// Set when the emitted unit must carry the reveal helper.
    pub needs_reveal: bool,
}

impl FunctionBundle {
    /// Wraps a function definition for transformation.
    pub fn new(file: &str, index: usize, func: Function, cfg: FunctionCfg) -> Self {
        Self {
            file: file.to_string(),
            index,
            func,
            cfg,
            statics: Vec::new(),
            flattened: false,
            needs_reveal: false,
        }
    }
}
