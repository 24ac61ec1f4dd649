//! The obfuscation pipeline: parse, resolve, transform each function
//! definition, and emit the rewritten translation unit.
//!
//! Functions are transformed in parallel. Each one gets its own RNG keyed by
//! [`Seed::derive`] over its declaration index, so the output is
//! byte-identical for a given seed and input no matter how rayon schedules
//! the work. Any failure aborts the whole run; a file that cannot be
//! transformed produces no output at all.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use umbra_core::ast::{Decl, Function, Unit};
use umbra_core::symbols::SymbolTable;
use umbra_core::{build_cfg, emit_unit, parse_unit, resolve};
use umbra_utils::errors::{ObfuscateError, TransformError};
use umbra_utils::seed::Seed;

use crate::{strings, FunctionBundle, Transform};

/// Configuration for the obfuscation pipeline
pub struct ObfuscationConfig {
    /// Root seed for deterministic obfuscation
    pub seed: Seed,
    /// List of transforms to apply, in order
    pub transforms: Vec<Box<dyn Transform>>,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            seed: Seed::new(42),
            transforms: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ObfuscationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscationConfig")
            .field("seed", &self.seed)
            .field(
                "transforms",
                &format!("{} transforms", self.transforms.len()),
            )
            .finish()
    }
}

/// Result of the obfuscation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationResult {
    /// The obfuscated C source
    pub obfuscated_source: String,
    /// Original source size in bytes
    pub original_size: usize,
    /// Obfuscated source size in bytes
    pub obfuscated_size: usize,
    /// Size increase as percentage
    pub size_increase_percentage: f64,
    /// Number of function definitions the pipeline visited
    pub functions_processed: usize,
    /// Number of functions at least one transform changed
    pub functions_transformed: usize,
    /// Total basic blocks folded into dispatcher loops
    pub blocks_flattened: usize,
    /// Total string literals replaced with encrypted statics
    pub strings_encrypted: usize,
    /// Metadata about the obfuscation process
    pub metadata: ObfuscationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationMetadata {
    /// Names of transforms that were applied
    pub transforms_applied: Vec<String>,
    /// Seed used for the obfuscation
    pub seed_used: u64,
}

/// Main obfuscation pipeline
pub fn obfuscate_source(
    source: &str,
    file: &str,
    config: &ObfuscationConfig,
) -> Result<ObfuscationResult, ObfuscateError> {
    let original_size = source.len();

    tracing::debug!("Starting obfuscation pipeline:");
    tracing::debug!("  Input: {} ({} bytes)", file, original_size);
    tracing::debug!("  Seed: {}", config.seed);
    tracing::debug!("  Transforms: {}", config.transforms.len());

    let unit = parse_unit(source, file)?;
    let symbols = resolve(&unit)?;

    // Prototypes have no body and pass through untouched.
    let defs: Vec<Function> = unit
        .decls
        .iter()
        .filter_map(|decl| match decl {
            Decl::Function(func) if func.body.is_some() => Some(func.clone()),
            _ => None,
        })
        .collect();
    tracing::debug!("  Function definitions: {}", defs.len());

    // Collect per-function results in declaration order, then surface the
    // first failure. Collecting Result directly off the parallel iterator
    // would report whichever error a worker hit first.
    let outcomes: Vec<Result<FunctionBundle, ObfuscateError>> = defs
        .into_par_iter()
        .enumerate()
        .map(|(index, func)| transform_function(index, func, &symbols, file, config))
        .collect();
    let bundles = outcomes
        .into_iter()
        .collect::<Result<Vec<FunctionBundle>, ObfuscateError>>()?;

    let functions_processed = bundles.len();
    let functions_transformed = bundles
        .iter()
        .filter(|b| b.flattened || !b.statics.is_empty())
        .count();
    let blocks_flattened = bundles
        .iter()
        .filter(|b| b.flattened)
        .map(|b| b.cfg.body_count())
        .sum();
    let strings_encrypted = bundles.iter().map(|b| b.statics.len() / 2).sum();
    let any_reveal = bundles.iter().any(|b| b.needs_reveal);

    let Unit {
        file: unit_file,
        includes,
        decls,
    } = unit;
    let mut stitched = Vec::with_capacity(decls.len() + 2);
    if any_reveal {
        stitched.push(Decl::Function(strings::reveal_prototype()));
    }
    let mut queue = bundles.into_iter();
    for decl in decls {
        match decl {
            Decl::Function(func) if func.body.is_some() => {
                let bundle = queue.next().ok_or_else(|| {
                    TransformError::Invariant("fewer bundles than function definitions".into())
                })?;
                stitched.extend(bundle.statics.into_iter().map(Decl::Global));
                stitched.push(Decl::Function(bundle.func));
            }
            other => stitched.push(other),
        }
    }
    if any_reveal {
        stitched.push(Decl::Function(strings::reveal_definition()));
    }

    let obfuscated_source = emit_unit(&Unit {
        file: unit_file,
        includes,
        decls: stitched,
    });
    let obfuscated_size = obfuscated_source.len();
    let size_increase_percentage = if original_size > 0 {
        ((obfuscated_size as f64 - original_size as f64) / original_size as f64) * 100.0
    } else {
        0.0
    };

    tracing::debug!("Pipeline summary:");
    tracing::debug!("  Functions transformed: {functions_transformed}/{functions_processed}");
    tracing::debug!("  Blocks flattened: {blocks_flattened}");
    tracing::debug!("  Strings encrypted: {strings_encrypted}");
    tracing::debug!("  Size: {original_size} -> {obfuscated_size} bytes");

    Ok(ObfuscationResult {
        obfuscated_source,
        original_size,
        obfuscated_size,
        size_increase_percentage,
        functions_processed,
        functions_transformed,
        blocks_flattened,
        strings_encrypted,
        metadata: ObfuscationMetadata {
            transforms_applied: config
                .transforms
                .iter()
                .map(|t| t.name().to_string())
                .collect(),
            seed_used: config.seed.value(),
        },
    })
}

/// Runs the configured transforms over one function definition.
fn transform_function(
    index: usize,
    func: Function,
    symbols: &SymbolTable,
    file: &str,
    config: &ObfuscationConfig,
) -> Result<FunctionBundle, ObfuscateError> {
    let cfg = build_cfg(&func, symbols, file).map_err(TransformError::from)?;
    let mut bundle = FunctionBundle::new(file, index, func, cfg);
    let mut rng = StdRng::seed_from_u64(config.seed.derive(index));

    for transform in &config.transforms {
        let changed = transform.apply(&mut bundle, &mut rng)?;
        tracing::debug!(
            function = %bundle.func.name,
            transform = transform.name(),
            changed,
            "applied transform"
        );
    }
    Ok(bundle)
}

/// Prints a short analysis of the obfuscation run
pub fn print_obfuscation_analysis(result: &ObfuscationResult) {
    println!("Transform Analysis:");
    println!("Functions processed: {}", result.functions_processed);
    println!(
        "Applying {} transforms: {:?}",
        result.metadata.transforms_applied.len(),
        result.metadata.transforms_applied
    );

    if result.blocks_flattened > 0 {
        println!("Blocks flattened: {}", result.blocks_flattened);
    }
    if result.strings_encrypted > 0 {
        println!("Strings encrypted: {}", result.strings_encrypted);
    }

    println!("✅ Obfuscation complete");
    println!(
        "📈 Size change: {} → {} bytes ({:+.1}%)",
        result.original_size, result.obfuscated_size, result.size_increase_percentage
    );
    println!();
}

/// Creates a JSON report from obfuscation results
pub fn create_report(result: &ObfuscationResult) -> serde_json::Value {
    json!({
        "original_bytes": result.original_size,
        "obfuscated_bytes": result.obfuscated_size,
        "size_delta_bytes": (result.obfuscated_size as i64 - result.original_size as i64),
        "percent_size": result.size_increase_percentage,
        "functions_processed": result.functions_processed,
        "functions_transformed": result.functions_transformed,
        "blocks_flattened": result.blocks_flattened,
        "strings_encrypted": result.strings_encrypted,
        "transforms_applied": result.metadata.transforms_applied,
        "seed_used": result.metadata.seed_used,
    })
}

/// Convenience functions to create common transform configurations
pub mod presets {
    use super::*;
    use crate::flatten::FlattenControlFlow;
    use crate::strings::EncryptStrings;

    /// Default obfuscation with all transforms enabled. Flattening rebuilds
    /// the body from the CFG, so it always runs before body-level rewrites.
    pub fn default_obfuscation(seed: Option<Seed>) -> ObfuscationConfig {
        ObfuscationConfig {
            seed: seed.unwrap_or(Seed::new(42)),
            transforms: vec![Box::new(FlattenControlFlow), Box::new(EncryptStrings)],
        }
    }

    /// Control-flow flattening only
    pub fn flatten_only(seed: Option<Seed>) -> ObfuscationConfig {
        ObfuscationConfig {
            seed: seed.unwrap_or(Seed::new(42)),
            transforms: vec![Box::new(FlattenControlFlow)],
        }
    }

    /// String encryption only
    pub fn strings_only(seed: Option<Seed>) -> ObfuscationConfig {
        ObfuscationConfig {
            seed: seed.unwrap_or(Seed::new(42)),
            transforms: vec![Box::new(EncryptStrings)],
        }
    }
}
