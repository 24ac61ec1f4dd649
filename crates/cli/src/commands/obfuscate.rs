//! The `obfuscate` subcommand, which applies obfuscation transforms to C
//! translation units.
//!
//! This module reads each input file, builds the requested transform pipeline
//! (control-flow flattening, string encryption), runs it, and writes the
//! obfuscated source. It also generates a size/transform report if requested.
//! A unit that fails leaves its output path untouched; remaining units are
//! still processed and the command exits nonzero at the end.

use clap::Args;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use umbra_transform::flatten::FlattenControlFlow;
use umbra_transform::obfuscator::{
    create_report, obfuscate_source, print_obfuscation_analysis, ObfuscationConfig,
};
use umbra_transform::strings::EncryptStrings;
use umbra_transform::Transform;
use umbra_utils::errors::ObfuscateError;
use umbra_utils::seed::Seed;

/// Arguments for the `obfuscate` subcommand.
#[derive(Args)]
pub struct ObfuscateArgs {
    /// Input C files.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Output path for a single obfuscated unit (default: stdout).
    #[arg(short, long, conflicts_with = "out_dir")]
    output: Option<PathBuf>,
    /// Directory for batch output, one file per input, names kept.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Random seed, decimal or 0x-prefixed hex (default: 42).
    #[arg(long, default_value = "42")]
    seed: Seed,
    /// Comma-separated list of transforms (default: flatten,strings).
    #[arg(long, default_value = "flatten,strings")]
    passes: String,
    /// Path to emit per-unit size/transform reports as JSON (optional).
    #[arg(long)]
    emit: Option<PathBuf>,
}

/// Executes the `obfuscate` subcommand and writes the rewritten sources.
impl super::Command for ObfuscateArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        if self.output.is_some() && self.inputs.len() > 1 {
            return Err("--output takes a single input; use --out-dir for a batch".into());
        }
        if let Some(dir) = &self.out_dir {
            fs::create_dir_all(dir)?;
        }
        let config = build_config(&self.passes, self.seed)?;

        let mut reports = Vec::with_capacity(self.inputs.len());
        let mut failed = 0usize;
        for input in &self.inputs {
            match self.obfuscate_unit(input, &config) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    eprintln!("❌ {}: {err}", input.display());
                    failed += 1;
                }
            }
        }

        if let Some(path) = &self.emit {
            let body = serde_json::Value::Array(reports);
            fs::write(path, serde_json::to_string_pretty(&body)?)?;
            println!("📊 Wrote report to {}", path.display());
        }

        if failed > 0 {
            return Err(format!("{failed} of {} inputs failed", self.inputs.len()).into());
        }
        Ok(())
    }
}

impl ObfuscateArgs {
    /// Obfuscates one input file and writes it to its destination, returning
    /// the unit's report entry.
    fn obfuscate_unit(
        &self,
        input: &Path,
        config: &ObfuscationConfig,
    ) -> Result<serde_json::Value, Box<dyn Error>> {
        let source = fs::read_to_string(input)?;
        let file = input.display().to_string();

        let result = obfuscate_source(&source, &file, config)?;
        print_obfuscation_analysis(&result);

        let mut report = create_report(&result);
        report["file"] = serde_json::Value::String(file);

        match (&self.output, &self.out_dir) {
            (Some(path), _) => fs::write(path, &result.obfuscated_source)?,
            (None, Some(dir)) => {
                let name = input.file_name().ok_or("input path has no file name")?;
                fs::write(dir.join(name), &result.obfuscated_source)?;
            }
            (None, None) => print!("{}", result.obfuscated_source),
        }
        Ok(report)
    }
}

/// Builds a pipeline configuration from a comma-separated pass list.
///
/// Flattening rebuilds function bodies from the CFG, so when both passes are
/// requested it runs first no matter how the list was ordered.
fn build_config(list: &str, seed: Seed) -> Result<ObfuscationConfig, ObfuscateError> {
    let mut flatten = false;
    let mut strings = false;
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name {
            "flatten" => flatten = true,
            "strings" | "encrypt_strings" => strings = true,
            other => return Err(ObfuscateError::InvalidPass(other.to_string())),
        }
    }
    let mut transforms: Vec<Box<dyn Transform>> = Vec::new();
    if flatten {
        transforms.push(Box::new(FlattenControlFlow));
    }
    if strings {
        transforms.push(Box::new(EncryptStrings));
    }
    Ok(ObfuscationConfig { seed, transforms })
}
