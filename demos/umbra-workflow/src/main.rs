//! End-to-end obfuscation workflow over one corpus program.
//!
//! Loads a conformance program, obfuscates it with a fixed seed, and checks
//! the properties a release pipeline relies on: the output reparses inside
//! the supported subset, the same seed reproduces it byte for byte, a
//! different seed does not, and no string literal survives in the emitted
//! text. Writes the obfuscated unit and a JSON report to the current
//! directory.

use std::fs;

use serde_json::json;
use umbra_core::{parse_unit, resolve};
use umbra_transform::obfuscator::{create_report, obfuscate_source, presets};
use umbra_utils::seed::Seed;

const CORPUS_PATH: &str = "corpus/strings.c";
const SEED: u64 = 0x5eed_cafe;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Umbra - C Obfuscation Workflow");
    println!("==============================");

    let source = fs::read_to_string(CORPUS_PATH)
        .map_err(|_| format!("failed to load {CORPUS_PATH}; run from the workspace root"))?;
    println!("Loaded {CORPUS_PATH}: {} bytes", source.len());
    println!("Seed: 0x{SEED:x}");

    println!("\nObfuscating with flattening and string encryption...");
    let config = presets::default_obfuscation(Some(Seed::new(SEED)));
    let result = obfuscate_source(&source, CORPUS_PATH, &config)?;
    println!("   Original:   {} bytes", result.original_size);
    println!(
        "   Obfuscated: {} bytes (+{:.1}%)",
        result.obfuscated_size, result.size_increase_percentage
    );
    println!(
        "   {} of {} functions transformed, {} blocks flattened, {} literals encrypted",
        result.functions_transformed,
        result.functions_processed,
        result.blocks_flattened,
        result.strings_encrypted
    );

    println!("\nVerifying the emitted unit...");
    let reparsed = parse_unit(&result.obfuscated_source, CORPUS_PATH)?;
    resolve(&reparsed)?;
    println!("   ✅ Output reparses and resolves");

    if result.obfuscated_source == source {
        return Err("output is identical to the input".into());
    }
    println!("   ✅ Obfuscation transformation applied");

    // Every literal in this program sits in a value position, so the emitted
    // text must contain no quoted string at all.
    if result.obfuscated_source.contains('"') {
        return Err("a string literal survived obfuscation".into());
    }
    println!("   ✅ No string literal survives in the source text");

    println!("\nDeterminism check...");
    let again = obfuscate_source(&source, CORPUS_PATH, &config)?;
    if again.obfuscated_source != result.obfuscated_source {
        return Err("same seed produced different output".into());
    }
    println!("   Same seed reproduces the output byte for byte");

    let other_config = presets::default_obfuscation(Some(Seed::new(SEED + 1)));
    let other = obfuscate_source(&source, CORPUS_PATH, &other_config)?;
    if other.obfuscated_source == result.obfuscated_source {
        return Err("different seeds produced identical output".into());
    }
    println!("   Different seeds diverge");

    fs::write("obfuscated_strings.c", &result.obfuscated_source)?;
    let report = json!({
        "umbra_workflow": {
            "input": CORPUS_PATH,
            "seed": format!("0x{SEED:x}"),
            "result": create_report(&result),
            "verification": {
                "output_reparses": true,
                "obfuscation_applied": true,
                "deterministic": true,
                "string_literals_hidden": true
            }
        }
    });
    fs::write("umbra_report.json", serde_json::to_string_pretty(&report)?)?;

    println!("\nWORKFLOW COMPLETED");
    println!("   Output: obfuscated_strings.c");
    println!("   Report: umbra_report.json");
    Ok(())
}
