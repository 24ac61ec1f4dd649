use clap::Args;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use umbra_core::{emit_unit, parse_unit, resolve};

/// Arguments for the `emit` subcommand, which parses and resolves a C file
/// and prints it back from the AST with no transforms applied. Useful for
/// checking what the front end accepted.
#[derive(Args)]
pub struct EmitArgs {
    /// Input C file.
    pub input: PathBuf,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl super::Command for EmitArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let source = fs::read_to_string(&self.input)?;
        let file = self.input.display().to_string();
        let unit = parse_unit(&source, &file)?;
        resolve(&unit)?;
        let out = emit_unit(&unit);

        match self.output {
            Some(path) => fs::write(path, &out)?,
            None => print!("{out}"),
        }
        Ok(())
    }
}
