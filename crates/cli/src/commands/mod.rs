use clap::Subcommand;
use std::error::Error;

pub mod cfg;
pub mod emit;
pub mod obfuscate;

#[derive(Subcommand)]
pub enum Cmd {
    /// Obfuscate C files and write the rewritten sources
    Obfuscate(obfuscate::ObfuscateArgs),

    /// Write per-function CFGs as Graphviz dot to stdout or a file
    Cfg(cfg::CfgArgs),

    /// Parse a C file and print it back from the AST
    Emit(emit::EmitArgs),
}

pub trait Command {
    fn execute(self) -> Result<(), Box<dyn Error>>;
}

impl Command for Cmd {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Obfuscate(args) => args.execute(),
            Cmd::Cfg(args) => args.execute(),
            Cmd::Emit(args) => args.execute(),
        }
    }
}
