use clap::Args;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use umbra_core::ast::Decl;
use umbra_core::cfg::{Block, FunctionCfg, Terminator};
use umbra_core::emit::{expr_to_string, stmt_to_string};
use umbra_core::{build_cfg, parse_unit, resolve};

#[derive(Args)]
pub struct CfgArgs {
    /// Input C file.
    pub input: PathBuf,
    /// Output file for Graphviz .dot (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Only dump the named function
    #[arg(long)]
    function: Option<String>,
}

impl super::Command for CfgArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let source = fs::read_to_string(&self.input)?;
        let file = self.input.display().to_string();
        let unit = parse_unit(&source, &file)?;
        let symbols = resolve(&unit)?;

        let mut dot = String::from("digraph CFG {\n");
        let mut index = 0;
        for decl in &unit.decls {
            let Decl::Function(func) = decl else { continue };
            if func.body.is_none() {
                continue;
            }
            if let Some(only) = &self.function {
                if func.name != *only {
                    continue;
                }
            }
            let cfg = build_cfg(func, &symbols, &file)?;
            function_dot(index, &cfg, &mut dot);
            index += 1;
        }
        dot.push_str("}\n");

        if self.function.is_some() && index == 0 {
            return Err(format!(
                "no function named `{}` in {file}",
                self.function.unwrap_or_default()
            )
            .into());
        }

        if let Some(out_path) = self.output {
            fs::write(out_path, &dot)?;
        } else {
            println!("{dot}");
        }
        Ok(())
    }
}

/// Appends one function's graph as a labelled cluster.
fn function_dot(index: usize, cfg: &FunctionCfg, dot: &mut String) {
    dot.push_str(&format!("    subgraph cluster_{index} {{\n"));
    dot.push_str(&format!("        label=\"{}\";\n", escape(&cfg.name)));

    for node in cfg.graph.node_indices() {
        let label = match &cfg.graph[node] {
            Block::Entry => "Entry".to_string(),
            Block::Exit => "Exit".to_string(),
            Block::Body(block) => {
                let mut lines: Vec<String> =
                    block.stmts.iter().map(|s| stmt_to_string(s)).collect();
                lines.push(term_label(&block.term));
                lines.join("\\n")
            }
        };
        dot.push_str(&format!(
            "        f{index}_{} [label=\"{}\"];\n",
            node.index(),
            escape(&label)
        ));
    }

    for edge in cfg.graph.edge_indices() {
        let (src, dst) = cfg.graph.edge_endpoints(edge).unwrap();
        let kind = cfg.graph.edge_weight(edge).unwrap();
        dot.push_str(&format!(
            "        f{index}_{} -> f{index}_{} [label=\"{kind}\"];\n",
            src.index(),
            dst.index()
        ));
    }

    dot.push_str("    }\n");
}

fn term_label(term: &Terminator) -> String {
    match term {
        Terminator::Jump(_) => "jump".to_string(),
        Terminator::Branch { cond, .. } => format!("branch {}", expr_to_string(cond)),
        Terminator::Switch { value, .. } => format!("switch {}", expr_to_string(value)),
        Terminator::Return(None) => "return".to_string(),
        Terminator::Return(Some(value)) => format!("return {}", expr_to_string(value)),
    }
}

/// Escapes label text for a double-quoted dot string. Escaped newlines from
/// statement text are already dot-ready, so only quotes need care.
fn escape(label: &str) -> String {
    label.replace('"', "\\\"")
}
