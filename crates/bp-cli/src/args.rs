use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Parser)]
#[command(name = "bpc")]
#[command(bin_name = "bpc")]
#[command(version, about, long_about = None)]
pub struct BpCliArgs {
    /// The path of the source file to compile.
    pub path: PathBuf,
    /// Where to write the compiled module.
    #[arg(short, long, default_value = "out.bpm")]
    pub output: PathBuf,
    /// The form of the output.
    #[arg(long, value_enum, default_value_t = Emit::Module)]
    pub emit: Emit,
    /// Run the program once it is compiled.
    #[arg(long)]
    pub run: bool,
    /// Trace parser productions and matched tokens.
    #[arg(long)]
    pub trace_parser: bool,
    /// Dump each symbol table when its scope closes.
    #[arg(long)]
    pub dump_tables: bool,
    /// Log the generated IR and the interpreter's calls.
    #[arg(long)]
    pub trace_codegen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Emit {
    /// The serialized module.
    Module,
    /// A readable listing of the module.
    Ir,
}
