use std::process::exit;

use clap::Parser;
use log::LevelFilter;

use crate::args::BpCliArgs;

pub mod args;
pub mod commands;

#[derive(Debug, Clone)]
pub struct Context;

fn init_logger(args: &BpCliArgs) {
    let mut builder = env_logger::Builder::from_default_env();
    if args.trace_parser {
        builder.filter_module("bp_lang::compiler::parser", LevelFilter::Trace);
    }
    if args.dump_tables {
        builder.filter_module("bp_lang::compiler::analyzer", LevelFilter::Debug);
    }
    if args.trace_codegen {
        builder.filter_module("bp_lang::compiler::ir", LevelFilter::Debug);
        builder.filter_module("bp_lang::vm", LevelFilter::Trace);
    }
    builder.init();
}

fn main() {
    let args = BpCliArgs::parse();
    init_logger(&args);
    let mut context = Context;
    match context.execute(args) {
        Ok(()) => exit(0),
        Err(err) => {
            eprintln!("{err:#}");
            exit(1);
        }
    }
}
