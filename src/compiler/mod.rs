//! The bp compiler.

pub mod analyzer;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod symbol;
pub mod token;
pub mod typing;

use log::debug;

/// Options of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Name of the output module. Defaults to the program name.
    pub module_name: Option<String>,
    /// Run the verifier on every function once its body is complete.
    pub verify: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            module_name: None,
            verify: true,
        }
    }
}

/// Compile the input source code into an IR module.
pub fn compile(
    input: &str,
    options: &CompileOptions,
) -> Result<ir::Module, Vec<error::CompilerError>> {
    let (module, errors) = parser::parse(input, options);
    if errors.is_empty() {
        debug!(target: "bp_lang::compiler::ir", "module:\n{module}");
        Ok(module)
    } else {
        Err(errors)
    }
}
