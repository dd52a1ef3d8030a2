use std::{fs, io};

use anyhow::{bail, Context as _};
use bp_lang::{
    compiler::{compile, CompileOptions},
    utils::{LineIndex, Locatable},
    vm,
};

use crate::{
    args::{BpCliArgs, Emit},
    Context,
};

impl Context {
    pub fn execute(&mut self, args: BpCliArgs) -> Result<(), anyhow::Error> {
        let input = fs::read_to_string(&args.path)
            .with_context(|| format!("failed to read `{}`", args.path.display()))?;
        let module = match compile(&input, &CompileOptions::default()) {
            Ok(module) => module,
            Err(errors) => {
                let index = LineIndex::new(&input);
                for err in &errors {
                    let location = err.location(&index);
                    eprintln!("{}:{location}: error: {err}", args.path.display());
                }
                bail!(
                    "could not compile `{}` due to {} previous error(s)",
                    args.path.display(),
                    errors.len()
                );
            }
        };

        let bytes = match args.emit {
            Emit::Module => module.to_bytes()?,
            Emit::Ir => module.to_string().into_bytes(),
        };
        fs::write(&args.output, bytes)
            .with_context(|| format!("failed to write `{}`", args.output.display()))?;

        if args.run {
            vm::run(&module, io::stdin().lock(), io::stdout().lock())?;
        }
        Ok(())
    }
}
