use std::{
    fs,
    io::{stdout, Write},
};

use bp_lang::{
    compiler::{compile, CompileOptions},
    vm,
};

/// Compiles and runs every script, comparing its output with the `.out` file next
/// to it. Scripts read their input from the `.in` file, if any.
#[test]
fn test_scripts() {
    const DIR: &str = "./tests/scripts";
    let _ = writeln!(stdout(), "running all test scripts in {DIR:?}");
    for dir in fs::read_dir(DIR).expect("could not list dir") {
        let path = dir.expect("could not read dir entry").path();
        if path.extension().is_some_and(|ext| ext == "src") {
            let input = fs::read_to_string(&path).expect("could not read file contents");
            let _ = writeln!(stdout(), "running {:?}", path.file_name().unwrap());
            let module = match compile(&input, &CompileOptions::default()) {
                Ok(module) => module,
                Err(errors) => panic!("error encountered compiling {path:?}: {errors:?}"),
            };
            let stdin = fs::read_to_string(path.with_extension("in")).unwrap_or_default();
            let mut output = Vec::new();
            if let Err(err) = vm::run(&module, stdin.as_bytes(), &mut output) {
                panic!("error encountered running {path:?}: {err}");
            }
            let expected = fs::read_to_string(path.with_extension("out"))
                .expect("could not read expected output");
            assert_eq!(String::from_utf8_lossy(&output), expected, "{path:?}");
        } else {
            let _ = writeln!(stdout(), "skipping file {:?}", path);
        }
    }
}
