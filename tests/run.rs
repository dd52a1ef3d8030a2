use bp_lang::{
    compiler::{compile, CompileOptions},
    runtime::RuntimeError,
    vm,
};

fn run(input: &str, stdin: &str) -> (Result<(), RuntimeError>, String) {
    let module = match compile(input, &CompileOptions::default()) {
        Ok(module) => module,
        Err(errors) => panic!("unexpected errors: {errors:?}"),
    };
    let mut output = Vec::new();
    let result = vm::run(&module, stdin.as_bytes(), &mut output);
    (result, String::from_utf8(output).unwrap())
}

fn output_of(input: &str) -> String {
    let (result, output) = run(input, "");
    if let Err(err) = result {
        panic!("runtime error: {err}, output so far:\n{output}");
    }
    output
}

fn program(declarations: &str, statements: &str) -> String {
    format!(
        "program test is\nvariable ok : bool;\n{declarations}\nbegin\n{statements}\nend program.\n"
    )
}

#[test]
fn test_assignment_coercion_values() {
    let output = output_of(&program(
        "variable f : float;
         variable i : integer;
         variable b : bool;",
        "f := 3;
         ok := putfloat(f);
         i := true;
         ok := putinteger(i);
         b := 2;
         ok := putbool(b);
         b := 0;
         ok := putbool(b);
         i := 3.75;
         ok := putinteger(i);",
    ));
    assert_eq!(output, "3.000000\n1\n1\n0\n3\n");
}

#[test]
fn test_relational_coercion() {
    let output = output_of(&program(
        "",
        "ok := putbool(2 == true);
         ok := putbool(0 == false);
         ok := putbool(1 < 1.5);
         ok := putbool(2.5 >= 3);",
    ));
    assert_eq!(output, "1\n1\n1\n0\n");
}

#[test]
fn test_arithmetic_and_logic() {
    let output = output_of(&program(
        "variable x : integer;",
        "x := 7;
         ok := putinteger(x * 6);
         ok := putinteger(-x / 2);
         ok := putfloat(x / 2.0);
         ok := putinteger(6 & 3);
         ok := putinteger(6 | 3);
         ok := putbool(not false);
         ok := putbool(not (true & false));
         ok := putfloat(sqrt(2 * 8));",
    ));
    assert_eq!(
        output,
        "42\n-3\n3.500000\n2\n7\n1\n1\n4.000000\n"
    );
}

#[test]
fn test_out_of_bounds_traps() {
    for index in ["5", "-1"] {
        let (result, output) = run(
            &program(
                "variable a : integer[5];",
                &format!("a[{index}] := 1; ok := putstring(\"unreachable\");"),
            ),
            "",
        );
        assert!(matches!(result, Err(RuntimeError::IndexOutOfBounds)));
        assert_eq!(output, "Error: Index out of bounds\n");
    }
}

#[test]
fn test_reading_out_of_bounds_traps() {
    let (result, output) = run(
        &program(
            "variable a : integer[3];
             variable i : integer;",
            "i := getinteger();
             ok := putinteger(a[i]);",
        ),
        "3\n",
    );
    assert!(matches!(result, Err(RuntimeError::IndexOutOfBounds)));
    assert_eq!(output, "Error: Index out of bounds\n");
}

#[test]
fn test_whole_array_operations() {
    let output = output_of(&program(
        "variable a : integer[3];
         variable b : integer[3];
         variable c : integer[3];
         variable f : float[3];
         variable i : integer;",
        "for (i := 0; i < 3)
             a[i] := i;
             b[i] := 10 * i;
             i := i + 1;
         end for;
         c := a + b;
         c := c * 2;
         f := c;
         f := f / 4;
         for (i := 0; i < 3)
             ok := putinteger(c[i]);
             ok := putfloat(f[i]);
             i := i + 1;
         end for;",
    ));
    assert_eq!(
        output,
        "0\n0.000000\n22\n5.500000\n44\n11.000000\n"
    );
}

#[test]
fn test_global_arrays_start_zeroed() {
    let output = output_of(&program(
        "variable a : integer[3];
         variable f : float[2];
         variable b : bool[2];
         variable g : float[2];",
        "ok := putinteger(a[0]);
         ok := putinteger(a[2]);
         ok := putfloat(f[0]);
         ok := putbool(b[0]);
         g := f + 1.5;
         ok := putfloat(g[0]);
         ok := putfloat(g[1]);",
    ));
    assert_eq!(output, "0\n0\n0.000000\n0\n1.500000\n1.500000\n");
}

#[test]
fn test_unassigned_string_equals_empty() {
    let output = output_of(&program(
        "variable s : string;
         variable t : string;",
        "ok := putbool(s == \"\");
         ok := putbool(s != \"x\");
         ok := putbool(s == t);
         t := \"x\";
         ok := putbool(s == t);",
    ));
    assert_eq!(output, "1\n1\n1\n0\n");
}

#[test]
fn test_many_calls_complete() {
    let output = output_of(&program(
        "variable i : integer;
         variable total : integer;
         procedure square : integer (variable v : integer[2])
             variable scratch : integer[4];
         begin
             scratch[0] := v[0] * v[0];
             return scratch[0];
         end procedure;
         variable pair : integer[2];",
        "total := 0;
         pair[0] := 3;
         for (i := 0; i < 5000)
             total := total + square(pair);
             i := i + 1;
         end for;
         ok := putinteger(total);",
    ));
    assert_eq!(output, "45000\n");
}

#[test]
fn test_string_equality() {
    let output = output_of(&program(
        "variable s : string;",
        "s := \"abc\";
         ok := putbool(s == \"abc\");
         ok := putbool(s == \"abd\");
         ok := putbool(s == \"ab\");
         ok := putbool(s != \"abd\");
         ok := putstring(s);",
    ));
    assert_eq!(output, "1\n0\n0\n1\nabc\n");
}

#[test]
fn test_unassigned_string_prints_empty() {
    let output = output_of(&program("variable s : string;", "ok := putstring(s);"));
    assert_eq!(output, "\n");
}

#[test]
fn test_input() {
    let (result, output) = run(
        &program(
            "variable n : integer;
             variable f : float;
             variable s : string;
             variable b : bool;",
            "n := getinteger();
             f := getfloat();
             s := getstring();
             b := getbool();
             ok := putinteger(n + 1);
             ok := putfloat(f);
             ok := putstring(s);
             ok := putbool(b);",
        ),
        "41\n1.5\nhello world\n1\n",
    );
    result.unwrap();
    assert_eq!(output, "42\n1.500000\nhello world\n1\n");
}

#[test]
fn test_invalid_input() {
    let (result, _) = run(
        &program("variable n : integer;", "n := getinteger();"),
        "forty-two\n",
    );
    assert!(matches!(result, Err(RuntimeError::InvalidInput { .. })));
}

#[test]
fn test_recursion() {
    let output = output_of(&program(
        "variable i : integer;
         procedure fib : integer (variable n : integer)
         begin
             if (n < 2) then
                 return n;
             end if;
             return fib(n - 1) + fib(n - 2);
         end procedure;",
        "for (i := 0; i < 8)
             ok := putinteger(fib(i));
             i := i + 1;
         end for;",
    ));
    assert_eq!(output, "0\n1\n1\n2\n3\n5\n8\n13\n");
}

#[test]
fn test_arrays_are_passed_by_value() {
    let output = output_of(&program(
        "variable a : integer[2];
         variable x : integer;
         procedure clobber : integer (variable v : integer[2])
         begin
             v[0] := 99;
             return v[0] + v[1];
         end procedure;",
        "a[0] := 1;
         a[1] := 2;
         x := clobber(a);
         ok := putinteger(x);
         ok := putinteger(a[0]);",
    ));
    assert_eq!(output, "101\n1\n");
}

#[test]
fn test_locals_shadow_globals() {
    let output = output_of(&program(
        "variable x : integer;
         procedure p : integer ()
             variable x : integer;
         begin
             x := 5;
             return x;
         end procedure;",
        "x := 1;
         ok := putinteger(p());
         ok := putinteger(x);",
    ));
    assert_eq!(output, "5\n1\n");
}

#[test]
fn test_global_declared_in_procedure() {
    let output = output_of(&program(
        "variable r : integer;
         procedure setter : integer ()
             global variable counter : integer;
         begin
             counter := counter + 1;
             return counter;
         end procedure;",
        "r := setter();
         r := setter();
         ok := putinteger(counter);",
    ));
    assert_eq!(output, "2\n");
}

#[test]
fn test_integer_condition() {
    let output = output_of(&program(
        "variable i : integer;",
        "for (i := 3; i)
             ok := putinteger(i);
             i := i - 1;
         end for;
         if (i) then
             ok := putstring(\"nonzero\");
         else
             ok := putstring(\"zero\");
         end if;",
    ));
    assert_eq!(output, "3\n2\n1\nzero\n");
}

#[test]
fn test_stack_overflow() {
    let input = program(
        "variable x : integer;
         procedure forever : integer (variable n : integer)
         begin
             return forever(n + 1);
         end procedure;",
        "x := forever(0);",
    );
    // Unoptimized interpreter frames are large.
    let result = std::thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(move || run(&input, "").0)
        .unwrap()
        .join()
        .unwrap();
    assert!(matches!(result, Err(RuntimeError::StackOverflow)));
}

#[test]
fn test_division_by_zero() {
    let (result, _) = run(
        &program("variable x : integer;", "x := 0; x := 1 / x;"),
        "",
    );
    assert!(matches!(result, Err(RuntimeError::DivisionByZero)));
}

#[test]
fn test_program_runs_after_round_trip() {
    let module = compile(
        &program("", "ok := putstring(\"round trip\");"),
        &CompileOptions::default(),
    )
    .unwrap();
    let module = bp_lang::compiler::ir::Module::from_bytes(&module.to_bytes().unwrap()).unwrap();
    let mut output = Vec::new();
    vm::run(&module, "".as_bytes(), &mut output).unwrap();
    assert_eq!(output, b"round trip\n");
}
