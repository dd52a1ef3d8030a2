use bp_lang::compiler::{
    compile,
    error::CompilerError,
    ir::{Module, VerifyError},
    CompileOptions,
};

fn compile_ok(input: &str) -> Module {
    match compile(input, &CompileOptions::default()) {
        Ok(module) => module,
        Err(errors) => panic!("unexpected errors: {errors:?}"),
    }
}

fn compile_err(input: &str) -> Vec<CompilerError> {
    match compile(input, &CompileOptions::default()) {
        Ok(module) => panic!("expected errors, got module:\n{module}"),
        Err(errors) => errors,
    }
}

/// Wraps declarations and statements into a program.
fn program(declarations: &str, statements: &str) -> String {
    format!("program test is\n{declarations}\nbegin\n{statements}\nend program.\n")
}

#[test]
fn test_valid_program_verifies() {
    let module = compile_ok(&program(
        "variable ok : bool;
         variable x : integer;
         variable a : float[4];
         procedure twice : float (variable v : float)
         begin
             return v * 2;
         end procedure;",
        "x := 3;
         a[x] := twice(x);
         if (a[x] > 5) then
             ok := putfloat(a[x]);
         else
             ok := putstring(\"small\");
         end if;",
    ));
    assert_eq!(module.name, "test");
    let entry = module.entry.expect("entry point");
    assert_eq!(module.function(entry).name, "main");
    for (i, function) in module.functions.iter().enumerate() {
        if !function.is_declaration() {
            module.verify_function(i.into()).unwrap();
        }
    }
}

#[test]
fn test_module_name_option() {
    let options = CompileOptions {
        module_name: Some("custom".to_owned()),
        ..CompileOptions::default()
    };
    let module = compile(&program("", ""), &options).unwrap();
    assert_eq!(module.name, "custom");
}

#[test]
fn test_module_bytes_round_trip() {
    let module = compile_ok(&program(
        "variable s : string;",
        "s := \"hello\";",
    ));
    let bytes = module.to_bytes().unwrap();
    assert_eq!(Module::from_bytes(&bytes).unwrap(), module);
}

#[test]
fn test_local_is_not_visible_in_sibling() {
    let errors = compile_err(&program(
        "procedure first : integer ()
             variable secret : integer;
         begin
             secret := 1;
             return secret;
         end procedure;
         procedure second : integer ()
         begin
             return secret;
         end procedure;",
        "",
    ));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::UndeclaredIdentifier { name, .. }] if name == "secret"
    ));
}

#[test]
fn test_local_is_visible_in_nested_statements() {
    compile_ok(&program(
        "procedure sum : integer (variable n : integer)
             variable total : integer;
             variable i : integer;
         begin
             total := 0;
             for (i := 0; i < n)
                 if (i > 1) then
                     total := total + i;
                 end if;
                 i := i + 1;
             end for;
             return total;
         end procedure;",
        "",
    ));
}

#[test]
fn test_assignment_coercions() {
    compile_ok(&program(
        "variable f : float;
         variable i : integer;
         variable b : bool;",
        "f := 3;
         i := true;
         i := 2.5;
         b := 2;",
    ));
    let errors = compile_err(&program("variable s : string;", "s := 3;"));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::TypeMismatch { expected, found, .. }]
            if expected == "string" && found == "integer"
    ));
    let errors = compile_err(&program("variable f : float;", "f := true;"));
    assert!(matches!(errors.as_slice(), [CompilerError::TypeMismatch { .. }]));
}

#[test]
fn test_relational_and_logical_operands() {
    compile_ok(&program(
        "variable b : bool;",
        "b := 1 < 2.5;
         b := true == 1;
         b := true & false;
         b := 6 | 3;",
    ));
    let errors = compile_err(&program("variable b : bool;", "b := true & 1;"));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::IncompatibleOperands { .. }]
    ));
}

#[test]
fn test_indexing_rules() {
    let errors = compile_err(&program(
        "variable x : integer;
         variable a : integer[3];",
        "x[0] := 1;
         a[1.5] := 1;
         a[true] := 1;",
    ));
    assert!(matches!(
        errors.as_slice(),
        [
            CompilerError::NotAnArray { .. },
            CompilerError::InvalidIndex { .. },
            CompilerError::InvalidIndex { .. },
        ]
    ));
}

#[test]
fn test_invalid_array_bound() {
    let errors = compile_err(&program("variable a : integer[0];", ""));
    assert!(matches!(errors.as_slice(), [CompilerError::InvalidArrayBound { .. }]));
    let errors = compile_err(&program("variable a : integer[2.5];", ""));
    assert!(matches!(errors.as_slice(), [CompilerError::InvalidArrayBound { .. }]));
}

#[test]
fn test_whole_array_operations() {
    compile_ok(&program(
        "variable a : integer[3];
         variable b : integer[3];
         variable r : integer[3];
         variable f : float[3];
         variable flags : bool[3];",
        "r := a + b;
         r := a * 2;
         f := a;
         flags := a < b;",
    ));

    let errors = compile_err(&program(
        "variable a : integer[3];
         variable c : integer[4];
         variable r : integer[3];",
        "r := a + c;",
    ));
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        CompilerError::ArraySizeMismatch { lhs: 3, rhs: 4, .. }
    ));
    assert!(errors[0].to_string().contains("array lengths must match"));
}

#[test]
fn test_unindexed_array_mixed_with_scalar() {
    let errors = compile_err(&program(
        "variable a : integer[3];
         variable x : integer;",
        "x := a;
         a := x;",
    ));
    assert!(matches!(
        errors.as_slice(),
        [
            CompilerError::ArrayNotIndexed { .. },
            CompilerError::TypeMismatch { .. },
        ]
    ));
}

#[test]
fn test_string_comparisons() {
    compile_ok(&program(
        "variable b : bool;",
        "b := \"abc\" == \"abc\";
         b := \"abc\" != \"abd\";",
    ));
    let errors = compile_err(&program("variable b : bool;", "b := \"abc\" < \"abd\";"));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::IncompatibleOperands { .. }]
    ));
}

#[test]
fn test_duplicate_declarations() {
    let errors = compile_err(&program(
        "variable x : integer;
         variable x : integer;",
        "",
    ));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::DuplicateDeclaration { name, .. }] if name == "x"
    ));

    compile_ok(&program(
        "variable x : integer;
         procedure shadow : integer ()
             variable x : float;
         begin
             x := 1.5;
             return x;
         end procedure;",
        "x := shadow();",
    ));
}

#[test]
fn test_parameter_duplicates_local() {
    let errors = compile_err(&program(
        "procedure p : integer (variable n : integer)
             variable n : integer;
         begin
             return 0;
         end procedure;",
        "",
    ));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::DuplicateDeclaration { name, .. }] if name == "n"
    ));
}

#[test]
fn test_duplicate_parameter_keeps_procedure_scope() {
    let errors = compile_err(&program(
        "procedure p : integer (variable n : integer, variable n : integer)
         begin
             return n;
         end procedure;",
        "",
    ));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::DuplicateDeclaration { name, .. }] if name == "n"
    ));
}

#[test]
fn test_recovery_inside_compound_statements() {
    let errors = compile_err(&program(
        "variable x : integer;",
        "if (x == ) then
             x := 1;
         else
             x := 2;
         end if;
         for (x := 0; )
             x := x + 1;
         end for;
         x := \"s\";",
    ));
    assert!(
        matches!(
            errors.as_slice(),
            [
                CompilerError::UnexpectedToken { .. },
                CompilerError::UnexpectedToken { .. },
                CompilerError::TypeMismatch { .. },
            ]
        ),
        "{errors:?}"
    );
}

#[test]
fn test_local_procedure_recursion() {
    compile_ok(&program(
        "variable x : integer;
         procedure outer : integer ()
             procedure countdown : integer (variable n : integer)
             begin
                 if (n == 0) then
                     return 0;
                 end if;
                 return countdown(n - 1);
             end procedure;
         begin
             return countdown(3);
         end procedure;",
        "x := outer();",
    ));
}

#[test]
fn test_later_sibling_is_not_visible() {
    let errors = compile_err(&program(
        "procedure outer : integer ()
             procedure first : integer ()
             begin
                 return second();
             end procedure;
             procedure second : integer ()
             begin
                 return 2;
             end procedure;
         begin
             return first() + second();
         end procedure;",
        "",
    ));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::UndeclaredIdentifier { name, .. }] if name == "second"
    ));
}

#[test]
fn test_local_procedure_is_not_visible_outside() {
    let errors = compile_err(&program(
        "variable x : integer;
         procedure outer : integer ()
             procedure inner : integer ()
             begin
                 return 1;
             end procedure;
         begin
             return inner();
         end procedure;",
        "x := inner();",
    ));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::UndeclaredIdentifier { name, .. }] if name == "inner"
    ));
}

#[test]
fn test_global_procedure_declared_in_procedure() {
    compile_ok(&program(
        "variable x : integer;
         procedure outer : integer ()
             global procedure helper : integer ()
             begin
                 return 7;
             end procedure;
         begin
             return helper();
         end procedure;",
        "x := helper() + outer();",
    ));
}

#[test]
fn test_missing_return_is_fatal() {
    let errors = compile_err(&program(
        "procedure p : integer (variable n : integer)
         begin
             if (n > 0) then
                 return 1;
             end if;
         end procedure;",
        "",
    ));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::Verify {
            error: VerifyError::MissingReturn { .. },
            ..
        }]
    ));
}

#[test]
fn test_return_after_both_branches() {
    compile_ok(&program(
        "procedure sign : integer (variable n : integer)
         begin
             if (n < 0) then
                 return -1;
             else
                 return 1;
             end if;
         end procedure;",
        "",
    ));
}

#[test]
fn test_return_outside_procedure() {
    let errors = compile_err(&program("", "return 1;"));
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::ReturnOutsideProcedure { .. }]
    ));
}

#[test]
fn test_call_checks() {
    let errors = compile_err(&program(
        "variable x : integer;
         variable a : integer[2];
         procedure takes : integer (variable v : integer[3])
         begin
             return v[0];
         end procedure;",
        "x := takes();
         x := takes(a);
         x := x(1);
         x := takes;",
    ));
    assert!(matches!(
        errors.as_slice(),
        [
            CompilerError::ArityMismatch { expected: 1, found: 0, .. },
            CompilerError::TypeMismatch { .. },
            CompilerError::NotAProcedure { .. },
            CompilerError::NotAVariable { .. },
        ]
    ));
}

#[test]
fn test_invalid_condition_and_unary() {
    let errors = compile_err(&program(
        "variable f : float;
         variable s : string;",
        "if (f) then
             f := 1;
         end if;
         f := not f;
         s := -s;",
    ));
    assert!(matches!(
        errors.as_slice(),
        [
            CompilerError::InvalidCondition { .. },
            CompilerError::InvalidUnaryOperand { .. },
            CompilerError::InvalidUnaryOperand { .. },
        ]
    ));
}

#[test]
fn test_errors_are_collected() {
    let errors = compile_err(&program(
        "variable x : integer;
         variable x : float;
         variable y : ;",
        "a := 1;
         x := 1 +;
         b := 2;",
    ));
    assert_eq!(errors.len(), 5, "{errors:?}");
    assert!(matches!(errors[0], CompilerError::DuplicateDeclaration { .. }));
    assert!(matches!(errors[1], CompilerError::UnexpectedToken { .. }));
    assert!(matches!(errors[2], CompilerError::UndeclaredIdentifier { .. }));
    assert!(matches!(errors[3], CompilerError::UnexpectedToken { .. }));
    assert!(matches!(errors[4], CompilerError::UndeclaredIdentifier { .. }));
}

#[test]
fn test_unexpected_eof_is_fatal() {
    let errors = compile_err("program p is begin x := ");
    assert!(matches!(errors.last(), Some(CompilerError::UnexpectedEof { .. })));
}

#[test]
fn test_lexical_error_is_reported() {
    let errors = compile_err(&program("variable x : integer;", "x := 1 $ 2;"));
    assert!(matches!(errors.as_slice(), [CompilerError::Lexical { .. }]));
}

#[test]
fn test_statement_after_return() {
    compile_ok(&program(
        "procedure p : integer ()
             variable x : integer;
         begin
             return 1;
             x := 2;
             return x;
         end procedure;",
        "",
    ));
}
