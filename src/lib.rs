//! bp Language Compiler and IR interpreter.
//!
//! ```txt
//!        +-------+             +-------------------+            +----------+
//! str -> | lexer | - Tokens -> | parser + analyzer | - Module -> | verifier |
//!        +-------+             |   + codegen       |            +----------+
//!                              +-------------------+                  |
//!                                                                     |
//!             +------------------ bytes / listing -------------------+
//!             |
//!             v
//!        +----------------+
//!        | IR interpreter |
//!        +----------------+
//! ```
//!
//! # Examples
//!
//! ```rust
//! use bp_lang::compiler::{compile, CompileOptions};
//! let input = r#"
//! program hello is
//!     variable ok : bool;
//! begin
//!     ok := putstring("Hello World!");
//! end program.
//! "#;
//! let module = compile(input, &CompileOptions::default()).unwrap();
//! let mut output = Vec::new();
//! bp_lang::vm::run(&module, std::io::empty(), &mut output).unwrap();
//! assert_eq!(output, b"Hello World!\n");
//! ```

// Pedantic warnings
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines, clippy::must_use_candidate)]
// TODO: Improve documentation
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]
// Restriction warnings
#![warn(clippy::restriction)]
#![allow(
    clippy::blanket_clippy_restriction_lints,
    clippy::exhaustive_enums,
    clippy::exhaustive_structs,
    clippy::implicit_return,
    clippy::min_ident_chars,
    clippy::missing_inline_in_public_items,
    clippy::missing_trait_methods,
    clippy::mod_module_files,
    clippy::module_name_repetitions,
    clippy::pattern_type_mismatch,
    clippy::pub_use,
    clippy::pub_with_shorthand,
    clippy::question_mark_used,
    clippy::redundant_test_prefix,
    clippy::semicolon_outside_block,
    clippy::separated_literal_suffix,
    clippy::shadow_reuse,
    clippy::shadow_unrelated,
    clippy::single_call_fn,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::unneeded_field_pattern
)]
#![allow(
    clippy::allow_attributes_without_reason,
    clippy::missing_assert_message,
    clippy::missing_docs_in_private_items
)]
// TODO: Prevent panic
#![allow(
    clippy::arithmetic_side_effects,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::unwrap_used
)]

pub mod compiler;
pub mod runtime;
pub mod utils;
pub mod vm;
