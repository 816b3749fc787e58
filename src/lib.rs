/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into a
/// [`Specification`](ast::Specification). Names are resolved as they are
/// defined, so a successful parse yields a fully validated AST.
pub mod parser;

/// Lookup, insertion and reference resolution over the definitions of a
/// specification.
pub mod registry;

/// Code generation takes a validated specification and renders it as Rust.
pub mod codegen;

pub mod ast;
pub mod token;
pub mod util;
