//! Gibbon: a small dynamically-typed scripting language.
//!
//! Programs run through a bytecode pipeline: the source is lexed and parsed
//! into an AST, a single-pass compiler lowers the AST into a flat
//! instruction stream plus a constant pool, and a stack-based virtual
//! machine executes the result.

#![allow(clippy::new_without_default)]

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod span;
pub mod value;

use error::GibbonError;
use value::Value;

/// Parse source code into an AST without compiling.
pub fn parse(source: &str) -> Result<ast::Program, GibbonError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<bytecode::Bytecode, GibbonError> {
    let program = parse(source)?;
    let mut compiler = bytecode::Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Compile and run a program, returning its observable result: the value
/// most recently popped off the VM stack.
pub fn run(source: &str) -> Result<Value, GibbonError> {
    run_with_options(source, false)
}

/// Compile and run a program, optionally dumping the disassembly first.
pub fn run_with_options(source: &str, disassemble: bool) -> Result<Value, GibbonError> {
    let bytecode = compile(source)?;

    if disassemble {
        bytecode::print_disassembly(&bytecode);
        println!("---");
    }

    let mut vm = bytecode::VM::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped_stack_elem())
}

/// Disassemble compiled bytecode to a string.
pub fn disassemble(bytecode: &bytecode::Bytecode) -> String {
    bytecode::disassemble(bytecode)
}
