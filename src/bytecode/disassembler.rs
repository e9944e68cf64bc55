//! Whole-program disassembly for debugging.
//!
//! The per-stream instruction format is `Instructions`' `Display` impl;
//! this module adds the surrounding structure: the constant pool and the
//! bodies of nested compiled functions.

use crate::bytecode::compiler::Bytecode;
use crate::value::Value;
use std::fmt::Write;

/// Render a compiled program, including every function body in the
/// constant pool.
pub fn disassemble(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    writeln!(&mut output, "== main ==").unwrap();
    output.push_str(&bytecode.instructions.to_string());

    for (index, constant) in bytecode.constants.iter().enumerate() {
        if let Value::CompiledFunction(function) = constant {
            writeln!(
                &mut output,
                "\n== fn @{} (locals: {}, params: {}) ==",
                index, function.num_locals, function.num_parameters
            )
            .unwrap();
            output.push_str(&function.instructions.to_string());
        }
    }

    output
}

/// Print a disassembly to stdout.
pub fn print_disassembly(bytecode: &Bytecode) {
    print!("{}", disassemble(bytecode));
}
