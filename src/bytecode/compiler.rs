//! Bytecode compiler: lowers the AST into instructions and constants.
//!
//! Lowering is single-pass. Forward control flow (if/else, short-circuit
//! operators, loop exits) is emitted with placeholder jump targets that are
//! back-patched once the target offset is known. A small peephole window
//! (the last two emitted instructions per scope) supports removing or
//! rewriting a trailing `Pop` so blocks and function bodies yield values.

use std::rc::Rc;

use crate::ast::{AssignOp, Block, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::builtins::BUILTINS;
use crate::bytecode::instruction::{make, Instructions, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::error::CompileError;
use crate::span::Span;
use crate::value::{CompiledFunction, Value};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// The output of a compile: a main instruction stream plus the constant pool.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// Placeholder operand for jumps patched after their target is known.
const PLACEHOLDER: usize = 0xFFFF;

/// The last instruction written to a scope's buffer.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// Pending jump fixups for one `while`/`for` under compilation.
#[derive(Debug, Default)]
struct LoopContext {
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

/// Per-function compilation state.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
    loops: Vec<LoopContext>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    /// Create a compiler with a fresh symbol table seeded with the builtin
    /// registry.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Resume compilation with state carried over from a previous compile.
    /// Used by the REPL to keep bindings and constants across lines.
    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Hand the symbol table and constant pool back for the next compile.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    /// Compile a program into the current scope.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// The finished bytecode for the main scope.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    // ===== Statements =====

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
            }

            StmtKind::Let { name, value } => {
                // Defined before the right-hand side so `let f = fn ...`
                // can refer to itself.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                self.emit_store(&symbol, stmt.span)?;
            }

            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.compile_expression(expr)?,
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                }
                self.emit(OpCode::ReturnValue, &[]);
            }

            StmtKind::While { condition, body } => {
                let loop_start = self.current_instructions().len();
                self.compile_expression(condition)?;
                let exit_jump = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]);

                self.begin_loop();
                self.compile_block(body)?;
                let ctx = self.end_loop();

                // `continue` re-evaluates the condition.
                for position in ctx.continue_jumps {
                    self.change_operand(position, loop_start);
                }

                self.emit(OpCode::Jump, &[loop_start]);

                let after_loop = self.current_instructions().len();
                self.change_operand(exit_jump, after_loop);
                for position in ctx.break_jumps {
                    self.change_operand(position, after_loop);
                }
            }

            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.compile_statement(init)?;
                }

                let loop_start = self.current_instructions().len();

                let mut exit_jump = None;
                if let Some(condition) = condition {
                    self.compile_expression(condition)?;
                    exit_jump = Some(self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]));
                }

                self.begin_loop();
                self.compile_block(body)?;
                let ctx = self.end_loop();

                // `continue` lands on the update clause.
                let update_start = self.current_instructions().len();
                for position in ctx.continue_jumps {
                    self.change_operand(position, update_start);
                }

                if let Some(update) = update {
                    self.compile_expression(update)?;
                    self.emit(OpCode::Pop, &[]);
                }

                self.emit(OpCode::Jump, &[loop_start]);

                let after_loop = self.current_instructions().len();
                if let Some(position) = exit_jump {
                    self.change_operand(position, after_loop);
                }
                for position in ctx.break_jumps {
                    self.change_operand(position, after_loop);
                }
            }

            StmtKind::Break => {
                if self.current_scope().loops.is_empty() {
                    return Err(CompileError::BreakOutsideLoop(stmt.span));
                }
                let position = self.emit(OpCode::Jump, &[PLACEHOLDER]);
                if let Some(ctx) = self.current_scope_mut().loops.last_mut() {
                    ctx.break_jumps.push(position);
                }
            }

            StmtKind::Continue => {
                if self.current_scope().loops.is_empty() {
                    return Err(CompileError::ContinueOutsideLoop(stmt.span));
                }
                let position = self.emit(OpCode::Jump, &[PLACEHOLDER]);
                if let Some(ctx) = self.current_scope_mut().loops.last_mut() {
                    ctx.continue_jumps.push(position);
                }
            }
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // ===== Expressions =====

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                let index = self.add_constant(Value::Integer(*n), expr.span)?;
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::FloatLiteral(n) => {
                let index = self.add_constant(Value::Float(*n), expr.span)?;
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::StringLiteral(s) => {
                let index = self.add_constant(Value::string(s.clone()), expr.span)?;
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::BoolLiteral(value) => {
                if *value {
                    self.emit(OpCode::True, &[]);
                } else {
                    self.emit(OpCode::False, &[]);
                }
            }

            ExprKind::Null => {
                self.emit(OpCode::Null, &[]);
            }

            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone(), expr.span))?;
                self.load_symbol(&symbol);
            }

            ExprKind::Prefix { operator, operand } => {
                self.compile_expression(operand)?;
                match operator {
                    PrefixOp::Bang => self.emit(OpCode::Bang, &[]),
                    PrefixOp::Minus => self.emit(OpCode::Minus, &[]),
                };
            }

            ExprKind::Infix {
                left,
                operator,
                right,
            } => {
                self.compile_infix(left, *operator, right)?;
            }

            ExprKind::Assign {
                name,
                operator,
                value,
            } => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone(), expr.span))?;

                // Load the current value, apply the operation, store, then
                // load again so the expression yields the new value.
                self.load_symbol(&symbol);
                self.compile_expression(value)?;
                match operator {
                    AssignOp::Add => self.emit(OpCode::Add, &[]),
                    AssignOp::Sub => self.emit(OpCode::Sub, &[]),
                    AssignOp::Mul => self.emit(OpCode::Mul, &[]),
                    AssignOp::Div => self.emit(OpCode::Div, &[]),
                };
                self.emit_store(&symbol, expr.span)?;
                self.load_symbol(&symbol);
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                let jump_not_truthy = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]);

                self.compile_block(consequence)?;
                // The branch must leave its value on the stack.
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }

                let jump_over_alternative = self.emit(OpCode::Jump, &[PLACEHOLDER]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(OpCode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump_over_alternative, after_alternative);
            }

            ExprKind::Function {
                name,
                parameters,
                body,
            } => {
                self.enter_scope();

                if let Some(name) = name {
                    self.symbol_table.define_function_name(name);
                }
                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block(body)?;

                if self.last_instruction_is(OpCode::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(OpCode::ReturnValue) {
                    self.emit(OpCode::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions;
                let instructions = self.leave_scope();

                // Each free symbol is loaded in the enclosing scope; the
                // values become the new closure's capture vector.
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = CompiledFunction::new(instructions, num_locals, parameters.len());
                let index =
                    self.add_constant(Value::CompiledFunction(Rc::new(function)), expr.span)?;
                self.emit(OpCode::Closure, &[index, free_symbols.len()]);
            }

            ExprKind::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }

            ExprKind::Hash(pairs) => {
                // Sort by the key's textual form for deterministic output.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Hash, &[pairs.len() * 2]);
            }

            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
            }
        }

        Ok(())
    }

    fn compile_infix(&mut self, left: &Expr, operator: InfixOp, right: &Expr) -> CompileResult<()> {
        // Less-than folds onto greater-than with the operands swapped.
        if operator == InfixOp::Less || operator == InfixOp::LessEqual {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            if operator == InfixOp::Less {
                self.emit(OpCode::GreaterThan, &[]);
            } else {
                self.emit(OpCode::GreaterThanEqual, &[]);
            }
            return Ok(());
        }

        if operator == InfixOp::And || operator == InfixOp::Or {
            self.compile_expression(left)?;
            let op = if operator == InfixOp::And {
                OpCode::LogicalAnd
            } else {
                OpCode::LogicalOr
            };
            let jump = self.emit(op, &[PLACEHOLDER]);
            self.compile_expression(right)?;
            let after_right = self.current_instructions().len();
            self.change_operand(jump, after_right);
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;

        match operator {
            InfixOp::Add => self.emit(OpCode::Add, &[]),
            InfixOp::Sub => self.emit(OpCode::Sub, &[]),
            InfixOp::Mul => self.emit(OpCode::Mul, &[]),
            InfixOp::Div => self.emit(OpCode::Div, &[]),
            InfixOp::Equal => self.emit(OpCode::Equal, &[]),
            InfixOp::NotEqual => self.emit(OpCode::NotEqual, &[]),
            InfixOp::Greater => self.emit(OpCode::GreaterThan, &[]),
            InfixOp::GreaterEqual => self.emit(OpCode::GreaterThanEqual, &[]),
            InfixOp::Less | InfixOp::LessEqual | InfixOp::And | InfixOp::Or => unreachable!(),
        };

        Ok(())
    }

    // ===== Symbols =====

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
    }

    fn emit_store(&mut self, symbol: &Symbol, span: Span) -> CompileResult<()> {
        match symbol.scope {
            SymbolScope::Global => {
                self.emit(OpCode::SetGlobal, &[symbol.index]);
                Ok(())
            }
            SymbolScope::Local => {
                self.emit(OpCode::SetLocal, &[symbol.index]);
                Ok(())
            }
            _ => Err(CompileError::new(
                format!("Cannot assign to '{}'", symbol.name),
                span,
            )),
        }
    }

    // ===== Scope management =====

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack underflow");
        let outer = std::mem::take(&mut self.symbol_table)
            .into_outer()
            .expect("symbol table chain underflow");
        self.symbol_table = outer;
        scope.instructions
    }

    fn begin_loop(&mut self) {
        self.current_scope_mut().loops.push(LoopContext::default());
    }

    fn end_loop(&mut self) -> LoopContext {
        self.current_scope_mut()
            .loops
            .pop()
            .expect("loop stack underflow")
    }

    // ===== Emission =====

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.current_scope()
            .last_instruction
            .is_some_and(|last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
            scope.previous_instruction = None;
        }
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let scope = self.current_scope_mut();
        scope.instructions[position..position + new_instruction.len()]
            .copy_from_slice(new_instruction);
    }

    /// Rewrite the operand of the instruction at `position` in place. Only
    /// valid for equal-width re-encodings.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::from_u8(self.current_instructions()[position])
            .expect("patching a non-instruction byte");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }

    fn replace_last_pop_with_return(&mut self) {
        let Some(last) = self.current_scope().last_instruction else {
            return;
        };
        self.replace_instruction(last.position, &make(OpCode::ReturnValue, &[]));
        self.current_scope_mut().last_instruction = Some(EmittedInstruction {
            opcode: OpCode::ReturnValue,
            position: last.position,
        });
    }

    fn add_constant(&mut self, value: Value, span: Span) -> CompileResult<usize> {
        if self.constants.len() >= u16::MAX as usize {
            return Err(CompileError::TooManyConstants(span));
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("scope stack empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("scope stack empty")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
