//! Stack-based virtual machine for executing bytecode.

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins::BUILTINS;
use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction::{read_u16, Instructions, OpCode};
use crate::error::RuntimeError;
use crate::value::{
    Builtin, Closure, CompiledFunction, HashMap, HashPair, Value, FALSE, NULL, TRUE,
};

/// Initial value stack capacity; doubles on demand.
pub const INITIAL_STACK_SIZE: usize = 256;
/// Hard cap on the value stack.
pub const MAX_STACK_SIZE: usize = 2048;
/// Size of the globals vector.
pub const GLOBALS_SIZE: usize = 65536;
/// Hard cap on the call-frame stack.
pub const MAX_FRAMES: usize = 1024;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// A call frame: one function invocation in flight.
#[derive(Debug, Clone)]
struct Frame {
    /// The closure being executed.
    closure: Rc<Closure>,
    /// Offset of the next byte to fetch.
    ip: usize,
    /// Bottom of this frame's local slot region; slot k is
    /// `stack[base_pointer + k]`.
    base_pointer: usize,
}

impl Frame {
    fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}

/// The virtual machine.
pub struct VM {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Next free stack slot. `stack[sp]` holds the most recently popped
    /// value, which is the observable result after a program completes.
    sp: usize,
    globals: Rc<RefCell<Vec<Value>>>,
    frames: Vec<Frame>,
}

impl VM {
    /// Create a VM for one-shot execution of `bytecode`.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals_store(
            bytecode,
            Rc::new(RefCell::new(vec![NULL; GLOBALS_SIZE])),
        )
    }

    /// Create a VM sharing a globals vector with the caller. The REPL passes
    /// the same vector to each successive run.
    pub fn with_globals_store(bytecode: Bytecode, globals: Rc<RefCell<Vec<Value>>>) -> Self {
        let main_function = Rc::new(CompiledFunction::new(bytecode.instructions, 0, 0));
        let main_closure = Rc::new(Closure::new(main_function));

        let mut frames = Vec::with_capacity(64);
        frames.push(Frame {
            closure: main_closure,
            ip: 0,
            base_pointer: 0,
        });

        Self {
            constants: bytecode.constants,
            stack: vec![NULL; INITIAL_STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// The value most recently popped off the stack. After the final `Pop`
    /// of a program this is the program's result.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack[self.sp].clone()
    }

    /// Main fetch/decode/execute loop.
    pub fn run(&mut self) -> VmResult<()> {
        while !self.frames.is_empty()
            && self.current_frame().ip < self.current_frame().instructions().len()
        {
            let byte = self.read_byte();
            let op = OpCode::from_u8(byte)
                .ok_or_else(|| RuntimeError::new(format!("Invalid opcode: {}", byte)))?;

            match op {
                OpCode::Constant => {
                    let index = self.read_u16_operand();
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }

                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }

                OpCode::True => self.push(TRUE)?,
                OpCode::False => self.push(FALSE)?,
                OpCode::Null => self.push(NULL)?,

                OpCode::Equal
                | OpCode::NotEqual
                | OpCode::GreaterThan
                | OpCode::LessThan
                | OpCode::GreaterThanEqual
                | OpCode::LessThanEqual => {
                    self.execute_comparison(op)?;
                }

                OpCode::Bang => {
                    let operand = self.pop()?;
                    self.push(Value::from_native_bool(!operand.is_truthy()))?;
                }

                OpCode::Minus => {
                    let operand = self.pop()?;
                    let result = match operand {
                        Value::Integer(n) => Value::Integer(n.wrapping_neg()),
                        Value::Float(n) => Value::Float(-n),
                        other => {
                            return Err(RuntimeError::BadNegation(other.type_name().to_string()))
                        }
                    };
                    self.push(result)?;
                }

                OpCode::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target;
                }

                OpCode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }

                // Short-circuit: the left operand is the expression's value
                // along the jump path, and is discarded otherwise.
                OpCode::LogicalAnd => {
                    let target = self.read_u16_operand();
                    let left = self.pop()?;
                    if !left.is_truthy() {
                        self.push(left)?;
                        self.current_frame_mut().ip = target;
                    }
                }

                OpCode::LogicalOr => {
                    let target = self.read_u16_operand();
                    let left = self.pop()?;
                    if left.is_truthy() {
                        self.push(left)?;
                        self.current_frame_mut().ip = target;
                    }
                }

                OpCode::SetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.pop()?;
                    self.globals.borrow_mut()[index] = value;
                }

                OpCode::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals.borrow()[index].clone();
                    self.push(value)?;
                }

                OpCode::SetLocal => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base_pointer + index] = value;
                }

                OpCode::GetLocal => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }

                OpCode::GetBuiltin => {
                    let index = self.read_u8_operand();
                    self.push(Value::Builtin(&BUILTINS[index]))?;
                }

                OpCode::GetFree => {
                    let index = self.read_u8_operand();
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }

                OpCode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }

                OpCode::Array => {
                    let count = self.read_u16_operand();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::array(elements))?;
                }

                OpCode::Hash => {
                    let count = self.read_u16_operand();
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }

                OpCode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }

                OpCode::Call => {
                    let num_args = self.read_u8_operand();
                    self.execute_call(num_args)?;
                }

                OpCode::ReturnValue => {
                    let return_value = self.pop()?;
                    self.unwind_frame(return_value)?;
                }

                OpCode::Return => {
                    self.unwind_frame(NULL)?;
                }

                OpCode::Closure => {
                    let const_index = self.read_u16_operand();
                    let num_free = self.read_u8_operand();
                    self.push_closure(const_index, num_free)?;
                }
            }
        }

        Ok(())
    }

    // ===== Operation handlers =====

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => binary_integer_op(op, *l, *r)?,
            (Value::Float(l), Value::Float(r)) => binary_float_op(op, *l, *r),
            (Value::Integer(l), Value::Float(r)) => binary_float_op(op, *l as f64, *r),
            (Value::Float(l), Value::Integer(r)) => binary_float_op(op, *l, *r as f64),
            (Value::String(l), Value::String(r)) if op == OpCode::Add => {
                Value::string(format!("{}{}", l, r))
            }
            _ => {
                return Err(RuntimeError::BinaryTypeMismatch {
                    left: left.type_name().to_string(),
                    right: right.type_name().to_string(),
                })
            }
        };

        self.push(result)
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            let result = match op {
                OpCode::Equal => l == r,
                OpCode::NotEqual => l != r,
                OpCode::GreaterThan => l > r,
                OpCode::LessThan => l < r,
                OpCode::GreaterThanEqual => l >= r,
                OpCode::LessThanEqual => l <= r,
                _ => unreachable!("non-comparison opcode"),
            };
            return self.push(Value::from_native_bool(result));
        }

        // Ordered comparison stays integer-only; equality dispatches per
        // variant.
        match op {
            OpCode::Equal => self.push(Value::from_native_bool(left == right)),
            OpCode::NotEqual => self.push(Value::from_native_bool(left != right)),
            _ => Err(RuntimeError::UnknownOperator {
                operator: op.name().to_string(),
                left: left.type_name().to_string(),
                right: right.type_name().to_string(),
            }),
        }
    }

    fn build_hash(&self, start: usize, end: usize) -> VmResult<Value> {
        let mut pairs = HashMap::new();

        let mut index = start;
        while index < end {
            let key = self.stack[index].clone();
            let value = self.stack[index + 1].clone();

            let hash_key = key
                .hash_key()
                .ok_or_else(|| RuntimeError::UnusableHashKey(key.type_name().to_string()))?;
            pairs.insert(hash_key, HashPair { key, value });

            index += 2;
        }

        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> VmResult<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                if *i < 0 || *i as usize >= elements.len() {
                    self.push(NULL)
                } else {
                    let element = elements[*i as usize].clone();
                    self.push(element)
                }
            }
            (Value::Hash(pairs), _) => {
                let hash_key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnusableHashKey(index.type_name().to_string()))?;
                match pairs.get(&hash_key) {
                    Some(pair) => {
                        let value = pair.value.clone();
                        self.push(value)
                    }
                    None => self.push(NULL),
                }
            }
            _ => Err(RuntimeError::BadIndex(left.type_name().to_string())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RuntimeError::NotCallable),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> VmResult<()> {
        if num_args != closure.function.num_parameters {
            return Err(RuntimeError::WrongArity {
                want: closure.function.num_parameters,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow(MAX_FRAMES));
        }

        // Arguments already sit in the first local slots; reserve the rest.
        let base_pointer = self.sp - num_args;
        let new_sp = base_pointer + closure.function.num_locals;
        self.reserve_stack(new_sp)?;

        self.frames.push(Frame {
            closure,
            ip: 0,
            base_pointer,
        });
        self.sp = new_sp;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static Builtin, num_args: usize) -> VmResult<()> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(&args);

        // Consume the callee along with the arguments.
        self.sp = self.sp - num_args - 1;
        match result {
            Some(value) => self.push(value),
            None => self.push(NULL),
        }
    }

    fn unwind_frame(&mut self, return_value: Value) -> VmResult<()> {
        let frame = self.frames.pop().expect("frame stack empty");

        if self.frames.is_empty() {
            // Top-level `return`: halt with the value as the observable
            // result.
            self.sp = frame.base_pointer;
            self.push(return_value)?;
            self.pop()?;
            return Ok(());
        }

        // Drop the frame's locals and the callee below them.
        self.sp = frame.base_pointer - 1;
        self.push(return_value)
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> VmResult<()> {
        let constant = self.constants[const_index].clone();
        let Value::CompiledFunction(function) = constant else {
            return Err(RuntimeError::new(format!("Not a function: {}", constant)));
        };

        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }

    // ===== Stack and frame plumbing =====

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= self.stack.len() {
            self.grow_stack()?;
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(RuntimeError::new("Stack underflow"));
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    fn grow_stack(&mut self) -> VmResult<()> {
        let new_capacity = self.stack.len() * 2;
        if new_capacity > MAX_STACK_SIZE {
            return Err(RuntimeError::StackOverflow(MAX_STACK_SIZE));
        }
        self.stack.resize(new_capacity, NULL);
        Ok(())
    }

    fn reserve_stack(&mut self, needed: usize) -> VmResult<()> {
        while self.stack.len() < needed {
            self.grow_stack()?;
        }
        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack empty")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("frame stack empty");
        let byte = frame.closure.function.instructions[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.frames.last_mut().expect("frame stack empty");
        let value = read_u16(&frame.closure.function.instructions, frame.ip);
        frame.ip += 2;
        value as usize
    }

    fn read_u8_operand(&mut self) -> usize {
        self.read_byte() as usize
    }
}

fn binary_integer_op(op: OpCode, left: i64, right: i64) -> VmResult<Value> {
    let result = match op {
        OpCode::Add => left.wrapping_add(right),
        OpCode::Sub => left.wrapping_sub(right),
        OpCode::Mul => left.wrapping_mul(right),
        OpCode::Div => {
            if right == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            left.wrapping_div(right)
        }
        _ => unreachable!("non-arithmetic opcode"),
    };
    Ok(Value::Integer(result))
}

fn binary_float_op(op: OpCode, left: f64, right: f64) -> Value {
    let result = match op {
        OpCode::Add => left + right,
        OpCode::Sub => left - right,
        OpCode::Mul => left * right,
        OpCode::Div => left / right,
        _ => unreachable!("non-arithmetic opcode"),
    };
    Value::Float(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn run_source(source: &str) -> VmResult<Value> {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");

        let mut vm = VM::new(compiler.bytecode());
        vm.run()?;
        Ok(vm.last_popped_stack_elem())
    }

    fn assert_runs(cases: &[(&str, Value)]) {
        for (source, expected) in cases {
            let result = run_source(source).expect(source);
            assert_eq!(&result, expected, "{}", source);
        }
    }

    fn run_error(source: &str) -> RuntimeError {
        run_source(source).expect_err("expected runtime error")
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_runs(&[
            ("1", Value::Integer(1)),
            ("1 + 2", Value::Integer(3)),
            ("1 - 2", Value::Integer(-1)),
            ("2 * 3", Value::Integer(6)),
            ("6 / 2", Value::Integer(3)),
            ("7 / 2", Value::Integer(3)),
            ("50 / 2 * 2 + 10 - 5", Value::Integer(55)),
            ("1 + 2 * 3", Value::Integer(7)),
            ("-5", Value::Integer(-5)),
            ("5 * -2", Value::Integer(-10)),
        ]);
    }

    #[test]
    fn test_float_arithmetic_and_promotion() {
        assert_runs(&[
            ("1.5 + 2.5", Value::Float(4.0)),
            ("1 + 2.5", Value::Float(3.5)),
            ("2.5 * 2", Value::Float(5.0)),
            ("5.0 / 2", Value::Float(2.5)),
            ("-2.5", Value::Float(-2.5)),
        ]);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(run_error("1 / 0"), RuntimeError::DivisionByZero));
    }

    #[test]
    fn test_string_concatenation() {
        assert_runs(&[
            (r#""gib" + "bon""#, Value::string("gibbon")),
            (r#""a" + "b" + "c""#, Value::string("abc")),
        ]);
        assert!(matches!(
            run_error(r#""a" - "b""#),
            RuntimeError::BinaryTypeMismatch { .. }
        ));
        assert!(matches!(
            run_error("1 + true"),
            RuntimeError::BinaryTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_boolean_expressions() {
        assert_runs(&[
            ("true", TRUE),
            ("false", FALSE),
            ("1 < 2", TRUE),
            ("1 > 2", FALSE),
            ("1 <= 1", TRUE),
            ("2 >= 3", FALSE),
            ("1 == 1", TRUE),
            ("1 != 1", FALSE),
            ("true == true", TRUE),
            ("true != false", TRUE),
            ("null == null", TRUE),
            ("(1 < 2) == true", TRUE),
        ]);
    }

    #[test]
    fn test_string_equality_is_by_value() {
        assert_runs(&[
            (r#""a" == "a""#, TRUE),
            (r#""a" != "b""#, TRUE),
            ("1000 == 1000", TRUE),
        ]);
    }

    #[test]
    fn test_ordered_comparison_is_integer_only() {
        assert!(matches!(
            run_error(r#""a" < "b""#),
            RuntimeError::UnknownOperator { .. }
        ));
    }

    #[test]
    fn test_bang_operator() {
        assert_runs(&[
            ("!true", FALSE),
            ("!false", TRUE),
            ("!null", TRUE),
            ("!5", FALSE),
            ("!!5", TRUE),
            ("!0", FALSE),
            (r#"!"""#, FALSE),
        ]);
    }

    #[test]
    fn test_conditionals() {
        assert_runs(&[
            ("if (true) { 10 }", Value::Integer(10)),
            ("if (false) { 10 }", NULL),
            ("if (1) { 10 }", Value::Integer(10)),
            ("if (1 > 2) { 10 } else { 20 }", Value::Integer(20)),
            ("if (1 < 2) { 10 } else { 20 }", Value::Integer(10)),
            ("if (if (false) { 10 }) { 10 } else { 20 }", Value::Integer(20)),
        ]);
    }

    #[test]
    fn test_global_let_statements() {
        assert_runs(&[
            ("let one = 1; one", Value::Integer(1)),
            ("let one = 1; let two = 2; one + two", Value::Integer(3)),
            ("let one = 1; let two = one + one; one + two", Value::Integer(3)),
        ]);
    }

    #[test]
    fn test_assignment_expressions() {
        assert_runs(&[
            ("let x = 1; x += 2", Value::Integer(3)),
            ("let x = 10; x -= 4; x", Value::Integer(6)),
            ("let x = 3; x *= 3; x", Value::Integer(9)),
            ("let x = 9; x /= 3; x", Value::Integer(3)),
            // Inside a function the target is a local slot.
            (
                "let f = fn() { let x = 1; x += 41; x }; f()",
                Value::Integer(42),
            ),
        ]);
    }

    #[test]
    fn test_array_literals_and_indexing() {
        assert_runs(&[
            ("[1, 2, 3][1]", Value::Integer(2)),
            ("let a = [1, 2, 3]; a[1]", Value::Integer(2)),
            ("let a = [1, 2, 3]; a[10]", NULL),
            ("[1, 2, 3][0] + [1, 2, 3][1]", Value::Integer(3)),
            ("[][0]", NULL),
            ("[1][-1]", NULL),
            ("[1 + 2, 3 * 4][1]", Value::Integer(12)),
        ]);
    }

    #[test]
    fn test_hash_literals_and_indexing() {
        assert_runs(&[
            ("{1: 1, 2: 2}[1]", Value::Integer(1)),
            (
                r#"let h = {"a": 1, "b": 2}; h["a"] + h["b"]"#,
                Value::Integer(3),
            ),
            ("{}[0]", NULL),
            ("{1: 1}[2]", NULL),
            ("{true: 5}[true]", Value::Integer(5)),
            (r#"{"k": 1 + 1}["k"]"#, Value::Integer(2)),
        ]);
    }

    #[test]
    fn test_unusable_hash_keys() {
        assert!(matches!(
            run_error("{[]: 1}"),
            RuntimeError::UnusableHashKey(t) if t == "Array"
        ));
        assert!(matches!(
            run_error("{1: 1}[[]]"),
            RuntimeError::UnusableHashKey(_)
        ));
    }

    #[test]
    fn test_bad_index_receiver() {
        assert!(matches!(run_error("5[0]"), RuntimeError::BadIndex(t) if t == "Int"));
    }

    #[test]
    fn test_calling_functions() {
        assert_runs(&[
            (
                "let fivePlusTen = fn() { 5 + 10 }; fivePlusTen()",
                Value::Integer(15),
            ),
            (
                "let a = fn() { 1 }; let b = fn() { a() + 1 }; b()",
                Value::Integer(2),
            ),
            (
                "let early = fn() { return 99; 100; }; early()",
                Value::Integer(99),
            ),
            ("let nothing = fn() { }; nothing()", NULL),
            ("let bare = fn() { return; }; bare()", NULL),
        ]);
    }

    #[test]
    fn test_functions_with_locals_and_arguments() {
        assert_runs(&[
            (
                "let one = fn() { let one = 1; one }; one()",
                Value::Integer(1),
            ),
            (
                "let oneAndTwo = fn() { let one = 1; let two = 2; one + two }; oneAndTwo()",
                Value::Integer(3),
            ),
            (
                "let identity = fn(a) { a }; identity(4)",
                Value::Integer(4),
            ),
            (
                "let sum = fn(a, b) { a + b }; sum(1, 2) + sum(3, 4)",
                Value::Integer(10),
            ),
            (
                "let globalNum = 10;
                 let sum = fn(a, b) { let c = a + b; c + globalNum };
                 sum(1, 2) + globalNum",
                Value::Integer(23),
            ),
        ]);
    }

    #[test]
    fn test_wrong_arity() {
        assert!(matches!(
            run_error("fn() { 1 }(1)"),
            RuntimeError::WrongArity { want: 0, got: 1 }
        ));
        assert!(matches!(
            run_error("fn(a, b) { a + b }(1)"),
            RuntimeError::WrongArity { want: 2, got: 1 }
        ));
    }

    #[test]
    fn test_calling_non_functions() {
        assert!(matches!(run_error("1(2)"), RuntimeError::NotCallable));
        assert!(matches!(
            run_error(r#"let s = "str"; s()"#),
            RuntimeError::NotCallable
        ));
    }

    #[test]
    fn test_builtin_calls() {
        assert_runs(&[
            (r#"len("hello")"#, Value::Integer(5)),
            ("len([1, 2, 3])", Value::Integer(3)),
            ("first([1, 2, 3])", Value::Integer(1)),
            ("last([1, 2, 3])", Value::Integer(3)),
            ("first([])", NULL),
            (r#"puts("out")"#, NULL),
            ("len(push([], 1))", Value::Integer(1)),
        ]);

        // Builtin failures come back as Error values, not VM aborts.
        let result = run_source("len(1)").unwrap();
        assert_eq!(
            result,
            Value::error("argument to `len` not supported, got Int")
        );
    }

    #[test]
    fn test_closures() {
        assert_runs(&[
            (
                "let newClosure = fn(a) { fn() { a } }; newClosure(99)()",
                Value::Integer(99),
            ),
            (
                "let add = fn(a) { fn(b) { a + b } }; add(3)(4)",
                Value::Integer(7),
            ),
            (
                "let newAdderOuter = fn(a, b) {
                     let c = a + b;
                     fn(d) { let e = d + c; fn(f) { e + f } }
                 };
                 newAdderOuter(1, 2)(3)(8)",
                Value::Integer(14),
            ),
        ]);
    }

    #[test]
    fn test_recursive_functions() {
        assert_runs(&[
            (
                "let countDown = fn(x) { if (x == 0) { 0 } else { countDown(x - 1) } };
                 countDown(3)",
                Value::Integer(0),
            ),
            // Recursion through a wrapper still resolves via the current
            // closure.
            (
                "let wrapper = fn() {
                     let countDown = fn(x) { if (x == 0) { 0 } else { countDown(x - 1) } };
                     countDown(2)
                 };
                 wrapper()",
                Value::Integer(0),
            ),
            (
                "let f = fn(x) { if (x < 2) { x } else { f(x - 1) + f(x - 2) } }; f(10)",
                Value::Integer(55),
            ),
        ]);
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        assert_runs(&[
            ("true && false", FALSE),
            ("true && true", TRUE),
            ("false && true", FALSE),
            ("null || 5", Value::Integer(5)),
            ("false || false", FALSE),
            // The unevaluated operand's value, not a coerced boolean.
            ("1 && 2", Value::Integer(2)),
            ("null && 5", NULL),
            ("false && 5", FALSE),
            ("3 || 5", Value::Integer(3)),
            // The right side must not run when short-circuiting.
            ("let x = 0; false && (x += 1); x", Value::Integer(0)),
            ("let x = 0; true || (x += 1); x", Value::Integer(0)),
        ]);
    }

    #[test]
    fn test_while_loops() {
        assert_runs(&[
            ("let i = 0; while (i < 5) { i += 1; } i", Value::Integer(5)),
            (
                "let sum = 0; let i = 1; while (i <= 10) { sum += i; i += 1; } sum",
                Value::Integer(55),
            ),
            ("let i = 10; while (i > 20) { i += 1; } i", Value::Integer(10)),
        ]);
    }

    #[test]
    fn test_for_loops() {
        assert_runs(&[
            (
                "let sum = 0; for (let i = 0; i < 5; i += 1) { sum += i; } sum",
                Value::Integer(10),
            ),
            (
                "let product = 1; for (let i = 1; i <= 4; i += 1) { product *= i; } product",
                Value::Integer(24),
            ),
            // Loops inside a function use local slots.
            (
                "let f = fn() { let sum = 0; for (let i = 0; i < 4; i += 1) { sum += i; } sum };
                 f()",
                Value::Integer(6),
            ),
        ]);
    }

    #[test]
    fn test_break_and_continue() {
        assert_runs(&[
            (
                "let i = 0; while (true) { i += 1; if (i == 3) { break; } } i",
                Value::Integer(3),
            ),
            (
                "let sum = 0;
                 for (let i = 0; i < 5; i += 1) {
                     if (i == 2) { continue; }
                     sum += i;
                 }
                 sum",
                Value::Integer(8),
            ),
            (
                "let sum = 0;
                 for (;;) {
                     sum += 1;
                     if (sum >= 4) { break; }
                 }
                 sum",
                Value::Integer(4),
            ),
            (
                "let i = 0; let hits = 0;
                 while (i < 6) {
                     i += 1;
                     if (i == 2 || i == 4) { continue; }
                     hits += 1;
                 }
                 hits",
                Value::Integer(4),
            ),
        ]);
    }

    #[test]
    fn test_frame_overflow_on_runaway_recursion() {
        assert!(matches!(
            run_error("let f = fn() { f() }; f()"),
            RuntimeError::FrameOverflow(_)
        ));
    }

    #[test]
    fn test_stack_overflow_on_huge_expression() {
        let elements = vec!["0"; MAX_STACK_SIZE + 1].join(", ");
        let source = format!("[{}]", elements);
        assert!(matches!(
            run_error(&source),
            RuntimeError::StackOverflow(_)
        ));
    }

    #[test]
    fn test_top_level_return_halts() {
        let result = run_source("return 42; 99;").unwrap();
        assert_eq!(result, Value::Integer(42));
    }

    #[test]
    fn test_globals_store_threads_across_runs() {
        let tokens = Scanner::new("let a = 5;").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();
        let bytecode = compiler.bytecode();
        let (symbol_table, constants) = compiler.into_state();

        let globals = Rc::new(RefCell::new(vec![NULL; GLOBALS_SIZE]));
        let mut vm = VM::with_globals_store(bytecode, globals.clone());
        vm.run().unwrap();

        let tokens = Scanner::new("a * 2").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut compiler = Compiler::with_state(symbol_table, constants);
        compiler.compile(&program).unwrap();

        let mut vm = VM::with_globals_store(compiler.bytecode(), globals);
        vm.run().unwrap();
        assert_eq!(vm.last_popped_stack_elem(), Value::Integer(10));
    }
}
