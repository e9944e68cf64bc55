//! Interactive REPL.
//!
//! Compiler and VM state thread across lines: the symbol table, the
//! constant pool, and the globals vector all survive from one input to the
//! next, so bindings defined earlier stay visible.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::builtins::BUILTINS;
use crate::bytecode::{Compiler, SymbolTable, GLOBALS_SIZE, VM};
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::value::{Value, NULL};

const PROMPT: &str = ">> ";
const HISTORY_FILE: &str = ".gibbon_history";

pub struct Repl {
    symbol_table: Option<SymbolTable>,
    constants: Vec<Value>,
    globals: Rc<RefCell<Vec<Value>>>,
    history_file: PathBuf,
}

impl Repl {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            symbol_table: Some(symbol_table),
            constants: Vec::new(),
            globals: Rc::new(RefCell::new(vec![NULL; GLOBALS_SIZE])),
            history_file: Self::history_path(),
        }
    }

    fn history_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(HISTORY_FILE)
        } else {
            PathBuf::from(HISTORY_FILE)
        }
    }

    pub fn run(&mut self) {
        println!("Gibbon {}", env!("CARGO_PKG_VERSION"));
        println!("Type \"exit\" or press Ctrl+D to quit.\n");

        let Ok(mut editor) = DefaultEditor::new() else {
            eprintln!("Could not initialize line editing");
            return;
        };
        let _ = editor.load_history(&self.history_file);

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" {
                        break;
                    }
                    let _ = editor.add_history_entry(line);
                    self.execute_line(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(error) => {
                    eprintln!("Error: {}", error);
                    break;
                }
            }
        }

        let _ = editor.save_history(&self.history_file);
        println!("Goodbye!");
    }

    fn execute_line(&mut self, line: &str) {
        let tokens = match Scanner::new(line).scan_tokens() {
            Ok(tokens) => tokens,
            Err(error) => {
                eprintln!("{}", error);
                return;
            }
        };

        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(error) => {
                eprintln!("{}", error);
                return;
            }
        };

        let symbol_table = self.symbol_table.take().expect("symbol table in flight");
        let constants = std::mem::take(&mut self.constants);
        let mut compiler = Compiler::with_state(symbol_table, constants);

        if let Err(error) = compiler.compile(&program) {
            // Keep the pre-compile bindings for the next line.
            let (symbol_table, constants) = compiler.into_state();
            self.symbol_table = Some(symbol_table);
            self.constants = constants;
            eprintln!("{}", error);
            return;
        }

        let bytecode = compiler.bytecode();
        let (symbol_table, constants) = compiler.into_state();
        self.symbol_table = Some(symbol_table);
        self.constants = constants;

        let mut vm = VM::with_globals_store(bytecode, self.globals.clone());
        if let Err(error) = vm.run() {
            eprintln!("{}", error);
            return;
        }

        let result = vm.last_popped_stack_elem();
        if !matches!(result, Value::Null) {
            println!("{}", result);
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}
