//! Gibbon CLI: run script files, evaluate one-liners, or start the REPL.

use std::env;
use std::fs;
use std::process;

use gibbon::repl::Repl;

const VERSION: &str = env!("CARGO_PKG_VERSION");

enum Command {
    /// Run a script file.
    Run { file: String },
    /// Evaluate a string and print the result.
    Eval { code: String },
    /// Start the interactive REPL.
    Repl,
}

struct Options {
    command: Command,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Gibbon {}", VERSION);
    eprintln!();
    eprintln!("Usage: gibbon [options] [script.gib]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>        Evaluate code and print the result");
    eprintln!("  --disassemble    Dump bytecode before executing");
    eprintln!("  --help, -h       Show this help message");
    eprintln!();
    eprintln!("With no script, starts the interactive REPL.");
}

fn parse_args() -> Result<Options, String> {
    let mut args = env::args().skip(1);
    let mut disassemble = false;
    let mut command = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--disassemble" => disassemble = true,
            "-e" => {
                let code = args.next().ok_or("-e requires an argument")?;
                command = Some(Command::Eval { code });
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {}", other));
            }
            file => {
                command = Some(Command::Run {
                    file: file.to_string(),
                });
            }
        }
    }

    Ok(Options {
        command: command.unwrap_or(Command::Repl),
        disassemble,
    })
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            print_usage();
            process::exit(2);
        }
    };

    match options.command {
        Command::Repl => Repl::new().run(),

        Command::Run { file } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(error) => {
                    eprintln!("Could not read '{}': {}", file, error);
                    process::exit(1);
                }
            };
            if let Err(error) = gibbon::run_with_options(&source, options.disassemble) {
                eprintln!("{}", error);
                process::exit(1);
            }
        }

        Command::Eval { code } => match gibbon::run_with_options(&code, options.disassemble) {
            Ok(result) => println!("{}", result),
            Err(error) => {
                eprintln!("{}", error);
                process::exit(1);
            }
        },
    }
}
