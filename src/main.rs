use rcscheme::Interpreter;
use rcscheme::ast::Value;
use rcscheme::evaluator::evaluate;
use rcscheme::scheme::parse_program_with_config;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Once;

const HISTORY_FILE: &str = ".rcscheme-history";

static TRACING_INIT: Once = Once::new();

/// Install a log subscriber, only when `RUST_LOG` is set
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

#[derive(Debug, Default, PartialEq)]
struct Options {
    interactive: bool,
    print_parsed: bool,
    scripts: Vec<String>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Run(Options),
}

/// Interpret command-line arguments (without the program name)
fn parse_options(args: &[String]) -> Result<Command, String> {
    let mut options = Options::default();
    let mut force_interactive = false;
    let mut args = args.iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" => return Ok(Command::Help),
            "-i" => force_interactive = true,
            "-p" => options.print_parsed = true,
            "-s" => match args.next() {
                Some(script) => options.scripts.push(script.clone()),
                None => return Err("Option -s requires a script name".into()),
            },
            other => eprintln!("Warning: unknown option '{other}'"),
        }
    }

    options.interactive = force_interactive || options.scripts.is_empty();
    Ok(Command::Run(options))
}

fn print_help(program: &str) {
    println!("{program} [OPTIONS]");
    println!();
    println!("Options:");
    println!("    -h");
    println!("        Show this help.");
    println!("    -i");
    println!("        Enable interactive mode. (default unless a script is specified)");
    println!("    -s SCRIPT");
    println!("        Run the specified script. May be given more than once.");
    println!("    -p");
    println!("        Print the parsed form in interactive mode.");
    println!();
    println!("Set RUST_LOG (e.g. RUST_LOG=rcscheme=debug) to enable logging.");
}

fn history_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}

/// Line-editor helper completing names bound in the global environment
#[derive(Default)]
struct SchemeHelper {
    /// Bound names, each flagged with whether its value is callable
    names: Vec<(String, bool)>,
}

impl SchemeHelper {
    fn refresh(&mut self, interpreter: &Interpreter) {
        self.names = interpreter
            .env()
            .get_all_bindings()
            .into_iter()
            .map(|(name, value)| (name, value.is_callable()))
            .collect();
    }

    fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let before = &line[..pos];
        let start = before
            .rfind(|c: char| c.is_whitespace() || "\"'()".contains(c))
            .map_or(0, |i| i + 1);
        let prefix = &before[start..];
        // Right after an opening paren only callables make sense
        let only_callables = before[..start].trim_end().ends_with('(');

        let matches = self
            .names
            .iter()
            .filter(|(name, callable)| (*callable || !only_callables) && name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect();
        (start, matches)
    }
}

impl Completer for SchemeHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok(self.candidates(line, pos))
    }
}

impl Hinter for SchemeHelper {
    type Hint = String;
}

impl Highlighter for SchemeHelper {}

impl Validator for SchemeHelper {}

impl Helper for SchemeHelper {}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("rcscheme", String::as_str);
    let options = match parse_options(args.get(1..).unwrap_or_default()) {
        Ok(Command::Help) => {
            print_help(program);
            return ExitCode::SUCCESS;
        }
        Ok(Command::Run(options)) => options,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| run(&options)));

    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
        Err(panic_info) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(options: &Options) -> Result<(), ReadlineError> {
    let interpreter = Interpreter::new();

    for script in &options.scripts {
        if let Err(e) = interpreter.run_script(script) {
            eprintln!("exception: {e}");
        }
    }

    if options.interactive {
        run_repl(&interpreter, options.print_parsed)?;
    }
    Ok(())
}

fn run_repl(interpreter: &Interpreter, print_parsed: bool) -> Result<(), ReadlineError> {
    let mut rl: Editor<SchemeHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(SchemeHelper::default()));

    let history = history_path();
    if rl.load_history(&history).is_err() {
        tracing::debug!(path = %history.display(), "no history loaded");
    }

    let mut buffer = String::new();

    loop {
        if let Some(helper) = rl.helper_mut() {
            helper.refresh(interpreter);
        }

        let prompt = if buffer.is_empty() { "> " } else { "... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() && line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                buffer.push_str(&line);
                buffer.push('\n');

                let forms = match parse_program_with_config(&buffer, interpreter.config()) {
                    Ok(forms) => forms,
                    // Keep reading until the form is closed
                    Err(e) if e.is_incomplete() => continue,
                    Err(e) => {
                        println!("exception: {e}");
                        buffer.clear();
                        continue;
                    }
                };
                buffer.clear();

                for form in forms.iter() {
                    if print_parsed {
                        println!("% {form}");
                    }
                    match evaluate(form, interpreter.env()) {
                        Value::Null => {}
                        result => println!("{result}"),
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(&history) {
        eprintln!("Error saving history: {err:?}");
    }
    Ok(())
}
