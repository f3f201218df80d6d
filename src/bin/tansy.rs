use std::path::PathBuf;

use clap::{command, Parser};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tansy::script::ModuleRegistry;
use tansy::{
    Error, EventError, EventReceiver, Interpreter, InterpreterConfig, InterpreterEvent,
    TansyResult,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tansy.json")]
    config: PathBuf,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> TansyResult<()> {
    let config = if cli.config.exists() {
        InterpreterConfig::from_file(&cli.config)?
    } else {
        InterpreterConfig::default()
    };
    debug!("config: {:?}", config);

    let mut engine = Interpreter::with_config(ModuleRegistry::new(), config);
    let mut events = engine.subscribe();
    engine.start()?;

    println!("Welcome to tansy! Type exit() to quit.");

    let mut editor = DefaultEditor::new()
        .map_err(|e| Error::internal(format!("Failed to initialize line editor: {}", e)))?;
    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                if line.trim() == "exit()" {
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                engine.evaluate(line);
                drain_until_idle(&mut events);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                return Err(Error::internal(format!("Failed to read input: {}", e)));
            }
        }
    }

    engine.stop();
    wait_for_termination(&mut events);
    println!("Interpreter stopped.");
    Ok(())
}

/// Prints results as they arrive and returns once the worker goes idle.
fn drain_until_idle(events: &mut EventReceiver) {
    loop {
        match events.recv_blocking() {
            Ok(InterpreterEvent::Evaluated { output, .. }) => {
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            Ok(InterpreterEvent::Error { message, .. }) => println!("{}", message),
            Ok(InterpreterEvent::StateChanged { busy: false }) => break,
            Ok(_) => {}
            // 取りこぼしてもワーカーは動いているので待ち続ける
            Err(Error::Event(EventError::Lagged { .. })) => continue,
            Err(_) => break,
        }
    }
}

// stop()が戻った時点でTerminatedは送信済みなので、受信に失敗したら待たない
fn wait_for_termination(events: &mut EventReceiver) {
    loop {
        match events.recv_blocking() {
            Ok(InterpreterEvent::Terminated) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
