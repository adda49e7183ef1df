//! fallback-arbiter CLI
//!
//! Usage:
//!   fallback-arbiter --script turns.jsonl          # Replay a scripted conversation
//!   fallback-arbiter --interactive                 # One turn per stdin line
//!   fallback-arbiter --serve                       # HTTP API server
//!   fallback-arbiter --script turns.jsonl --json   # JSON turn reports

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fallback_arbiter::config::Config;
use fallback_arbiter::core::{parse_script, run_server, Session, StaticCatalog, TurnScript};
use fallback_arbiter::types::{TurnInput, TurnReport};
use fallback_arbiter::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "fallback-arbiter",
    version = VERSION,
    about = "Fallback arbitration and reprompt/markup tracking for conversational agents",
    long_about = "Drives a fallback arbitrator and a reprompt tracker through scripted turns.\n\n\
                  Each turn is a JSON object: input, optional output, mid-turn commands\n\
                  and the scripted answers of the dialogue engine.\n\n\
                  Modes:\n  \
                  --script       Replay a JSON-lines script\n  \
                  --interactive  Read turns from stdin (JSON, or plain text as speech)\n  \
                  --serve        HTTP API server mode\n\n\
                  Policies (first claim wins):\n  \
                  EVENT, SILENT, CONVERSATION, SOCIAL_ONLY, DEFAULT"
)]
struct Args {
    /// JSON-lines script to replay
    #[arg(long)]
    script: Option<String>,

    /// Interactive mode - one turn per stdin line
    #[arg(short, long)]
    interactive: bool,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<String>,

    /// JSON content catalog (authored fallback metadata)
    #[arg(long)]
    catalog: Option<String>,

    /// Log filter, e.g. "info" or "fallback_arbiter=debug"
    #[arg(long, default_value = "fallback_arbiter=info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match args.config.as_deref() {
        Some(path) => Config::load(path).unwrap_or_else(|e| fail(&format!("Config error: {}", e))),
        None => Config::default(),
    };
    let catalog = match args.catalog.as_deref() {
        Some(path) => load_catalog(path).unwrap_or_else(|e| fail(&format!("Catalog error: {}", e))),
        None => StaticCatalog::new(),
    };

    if args.serve {
        if let Err(e) = run_server(&args.addr, config, catalog).await {
            fail(&format!("Server error: {}", e));
        }
    } else if let Some(ref path) = args.script {
        run_script_file(path, Session::new(config, catalog), &args);
    } else {
        run_interactive(Session::new(config, catalog), &args);
    }
}

/// Logs go to stderr so reports on stdout stay machine-readable
fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

fn load_catalog(path: &str) -> Result<StaticCatalog, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

/// Replay a whole script
fn run_script_file(path: &str, mut session: Session, args: &Args) {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| fail(&format!("Cannot read {}: {}", path, e)));
    let scripts = parse_script(&text).unwrap_or_else(|e| fail(&format!("Invalid script {}: {}", path, e)));

    for script in scripts {
        let report = session.run_turn(script);
        print_report(&report, args);
        print_reprompt_event(&mut session, args);
    }
}

/// One turn per line: a JSON turn script, or plain text taken as speech
fn run_interactive(mut session: Session, args: &Args) {
    if !args.json {
        println!("fallback-arbiter v{} - interactive", VERSION);
        println!("Enter a JSON turn or plain text. Type 'quit' to exit.");
        println!();
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if !args.json {
            print!("> ");
            let _ = stdout.flush();
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            if !args.json {
                println!("\nSession ended. Turns: {}", session.turns());
            }
            break;
        }
        if line.is_empty() {
            continue;
        }

        let script = if line.starts_with('{') {
            match serde_json::from_str::<TurnScript>(line) {
                Ok(script) => script,
                Err(e) => {
                    eprintln!("Invalid turn: {}", e);
                    continue;
                }
            }
        } else {
            TurnScript::new(TurnInput::speech(line))
        };

        let report = session.run_turn(script);
        print_report(&report, args);
        print_reprompt_event(&mut session, args);
    }
}

fn print_report(report: &TurnReport, args: &Args) {
    if args.json {
        match serde_json::to_string(report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Cannot serialize report: {}", e),
        }
    } else if args.no_color {
        println!("{}", report.to_parseable_string());
    } else {
        println!("{}", report.to_terminal_string());
    }
}

fn print_reprompt_event(session: &mut Session, args: &Args) {
    if let Some(event) = session.take_reprompt_event() {
        if args.json {
            if let Ok(json) = serde_json::to_string(&event) {
                println!("{}", json);
            }
        } else {
            println!("  -> reprompt event: {}", event.text);
        }
    }
}
