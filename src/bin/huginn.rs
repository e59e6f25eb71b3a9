//! huginn: command-line driver for the optimized AI service.
//!
//! Invokes analysis functions through the cache/retry/batch layer using the
//! configured endpoint, then prints the results and a metrics snapshot.

use std::io::{self, BufRead, BufReader, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

use huginn::{Config, Huginn, Priority};

/// Huginn command-line driver
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version)]
#[command(about = "Call AI analysis functions through the huginn optimization layer")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Invoke a function once
    Call {
        /// Function name (e.g. "student-analysis")
        function: String,
        /// JSON parameters (or omit to read from stdin)
        #[arg(short, long)]
        params: Option<String>,
        /// Number of times to repeat the call (repeats are served from cache)
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Invoke a function for every line of a JSON-lines file
    Batch {
        /// Function name
        function: String,
        /// File with one JSON parameter object per line (or "-" for stdin)
        #[arg(short, long)]
        file: PathBuf,
        /// Use the heavy-analysis batch preset
        #[arg(long)]
        analysis: bool,
    },

    /// Queue calls with priorities and print each result
    Queue {
        /// Function name
        function: String,
        /// File with one `{"priority": "...", "params": {...}}` object per line
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: huginn=info; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("huginn=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let service = Huginn::builder().from_config(&config).build()?;

    match args.command {
        Command::Call {
            function,
            params,
            repeat,
        } => {
            let params: Value = serde_json::from_str(&read_input(params)?)?;
            for _ in 0..repeat.max(1) {
                let value = service.call_default(&function, &params).await?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Command::Batch {
            function,
            file,
            analysis,
        } => {
            let params = read_json_lines(&file)?;
            let options = if analysis {
                huginn::BatchOptions::analysis().call_options(config.call_options())
            } else {
                config.batch_options()
            };
            let report = service
                .run_batch_with_progress(&function, &params, &options, |done, total| {
                    info!(done, total, "batch progress");
                })
                .await;

            let failures: Vec<Value> = report
                .failures
                .iter()
                .map(|f| json!({"index": f.index, "error": f.error.to_string()}))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "results": report.results,
                    "failures": failures,
                }))?
            );
        }
        Command::Queue { function, file } => {
            let mut pending = Vec::new();
            for line in read_json_lines(&file)? {
                let priority: Priority = match line.get("priority") {
                    Some(p) => serde_json::from_value(p.clone())?,
                    None => Priority::default(),
                };
                let params = line.get("params").cloned().unwrap_or(Value::Null);
                let options = config.call_options().priority(priority);
                pending.push(service.enqueue(function.clone(), params, options));
            }
            for call in pending {
                let id = call.id().to_string();
                match call.await {
                    Ok(value) => println!("{}", json!({"id": id, "result": value})),
                    Err(e) => println!("{}", json!({"id": id, "error": e.to_string()})),
                }
            }
        }
    }

    eprintln!("{}", serde_json::to_string_pretty(&service.snapshot())?);
    Ok(())
}

/// Read an argument or fall back to stdin.
fn read_input(arg: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if io::stdin().is_terminal() {
        return Err("no input provided (pass --params or pipe to stdin)".into());
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Parse one JSON value per non-empty line.
fn read_json_lines(path: &Path) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(std::fs::File::open(path)?))
    };

    let mut values = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        values.push(serde_json::from_str(&line)?);
    }
    Ok(values)
}
