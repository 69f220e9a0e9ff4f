//! ppstage CLI
//!
//! Runs the pcpp task over one or more documents from the command line.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ppstage_core::{Config, TaskOptions};
use ppstage_engine::args::DATA_ARGUMENT;
use ppstage_engine::{get_engine, Engine, OPTION_TABLE};
use ppstage_task::pcpp::{self, FORWARD_HELP};
use ppstage_task::{BatchItem, BatchRunner, ForwardDecl, PcppTask};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ppstage")]
#[command(author, version, about = "C preprocessor as a pipeline stage", long_about = None)]
struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess documents and forward the result
    Run(RunArgs),

    /// Show task options, forwarded fields and the engine in use
    Info,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Files to preprocess (use '-' for stdin)
    #[arg(value_name = "DATA", required = true)]
    data: Vec<String>,

    /// Output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Predefine name as a macro [with value]
    #[arg(short = 'D', value_name = "MACRO")]
    defines: Vec<String>,

    /// Path to search for unfound #include's
    #[arg(short = 'I', value_name = "DIR")]
    includes: Vec<String>,

    /// Preprocessor program (default: auto-detect)
    #[arg(long, value_name = "PROGRAM")]
    engine: Option<PathBuf>,

    /// Omit line markers from the output
    #[arg(long)]
    no_line_markers: bool,

    /// Write the forwarded data as JSON
    #[arg(long, value_name = "FILE")]
    forward_json: Option<PathBuf>,

    /// Worker threads for several documents
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl RunArgs {
    /// Task options, one per document
    fn documents(&self) -> Vec<TaskOptions> {
        self.data
            .iter()
            .map(|input| TaskOptions {
                input: input.clone(),
                output: self.output.clone(),
                defines: self.defines.clone(),
                includes: self.includes.clone(),
            })
            .collect()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    init_logging(&config, cli.verbose);

    let code = match cli.command {
        Commands::Run(args) => cmd_run(args, config)?,
        Commands::Info => {
            cmd_info(&config);
            0
        }
    };

    std::process::exit(code)
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { config.log.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_run(args: RunArgs, mut config: Config) -> Result<i32> {
    let documents = args.documents();
    if documents.len() > 1 && args.output.is_some() {
        bail!("--output needs a single document, got {}", documents.len());
    }

    if let Some(program) = &args.engine {
        config.engine.program = Some(program.clone());
    }
    if args.no_line_markers {
        config.engine.line_markers = false;
    }

    let engine: Arc<dyn Engine> = Arc::from(get_engine(&config.engine)?);
    if !engine.is_available() {
        warn!("{} did not answer --version, trying it anyway", engine.name());
    }
    let task = PcppTask::new(engine).with_settings(config.task.clone());

    let mut runner = BatchRunner::new(&task);
    if let Some(jobs) = args.jobs {
        runner = runner.with_jobs(jobs);
    }
    let items = match documents.as_slice() {
        [single] => vec![runner.run_one(single)],
        _ => runner.run(&documents)?,
    };

    let mut stdout = std::io::stdout().lock();
    let mut code = 0;
    for item in &items {
        stdout.write_all(&item.stdout)?;
        if let Err(e) = &item.result {
            error!("{} failure for {}: {}", e.category(), item.options.input, e);
        }
        if code == 0 {
            code = item.exit_code();
        }
    }
    stdout.flush()?;

    if let Some(path) = &args.forward_json {
        write_forward(path, &forward_value(&items))?;
    }

    Ok(code)
}

/// Forwarded data of a run
///
/// A single document yields its payload object; a batch yields one entry
/// per document, in input order.
fn forward_value(items: &[BatchItem]) -> Value {
    match items {
        [single] => single.forwarded.to_value(),
        _ => Value::Array(
            items
                .iter()
                .map(|item| {
                    json!({
                        "input": item.options.input,
                        "return_code": item.return_code(),
                        "forward": item.forwarded.to_value(),
                    })
                })
                .collect(),
        ),
    }
}

fn write_forward(path: &Path, value: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write forwarded data to {}", path.display()))
}

fn cmd_info(config: &Config) {
    let info = pcpp::INFO;
    println!("📦 {} {} - {}", info.name, info.version, info.about);
    println!("   Example: {}", info.example);

    println!("\n⚙️  Options:");
    println!("   {:<14} {}", DATA_ARGUMENT.name, DATA_ARGUMENT.help);
    for desc in OPTION_TABLE.iter() {
        let spelling = match desc.long {
            Some(long) => format!("{}, {}", desc.flag, long),
            None => desc.flag.to_string(),
        };
        let repeat = if desc.repeatable { " (repeatable)" } else { "" };
        println!("   {:<14} {}{}", spelling, desc.help, repeat);
    }

    println!("\n📤 Forwards:");
    let decl = ForwardDecl::new(config.task.forward_field.clone(), FORWARD_HELP);
    println!("   {:<14} {}", decl.name, decl.help);

    println!("\n🔧 Engine:");
    match get_engine(&config.engine) {
        Ok(engine) => {
            let status = if engine.is_available() { "available" } else { "not responding" };
            println!("   {} ({})", engine.name(), status);
            if let Some(version) = engine.version() {
                println!("   {}", version);
            }
        }
        Err(e) => println!("   {}", e),
    }
}
