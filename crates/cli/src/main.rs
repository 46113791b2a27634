mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use runtime::{QueryRequest, QueryService};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use error::{Error, Result};

#[derive(Parser)]
#[command(name = "staysearch")]
#[command(about = "Lodging search through a local or remote language model", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file [default: ./staysearch.toml if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single search and print the result
    Search {
        /// Free-text description of the stay
        #[arg(required = true)]
        text: Vec<String>,
        /// Model to request (falls back when not available)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// List models served by the local backend
    Models,
    /// Start an interactive search session
    Chat {
        /// Model to request for every query
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the command succeeded.
async fn run() -> Result<bool> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = config::load(cli.config.as_deref())?;
    debug!(source = %config::describe(cli.config.as_deref()), "loaded configuration");
    let service = QueryService::from_config(&config);

    match cli.command {
        Some(Commands::Search { text, model }) => cmd_search(&service, text.join(" "), model).await,
        Some(Commands::Models) => cmd_models(&service).await,
        Some(Commands::Chat { model }) => cmd_chat(&service, model).await,
        None => cmd_chat(&service, None).await,
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

async fn cmd_search(service: &QueryService, text: String, model: Option<String>) -> Result<bool> {
    let result = service
        .query(&QueryRequest::new(text).with_model(model))
        .await;
    println!("{}", result.display_text);
    Ok(result.succeeded)
}

async fn cmd_models(service: &QueryService) -> Result<bool> {
    let catalog = service.refresh_catalog().await;
    let selected = service.resolve(None).await;

    if catalog.is_empty() {
        println!("No local models found. Is Ollama running?");
    } else {
        for name in catalog.iter() {
            let marker = if name == selected.model_name() { "*" } else { " " };
            println!("{marker} {name}");
        }
    }
    println!("\nDefault backend: {selected}");
    Ok(true)
}

async fn cmd_chat(service: &QueryService, model: Option<String>) -> Result<bool> {
    println!("staysearch v{}", env!("CARGO_PKG_VERSION"));
    println!("Backend: {}", service.resolve(model.as_deref()).await);
    println!("Describe the stay you are looking for. Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        let result = service
            .query(&QueryRequest::new(input).with_model(model.as_deref()))
            .await;
        if result.succeeded {
            println!("\n{}\n", result.display_text);
        } else {
            eprintln!("{}\n", result.display_text);
        }
    }

    println!();
    Ok(true)
}
