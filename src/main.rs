use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use jarvis::records::{self, FieldSplitting, RecordParser};
use jarvis::replay::{Reply, ReplayConfig, ReplayDriver, RunSummary};
use jarvis::{chat, constants, web_server, ChatClient, OllamaClient, Settings};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Base URL of the Ollama server.
    #[arg(long, global = true, env = "OLLAMA_URL")]
    host: Option<String>,

    /// Model to chat with / replay against.
    #[arg(long, global = true, env = "JARVIS_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the Jarvis web server (chat and CSV replay UI).
    Serve {
        #[arg(long, env = "JARVIS_PORT", help = "Port for the web server.")]
        port: Option<u16>,
    },
    /// Chat with the model in the terminal.
    Chat,
    /// Replay every question of a CSV file through the model.
    Replay {
        /// CSV file with question and answer columns.
        file: PathBuf,
        #[arg(long, env = "JARVIS_REPLAY_DELAY_MS", help = "Pause before each record, in milliseconds.")]
        delay_ms: Option<u64>,
        #[arg(long, help = "Treat double-quoted fields as single values (commas allowed inside).")]
        quoted: bool,
        #[arg(long, help = "Print the run summary as JSON.")]
        json: bool,
    },
    /// Write a sample CSV template.
    Template {
        #[arg(short, long, help = "Write to this file instead of stdout.")]
        output: Option<PathBuf>,
    },
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (OLLAMA_URL, JARVIS_MODEL, ...)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,jarvis=debug). Logs go
    // to stderr so `replay --json` output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Jarvis starting with command: {:?}", cli.command);

    let settings = Settings::from_env()
        .with_ollama_url(cli.host)
        .with_model(cli.model);

    match cli.command {
        Commands::Serve { port } => {
            let settings = settings.with_port(port);
            info!("Starting Jarvis web server on port {}...", settings.port);
            let client: Arc<dyn ChatClient> = Arc::new(
                OllamaClient::new(&settings.ollama_url, settings.request_timeout)
                    .context("Failed to build Ollama client")?,
            );

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(settings, client).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat => {
            let client = OllamaClient::new(&settings.ollama_url, settings.request_timeout)
                .context("Failed to build Ollama client")?;
            chat::run_terminal_chat(&client, &settings.model)
                .await
                .context("Chat session failed")?;
        }
        Commands::Replay {
            file,
            delay_ms,
            quoted,
            json,
        } => {
            let settings = settings.with_replay_delay_ms(delay_ms);
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let splitting = if quoted {
                FieldSplitting::Quoted
            } else {
                FieldSplitting::Naive
            };
            let records = RecordParser::new(splitting).parse(&raw)?;
            let preview = records::preview(&records, constants::PREVIEW_LIMIT);
            eprintln!("Found {} examples", preview.total);
            for record in &preview.shown {
                eprintln!("  Q: {}\n  A: {}", record.question, record.answer);
            }
            if preview.remaining > 0 {
                eprintln!("  ... and {} more examples", preview.remaining);
            }

            let client = OllamaClient::new(&settings.ollama_url, settings.request_timeout)
                .context("Failed to build Ollama client")?;
            let mut driver = ReplayDriver::new(ReplayConfig {
                pacing: settings.replay_delay,
            });
            let summary = driver
                .run(&records, &client, &settings.model, &|percent: f64| {
                    eprintln!("Replay progress: {}%", percent.round());
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Template { output } => match output {
            Some(path) => {
                tokio::fs::write(&path, records::TEMPLATE_CSV)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote template to {}", path.display());
            }
            None => println!("{}", records::TEMPLATE_CSV),
        },
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        println!("Example {}:", outcome.index + 1);
        println!("  question: {}", outcome.question);
        println!("  expected: {}", outcome.expected);
        match &outcome.reply {
            Reply::Answered { actual } => println!("  actual:   {}", actual),
            Reply::Failed { reason } => println!("  error:    {}", reason),
        }
    }
    println!(
        "Replay completed! Processed {} examples against {} ({} failed).",
        summary.processed,
        summary.model,
        summary.failed()
    );
}
