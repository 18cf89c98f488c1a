use clap::{Parser, Subcommand};
use dotenv::dotenv;
use env_logger::Env;
use mixrag::capability::openai::OpenAiClient;
use mixrag::capability::retriever::HttpRetriever;
use mixrag::capability::Capabilities;
use mixrag::config::AppConfig;
use mixrag::workflow::engine::{EngineOptions, RunEvent, WorkflowEngine};

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (default: config.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question against the knowledge service
    Ask {
        /// The question to answer
        #[arg(short, long)]
        question: String,
    },
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(Env::default().default_filter_or(&config.app.log_level)).init();

    let openai = Arc::new(OpenAiClient::new(&config.model)?);
    let caps = Capabilities {
        generator: openai.clone(),
        grader: openai.clone(),
        rewriter: openai,
        retriever: Arc::new(HttpRetriever::new(&config.retrieval)?),
    };
    let engine = Arc::new(WorkflowEngine::new(
        caps,
        EngineOptions::from_config(&config),
    ));

    match args.command {
        Commands::Ask { question } => {
            let (tx, mut rx) = mpsc::channel::<RunEvent>(32);

            let run_engine = engine.clone();
            let run_question = question.clone();
            let run = tokio::spawn(async move {
                run_engine.run_query_stream(&[], &run_question, tx).await
            });

            while let Some(event) = rx.recv().await {
                match event {
                    RunEvent::Fragment(text) => {
                        print!("{}", text);
                        std::io::stdout().flush()?;
                    }
                    RunEvent::Completed(result) => {
                        println!();
                        if !result.citations.is_empty() {
                            println!("Sources: {}", result.citations.join(", "));
                        }
                        if result.used_fallback {
                            log::warn!("answer produced by the fallback pipeline");
                        }
                    }
                    RunEvent::Error(message) => {
                        eprintln!("Query failed: {}", message);
                    }
                }
            }

            // The error was already reported through the event stream
            if run.await?.is_err() {
                std::process::exit(1);
            }
        }
        Commands::Serve { port } => {
            mixrag::server::serve(engine, port).await?;
        }
    }

    Ok(())
}
