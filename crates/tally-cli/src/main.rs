//! tally - a chat client that keeps a running tab

mod commands;
mod config;
mod ui;
mod utils;

use clap::Parser;
use std::{
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tally_ai::{
    CurrencyConverter, ExchangeRateConverter, FixedRateConverter, OpenAIProvider,
    currency::DEFAULT_EXCHANGE_RATE_URL, providers::openai::DEFAULT_BASE_URL,
};
use tally_chat::{
    ChatEvent, ChatSession, ConversationStore, Error as ChatError, FileStorage, SubmitOutcome,
    format_cost,
};
use tracing_subscriber::EnvFilter;

use commands::{CommandResult, ModelCommand, ThreadCommand, execute_command};

/// tally - chat with OpenAI models and see what every answer cost
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Currency to show costs in (ISO code, e.g. JPY, USD)
    #[arg(short, long)]
    currency: Option<String>,

    /// Directory holding the conversation history
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Disable TUI mode (use simple stdin/stdout)
    #[arg(long)]
    no_tui: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// List priced models and exit
    #[arg(long)]
    list_models: bool,

    /// List saved threads and exit
    #[arg(long)]
    threads: bool,
}

/// Install the log subscriber. In TUI mode logs go to a file so they
/// don't draw over the alternate screen.
fn init_logging(verbose: bool, use_tui: bool, data_dir: &Path) -> anyhow::Result<()> {
    let from_env = std::env::var("RUST_LOG").is_ok();
    if !verbose && !from_env {
        return Ok(());
    }

    let filter = if from_env {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("tally=debug")
    };

    if use_tui {
        std::fs::create_dir_all(data_dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(data_dir.join("tally.log"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
    Ok(())
}

fn build_converter(cfg: &config::Config) -> Arc<dyn CurrencyConverter> {
    match &cfg.fixed_rates {
        Some(rates) => Arc::new(FixedRateConverter::from_rates(rates)),
        None => Arc::new(ExchangeRateConverter::new().with_base_url(
            cfg.exchange_rate_url
                .as_deref()
                .unwrap_or(DEFAULT_EXCHANGE_RATE_URL),
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    // CLI takes precedence over config
    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| cfg.data_dir.clone())
        .unwrap_or_else(FileStorage::default_dir);
    let use_tui = !args.no_tui && cfg.tui.unwrap_or(true) && io::stdout().is_terminal();
    init_logging(args.verbose, use_tui, &data_dir)?;

    let session_config = cfg.session_config(args.currency.as_deref());
    let pricing = cfg.pricing_table();
    let model = args
        .model
        .clone()
        .or_else(|| cfg.model.clone())
        .unwrap_or_else(|| tally_ai::models::DEFAULT_MODEL.to_string());

    if args.list_models {
        return list_models(&cfg, &model, &pricing).await;
    }

    let storage = Arc::new(FileStorage::new(&data_dir));
    let store = ConversationStore::load(storage.as_ref()).await?;

    if args.threads {
        println!(
            "{}",
            ThreadCommand::list_text(&store, &session_config.display_currency)
        );
        return Ok(());
    }

    if !pricing.contains(&model) {
        eprintln!("Error: No pricing known for model '{}'", model);
        eprintln!("Add rates under [pricing.\"{}\"] in the config file.", model);
        std::process::exit(1);
    }

    let Some(api_key) = cfg.api_key() else {
        eprintln!("Error: No API key found for OpenAI");
        eprintln!();
        eprintln!("Set your API key with: export OPENAI_API_KEY=your-key");
        eprintln!("Or add it to config file: tally --init-config");
        std::process::exit(1);
    };

    let api = Arc::new(
        OpenAIProvider::new(api_key)
            .with_base_url(cfg.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
    );

    tracing::info!(
        model = %model,
        currency = %session_config.display_currency,
        data_dir = %data_dir.display(),
        threads = store.len(),
        "starting"
    );

    let session = ChatSession::new(
        session_config,
        store.into_shared(),
        api,
        build_converter(&cfg),
        storage,
        pricing,
    );

    if use_tui {
        return ui::run_tui(&session, model).await;
    }

    run_interactive(&session, model).await
}

async fn list_models(
    cfg: &config::Config,
    current: &str,
    pricing: &tally_chat::PricingTable,
) -> anyhow::Result<()> {
    println!("{}", ModelCommand::list_models_text(current, pricing));

    // Without a key we can only show what we have prices for
    let Some(api_key) = cfg.api_key() else {
        return Ok(());
    };
    let provider = OpenAIProvider::new(api_key)
        .with_base_url(cfg.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL));
    match provider.list_models().await {
        Ok(models) => {
            let unpriced: Vec<_> = models
                .iter()
                .filter(|m| !pricing.contains(&m.id))
                .map(|m| m.id.as_str())
                .collect();
            if !unpriced.is_empty() {
                println!("\nOffered by the API without known rates:");
                for id in unpriced {
                    println!("  {}", id);
                }
            }
        }
        Err(e) => eprintln!("Could not fetch the model list: {}", e),
    }
    Ok(())
}

/// Active thread index, starting a thread when there is none
async fn active_or_new(session: &ChatSession) -> tally_chat::Result<usize> {
    let active = session.store().lock().active();
    match active {
        Some(index) => Ok(index),
        None => session.new_thread().await,
    }
}

/// Submit one message and echo the answer as it streams
async fn submit_plain(session: &ChatSession, text: &str, model: &str) -> anyhow::Result<()> {
    let thread_index = active_or_new(session).await?;
    let mut events = session.subscribe();
    let handle = session.handle();

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ChatEvent::StreamDelta { delta, .. } => {
                    print!("{}", delta);
                    let _ = io::stdout().flush();
                }
                ChatEvent::TitleChanged { title, .. } => {
                    eprintln!("[Thread titled: {}]", title);
                }
                ChatEvent::SubmitEnd => break,
                _ => {}
            }
        }
    });

    // Ctrl+C cancels the answer; the cycle still runs to the end so the
    // pending user turn is rolled back
    let submit = session.submit(thread_index, text, model);
    tokio::pin!(submit);
    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            _ = tokio::signal::ctrl_c() => handle.abort(),
        }
    };
    let _ = printer.await;

    match result {
        Ok(SubmitOutcome::Committed { turn, persisted, .. }) => {
            println!();
            if turn.cost > 0.0 {
                println!("{}", format_cost(turn.cost, session.display_currency()));
            }
            if !persisted {
                eprintln!("Warning: the answer could not be saved to disk");
            }
        }
        Ok(SubmitOutcome::Dropped) => println!("\n[Thread was deleted; answer discarded]"),
        Err(ChatError::Aborted) => println!("\n[Cancelled]"),
        Err(e) => eprintln!("\nError: {}", utils::failure_message(&e)),
    }
    Ok(())
}

async fn run_interactive(session: &ChatSession, mut model: String) -> anyhow::Result<()> {
    let currency = session.display_currency().to_string();
    let model_ids: Vec<String> = session
        .pricing()
        .model_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    let model_refs: Vec<&str> = model_ids.iter().map(String::as_str).collect();

    // Show minimal startup info (only if TTY)
    if io::stderr().is_terminal() {
        let threads = session.store().lock().len();
        eprintln!("tally ({}, {}) {} threads", model, currency, threads);
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let Some(result) = execute_command(input, &model_refs) else {
            submit_plain(session, input, &model).await?;
            continue;
        };

        match result {
            CommandResult::NewThread => {
                session.new_thread().await?;
                println!("Started a new thread.");
            }
            CommandResult::DeleteThread(index) => {
                let index = index.or_else(|| session.store().lock().active());
                match index {
                    Some(index) => match session.delete_thread(index).await {
                        Ok(thread) => println!("Deleted \"{}\".", thread.title),
                        Err(e) => println!("{}", e),
                    },
                    None => println!("No thread to delete."),
                }
            }
            CommandResult::SwitchThread(index) => match session.select_thread(index) {
                Ok(()) => {
                    let store = session.store();
                    let store = store.lock();
                    if let Some(thread) = store.thread(index) {
                        println!("Switched to \"{}\" ({} turns).", thread.title, thread.turns.len());
                    }
                }
                Err(e) => println!("{}", e),
            },
            CommandResult::ListThreads => {
                println!("{}", ThreadCommand::list_text(&session.store().lock(), &currency));
            }
            CommandResult::ChangeModel(new_model) => {
                println!("Switched to: {}", new_model);
                model = new_model;
            }
            CommandResult::OpenModelSelector => {
                println!("{}", ModelCommand::list_models_text(&model, session.pricing()));
            }
            CommandResult::ShowCost => {
                println!("{}", ThreadCommand::cost_text(&session.store().lock(), &currency));
            }
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Exit => break,
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
        }
    }

    Ok(())
}
