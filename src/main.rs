//! # Promobot
//!
//! Scheduled promotion broadcaster for opted-in messaging groups.
//!
//! Usage:
//!   promobot run                                  # Scheduler + commands from stdin
//!   promobot cycle                                # One dispatch pass, then exit
//!   promobot command --chat <id> --sender <id> ".status"

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promo_channels::{HttpCatalog, build_messenger};
use promo_commands::{CommandContext, CommandHandler};
use promo_core::config::PromoConfig;
use promo_db::PromoDb;
use promo_scheduler::{DispatchSettings, PromoteEngine, Scheduler};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "promobot",
    version,
    about = "📢 Promobot: scheduled promotions for messaging groups"
)]
struct Cli {
    /// Config file (default: $PROMOBOT_CONFIG or ~/.promobot/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the scheduler and read `<chat_id> <sender> <text>` lines from stdin
    Run,
    /// Run a single dispatch cycle and print the report
    Cycle,
    /// Execute one chat command and print the reply
    Command {
        /// Chat the command is issued in
        #[arg(long)]
        chat: String,
        /// Sender identifier
        #[arg(long)]
        sender: String,
        /// Command text, e.g. ".status"
        text: Vec<String>,
    },
}

fn load_config(path: Option<&str>) -> Result<PromoConfig> {
    let config = match path {
        Some(p) => PromoConfig::load_from(&PathBuf::from(shellexpand::tilde(p).to_string()))?,
        None => PromoConfig::load()?,
    };
    Ok(config)
}

struct App {
    config: PromoConfig,
    scheduler: Arc<Scheduler>,
    handler: CommandHandler,
}

fn build(config: PromoConfig) -> Result<App> {
    let db_path = config.database_path();
    let db = Arc::new(
        PromoDb::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );
    let messenger = build_messenger(&config.channel)?;
    let engine = PromoteEngine::new(db, messenger, DispatchSettings::from_config(&config));
    let scheduler = Arc::new(Scheduler::new(Arc::new(engine)));

    let mut handler = CommandHandler::new(scheduler.clone(), &config);
    if !config.catalog.url.is_empty() {
        handler = handler.with_catalog(Arc::new(HttpCatalog::new(&config.catalog)?));
    }
    Ok(App {
        config,
        scheduler,
        handler,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "promobot=debug,promo_scheduler=debug,promo_commands=debug,promo_channels=debug,promo_db=debug"
    } else {
        "promobot=info,promo_scheduler=info,promo_commands=info,promo_channels=info,promo_db=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let app = build(config)?;

    match cli.command {
        Cmd::Run => run(app).await,
        Cmd::Cycle => {
            let report = app.scheduler.engine().run_cycle().await?;
            println!("{report}");
            Ok(())
        }
        Cmd::Command { chat, sender, text } => {
            let ctx = CommandContext::new(&chat, &sender);
            match app.handler.handle(&ctx, &text.join(" ")).await {
                Some(reply) => println!("{reply}"),
                None => println!("(not a command)"),
            }
            Ok(())
        }
    }
}

async fn run(app: App) -> Result<()> {
    let tick = Duration::from_secs(app.config.scheduler.tick_interval_secs);
    if app.config.scheduler.enabled {
        app.scheduler.start(tick);
    } else {
        tracing::info!("⏸️ Scheduler disabled in config");
    }
    tracing::info!("🚀 Promobot running, reading commands from stdin (Ctrl+C to stop)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut parts = line.trim().splitn(3, char::is_whitespace);
                let (Some(chat), Some(sender), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
                    if !line.trim().is_empty() {
                        eprintln!("expected: <chat_id> <sender> <text>");
                    }
                    continue;
                };
                let ctx = CommandContext::new(chat, sender);
                if let Some(reply) = app.handler.handle(&ctx, text).await {
                    println!("{reply}");
                }
            }
        }
    }

    app.scheduler.stop();
    app.scheduler.wait_idle().await;
    tracing::info!("👋 Promobot stopped");
    Ok(())
}
