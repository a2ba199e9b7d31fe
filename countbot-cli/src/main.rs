//! countbot - chat-style inventory tracking over an append-only log.
//!
//! A local harness around `countbot-core`: commands come from the
//! terminal instead of a chat platform, the transaction log is a JSON
//! Lines file, and roles come from a YAML file. The engine itself is
//! transport-agnostic.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use countbot_core::catalog::Catalog;
use countbot_core::engine::Engine;
use countbot_core::transport::{
    Audience, Channel, Envelope, FixedRoleDirectory, Reply, ReplyBody,
};

mod log;
mod render;

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(name = "countbot", about = "Chat-style inventory tracker", version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Transaction log file (JSON Lines, append-only)
    #[clap(long, default_value = "countbot.jsonl", global = true)]
    log: PathBuf,

    /// Item catalog file (YAML); omit for the built-in catalog
    #[clap(long, global = true)]
    catalog: Option<PathBuf>,

    /// Role table file (YAML with `collectors:` and `admins:` lists)
    #[clap(long, global = true)]
    roles: Option<PathBuf>,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Read commands from stdin, one per line, as the given actor
    Run {
        /// Actor identity to issue commands as
        actor: String,

        /// Treat the session as a direct message instead of the shared
        /// channel
        #[clap(long)]
        dm: bool,
    },

    /// Execute a single command and exit
    Exec {
        /// Actor identity to issue the command as
        actor: String,

        /// The command words, e.g. `count 12 verkstan pla`
        #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,

        /// Treat the command as a direct message
        #[clap(long)]
        dm: bool,
    },

    /// Print the transaction log as a table
    Log,
}

#[derive(Tabled)]
struct LogLine {
    seq: u64,
    at: String,
    actor: String,
    record: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log_level.directive()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run { actor, dm } => {
            let engine = build_engine(&cli.log, cli.catalog.as_deref(), cli.roles.as_deref())?;
            run_session(&engine, &actor, channel(dm)).await
        }
        Command::Exec { actor, words, dm } => {
            let engine = build_engine(&cli.log, cli.catalog.as_deref(), cli.roles.as_deref())?;
            let envelope = Envelope {
                actor: actor.into(),
                text: words.join(" "),
                channel: channel(dm),
            };
            let replies = engine.handle(&envelope).await?;
            print_replies(&replies);
            Ok(())
        }
        Command::Log => print_log(&cli.log),
    }
}

fn channel(dm: bool) -> Channel {
    if dm {
        Channel::DirectMessage
    } else {
        Channel::Public
    }
}

fn build_engine(
    log_path: &std::path::Path,
    catalog: Option<&std::path::Path>,
    roles: Option<&std::path::Path>,
) -> Result<Engine> {
    let catalog = match catalog {
        Some(path) => Catalog::from_file(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => Catalog::default(),
    };
    let roles = match roles {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading roles {}", path.display()))?;
            FixedRoleDirectory::from_yaml(&text)
                .with_context(|| format!("parsing roles {}", path.display()))?
        }
        None => FixedRoleDirectory::default(),
    };
    let history = log::load_history(log_path)?;
    info!(records = history.len(), "history loaded");
    Ok(Engine::new(
        catalog,
        Arc::new(roles),
        Arc::new(log::JsonlSink::new(log_path)),
        history,
    ))
}

async fn run_session(engine: &Engine, actor: &str, channel: Channel) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        let envelope = Envelope {
            actor: actor.into(),
            text: line.to_string(),
            channel,
        };
        let replies = engine.handle(&envelope).await?;
        let shutdown = replies
            .iter()
            .any(|r| matches!(r.body, ReplyBody::Shutdown));
        print_replies(&replies);
        if shutdown {
            break;
        }
    }
    Ok(())
}

fn print_replies(replies: &[Reply]) {
    for reply in replies {
        match reply.audience {
            Audience::Public => println!("{}", render::render(&reply.body)),
            Audience::AuthorDm => println!("(dm) {}", render::render(&reply.body)),
        }
    }
}

fn print_log(path: &std::path::Path) -> Result<()> {
    let history = log::load_history(path)?;
    if history.is_empty() {
        println!("log is empty");
        return Ok(());
    }
    let lines = history.iter().map(|record| LogLine {
        seq: record.seq,
        at: record.at.format("%Y-%m-%d %H:%M:%S").to_string(),
        actor: record.actor.to_string(),
        record: serde_json::to_string(&record.op).unwrap_or_default(),
    });
    let mut table = Table::new(lines);
    table.with(Style::sharp());
    println!("{table}");
    Ok(())
}
