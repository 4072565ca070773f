//! Metaforge CLI
//!
//! Usage:
//!   metaforge apply -C site response.txt          Dry-run a response against ./site
//!   metaforge apply -C site --write < response    Apply and save the changes
//!   metaforge parse response.txt                  Print the LPML tree as JSON

mod project;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use metaforge::lpml::{self, ParseOptions};
use metaforge::{Engine, EngineConfig, InterruptPrecedence, TurnOutcome};

use crate::project::DirtyPaths;

/// Metaforge - apply agent LPML responses to a project directory
#[derive(Parser, Debug)]
#[command(name = "metaforge")]
#[command(about = "Parse agent LPML responses and apply their file tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one agent response against a project directory
    Apply {
        /// Project directory
        #[arg(short = 'C', long, default_value = ".")]
        dir: PathBuf,
        /// File holding the response; stdin when omitted
        response: Option<PathBuf>,
        /// Engine config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Which interrupt wins when a response has several
        #[arg(long, value_enum)]
        precedence: Option<Precedence>,
        /// Save changed files back to the directory
        #[arg(long)]
        write: bool,
        /// Print the outcome as JSON instead of the context block
        #[arg(long)]
        json: bool,
    },
    /// Parse LPML and print the tree as JSON
    Parse {
        /// File to parse; stdin when omitted
        input: Option<PathBuf>,
        /// Keep all whitespace and parse inside file bodies
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Precedence {
    First,
    Last,
}

impl From<Precedence> for InterruptPrecedence {
    fn from(value: Precedence) -> Self {
        match value {
            Precedence::First => InterruptPrecedence::First,
            Precedence::Last => InterruptPrecedence::Last,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the context block or JSON
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    match Args::parse().command {
        Command::Apply {
            dir,
            response,
            config,
            precedence,
            write,
            json,
        } => {
            let mut config = match config {
                Some(path) => EngineConfig::from_file(path)?,
                None => EngineConfig::default(),
            };
            if let Some(precedence) = precedence {
                config.interrupt_precedence = precedence.into();
            }
            apply(&dir, &read_input(response.as_deref())?, config, write, json).await
        }
        Command::Parse { input, raw } => {
            let options = if raw {
                ParseOptions::default()
            } else {
                ParseOptions::agent()
            };
            let document = lpml::parse_document(&read_input(input.as_deref())?, &options);
            for warning in &document.warnings {
                tracing::warn!(?warning, "recovered while parsing");
            }
            println!("{}", serde_json::to_string_pretty(&document.nodes)?);
            Ok(())
        }
    }
}

async fn apply(
    dir: &Path,
    response: &str,
    config: EngineConfig,
    write: bool,
    json: bool,
) -> Result<()> {
    let mut fs = project::load(dir)?;
    let dirty = DirtyPaths::attach(&mut fs);

    let mut engine = Engine::new(fs, config);
    let outcome = engine.run_turn(response).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    let changed = dirty.take();
    if write {
        let persisted = project::persist(dir, engine.fs(), &changed)?;
        tracing::info!(
            written = persisted.written,
            removed = persisted.removed,
            "saved project"
        );
    } else if !changed.is_empty() {
        tracing::info!(
            changed = changed.len(),
            "dry run; pass --write to save changes"
        );
    }

    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    if let Some(context) = outcome.context() {
        println!("{context}");
    }
    if let Some(interrupt) = &outcome.interrupt {
        println!("<{}>{}</{}>", interrupt.kind.tag(), interrupt.value, interrupt.kind.tag());
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}
