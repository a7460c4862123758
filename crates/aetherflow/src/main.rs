//! Resolve an aetherflow script against a fixture conversation.
//!
//! # Examples
//!
//! ```sh
//! # Primary pass
//! aetherflow script.af --fixture session.json
//!
//! # Retry with overrides for links that failed
//! aetherflow script.af --fixture session.json \
//!   --override '@AI-1:thoughts=manual text'
//!
//! # Add prompt library sources and stream lifecycle events
//! aetherflow script.af --fixture session.json \
//!   --prompt-source prompts/writer.txt --events -vv
//! ```
//!
//! Exit status: 0 on success, 2 when the primary pass has unresolved links,
//! 1 on any other error.

use aetherflow::prelude::*;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, ValueEnum)]
enum MissingTemplateArg {
    Error,
    Empty,
}

impl From<MissingTemplateArg> for MissingTemplate {
    fn from(arg: MissingTemplateArg) -> Self {
        match arg {
            MissingTemplateArg::Error => MissingTemplate::Error,
            MissingTemplateArg::Empty => MissingTemplate::Empty,
        }
    }
}

/// Resolve an aetherflow script against a fixture conversation.
#[derive(Parser)]
#[command(name = "aetherflow")]
struct Cli {
    /// Script file to resolve (`-` reads stdin)
    script: String,

    // ── Collaborators ──────────────────────────────────────────
    /// JSON fixture with history, conversations, templates and variables
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Prompt library source (local path or http(s) URL), repeatable
    #[arg(long = "prompt-source")]
    prompt_sources: Vec<String>,

    /// JSON file with chat selectors passed to the conversation surface
    #[arg(long)]
    selectors: Option<PathBuf>,

    // ── Resolution ─────────────────────────────────────────────
    /// Run the retry pass with TOKEN replaced by TEXT, repeatable
    #[arg(long = "override", value_name = "TOKEN=TEXT", value_parser = parse_override)]
    overrides: Vec<(String, String)>,

    /// Pause after each action, in milliseconds
    #[arg(long, default_value_t = 500)]
    settle_ms: u64,

    /// Per-conduit mount timeout in seconds (0 disables)
    #[arg(long, default_value_t = 30)]
    mount_timeout_secs: u64,

    /// Behavior when a data portal names an unknown template
    #[arg(long, value_enum, default_value = "error")]
    missing_template: MissingTemplateArg,

    // ── Output ─────────────────────────────────────────────────
    /// Print lifecycle events to stderr as JSON lines
    #[arg(long)]
    events: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_override(s: &str) -> Result<(String, String), String> {
    let (token, text) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=TEXT, got '{s}'"))?;
    if token.is_empty() {
        return Err("override token is empty".into());
    }
    Ok((token.to_string(), text.to_string()))
}

/// Library templates first, then the fixture's.
struct LayeredStore<'a> {
    library: &'a PromptLibrary,
    fallback: &'a dyn PromptStore,
}

impl PromptStore for LayeredStore<'_> {
    fn template<'a>(&'a self, id: &'a str) -> SurfaceFuture<'a, Option<PromptTemplate>> {
        Box::pin(async move {
            match self.library.template(id).await {
                Some(t) => Some(t),
                None => self.fallback.template(id).await,
            }
        })
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(level);
    tracing_subscriber::registry().with(layer).init();
}

async fn read_script(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {path}: {e}"))
}

async fn load_selectors(path: Option<&PathBuf>) -> Result<ChatSelectors, String> {
    let Some(path) = path else {
        return Ok(ChatSelectors::default());
    };
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&json).map_err(|e| format!("invalid selectors: {e}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let script = match read_script(&cli.script).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let fixture = match &cli.fixture {
        Some(path) => match Fixture::load(path).await {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => Fixture::default(),
    };

    let selectors = match load_selectors(cli.selectors.as_ref()).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let (library, report) = PromptLibrary::load(&cli.prompt_sources).await;
    for (source, error) in &report.failures {
        eprintln!("Warning: prompt source {source} skipped: {error}");
    }
    let store = LayeredStore {
        library: &library,
        fallback: &fixture,
    };

    let mount_timeout = (cli.mount_timeout_secs > 0).then(|| Duration::from_secs(cli.mount_timeout_secs));
    let config = ResolverConfig::default()
        .with_selectors(selectors)
        .with_settle_delay(Duration::from_millis(cli.settle_ms))
        .with_mount_timeout(mount_timeout)
        .with_missing_template(cli.missing_template.into());

    let printer = FnEventHandler::new(|record: &EventRecord| {
        if let Ok(line) = serde_json::to_string(record) {
            eprintln!("{line}");
        }
    });
    let mut handler = CompositeEventHandler::new().with(LoggingHandler);
    if cli.events {
        handler = handler.with(printer);
    }

    let resolver = Resolver::new(&store, &fixture, config).with_event_handler(&handler);
    let mut ctx = SessionContext::with_store(fixture.session_memory());

    if cli.overrides.is_empty() {
        match resolver.parse(&mut ctx, &script).await {
            Ok(text) => println!("{text}"),
            Err(ResolveError::Aggregate(agg)) => {
                eprintln!("Error: {agg}");
                eprintln!("Re-run with --override TOKEN=TEXT for each token above.");
                process::exit(2);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    } else {
        let overrides: OverrideMap = cli.overrides.into_iter().collect();
        match resolver
            .parse_with_overrides(&mut ctx, &script, &overrides)
            .await
        {
            Ok(resolution) => {
                for warning in &resolution.warnings {
                    eprintln!("Warning: {warning}");
                }
                println!("{}", resolution.text);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
