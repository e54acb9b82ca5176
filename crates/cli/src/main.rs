use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use harness::{
    run_session, ChromeLauncher, ChromeOptions, ReadyPolicy, Reporter, SessionConfig, Variant,
    VariantKind, Verdict,
};
use tracing::{info, Level};
use tracing_subscriber::{filter, prelude::*};

use std::path::PathBuf;

mod config;

use config::HarnessConfig;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let config = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };

    match args.mode {
        Mode::List => {
            list();
            Ok(())
        }
        Mode::Run { variant, overrides } => {
            let verdict = run(&config, variant.into(), &overrides, args.verbose > 0)?;
            std::process::exit(verdict.exit_code());
        }
    }
}

fn list() {
    for kind in VariantKind::ALL {
        println!(
            "{:<14} port {}  {:<28} {}",
            kind.name(),
            kind.default_port(),
            kind.default_rom().display(),
            kind.title()
        );
    }
}

/// Layers the command line over the config file for one variant.
fn session_config(
    config: &HarnessConfig,
    kind: VariantKind,
    overrides: &Overrides,
) -> SessionConfig {
    // a configured rom for the variant outlives a new root
    let mut session = match &overrides.root {
        Some(root) => HarnessConfig {
            root: Some(root.clone()),
            ..config.clone()
        }
        .session(kind),
        None => config.session(kind),
    };
    if let Some(port) = overrides.port {
        session.port = port;
    }
    if let Some(rom) = &overrides.rom {
        session.rom_path = rom.clone();
    }
    if let Some(page) = &overrides.page {
        session.page = page.clone();
    }
    if let Some(ms) = overrides.settle_ms {
        session.ready = ReadyPolicy::Settle { ms };
    }
    if overrides.poll_ready {
        session.ready = ReadyPolicy::Poll {
            interval_ms: 50,
            timeout_ms: overrides.ready_timeout_ms,
        };
    }
    session
}

fn run(
    config: &HarnessConfig,
    kind: VariantKind,
    overrides: &Overrides,
    verbose: bool,
) -> anyhow::Result<Verdict> {
    let session = session_config(config, kind, overrides);

    let seed = overrides
        .seed
        .or(config.seed)
        .unwrap_or_else(rand::random);
    let variant = Variant::new(kind).with_seed(seed);

    let launcher = ChromeLauncher::new(ChromeOptions {
        executable: overrides.chrome.clone().or_else(|| config.chrome.clone()),
        headless: !overrides.headful,
        ..Default::default()
    });

    info!(variant = %kind, port = session.port, rom = %session.rom_path.display(), "starting");
    let report = run_session(&session, &launcher, &variant);

    let stdout = std::io::stdout();
    if overrides.json {
        serde_json::to_writer_pretty(stdout.lock(), &report).context("writing report")?;
        println!();
        Ok(Verdict::of(&report))
    } else {
        let mut reporter = Reporter::new(stdout.lock()).verbose(verbose);
        reporter.write(&report).context("writing report")
    }
}

fn init_tracing(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter::Targets::new().with_targets([
            ("harness", level),
            ("nes_harness", level),
        ]));

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(log))
        .context("init tracing")
}

/// Drives the jsnes emulator in headless Chrome and checks a ROM's behavior.
#[derive(Parser)]
#[command(name = "nes-harness", version)]
struct Args {
    /// Log more (-v debug, -vv trace); verbose runs also dump snapshots and console output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// RON file with harness defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run one test variant against its ROM
    Run {
        variant: VariantArg,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List the variants with their default port and ROM
    List,
}

#[derive(clap::Args, Debug)]
struct Overrides {
    /// Port for the static file server
    #[arg(long)]
    port: Option<u16>,
    /// ROM image to inject
    #[arg(long)]
    rom: Option<PathBuf>,
    /// Directory served over http, holding the harness page and build/
    #[arg(long)]
    root: Option<PathBuf>,
    /// Harness page, relative to the served root
    #[arg(long)]
    page: Option<String>,
    /// Fixed delay after navigation before the engine is used
    #[arg(long, conflicts_with = "poll_ready")]
    settle_ms: Option<u64>,
    /// Poll the page until the engine can step instead of a fixed delay
    #[arg(long)]
    poll_ready: bool,
    /// Give up polling after this long
    #[arg(long, default_value_t = 10_000)]
    ready_timeout_ms: u64,
    /// Seed for the randomized gameplay rounds
    #[arg(long)]
    seed: Option<u64>,
    /// Chrome or Chromium executable
    #[arg(long)]
    chrome: Option<PathBuf>,
    /// Show the browser window
    #[arg(long)]
    headful: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    RomLoad,
    RomExecution,
    Gameplay,
    GameState,
    MinimalRom,
    FullInit,
}

impl From<VariantArg> for VariantKind {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::RomLoad => VariantKind::RomLoad,
            VariantArg::RomExecution => VariantKind::RomExecution,
            VariantArg::Gameplay => VariantKind::Gameplay,
            VariantArg::GameState => VariantKind::GameState,
            VariantArg::MinimalRom => VariantKind::MinimalRom,
            VariantArg::FullInit => VariantKind::FullInit,
        }
    }
}
