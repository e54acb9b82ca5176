use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::assert::AssertionRecord;
use crate::codec;
use crate::observe::ObservationSet;
use crate::rom::RomImage;
use crate::sandbox::{ConsoleKind, ConsoleMessage, Sandbox, SandboxLauncher};
use crate::script::EngineBindings;
use crate::server::StaticServer;
use crate::variant::{Variant, VariantKind};
use crate::Error;

/// How the session decides the page's engine finished initializing.
///
/// The engine exposes no ready event, so either a fixed settle delay is
/// applied after load or a liveness predicate is polled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyPolicy {
    Settle { ms: u64 },
    Poll { interval_ms: u64, timeout_ms: u64 },
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        ReadyPolicy::Settle { ms: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub port: u16,
    pub root: PathBuf,
    pub page: String,
    pub rom_path: PathBuf,
    pub ready: ReadyPolicy,
    pub bindings: EngineBindings,
}

impl SessionConfig {
    pub fn new(kind: VariantKind) -> Self {
        Self {
            port: kind.default_port(),
            root: PathBuf::from("."),
            page: "test_emulator.html".into(),
            rom_path: kind.default_rom(),
            ready: ReadyPolicy::default(),
            bindings: EngineBindings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomSummary {
    pub description: String,
    pub sha256: String,
    pub len: usize,
}

impl From<&RomImage> for RomSummary {
    fn from(rom: &RomImage) -> Self {
        Self {
            description: rom.describe(),
            sha256: rom.id().to_string(),
            len: rom.len(),
        }
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub variant: String,
    pub title: String,
    /// Set for variants whose script is drawn from a seed.
    #[serde(default)]
    pub seed: Option<u64>,
    pub rom: Option<RomSummary>,
    pub observations: Option<ObservationSet>,
    pub records: Vec<AssertionRecord>,
    pub console: Vec<ConsoleMessage>,
}

impl SessionReport {
    pub fn success(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.passed)
    }

    pub fn passed(&self) -> usize {
        self.records.iter().filter(|r| r.passed).count()
    }

    pub fn page_errors(&self) -> impl Iterator<Item = &ConsoleMessage> {
        self.console
            .iter()
            .filter(|m| m.kind == ConsoleKind::PageError)
    }
}

/// Resources held by a running session. Released in reverse order of
/// acquisition, once, whichever way the session ends.
struct Session<S: Sandbox> {
    server: Option<StaticServer>,
    sandbox: Option<S>,
    console: Vec<ConsoleMessage>,
}

impl<S: Sandbox> Session<S> {
    fn new() -> Self {
        Self {
            server: None,
            sandbox: None,
            console: Vec::new(),
        }
    }

    fn drive<L: SandboxLauncher<Sandbox = S>>(
        &mut self,
        config: &SessionConfig,
        launcher: &L,
        variant: &Variant,
        rom_summary: &mut Option<RomSummary>,
    ) -> Result<ObservationSet, Error> {
        let server = StaticServer::start(config.port, &config.root)?;
        let url = server.url(&config.page);
        self.server = Some(server);

        let sandbox = self.sandbox.insert(launcher.launch()?);

        info!(%url, "navigating");
        sandbox.navigate(&url)?;
        wait_ready(sandbox, config)?;

        let rom = RomImage::load(&config.rom_path)?;
        info!("rom: {}", rom.describe());
        if let Some(header) = rom.header() {
            if header.expected_len() != rom.len() {
                warn!(
                    expected = header.expected_len(),
                    found = rom.len(),
                    "rom size does not match its header"
                );
            }
        } else {
            warn!("rom has no iNES header");
        }
        *rom_summary = Some(RomSummary::from(&rom));

        let script = variant.script();
        let expression = script.render(&config.bindings, &codec::encode(rom.bytes()));
        info!(
            variant = %variant.kind(),
            frames = script.frame_count(),
            "running interaction script"
        );
        debug!(bytes = expression.len(), "evaluating script");

        let value = sandbox.evaluate(&expression)?;
        self.collect_console();

        match value {
            serde_json::Value::String(text) => Ok(ObservationSet::from_json(&text)?),
            other => Err(Error::Evaluation(format!(
                "script returned {other} instead of an observation set"
            ))),
        }
    }

    fn collect_console(&mut self) {
        if let Some(sandbox) = self.sandbox.as_mut() {
            self.console.extend(sandbox.drain_console());
        }
    }

    fn teardown(&mut self) {
        self.collect_console();
        if let Some(sandbox) = self.sandbox.take() {
            if let Err(e) = sandbox.close() {
                error!("browser teardown failed: {e}");
            }
        }
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
    }
}

impl<S: Sandbox> Drop for Session<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn wait_ready<S: Sandbox>(sandbox: &mut S, config: &SessionConfig) -> Result<(), Error> {
    match config.ready {
        ReadyPolicy::Settle { ms } => {
            debug!(ms, "settling");
            std::thread::sleep(Duration::from_millis(ms));
            Ok(())
        }
        ReadyPolicy::Poll {
            interval_ms,
            timeout_ms,
        } => {
            let expression = config.bindings.ready_expression();
            let start = Instant::now();
            loop {
                if sandbox.evaluate(&expression)? == serde_json::Value::Bool(true) {
                    debug!(waited_ms = start.elapsed().as_millis() as u64, "engine ready");
                    return Ok(());
                }
                let waited = start.elapsed();
                if waited >= Duration::from_millis(timeout_ms) {
                    return Err(Error::EngineNotReady(waited));
                }
                std::thread::sleep(Duration::from_millis(interval_ms));
            }
        }
    }
}

/// Runs one variant end to end: serve, launch, navigate, inject, interact,
/// evaluate, tear down.
pub fn run_session<L: SandboxLauncher>(
    config: &SessionConfig,
    launcher: &L,
    variant: &Variant,
) -> SessionReport {
    let mut session = Session::<L::Sandbox>::new();
    let mut rom = None;

    let result = session.drive(config, launcher, variant, &mut rom);
    session.teardown();

    for message in session.console.iter().filter(|m| m.kind == ConsoleKind::PageError) {
        warn!("page error: {}", message.text);
    }

    let (observations, records) = match result {
        Ok(obs) => {
            let records = variant.evaluate(&obs);
            (Some(obs), records)
        }
        Err(e) => {
            error!("session failed: {e}");
            (None, vec![AssertionRecord::fatal(&e)])
        }
    };

    SessionReport {
        variant: variant.kind().name().to_string(),
        title: variant.kind().title().to_string(),
        seed: variant.replay_seed(),
        rom,
        observations,
        records,
        console: std::mem::take(&mut session.console),
    }
}
