#![allow(dead_code)]

use harness::sandbox::{ConsoleMessage, Sandbox, SandboxLauncher};
use harness::{Error, ObservationSet, ReadyPolicy, SessionConfig, VariantKind};

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PAGE: &str = "test_emulator.html";

/// What the fake page does when the interaction script is evaluated.
#[derive(Debug, Clone)]
pub enum Page {
    Observe(ObservationSet),
    Raw(serde_json::Value),
    Throw(String),
    NeverReady,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub navigations: AtomicUsize,
    pub evaluations: AtomicUsize,
    pub closes: AtomicUsize,
    pub last_script: Mutex<String>,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn last_script(&self) -> String {
        self.last_script.lock().unwrap().clone()
    }
}

pub struct FakeLauncher {
    pub page: Page,
    pub fail_launch: bool,
    pub console: Vec<ConsoleMessage>,
    pub counters: Arc<Counters>,
}

impl FakeLauncher {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            fail_launch: false,
            console: Vec::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn failing() -> Self {
        let mut launcher = Self::new(Page::NeverReady);
        launcher.fail_launch = true;
        launcher
    }

    pub fn with_console(mut self, console: Vec<ConsoleMessage>) -> Self {
        self.console = console;
        self
    }
}

impl SandboxLauncher for FakeLauncher {
    type Sandbox = FakeSandbox;

    fn launch(&self) -> Result<FakeSandbox, Error> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(Error::SandboxLaunchFailure("no browser binary".into()));
        }

        Ok(FakeSandbox {
            page: self.page.clone(),
            console: self.console.clone(),
            counters: self.counters.clone(),
        })
    }
}

pub struct FakeSandbox {
    page: Page,
    console: Vec<ConsoleMessage>,
    counters: Arc<Counters>,
}

impl Sandbox for FakeSandbox {
    /// Fetches the page from the static server so navigation fails the same
    /// way it would in a browser when the page is not served.
    fn navigate(&mut self, url: &str) -> Result<(), Error> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        let status = http_get(url).map_err(|reason| Error::NavigationTimeout {
            url: url.to_string(),
            reason,
        })?;

        if status.starts_with("HTTP/1.1 200") {
            Ok(())
        } else {
            Err(Error::NavigationTimeout {
                url: url.to_string(),
                reason: status,
            })
        }
    }

    fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, Error> {
        self.counters.evaluations.fetch_add(1, Ordering::SeqCst);

        if expression.contains("typeof engine.frame === 'function'") {
            let ready = !matches!(self.page, Page::NeverReady);
            return Ok(serde_json::Value::Bool(ready));
        }

        *self.counters.last_script.lock().unwrap() = expression.to_string();
        match &self.page {
            Page::Observe(obs) => Ok(serde_json::Value::String(
                serde_json::to_string(obs).unwrap(),
            )),
            Page::Raw(value) => Ok(value.clone()),
            Page::Throw(message) => Err(Error::Evaluation(message.clone())),
            Page::NeverReady => Ok(serde_json::Value::Null),
        }
    }

    fn drain_console(&mut self) -> Vec<ConsoleMessage> {
        std::mem::take(&mut self.console)
    }

    fn close(self) -> Result<(), Error> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Returns the status line of a GET request.
fn http_get(url: &str) -> Result<String, String> {
    let rest = url.strip_prefix("http://").ok_or("not an http url")?;
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));

    let mut stream = TcpStream::connect(host).map_err(|e| e.to_string())?;
    write!(
        stream,
        "GET /{path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n"
    )
    .map_err(|e| e.to_string())?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .map_err(|e| e.to_string())?;
    Ok(response.lines().next().unwrap_or("").to_string())
}

/// A served directory holding the harness page and a small iNES image.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub rom: Vec<u8>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PAGE), "<html><body>harness</body></html>").unwrap();

        let mut rom = vec![0x4E, 0x45, 0x53, 0x1A, 1, 1, 0, 0];
        rom.resize(16, 0);
        rom.extend((0..0x4000 + 0x2000).map(|i| (i % 251) as u8));

        std::fs::create_dir(dir.path().join("build")).unwrap();
        std::fs::write(dir.path().join("build/game.nes"), &rom).unwrap();

        Self { dir, rom }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self, kind: VariantKind) -> SessionConfig {
        let mut config = SessionConfig::new(kind);
        config.port = 0;
        config.root = self.root().to_path_buf();
        config.page = PAGE.into();
        config.rom_path = self.root().join("build/game.nes");
        config.ready = ReadyPolicy::Settle { ms: 0 };
        config
    }
}
