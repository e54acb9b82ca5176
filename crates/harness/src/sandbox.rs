use serde::{Deserialize, Serialize};

use std::path::PathBuf;
use std::time::Duration;

use crate::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleKind {
    Log,
    PageError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub kind: ConsoleKind,
    pub text: String,
}

impl ConsoleMessage {
    pub fn log<S: Into<String>>(text: S) -> Self {
        Self {
            kind: ConsoleKind::Log,
            text: text.into(),
        }
    }

    pub fn page_error<S: Into<String>>(text: S) -> Self {
        Self {
            kind: ConsoleKind::PageError,
            text: text.into(),
        }
    }
}

/// A page capable of evaluating script and reporting its console.
pub trait Sandbox {
    fn navigate(&mut self, url: &str) -> Result<(), Error>;

    /// Evaluates `expression` in the page, returning its value.
    fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, Error>;

    /// Console lines and uncaught errors seen since the last call.
    fn drain_console(&mut self) -> Vec<ConsoleMessage>;

    fn close(self) -> Result<(), Error>;
}

pub trait SandboxLauncher {
    type Sandbox: Sandbox;

    fn launch(&self) -> Result<Self::Sandbox, Error>;
}

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            navigation_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

pub use chrome::{ChromeLauncher, ChromeSandbox};

mod chrome {
    use crossbeam::channel::{unbounded, Receiver, Sender};
    use headless_chrome::protocol::cdp::types::Event;
    use headless_chrome::protocol::cdp::Runtime::RemoteObject;
    use headless_chrome::{Browser, LaunchOptions, Tab};
    use tracing::{debug, info, warn};

    use std::ffi::OsStr;
    use std::sync::Arc;

    use super::{ChromeOptions, ConsoleMessage, Sandbox, SandboxLauncher};
    use crate::Error;

    pub struct ChromeLauncher {
        options: ChromeOptions,
    }

    impl ChromeLauncher {
        pub fn new(options: ChromeOptions) -> Self {
            Self { options }
        }
    }

    impl SandboxLauncher for ChromeLauncher {
        type Sandbox = ChromeSandbox;

        fn launch(&self) -> Result<ChromeSandbox, Error> {
            let options = LaunchOptions::default_builder()
                .headless(self.options.headless)
                .sandbox(false)
                .path(self.options.executable.clone())
                .idle_browser_timeout(self.options.idle_timeout)
                .args(vec![OsStr::new("--disable-setuid-sandbox")])
                .build()
                .map_err(|e| Error::SandboxLaunchFailure(e.to_string()))?;

            let browser =
                Browser::new(options).map_err(|e| Error::SandboxLaunchFailure(format!("{e:#}")))?;
            let tab = browser
                .new_tab()
                .map_err(|e| Error::SandboxLaunchFailure(format!("{e:#}")))?;
            tab.set_default_timeout(self.options.navigation_timeout);
            tab.enable_runtime()
                .map_err(|e| Error::SandboxLaunchFailure(format!("{e:#}")))?;

            let (console_tx, console_rx) = unbounded();
            subscribe_console(&tab, console_tx)?;

            info!("browser launched");

            Ok(ChromeSandbox {
                browser,
                tab,
                console: console_rx,
            })
        }
    }

    fn subscribe_console(tab: &Arc<Tab>, tx: Sender<ConsoleMessage>) -> Result<(), Error> {
        let listener = move |event: &Event| match event {
            Event::RuntimeConsoleAPICalled(e) => {
                let text = e
                    .params
                    .args
                    .iter()
                    .map(remote_text)
                    .collect::<Vec<_>>()
                    .join(" ");
                debug!(target: "harness::page", "{text}");
                let _ = tx.send(ConsoleMessage::log(text));
            }
            Event::RuntimeExceptionThrown(e) => {
                let details = &e.params.exception_details;
                let text = details
                    .exception
                    .as_ref()
                    .and_then(|ex| ex.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                warn!(target: "harness::page", "page error: {text}");
                let _ = tx.send(ConsoleMessage::page_error(text));
            }
            _ => (),
        };

        tab.add_event_listener(Arc::new(listener))
            .map(|_| ())
            .map_err(|e| Error::SandboxLaunchFailure(format!("{e:#}")))
    }

    fn remote_text(object: &RemoteObject) -> String {
        match &object.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => object.description.clone().unwrap_or_default(),
        }
    }

    pub struct ChromeSandbox {
        browser: Browser,
        tab: Arc<Tab>,
        console: Receiver<ConsoleMessage>,
    }

    impl Sandbox for ChromeSandbox {
        fn navigate(&mut self, url: &str) -> Result<(), Error> {
            let timeout = |e: anyhow::Error| Error::NavigationTimeout {
                url: url.to_string(),
                reason: format!("{e:#}"),
            };
            self.tab.navigate_to(url).map_err(timeout)?;
            self.tab.wait_until_navigated().map_err(timeout)?;
            Ok(())
        }

        fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, Error> {
            let object = self
                .tab
                .evaluate(expression, false)
                .map_err(|e| Error::Evaluation(format!("{e:#}")))?;
            Ok(object.value.unwrap_or(serde_json::Value::Null))
        }

        fn drain_console(&mut self) -> Vec<ConsoleMessage> {
            self.console.try_iter().collect()
        }

        fn close(self) -> Result<(), Error> {
            let ChromeSandbox { browser, tab, .. } = self;
            if let Err(e) = tab.close(true) {
                debug!("tab close: {e:#}");
            }
            drop(browser);
            info!("browser closed");
            Ok(())
        }
    }
}
