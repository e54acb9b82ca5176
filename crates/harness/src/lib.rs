pub mod assert;
pub mod codec;
mod error;
pub mod observe;
pub mod report;
pub mod rom;
pub mod sandbox;
pub mod script;
pub mod server;
pub mod session;
pub mod variant;

pub use assert::{AssertionRecord, Assertions, COUNTER_TOLERANCE};
pub use error::Error;
pub use observe::{ObservationSet, Probe, RunOutcome, Snapshot};
pub use report::{Reporter, Verdict};
pub use rom::RomImage;
pub use sandbox::{ChromeLauncher, ChromeOptions, ConsoleMessage, Sandbox, SandboxLauncher};
pub use script::{Button, EngineBindings, Script};
pub use session::{run_session, ReadyPolicy, SessionConfig, SessionReport};
pub use variant::{Variant, VariantKind};
